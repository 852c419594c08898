use nanlisp::{Error, ParseErrorKind, Runtime, Value};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

/// Heap size for the interactive session, in object slots
const REPL_HEAP_CAPACITY: usize = 1 << 18;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(run_repl);

    match result {
        Ok(code) => process::exit(code),
        Err(panic_info) => {
            eprintln!("The REPL encountered an unexpected error and must exit.");

            if let Some(msg) = panic_info.downcast_ref::<&str>() {
                eprintln!("Error: {msg}");
            } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                eprintln!("Error: {msg}");
            } else {
                eprintln!("Error: Unknown panic occurred");
            }

            process::exit(1);
        }
    }
}

/// Returns the process exit code.
fn run_repl() -> i32 {
    println!("nanlisp: a small Scheme on a fixed-size heap");
    println!("Enter S-expressions like: (define (sq x) (* x x))");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return 1;
        }
    };
    let mut rt = match Runtime::new(REPL_HEAP_CAPACITY) {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Could not create runtime: {err}");
            return 1;
        }
    };

    // Lines of an expression still waiting for its closing paren
    let mut pending = String::new();

    let code = loop {
        let prompt = if pending.is_empty() { "nanlisp> " } else { "    ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }
                    if command.starts_with(':') {
                        let _ = rl.add_history_entry(command);
                        match command {
                            ":help" => print_help(),
                            ":env" => print_environment(&rt),
                            ":gc" => print_collection(&mut rt),
                            ":quit" | ":exit" => {
                                println!("Goodbye!");
                                break 0;
                            }
                            _ => println!("Unknown command {command}; try :help"),
                        }
                        continue;
                    }
                }

                pending.push_str(&line);
                pending.push('\n');

                match rt.eval_str(&pending) {
                    Err(Error::ParseError(err)) if err.kind == ParseErrorKind::Incomplete => {
                        // Keep reading until the expression is complete.
                        continue;
                    }
                    Ok(result) => {
                        // Don't print Undefined values (e.g., from define)
                        if result != Value::UNDEFINED {
                            println!("{}", rt.format(result));
                        }
                    }
                    Err(err) if err.is_fatal() => {
                        println!("Error: {err}");
                        println!("The runtime cannot continue.");
                        break 2;
                    }
                    Err(err) => println!("Error: {err}"),
                }
                let _ = rl.add_history_entry(pending.trim_end());
                pending.clear();
            }

            Err(ReadlineError::Interrupted) if !pending.is_empty() => {
                // Ctrl+C abandons a half-typed expression.
                pending.clear();
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break 0;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break 1;
            }
        }
    };

    let stats = rt.shutdown();
    tracing::debug!(?stats, "session finished");
    code
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global environment bindings");
    println!("  :gc        - Run the garbage collector and show heap usage");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  quote ('x), lambda, define, set!, cond, if, begin");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (define (fact n) (cond ((= n 0) 1) (else (* n (fact (- n 1))))))");
    println!("  (fact 10)");
    println!("  (define port (open-output-string))");
    println!("  (display \"hi\" port) (get-output-string port)");
    println!();
}

fn print_environment(rt: &Runtime) {
    let bindings = rt.global_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in procedures from user-defined values
    let (builtins, user_defined): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| rt.heap().builtin(*value).is_some());

    if !builtins.is_empty() {
        println!("Built-in procedures ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for (name, _) in &builtins {
            print!("  {name:<20}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {}", rt.format(value));
        }
    }
}

fn print_collection(rt: &mut Runtime) {
    let reclaimed = rt.collect();
    let heap = rt.heap();
    println!(
        "Reclaimed {reclaimed} objects; {} live of {} slots ({} collections so far)",
        heap.live_count(),
        heap.capacity(),
        heap.stats.collections
    );
}
