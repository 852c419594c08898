//! Built-in procedure registry.
//!
//! Builtins are ordinary functions that receive already-evaluated arguments:
//!
//! ```scheme
//! (+ 1 2 3)                 ; arithmetic
//! (cons 1 '(2 3))           ; list construction
//! (display "hi" port)       ; output to an optional port
//! ```
//!
//! Special forms (`quote`, `lambda`, `cond`, `define`, `set!`, `if`, `begin`)
//! control evaluation of their operands and are handled directly by the
//! evaluator; they are not in this registry.
//!
//! ## Calling convention
//!
//! Every builtin has the signature `fn(&mut Heap, &[Value]) -> Result<Value, Error>`.
//! The argument slice is already rooted by the caller, so a builtin may allocate
//! (and therefore trigger a collection) without protecting its inputs. Anything
//! it allocates itself and still needs after a further allocation must be pushed
//! on the heap's shadow stack.
//!
//! The heap refers to builtins only by [`BuiltinId`], an index into a
//! [`Builtins`] table owned by the runtime. Hosts extend the table with
//! [`Builtins::register`].
//!
//! ## Error handling
//!
//! - **Arity**: checked by [`Builtins::call`] before the function runs
//! - **Types**: no coercion; `(+ 1 "2")` and `(car 5)` are `TypeError`
//! - **Division by zero**: `EvalError`, rather than an infinity

use std::borrow::Cow;
use std::fs::File;
use std::io::BufWriter;
use std::sync::LazyLock;

use crate::heap::{BuiltinId, Heap, Object, Port};
use crate::value::Value;
use crate::{Arity, Error};

/// Signature shared by all builtin procedures.
pub type BuiltinFn = fn(&mut Heap, &[Value]) -> Result<Value, Error>;

/// Definition of a built-in procedure
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The Scheme identifier this procedure is bound to in the global environment
    pub name: Cow<'static, str>,
    pub func: BuiltinFn,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

//
// Argument helpers
//

fn type_error(heap: &Heap, who: &str, expected: &str, got: Value) -> Error {
    Error::TypeError(format!(
        "{who}: expected {expected}, got {}",
        heap.printer(got)
    ))
}

fn number_arg(heap: &Heap, who: &str, value: Value) -> Result<f64, Error> {
    value
        .as_number()
        .ok_or_else(|| type_error(heap, who, "number", value))
}

fn numbers(heap: &Heap, who: &str, args: &[Value]) -> Result<Vec<f64>, Error> {
    args.iter().map(|&arg| number_arg(heap, who, arg)).collect()
}

fn string_arg<'h>(heap: &'h Heap, who: &str, value: Value) -> Result<&'h str, Error> {
    heap.string(value)
        .ok_or_else(|| type_error(heap, who, "string", value))
}

fn port_arg<'h>(heap: &'h mut Heap, who: &str, value: Value) -> Result<&'h mut Port, Error> {
    if !matches!(heap.object(value), Some(Object::Port(_))) {
        return Err(type_error(heap, who, "port", value));
    }
    heap.port_mut(value)
        .ok_or_else(|| Error::TypeError(format!("{who}: expected port")))
}

fn io_error(who: &str, err: std::io::Error) -> Error {
    Error::EvalError(format!("{who}: {err}"))
}

//
// Builtin Function Implementations
//

// Chained comparison: every adjacent pair must satisfy the operator.
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
            let numbers = numbers(heap, $op_str, args)?;
            Ok(Value::boolean(
                numbers.windows(2).all(|pair| pair[0] $op pair[1]),
            ))
        }
    };
}

numeric_comparison!(builtin_num_eq, ==, "=");
numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_ge, >=, ">=");

fn builtin_add(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::number(numbers(heap, "+", args)?.into_iter().sum()))
}

fn builtin_mul(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::number(numbers(heap, "*", args)?.into_iter().product()))
}

fn builtin_sub(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    let result = match numbers(heap, "-", args)?.as_slice() {
        [] => return Err(Error::arity_mismatch(Arity::AtLeast(1), 0)),
        [only] => -only,
        [first, rest @ ..] => rest.iter().fold(*first, |acc, n| acc - n),
    };
    Ok(Value::number(result))
}

fn builtin_div(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    let numbers = numbers(heap, "/", args)?;
    let (first, divisors) = match numbers.as_slice() {
        [] => return Err(Error::arity_mismatch(Arity::AtLeast(1), 0)),
        [only] => (1.0, std::slice::from_ref(only)),
        [first, rest @ ..] => (*first, rest),
    };
    let mut result = first;
    for &divisor in divisors {
        if divisor == 0.0 {
            return Err(Error::EvalError("division by zero".to_owned()));
        }
        result /= divisor;
    }
    Ok(Value::number(result))
}

fn builtin_car(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    heap.car(args[0])
        .ok_or_else(|| type_error(heap, "car", "pair", args[0]))
}

fn builtin_cdr(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    heap.cdr(args[0])
        .ok_or_else(|| type_error(heap, "cdr", "pair", args[0]))
}

fn builtin_cons(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    heap.cons(args[0], args[1])
}

fn builtin_list(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    heap.list(args)
}

fn builtin_null(_heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(args[0].is_empty_list()))
}

fn builtin_pair(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(heap.is_pair(args[0])))
}

fn builtin_eq(_heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(args[0] == args[1]))
}

fn builtin_not(_heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(!args[0].is_truthy()))
}

fn builtin_number(_heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(args[0].is_number()))
}

fn builtin_symbol(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(heap.is_symbol(args[0])))
}

fn builtin_string(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(heap.string(args[0]).is_some()))
}

fn builtin_procedure(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(matches!(
        heap.object(args[0]),
        Some(Object::Lambda(_) | Object::Builtin(_))
    )))
}

fn builtin_string_append(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    let mut result = String::new();
    for &arg in args {
        result.push_str(string_arg(heap, "string-append", arg)?);
    }
    heap.alloc_string(result)
}

fn builtin_string_length(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    let length = string_arg(heap, "string-length", args[0])?.chars().count();
    Ok(Value::number(length as f64))
}

/// Write `text` to the optional port argument, defaulting to standard output.
fn emit(heap: &mut Heap, who: &str, text: &str, port: Option<Value>) -> Result<Value, Error> {
    let written = match port {
        Some(port) => port_arg(heap, who, port)?.write_str(text),
        None => Port::Stdout.write_str(text),
    };
    written.map_err(|err| io_error(who, err))?;
    Ok(Value::UNDEFINED)
}

fn builtin_display(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    let text = heap.printer(args[0]).plain().to_string();
    emit(heap, "display", &text, args.get(1).copied())
}

fn builtin_write(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    let text = heap.printer(args[0]).to_string();
    emit(heap, "write", &text, args.get(1).copied())
}

fn builtin_newline(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    emit(heap, "newline", "\n", args.first().copied())
}

fn builtin_open_output_string(heap: &mut Heap, _args: &[Value]) -> Result<Value, Error> {
    heap.alloc_port(Port::OutputString(String::new()))
}

fn builtin_get_output_string(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    let text = match port_arg(heap, "get-output-string", args[0])? {
        Port::OutputString(buffer) => Some(buffer.clone()),
        _ => None,
    };
    let Some(text) = text else {
        return Err(type_error(
            heap,
            "get-output-string",
            "string output port",
            args[0],
        ));
    };
    heap.alloc_string(text)
}

fn builtin_open_output_file(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    let path = string_arg(heap, "open-output-file", args[0])?;
    let file = File::create(path).map_err(|err| io_error("open-output-file", err))?;
    heap.alloc_port(Port::OutputFile(BufWriter::new(file)))
}

fn builtin_close_port(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    port_arg(heap, "close-port", args[0])?
        .close()
        .map_err(|err| io_error("close-port", err))?;
    Ok(Value::UNDEFINED)
}

fn builtin_current_output_port(heap: &mut Heap, _args: &[Value]) -> Result<Value, Error> {
    heap.alloc_port(Port::Stdout)
}

fn builtin_error(heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
    let parts: Vec<String> = args
        .iter()
        .map(|&value| match heap.string(value) {
            Some(text) => text.to_owned(),
            None => heap.printer(value).to_string(),
        })
        .collect();

    let message = if parts.is_empty() {
        "Error".to_owned()
    } else {
        parts.join(" ")
    };

    Err(Error::EvalError(message))
}

fn builtin_gc(heap: &mut Heap, _args: &[Value]) -> Result<Value, Error> {
    let reclaimed = heap.collect(&[]);
    Ok(Value::number(reclaimed as f64))
}

macro_rules! op {
    ($name:expr, $func:expr, $arity:expr) => {
        BuiltinOp {
            name: Cow::Borrowed($name),
            func: $func,
            arity: $arity,
        }
    };
}

/// Default builtins, in `BuiltinId` order.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Arithmetic operations
        op!("+", builtin_add, Arity::Any),
        op!("-", builtin_sub, Arity::AtLeast(1)),
        op!("*", builtin_mul, Arity::Any),
        op!("/", builtin_div, Arity::AtLeast(1)),
        // Comparison operations
        op!("=", builtin_num_eq, Arity::AtLeast(2)),
        op!("<", builtin_lt, Arity::AtLeast(2)),
        op!(">", builtin_gt, Arity::AtLeast(2)),
        op!("<=", builtin_le, Arity::AtLeast(2)),
        op!(">=", builtin_ge, Arity::AtLeast(2)),
        // List operations
        op!("car", builtin_car, Arity::Exact(1)),
        op!("cdr", builtin_cdr, Arity::Exact(1)),
        op!("cons", builtin_cons, Arity::Exact(2)),
        op!("list", builtin_list, Arity::Any),
        op!("null?", builtin_null, Arity::Exact(1)),
        op!("pair?", builtin_pair, Arity::Exact(1)),
        // Predicates
        op!("eq?", builtin_eq, Arity::Exact(2)),
        op!("not", builtin_not, Arity::Exact(1)),
        op!("number?", builtin_number, Arity::Exact(1)),
        op!("symbol?", builtin_symbol, Arity::Exact(1)),
        op!("string?", builtin_string, Arity::Exact(1)),
        op!("procedure?", builtin_procedure, Arity::Exact(1)),
        // String operations
        op!("string-append", builtin_string_append, Arity::Any),
        op!("string-length", builtin_string_length, Arity::Exact(1)),
        // Ports
        op!("display", builtin_display, Arity::Range(1, 2)),
        op!("write", builtin_write, Arity::Range(1, 2)),
        op!("newline", builtin_newline, Arity::Range(0, 1)),
        op!("open-output-string", builtin_open_output_string, Arity::Exact(0)),
        op!("get-output-string", builtin_get_output_string, Arity::Exact(1)),
        op!("open-output-file", builtin_open_output_file, Arity::Exact(1)),
        op!("close-port", builtin_close_port, Arity::Exact(1)),
        op!("current-output-port", builtin_current_output_port, Arity::Exact(0)),
        // Error handling
        op!("error", builtin_error, Arity::Any),
        // Memory
        op!("gc", builtin_gc, Arity::Exact(0)),
    ]
});

/// The builtin table a runtime dispatches into.
#[derive(Debug, Clone)]
pub struct Builtins {
    ops: Vec<BuiltinOp>,
}

impl Default for Builtins {
    fn default() -> Self {
        Builtins {
            ops: BUILTIN_OPS.clone(),
        }
    }
}

impl Builtins {
    /// Append a host procedure. A later registration under an existing name
    /// gets a fresh id; the global binding decides which one Scheme code sees.
    pub fn register(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        arity: Arity,
        func: BuiltinFn,
    ) -> BuiltinId {
        let id = BuiltinId(self.ops.len() as u32);
        self.ops.push(BuiltinOp {
            name: name.into(),
            func,
            arity,
        });
        id
    }

    pub fn get(&self, id: BuiltinId) -> Option<&BuiltinOp> {
        self.ops.get(id.index())
    }

    pub fn name(&self, id: BuiltinId) -> Option<&str> {
        self.get(id).map(|op| op.name.as_ref())
    }

    /// Most recently registered id for `name`.
    pub fn find(&self, name: &str) -> Option<BuiltinId> {
        self.ops
            .iter()
            .rposition(|op| op.name == name)
            .map(|index| BuiltinId(index as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (BuiltinId, &BuiltinOp)> {
        self.ops
            .iter()
            .enumerate()
            .map(|(index, op)| (BuiltinId(index as u32), op))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Validate arity, then run the builtin. `args` must already be rooted.
    pub fn call(&self, id: BuiltinId, heap: &mut Heap, args: &[Value]) -> Result<Value, Error> {
        let op = self
            .get(id)
            .ok_or_else(|| Error::NotApplicable(format!("unknown builtin #{}", id.index())))?;
        op.arity.validate(args.len())?;
        (op.func)(heap, args)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn call(heap: &mut Heap, name: &str, args: &[Value]) -> Result<Value, Error> {
        let builtins = Builtins::default();
        let id = builtins.find(name).unwrap();
        builtins.call(id, heap, args)
    }

    fn num(n: f64) -> Value {
        Value::number(n)
    }

    #[test]
    fn test_builtin_ops_registry() {
        let builtins = Builtins::default();
        for name in [
            "+", "-", "*", "/", "=", "<", ">", "<=", ">=", "car", "cdr", "cons", "list",
            "null?", "pair?", "eq?", "not", "number?", "symbol?", "string?", "procedure?",
            "string-append", "string-length", "display", "write", "newline",
            "open-output-string", "get-output-string", "open-output-file", "close-port",
            "current-output-port", "error", "gc",
        ] {
            let id = builtins.find(name);
            assert!(id.is_some(), "missing builtin {name}");
            assert_eq!(builtins.name(id.unwrap()), Some(name));
        }
        assert_eq!(builtins.find("if"), None, "special forms are not builtins");
        assert_eq!(builtins.len(), builtins.iter().count());
    }

    #[test]
    fn test_arithmetic() {
        let mut heap = Heap::new(8);
        let test_cases = vec![
            ("+", vec![], Ok(num(0.0))),
            ("+", vec![num(1.0), num(2.0), num(3.0)], Ok(num(6.0))),
            ("-", vec![num(5.0)], Ok(num(-5.0))),
            ("-", vec![num(10.0), num(3.0), num(2.0)], Ok(num(5.0))),
            ("*", vec![], Ok(num(1.0))),
            ("*", vec![num(2.0), num(3.5)], Ok(num(7.0))),
            ("/", vec![num(4.0)], Ok(num(0.25))),
            ("/", vec![num(9.0), num(3.0)], Ok(num(3.0))),
            (
                "/",
                vec![num(1.0), num(0.0)],
                Err(Error::EvalError("division by zero".into())),
            ),
            ("-", vec![], Err(Error::arity_mismatch(Arity::AtLeast(1), 0))),
        ];
        for (i, (name, args, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(
                call(&mut heap, name, &args),
                expected,
                "Test case {} ({name}) failed",
                i + 1
            );
        }
    }

    #[test]
    fn test_comparisons() {
        let mut heap = Heap::new(8);
        let test_cases = vec![
            ("=", vec![num(1.0), num(1.0), num(1.0)], true),
            ("=", vec![num(1.0), num(2.0)], false),
            ("<", vec![num(1.0), num(2.0), num(3.0)], true),
            ("<", vec![num(1.0), num(3.0), num(2.0)], false),
            (">", vec![num(3.0), num(2.0)], true),
            ("<=", vec![num(2.0), num(2.0)], true),
            (">=", vec![num(1.0), num(2.0)], false),
        ];
        for (i, (name, args, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(
                call(&mut heap, name, &args),
                Ok(Value::boolean(expected)),
                "Test case {} failed",
                i + 1
            );
        }
    }

    #[test]
    fn test_type_errors() {
        let mut heap = Heap::new(8);
        let s = heap.alloc_string("2").unwrap();
        assert!(matches!(
            call(&mut heap, "+", &[num(1.0), s]),
            Err(Error::TypeError(_))
        ));
        assert!(matches!(
            call(&mut heap, "car", &[num(5.0)]),
            Err(Error::TypeError(_))
        ));
        assert!(matches!(
            call(&mut heap, "string-length", &[num(5.0)]),
            Err(Error::TypeError(_))
        ));
        assert_eq!(
            call(&mut heap, "car", &[]),
            Err(Error::arity_mismatch(Arity::Exact(1), 0))
        );
    }

    #[test]
    fn test_list_operations() {
        let mut heap = Heap::new(16);
        let list = call(&mut heap, "list", &[num(1.0), num(2.0)]).unwrap();
        heap.push_root(list);
        assert_eq!(call(&mut heap, "car", &[list]), Ok(num(1.0)));
        let rest = call(&mut heap, "cdr", &[list]).unwrap();
        assert_eq!(heap.car(rest), Some(num(2.0)));

        let pair = call(&mut heap, "cons", &[num(0.0), list]).unwrap();
        assert_eq!(heap.printer(pair).to_string(), "(0 1 2)");

        assert_eq!(call(&mut heap, "null?", &[Value::EMPTY_LIST]), Ok(Value::TRUE));
        assert_eq!(call(&mut heap, "null?", &[list]), Ok(Value::FALSE));
        assert_eq!(call(&mut heap, "pair?", &[list]), Ok(Value::TRUE));
        assert_eq!(call(&mut heap, "list", &[]), Ok(Value::EMPTY_LIST));
    }

    #[test]
    fn test_predicates() {
        let mut heap = Heap::new(16);
        let sym = heap.intern("a").unwrap();
        let same = heap.intern("a").unwrap();
        let s1 = heap.alloc_string("a").unwrap();
        let s2 = heap.alloc_string("a").unwrap();
        let builtin = heap.alloc_builtin(BuiltinId(0)).unwrap();

        assert_eq!(call(&mut heap, "eq?", &[sym, same]), Ok(Value::TRUE));
        assert_eq!(call(&mut heap, "eq?", &[s1, s2]), Ok(Value::FALSE));
        assert_eq!(call(&mut heap, "eq?", &[num(2.0), num(2.0)]), Ok(Value::TRUE));
        assert_eq!(call(&mut heap, "not", &[Value::FALSE]), Ok(Value::TRUE));
        assert_eq!(call(&mut heap, "not", &[num(0.0)]), Ok(Value::FALSE));
        assert_eq!(call(&mut heap, "symbol?", &[sym]), Ok(Value::TRUE));
        assert_eq!(call(&mut heap, "symbol?", &[s1]), Ok(Value::FALSE));
        assert_eq!(call(&mut heap, "string?", &[s1]), Ok(Value::TRUE));
        assert_eq!(call(&mut heap, "number?", &[num(1.5)]), Ok(Value::TRUE));
        assert_eq!(call(&mut heap, "procedure?", &[builtin]), Ok(Value::TRUE));
        assert_eq!(call(&mut heap, "procedure?", &[sym]), Ok(Value::FALSE));
    }

    #[test]
    fn test_strings() {
        let mut heap = Heap::new(16);
        let a = heap.alloc_string("foo").unwrap();
        let b = heap.alloc_string("bär").unwrap();
        let joined = call(&mut heap, "string-append", &[a, b]).unwrap();
        assert_eq!(heap.string(joined), Some("foobär"));
        assert_eq!(call(&mut heap, "string-length", &[joined]), Ok(num(6.0)));
        let empty = call(&mut heap, "string-append", &[]).unwrap();
        assert_eq!(heap.string(empty), Some(""));
    }

    #[test]
    fn test_string_port_output() {
        let mut heap = Heap::new(16);
        let port = call(&mut heap, "open-output-string", &[]).unwrap();
        heap.push_root(port);
        let text = heap.alloc_string("a\"b").unwrap();
        heap.push_root(text);

        call(&mut heap, "display", &[text, port]).unwrap();
        call(&mut heap, "newline", &[port]).unwrap();
        call(&mut heap, "write", &[text, port]).unwrap();
        call(&mut heap, "write", &[Value::character('x'), port]).unwrap();

        let out = call(&mut heap, "get-output-string", &[port]).unwrap();
        assert_eq!(heap.string(out), Some("a\"b\n\"a\\\"b\"#\\x"));

        call(&mut heap, "close-port", &[port]).unwrap();
        assert!(matches!(
            call(&mut heap, "display", &[text, port]),
            Err(Error::EvalError(_))
        ));
        assert!(matches!(
            call(&mut heap, "display", &[text, num(1.0)]),
            Err(Error::TypeError(_))
        ));
    }

    #[test]
    fn test_error_message_construction() {
        let mut heap = Heap::new(8);
        let msg = heap.alloc_string("bad thing:").unwrap();
        let sym = heap.intern("x").unwrap();
        assert_eq!(
            call(&mut heap, "error", &[msg, sym, num(42.0)]),
            Err(Error::EvalError("bad thing: x 42".into()))
        );
        assert_eq!(
            call(&mut heap, "error", &[]),
            Err(Error::EvalError("Error".into()))
        );
    }

    #[test]
    fn test_gc_builtin_reports_reclaimed() {
        let mut heap = Heap::new(8);
        heap.alloc_string("garbage").unwrap();
        heap.alloc_string("garbage").unwrap();
        assert_eq!(call(&mut heap, "gc", &[]), Ok(num(2.0)));
    }

    #[test]
    fn test_register_host_builtin() {
        fn answer(_heap: &mut Heap, _args: &[Value]) -> Result<Value, Error> {
            Ok(Value::from(42))
        }

        let mut builtins = Builtins::default();
        let before = builtins.len();
        let id = builtins.register("answer", Arity::Exact(0), answer);
        assert_eq!(id.index(), before);
        assert_eq!(builtins.find("answer"), Some(id));

        let mut heap = Heap::new(4);
        assert_eq!(builtins.call(id, &mut heap, &[]), Ok(Value::from(42)));
        assert_eq!(
            builtins.call(id, &mut heap, &[Value::TRUE]),
            Err(Error::arity_mismatch(Arity::Exact(0), 1))
        );
        assert!(matches!(
            builtins.call(BuiltinId(9999), &mut heap, &[]),
            Err(Error::NotApplicable(_))
        ));
    }
}
