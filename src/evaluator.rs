use crate::builtinops::{BuiltinFn, Builtins};
use crate::environment::EnvHandle;
use crate::heap::{BuiltinId, GcStats, Heap, Lambda};
use crate::value::Value;
use crate::{Arity, DEFAULT_HEAP_CAPACITY, Error, MAX_EVAL_DEPTH};
use std::borrow::Cow;

/// Remaining stack below which evaluation switches to a fresh segment
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

/// Construction-time settings for a [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of object slots in the arena. Fixed for the runtime's lifetime.
    pub heap_capacity: usize,
    /// Maximum depth of nested non-tail evaluation
    pub max_eval_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            heap_capacity: DEFAULT_HEAP_CAPACITY,
            max_eval_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Interned symbols naming the special forms, pinned for the runtime's lifetime.
#[derive(Debug, Clone, Copy)]
struct SpecialForms {
    quote: Value,
    lambda: Value,
    cond: Value,
    else_: Value,
    define: Value,
    set: Value,
    if_: Value,
    begin: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Quote,
    Lambda,
    Cond,
    Define,
    Set,
    If,
    Begin,
}

impl SpecialForms {
    fn intern(heap: &mut Heap) -> Result<Self, Error> {
        let mut symbol = |name: &str| -> Result<Value, Error> {
            let value = heap.intern(name)?;
            heap.add_root(value);
            Ok(value)
        };
        Ok(SpecialForms {
            quote: symbol("quote")?,
            lambda: symbol("lambda")?,
            cond: symbol("cond")?,
            else_: symbol("else")?,
            define: symbol("define")?,
            set: symbol("set!")?,
            if_: symbol("if")?,
            begin: symbol("begin")?,
        })
    }

    fn classify(&self, head: Value) -> Option<Form> {
        let form = match head {
            h if h == self.quote => Form::Quote,
            h if h == self.lambda => Form::Lambda,
            h if h == self.cond => Form::Cond,
            h if h == self.define => Form::Define,
            h if h == self.set => Form::Set,
            h if h == self.if_ => Form::If,
            h if h == self.begin => Form::Begin,
            _ => return None,
        };
        Some(form)
    }
}

/// Outcome of a special form: a finished value, or an expression the caller
/// should evaluate next in tail position.
enum Step {
    Done(Value),
    Tail(Value),
}

/// An interpreter instance: heap, global environment and builtin table.
///
/// Runtimes share nothing, so several may coexist in one process. Values
/// returned to the host stay valid until the next allocation unless pinned
/// with [`Heap::add_root`].
#[derive(Debug)]
pub struct Runtime {
    heap: Heap,
    global: EnvHandle,
    builtins: Builtins,
    forms: SpecialForms,
    config: RuntimeConfig,
    terminated: bool,
}

impl Runtime {
    /// Create a runtime whose arena holds `heap_capacity` objects.
    pub fn new(heap_capacity: usize) -> Result<Self, Error> {
        Self::with_config(RuntimeConfig {
            heap_capacity,
            ..RuntimeConfig::default()
        })
    }

    pub fn with_config(config: RuntimeConfig) -> Result<Self, Error> {
        let mut heap = Heap::new(config.heap_capacity);
        let global = EnvHandle::new_global(&mut heap)?;
        heap.add_root(global.into());
        let forms = SpecialForms::intern(&mut heap)?;

        let builtins = Builtins::default();
        for (id, op) in builtins.iter() {
            bind_builtin(&mut heap, global, &op.name, id)?;
        }

        tracing::info!(
            capacity = heap.capacity(),
            builtins = builtins.len(),
            live = heap.live_count(),
            "runtime initialised"
        );
        Ok(Runtime {
            heap,
            global,
            builtins,
            forms,
            config,
            terminated: false,
        })
    }

    /// Release every root and collect, destroying all remaining objects.
    pub fn shutdown(mut self) -> GcStats {
        self.heap.clear_roots();
        let reclaimed = self.heap.collect(&[]);
        tracing::info!(
            reclaimed,
            collections = self.heap.stats.collections,
            "runtime shut down"
        );
        self.heap.stats
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn global_env(&self) -> EnvHandle {
        self.global
    }

    pub fn config(&self) -> RuntimeConfig {
        self.config
    }

    /// True once the arena has been exhausted. A terminated runtime refuses
    /// all further work with [`Error::OutOfMemory`].
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Run `f` unless the runtime is terminated; terminate it if `f` exhausts the heap.
    pub(crate) fn guard<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.terminated {
            return Err(Error::OutOfMemory);
        }
        let result = f(self);
        if let Err(Error::OutOfMemory) = result {
            tracing::error!(
                capacity = self.heap.capacity(),
                "runtime terminated: object heap exhausted"
            );
            self.terminated = true;
        }
        result
    }

    /// Add a host procedure and bind it in the global environment.
    pub fn register_builtin(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        arity: Arity,
        func: BuiltinFn,
    ) -> Result<BuiltinId, Error> {
        let name = name.into();
        self.guard(|rt| {
            let id = rt.builtins.register(name.clone(), arity, func);
            bind_builtin(&mut rt.heap, rt.global, &name, id)?;
            Ok(id)
        })
    }

    /// Bind `name` to `value` in the global environment.
    pub fn define_global(&mut self, name: &str, value: Value) -> Result<(), Error> {
        self.guard(|rt| {
            let global = rt.global;
            rt.heap.scoped(|heap| {
                heap.push_root(value);
                let symbol = heap.intern(name)?;
                global.define(heap, symbol, value)
            })
        })
    }

    /// Global bindings as `(name, value)`, in definition order.
    pub fn global_bindings(&self) -> Vec<(String, Value)> {
        let Ok(frame) = self.global.frame(&self.heap) else {
            return Vec::new();
        };
        frame
            .bindings()
            .iter()
            .filter_map(|&(name, value)| {
                self.heap
                    .symbol_name(name)
                    .map(|name| (name.to_owned(), value))
            })
            .collect()
    }

    /// Run a full collection now. Returns the number of slots reclaimed.
    pub fn collect(&mut self) -> usize {
        self.heap.collect(&[])
    }

    /// External representation of `value`, as `write` would print it.
    pub fn format(&self, value: Value) -> String {
        self.heap.printer(value).to_string()
    }

    /// Evaluate `expr` in the global environment.
    pub fn eval(&mut self, expr: Value) -> Result<Value, Error> {
        self.eval_in(expr, self.global)
    }

    pub fn eval_in(&mut self, expr: Value, env: EnvHandle) -> Result<Value, Error> {
        self.guard(|rt| {
            let base = rt.heap.root_count();
            let result = rt.eval_depth(expr, env, 0);
            rt.heap.truncate_roots(base);
            result
        })
    }

    /// Parse and evaluate every datum in `text`, returning the last result
    /// (`Undefined` for empty input).
    #[cfg(feature = "scheme")]
    pub fn eval_str(&mut self, text: &str) -> Result<Value, Error> {
        let exprs = self.parse_all(text)?;
        self.guard(|rt| {
            let global = rt.global;
            let base = rt.heap.root_count();
            for &expr in &exprs {
                rt.heap.push_root(expr);
            }
            let mut result = Ok(Value::UNDEFINED);
            for &expr in &exprs {
                result = rt.eval_depth(expr, global, 0);
                if result.is_err() {
                    break;
                }
            }
            rt.heap.truncate_roots(base);
            result
        })
    }

    fn eval_depth(&mut self, expr: Value, env: EnvHandle, depth: usize) -> Result<Value, Error> {
        if depth >= self.config.max_eval_depth {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.config.max_eval_depth
            )));
        }
        // Each level nests eval_loop and eval_application frames; grow the
        // stack on demand so the depth limit is reached before the guard page.
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            let base = self.heap.root_count();
            self.heap.push_root(expr);
            self.heap.push_root(env.into());
            let result = self.eval_loop(expr, env, depth, base);
            self.heap.truncate_roots(base);
            result
        })
    }

    /// Evaluation proper. `base` and `base + 1` on the shadow stack hold the
    /// current expression and environment; tail positions replace them and loop.
    fn eval_loop(
        &mut self,
        mut expr: Value,
        mut env: EnvHandle,
        depth: usize,
        base: usize,
    ) -> Result<Value, Error> {
        loop {
            self.heap.truncate_roots(base + 2);
            self.heap.set_root(base, expr);
            self.heap.set_root(base + 1, env.into());

            let Some((head, operands)) = self.heap.pair(expr) else {
                return self.eval_atom(expr, env);
            };

            let step = match self.forms.classify(head) {
                Some(Form::Quote) => Step::Done(self.eval_quote(operands)?),
                Some(Form::Lambda) => Step::Done(self.eval_lambda(operands, env)?),
                Some(Form::Define) => Step::Done(self.eval_define(operands, env, depth)?),
                Some(Form::Set) => Step::Done(self.eval_set(operands, env, depth)?),
                Some(Form::Cond) => self.eval_cond(operands, env, depth)?,
                Some(Form::If) => self.eval_if(operands, env, depth)?,
                Some(Form::Begin) => match self.eval_leading(operands, env, depth, "begin")? {
                    Some(last) => Step::Tail(last),
                    None => Step::Done(Value::UNDEFINED),
                },
                None => {
                    let (next, next_env) = match self.eval_application(head, operands, env, depth)? {
                        Application::Done(value) => return Ok(value),
                        Application::Tail(next, next_env) => (next, next_env),
                    };
                    expr = next;
                    env = next_env;
                    continue;
                }
            };

            match step {
                Step::Done(value) => return Ok(value),
                Step::Tail(next) => expr = next,
            }
        }
    }

    fn eval_atom(&self, expr: Value, env: EnvHandle) -> Result<Value, Error> {
        if self.heap.is_symbol(expr) {
            env.lookup(&self.heap, expr)
        } else {
            // Everything that is not a symbol or a pair evaluates to itself.
            Ok(expr)
        }
    }

    /// Evaluate operator and operands left to right, then apply. A lambda's
    /// last body expression comes back as a tail call.
    fn eval_application(
        &mut self,
        head: Value,
        operands: Value,
        env: EnvHandle,
        depth: usize,
    ) -> Result<Application, Error> {
        let procedure = self.eval_depth(head, env, depth + 1)?;
        self.heap.push_root(procedure);

        let args_base = self.heap.root_count();
        let mut rest = operands;
        while let Some((operand, next)) = self.heap.pair(rest) {
            let arg = self.eval_depth(operand, env, depth + 1)?;
            self.heap.push_root(arg);
            rest = next;
        }
        if !rest.is_empty_list() {
            return Err(Error::BadSyntax(format!(
                "improper argument list in {}",
                self.format(operands)
            )));
        }
        let args = self.heap.roots_from(args_base).to_vec();

        if let Some(id) = self.heap.builtin(procedure) {
            return self
                .builtins
                .call(id, &mut self.heap, &args)
                .map(Application::Done);
        }

        let Some(lambda) = self.heap.lambda(procedure) else {
            return Err(Error::NotApplicable(self.format(procedure)));
        };
        let frame = EnvHandle::extend(&mut self.heap, lambda.env, lambda.params, &args)?;
        self.heap.push_root(frame.into());
        match self.eval_leading(lambda.body, frame, depth, "lambda body")? {
            Some(last) => Ok(Application::Tail(last, frame)),
            None => Err(Error::BadSyntax("lambda: empty body".to_owned())),
        }
    }

    /// Evaluate all but the last expression of `body`; return the last unevaluated.
    fn eval_leading(
        &mut self,
        body: Value,
        env: EnvHandle,
        depth: usize,
        what: &str,
    ) -> Result<Option<Value>, Error> {
        let mut rest = body;
        while let Some((expr, next)) = self.heap.pair(rest) {
            if next.is_empty_list() {
                return Ok(Some(expr));
            }
            self.eval_depth(expr, env, depth + 1)?;
            rest = next;
        }
        if rest.is_empty_list() {
            Ok(None)
        } else {
            Err(Error::BadSyntax(format!("{what}: improper expression list")))
        }
    }

    /// Operands of a special form as a vector, rejecting dotted forms.
    fn form_operands(&self, operands: Value, form: &str) -> Result<Vec<Value>, Error> {
        self.heap
            .list_to_vec(operands)
            .ok_or_else(|| Error::BadSyntax(format!("{form}: improper form")))
    }

    fn eval_quote(&self, operands: Value) -> Result<Value, Error> {
        match self.form_operands(operands, "quote")?.as_slice() {
            [datum] => Ok(*datum),
            _ => Err(Error::BadSyntax(
                "quote expects exactly one datum".to_owned(),
            )),
        }
    }

    fn eval_lambda(&mut self, operands: Value, env: EnvHandle) -> Result<Value, Error> {
        let Some((params, body)) = self.heap.pair(operands) else {
            return Err(Error::BadSyntax("lambda: missing parameter list".to_owned()));
        };
        self.make_lambda(params, body, env)
    }

    fn make_lambda(&mut self, params: Value, body: Value, env: EnvHandle) -> Result<Value, Error> {
        self.check_params(params)?;
        if !self.heap.is_pair(body) {
            return Err(Error::BadSyntax("lambda: missing body".to_owned()));
        }
        self.heap.alloc_lambda(Lambda { params, body, env })
    }

    /// Parameters must be distinct symbols: a proper list, a dotted list, or a
    /// single rest symbol.
    fn check_params(&self, params: Value) -> Result<(), Error> {
        let mut seen = Vec::new();
        let mut rest = params;
        while let Some((name, next)) = self.heap.pair(rest) {
            self.check_param(name, &seen)?;
            seen.push(name);
            rest = next;
        }
        if rest.is_empty_list() {
            Ok(())
        } else {
            self.check_param(rest, &seen)
        }
    }

    fn check_param(&self, name: Value, seen: &[Value]) -> Result<(), Error> {
        if !self.heap.is_symbol(name) {
            return Err(Error::BadSyntax(format!(
                "lambda: parameter {} is not a symbol",
                self.format(name)
            )));
        }
        if seen.contains(&name) {
            return Err(Error::BadSyntax(format!(
                "lambda: duplicate parameter {}",
                self.format(name)
            )));
        }
        Ok(())
    }

    fn eval_define(&mut self, operands: Value, env: EnvHandle, depth: usize) -> Result<Value, Error> {
        let Some((target, rest)) = self.heap.pair(operands) else {
            return Err(Error::BadSyntax("define: missing name".to_owned()));
        };

        // (define (name . params) body...)
        if let Some((name, params)) = self.heap.pair(target) {
            if !self.heap.is_symbol(name) {
                return Err(Error::BadSyntax(format!(
                    "define: {} is not a symbol",
                    self.format(name)
                )));
            }
            let procedure = self.make_lambda(params, rest, env)?;
            env.define(&mut self.heap, name, procedure)?;
            return Ok(Value::UNDEFINED);
        }

        if !self.heap.is_symbol(target) {
            return Err(Error::BadSyntax(format!(
                "define: {} is not a symbol",
                self.format(target)
            )));
        }
        let [expr] = self.form_operands(rest, "define")?[..] else {
            return Err(Error::BadSyntax(
                "define expects a name and one expression".to_owned(),
            ));
        };
        let value = self.eval_depth(expr, env, depth + 1)?;
        env.define(&mut self.heap, target, value)?;
        Ok(Value::UNDEFINED)
    }

    fn eval_set(&mut self, operands: Value, env: EnvHandle, depth: usize) -> Result<Value, Error> {
        let [name, expr] = self.form_operands(operands, "set!")?[..] else {
            return Err(Error::BadSyntax(
                "set! expects a name and one expression".to_owned(),
            ));
        };
        if !self.heap.is_symbol(name) {
            return Err(Error::BadSyntax(format!(
                "set!: {} is not a symbol",
                self.format(name)
            )));
        }
        let value = self.eval_depth(expr, env, depth + 1)?;
        env.set(&mut self.heap, name, value)?;
        Ok(Value::UNDEFINED)
    }

    fn eval_if(&mut self, operands: Value, env: EnvHandle, depth: usize) -> Result<Step, Error> {
        let (test, consequent, alternative) = match self.form_operands(operands, "if")?[..] {
            [test, consequent] => (test, consequent, None),
            [test, consequent, alternative] => (test, consequent, Some(alternative)),
            _ => {
                return Err(Error::BadSyntax(
                    "if expects a test, a consequent and an optional alternative".to_owned(),
                ));
            }
        };
        if self.eval_depth(test, env, depth + 1)?.is_truthy() {
            Ok(Step::Tail(consequent))
        } else {
            Ok(alternative.map_or(Step::Done(Value::UNDEFINED), Step::Tail))
        }
    }

    fn eval_cond(&mut self, operands: Value, env: EnvHandle, depth: usize) -> Result<Step, Error> {
        let clauses = self.form_operands(operands, "cond")?;
        for (index, &clause) in clauses.iter().enumerate() {
            let Some((test, body)) = self.heap.pair(clause) else {
                return Err(Error::BadSyntax(format!(
                    "cond: clause {} is not a non-empty list",
                    self.format(clause)
                )));
            };

            if test == self.forms.else_ {
                if index + 1 != clauses.len() {
                    return Err(Error::BadSyntax(
                        "cond: else clause must be last".to_owned(),
                    ));
                }
                return match self.eval_leading(body, env, depth, "cond")? {
                    Some(last) => Ok(Step::Tail(last)),
                    None => Err(Error::BadSyntax("cond: empty else clause".to_owned())),
                };
            }

            let value = self.eval_depth(test, env, depth + 1)?;
            if value.is_truthy() {
                return match self.eval_leading(body, env, depth, "cond")? {
                    Some(last) => Ok(Step::Tail(last)),
                    // (test) yields the test value itself
                    None => Ok(Step::Done(value)),
                };
            }
        }
        Ok(Step::Done(Value::UNDEFINED))
    }
}

enum Application {
    Done(Value),
    Tail(Value, EnvHandle),
}

fn bind_builtin(heap: &mut Heap, global: EnvHandle, name: &str, id: BuiltinId) -> Result<(), Error> {
    heap.scoped(|heap| {
        let symbol = heap.intern(name)?;
        heap.push_root(symbol);
        let procedure = heap.alloc_builtin(id)?;
        global.define(heap, symbol, procedure)
    })
}
