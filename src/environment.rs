//! Environment frames.
//!
//! A frame is an arena object holding an ordered list of `(symbol, value)`
//! bindings and an optional parent. Frames chain outward to the global frame,
//! which has no parent. Like every other object, a frame lives exactly as long as
//! it is reachable: from the evaluator's current environment, from a closure that
//! captured it, or from a child frame.

use crate::heap::{Heap, Object};
use crate::value::{ObjectHandle, Value};
use crate::{Arity, Error};

/// One level of variable bindings.
#[derive(Debug, Default)]
pub struct Frame {
    pub(crate) parent: Option<EnvHandle>,
    pub(crate) bindings: Vec<(Value, Value)>,
}

impl Frame {
    pub fn parent(&self) -> Option<EnvHandle> {
        self.parent
    }

    pub fn bindings(&self) -> &[(Value, Value)] {
        &self.bindings
    }

    fn slot(&mut self, name: Value) -> Option<&mut Value> {
        self.bindings
            .iter_mut()
            .find(|(bound, _)| *bound == name)
            .map(|(_, value)| value)
    }
}

/// Handle to a [`Frame`] object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EnvHandle(ObjectHandle);

impl From<EnvHandle> for Value {
    fn from(env: EnvHandle) -> Self {
        Value::object(env.0)
    }
}

impl EnvHandle {
    /// Allocate a parentless frame. The caller decides how it stays rooted.
    pub fn new_global(heap: &mut Heap) -> Result<EnvHandle, Error> {
        EnvHandle::allocate(heap, Frame::default())
    }

    fn allocate(heap: &mut Heap, frame: Frame) -> Result<EnvHandle, Error> {
        heap.allocate(Object::Frame(frame)).map(EnvHandle)
    }

    /// Reinterpret a value as a frame handle, if it refers to a live frame.
    pub fn from_value(heap: &Heap, value: Value) -> Option<EnvHandle> {
        match heap.object(value)? {
            Object::Frame(_) => value.as_object().map(EnvHandle),
            _ => None,
        }
    }

    pub fn handle(self) -> ObjectHandle {
        self.0
    }

    pub fn frame(self, heap: &Heap) -> Result<&Frame, Error> {
        match heap.get(self.0) {
            Some(Object::Frame(frame)) => Ok(frame),
            _ => Err(stale_frame()),
        }
    }

    fn frame_mut(self, heap: &mut Heap) -> Result<&mut Frame, Error> {
        match heap.get_mut(self.0) {
            Some(Object::Frame(frame)) => Ok(frame),
            _ => Err(stale_frame()),
        }
    }

    pub fn parent(self, heap: &Heap) -> Result<Option<EnvHandle>, Error> {
        Ok(self.frame(heap)?.parent)
    }

    /// Find the value bound to `name`, searching this frame and then its ancestors.
    pub fn lookup(self, heap: &Heap, name: Value) -> Result<Value, Error> {
        let mut current = Some(self);
        while let Some(env) = current {
            let frame = env.frame(heap)?;
            if let Some((_, value)) = frame.bindings.iter().find(|(bound, _)| *bound == name) {
                return Ok(*value);
            }
            current = frame.parent;
        }
        Err(unbound(heap, name))
    }

    /// Bind `name` in this frame, replacing an existing binding in this frame only.
    pub fn define(self, heap: &mut Heap, name: Value, value: Value) -> Result<(), Error> {
        let frame = self.frame_mut(heap)?;
        match frame.slot(name) {
            Some(slot) => *slot = value,
            None => frame.bindings.push((name, value)),
        }
        Ok(())
    }

    /// Mutate the nearest existing binding of `name`. Never creates a binding.
    pub fn set(self, heap: &mut Heap, name: Value, value: Value) -> Result<(), Error> {
        let mut current = Some(self);
        while let Some(env) = current {
            let frame = env.frame_mut(heap)?;
            if let Some(slot) = frame.slot(name) {
                *slot = value;
                return Ok(());
            }
            current = frame.parent;
        }
        Err(unbound(heap, name))
    }

    /// Create a child of `parent` binding `params` to `args`.
    ///
    /// `params` is a proper list of symbols, a single symbol receiving every
    /// argument as a list, or a dotted list whose tail symbol receives the rest.
    pub fn extend(
        heap: &mut Heap,
        parent: EnvHandle,
        params: Value,
        args: &[Value],
    ) -> Result<EnvHandle, Error> {
        let mut bindings = Vec::new();
        let mut remaining = params;
        let mut fixed = 0;

        while let Some((name, rest)) = heap.pair(remaining) {
            let Some(&arg) = args.get(fixed) else {
                return Err(Error::arity_mismatch(
                    arity_of(heap, params, fixed),
                    args.len(),
                ));
            };
            bindings.push((name, arg));
            fixed += 1;
            remaining = rest;
        }

        if remaining.is_empty_list() {
            if args.len() != fixed {
                return Err(Error::arity_mismatch(Arity::Exact(fixed), args.len()));
            }
        } else if heap.is_symbol(remaining) {
            // The rest list is built before the frame exists, so the values
            // bound so far must stay reachable through the shadow stack.
            let rest = heap.scoped(|heap| {
                for (name, value) in &bindings {
                    heap.push_root(*name);
                    heap.push_root(*value);
                }
                heap.push_root(params);
                heap.push_root(parent.into());
                heap.list(&args[fixed..])
            })?;
            bindings.push((remaining, rest));
        } else {
            return Err(Error::BadSyntax(
                "lambda parameters must be symbols".to_owned(),
            ));
        }

        tracing::trace!(bindings = bindings.len(), "extending environment");
        EnvHandle::allocate(
            heap,
            Frame {
                parent: Some(parent),
                bindings,
            },
        )
    }
}

/// Arity implied by a parameter list, counting at least `seen` fixed params.
fn arity_of(heap: &Heap, params: Value, seen: usize) -> Arity {
    let mut fixed = seen;
    let mut remaining = params;
    let mut count = 0;
    while let Some((_, rest)) = heap.pair(remaining) {
        count += 1;
        remaining = rest;
    }
    fixed = fixed.max(count);
    if remaining.is_empty_list() {
        Arity::Exact(fixed)
    } else {
        Arity::AtLeast(fixed)
    }
}

fn unbound(heap: &Heap, name: Value) -> Error {
    let name = heap
        .symbol_name(name)
        .map_or_else(|| format!("{name:?}"), str::to_owned);
    Error::UnboundVariable(name)
}

fn stale_frame() -> Error {
    Error::EvalError("environment frame is no longer live".to_owned())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    struct Fixture {
        heap: Heap,
        global: EnvHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let mut heap = Heap::new(64);
            let global = EnvHandle::new_global(&mut heap).unwrap();
            heap.add_root(global.into());
            Fixture { heap, global }
        }

        fn sym(&mut self, name: &str) -> Value {
            let symbol = self.heap.intern(name).unwrap();
            self.heap.add_root(symbol);
            symbol
        }
    }

    #[test]
    fn test_define_then_lookup() {
        let mut fx = Fixture::new();
        let x = fx.sym("x");
        fx.global.define(&mut fx.heap, x, Value::from(1)).unwrap();
        assert_eq!(fx.global.lookup(&fx.heap, x), Ok(Value::from(1)));

        // Redefinition replaces in place.
        fx.global.define(&mut fx.heap, x, Value::from(2)).unwrap();
        assert_eq!(fx.global.lookup(&fx.heap, x), Ok(Value::from(2)));
        assert_eq!(fx.global.frame(&fx.heap).unwrap().bindings().len(), 1);
    }

    #[test]
    fn test_lookup_unbound() {
        let mut fx = Fixture::new();
        let y = fx.sym("y");
        assert_eq!(
            fx.global.lookup(&fx.heap, y),
            Err(Error::UnboundVariable("y".into()))
        );
    }

    #[test]
    fn test_set_on_unbound_fails_without_creating() {
        let mut fx = Fixture::new();
        let y = fx.sym("y");
        assert_eq!(
            fx.global.set(&mut fx.heap, y, Value::from(5)),
            Err(Error::UnboundVariable("y".into()))
        );
        assert!(fx.global.lookup(&fx.heap, y).is_err());
    }

    #[test]
    fn test_set_mutates_parent_binding() {
        let mut fx = Fixture::new();
        let x = fx.sym("x");
        fx.global.define(&mut fx.heap, x, Value::from(1)).unwrap();

        let child = EnvHandle::extend(&mut fx.heap, fx.global, Value::EMPTY_LIST, &[]).unwrap();
        child.set(&mut fx.heap, x, Value::from(10)).unwrap();

        assert_eq!(fx.global.lookup(&fx.heap, x), Ok(Value::from(10)));
        assert_eq!(child.lookup(&fx.heap, x), Ok(Value::from(10)));
        assert!(child.frame(&fx.heap).unwrap().bindings().is_empty());
    }

    #[test]
    fn test_define_in_child_shadows() {
        let mut fx = Fixture::new();
        let x = fx.sym("x");
        fx.global.define(&mut fx.heap, x, Value::from(1)).unwrap();

        let child = EnvHandle::extend(&mut fx.heap, fx.global, Value::EMPTY_LIST, &[]).unwrap();
        child.define(&mut fx.heap, x, Value::from(2)).unwrap();

        assert_eq!(child.lookup(&fx.heap, x), Ok(Value::from(2)));
        assert_eq!(fx.global.lookup(&fx.heap, x), Ok(Value::from(1)));
    }

    #[test]
    fn test_extend_fixed_params() {
        let mut fx = Fixture::new();
        let (x, y) = (fx.sym("x"), fx.sym("y"));
        let params = fx.heap.list(&[x, y]).unwrap();
        fx.heap.add_root(params);

        let env =
            EnvHandle::extend(&mut fx.heap, fx.global, params, &[Value::from(3), Value::from(4)])
                .unwrap();
        assert_eq!(env.lookup(&fx.heap, x), Ok(Value::from(3)));
        assert_eq!(env.lookup(&fx.heap, y), Ok(Value::from(4)));
        assert_eq!(env.parent(&fx.heap), Ok(Some(fx.global)));
    }

    #[test]
    fn test_extend_arity_mismatch() {
        let mut fx = Fixture::new();
        let (x, y) = (fx.sym("x"), fx.sym("y"));
        let params = fx.heap.list(&[x, y]).unwrap();
        fx.heap.add_root(params);

        let test_cases = vec![
            (vec![], Error::arity_mismatch(Arity::Exact(2), 0)),
            (vec![Value::from(1)], Error::arity_mismatch(Arity::Exact(2), 1)),
            (
                vec![Value::from(1), Value::from(2), Value::from(3)],
                Error::arity_mismatch(Arity::Exact(2), 3),
            ),
        ];
        for (i, (args, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(
                EnvHandle::extend(&mut fx.heap, fx.global, params, &args),
                Err(expected),
                "Test case {} failed",
                i + 1
            );
        }
    }

    #[test]
    fn test_extend_rest_params() {
        let mut fx = Fixture::new();
        let (a, rest) = (fx.sym("a"), fx.sym("rest"));
        let dotted = fx.heap.list_with_tail(&[a], rest).unwrap();
        fx.heap.add_root(dotted);

        let env = EnvHandle::extend(
            &mut fx.heap,
            fx.global,
            dotted,
            &[Value::from(1), Value::from(2), Value::from(3)],
        )
        .unwrap();
        assert_eq!(env.lookup(&fx.heap, a), Ok(Value::from(1)));
        let rest_value = env.lookup(&fx.heap, rest).unwrap();
        assert_eq!(
            fx.heap.list_to_vec(rest_value),
            Some(vec![Value::from(2), Value::from(3)])
        );

        assert_eq!(
            EnvHandle::extend(&mut fx.heap, fx.global, dotted, &[]),
            Err(Error::arity_mismatch(Arity::AtLeast(1), 0))
        );

        // A bare symbol collects everything.
        let env = EnvHandle::extend(&mut fx.heap, fx.global, rest, &[]).unwrap();
        assert_eq!(env.lookup(&fx.heap, rest), Ok(Value::EMPTY_LIST));
    }
}
