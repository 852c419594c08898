//! Fixed-capacity object arena.
//!
//! The heap is a preallocated vector of slots. Unallocated slots are threaded
//! into an intrusive free list through their headers; allocation pops the head in
//! O(1). There is no growth and no compaction, so a handle stays valid (and
//! points at the same object) for as long as that object is alive. When the free
//! list runs dry the allocator runs a collection first and only reports
//! [`Error::OutOfMemory`] if that frees nothing.
//!
//! The heap also owns the root set the collector starts from:
//!
//! - a shadow stack of evaluator temporaries, pushed and truncated in LIFO order
//! - host-pinned roots, registered with [`Heap::add_root`] and released with
//!   [`Heap::remove_root`]

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::Error;
use crate::environment::{EnvHandle, Frame};
use crate::value::{ObjectHandle, Value};

/// Opaque identifier of a builtin procedure, indexing the dispatcher's table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BuiltinId(pub(crate) u32);

impl BuiltinId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Host-owned native payload (window or renderer handles, event records).
///
/// The runtime never inspects these. Dropping the box releases whatever the
/// implementation holds; that happens exactly once, when the collector sweeps
/// the owning object.
pub trait NativeResource: fmt::Debug {
    fn describe(&self) -> &str;
}

/// A closure: parameter list, body forms, and the frame it was created in.
///
/// The captured environment is shared, not owned. Only reachability keeps it
/// alive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lambda {
    pub params: Value,
    /// List of body expressions, evaluated in order
    pub body: Value,
    pub env: EnvHandle,
}

/// I/O port object.
#[derive(Debug)]
pub enum Port {
    Stdin,
    Stdout,
    Stderr,
    /// In-memory output port
    OutputString(String),
    OutputFile(BufWriter<File>),
    Closed,
}

impl Port {
    /// Standard streams are never closed by the runtime.
    pub fn is_standard(&self) -> bool {
        matches!(self, Port::Stdin | Port::Stdout | Port::Stderr)
    }

    pub fn write_str(&mut self, text: &str) -> io::Result<()> {
        match self {
            Port::Stdout => io::stdout().write_all(text.as_bytes()),
            Port::Stderr => io::stderr().write_all(text.as_bytes()),
            Port::OutputString(buffer) => {
                buffer.push_str(text);
                Ok(())
            }
            Port::OutputFile(writer) => writer.write_all(text.as_bytes()),
            Port::Stdin | Port::Closed => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "port is not open for output",
            )),
        }
    }

    /// Flush and release the underlying stream. Standard streams stay open.
    pub fn close(&mut self) -> io::Result<()> {
        if self.is_standard() {
            return Ok(());
        }
        if let Port::OutputFile(writer) = self {
            writer.flush()?;
        }
        *self = Port::Closed;
        Ok(())
    }
}

/// Heap-resident object kinds.
#[derive(Debug)]
pub enum Object {
    /// Unallocated slot
    Free,
    Pair {
        car: Value,
        cdr: Value,
    },
    Symbol(Box<str>),
    String(String),
    Lambda(Lambda),
    Builtin(BuiltinId),
    Port(Port),
    Window(Box<dyn NativeResource>),
    Event(Box<dyn NativeResource>),
    /// Environment frame
    Frame(Frame),
}

impl Object {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::Free => "free",
            Object::Pair { .. } => "pair",
            Object::Symbol(_) => "symbol",
            Object::String(_) => "string",
            Object::Lambda(_) => "lambda",
            Object::Builtin(_) => "builtin",
            Object::Port(_) => "port",
            Object::Window(_) => "window",
            Object::Event(_) => "event",
            Object::Frame(_) => "environment",
        }
    }

    /// Push every value this object references onto `out`.
    pub(crate) fn references(&self, out: &mut Vec<Value>) {
        match self {
            Object::Pair { car, cdr } => {
                out.push(*car);
                out.push(*cdr);
            }
            Object::Lambda(lambda) => {
                out.push(lambda.params);
                out.push(lambda.body);
                out.push(lambda.env.into());
            }
            Object::Frame(frame) => {
                if let Some(parent) = frame.parent {
                    out.push(parent.into());
                }
                for (name, value) in &frame.bindings {
                    out.push(*name);
                    out.push(*value);
                }
            }
            Object::Free
            | Object::Symbol(_)
            | Object::String(_)
            | Object::Builtin(_)
            | Object::Port(_)
            | Object::Window(_)
            | Object::Event(_) => {}
        }
    }
}

/// Slot header plus payload.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) marked: bool,
    /// Free-list link, only meaningful while the slot is free
    pub(crate) next_free: Option<u32>,
    pub(crate) generation: u16,
    pub(crate) object: Object,
}

/// Identifies a host-pinned root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootId(usize);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    pub allocations: usize,
    /// Slots reclaimed across all collections
    pub reclaimed: usize,
    /// Live slots after the most recent collection
    pub live_after_last: usize,
}

pub struct Heap {
    pub(crate) slots: Vec<Slot>,
    pub(crate) free_head: Option<u32>,
    pub(crate) free_count: usize,
    /// Evaluator temporaries
    pub(crate) stack: Vec<Value>,
    pub(crate) pinned: Vec<Option<Value>>,
    /// Intern table. Entries are weak: the sweep removes symbols it frees.
    pub(crate) symbols: HashMap<Box<str>, ObjectHandle>,
    pub stats: GcStats,
}

impl Heap {
    /// Create a heap with room for `capacity` objects (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, u32::MAX as usize);
        let slots = (0..capacity)
            .map(|i| Slot {
                marked: false,
                next_free: if i + 1 < capacity {
                    Some((i + 1) as u32)
                } else {
                    None
                },
                generation: 0,
                object: Object::Free,
            })
            .collect();

        Heap {
            slots,
            free_head: Some(0),
            free_count: capacity,
            stack: Vec::new(),
            pinned: Vec::new(),
            symbols: HashMap::new(),
            stats: GcStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn live_count(&self) -> usize {
        self.capacity() - self.free_count
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    /// Place `object` in a free slot.
    ///
    /// Collects first if the free list is empty. The payload's own references
    /// count as roots for that collection, so callers can pass freshly computed
    /// values without rooting them separately.
    pub fn allocate(&mut self, object: Object) -> Result<ObjectHandle, Error> {
        if self.free_head.is_none() {
            let mut payload_roots = Vec::new();
            object.references(&mut payload_roots);
            self.collect(&payload_roots);
        }

        let Some(index) = self.free_head else {
            tracing::error!(
                capacity = self.capacity(),
                kind = object.kind_name(),
                "object heap exhausted"
            );
            return Err(Error::OutOfMemory);
        };

        let slot = &mut self.slots[index as usize];
        self.free_head = slot.next_free.take();
        slot.object = object;
        self.free_count -= 1;
        self.stats.allocations += 1;
        Ok(ObjectHandle::new(index, slot.generation))
    }

    pub fn cons(&mut self, car: Value, cdr: Value) -> Result<Value, Error> {
        self.allocate(Object::Pair { car, cdr }).map(Value::from)
    }

    /// Return the unique symbol with this name, allocating it on first use.
    pub fn intern(&mut self, name: &str) -> Result<Value, Error> {
        if let Some(&handle) = self.symbols.get(name) {
            return Ok(handle.into());
        }
        let handle = self.allocate(Object::Symbol(name.into()))?;
        self.symbols.insert(name.into(), handle);
        Ok(handle.into())
    }

    pub fn alloc_string(&mut self, text: impl Into<String>) -> Result<Value, Error> {
        self.allocate(Object::String(text.into())).map(Value::from)
    }

    pub fn alloc_lambda(&mut self, lambda: Lambda) -> Result<Value, Error> {
        self.allocate(Object::Lambda(lambda)).map(Value::from)
    }

    pub fn alloc_builtin(&mut self, id: BuiltinId) -> Result<Value, Error> {
        self.allocate(Object::Builtin(id)).map(Value::from)
    }

    pub fn alloc_port(&mut self, port: Port) -> Result<Value, Error> {
        self.allocate(Object::Port(port)).map(Value::from)
    }

    pub fn alloc_window(&mut self, window: Box<dyn NativeResource>) -> Result<Value, Error> {
        self.allocate(Object::Window(window)).map(Value::from)
    }

    pub fn alloc_event(&mut self, event: Box<dyn NativeResource>) -> Result<Value, Error> {
        self.allocate(Object::Event(event)).map(Value::from)
    }

    /// Build a proper list from `items`.
    pub fn list(&mut self, items: &[Value]) -> Result<Value, Error> {
        self.list_with_tail(items, Value::EMPTY_LIST)
    }

    /// Build `(items... . tail)`.
    pub fn list_with_tail(&mut self, items: &[Value], tail: Value) -> Result<Value, Error> {
        self.scoped(|heap| {
            // Items not yet consed are only reachable through the caller's slice.
            for &item in items {
                heap.push_root(item);
            }
            let mut acc = tail;
            for &item in items.iter().rev() {
                acc = heap.cons(item, acc)?;
            }
            Ok(acc)
        })
    }

    // -----------------------------------------------------------------------
    // Access
    // -----------------------------------------------------------------------

    /// Resolve a handle. Stale handles and free slots yield `None`.
    pub fn get(&self, handle: ObjectHandle) -> Option<&Object> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation || matches!(slot.object, Object::Free) {
            return None;
        }
        Some(&slot.object)
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut Object> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation || matches!(slot.object, Object::Free) {
            return None;
        }
        Some(&mut slot.object)
    }

    pub fn object(&self, value: Value) -> Option<&Object> {
        self.get(value.as_object()?)
    }

    pub fn object_mut(&mut self, value: Value) -> Option<&mut Object> {
        self.get_mut(value.as_object()?)
    }

    pub fn is_live(&self, value: Value) -> bool {
        self.object(value).is_some()
    }

    pub fn pair(&self, value: Value) -> Option<(Value, Value)> {
        match self.object(value)? {
            Object::Pair { car, cdr } => Some((*car, *cdr)),
            _ => None,
        }
    }

    pub fn car(&self, value: Value) -> Option<Value> {
        self.pair(value).map(|(car, _)| car)
    }

    pub fn cdr(&self, value: Value) -> Option<Value> {
        self.pair(value).map(|(_, cdr)| cdr)
    }

    pub fn is_pair(&self, value: Value) -> bool {
        self.pair(value).is_some()
    }

    pub fn symbol_name(&self, value: Value) -> Option<&str> {
        match self.object(value)? {
            Object::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_symbol(&self, value: Value) -> bool {
        self.symbol_name(value).is_some()
    }

    pub fn string(&self, value: Value) -> Option<&str> {
        match self.object(value)? {
            Object::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn lambda(&self, value: Value) -> Option<Lambda> {
        match self.object(value)? {
            Object::Lambda(lambda) => Some(*lambda),
            _ => None,
        }
    }

    pub fn builtin(&self, value: Value) -> Option<BuiltinId> {
        match self.object(value)? {
            Object::Builtin(id) => Some(*id),
            _ => None,
        }
    }

    pub fn port_mut(&mut self, value: Value) -> Option<&mut Port> {
        match self.object_mut(value)? {
            Object::Port(port) => Some(port),
            _ => None,
        }
    }

    /// Collect the elements of a proper list. Improper or cyclic lists yield `None`.
    pub fn list_to_vec(&self, mut list: Value) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        while !list.is_empty_list() {
            if items.len() > self.capacity() {
                return None;
            }
            let (car, cdr) = self.pair(list)?;
            items.push(car);
            list = cdr;
        }
        Some(items)
    }

    // -----------------------------------------------------------------------
    // Roots
    // -----------------------------------------------------------------------

    pub fn push_root(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Overwrite a shadow-stack entry pushed earlier.
    pub fn set_root(&mut self, position: usize, value: Value) {
        if let Some(slot) = self.stack.get_mut(position) {
            *slot = value;
        }
    }

    pub fn root_count(&self) -> usize {
        self.stack.len()
    }

    pub fn truncate_roots(&mut self, len: usize) {
        self.stack.truncate(len);
    }

    pub fn roots_from(&self, start: usize) -> &[Value] {
        self.stack.get(start..).unwrap_or(&[])
    }

    /// Run `f`, then drop every shadow-stack entry it pushed.
    pub fn scoped<T>(&mut self, f: impl FnOnce(&mut Heap) -> T) -> T {
        let base = self.stack.len();
        let result = f(self);
        self.stack.truncate(base);
        result
    }

    /// Pin `value` until [`Heap::remove_root`] is called with the returned id.
    pub fn add_root(&mut self, value: Value) -> RootId {
        if let Some(index) = self.pinned.iter().position(Option::is_none) {
            self.pinned[index] = Some(value);
            return RootId(index);
        }
        self.pinned.push(Some(value));
        RootId(self.pinned.len() - 1)
    }

    pub fn remove_root(&mut self, id: RootId) {
        if let Some(slot) = self.pinned.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Replace a pinned root's value.
    pub fn update_root(&mut self, id: RootId, value: Value) {
        if let Some(slot) = self.pinned.get_mut(id.0) {
            *slot = Some(value);
        }
    }

    /// Forget every root, pinned or temporary.
    pub fn clear_roots(&mut self) {
        self.stack.clear();
        self.pinned.clear();
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("capacity", &self.capacity())
            .field("free", &self.free_count)
            .field("stack_roots", &self.stack.len())
            .field("pinned_roots", &self.pinned.iter().flatten().count())
            .field("symbols", &self.symbols.len())
            .field("stats", &self.stats)
            .finish()
    }
}
