//! External representation of values.
//!
//! [`Heap::printer`] renders the way `write` does: strings are quoted with
//! control characters escaped, characters use `#\` syntax. [`Printed::plain`]
//! switches to `display` style, which emits string and character contents raw.

use std::fmt;

use crate::heap::{Heap, Object};
use crate::value::{Unpacked, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Style {
    Write,
    Display,
}

/// A value paired with the heap it lives in, ready for formatting.
#[derive(Clone, Copy)]
pub struct Printed<'a> {
    heap: &'a Heap,
    value: Value,
    style: Style,
}

impl Heap {
    pub fn printer(&self, value: Value) -> Printed<'_> {
        Printed {
            heap: self,
            value,
            style: Style::Write,
        }
    }
}

impl Printed<'_> {
    /// Render without quoting strings or characters.
    pub fn plain(mut self) -> Self {
        self.style = Style::Display;
        self
    }
}

/// Pending output while walking a value. Nested lists expand onto this stack
/// rather than the call stack.
enum Pending {
    Value(Value),
    /// Remainder of a list whose first `printed` elements are already out
    Rest { rest: Value, printed: usize },
    Close,
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        write!(f, "+nan.0")
    } else if n.is_infinite() {
        write!(f, "{}inf.0", if n > 0.0 { "+" } else { "-" })
    } else {
        write!(f, "{n}")
    }
}

fn write_escaped_string(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in text.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c if c.is_control() => write!(f, "\\x{:x};", u32::from(c))?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

pub(crate) fn character_name(c: char) -> Option<&'static str> {
    match c {
        ' ' => Some("space"),
        '\n' => Some("newline"),
        '\t' => Some("tab"),
        '\r' => Some("return"),
        '\0' => Some("null"),
        _ => None,
    }
}

impl Printed<'_> {
    fn fmt_atom(&self, f: &mut fmt::Formatter<'_>, value: Value) -> fmt::Result {
        match value.unpack() {
            Unpacked::Number(n) => write_number(f, n),
            Unpacked::Boolean(b) => write!(f, "{}", if b { "#t" } else { "#f" }),
            Unpacked::Character(c) => match (self.style, character_name(c)) {
                (Style::Display, _) => write!(f, "{c}"),
                (Style::Write, Some(name)) => write!(f, "#\\{name}"),
                (Style::Write, None) => write!(f, "#\\{c}"),
            },
            Unpacked::EmptyList => write!(f, "()"),
            Unpacked::Eof => write!(f, "#<eof>"),
            Unpacked::Undefined => write!(f, "#<undefined>"),
            Unpacked::Object(handle) => match self.heap.get(handle) {
                None | Some(Object::Free) => write!(f, "#<stale #{}>", handle.index()),
                // Pairs are expanded by the caller.
                Some(Object::Pair { .. }) => write!(f, "<pair>"),
                Some(Object::Symbol(name)) => write!(f, "{name}"),
                Some(Object::String(text)) => match self.style {
                    Style::Write => write_escaped_string(f, text),
                    Style::Display => write!(f, "{text}"),
                },
                Some(Object::Lambda(_)) => write!(f, "<lambda>"),
                Some(Object::Builtin(_)) => write!(f, "<builtin>"),
                Some(Object::Port(_)) => write!(f, "<port>"),
                Some(Object::Window(_)) => write!(f, "<window>"),
                Some(Object::Event(_)) => write!(f, "<event>"),
                Some(Object::Frame(_)) => write!(f, "<environment>"),
            },
        }
    }
}

impl fmt::Display for Printed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending = vec![Pending::Value(self.value)];
        while let Some(item) = pending.pop() {
            match item {
                Pending::Value(value) => match self.heap.pair(value) {
                    Some((car, cdr)) => {
                        write!(f, "(")?;
                        pending.push(Pending::Rest {
                            rest: cdr,
                            printed: 1,
                        });
                        pending.push(Pending::Value(car));
                    }
                    None => self.fmt_atom(f, value)?,
                },
                Pending::Rest { rest, printed } => {
                    if let Some((car, cdr)) = self.heap.pair(rest) {
                        if printed > self.heap.capacity() {
                            // Only reachable through a cycle.
                            write!(f, " ...)")?;
                            continue;
                        }
                        write!(f, " ")?;
                        pending.push(Pending::Rest {
                            rest: cdr,
                            printed: printed + 1,
                        });
                        pending.push(Pending::Value(car));
                    } else if rest.is_empty_list() {
                        write!(f, ")")?;
                    } else {
                        write!(f, " . ")?;
                        pending.push(Pending::Close);
                        pending.push(Pending::Value(rest));
                    }
                }
                Pending::Close => write!(f, ")")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Printed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Printed({self})")
    }
}
