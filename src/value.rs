//! NaN-boxed value representation.
//!
//! Every [`Value`] is a single 64-bit word. Ordinary IEEE-754 doubles are stored
//! as-is; everything else lives inside the quiet-NaN space, with the upper 16 bits
//! acting as a type tag:
//!
//! ```text
//! 0x7FFC_0000_0000_000n   immediates: () #f #t eof undefined
//! 0x7FFD_0000_XXXX_XXXX   character (Unicode scalar value in the low 32 bits)
//! 0x7FFE_GGGG_IIII_IIII   heap object (generation G, arena index I)
//! ```
//!
//! Any NaN produced by arithmetic is canonicalized on the way in, so a computed
//! double can never be mistaken for a tagged word. Values are plain scalars:
//! copying one never touches the object it references.

use std::fmt;

const QNAN: u64 = 0x7FFC_0000_0000_0000;
const TAG_MASK: u64 = 0xFFFF_0000_0000_0000;

const TAG_IMMEDIATE: u64 = 0x7FFC_0000_0000_0000;
const TAG_CHAR: u64 = 0x7FFD_0000_0000_0000;
const TAG_OBJECT: u64 = 0x7FFE_0000_0000_0000;

const EMPTY_LIST_BITS: u64 = TAG_IMMEDIATE;
const FALSE_BITS: u64 = TAG_IMMEDIATE | 1;
const TRUE_BITS: u64 = TAG_IMMEDIATE | 2;
const EOF_BITS: u64 = TAG_IMMEDIATE | 3;
const UNDEFINED_BITS: u64 = TAG_IMMEDIATE | 4;

const INDEX_MASK: u64 = 0x0000_0000_FFFF_FFFF;
const GENERATION_SHIFT: u32 = 32;

/// Stable reference to an arena slot.
///
/// The generation distinguishes successive occupants of the same slot, so a
/// handle kept past its object's death is detected instead of silently aliasing
/// whatever was allocated there next.
///
/// The generation is 16 bits and wraps. A handle held across 65,536 reuses of
/// its slot matches again and aliases the current occupant, so hosts that keep
/// handles for a long time should pin the object with
/// [`Heap::add_root`](crate::Heap::add_root) instead of relying on staleness
/// detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub(crate) index: u32,
    pub(crate) generation: u16,
}

impl ObjectHandle {
    pub(crate) fn new(index: u32, generation: u16) -> Self {
        ObjectHandle { index, generation }
    }

    /// Arena slot index.
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u16 {
        self.generation
    }
}

/// Decoded view of a [`Value`], for matching.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Unpacked {
    Number(f64),
    Boolean(bool),
    Character(char),
    EmptyList,
    Eof,
    Undefined,
    Object(ObjectHandle),
}

/// A tagged 64-bit scalar: a double, an inline immediate, or an object reference.
///
/// Equality is bit identity, which is exactly `eq?`: two references are equal
/// when they name the same live object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    pub const EMPTY_LIST: Value = Value(EMPTY_LIST_BITS);
    pub const FALSE: Value = Value(FALSE_BITS);
    pub const TRUE: Value = Value(TRUE_BITS);
    pub const EOF: Value = Value(EOF_BITS);
    pub const UNDEFINED: Value = Value(UNDEFINED_BITS);

    #[inline]
    pub fn number(n: f64) -> Value {
        if n.is_nan() {
            Value(f64::NAN.to_bits())
        } else {
            Value(n.to_bits())
        }
    }

    #[inline]
    pub fn boolean(b: bool) -> Value {
        if b { Value::TRUE } else { Value::FALSE }
    }

    #[inline]
    pub fn character(c: char) -> Value {
        Value(TAG_CHAR | c as u64)
    }

    #[inline]
    pub fn object(handle: ObjectHandle) -> Value {
        Value(
            TAG_OBJECT
                | (u64::from(handle.generation) << GENERATION_SHIFT)
                | u64::from(handle.index),
        )
    }

    /// Raw bit pattern, mostly useful for debugging.
    pub fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_number(self) -> bool {
        (self.0 & QNAN) != QNAN
    }

    #[inline]
    pub fn is_object(self) -> bool {
        (self.0 & TAG_MASK) == TAG_OBJECT
    }

    #[inline]
    pub fn is_empty_list(self) -> bool {
        self.0 == EMPTY_LIST_BITS
    }

    /// Everything except `#f` counts as true in a test position.
    #[inline]
    pub fn is_truthy(self) -> bool {
        self.0 != FALSE_BITS
    }

    #[inline]
    pub fn as_number(self) -> Option<f64> {
        if self.is_number() {
            Some(f64::from_bits(self.0))
        } else {
            None
        }
    }

    #[inline]
    pub fn as_boolean(self) -> Option<bool> {
        match self.0 {
            TRUE_BITS => Some(true),
            FALSE_BITS => Some(false),
            _ => None,
        }
    }

    #[inline]
    pub fn as_character(self) -> Option<char> {
        if (self.0 & TAG_MASK) == TAG_CHAR {
            char::from_u32((self.0 & INDEX_MASK) as u32)
        } else {
            None
        }
    }

    #[inline]
    pub fn as_object(self) -> Option<ObjectHandle> {
        if self.is_object() {
            let index = (self.0 & INDEX_MASK) as u32;
            let generation = ((self.0 & !TAG_MASK) >> GENERATION_SHIFT) as u16;
            Some(ObjectHandle::new(index, generation))
        } else {
            None
        }
    }

    /// Decode into the closed sum type.
    pub fn unpack(self) -> Unpacked {
        if self.is_number() {
            return Unpacked::Number(f64::from_bits(self.0));
        }
        match self.0 & TAG_MASK {
            TAG_OBJECT => match self.as_object() {
                Some(handle) => Unpacked::Object(handle),
                None => Unpacked::Undefined,
            },
            TAG_CHAR => match self.as_character() {
                Some(c) => Unpacked::Character(c),
                None => Unpacked::Undefined,
            },
            _ => match self.0 {
                EMPTY_LIST_BITS => Unpacked::EmptyList,
                FALSE_BITS => Unpacked::Boolean(false),
                TRUE_BITS => Unpacked::Boolean(true),
                EOF_BITS => Unpacked::Eof,
                _ => Unpacked::Undefined,
            },
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::UNDEFINED
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unpack() {
            Unpacked::Number(n) => write!(f, "Number({n})"),
            Unpacked::Boolean(b) => write!(f, "Boolean({b})"),
            Unpacked::Character(c) => write!(f, "Character({c:?})"),
            Unpacked::EmptyList => write!(f, "EmptyList"),
            Unpacked::Eof => write!(f, "Eof"),
            Unpacked::Undefined => write!(f, "Undefined"),
            Unpacked::Object(h) => write!(f, "Object(#{}@{})", h.index, h.generation),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::character(c)
    }
}

impl From<ObjectHandle> for Value {
    fn from(handle: ObjectHandle) -> Self {
        Value::object(handle)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::number(f64::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);
