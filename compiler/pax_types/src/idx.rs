//! Type index handle.
//!
//! `Idx` is the only handle the lowering passes use to talk about types.
//! All types live in a [`Pool`](crate::Pool) and are referenced by their
//! 32-bit index, so type equality is index equality.
//!
//! Builtin types that the pack lowering emits directly (machine words,
//! 1-bit booleans, pack indices) are pre-interned at fixed indices.

use std::fmt;

/// A 32-bit index into the type pool.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Idx(u32);

impl Idx {
    // === Primitive Types (indices 0-6) ===

    /// The source-level `Int` type.
    pub const INT: Self = Self(0);
    /// The source-level `Bool` type.
    pub const BOOL: Self = Self(1);
    /// The source-level `String` type (non-trivial: owns a buffer).
    pub const STR: Self = Self(2);
    /// The unit type `()`.
    pub const UNIT: Self = Self(3);
    /// Builtin machine word, used for pack loop counters and lengths.
    pub const WORD: Self = Self(4);
    /// Builtin 1-bit integer, the result of `cmp_eq`.
    pub const INT1: Self = Self(5);
    /// Builtin pack index, the result of the `*_pack_index` instructions.
    pub const PACK_INDEX: Self = Self(6);

    /// Number of pre-interned primitive types.
    pub const PRIMITIVE_COUNT: u32 = 7;

    /// Create an index from a raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into the pool).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is a primitive type (pre-interned).
    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::PRIMITIVE_COUNT
    }

    /// Get the human-readable name for primitive types.
    #[inline]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("Int"),
            1 => Some("Bool"),
            2 => Some("String"),
            3 => Some("()"),
            4 => Some("Builtin.Word"),
            5 => Some("Builtin.Int1"),
            6 => Some("Builtin.PackIndex"),
            _ => None,
        }
    }
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::INT => write!(f, "Idx::INT"),
            Self::BOOL => write!(f, "Idx::BOOL"),
            Self::STR => write!(f, "Idx::STR"),
            Self::UNIT => write!(f, "Idx::UNIT"),
            Self::WORD => write!(f, "Idx::WORD"),
            Self::INT1 => write!(f, "Idx::INT1"),
            Self::PACK_INDEX => write!(f, "Idx::PACK_INDEX"),
            _ => write!(f, "Idx({})", self.0),
        }
    }
}

impl fmt::Display for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "type#{}", self.0),
        }
    }
}

const _: () = assert!(std::mem::size_of::<Idx>() == 4);
