//! Structural type data stored in the pool.

use std::fmt;

use crate::Idx;

/// Reduced-shape class of a pack archetype.
///
/// Two pack archetypes whose shapes are equal are guaranteed by the type
/// checker to have the same length at runtime, so a loop over one of them
/// can address elements of the other with the same index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Shape(u32);

impl Shape {
    /// Create a shape from a raw value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape{}", self.0)
    }
}

/// Opened element environment ID.
///
/// An element environment substitutes the pack archetypes of one reduced
/// shape with per-iteration element archetypes. It is opened at runtime by
/// `open_pack_element` with the current pack index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EnvId(u32);

impl EnvId {
    /// Create an environment ID from a raw value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize`.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env{}", self.0)
    }
}

/// Structural description of an interned type.
///
/// Compound variants refer to their children by [`Idx`], so every variant
/// is cheap to hash for interning.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    Int,
    Bool,
    Str,
    Unit,
    Word,
    Int1,
    PackIndex,

    /// A named type, optionally applied to arguments.
    ///
    /// `trivial` is the declaration's own triviality; an applied nominal is
    /// trivial only if its arguments are as well.
    Nominal {
        name: String,
        args: Vec<Idx>,
        trivial: bool,
    },

    /// A type parameter standing for an unknown pack of types (`each T`).
    PackArchetype { name: String, shape: Shape },

    /// The per-iteration element archetype of `pack` inside an opened
    /// element environment.
    ElementArchetype { env: EnvId, pack: Idx },

    /// A pack expansion component `pattern...`, repeated once per element
    /// of the `count` pack archetype.
    Expansion { pattern: Idx, count: Idx },

    /// A formal pack type: an ordered list of scalar and expansion
    /// components.
    Pack(Vec<Idx>),

    /// A lowered pack type, as carried by pack addresses in the IR.
    LoweredPack(Vec<Idx>),

    /// A tuple type. Expansion components occupy `len(count)` slots.
    Tuple(Vec<Idx>),
}
