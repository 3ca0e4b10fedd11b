//! Type construction helpers for the Pool.

use crate::{Idx, Pool, Shape, TypeData};

impl Pool {
    // === Named Types ===

    /// Create a nominal type with no arguments.
    pub fn named(&mut self, name: &str, trivial: bool) -> Idx {
        self.nominal(name, &[], trivial)
    }

    /// Create a nominal type applied to `args`.
    pub fn nominal(&mut self, name: &str, args: &[Idx], trivial: bool) -> Idx {
        self.intern(TypeData::Nominal {
            name: name.to_owned(),
            args: args.to_vec(),
            trivial,
        })
    }

    // === Packs ===

    /// Create a pack archetype with the given reduced shape.
    pub fn pack_archetype(&mut self, name: &str, shape: Shape) -> Idx {
        self.intern(TypeData::PackArchetype {
            name: name.to_owned(),
            shape,
        })
    }

    /// Create a pack archetype in a fresh reduced-shape class.
    pub fn fresh_pack_archetype(&mut self, name: &str) -> Idx {
        let shape = self.fresh_shape();
        self.pack_archetype(name, shape)
    }

    /// Create a pack expansion `pattern...` counted by `count`.
    ///
    /// # Panics
    ///
    /// Debug-panics if `count` is not a pack archetype.
    pub fn expansion(&mut self, pattern: Idx, count: Idx) -> Idx {
        debug_assert!(
            self.archetype_shape(count).is_some(),
            "expansion count must be a pack archetype, found {:?}",
            self.data(count)
        );
        self.intern(TypeData::Expansion { pattern, count })
    }

    /// Create a formal pack type from its components.
    pub fn pack(&mut self, components: &[Idx]) -> Idx {
        self.intern(TypeData::Pack(components.to_vec()))
    }

    // === Tuples ===

    /// Create a tuple type. Empty tuples return `Idx::UNIT`.
    pub fn tuple(&mut self, components: &[Idx]) -> Idx {
        if components.is_empty() {
            return Idx::UNIT;
        }
        self.intern(TypeData::Tuple(components.to_vec()))
    }
}
