//! The type pool.
//!
//! Every type is interned once and referenced by [`Idx`]. Primitives are
//! pre-interned at the fixed indices declared on `Idx`, so code that only
//! needs builtin types never has to touch the pool.

mod construct;
mod format;

use rustc_hash::FxHashMap;

use crate::{Idx, Shape, TypeData};

/// Record for one opened element environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ElementEnv {
    /// The reduced shape whose pack archetypes this environment opens.
    pub(crate) shape: Shape,
}

/// Interned storage for all types of a compilation.
#[derive(Clone, Debug)]
pub struct Pool {
    items: Vec<TypeData>,
    map: FxHashMap<TypeData, Idx>,
    next_shape: u32,
    pub(crate) envs: Vec<ElementEnv>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    /// Create a pool with the builtin primitives pre-interned.
    pub fn new() -> Self {
        let mut pool = Self {
            items: Vec::with_capacity(64),
            map: FxHashMap::default(),
            next_shape: 0,
            envs: Vec::new(),
        };

        let primitives = [
            TypeData::Int,       // 0 = Idx::INT
            TypeData::Bool,      // 1 = Idx::BOOL
            TypeData::Str,       // 2 = Idx::STR
            TypeData::Unit,      // 3 = Idx::UNIT
            TypeData::Word,      // 4 = Idx::WORD
            TypeData::Int1,      // 5 = Idx::INT1
            TypeData::PackIndex, // 6 = Idx::PACK_INDEX
        ];
        for data in primitives {
            pool.intern(data);
        }
        debug_assert_eq!(pool.items.len(), Idx::PRIMITIVE_COUNT as usize);

        pool
    }

    /// Intern a type, returning the existing index if it is already known.
    ///
    /// # Panics
    ///
    /// Panics if the pool exceeds `u32::MAX` types.
    pub fn intern(&mut self, data: TypeData) -> Idx {
        if let Some(&idx) = self.map.get(&data) {
            return idx;
        }
        let raw = u32::try_from(self.items.len())
            .unwrap_or_else(|_| panic!("type pool exceeds u32::MAX types"));
        let idx = Idx::from_raw(raw);
        self.items.push(data.clone());
        self.map.insert(data, idx);
        idx
    }

    /// Look up the structural data of a type.
    ///
    /// # Panics
    ///
    /// Panics if `idx` was not produced by this pool.
    #[inline]
    pub fn data(&self, idx: Idx) -> &TypeData {
        &self.items[idx.index()]
    }

    /// Number of interned types, primitives included.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the pool is empty. Never true for a pool built by [`Pool::new`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Allocate a fresh reduced-shape class.
    pub fn fresh_shape(&mut self) -> Shape {
        let shape = Shape::from_raw(self.next_shape);
        self.next_shape += 1;
        shape
    }

    // === Queries ===

    /// Components of a formal or lowered pack type.
    ///
    /// # Panics
    ///
    /// Panics if `pack` is not a pack type.
    pub fn pack_components(&self, pack: Idx) -> &[Idx] {
        match self.data(pack) {
            TypeData::Pack(elems) | TypeData::LoweredPack(elems) => elems,
            other => panic!("expected a pack type, found {other:?}"),
        }
    }

    /// Number of components of a formal or lowered pack type.
    pub fn num_pack_components(&self, pack: Idx) -> usize {
        self.pack_components(pack).len()
    }

    /// Component `index` of a formal or lowered pack type.
    pub fn pack_component(&self, pack: Idx, index: u32) -> Idx {
        self.pack_components(pack)[index as usize]
    }

    /// Components of a tuple type. The unit type is the empty tuple.
    ///
    /// # Panics
    ///
    /// Panics if `tuple` is not a tuple type.
    pub fn tuple_components(&self, tuple: Idx) -> &[Idx] {
        match self.data(tuple) {
            TypeData::Tuple(elems) => elems,
            TypeData::Unit => &[],
            other => panic!("expected a tuple type, found {other:?}"),
        }
    }

    /// Whether `idx` is a formal pack type.
    pub fn is_formal_pack(&self, idx: Idx) -> bool {
        matches!(self.data(idx), TypeData::Pack(_))
    }

    /// Whether `idx` is a lowered pack type.
    pub fn is_lowered_pack(&self, idx: Idx) -> bool {
        matches!(self.data(idx), TypeData::LoweredPack(_))
    }

    /// Whether `idx` is a tuple type (including the empty tuple).
    pub fn is_tuple(&self, idx: Idx) -> bool {
        matches!(self.data(idx), TypeData::Tuple(_) | TypeData::Unit)
    }

    /// Whether `idx` is a pack expansion `pattern...`.
    pub fn is_expansion(&self, idx: Idx) -> bool {
        matches!(self.data(idx), TypeData::Expansion { .. })
    }

    /// Split a pack expansion into `(pattern, count)`.
    pub fn expansion_parts(&self, idx: Idx) -> Option<(Idx, Idx)> {
        match *self.data(idx) {
            TypeData::Expansion { pattern, count } => Some((pattern, count)),
            _ => None,
        }
    }

    /// Reduced shape of a pack archetype.
    pub fn archetype_shape(&self, idx: Idx) -> Option<Shape> {
        match self.data(idx) {
            TypeData::PackArchetype { shape, .. } => Some(*shape),
            _ => None,
        }
    }

    /// Reduced shape of the count archetype of a pack expansion.
    ///
    /// # Panics
    ///
    /// Panics if `expansion` is not an expansion over a pack archetype.
    pub fn expansion_shape(&self, expansion: Idx) -> Shape {
        let (_, count) = self
            .expansion_parts(expansion)
            .unwrap_or_else(|| panic!("expected a pack expansion, found {expansion:?}"));
        self.archetype_shape(count)
            .unwrap_or_else(|| panic!("expansion count {count:?} is not a pack archetype"))
    }

    /// Pre-order search: returns `true` if `pred` holds for `root` or any
    /// type nested inside it.
    pub fn find_if(&self, root: Idx, pred: &mut impl FnMut(Idx, &TypeData) -> bool) -> bool {
        let data = self.data(root);
        if pred(root, data) {
            return true;
        }
        match data {
            TypeData::Nominal { args: children, .. }
            | TypeData::Pack(children)
            | TypeData::LoweredPack(children)
            | TypeData::Tuple(children) => children.iter().any(|&c| self.find_if(c, pred)),
            TypeData::Expansion { pattern, count } => {
                self.find_if(*pattern, pred) || self.find_if(*count, pred)
            }
            TypeData::ElementArchetype { pack, .. } => self.find_if(*pack, pred),
            TypeData::Int
            | TypeData::Bool
            | TypeData::Str
            | TypeData::Unit
            | TypeData::Word
            | TypeData::Int1
            | TypeData::PackIndex
            | TypeData::PackArchetype { .. } => false,
        }
    }

    // === Classification ===

    /// Whether values of this type need no destruction.
    ///
    /// Archetypes are never trivial: their substitutions are unknown to the
    /// lowering, so the conservative answer is required for correctness.
    pub fn is_trivial(&self, idx: Idx) -> bool {
        match self.data(idx) {
            TypeData::Int
            | TypeData::Bool
            | TypeData::Unit
            | TypeData::Word
            | TypeData::Int1
            | TypeData::PackIndex => true,
            TypeData::Str | TypeData::PackArchetype { .. } | TypeData::ElementArchetype { .. } => {
                false
            }
            TypeData::Nominal { args, trivial, .. } => {
                *trivial && args.iter().all(|&a| self.is_trivial(a))
            }
            TypeData::Expansion { pattern, .. } => self.is_trivial(*pattern),
            TypeData::Pack(elems) | TypeData::LoweredPack(elems) | TypeData::Tuple(elems) => {
                elems.iter().all(|&e| self.is_trivial(e))
            }
        }
    }

    // === Lowering ===

    /// Lower a formal type to the type carried by IR values.
    ///
    /// Formal packs become lowered packs; the components of packs, tuples,
    /// expansions and nominal arguments are lowered recursively. Other
    /// types lower to themselves.
    pub fn lower_type(&mut self, idx: Idx) -> Idx {
        match self.data(idx).clone() {
            TypeData::Pack(elems) | TypeData::LoweredPack(elems) => {
                let lowered: Vec<Idx> = elems.into_iter().map(|e| self.lower_type(e)).collect();
                self.intern(TypeData::LoweredPack(lowered))
            }
            TypeData::Tuple(elems) => {
                let lowered: Vec<Idx> = elems.into_iter().map(|e| self.lower_type(e)).collect();
                self.tuple(&lowered)
            }
            TypeData::Expansion { pattern, count } => {
                let pattern = self.lower_type(pattern);
                self.expansion(pattern, count)
            }
            TypeData::Nominal {
                name,
                args,
                trivial,
            } => {
                let args: Vec<Idx> = args.into_iter().map(|a| self.lower_type(a)).collect();
                self.intern(TypeData::Nominal {
                    name,
                    args,
                    trivial,
                })
            }
            _ => idx,
        }
    }

    /// Reconstruct a formal pack type from a lowered pack type.
    ///
    /// Lowering is structure-preserving for the types this pool models, so
    /// the result has the same components under the formal constructor.
    ///
    /// # Panics
    ///
    /// Panics if `lowered` is not a lowered pack type.
    pub fn approximate_formal_pack_type(&mut self, lowered: Idx) -> Idx {
        let TypeData::LoweredPack(elems) = self.data(lowered).clone() else {
            panic!("expected a lowered pack type, found {:?}", self.data(lowered));
        };
        self.pack(&elems)
    }

    /// The formal pack type induced by a tuple type, used to address tuple
    /// storage with pack indices.
    pub fn induced_pack_type(&mut self, tuple: Idx) -> Idx {
        let elems = self.tuple_components(tuple).to_vec();
        self.pack(&elems)
    }

    /// A formal pack with the single component `component`.
    pub fn singleton_pack(&mut self, component: Idx) -> Idx {
        self.pack(&[component])
    }
}
