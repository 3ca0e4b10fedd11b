//! Opened element environments and expansion invariance.
//!
//! Inside a dynamic pack loop, the pattern type of an expansion names pack
//! archetypes (`each T`). To talk about the *current element* the lowering
//! opens an element environment: every pack archetype of the loop's reduced
//! shape is replaced by an element archetype of that environment. Pack
//! archetypes of other shapes are left alone; they are not indexed by the
//! loop.

use crate::pool::ElementEnv;
use crate::{EnvId, Idx, Pool, Shape, TypeData};

impl Pool {
    /// Allocate a fresh element environment opening archetypes of `shape`.
    pub fn open_element_env(&mut self, shape: Shape) -> EnvId {
        let raw = u32::try_from(self.envs.len())
            .unwrap_or_else(|_| panic!("element environment count exceeds u32::MAX"));
        self.envs.push(ElementEnv { shape });
        tracing::trace!(env = raw, shape = shape.raw(), "opened element environment");
        EnvId::from_raw(raw)
    }

    /// The reduced shape an element environment opens.
    pub fn env_shape(&self, env: EnvId) -> Shape {
        self.envs[env.index()].shape
    }

    /// Number of element environments created so far.
    pub fn num_element_envs(&self) -> usize {
        self.envs.len()
    }

    /// The element archetype of pack archetype `pack` inside `env`.
    pub fn element_archetype(&mut self, env: EnvId, pack: Idx) -> Idx {
        self.intern(TypeData::ElementArchetype { env, pack })
    }

    /// Replace the pack archetypes opened by `env` with their element
    /// archetypes, everywhere inside `ty`.
    ///
    /// Nested expansions keep their count archetype: the count names the
    /// pack being iterated, not an element of it.
    pub fn map_pack_type_into_element_context(&mut self, env: EnvId, ty: Idx) -> Idx {
        let shape = self.env_shape(env);
        self.map_into_element_context(env, shape, ty)
    }

    fn map_into_element_context(&mut self, env: EnvId, shape: Shape, ty: Idx) -> Idx {
        match self.data(ty).clone() {
            TypeData::PackArchetype { shape: s, .. } if s == shape => {
                self.element_archetype(env, ty)
            }
            TypeData::Nominal {
                name,
                args,
                trivial,
            } => {
                let args = self.map_all(env, shape, &args);
                self.intern(TypeData::Nominal {
                    name,
                    args,
                    trivial,
                })
            }
            TypeData::Expansion { pattern, count } => {
                let pattern = self.map_into_element_context(env, shape, pattern);
                self.expansion(pattern, count)
            }
            TypeData::Pack(elems) => {
                let elems = self.map_all(env, shape, &elems);
                self.pack(&elems)
            }
            TypeData::LoweredPack(elems) => {
                let elems = self.map_all(env, shape, &elems);
                self.intern(TypeData::LoweredPack(elems))
            }
            TypeData::Tuple(elems) => {
                let elems = self.map_all(env, shape, &elems);
                self.tuple(&elems)
            }
            _ => ty,
        }
    }

    fn map_all(&mut self, env: EnvId, shape: Shape, elems: &[Idx]) -> Vec<Idx> {
        elems
            .iter()
            .map(|&e| self.map_into_element_context(env, shape, e))
            .collect()
    }

    /// Whether `pattern` mentions no pack archetype indexed by a loop over
    /// `count_archetype`.
    ///
    /// An archetype is indexed by the loop if it is the count archetype
    /// itself or shares its reduced shape. An invariant pattern needs no
    /// element environment: every iteration sees the same type.
    ///
    /// # Panics
    ///
    /// Panics if `count_archetype` is not a pack archetype.
    pub fn is_pattern_invariant_to_expansion(&self, pattern: Idx, count_archetype: Idx) -> bool {
        let count_shape = self.archetype_shape(count_archetype).unwrap_or_else(|| {
            panic!("expansion count {count_archetype:?} is not a pack archetype")
        });
        !self.find_if(pattern, &mut |idx, data| match data {
            TypeData::PackArchetype { shape, .. } => {
                idx == count_archetype || *shape == count_shape
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Idx, Pool, TypeData};

    #[test]
    fn invariant_pattern_has_no_matching_archetype() {
        let mut pool = Pool::new();
        let t = pool.fresh_pack_archetype("T");
        assert!(pool.is_pattern_invariant_to_expansion(Idx::INT, t));
        assert!(!pool.is_pattern_invariant_to_expansion(t, t));
    }

    #[test]
    fn same_shape_archetype_is_not_invariant() {
        let mut pool = Pool::new();
        let shape = pool.fresh_shape();
        let t = pool.pack_archetype("T", shape);
        let u = pool.pack_archetype("U", shape);
        let array_u = pool.nominal("Array", &[u], false);
        assert!(!pool.is_pattern_invariant_to_expansion(array_u, t));
    }

    #[test]
    fn other_shape_archetype_is_invariant() {
        let mut pool = Pool::new();
        let t = pool.fresh_pack_archetype("T");
        let u = pool.fresh_pack_archetype("U");
        let array_u = pool.nominal("Array", &[u], false);
        assert!(pool.is_pattern_invariant_to_expansion(array_u, t));
    }

    #[test]
    fn mapping_replaces_only_opened_shape() {
        let mut pool = Pool::new();
        let t = pool.fresh_pack_archetype("T");
        let u = pool.fresh_pack_archetype("U");
        let dict = pool.nominal("Dict", &[t, u], false);

        let shape = pool.archetype_shape(t).unwrap_or_else(|| unreachable!());
        let env = pool.open_element_env(shape);
        let mapped = pool.map_pack_type_into_element_context(env, dict);

        let TypeData::Nominal { args, .. } = pool.data(mapped).clone() else {
            panic!("mapping must preserve the nominal");
        };
        assert_eq!(
            pool.data(args[0]),
            &TypeData::ElementArchetype { env, pack: t }
        );
        assert_eq!(args[1], u);
    }

    #[test]
    fn mapping_is_identity_on_invariant_types() {
        let mut pool = Pool::new();
        let t = pool.fresh_pack_archetype("T");
        let shape = pool.archetype_shape(t).unwrap_or_else(|| unreachable!());
        let env = pool.open_element_env(shape);
        assert_eq!(pool.map_pack_type_into_element_context(env, Idx::STR), Idx::STR);
    }
}
