//! Type pool for the Pax compiler.
//!
//! This crate provides:
//!
//! - **Type handles** ([`Idx`]): 32-bit indices into an interned [`Pool`].
//!   Builtin types used directly by IR generation (`Builtin.Word`,
//!   `Builtin.Int1`, `Builtin.PackIndex`) live at fixed indices.
//!
//! - **Pack types** ([`TypeData::Pack`], [`TypeData::Expansion`],
//!   [`TypeData::PackArchetype`]): formal packs are ordered lists of scalar
//!   components and expansion components `pattern...`, whose runtime length
//!   is the length of their count archetype.
//!
//! - **Lowering and classification**: formal-to-lowered type mapping,
//!   induced pack types for tuples, and triviality (whether a value needs
//!   destruction at all).
//!
//! - **Element environments** ([`EnvId`]): per-iteration substitutions of
//!   pack archetypes with element archetypes, and the invariance check that
//!   decides whether one is needed.

mod data;
mod env;
mod idx;
mod pool;

pub use data::{EnvId, Shape, TypeData};
pub use idx::Idx;
pub use pool::Pool;
