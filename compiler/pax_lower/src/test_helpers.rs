//! Shared fixtures for unit tests.

use pax_ir::interp::{Interpreter, Trace};
use pax_ir::{IrFunction, VarId};
use pax_types::{Idx, Pool, Shape};

use crate::config::LowerConfig;
use crate::context::LowerCtx;
use crate::expr::ExprArena;

/// `each T`, `Box<each T>` and `repeat Box<each T> for each T`.
pub(crate) struct BoxedPack {
    pub t: Idx,
    pub shape: Shape,
    pub boxed: Idx,
    pub expansion: Idx,
}

pub(crate) fn boxed_pack(pool: &mut Pool, name: &str) -> BoxedPack {
    let t = pool.fresh_pack_archetype(name);
    let shape = pool
        .archetype_shape(t)
        .unwrap_or_else(|| unreachable!("fresh archetypes have a shape"));
    let boxed = pool.nominal("Box", &[t], false);
    let expansion = pool.expansion(boxed, t);
    BoxedPack {
        t,
        shape,
        boxed,
        expansion,
    }
}

pub(crate) fn ctx<'a>(pool: &'a mut Pool, exprs: &'a ExprArena) -> LowerCtx<'a> {
    LowerCtx::new(pool, exprs, LowerConfig::checked())
}

/// Allocate an uninitialized pack of formal type `formal`.
pub(crate) fn alloc_pack(ctx: &mut LowerCtx<'_>, formal: Idx) -> VarId {
    let lowered = ctx.pool_mut().lower_type(formal);
    ctx.builder_mut().emit_alloc_pack(lowered)
}

/// Allocate uninitialized storage for the tuple `tuple`.
pub(crate) fn alloc_tuple(ctx: &mut LowerCtx<'_>, tuple: Idx) -> VarId {
    let lowered = ctx.pool_mut().lower_type(tuple);
    ctx.builder_mut().emit_alloc_stack(lowered)
}

pub(crate) fn run(pool: &Pool, func: &IrFunction, lengths: &[(Shape, u64)]) -> Trace {
    Interpreter::new(pool, lengths.iter().copied())
        .run(func)
        .unwrap_or_else(|err| panic!("{err}\n{}", func.display(pool)))
}
