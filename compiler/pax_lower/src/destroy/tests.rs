use pax_ir::interp::{AllocId, Event};
use pax_ir::{IrTy, VarId};
use pax_types::{Idx, Pool};
use pretty_assertions::assert_eq;

use crate::cleanup::{Cleanup, CleanupState};
use crate::context::{Loc, LowerCtx};
use crate::expr::ExprArena;
use crate::pack_loop::PackLoop;
use crate::test_helpers::{alloc_pack, alloc_tuple, boxed_pack, ctx, run};

/// Store a fresh `elem_ty` into elements `[0, limit)` of expansion
/// component `component` of the pack at `pack`.
fn fill_pack_component(
    ctx: &mut LowerCtx<'_>,
    pack: VarId,
    formal: Idx,
    component: u32,
    elem_ty: Idx,
    limit: Option<VarId>,
) {
    let opts = PackLoop {
        limit,
        ..PackLoop::default()
    };
    ctx.emit_dynamic_pack_loop_with(Loc::Synthetic, formal, component, opts, |ctx, indices| {
        let b = ctx.builder_mut();
        let elem = b.emit_pack_element_get(indices.pack_index, pack, elem_ty);
        let value = b.emit_apply(elem_ty, "make", vec![]);
        b.emit_store(value, elem);
    });
}

fn fill_tuple_component(
    ctx: &mut LowerCtx<'_>,
    tuple: VarId,
    tuple_ty: Idx,
    component: u32,
    elem_ty: Idx,
) {
    let induced = ctx.pool_mut().induced_pack_type(tuple_ty);
    ctx.emit_dynamic_pack_loop(Loc::Synthetic, induced, component, None, |ctx, indices| {
        let b = ctx.builder_mut();
        let elem = b.emit_tuple_pack_element_addr(indices.pack_index, tuple, elem_ty);
        let value = b.emit_apply(elem_ty, "make", vec![]);
        b.emit_store(value, elem);
    });
}

fn fill_scalar(ctx: &mut LowerCtx<'_>, pack: VarId, formal: Idx, component: u32, ty: Idx) {
    let b = ctx.builder_mut();
    let index = b.emit_scalar_pack_index(component, formal);
    let elem = b.emit_pack_element_get(index, pack, ty);
    let value = b.emit_apply(ty, "make", vec![]);
    b.emit_store(value, elem);
}

#[test]
fn destroy_pack_destroys_scalars_and_expansions() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let resource = pool.named("Resource", false);
    let formal = pool.pack(&[resource, Idx::INT, p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);

    let pack = alloc_pack(&mut ctx, formal);
    fill_scalar(&mut ctx, pack, formal, 0, resource);
    fill_scalar(&mut ctx, pack, formal, 1, Idx::INT);
    fill_pack_component(&mut ctx, pack, formal, 2, p.boxed, None);
    ctx.emit_destroy_pack(Loc::Synthetic, pack, formal);
    ctx.builder_mut().emit_dealloc_pack(pack);
    ctx.builder_mut().terminate_return(None);
    let func = ctx.finish("destroy");

    // The trivial Int component is skipped.
    assert_eq!(func.count_opcode("scalar_pack_index"), 3);
    let trace = run(&pool, &func, &[(p.shape, 3)]);
    assert_eq!(trace.destroyed_slots(AllocId(0)), vec![0, 4, 3, 2]);
    assert_eq!(trace.events.last(), Some(&Event::DeallocPack { alloc: AllocId(0) }));
}

#[test]
fn partial_destroy_pack_undoes_a_prefix_in_reverse() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);

    let pack = alloc_pack(&mut ctx, formal);
    let limit = ctx.builder_mut().emit_integer_literal(Idx::WORD, 3);
    fill_pack_component(&mut ctx, pack, formal, 0, p.boxed, Some(limit));
    ctx.emit_partial_destroy_pack(Loc::Synthetic, pack, formal, 0, Some(limit));
    ctx.builder_mut().emit_dealloc_pack(pack);
    ctx.builder_mut().terminate_return(None);
    let func = ctx.finish("prefix");

    let trace = run(&pool, &func, &[(p.shape, 5)]);
    assert_eq!(trace.destroyed_slots(AllocId(0)), vec![2, 1, 0]);
    assert_eq!(trace.dealloc_count(), 1);
}

#[test]
fn partial_destroy_opens_element_environment() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);

    let pack = alloc_pack(&mut ctx, formal);
    fill_pack_component(&mut ctx, pack, formal, 0, p.boxed, None);
    ctx.emit_partial_destroy_pack(Loc::Synthetic, pack, formal, 0, None);
    ctx.builder_mut().emit_dealloc_pack(pack);
    ctx.builder_mut().terminate_return(None);
    let func = ctx.finish("opened");

    assert_eq!(func.count_opcode("open_pack_element"), 1);
    let trace = run(&pool, &func, &[(p.shape, 2)]);
    assert_eq!(trace.open_count(), 2);
    assert_eq!(trace.destroyed_slots(AllocId(0)), vec![1, 0]);
}

#[test]
fn partial_destroy_tuple_uses_the_induced_pack() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let tuple_ty = pool.tuple(&[Idx::STR, p.expansion]);
    let induced = pool.induced_pack_type(tuple_ty);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);

    let tuple = alloc_tuple(&mut ctx, tuple_ty);
    fill_tuple_component(&mut ctx, tuple, tuple_ty, 1, p.boxed);
    let limit = ctx.builder_mut().emit_integer_literal(Idx::WORD, 2);
    ctx.emit_partial_destroy_tuple(Loc::Synthetic, tuple, induced, 1, Some(limit));
    ctx.builder_mut().terminate_return(None);
    let func = ctx.finish("tuple_prefix");

    assert_eq!(func.count_opcode("tuple_pack_element_addr"), 2);
    assert_eq!(func.count_opcode("pack_pack_index"), 2);
    let trace = run(&pool, &func, &[(p.shape, 3)]);
    assert_eq!(trace.destroyed_slots(AllocId(0)), vec![2, 1]);
    assert_eq!(trace.live_slots(AllocId(0)), vec![3]);
}

#[test]
fn remaining_tuple_destroy_walks_forward_after_current() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let tuple_ty = pool.tuple(&[p.expansion]);
    let induced = pool.induced_pack_type(tuple_ty);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);

    let tuple = alloc_tuple(&mut ctx, tuple_ty);
    fill_tuple_component(&mut ctx, tuple, tuple_ty, 0, p.boxed);
    let current = ctx.builder_mut().emit_integer_literal(Idx::WORD, 1);
    ctx.emit_partial_destroy_remaining_tuple(Loc::Synthetic, tuple, induced, 0, current);
    ctx.builder_mut().terminate_return(None);
    let func = ctx.finish("suffix");

    let trace = run(&pool, &func, &[(p.shape, 4)]);
    assert_eq!(trace.destroyed_slots(AllocId(0)), vec![2, 3]);
    assert_eq!(trace.live_slots(AllocId(0)), vec![0, 1]);

    // Nothing remains after the last element.
    let trace = run(&pool, &func, &[(p.shape, 2)]);
    assert!(trace.destroyed_slots(AllocId(0)).is_empty());
}

#[test]
fn trivial_packs_are_left_unmanaged() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let ints = pool.expansion(Idx::INT, p.t);
    let formal = pool.pack(&[Idx::INT, ints]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);

    let pack = alloc_pack(&mut ctx, formal);
    let managed = ctx.emit_managed_pack_with_cleanup(pack, Some(formal));
    assert_eq!(managed.value(), pack);
    assert_eq!(managed.cleanup(), None);
    assert_eq!(ctx.cleanups().depth(), 0);
}

#[test]
fn managed_pack_reconstructs_missing_formal_type() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);

    let pack = alloc_pack(&mut ctx, formal);
    let managed = ctx.emit_managed_pack_with_cleanup(pack, None);
    let handle = managed
        .cleanup()
        .unwrap_or_else(|| panic!("non-trivial pack is unmanaged"));
    assert_eq!(ctx.cleanups().state(handle), CleanupState::Active);
    let Cleanup::DestroyPack { addr, formal_pack } = *ctx.cleanups().cleanup(handle) else {
        panic!("expected a destroy-pack cleanup");
    };
    assert_eq!(addr, pack);
    assert!(ctx.pool().is_formal_pack(formal_pack));

    assert_eq!(managed.forward(&mut ctx), pack);
    assert_eq!(ctx.cleanups().state(handle), CleanupState::Dead);
}

#[test]
fn invariant_pattern_opens_no_environment() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let ints = pool.expansion(Idx::INT, p.t);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);

    assert_eq!(
        ctx.create_opened_element_value_environment(ints),
        (None, IrTy::address(Idx::INT))
    );

    let (env, elem) = ctx.create_opened_element_value_environment(p.expansion);
    let env = env.unwrap_or_else(|| panic!("Box<each T> depends on T"));
    assert!(elem.is_address());
    assert_ne!(elem.ty, p.boxed);
    assert_eq!(ctx.pool().env_shape(env), p.shape);
}

#[test]
#[should_panic(expected = "expected a pack expansion")]
fn opening_non_expansion_panics() {
    let mut pool = Pool::new();
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    ctx.create_opened_element_value_environment(Idx::INT);
}
