use pax_ir::interp::{AllocId, Event, Outcome};
use pax_ir::{BuiltinOp, Instr, IrTy};
use pax_types::{Idx, Pool};
use pretty_assertions::assert_eq;

use super::{ExpansionInitialization, PackExpansionInitialization, TuplePackExpansionInitialization};
use crate::cleanup::{Cleanup, CleanupState};
use crate::context::Loc;
use crate::expr::{ExprArena, ExprKind};
use crate::test_helpers::{alloc_pack, alloc_tuple, boxed_pack, ctx, run, BoxedPack};

#[test]
fn create_enters_dormant_whole_component_cleanup() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[Idx::INT, p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    let pack = alloc_pack(&mut ctx, formal);

    let init = PackExpansionInitialization::create(&mut ctx, pack, formal, 1);
    let handle = init
        .cleanup()
        .unwrap_or_else(|| panic!("non-trivial component has no cleanup"));
    assert_eq!(ctx.cleanups().state(handle), CleanupState::Dormant);
    assert_eq!(
        *ctx.cleanups().cleanup(handle),
        Cleanup::PartialDestroyPack {
            addr: pack,
            formal_pack: formal,
            component: 1,
            limit: None,
        }
    );
    assert_eq!(init.formal_pack_type(), formal);
    assert_eq!(init.component_index(), 1);
}

#[test]
fn trivial_component_needs_no_cleanup() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let ints = pool.expansion(Idx::INT, p.t);
    let formal = pool.pack(&[ints]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    let pack = alloc_pack(&mut ctx, formal);

    let init = PackExpansionInitialization::create(&mut ctx, pack, formal, 0);
    assert_eq!(init.cleanup(), None);

    ctx.emit_dynamic_pack_loop(Loc::Synthetic, formal, 0, None, |ctx, indices| {
        init.perform(ctx, indices.index_within_component, |ctx, elem| {
            assert_eq!(elem.cleanup(), None);
            assert_eq!(ctx.cleanups().depth(), 0);
            let value = ctx.builder_mut().emit_integer_literal(Idx::INT, 7);
            ctx.builder_mut().emit_store(value, elem.address());
            elem.finish_initialization(ctx);
        });
    });
    init.finish(&mut ctx);
    assert_eq!(ctx.cleanups().depth(), 0);
}

#[test]
fn perform_forwards_its_cleanups_and_finish_activates() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    let pack = alloc_pack(&mut ctx, formal);

    ctx.with_cleanup_scope(Loc::Synthetic, |ctx| {
        ctx.enter_dealloc_pack_cleanup(pack);
        let init = PackExpansionInitialization::create(ctx, pack, formal, 0);
        let outer = init
            .cleanup()
            .unwrap_or_else(|| panic!("non-trivial component has no cleanup"));

        ctx.emit_dynamic_pack_loop(Loc::Synthetic, formal, 0, None, |ctx, indices| {
            init.perform(ctx, indices.index_within_component, |ctx, elem| {
                let states: Vec<_> = ctx.cleanups().iter().map(|(_, _, s)| s).collect();
                assert_eq!(
                    states,
                    vec![
                        CleanupState::Active,
                        CleanupState::Dormant,
                        CleanupState::Active,
                        CleanupState::Dormant,
                    ]
                );
                let value = ctx.builder_mut().emit_apply(p.boxed, "make", vec![]);
                ctx.builder_mut().emit_store(value, elem.address());
                elem.finish_initialization(ctx);
                let handle = elem
                    .cleanup()
                    .unwrap_or_else(|| panic!("non-trivial element has no cleanup"));
                assert_eq!(ctx.cleanups().state(handle), CleanupState::Active);
            });
            let states: Vec<_> = ctx.cleanups().iter().map(|(_, _, s)| s).collect();
            assert_eq!(&states[2..], &[CleanupState::Dead, CleanupState::Dead]);
        });

        assert_eq!(ctx.cleanups().state(outer), CleanupState::Dormant);
        init.finish(ctx);
        assert_eq!(ctx.cleanups().state(outer), CleanupState::Active);
    });
    ctx.builder_mut().terminate_return(None);
    let func = ctx.finish("init");

    let trace = run(&pool, &func, &[(p.shape, 2)]);
    assert_eq!(trace.outcome, Outcome::Returned);
    assert_eq!(trace.destroyed_slots(AllocId(0)), vec![1, 0]);
    assert_eq!(trace.events.last(), Some(&Event::DeallocPack { alloc: AllocId(0) }));
}

#[test]
fn unwinding_mid_loop_destroys_the_initialized_prefix() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    let pack = alloc_pack(&mut ctx, formal);

    ctx.with_cleanup_scope(Loc::Synthetic, |ctx| {
        ctx.enter_dealloc_pack_cleanup(pack);
        let init = PackExpansionInitialization::create(ctx, pack, formal, 0);
        ctx.emit_dynamic_pack_loop(Loc::Synthetic, formal, 0, None, |ctx, indices| {
            let i = indices.index_within_component;
            init.perform(ctx, i, |ctx, elem| {
                let b = ctx.builder_mut();
                let one = b.emit_integer_literal(Idx::WORD, 1);
                let is_one = b.emit_builtin(BuiltinOp::CmpEq, i, one);
                let throw_bb = b.new_block();
                let cont_bb = b.new_block();
                b.terminate_cond_branch(is_one, throw_bb, cont_bb);

                ctx.builder_mut().emit_block(throw_bb);
                ctx.emit_unwind(Loc::Synthetic);

                ctx.builder_mut().emit_block(cont_bb);
                let value = ctx.builder_mut().emit_apply(p.boxed, "make", vec![]);
                ctx.builder_mut().emit_store(value, elem.address());
                elem.finish_initialization(ctx);
            });
        });
        init.finish(ctx);
    });
    ctx.builder_mut().terminate_return(None);
    let func = ctx.finish("throwing");

    let trace = run(&pool, &func, &[(p.shape, 3)]);
    assert_eq!(trace.outcome, Outcome::Unwound);
    assert_eq!(trace.destroyed_slots(AllocId(0)), vec![0]);
    assert_eq!(trace.dealloc_count(), 1);
    assert_eq!(trace.calls(), vec!["make"]);

    // A single element never reaches the throwing iteration.
    let trace = run(&pool, &func, &[(p.shape, 1)]);
    assert_eq!(trace.outcome, Outcome::Returned);
    assert_eq!(trace.destroyed_slots(AllocId(0)), vec![0]);
}

#[test]
fn tuple_initialization_addresses_the_induced_pack() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let tuple_ty = pool.tuple(&[Idx::STR, p.expansion]);
    let induced = pool.induced_pack_type(tuple_ty);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    let tuple = alloc_tuple(&mut ctx, tuple_ty);

    let init = TuplePackExpansionInitialization::create(&mut ctx, tuple, induced, 1);
    assert_eq!(init.formal_pack_type(), induced);
    let handle = init
        .cleanup()
        .unwrap_or_else(|| panic!("non-trivial component has no cleanup"));
    assert_eq!(
        *ctx.cleanups().cleanup(handle),
        Cleanup::PartialDestroyTuple {
            addr: tuple,
            induced_pack: induced,
            component: 1,
            limit: None,
        }
    );

    ctx.with_cleanup_scope(Loc::Synthetic, |ctx| {
        ctx.emit_dynamic_pack_loop(Loc::Synthetic, induced, 1, None, |ctx, indices| {
            init.perform(ctx, indices.index_within_component, |ctx, elem| {
                let value = ctx.builder_mut().emit_apply(p.boxed, "make", vec![]);
                ctx.builder_mut().emit_store(value, elem.address());
                elem.finish_initialization(ctx);
            });
        });
        init.finish(ctx);
    });
    ctx.builder_mut().terminate_return(None);
    let func = ctx.finish("tuple_init");

    assert_eq!(func.count_opcode("tuple_pack_element_addr"), 2);
    let trace = run(&pool, &func, &[(p.shape, 2)]);
    assert_eq!(trace.destroyed_slots(AllocId(0)), vec![2, 1]);
}

#[test]
fn in_place_needs_the_element_address_type() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    let pack = alloc_pack(&mut ctx, formal);

    let init = PackExpansionInitialization::create(&mut ctx, pack, formal, 0);
    let (env, elem) = ctx.create_opened_element_value_environment(p.expansion);
    ctx.emit_dynamic_pack_loop(Loc::Synthetic, formal, 0, env, |ctx, _| {
        assert_eq!(init.element_type(ctx), elem.ty);
        assert!(init.can_perform_in_place(ctx, elem));
        assert!(!init.can_perform_in_place(ctx, IrTy::object(elem.ty)));
        // The formal pattern is not the element type once the env is open.
        assert!(!init.can_perform_in_place(ctx, IrTy::address(p.boxed)));
        assert!(!init.can_perform_in_place(ctx, IrTy::address(Idx::INT)));

        let depth = ctx.cleanups().depth();
        let addr = init.address_for_in_place(ctx, elem);
        assert_eq!(ctx.builder().var_type(addr), elem);
        assert_eq!(ctx.cleanups().depth(), depth);
    });
}

#[test]
#[should_panic(expected = "needs an address type")]
fn address_for_in_place_rejects_object_types() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    let pack = alloc_pack(&mut ctx, formal);

    let init = PackExpansionInitialization::create(&mut ctx, pack, formal, 0);
    ctx.emit_dynamic_pack_loop(Loc::Synthetic, formal, 0, None, |ctx, _| {
        init.address_for_in_place(ctx, IrTy::object(p.boxed));
    });
}

/// Emit `repeat make() for each T` into `[repeat Box<each T>]`, where
/// `make()` has the type built by `make_ty`. Returns the opcodes of the loop
/// body block and the calls made for three elements.
fn emit_make_each(
    make_ty: impl FnOnce(&mut Pool, &BoxedPack) -> Idx,
) -> (Vec<&'static str>, Vec<String>) {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let ty = make_ty(&mut pool, &p);
    let mut exprs = ExprArena::new();
    let make = exprs.alloc(
        ExprKind::Call {
            func: "make".to_owned(),
            args: vec![],
        },
        ty,
    );
    let expansion = exprs.alloc(
        ExprKind::PackExpansion {
            pattern: make,
            count: p.t,
        },
        p.expansion,
    );
    let mut ctx = ctx(&mut pool, &exprs);
    let pack = alloc_pack(&mut ctx, formal);
    ctx.emit_pack_expansion_into_pack(expansion, pack, formal, 0);
    ctx.builder_mut().terminate_return(None);
    let func = ctx.finish("make_each");

    let body = func
        .blocks_in_layout()
        .find(|b| b.body.iter().any(|i| matches!(i, Instr::Apply { .. })))
        .unwrap_or_else(|| panic!("no loop body\n{func}"));
    let opcodes = body.body.iter().map(Instr::opcode).collect();
    let trace = run(&pool, &func, &[(p.shape, 3)]);
    assert_eq!(trace.outcome, Outcome::Returned);
    assert_eq!(trace.live_slots(AllocId(0)), vec![0, 1, 2]);
    let calls = trace.calls().into_iter().map(str::to_owned).collect();
    (opcodes, calls)
}

fn position(opcodes: &[&str], opcode: &str) -> usize {
    opcodes
        .iter()
        .position(|op| *op == opcode)
        .unwrap_or_else(|| panic!("no {opcode} in {opcodes:?}"))
}

#[test]
fn matching_pattern_is_built_in_place() {
    let (opcodes, calls) = emit_make_each(|_, p| p.boxed);
    assert!(position(&opcodes, "pack_element_get") < position(&opcodes, "apply"));
    assert_eq!(calls, vec!["make"; 3]);
}

#[test]
fn mismatched_pattern_is_evaluated_then_stored() {
    let (opcodes, calls) = emit_make_each(|pool, _| pool.named("Resource", false));
    assert!(position(&opcodes, "apply") < position(&opcodes, "pack_element_get"));
    assert!(position(&opcodes, "pack_element_get") < position(&opcodes, "store"));
    assert_eq!(calls, vec!["make"; 3]);
}

#[test]
#[should_panic(expected = "entered its cleanup twice")]
fn entering_outer_cleanup_twice_panics() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    let pack = alloc_pack(&mut ctx, formal);
    let mut init = PackExpansionInitialization::create(&mut ctx, pack, formal, 0);
    init.enter_dormant_cleanup(&mut ctx);
}

#[test]
#[should_panic(expected = "must be words")]
fn perform_rejects_non_word_index() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    let pack = alloc_pack(&mut ctx, formal);
    let init = PackExpansionInitialization::create(&mut ctx, pack, formal, 0);
    let bad = ctx.builder_mut().emit_integer_literal(Idx::INT, 0);
    init.perform(&mut ctx, bad, |_, _| {});
}

#[test]
#[should_panic(expected = "no active pack expansion")]
fn pack_index_outside_loop_panics() {
    let mut pool = Pool::new();
    let p = boxed_pack(&mut pool, "T");
    let formal = pool.pack(&[p.expansion]);
    let exprs = ExprArena::new();
    let mut ctx = ctx(&mut pool, &exprs);
    ctx.emit_pack_pack_index_for_active_expansion(formal, 0);
}
