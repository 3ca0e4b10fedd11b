use pax_types::Idx;
use pretty_assertions::assert_eq;

use super::IrBuilder;
use crate::ir::{BlockId, BuiltinOp, Instr, IrTy, Terminator};

#[test]
fn starts_in_entry_block() {
    let b = IrBuilder::new();
    assert_eq!(b.current_block(), BlockId::new(0));
    assert_eq!(b.entry_block(), BlockId::new(0));
    assert!(!b.is_terminated());
}

#[test]
fn new_block_after_inserts_into_layout() {
    let mut b = IrBuilder::new();
    let first = b.new_block();
    let last = b.new_block();
    let middle = b.new_block_after(first);
    b.terminate_unreachable();
    let func = b.finish("layout");
    assert_eq!(
        func.layout,
        vec![BlockId::new(0), first, middle, last]
    );
}

#[test]
fn builtin_result_types() {
    let mut b = IrBuilder::new();
    let a = b.emit_integer_literal(Idx::WORD, 1);
    let c = b.emit_integer_literal(Idx::WORD, 2);
    let sum = b.emit_builtin(BuiltinOp::Add, a, c);
    let eq = b.emit_builtin(BuiltinOp::CmpEq, a, c);
    assert_eq!(b.var_type(sum), IrTy::WORD);
    assert_eq!(b.var_type(eq), IrTy::INT1);
}

#[test]
fn address_producing_instrs() {
    let mut b = IrBuilder::new();
    let pack = b.emit_alloc_pack(Idx::UNIT);
    assert!(b.var_type(pack).is_address());
    let idx = b.emit_scalar_pack_index(0, Idx::UNIT);
    assert_eq!(b.var_type(idx), IrTy::PACK_INDEX);
    let elem = b.emit_pack_element_get(idx, pack, Idx::INT);
    assert_eq!(b.var_type(elem), IrTy::address(Idx::INT));
}

#[test]
fn block_params_bind_fresh_vars() {
    let mut b = IrBuilder::new();
    let target = b.new_block();
    let p = b.add_block_param(target, IrTy::WORD);
    let zero = b.emit_integer_literal(Idx::WORD, 0);
    b.terminate_branch(target, vec![zero]);
    b.emit_block(target);
    b.terminate_return(None);

    let func = b.finish("params");
    assert_eq!(func.block(target).params, vec![(p, IrTy::WORD)]);
    assert_eq!(
        func.block(BlockId::new(0)).terminator,
        Terminator::Branch {
            target,
            args: vec![zero],
        }
    );
}

#[test]
fn finish_seals_open_blocks() {
    let mut b = IrBuilder::new();
    let open = b.new_block();
    b.terminate_branch(open, vec![]);
    b.emit_block(open);
    b.emit_integer_literal(Idx::WORD, 3);

    let func = b.finish("sealed");
    assert_eq!(func.block(open).terminator, Terminator::Unreachable);
    assert_eq!(
        func.block(open).body,
        vec![Instr::IntegerLiteral {
            dst: crate::ir::VarId::new(0),
            ty: Idx::WORD,
            value: 3,
        }]
    );
}

#[test]
#[should_panic(expected = "already terminated")]
fn double_termination_panics() {
    let mut b = IrBuilder::new();
    b.terminate_unwind();
    b.terminate_unwind();
}

#[test]
#[should_panic(expected = "must be terminated")]
fn emit_block_requires_terminated_current() {
    let mut b = IrBuilder::new();
    let next = b.new_block();
    b.emit_block(next);
}
