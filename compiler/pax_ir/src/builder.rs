//! IR builder facade.
//!
//! [`IrBuilder`] owns the in-progress function and an implicit insertion
//! point. Every `emit_*` method appends one instruction at the insertion
//! point; every `terminate_*` method closes the current block.
//!
//! # Insertion-point contract
//!
//! Callers that hand control to a closure while emitting (for example a
//! loop body) rely on the insertion point only moving through
//! [`emit_block`](IrBuilder::emit_block) and
//! [`position_at`](IrBuilder::position_at). A closure may create and enter
//! new blocks, but it must leave the builder positioned in an open block
//! that falls through to the code the caller emits next.

use pax_types::{EnvId, Idx};
use smallvec::smallvec;

use crate::ir::{Block, BlockId, BuiltinOp, Instr, IrFunction, IrTy, Terminator, VarId};

/// In-progress basic block being constructed.
struct BlockBuilder {
    id: BlockId,
    params: Vec<(VarId, IrTy)>,
    body: Vec<Instr>,
    terminator: Option<Terminator>,
}

impl BlockBuilder {
    fn new(id: BlockId) -> Self {
        Self {
            id,
            params: Vec::new(),
            body: Vec::new(),
            terminator: None,
        }
    }
}

/// Builder for an in-progress IR function.
///
/// Follows the "position at a block, emit instructions, terminate" pattern
/// of LLVM's `IRBuilder`, with block parameters instead of phi nodes.
pub struct IrBuilder {
    blocks: Vec<BlockBuilder>,
    layout: Vec<BlockId>,
    current_block: BlockId,
    var_types: Vec<IrTy>,
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IrBuilder {
    /// Create a builder positioned at a freshly allocated entry block.
    pub fn new() -> Self {
        let entry = BlockId::new(0);
        Self {
            blocks: vec![BlockBuilder::new(entry)],
            layout: vec![entry],
            current_block: entry,
            var_types: Vec::new(),
        }
    }

    // Block management

    fn alloc_block(&mut self) -> BlockId {
        let id = BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        );
        self.blocks.push(BlockBuilder::new(id));
        id
    }

    /// Allocate a new empty block at the end of the layout.
    pub fn new_block(&mut self) -> BlockId {
        let id = self.alloc_block();
        self.layout.push(id);
        id
    }

    /// Allocate a new empty block placed immediately after `after` in the
    /// layout.
    pub fn new_block_after(&mut self, after: BlockId) -> BlockId {
        let id = self.alloc_block();
        let pos = self
            .layout
            .iter()
            .position(|&b| b == after)
            .map_or(self.layout.len(), |p| p + 1);
        self.layout.insert(pos, id);
        id
    }

    /// Set the current insertion point to the given block.
    pub fn position_at(&mut self, block: BlockId) {
        debug_assert!(
            block.index() < self.blocks.len(),
            "BlockId {} out of bounds (have {} blocks)",
            block.raw(),
            self.blocks.len(),
        );
        self.current_block = block;
    }

    /// Start emitting into `block`, which must not have been emitted into
    /// yet. The previous insertion block must already be terminated.
    ///
    /// # Panics
    ///
    /// Debug-panics if the current block is still open.
    pub fn emit_block(&mut self, block: BlockId) {
        debug_assert!(
            self.is_terminated(),
            "block {} must be terminated before emitting block {}",
            self.current_block.raw(),
            block.raw(),
        );
        self.position_at(block);
    }

    /// Get the current block being built.
    #[inline]
    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    /// Check whether the current block already has a terminator.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current_block.index()].terminator.is_some()
    }

    /// Get the entry block (always block 0).
    #[inline]
    pub fn entry_block(&self) -> BlockId {
        BlockId::new(0)
    }

    // Variable allocation

    /// Allocate a fresh variable with the given type.
    pub fn fresh_var(&mut self, ty: IrTy) -> VarId {
        let id = VarId::new(
            u32::try_from(self.var_types.len())
                .unwrap_or_else(|_| panic!("variable count exceeds u32::MAX")),
        );
        self.var_types.push(ty);
        id
    }

    /// Type of a variable allocated by this builder.
    #[inline]
    pub fn var_type(&self, var: VarId) -> IrTy {
        self.var_types[var.index()]
    }

    /// Add a block parameter and return the variable bound to it.
    pub fn add_block_param(&mut self, block: BlockId, ty: IrTy) -> VarId {
        let var = self.fresh_var(ty);
        self.blocks[block.index()].params.push((var, ty));
        var
    }

    // Instruction emission

    fn push(&mut self, instr: Instr) {
        let block = &mut self.blocks[self.current_block.index()];
        debug_assert!(
            block.terminator.is_none(),
            "emitting {} into terminated block {}",
            instr.opcode(),
            self.current_block.raw()
        );
        tracing::trace!(block = self.current_block.raw(), op = instr.opcode(), "emit");
        block.body.push(instr);
    }

    fn emit_def(&mut self, ty: IrTy, make: impl FnOnce(VarId) -> Instr) -> VarId {
        let dst = self.fresh_var(ty);
        self.push(make(dst));
        dst
    }

    /// Emit `integer_literal`.
    pub fn emit_integer_literal(&mut self, ty: Idx, value: u64) -> VarId {
        self.emit_def(IrTy::object(ty), |dst| Instr::IntegerLiteral { dst, ty, value })
    }

    /// Emit a builtin binary function on words.
    pub fn emit_builtin(&mut self, op: BuiltinOp, lhs: VarId, rhs: VarId) -> VarId {
        let ty = match op {
            BuiltinOp::Add | BuiltinOp::Sub => IrTy::WORD,
            BuiltinOp::CmpEq => IrTy::INT1,
        };
        self.emit_def(ty, |dst| Instr::Builtin {
            dst,
            op,
            args: smallvec![lhs, rhs],
        })
    }

    /// Emit `alloc_pack`. The result is the address of a lowered pack.
    pub fn emit_alloc_pack(&mut self, lowered_pack_ty: Idx) -> VarId {
        self.emit_def(IrTy::address(lowered_pack_ty), |dst| Instr::AllocPack {
            dst,
            pack_ty: lowered_pack_ty,
        })
    }

    /// Emit `dealloc_pack`.
    pub fn emit_dealloc_pack(&mut self, addr: VarId) {
        self.push(Instr::DeallocPack { addr });
    }

    /// Emit `alloc_stack`.
    pub fn emit_alloc_stack(&mut self, ty: Idx) -> VarId {
        self.emit_def(IrTy::address(ty), |dst| Instr::AllocStack { dst, ty })
    }

    /// Emit `pack_length`.
    pub fn emit_pack_length(&mut self, formal_pack_ty: Idx) -> VarId {
        self.emit_def(IrTy::WORD, |dst| Instr::PackLength {
            dst,
            pack_ty: formal_pack_ty,
        })
    }

    /// Emit `scalar_pack_index`.
    pub fn emit_scalar_pack_index(&mut self, component: u32, formal_pack_ty: Idx) -> VarId {
        self.emit_def(IrTy::PACK_INDEX, |dst| Instr::ScalarPackIndex {
            dst,
            component,
            pack_ty: formal_pack_ty,
        })
    }

    /// Emit `dynamic_pack_index`.
    pub fn emit_dynamic_pack_index(&mut self, index: VarId, formal_pack_ty: Idx) -> VarId {
        self.emit_def(IrTy::PACK_INDEX, |dst| Instr::DynamicPackIndex {
            dst,
            index,
            pack_ty: formal_pack_ty,
        })
    }

    /// Emit `pack_pack_index`.
    pub fn emit_pack_pack_index(
        &mut self,
        component: u32,
        inner: VarId,
        formal_pack_ty: Idx,
    ) -> VarId {
        self.emit_def(IrTy::PACK_INDEX, |dst| Instr::PackPackIndex {
            dst,
            component,
            inner,
            pack_ty: formal_pack_ty,
        })
    }

    /// Emit `pack_element_get`, producing the address of an element.
    pub fn emit_pack_element_get(&mut self, index: VarId, pack: VarId, elem_ty: Idx) -> VarId {
        self.emit_def(IrTy::address(elem_ty), |dst| Instr::PackElementGet {
            dst,
            index,
            pack,
            elem_ty,
        })
    }

    /// Emit `tuple_pack_element_addr`, producing the address of an element.
    pub fn emit_tuple_pack_element_addr(
        &mut self,
        index: VarId,
        tuple: VarId,
        elem_ty: Idx,
    ) -> VarId {
        self.emit_def(IrTy::address(elem_ty), |dst| Instr::TuplePackElementAddr {
            dst,
            index,
            tuple,
            elem_ty,
        })
    }

    /// Emit `open_pack_element`.
    pub fn emit_open_pack_element(&mut self, index: VarId, env: EnvId) {
        self.push(Instr::OpenPackElement { index, env });
    }

    /// Emit `destroy_addr`.
    pub fn emit_destroy_addr(&mut self, addr: VarId) {
        self.push(Instr::DestroyAddr { addr });
    }

    /// Emit `apply`.
    pub fn emit_apply(&mut self, ty: Idx, func: &str, args: Vec<VarId>) -> VarId {
        self.emit_def(IrTy::object(ty), |dst| Instr::Apply {
            dst,
            ty,
            func: func.to_owned(),
            args,
        })
    }

    /// Emit `tuple`.
    pub fn emit_tuple(&mut self, ty: Idx, elements: Vec<VarId>) -> VarId {
        self.emit_def(IrTy::object(ty), |dst| Instr::Tuple { dst, ty, elements })
    }

    /// Emit `store`.
    pub fn emit_store(&mut self, value: VarId, addr: VarId) {
        self.push(Instr::Store { value, addr });
    }

    /// Emit `copy_addr`.
    pub fn emit_copy_addr(&mut self, src: VarId, dest: VarId) {
        self.push(Instr::CopyAddr { src, dest });
    }

    // Terminators

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current_block.index()];
        debug_assert!(
            block.terminator.is_none(),
            "block {} already terminated",
            self.current_block.raw()
        );
        block.terminator = Some(terminator);
    }

    /// Terminate with an unconditional `Branch`.
    pub fn terminate_branch(&mut self, target: BlockId, args: Vec<VarId>) {
        self.terminate(Terminator::Branch { target, args });
    }

    /// Terminate with a `CondBranch`.
    pub fn terminate_cond_branch(&mut self, cond: VarId, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        });
    }

    /// Terminate with `Return`.
    pub fn terminate_return(&mut self, value: Option<VarId>) {
        self.terminate(Terminator::Return { value });
    }

    /// Terminate with `Unwind`.
    pub fn terminate_unwind(&mut self) {
        self.terminate(Terminator::Unwind);
    }

    /// Terminate with `Unreachable`.
    pub fn terminate_unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    // Finalization

    /// Consume the builder and produce a finished [`IrFunction`].
    ///
    /// Unterminated blocks get `Unreachable` as a fallback (with a tracing
    /// warning).
    pub fn finish(self, name: &str) -> IrFunction {
        let blocks = self
            .blocks
            .into_iter()
            .map(|bb| {
                let terminator = bb.terminator.unwrap_or_else(|| {
                    tracing::warn!(block = bb.id.raw(), "unterminated block, adding Unreachable");
                    Terminator::Unreachable
                });
                Block {
                    id: bb.id,
                    params: bb.params,
                    body: bb.body,
                    terminator,
                }
            })
            .collect();

        IrFunction {
            name: name.to_owned(),
            blocks,
            layout: self.layout,
            entry: BlockId::new(0),
            var_types: self.var_types,
        }
    }
}

#[cfg(test)]
mod tests;
