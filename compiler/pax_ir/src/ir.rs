//! Pax IR, an SSA basic-block intermediate representation.
//!
//! IR generation lowers type-checked expressions into this IR. It follows
//! the same basic-block structure as LLVM IR and Rust's MIR, with block
//! parameters in place of phi nodes:
//!
//! - **[`IrFunction`]**: blocks in layout order plus variable types
//! - **[`Block`]**: parameters, body instructions, terminator
//! - **[`Instr`]**: a single instruction
//! - **[`Terminator`]**: block exit (branch, conditional branch, return,
//!   unwind)
//!
//! The only pack primitives are address-level: allocate a pack buffer,
//! build a pack index, project an element address, destroy an element.

use pax_types::{EnvId, Idx};
use smallvec::{smallvec, SmallVec};

// ── ID newtypes ─────────────────────────────────────────────────────

/// SSA value ID within an [`IrFunction`].
///
/// IDs are allocated sequentially starting from 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VarId(u32);

impl VarId {
    /// Create a new variable ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block ID within an [`IrFunction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a new block ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Value types ─────────────────────────────────────────────────────

/// Whether an IR value is the value itself or the address of storage
/// holding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Object,
    Address,
}

/// Type of an IR value: a pool type plus its value category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IrTy {
    pub ty: Idx,
    pub category: Category,
}

impl IrTy {
    /// An object (loaded value) of type `ty`.
    #[inline]
    pub fn object(ty: Idx) -> Self {
        Self {
            ty,
            category: Category::Object,
        }
    }

    /// The address of storage of type `ty`.
    #[inline]
    pub fn address(ty: Idx) -> Self {
        Self {
            ty,
            category: Category::Address,
        }
    }

    /// Whether this is an address type.
    #[inline]
    pub fn is_address(self) -> bool {
        self.category == Category::Address
    }

    pub const WORD: Self = Self {
        ty: Idx::WORD,
        category: Category::Object,
    };

    pub const INT1: Self = Self {
        ty: Idx::INT1,
        category: Category::Object,
    };

    pub const PACK_INDEX: Self = Self {
        ty: Idx::PACK_INDEX,
        category: Category::Object,
    };
}

// ── Builtins ────────────────────────────────────────────────────────

/// Builtin binary functions on machine words.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Equality comparison, producing `Builtin.Int1`.
    CmpEq,
}

impl BuiltinOp {
    /// The builtin's name as printed in the IR.
    pub fn name(self) -> &'static str {
        match self {
            BuiltinOp::Add => "add",
            BuiltinOp::Sub => "sub",
            BuiltinOp::CmpEq => "cmp_eq",
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// A single instruction in a basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instr {
    /// `let dst: ty = value`.
    IntegerLiteral { dst: VarId, ty: Idx, value: u64 },

    /// `let dst = builtin op(args...)`.
    Builtin {
        dst: VarId,
        op: BuiltinOp,
        args: SmallVec<[VarId; 2]>,
    },

    /// Allocate an uninitialized pack buffer; `dst` is its address.
    AllocPack { dst: VarId, pack_ty: Idx },

    /// Deallocate a pack buffer. All elements must already be destroyed.
    DeallocPack { addr: VarId },

    /// Allocate uninitialized stack storage of type `ty`.
    AllocStack { dst: VarId, ty: Idx },

    /// Runtime length of a formal pack type, as a word.
    PackLength { dst: VarId, pack_ty: Idx },

    /// Index of the single element of scalar component `component`.
    ScalarPackIndex {
        dst: VarId,
        component: u32,
        pack_ty: Idx,
    },

    /// Index of element `index` of a pack with one expansion component.
    DynamicPackIndex {
        dst: VarId,
        index: VarId,
        pack_ty: Idx,
    },

    /// Lift an index into component `component` to an index into the
    /// whole of `pack_ty`.
    PackPackIndex {
        dst: VarId,
        component: u32,
        inner: VarId,
        pack_ty: Idx,
    },

    /// Address of the element at `index` in the pack at `pack`.
    PackElementGet {
        dst: VarId,
        index: VarId,
        pack: VarId,
        elem_ty: Idx,
    },

    /// Address of the element at `index` in the tuple at `tuple`.
    TuplePackElementAddr {
        dst: VarId,
        index: VarId,
        tuple: VarId,
        elem_ty: Idx,
    },

    /// Bind the element archetypes of `env` to the element at `index`.
    OpenPackElement { index: VarId, env: EnvId },

    /// Destroy the value stored at `addr`, leaving it uninitialized.
    DestroyAddr { addr: VarId },

    /// Call `func(args...)`.
    Apply {
        dst: VarId,
        ty: Idx,
        func: String,
        args: Vec<VarId>,
    },

    /// Aggregate `elements` into a tuple value.
    Tuple {
        dst: VarId,
        ty: Idx,
        elements: Vec<VarId>,
    },

    /// Initialize the storage at `addr` with `value`.
    Store { value: VarId, addr: VarId },

    /// Copy-initialize the storage at `dest` from the storage at `src`.
    CopyAddr { src: VarId, dest: VarId },
}

impl Instr {
    /// Returns the variable defined by this instruction, if any.
    pub fn defined_var(&self) -> Option<VarId> {
        match self {
            Instr::IntegerLiteral { dst, .. }
            | Instr::Builtin { dst, .. }
            | Instr::AllocPack { dst, .. }
            | Instr::AllocStack { dst, .. }
            | Instr::PackLength { dst, .. }
            | Instr::ScalarPackIndex { dst, .. }
            | Instr::DynamicPackIndex { dst, .. }
            | Instr::PackPackIndex { dst, .. }
            | Instr::PackElementGet { dst, .. }
            | Instr::TuplePackElementAddr { dst, .. }
            | Instr::Apply { dst, .. }
            | Instr::Tuple { dst, .. } => Some(*dst),

            Instr::DeallocPack { .. }
            | Instr::OpenPackElement { .. }
            | Instr::DestroyAddr { .. }
            | Instr::Store { .. }
            | Instr::CopyAddr { .. } => None,
        }
    }

    /// Returns all variables read by this instruction.
    pub fn used_vars(&self) -> SmallVec<[VarId; 4]> {
        match self {
            Instr::IntegerLiteral { .. }
            | Instr::AllocPack { .. }
            | Instr::AllocStack { .. }
            | Instr::PackLength { .. }
            | Instr::ScalarPackIndex { .. } => SmallVec::new(),

            Instr::Builtin { args, .. } => args.iter().copied().collect(),
            Instr::Apply { args, .. } => args.iter().copied().collect(),
            Instr::Tuple { elements, .. } => elements.iter().copied().collect(),

            Instr::DeallocPack { addr } | Instr::DestroyAddr { addr } => smallvec![*addr],
            Instr::DynamicPackIndex { index, .. } | Instr::OpenPackElement { index, .. } => {
                smallvec![*index]
            }
            Instr::PackPackIndex { inner, .. } => smallvec![*inner],
            Instr::PackElementGet { index, pack, .. } => smallvec![*index, *pack],
            Instr::TuplePackElementAddr { index, tuple, .. } => smallvec![*index, *tuple],
            Instr::Store { value, addr } => smallvec![*value, *addr],
            Instr::CopyAddr { src, dest } => smallvec![*src, *dest],
        }
    }

    /// Short mnemonic used by the printer and by tests that count opcodes.
    pub fn opcode(&self) -> &'static str {
        match self {
            Instr::IntegerLiteral { .. } => "integer_literal",
            Instr::Builtin { .. } => "builtin",
            Instr::AllocPack { .. } => "alloc_pack",
            Instr::DeallocPack { .. } => "dealloc_pack",
            Instr::AllocStack { .. } => "alloc_stack",
            Instr::PackLength { .. } => "pack_length",
            Instr::ScalarPackIndex { .. } => "scalar_pack_index",
            Instr::DynamicPackIndex { .. } => "dynamic_pack_index",
            Instr::PackPackIndex { .. } => "pack_pack_index",
            Instr::PackElementGet { .. } => "pack_element_get",
            Instr::TuplePackElementAddr { .. } => "tuple_pack_element_addr",
            Instr::OpenPackElement { .. } => "open_pack_element",
            Instr::DestroyAddr { .. } => "destroy_addr",
            Instr::Apply { .. } => "apply",
            Instr::Tuple { .. } => "tuple",
            Instr::Store { .. } => "store",
            Instr::CopyAddr { .. } => "copy_addr",
        }
    }
}

// ── Terminators ─────────────────────────────────────────────────────

/// Block terminator: how control leaves a basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Terminator {
    /// Unconditional branch, passing arguments to the target's parameters.
    Branch { target: BlockId, args: Vec<VarId> },

    /// Conditional branch on a `Builtin.Int1`.
    CondBranch {
        cond: VarId,
        then_block: BlockId,
        else_block: BlockId,
    },

    /// Return from the function.
    Return { value: Option<VarId> },

    /// Leave the function by unwinding, after the unwind cleanups ran.
    Unwind,

    /// Marks a block as unreachable.
    Unreachable,
}

impl Terminator {
    /// Returns all variables read by this terminator.
    pub fn used_vars(&self) -> SmallVec<[VarId; 4]> {
        match self {
            Terminator::Branch { args, .. } => args.iter().copied().collect(),
            Terminator::CondBranch { cond, .. } => smallvec![*cond],
            Terminator::Return { value } => value.iter().copied().collect(),
            Terminator::Unwind | Terminator::Unreachable => SmallVec::new(),
        }
    }

    /// Successor blocks, in branch order.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::Branch { target, .. } => smallvec![*target],
            Terminator::CondBranch {
                then_block,
                else_block,
                ..
            } => smallvec![*then_block, *else_block],
            Terminator::Return { .. } | Terminator::Unwind | Terminator::Unreachable => {
                SmallVec::new()
            }
        }
    }
}

// ── Blocks ──────────────────────────────────────────────────────────

/// A basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    /// This block's identifier.
    pub id: BlockId,
    /// Block parameters: values passed by predecessors' branches.
    pub params: Vec<(VarId, IrTy)>,
    /// Sequential instructions executed in order.
    pub body: Vec<Instr>,
    /// How control leaves this block.
    pub terminator: Terminator,
}

// ── Functions ───────────────────────────────────────────────────────

/// A complete function in the IR.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IrFunction {
    /// The function's name.
    pub name: String,
    /// Blocks indexed by `BlockId::index()`.
    pub blocks: Vec<Block>,
    /// Block emission order; `layout[0]` is the entry block.
    pub layout: Vec<BlockId>,
    /// The entry block ID.
    pub entry: BlockId,
    /// Type of each variable, indexed by `VarId::index()`.
    pub var_types: Vec<IrTy>,
}

impl IrFunction {
    /// Look up a block by ID.
    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Look up the type of a variable.
    ///
    /// # Panics
    ///
    /// Debug-panics if `var` is out of bounds.
    #[inline]
    pub fn var_type(&self, var: VarId) -> IrTy {
        debug_assert!(
            var.index() < self.var_types.len(),
            "VarId {} out of bounds (have {} vars)",
            var.raw(),
            self.var_types.len(),
        );
        self.var_types[var.index()]
    }

    /// Blocks in layout order.
    pub fn blocks_in_layout(&self) -> impl Iterator<Item = &Block> + '_ {
        self.layout.iter().map(|&id| self.block(id))
    }

    /// All instructions in layout order.
    pub fn instrs(&self) -> impl Iterator<Item = &Instr> + '_ {
        self.blocks_in_layout().flat_map(|b| b.body.iter())
    }

    /// Count instructions with the given opcode.
    pub fn count_opcode(&self, opcode: &str) -> usize {
        self.instrs().filter(|i| i.opcode() == opcode).count()
    }

    /// Find the instruction that defines `var`, if it is not a block
    /// parameter.
    pub fn defining_instr(&self, var: VarId) -> Option<&Instr> {
        self.instrs().find(|i| i.defined_var() == Some(var))
    }
}
