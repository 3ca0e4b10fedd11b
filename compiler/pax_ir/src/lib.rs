//! SSA IR for pack-aware code generation.
//!
//! The crate provides the IR data model ([`ir`]), a builder with an
//! implicit insertion point ([`IrBuilder`]), a textual printer (via
//! `Display`), a structural verifier ([`verify`]), and a reference
//! interpreter ([`interp`]) that executes lowered code against concrete
//! pack lengths while tracking the liveness of every storage slot.

mod builder;
mod format;
pub mod interp;
pub mod ir;
pub mod verify;

pub use builder::IrBuilder;
pub use format::FunctionDisplay;
pub use ir::{
    Block, BlockId, BuiltinOp, Category, Instr, IrFunction, IrTy, Terminator, VarId,
};
pub use verify::{verify, VerifyError};
