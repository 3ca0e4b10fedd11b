//! Textual rendering of IR functions.
//!
//! The output is meant for debugging and snapshot-style tests:
//!
//! ```text
//! func @destroy {
//! bb0:
//!   %0 = alloc_pack type#12
//!   %1 = pack_length type#11
//!   br bb1(%1)
//! bb1(%2: Builtin.Word):
//!   ...
//! }
//! ```
//!
//! Types are printed by index. `IrFunction::display` takes a pool and
//! renders every type through `Pool::format_type` instead.

use std::fmt;

use pax_types::{Idx, Pool};

use crate::ir::{Block, Category, Instr, IrFunction, IrTy, Terminator, VarId};

struct Var(VarId);

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0.raw())
    }
}

/// A type index, named through the pool when one is available.
#[derive(Clone, Copy)]
struct TyName<'p> {
    idx: Idx,
    pool: Option<&'p Pool>,
}

impl fmt::Display for TyName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pool {
            Some(pool) => f.write_str(&pool.format_type(self.idx)),
            None => write!(f, "{}", self.idx),
        }
    }
}

struct Ty<'p>(IrTy, Option<&'p Pool>);

impl fmt::Display for Ty<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = TyName {
            idx: self.0.ty,
            pool: self.1,
        };
        match self.0.category {
            Category::Object => write!(f, "{name}"),
            Category::Address => write!(f, "*{name}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, vars: &[VarId]) -> fmt::Result {
    for (i, &v) in vars.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", Var(v))?;
    }
    Ok(())
}

fn write_instr(f: &mut fmt::Formatter<'_>, instr: &Instr, pool: Option<&Pool>) -> fmt::Result {
    let ty = |idx: Idx| TyName { idx, pool };
    if let Some(dst) = instr.defined_var() {
        write!(f, "{} = ", Var(dst))?;
    }
    f.write_str(instr.opcode())?;
    match instr {
        Instr::IntegerLiteral { ty: lit_ty, value, .. } => {
            write!(f, " {}, {value}", ty(*lit_ty))
        }
        Instr::Builtin { op, args, .. } => {
            write!(f, " \"{}\"(", op.name())?;
            write_list(f, args)?;
            f.write_str(")")
        }
        Instr::AllocPack { pack_ty, .. } => write!(f, " {}", ty(*pack_ty)),
        Instr::AllocStack { ty: alloc_ty, .. } => write!(f, " {}", ty(*alloc_ty)),
        Instr::PackLength { pack_ty, .. } => write!(f, " {}", ty(*pack_ty)),
        Instr::DeallocPack { addr } | Instr::DestroyAddr { addr } => {
            write!(f, " {}", Var(*addr))
        }
        Instr::ScalarPackIndex {
            component, pack_ty, ..
        } => write!(f, " {component} of {}", ty(*pack_ty)),
        Instr::DynamicPackIndex { index, pack_ty, .. } => {
            write!(f, " {} of {}", Var(*index), ty(*pack_ty))
        }
        Instr::PackPackIndex {
            component,
            inner,
            pack_ty,
            ..
        } => write!(f, " {component}, {} of {}", Var(*inner), ty(*pack_ty)),
        Instr::PackElementGet {
            index,
            pack,
            elem_ty,
            ..
        } => write!(f, " {} of {} as *{}", Var(*index), Var(*pack), ty(*elem_ty)),
        Instr::TuplePackElementAddr {
            index,
            tuple,
            elem_ty,
            ..
        } => write!(f, " {} of {} as *{}", Var(*index), Var(*tuple), ty(*elem_ty)),
        Instr::OpenPackElement { index, env } => write!(f, " {} for {env}", Var(*index)),
        Instr::Apply { func, args, .. } => {
            write!(f, " @{func}(")?;
            write_list(f, args)?;
            f.write_str(")")
        }
        Instr::Tuple { elements, .. } => {
            f.write_str(" (")?;
            write_list(f, elements)?;
            f.write_str(")")
        }
        Instr::Store { value, addr } => write!(f, " {} to {}", Var(*value), Var(*addr)),
        Instr::CopyAddr { src, dest } => write!(f, " {} to {}", Var(*src), Var(*dest)),
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_instr(f, self, None)
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Branch { target, args } => {
                write!(f, "br bb{}(", target.raw())?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "cond_br {}, bb{}, bb{}",
                Var(*cond),
                then_block.raw(),
                else_block.raw()
            ),
            Terminator::Return { value: Some(v) } => write!(f, "return {}", Var(*v)),
            Terminator::Return { value: None } => f.write_str("return"),
            Terminator::Unwind => f.write_str("unwind"),
            Terminator::Unreachable => f.write_str("unreachable"),
        }
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, block: &Block, pool: Option<&Pool>) -> fmt::Result {
    write!(f, "bb{}", block.id.raw())?;
    if !block.params.is_empty() {
        f.write_str("(")?;
        for (i, (var, ty)) in block.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", Var(*var), Ty(*ty, pool))?;
        }
        f.write_str(")")?;
    }
    f.write_str(":\n")?;
    for instr in &block.body {
        f.write_str("  ")?;
        write_instr(f, instr, pool)?;
        f.write_str("\n")?;
    }
    writeln!(f, "  {}", block.terminator)
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_block(f, self, None)
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, func: &IrFunction, pool: Option<&Pool>) -> fmt::Result {
    writeln!(f, "func @{} {{", func.name)?;
    for block in func.blocks_in_layout() {
        write_block(f, block, pool)?;
    }
    f.write_str("}\n")
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_function(f, self, None)
    }
}

/// An `IrFunction` rendered with readable type names.
///
/// Created by [`IrFunction::display`].
pub struct FunctionDisplay<'a> {
    func: &'a IrFunction,
    pool: &'a Pool,
}

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_function(f, self.func, Some(self.pool))
    }
}

impl IrFunction {
    /// Render this function with every type formatted through `pool`.
    pub fn display<'a>(&'a self, pool: &'a Pool) -> FunctionDisplay<'a> {
        FunctionDisplay { func: self, pool }
    }
}
