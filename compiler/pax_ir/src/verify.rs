//! Structural IR verifier.
//!
//! Catches malformed IR produced by lowering bugs before it reaches later
//! passes: unterminated or dangling control flow, branch/parameter arity
//! mismatches, and SSA violations.

use rustc_hash::FxHashSet;

use crate::ir::{BlockId, IrFunction, Terminator, VarId};

/// A structural defect found by [`verify`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("block bb{block} appears in the layout more than once")]
    DuplicateLayout { block: u32 },

    #[error("block bb{block} is missing from the layout")]
    MissingFromLayout { block: u32 },

    #[error("bb{from} branches to nonexistent block bb{target}")]
    DanglingTarget { from: u32, target: u32 },

    #[error("bb{from} passes {found} arguments to bb{target}, which takes {expected}")]
    ArityMismatch {
        from: u32,
        target: u32,
        expected: usize,
        found: usize,
    },

    #[error("%{var} is defined more than once")]
    Redefined { var: u32 },

    #[error("%{var} is used in bb{block} but never defined")]
    Undefined { var: u32, block: u32 },
}

/// Verify the structural well-formedness of `func`.
///
/// Returns the first defect found.
pub fn verify(func: &IrFunction) -> Result<(), VerifyError> {
    check_layout(func)?;

    let mut defined = FxHashSet::default();
    for block in &func.blocks {
        for &(param, _) in &block.params {
            define(&mut defined, param)?;
        }
        for instr in &block.body {
            if let Some(dst) = instr.defined_var() {
                define(&mut defined, dst)?;
            }
        }
    }

    for block in &func.blocks {
        let from = block.id.raw();
        for instr in &block.body {
            for var in instr.used_vars() {
                check_defined(&defined, var, block.id)?;
            }
        }
        for var in block.terminator.used_vars() {
            check_defined(&defined, var, block.id)?;
        }

        for target in block.terminator.successors() {
            let Some(succ) = func.blocks.get(target.index()) else {
                return Err(VerifyError::DanglingTarget {
                    from,
                    target: target.raw(),
                });
            };
            let found = match &block.terminator {
                Terminator::Branch { args, .. } => args.len(),
                _ => 0,
            };
            if succ.params.len() != found {
                return Err(VerifyError::ArityMismatch {
                    from,
                    target: target.raw(),
                    expected: succ.params.len(),
                    found,
                });
            }
        }
    }

    Ok(())
}

fn check_layout(func: &IrFunction) -> Result<(), VerifyError> {
    let mut seen = FxHashSet::default();
    for &id in &func.layout {
        if !seen.insert(id) {
            return Err(VerifyError::DuplicateLayout { block: id.raw() });
        }
    }
    for block in &func.blocks {
        if !seen.contains(&block.id) {
            return Err(VerifyError::MissingFromLayout {
                block: block.id.raw(),
            });
        }
    }
    Ok(())
}

fn define(defined: &mut FxHashSet<VarId>, var: VarId) -> Result<(), VerifyError> {
    if defined.insert(var) {
        Ok(())
    } else {
        Err(VerifyError::Redefined { var: var.raw() })
    }
}

fn check_defined(
    defined: &FxHashSet<VarId>,
    var: VarId,
    block: BlockId,
) -> Result<(), VerifyError> {
    if defined.contains(&var) {
        Ok(())
    } else {
        Err(VerifyError::Undefined {
            var: var.raw(),
            block: block.raw(),
        })
    }
}
