//! Lowering context.
//!
//! [`LowerCtx`] is the mutable state shared by every pack-lowering
//! operation: the IR builder and its insertion point, the type pool, the
//! cleanup stack, the stack of active pack expansions, and the parameter
//! scope used by expression emission.

use std::ops::{Deref, DerefMut};

use pax_ir::{verify, IrBuilder, IrFunction, VarId};
use pax_types::{EnvId, Pool};
use rustc_hash::FxHashMap;

use crate::cleanup::{Cleanup, CleanupHandle, CleanupStack, CleanupState, ForUnwind};
use crate::config::LowerConfig;
use crate::expr::{ExprArena, ExprId};
use crate::scope::ParamScope;

/// Source location attached to emitted code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Loc {
    /// Code emitted on behalf of an expression.
    Expr(ExprId),
    /// Compiler-generated code with no source expression.
    Synthetic,
}

/// Per-loop record of a pack expansion being emitted.
///
/// Pushed for the duration of one dynamic pack loop; code emitted for the
/// loop body reads the current element through it.
#[derive(Clone, Debug, Default)]
pub struct ActiveExpansion {
    /// Element environment opened by the loop, if the pattern needs one.
    pub env: Option<EnvId>,
    /// The `dynamic_pack_index` of the current iteration. Set by the loop
    /// emitter once the index is available. Until then the record does not
    /// take part in element-context type mapping.
    pub index: Option<VarId>,
    /// Materialized tuple temporaries, keyed by their `MaterializePack`
    /// expression.
    pub materialized: FxHashMap<ExprId, VarId>,
}

impl ActiveExpansion {
    pub fn new(env: Option<EnvId>) -> Self {
        Self {
            env,
            index: None,
            materialized: FxHashMap::default(),
        }
    }

    /// The current expansion index.
    ///
    /// # Panics
    ///
    /// Panics if the loop emitter has not reached the body yet.
    pub fn expansion_index(&self) -> VarId {
        self.index
            .unwrap_or_else(|| panic!("expansion index read before the loop body was entered"))
    }
}

/// Mutable state of one lowering session.
pub struct LowerCtx<'a> {
    pub(crate) builder: IrBuilder,
    pub(crate) pool: &'a mut Pool,
    pub(crate) exprs: &'a ExprArena,
    pub(crate) scope: ParamScope,
    pub(crate) cleanups: CleanupStack,
    expansions: Vec<ActiveExpansion>,
    config: LowerConfig,
}

impl<'a> LowerCtx<'a> {
    /// Start lowering a function whose expressions live in `exprs`.
    pub fn new(pool: &'a mut Pool, exprs: &'a ExprArena, config: LowerConfig) -> Self {
        Self {
            builder: IrBuilder::new(),
            pool,
            exprs,
            scope: ParamScope::new(),
            cleanups: CleanupStack::new(),
            expansions: Vec::new(),
            config,
        }
    }

    // ── Accessors ───────────────────────────────────────────────

    #[inline]
    pub fn builder(&self) -> &IrBuilder {
        &self.builder
    }

    #[inline]
    pub fn builder_mut(&mut self) -> &mut IrBuilder {
        &mut self.builder
    }

    #[inline]
    pub fn pool(&self) -> &Pool {
        &*self.pool
    }

    #[inline]
    pub fn pool_mut(&mut self) -> &mut Pool {
        &mut *self.pool
    }

    #[inline]
    pub fn cleanups(&self) -> &CleanupStack {
        &self.cleanups
    }

    #[inline]
    pub fn config(&self) -> LowerConfig {
        self.config
    }

    /// Bind a named parameter to an IR value.
    pub fn bind_param(&mut self, name: &str, var: VarId) {
        self.scope.bind(name, var);
    }

    // ── Cleanups ────────────────────────────────────────────────

    /// Register a cleanup.
    pub fn push_cleanup(&mut self, cleanup: Cleanup, state: CleanupState) -> CleanupHandle {
        let handle = self.cleanups.push(cleanup, state);
        tracing::debug!(?handle, ?state, cleanup = %cleanup.dump(self.pool), "enter cleanup");
        self.trace_cleanup_stack();
        handle
    }

    /// Change the state of a registered cleanup.
    pub fn set_cleanup_state(&mut self, handle: CleanupHandle, state: CleanupState) {
        self.cleanups.set_state(handle, state);
        self.trace_cleanup_stack();
    }

    /// Disable a cleanup without emitting it.
    pub fn forward_cleanup(&mut self, handle: CleanupHandle) {
        self.cleanups.forward(handle);
        self.trace_cleanup_stack();
    }

    fn trace_cleanup_stack(&self) {
        if self.config.trace_cleanups {
            tracing::debug!(stack = %self.cleanups.dump(self.pool), "cleanup stack");
        }
    }

    /// Run `f` in a fresh cleanup scope.
    ///
    /// Cleanups registered by `f` are popped when it returns. If the
    /// insertion block is still open at that point, the active ones are
    /// emitted first, newest first.
    ///
    /// If `f` panics, the scope's cleanups are popped without being emitted.
    pub fn with_cleanup_scope<R>(&mut self, loc: Loc, f: impl FnOnce(&mut Self) -> R) -> R {
        let depth = self.cleanups.depth();
        let mut scoped = self.restoring(Some(depth), None);
        let result = f(&mut *scoped);
        if !scoped.builder.is_terminated() {
            scoped.emit_cleanups_above(depth, loc, ForUnwind::No);
        }
        result
    }

    /// Leave the function by unwinding.
    ///
    /// Emits every active cleanup on the stack, newest first, and terminates
    /// the current block with `unwind`. The stack is left untouched: other
    /// paths out of the same scopes still need the cleanups.
    pub fn emit_unwind(&mut self, loc: Loc) {
        tracing::debug!(depth = self.cleanups.depth(), "emitting unwind path");
        self.emit_cleanups_above(0, loc, ForUnwind::Yes);
        self.builder.terminate_unwind();
    }

    fn emit_cleanups_above(&mut self, depth: usize, loc: Loc, for_unwind: ForUnwind) {
        for cleanup in self.cleanups.active_above(depth) {
            cleanup.emit(self, loc, for_unwind);
        }
    }

    // ── Active expansions ───────────────────────────────────────

    /// Run `f` with `record` as the innermost active expansion.
    ///
    /// The record is popped on every exit from `f`, including a panic.
    ///
    /// # Panics
    ///
    /// Panics if `f` leaves the expansion stack unbalanced.
    pub fn with_active_expansion<R>(
        &mut self,
        record: ActiveExpansion,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let outer = self.expansions.len();
        let mut scoped = self.restoring(None, Some(outer));
        scoped.expansions.push(record);
        let result = f(&mut *scoped);
        assert_eq!(
            scoped.expansions.len(),
            outer + 1,
            "active expansions must be pushed and popped in strict nesting order"
        );
        result
    }

    /// The innermost active expansion, if any loop is being emitted.
    pub fn innermost_expansion(&self) -> Option<&ActiveExpansion> {
        self.expansions.last()
    }

    /// The innermost expansion whose loop body is being emitted.
    pub(crate) fn innermost_entered_expansion(&self) -> Option<&ActiveExpansion> {
        self.expansions.iter().rev().find(|e| e.index.is_some())
    }

    pub(crate) fn innermost_expansion_mut(&mut self) -> &mut ActiveExpansion {
        self.expansions
            .last_mut()
            .unwrap_or_else(|| panic!("no active pack expansion"))
    }

    /// The innermost active expansion.
    ///
    /// # Panics
    ///
    /// Panics outside of a dynamic pack loop.
    pub(crate) fn expect_innermost_expansion(&self) -> &ActiveExpansion {
        self.expansions
            .last()
            .unwrap_or_else(|| panic!("no active pack expansion"))
    }

    /// Number of nested active expansions.
    pub fn expansion_depth(&self) -> usize {
        self.expansions.len()
    }

    fn restoring(
        &mut self,
        cleanup_depth: Option<usize>,
        expansion_depth: Option<usize>,
    ) -> Restore<'_, 'a> {
        Restore {
            ctx: self,
            cleanup_depth,
            expansion_depth,
        }
    }

    // ── Finish ──────────────────────────────────────────────────

    /// Finish lowering and return the function.
    ///
    /// # Panics
    ///
    /// Panics if a pack loop is still open, or if verification is enabled
    /// and the function is malformed.
    pub fn finish(self, name: &str) -> IrFunction {
        assert!(
            self.expansions.is_empty(),
            "finished @{name} inside an active pack expansion"
        );
        let func = self.builder.finish(name);
        if self.config.verify_on_finish {
            if let Err(err) = verify(&func) {
                panic!(
                    "lowered IR for @{name} is malformed: {err}\n{}",
                    func.display(self.pool)
                );
            }
        }
        tracing::debug!(
            name,
            blocks = func.blocks.len(),
            vars = func.var_types.len(),
            "finished lowering"
        );
        func
    }
}

/// Truncates the cleanup and expansion stacks back to saved depths when
/// dropped, including while unwinding out of a panicking emitter.
struct Restore<'g, 'a> {
    ctx: &'g mut LowerCtx<'a>,
    cleanup_depth: Option<usize>,
    expansion_depth: Option<usize>,
}

impl Drop for Restore<'_, '_> {
    fn drop(&mut self) {
        if let Some(depth) = self.cleanup_depth {
            self.ctx.cleanups.truncate(depth);
        }
        if let Some(depth) = self.expansion_depth {
            self.ctx.expansions.truncate(depth);
        }
    }
}

impl<'a> Deref for Restore<'_, 'a> {
    type Target = LowerCtx<'a>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for Restore<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}
