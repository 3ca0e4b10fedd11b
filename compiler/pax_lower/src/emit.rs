//! Expression emission.
//!
//! Lowers [`ExprKind`] trees into IR, and drives pack expansions end to end:
//! expansion initialization, the dynamic loop (with its materialize
//! pre-pass), and per-element initialization of the destination storage.

use pax_ir::{IrTy, VarId};
use pax_types::Idx;

use crate::cleanup::{CleanupHandle, CleanupState};
use crate::context::{Loc, LowerCtx};
use crate::expr::{ExprId, ExprKind, WalkAction, walk_expr};
use crate::init::{
    ExpansionInitialization, PackExpansionInitialization, TuplePackExpansionInitialization,
};

impl LowerCtx<'_> {
    /// Lower the formal type `ty` and apply the innermost element
    /// environment.
    fn type_in_context(&mut self, ty: Idx) -> Idx {
        let lowered = self.pool.lower_type(ty);
        self.map_into_innermost_element_context(lowered)
    }

    /// Emit `id` as a value. Element projections yield addresses.
    ///
    /// # Panics
    ///
    /// Panics on unbound parameters, on pack elements outside a pack loop,
    /// and on pack expansions, which have no value of their own.
    pub fn emit_expr(&mut self, id: ExprId) -> VarId {
        let exprs = self.exprs;
        let expr = exprs.get(id);
        match &expr.kind {
            ExprKind::Int(value) => {
                let ty = self.type_in_context(expr.ty);
                self.builder
                    .emit_integer_literal(ty, u64::from_ne_bytes(value.to_ne_bytes()))
            }
            ExprKind::Param(name) => self
                .scope
                .lookup(name)
                .unwrap_or_else(|| panic!("unbound parameter `{name}`")),
            ExprKind::Call { func, args } => {
                let args = args.iter().map(|&arg| self.emit_expr(arg)).collect();
                let ty = self.type_in_context(expr.ty);
                self.builder.emit_apply(ty, func, args)
            }
            ExprKind::Tuple(elems) => {
                let elems = elems.iter().map(|&elem| self.emit_expr(elem)).collect();
                let ty = self.type_in_context(expr.ty);
                self.builder.emit_tuple(ty, elems)
            }
            ExprKind::PackElement { pack } => self.emit_pack_element_addr(id, *pack),
            ExprKind::MaterializePack { .. } => self.materialized_temporary(id),
            ExprKind::PackExpansion { .. } => panic!(
                "pack expansion #{} has no value; emit it into a pack or tuple",
                id.raw()
            ),
        }
    }

    /// Emit `id` into the uninitialized storage at `addr`.
    pub fn emit_expr_into(&mut self, id: ExprId, addr: VarId) {
        let value = self.emit_expr(id);
        self.emit_value_into(value, addr);
    }

    fn emit_value_into(&mut self, value: VarId, addr: VarId) {
        if self.builder.var_type(value).is_address() {
            self.builder.emit_copy_addr(value, addr);
        } else {
            self.builder.emit_store(value, addr);
        }
    }

    fn emit_pack_element_addr(&mut self, id: ExprId, pack: ExprId) -> VarId {
        let exprs = self.exprs;
        let elem_ty = self.type_in_context(exprs.get(id).ty);
        let index = self.expect_innermost_expansion().expansion_index();
        match &exprs.get(pack).kind {
            ExprKind::Param(_) => {
                let pack_addr = self.emit_expr(pack);
                self.builder.emit_pack_element_get(index, pack_addr, elem_ty)
            }
            ExprKind::MaterializePack { .. } => {
                let tuple_addr = self.materialized_temporary(pack);
                self.builder
                    .emit_tuple_pack_element_addr(index, tuple_addr, elem_ty)
            }
            other => panic!("cannot take a pack element of {other:?}"),
        }
    }

    fn materialized_temporary(&self, id: ExprId) -> VarId {
        self.expect_innermost_expansion()
            .materialized
            .get(&id)
            .copied()
            .unwrap_or_else(|| panic!("pack #{} was not materialized by its loop", id.raw()))
    }

    // ── Materialize pre-pass ────────────────────────────────────

    /// Evaluate every `MaterializePack` in the pattern of `expansion` into a
    /// temporary, once, before the loop header.
    ///
    /// Nested pack expansions are skipped; their own loops materialize
    /// their packs. Each `MaterializePack` gets its own temporary.
    pub(crate) fn prepare_to_emit_pack_expansion(&mut self, expansion: ExprId) {
        let exprs = self.exprs;
        let ExprKind::PackExpansion { pattern, .. } = exprs.get(expansion).kind else {
            panic!("expression #{} is not a pack expansion", expansion.raw());
        };
        walk_expr(exprs, pattern, &mut |id, expr| match expr.kind {
            ExprKind::PackExpansion { .. } => WalkAction::SkipChildren,
            ExprKind::MaterializePack { from } => {
                self.materialize_pack(id, from);
                WalkAction::SkipChildren
            }
            _ => WalkAction::Continue,
        });
    }

    fn materialize_pack(&mut self, id: ExprId, from: ExprId) {
        let from_ty = self.exprs.get(from).ty;
        assert!(
            self.pool.is_tuple(from_ty),
            "materialized pack #{} is built from non-tuple {}",
            id.raw(),
            self.pool.format_type(from_ty)
        );
        let lowered = self.type_in_context(from_ty);
        let temp = self.builder.emit_alloc_stack(lowered);
        self.emit_expr_into(from, temp);
        if !self.pool.is_trivial(lowered) {
            self.enter_destroy_value_cleanup(temp, CleanupState::Active);
        }
        tracing::debug!(expr = id.raw(), temp = temp.raw(), "materialized pack");
        self.innermost_expansion_mut().materialized.insert(id, temp);
    }

    // ── Pack expansions ─────────────────────────────────────────

    /// Emit the pack expansion `expansion` into expansion component
    /// `component` of the pack at `pack_addr`.
    ///
    /// Returns the now-active cleanup that destroys the component, if its
    /// elements need one.
    pub fn emit_pack_expansion_into_pack(
        &mut self,
        expansion: ExprId,
        pack_addr: VarId,
        formal_pack: Idx,
        component: u32,
    ) -> Option<CleanupHandle> {
        let init = PackExpansionInitialization::create(self, pack_addr, formal_pack, component);
        self.emit_expansion_into(expansion, &init);
        init.cleanup()
    }

    /// Emit the pack expansion `expansion` into expansion component
    /// `component` of the tuple at `tuple_addr`.
    pub fn emit_pack_expansion_into_tuple(
        &mut self,
        expansion: ExprId,
        tuple_addr: VarId,
        tuple_ty: Idx,
        component: u32,
    ) -> Option<CleanupHandle> {
        let induced_pack = self.pool.induced_pack_type(tuple_ty);
        let init =
            TuplePackExpansionInitialization::create(self, tuple_addr, induced_pack, component);
        self.emit_expansion_into(expansion, &init);
        init.cleanup()
    }

    fn emit_expansion_into(&mut self, expansion: ExprId, init: &impl ExpansionInitialization) {
        let exprs = self.exprs;
        let ExprKind::PackExpansion { pattern, .. } = exprs.get(expansion).kind else {
            panic!("expression #{} is not a pack expansion", expansion.raw());
        };
        let component_ty = init.lowered_component_type(self);
        let (env, _) = self.create_opened_element_value_environment(component_ty);

        self.emit_dynamic_pack_loop(
            Loc::Expr(expansion),
            init.formal_pack_type(),
            init.component_index(),
            env,
            |ctx, indices| {
                let pattern_ty = ctx.type_in_context(exprs.get(pattern).ty);
                if init.can_perform_in_place(ctx, IrTy::address(pattern_ty)) {
                    init.perform(ctx, indices.index_within_component, |ctx, elem| {
                        ctx.emit_expr_into(pattern, elem.address());
                        elem.finish_initialization(ctx);
                    });
                } else {
                    let value = ctx.emit_expr(pattern);
                    init.perform(ctx, indices.index_within_component, |ctx, elem| {
                        ctx.emit_value_into(value, elem.address());
                        elem.finish_initialization(ctx);
                    });
                }
            },
        );

        init.finish(self);
    }
}
