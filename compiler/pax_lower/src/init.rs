//! Initializing the expansion component of a pack or tuple.
//!
//! An expansion initialization is a sink for "element `i` of component
//! `c`", used from inside the dynamic pack loop that visits the component.
//! Its cleanups follow a fixed protocol:
//!
//! 1. `create` registers a dormant partial destroy of the whole component.
//!    It must not fire on exits before the loop has run.
//! 2. Each `perform` registers an active partial destroy of `[0, i)`,
//!    projects the element address, and hands the caller a
//!    [`TemporaryInit`] with a dormant destroy of the element. When the
//!    caller returns, both cleanups are forwarded: the elements they
//!    protect are now the responsibility of the outer cleanup.
//! 3. `finish` activates the outer cleanup.
//!
//! Elements of trivial type get no cleanups at all.

use pax_ir::{IrTy, VarId};
use pax_types::Idx;

use crate::cleanup::{CleanupHandle, CleanupState};
use crate::context::LowerCtx;

/// Single-element initialization handed to `perform` callbacks.
#[derive(Debug)]
pub struct TemporaryInit {
    addr: VarId,
    cleanup: Option<CleanupHandle>,
}

impl TemporaryInit {
    /// Address of the storage being initialized.
    #[inline]
    pub fn address(&self) -> VarId {
        self.addr
    }

    /// The element's destroy cleanup, dormant until initialization
    /// finishes.
    #[inline]
    pub fn cleanup(&self) -> Option<CleanupHandle> {
        self.cleanup
    }

    /// Record that the storage now holds a value.
    pub fn finish_initialization(&mut self, ctx: &mut LowerCtx<'_>) {
        if let Some(handle) = self.cleanup {
            ctx.set_cleanup_state(handle, CleanupState::Active);
        }
    }

    fn forward(self, ctx: &mut LowerCtx<'_>) {
        if let Some(handle) = self.cleanup {
            ctx.forward_cleanup(handle);
        }
    }
}

impl LowerCtx<'_> {
    /// Index into `formal_pack` of the innermost expansion's current
    /// element, which lives in component `component`.
    ///
    /// # Panics
    ///
    /// Panics outside of a dynamic pack loop body.
    pub fn emit_pack_pack_index_for_active_expansion(
        &mut self,
        formal_pack: Idx,
        component: u32,
    ) -> VarId {
        let index = self.expect_innermost_expansion().expansion_index();
        if self.pool.num_pack_components(formal_pack) == 1 {
            index
        } else {
            self.builder
                .emit_pack_pack_index(component, index, formal_pack)
        }
    }

    /// `ty` with the element environment of the innermost entered expansion
    /// applied.
    ///
    /// An expansion whose loop body has not been reached yet is skipped:
    /// code emitted before its header runs in the enclosing context.
    pub fn map_into_innermost_element_context(&mut self, ty: Idx) -> Idx {
        match self.innermost_entered_expansion().and_then(|e| e.env) {
            Some(env) => self.pool.map_pack_type_into_element_context(env, ty),
            None => ty,
        }
    }
}

/// Sink for the elements of one expansion component.
///
/// Implemented for packs and tuples; they differ only in how an element
/// address is projected and which partial-destroy cleanup protects a
/// prefix of the component.
pub trait ExpansionInitialization {
    /// Formal pack type the pack indices range over.
    fn formal_pack_type(&self) -> Idx;

    fn component_index(&self) -> u32;

    /// Lowered type of the expansion component being initialized.
    fn lowered_component_type(&self, ctx: &LowerCtx<'_>) -> Idx;

    /// Project the address of the element at `pack_index`.
    fn project_element(&self, ctx: &mut LowerCtx<'_>, pack_index: VarId, elem_ty: Idx) -> VarId;

    /// Register an active partial destroy of `[0, limit)` of the component.
    fn enter_partial_destroy_cleanup(
        &self,
        ctx: &mut LowerCtx<'_>,
        limit: Option<VarId>,
    ) -> CleanupHandle;

    /// The outer cleanup of the whole component, if the element type needs
    /// one.
    fn cleanup(&self) -> Option<CleanupHandle>;

    fn set_cleanup(&mut self, handle: CleanupHandle);

    /// Register the dormant outer cleanup.
    ///
    /// # Panics
    ///
    /// Panics if the outer cleanup has already been entered.
    fn enter_dormant_cleanup(&mut self, ctx: &mut LowerCtx<'_>) {
        assert!(
            self.cleanup().is_none(),
            "expansion initialization entered its cleanup twice"
        );
        let component_ty = self.lowered_component_type(ctx);
        if ctx.pool().is_trivial(component_ty) {
            return;
        }
        let handle = self.enter_partial_destroy_cleanup(ctx, None);
        ctx.set_cleanup_state(handle, CleanupState::Dormant);
        self.set_cleanup(handle);
    }

    /// Element type of the current iteration, with the innermost element
    /// environment applied.
    fn element_type(&self, ctx: &mut LowerCtx<'_>) -> Idx {
        let component_ty = self.lowered_component_type(ctx);
        let (pattern, _) = ctx
            .pool()
            .expansion_parts(component_ty)
            .unwrap_or_else(|| panic!("component {} is not an expansion", self.component_index()));
        ctx.map_into_innermost_element_context(pattern)
    }

    /// Whether a value whose address type is `proposed` can be built
    /// directly in the element storage.
    fn can_perform_in_place(&self, ctx: &mut LowerCtx<'_>, proposed: IrTy) -> bool {
        proposed.is_address() && proposed.ty == self.element_type(ctx)
    }

    /// Address of the current element, without any cleanups.
    ///
    /// # Panics
    ///
    /// Panics if `elem_addr_ty` is not an address type.
    fn address_for_in_place(&self, ctx: &mut LowerCtx<'_>, elem_addr_ty: IrTy) -> VarId {
        assert!(
            elem_addr_ty.is_address(),
            "in-place pack initialization needs an address type"
        );
        let pack_index = ctx
            .emit_pack_pack_index_for_active_expansion(self.formal_pack_type(), self.component_index());
        self.project_element(ctx, pack_index, elem_addr_ty.ty)
    }

    /// Initialize the current element through `f`.
    ///
    /// `index_within_component` is the loop's position in the component;
    /// elements before it are live and are destroyed if `f` exits abruptly.
    fn perform<'a>(
        &self,
        ctx: &mut LowerCtx<'a>,
        index_within_component: VarId,
        f: impl FnOnce(&mut LowerCtx<'a>, &mut TemporaryInit),
    ) {
        ctx.assert_word(index_within_component);
        let prefix_cleanup = self
            .cleanup()
            .map(|_| self.enter_partial_destroy_cleanup(ctx, Some(index_within_component)));

        let elem_ty = self.element_type(ctx);
        let addr = self.address_for_in_place(ctx, IrTy::address(elem_ty));
        let elem_cleanup = (!ctx.pool().is_trivial(elem_ty))
            .then(|| ctx.enter_destroy_value_cleanup(addr, CleanupState::Dormant));

        let mut temp = TemporaryInit {
            addr,
            cleanup: elem_cleanup,
        };
        f(ctx, &mut temp);

        if let Some(handle) = prefix_cleanup {
            ctx.forward_cleanup(handle);
        }
        temp.forward(ctx);
    }

    /// Activate the outer cleanup once every element is initialized.
    fn finish(&self, ctx: &mut LowerCtx<'_>) {
        if let Some(handle) = self.cleanup() {
            ctx.set_cleanup_state(handle, CleanupState::Active);
        }
    }
}

/// Initialization of an expansion component of a pack.
#[derive(Debug)]
pub struct PackExpansionInitialization {
    pack_addr: VarId,
    formal_pack: Idx,
    component: u32,
    cleanup: Option<CleanupHandle>,
}

impl PackExpansionInitialization {
    pub fn create(
        ctx: &mut LowerCtx<'_>,
        pack_addr: VarId,
        formal_pack: Idx,
        component: u32,
    ) -> Self {
        let mut init = Self {
            pack_addr,
            formal_pack,
            component,
            cleanup: None,
        };
        init.enter_dormant_cleanup(ctx);
        init
    }
}

impl ExpansionInitialization for PackExpansionInitialization {
    fn formal_pack_type(&self) -> Idx {
        self.formal_pack
    }

    fn component_index(&self) -> u32 {
        self.component
    }

    fn lowered_component_type(&self, ctx: &LowerCtx<'_>) -> Idx {
        let pack_ty = ctx.builder().var_type(self.pack_addr).ty;
        ctx.pool().pack_component(pack_ty, self.component)
    }

    fn project_element(&self, ctx: &mut LowerCtx<'_>, pack_index: VarId, elem_ty: Idx) -> VarId {
        ctx.builder_mut()
            .emit_pack_element_get(pack_index, self.pack_addr, elem_ty)
    }

    fn enter_partial_destroy_cleanup(
        &self,
        ctx: &mut LowerCtx<'_>,
        limit: Option<VarId>,
    ) -> CleanupHandle {
        ctx.enter_partial_destroy_pack_cleanup(self.pack_addr, self.formal_pack, self.component, limit)
    }

    fn cleanup(&self) -> Option<CleanupHandle> {
        self.cleanup
    }

    fn set_cleanup(&mut self, handle: CleanupHandle) {
        self.cleanup = Some(handle);
    }
}

/// Initialization of an expansion component of a tuple.
#[derive(Debug)]
pub struct TuplePackExpansionInitialization {
    tuple_addr: VarId,
    induced_pack: Idx,
    component: u32,
    cleanup: Option<CleanupHandle>,
}

impl TuplePackExpansionInitialization {
    /// `induced_pack` is the induced pack type of the tuple at `tuple_addr`.
    pub fn create(
        ctx: &mut LowerCtx<'_>,
        tuple_addr: VarId,
        induced_pack: Idx,
        component: u32,
    ) -> Self {
        let mut init = Self {
            tuple_addr,
            induced_pack,
            component,
            cleanup: None,
        };
        init.enter_dormant_cleanup(ctx);
        init
    }
}

impl ExpansionInitialization for TuplePackExpansionInitialization {
    fn formal_pack_type(&self) -> Idx {
        self.induced_pack
    }

    fn component_index(&self) -> u32 {
        self.component
    }

    fn lowered_component_type(&self, ctx: &LowerCtx<'_>) -> Idx {
        let tuple_ty = ctx.builder().var_type(self.tuple_addr).ty;
        ctx.pool().tuple_components(tuple_ty)[self.component as usize]
    }

    fn project_element(&self, ctx: &mut LowerCtx<'_>, pack_index: VarId, elem_ty: Idx) -> VarId {
        ctx.builder_mut()
            .emit_tuple_pack_element_addr(pack_index, self.tuple_addr, elem_ty)
    }

    fn enter_partial_destroy_cleanup(
        &self,
        ctx: &mut LowerCtx<'_>,
        limit: Option<VarId>,
    ) -> CleanupHandle {
        ctx.enter_partial_destroy_tuple_cleanup(
            self.tuple_addr,
            self.induced_pack,
            self.component,
            limit,
        )
    }

    fn cleanup(&self) -> Option<CleanupHandle> {
        self.cleanup
    }

    fn set_cleanup(&mut self, handle: CleanupHandle) {
        self.cleanup = Some(handle);
    }
}

#[cfg(test)]
mod tests;
