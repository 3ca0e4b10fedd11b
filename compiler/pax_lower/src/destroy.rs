//! Destroying packs and tuples with pack components.
//!
//! Scalar components are destroyed in place. Expansion components are
//! destroyed by a dynamic pack loop: in reverse over `[0, limit)` for the
//! partial destroys that undo a prefix, forward over `(current, len)` for
//! the unbuilt suffix of a tuple.

use pax_ir::{IrTy, VarId};
use pax_types::{EnvId, Idx};

use crate::cleanup::CleanupHandle;
use crate::context::{Loc, LowerCtx};
use crate::pack_loop::PackLoop;

/// A value paired with the cleanup that owns it, if it needs one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManagedValue {
    value: VarId,
    cleanup: Option<CleanupHandle>,
}

impl ManagedValue {
    /// A value nothing needs to destroy.
    pub fn unmanaged(value: VarId) -> Self {
        Self {
            value,
            cleanup: None,
        }
    }

    #[inline]
    pub fn value(&self) -> VarId {
        self.value
    }

    #[inline]
    pub fn cleanup(&self) -> Option<CleanupHandle> {
        self.cleanup
    }

    /// Take ownership of the value, disabling its cleanup.
    pub fn forward(self, ctx: &mut LowerCtx<'_>) -> VarId {
        if let Some(handle) = self.cleanup {
            ctx.forward_cleanup(handle);
        }
        self.value
    }
}

impl LowerCtx<'_> {
    /// Destroy every element of the fully initialized pack at `addr`.
    pub fn emit_destroy_pack(&mut self, loc: Loc, addr: VarId, formal_pack: Idx) {
        let pack_ty = self.builder.var_type(addr).ty;
        let components = self.pool.pack_components(pack_ty).to_vec();
        for (component, elem_ty) in (0u32..).zip(components) {
            if self.pool.is_trivial(elem_ty) {
                continue;
            }
            if self.pool.is_expansion(elem_ty) {
                self.emit_partial_destroy_pack(loc, addr, formal_pack, component, None);
            } else {
                let index = self.builder.emit_scalar_pack_index(component, formal_pack);
                let elem = self.builder.emit_pack_element_get(index, addr, elem_ty);
                self.builder.emit_destroy_addr(elem);
            }
        }
    }

    /// Destroy elements `[0, limit)` of expansion component `component` of
    /// the pack at `addr`, last element first. Without a limit the whole
    /// component is destroyed.
    pub fn emit_partial_destroy_pack(
        &mut self,
        loc: Loc,
        addr: VarId,
        formal_pack: Idx,
        component: u32,
        limit: Option<VarId>,
    ) {
        let pack_ty = self.builder.var_type(addr).ty;
        let expansion_ty = self.pool.pack_component(pack_ty, component);
        let (env, elem_ty) = self.create_opened_element_value_environment(expansion_ty);
        let opts = PackLoop {
            limit,
            env,
            reverse: true,
            ..PackLoop::default()
        };
        self.emit_dynamic_pack_loop_with(loc, formal_pack, component, opts, |ctx, indices| {
            let elem = ctx
                .builder
                .emit_pack_element_get(indices.pack_index, addr, elem_ty.ty);
            ctx.builder.emit_destroy_addr(elem);
        });
    }

    /// Destroy elements `[0, limit)` of expansion component `component` of
    /// the tuple at `addr`, last element first. Pack indices range over the
    /// tuple's induced pack type `induced_pack`.
    pub fn emit_partial_destroy_tuple(
        &mut self,
        loc: Loc,
        addr: VarId,
        induced_pack: Idx,
        component: u32,
        limit: Option<VarId>,
    ) {
        let (env, elem_ty) = self.tuple_component_element(addr, component);
        let opts = PackLoop {
            limit,
            env,
            reverse: true,
            ..PackLoop::default()
        };
        self.emit_dynamic_pack_loop_with(loc, induced_pack, component, opts, |ctx, indices| {
            let elem = ctx
                .builder
                .emit_tuple_pack_element_addr(indices.pack_index, addr, elem_ty.ty);
            ctx.builder.emit_destroy_addr(elem);
        });
    }

    /// Destroy the elements of expansion component `component` of the
    /// tuple at `addr` that come after `current`, first to last.
    pub fn emit_partial_destroy_remaining_tuple(
        &mut self,
        loc: Loc,
        addr: VarId,
        induced_pack: Idx,
        component: u32,
        current: VarId,
    ) {
        let (env, elem_ty) = self.tuple_component_element(addr, component);
        let opts = PackLoop {
            start_after: Some(current),
            env,
            ..PackLoop::default()
        };
        self.emit_dynamic_pack_loop_with(loc, induced_pack, component, opts, |ctx, indices| {
            let elem = ctx
                .builder
                .emit_tuple_pack_element_addr(indices.pack_index, addr, elem_ty.ty);
            ctx.builder.emit_destroy_addr(elem);
        });
    }

    fn tuple_component_element(&mut self, addr: VarId, component: u32) -> (Option<EnvId>, IrTy) {
        let tuple_ty = self.builder.var_type(addr).ty;
        let expansion_ty = self.pool.tuple_components(tuple_ty)[component as usize];
        self.create_opened_element_value_environment(expansion_ty)
    }

    /// Give the pack at `addr` a cleanup that destroys all of its elements.
    ///
    /// Packs of trivial elements need none and come back unmanaged. Without
    /// a formal pack type, one is reconstructed from the lowered type.
    pub fn emit_managed_pack_with_cleanup(
        &mut self,
        addr: VarId,
        formal_pack: Option<Idx>,
    ) -> ManagedValue {
        let pack_ty = self.builder.var_type(addr).ty;
        if self.pool.is_trivial(pack_ty) {
            return ManagedValue::unmanaged(addr);
        }
        let formal_pack =
            formal_pack.unwrap_or_else(|| self.pool.approximate_formal_pack_type(pack_ty));
        let cleanup = self.enter_destroy_pack_cleanup(addr, formal_pack);
        ManagedValue {
            value: addr,
            cleanup: Some(cleanup),
        }
    }

    /// Element environment and element address type for iterating the
    /// expansion `expansion_ty`.
    ///
    /// No environment is opened when the pattern does not depend on the
    /// expansion's count; the pattern itself is then the element type.
    ///
    /// # Panics
    ///
    /// Panics if `expansion_ty` is not a pack expansion.
    pub fn create_opened_element_value_environment(
        &mut self,
        expansion_ty: Idx,
    ) -> (Option<EnvId>, IrTy) {
        let (pattern, count) = self.pool.expansion_parts(expansion_ty).unwrap_or_else(|| {
            panic!(
                "expected a pack expansion, found {}",
                self.pool.format_type(expansion_ty)
            )
        });
        if self.pool.is_pattern_invariant_to_expansion(pattern, count) {
            return (None, IrTy::address(pattern));
        }
        let shape = self.pool.expansion_shape(expansion_ty);
        let env = self.pool.open_element_env(shape);
        let elem_ty = self.pool.map_pack_type_into_element_context(env, pattern);
        (Some(env), IrTy::address(elem_ty))
    }
}

#[cfg(test)]
mod tests;
