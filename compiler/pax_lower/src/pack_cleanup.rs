//! Entering pack cleanups.
//!
//! Each `enter_*` function checks the shape of its operands and registers
//! an active cleanup. Callers adjust the state afterwards when they need a
//! dormant one.

use pax_ir::{IrTy, VarId};
use pax_types::Idx;

use crate::cleanup::{Cleanup, CleanupHandle, CleanupState};
use crate::context::LowerCtx;

impl LowerCtx<'_> {
    fn assert_pack_address(&self, addr: VarId) {
        let ty = self.builder.var_type(addr);
        assert!(
            ty.is_address() && self.pool.is_lowered_pack(ty.ty),
            "pack cleanup needs the address of a pack, found %{} of type {}",
            addr.raw(),
            self.pool.format_type(ty.ty)
        );
    }

    fn assert_tuple_address(&self, addr: VarId, induced_pack: Idx) {
        let ty = self.builder.var_type(addr);
        assert!(
            ty.is_address() && self.pool.is_tuple(ty.ty),
            "tuple cleanup needs the address of a tuple, found %{} of type {}",
            addr.raw(),
            self.pool.format_type(ty.ty)
        );
        assert!(
            self.pool.is_formal_pack(induced_pack),
            "tuple cleanup needs the induced pack type of the tuple, found {}",
            self.pool.format_type(induced_pack)
        );
    }

    pub(crate) fn assert_word(&self, value: VarId) {
        assert_eq!(
            self.builder.var_type(value),
            IrTy::WORD,
            "pack limits and indices within a component must be words"
        );
    }

    /// Register a cleanup that deallocates the pack at `addr`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not the address of a lowered pack.
    pub fn enter_dealloc_pack_cleanup(&mut self, addr: VarId) -> CleanupHandle {
        self.assert_pack_address(addr);
        self.push_cleanup(Cleanup::DeallocPack { addr }, CleanupState::Active)
    }

    /// Register a cleanup that destroys every element of the pack at
    /// `addr`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not the address of a lowered pack.
    pub fn enter_destroy_pack_cleanup(&mut self, addr: VarId, formal_pack: Idx) -> CleanupHandle {
        self.assert_pack_address(addr);
        self.push_cleanup(Cleanup::DestroyPack { addr, formal_pack }, CleanupState::Active)
    }

    /// Register a cleanup that destroys elements `[0, limit)` of expansion
    /// component `component` of the pack at `addr`. Without a limit the
    /// whole component is destroyed.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not the address of a lowered pack or `limit` is
    /// not a word.
    pub fn enter_partial_destroy_pack_cleanup(
        &mut self,
        addr: VarId,
        formal_pack: Idx,
        component: u32,
        limit: Option<VarId>,
    ) -> CleanupHandle {
        self.assert_pack_address(addr);
        if let Some(limit) = limit {
            self.assert_word(limit);
        }
        self.push_cleanup(
            Cleanup::PartialDestroyPack {
                addr,
                formal_pack,
                component,
                limit,
            },
            CleanupState::Active,
        )
    }

    /// Register a cleanup that destroys elements `[0, limit)` of expansion
    /// component `component` of the tuple at `addr`, addressed through the
    /// tuple's induced pack type `induced_pack`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not the address of a tuple, if `induced_pack` is
    /// not a pack type, or if `limit` is not a word.
    pub fn enter_partial_destroy_tuple_cleanup(
        &mut self,
        addr: VarId,
        induced_pack: Idx,
        component: u32,
        limit: Option<VarId>,
    ) -> CleanupHandle {
        self.assert_tuple_address(addr, induced_pack);
        if let Some(limit) = limit {
            self.assert_word(limit);
        }
        self.push_cleanup(
            Cleanup::PartialDestroyTuple {
                addr,
                induced_pack,
                component,
                limit,
            },
            CleanupState::Active,
        )
    }

    /// Register a cleanup that destroys the elements of expansion component
    /// `component` of the tuple at `addr` that come after `current`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not the address of a tuple, if `induced_pack` is
    /// not a pack type, or if `current` is not a word.
    pub fn enter_partial_destroy_remaining_tuple_cleanup(
        &mut self,
        addr: VarId,
        induced_pack: Idx,
        component: u32,
        current: VarId,
    ) -> CleanupHandle {
        self.assert_tuple_address(addr, induced_pack);
        self.assert_word(current);
        self.push_cleanup(
            Cleanup::PartialDestroyRemainingTuple {
                addr,
                induced_pack,
                component,
                current,
            },
            CleanupState::Active,
        )
    }

    /// Register a cleanup that destroys the single value at `addr`.
    pub fn enter_destroy_value_cleanup(&mut self, addr: VarId, state: CleanupState) -> CleanupHandle {
        assert!(
            self.builder.var_type(addr).is_address(),
            "destroy cleanup needs an address, found %{}",
            addr.raw()
        );
        self.push_cleanup(Cleanup::DestroyValue { addr }, state)
    }
}
