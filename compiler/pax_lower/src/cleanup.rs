//! Cleanup registry.
//!
//! Deferred actions that run when control leaves a scope, normally or by
//! unwinding. Cleanups live on a LIFO stack and are emitted newest-first.
//! Each entry carries a state:
//!
//! - `Active` cleanups are emitted on every exit from their scope.
//! - `Dormant` cleanups are skipped until promoted to `Active`.
//! - `Dead` cleanups are skipped forever. Forwarding a cleanup kills it
//!   without emitting it; whoever forwards takes over its obligation.
//!
//! The stack itself only records cleanups. Emission happens through
//! [`LowerCtx`](crate::LowerCtx), which owns the builder the cleanups emit
//! into.

use std::fmt::Write as _;

use pax_ir::VarId;
use pax_types::{Idx, Pool};
use smallvec::SmallVec;

use crate::context::{Loc, LowerCtx};

/// Opaque handle to a registered cleanup.
///
/// Handles carry the serial number of the registration they name, so a
/// handle that outlives its scope never aliases a later cleanup pushed at
/// the same stack position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CleanupHandle {
    index: u32,
    serial: u32,
}

impl CleanupHandle {
    #[inline]
    fn index(self) -> usize {
        self.index as usize
    }
}

/// Whether a cleanup runs on scope exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CleanupState {
    Active,
    Dormant,
    Dead,
}

/// Which kind of exit a cleanup is emitted for.
///
/// Pack cleanups behave the same on both; the flag is carried so that
/// emission sites can be told apart in traces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForUnwind {
    No,
    Yes,
}

/// A deferred destruction action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cleanup {
    /// Deallocate a pack buffer.
    DeallocPack { addr: VarId },
    /// Destroy every element of a fully initialized pack.
    DestroyPack { addr: VarId, formal_pack: Idx },
    /// Destroy elements `[0, limit)` of one expansion component of a pack,
    /// or the whole component when `limit` is `None`.
    PartialDestroyPack {
        addr: VarId,
        formal_pack: Idx,
        component: u32,
        limit: Option<VarId>,
    },
    /// Destroy elements `[0, limit)` of one expansion component of a tuple.
    /// The tuple is addressed through its induced pack type.
    PartialDestroyTuple {
        addr: VarId,
        induced_pack: Idx,
        component: u32,
        limit: Option<VarId>,
    },
    /// Destroy elements `(current, len)` of one expansion component of a
    /// tuple.
    PartialDestroyRemainingTuple {
        addr: VarId,
        induced_pack: Idx,
        component: u32,
        current: VarId,
    },
    /// Destroy a single value in memory.
    DestroyValue { addr: VarId },
}

impl Cleanup {
    /// Emit this cleanup at the current insertion point.
    pub fn emit(&self, ctx: &mut LowerCtx<'_>, loc: Loc, for_unwind: ForUnwind) {
        tracing::debug!(cleanup = %self.dump(ctx.pool()), ?for_unwind, "emitting cleanup");
        match *self {
            Cleanup::DeallocPack { addr } => ctx.builder_mut().emit_dealloc_pack(addr),
            Cleanup::DestroyPack { addr, formal_pack } => {
                ctx.emit_destroy_pack(loc, addr, formal_pack);
            }
            Cleanup::PartialDestroyPack {
                addr,
                formal_pack,
                component,
                limit,
            } => ctx.emit_partial_destroy_pack(loc, addr, formal_pack, component, limit),
            Cleanup::PartialDestroyTuple {
                addr,
                induced_pack,
                component,
                limit,
            } => ctx.emit_partial_destroy_tuple(loc, addr, induced_pack, component, limit),
            Cleanup::PartialDestroyRemainingTuple {
                addr,
                induced_pack,
                component,
                current,
            } => ctx.emit_partial_destroy_remaining_tuple(loc, addr, induced_pack, component, current),
            Cleanup::DestroyValue { addr } => ctx.builder_mut().emit_destroy_addr(addr),
        }
    }

    /// One-line description for debugging.
    pub fn dump(&self, pool: &Pool) -> String {
        let limit = |l: Option<VarId>| l.map_or_else(|| "none".to_owned(), |v| format!("%{}", v.raw()));
        match *self {
            Cleanup::DeallocPack { addr } => format!("DeallocPack(%{})", addr.raw()),
            Cleanup::DestroyPack { addr, formal_pack } => format!(
                "DestroyPack(%{}, {})",
                addr.raw(),
                pool.format_type(formal_pack)
            ),
            Cleanup::PartialDestroyPack {
                addr,
                formal_pack,
                component,
                limit: l,
            } => format!(
                "PartialDestroyPack(%{}, {}, component {component}, limit {})",
                addr.raw(),
                pool.format_type(formal_pack),
                limit(l)
            ),
            Cleanup::PartialDestroyTuple {
                addr,
                induced_pack,
                component,
                limit: l,
            } => format!(
                "PartialDestroyTuple(%{}, {}, component {component}, limit {})",
                addr.raw(),
                pool.format_type(induced_pack),
                limit(l)
            ),
            Cleanup::PartialDestroyRemainingTuple {
                addr,
                induced_pack,
                component,
                current,
            } => format!(
                "PartialDestroyRemainingTuple(%{}, {}, component {component}, after %{})",
                addr.raw(),
                pool.format_type(induced_pack),
                current.raw()
            ),
            Cleanup::DestroyValue { addr } => format!("DestroyValue(%{})", addr.raw()),
        }
    }
}

struct Entry {
    cleanup: Cleanup,
    state: CleanupState,
    serial: u32,
}

/// LIFO stack of registered cleanups.
#[derive(Default)]
pub struct CleanupStack {
    entries: Vec<Entry>,
    next_serial: u32,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup in the given initial state.
    pub fn push(&mut self, cleanup: Cleanup, state: CleanupState) -> CleanupHandle {
        let index = u32::try_from(self.entries.len())
            .unwrap_or_else(|_| panic!("cleanup count exceeds u32::MAX"));
        let serial = self.next_serial;
        self.next_serial = serial
            .checked_add(1)
            .unwrap_or_else(|| panic!("cleanup registrations exceed u32::MAX"));
        self.entries.push(Entry {
            cleanup,
            state,
            serial,
        });
        CleanupHandle { index, serial }
    }

    /// Change the state of a cleanup.
    ///
    /// # Panics
    ///
    /// Panics if the cleanup is dead and `state` would revive it, or if the
    /// handle has already been popped.
    pub fn set_state(&mut self, handle: CleanupHandle, state: CleanupState) {
        let entry = self.entry_mut(handle);
        assert!(
            entry.state != CleanupState::Dead || state == CleanupState::Dead,
            "cannot revive dead cleanup {handle:?}"
        );
        tracing::trace!(?handle, from = ?entry.state, to = ?state, "cleanup state");
        entry.state = state;
    }

    /// Disable a cleanup without emitting it.
    ///
    /// # Panics
    ///
    /// Panics if the cleanup is already dead.
    pub fn forward(&mut self, handle: CleanupHandle) {
        let entry = self.entry_mut(handle);
        assert!(
            entry.state != CleanupState::Dead,
            "cleanup {handle:?} forwarded twice"
        );
        tracing::trace!(?handle, "forward cleanup");
        entry.state = CleanupState::Dead;
    }

    /// Current state of a cleanup.
    pub fn state(&self, handle: CleanupHandle) -> CleanupState {
        self.entry(handle).state
    }

    /// The cleanup registered under `handle`.
    pub fn cleanup(&self, handle: CleanupHandle) -> &Cleanup {
        &self.entry(handle).cleanup
    }

    /// The most recently registered cleanup still on the stack.
    pub fn top(&self) -> Option<CleanupHandle> {
        let index = self.entries.len().checked_sub(1)?;
        Some(CleanupHandle {
            index: index as u32,
            serial: self.entries[index].serial,
        })
    }

    /// Number of cleanups on the stack.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Every cleanup on the stack, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (CleanupHandle, &Cleanup, CleanupState)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let handle = CleanupHandle {
                    index: i as u32,
                    serial: e.serial,
                };
                (handle, &e.cleanup, e.state)
            })
    }

    /// Active cleanups registered at or above `depth`, newest first.
    pub(crate) fn active_above(&self, depth: usize) -> SmallVec<[Cleanup; 4]> {
        self.entries[depth.min(self.entries.len())..]
            .iter()
            .rev()
            .filter(|e| e.state == CleanupState::Active)
            .map(|e| e.cleanup)
            .collect()
    }

    /// Pop every cleanup registered at or above `depth`.
    pub(crate) fn truncate(&mut self, depth: usize) {
        self.entries.truncate(depth);
    }

    /// Multi-line listing of the stack, newest first.
    pub fn dump(&self, pool: &Pool) -> String {
        let mut out = String::new();
        for (handle, cleanup, state) in self.iter().collect::<Vec<_>>().into_iter().rev() {
            let _ = writeln!(out, "#{} {state:?} {}", handle.index, cleanup.dump(pool));
        }
        out
    }

    fn entry(&self, handle: CleanupHandle) -> &Entry {
        self.entries
            .get(handle.index())
            .filter(|e| e.serial == handle.serial)
            .unwrap_or_else(|| panic!("stale cleanup handle {handle:?}"))
    }

    fn entry_mut(&mut self, handle: CleanupHandle) -> &mut Entry {
        self.entries
            .get_mut(handle.index())
            .filter(|e| e.serial == handle.serial)
            .unwrap_or_else(|| panic!("stale cleanup handle {handle:?}"))
    }
}
