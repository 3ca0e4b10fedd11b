//! Variadic pack lowering.
//!
//! Lowers pack expansions into dynamic loops over pack indices, and keeps
//! partially initialized packs and tuples destroyable on every exit path.
//!
//! # Architecture
//!
//! - [`LowerCtx`]: builder, type pool, cleanup stack and active-expansion
//!   stack of one lowering session.
//! - [`CleanupStack`] and [`Cleanup`]: the cleanup registry and the pack
//!   cleanup kinds.
//! - `pack_loop`: [`LowerCtx::emit_dynamic_pack_loop`] and its options.
//! - `destroy`: destroying whole packs, prefixes and suffixes of expansion
//!   components, and managed packs.
//! - `init`: the expansion-initialization sinks for packs and tuples.
//! - `emit`: expression emission, the materialize pre-pass, and
//!   [`LowerCtx::emit_pack_expansion_into_pack`].
//!
//! # Tracing
//!
//! Emission is instrumented with `tracing`. Call [`init_tracing`] and set
//! `RUST_LOG=pax_lower=debug` to see loops, cleanups and materializations.

mod cleanup;
mod config;
mod context;
mod destroy;
mod emit;
mod expr;
mod init;
mod pack_cleanup;
mod pack_loop;
mod scope;

#[cfg(test)]
mod test_helpers;

use std::sync::Once;

pub use cleanup::{Cleanup, CleanupHandle, CleanupStack, CleanupState, ForUnwind};
pub use config::LowerConfig;
pub use context::{ActiveExpansion, Loc, LowerCtx};
pub use destroy::ManagedValue;
pub use expr::{walk_expr, Expr, ExprArena, ExprId, ExprKind, WalkAction};
pub use init::{
    ExpansionInitialization, PackExpansionInitialization, TemporaryInit,
    TuplePackExpansionInitialization,
};
pub use pack_loop::{LoopIndices, PackLoop};
pub use scope::ParamScope;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber driven by `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set, and only installs once per
/// process.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
