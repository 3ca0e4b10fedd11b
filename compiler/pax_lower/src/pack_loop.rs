//! Dynamic pack loops.
//!
//! A dynamic pack loop visits the elements of one expansion component of a
//! pack. The emitted shape is:
//!
//! ```text
//!   pre:
//!     %limit = pack_length <component as a one-component pack>
//!     br cond(%start)
//!   cond(%i: Builtin.Word):
//!     %done = builtin "cmp_eq"(%i, %end)
//!     cond_br %done, end, body
//!   body:
//!     %cur = %i               (reverse: %i - 1)
//!     %exp = dynamic_pack_index %cur
//!     open_pack_element %exp  (when an element environment is given)
//!     %idx = pack_pack_index  (when the pack has several components)
//!     <body, in its own cleanup scope>
//!     br cond(%cur + 1)       (reverse: %cur)
//!   end:
//! ```
//!
//! The body closure runs exactly once, at emission time; it produces the
//! single block sequence the runtime loop executes for every element.

use pax_ir::{BuiltinOp, IrTy, VarId};
use pax_types::{EnvId, Idx};

use crate::context::{ActiveExpansion, Loc, LowerCtx};

/// How a dynamic pack loop walks its component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackLoop {
    /// Start at the element after this index instead of at 0.
    pub start_after: Option<VarId>,
    /// Stop at this index instead of at the component length.
    pub limit: Option<VarId>,
    /// Element environment to open for every element.
    pub env: Option<EnvId>,
    /// Visit `[0, limit)` from the end. Incompatible with `start_after`.
    pub reverse: bool,
}

/// Indices of the current element, as seen by a loop body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopIndices {
    /// Position within the expansion component, as a word.
    pub index_within_component: VarId,
    /// Index into the component viewed as a one-component pack.
    pub expansion_index: VarId,
    /// Index into the whole pack.
    pub pack_index: VarId,
}

impl<'a> LowerCtx<'a> {
    /// Emit a forward loop over every element of expansion component
    /// `component` of `formal_pack`.
    pub fn emit_dynamic_pack_loop(
        &mut self,
        loc: Loc,
        formal_pack: Idx,
        component: u32,
        env: Option<EnvId>,
        body: impl FnOnce(&mut Self, LoopIndices),
    ) {
        let opts = PackLoop {
            env,
            ..PackLoop::default()
        };
        self.emit_dynamic_pack_loop_with(loc, formal_pack, component, opts, body);
    }

    /// Emit a loop over the elements of expansion component `component` of
    /// `formal_pack`.
    ///
    /// When `loc` names a pack-expansion expression, the materialize
    /// pre-pass runs for it before the loop header is emitted.
    ///
    /// # Panics
    ///
    /// Panics if the component is not an expansion, if `reverse` is
    /// combined with `start_after`, or if a bound is not a word.
    pub fn emit_dynamic_pack_loop_with(
        &mut self,
        loc: Loc,
        formal_pack: Idx,
        component: u32,
        opts: PackLoop,
        body: impl FnOnce(&mut Self, LoopIndices),
    ) {
        let component_ty = self.pool.pack_component(formal_pack, component);
        assert!(
            self.pool.is_expansion(component_ty),
            "dynamic pack loop over component {component} of {}, which is not an expansion",
            self.pool.format_type(formal_pack)
        );
        assert!(
            !(opts.reverse && opts.start_after.is_some()),
            "reverse pack loops cannot start after an index"
        );
        for bound in [opts.start_after, opts.limit].into_iter().flatten() {
            self.assert_word(bound);
        }

        tracing::debug!(
            pack = %self.pool.format_type(formal_pack),
            component,
            reverse = opts.reverse,
            has_env = opts.env.is_some(),
            "emitting dynamic pack loop"
        );

        self.with_active_expansion(ActiveExpansion::new(opts.env), |ctx| {
            if let Loc::Expr(id) = loc {
                if ctx.exprs.is_pack_expansion(id) {
                    ctx.prepare_to_emit_pack_expansion(id);
                }
            }
            ctx.emit_pack_loop_blocks(loc, formal_pack, component, opts, body);
        });
    }

    fn emit_pack_loop_blocks(
        &mut self,
        loc: Loc,
        formal_pack: Idx,
        component: u32,
        opts: PackLoop,
        body: impl FnOnce(&mut Self, LoopIndices),
    ) {
        let zero = opts
            .start_after
            .is_none()
            .then(|| self.builder.emit_integer_literal(Idx::WORD, 0));
        let one = self.builder.emit_integer_literal(Idx::WORD, 1);

        let single_component = self.pool.num_pack_components(formal_pack) == 1;
        let formal_dynamic = if single_component {
            formal_pack
        } else {
            let component_ty = self.pool.pack_component(formal_pack, component);
            self.pool.singleton_pack(component_ty)
        };

        let limit = match opts.limit {
            Some(limit) => limit,
            None => self.builder.emit_pack_length(formal_dynamic),
        };
        let start = match (opts.start_after, zero) {
            (Some(after), _) => self.builder.emit_builtin(BuiltinOp::Add, after, one),
            (None, _) if opts.reverse => limit,
            (None, Some(zero)) => zero,
            (None, None) => unreachable!("zero is emitted whenever there is no start index"),
        };
        let end = match zero {
            Some(zero) if opts.reverse => zero,
            _ => limit,
        };

        // Header.
        let cond_bb = self.builder.new_block();
        self.builder.terminate_branch(cond_bb, vec![start]);
        self.builder.emit_block(cond_bb);
        let i = self.builder.add_block_param(cond_bb, IrTy::WORD);
        let at_end = self.builder.emit_builtin(BuiltinOp::CmpEq, i, end);
        let body_bb = self.builder.new_block();
        let end_bb = self.builder.new_block_after(body_bb);
        self.builder.terminate_cond_branch(at_end, end_bb, body_bb);

        // Body.
        self.builder.emit_block(body_bb);
        let cur = if opts.reverse {
            self.builder.emit_builtin(BuiltinOp::Sub, i, one)
        } else {
            i
        };
        let expansion_index = self.builder.emit_dynamic_pack_index(cur, formal_dynamic);
        self.innermost_expansion_mut().index = Some(expansion_index);
        if let Some(env) = opts.env {
            self.builder.emit_open_pack_element(expansion_index, env);
        }
        let pack_index = if single_component {
            expansion_index
        } else {
            self.builder
                .emit_pack_pack_index(component, expansion_index, formal_pack)
        };

        let indices = LoopIndices {
            index_within_component: cur,
            expansion_index,
            pack_index,
        };
        self.with_cleanup_scope(loc, |ctx| body(ctx, indices));

        let next = if opts.reverse {
            cur
        } else {
            self.builder.emit_builtin(BuiltinOp::Add, cur, one)
        };
        self.builder.terminate_branch(cond_bb, vec![next]);

        self.builder.emit_block(end_bb);
    }
}
