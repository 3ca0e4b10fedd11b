//! Typed expression trees consumed by the lowering.
//!
//! Expressions are stored flat in an [`ExprArena`] and addressed by
//! [`ExprId`]. Every node carries its formal type.

use pax_types::Idx;

/// Index of an expression in its arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    /// Integer literal.
    Int(i64),
    /// Reference to a bound parameter.
    Param(String),
    /// Call of a named function.
    Call { func: String, args: Vec<ExprId> },
    /// Tuple construction.
    Tuple(Vec<ExprId>),
    /// The element of `pack` at the innermost expansion index. `pack` is a
    /// pack parameter or a [`ExprKind::MaterializePack`].
    PackElement { pack: ExprId },
    /// A tuple-typed expression evaluated once, before the enclosing
    /// expansion loop, and then viewed as a pack.
    MaterializePack { from: ExprId },
    /// `repeat pattern for each count`.
    PackExpansion { pattern: ExprId, count: Idx },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Idx,
}

/// Flat storage for expressions.
#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    exprs: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expression and return its id.
    pub fn alloc(&mut self, kind: ExprKind, ty: Idx) -> ExprId {
        let id = ExprId(
            u32::try_from(self.exprs.len())
                .unwrap_or_else(|_| panic!("expression count exceeds u32::MAX")),
        );
        self.exprs.push(Expr { kind, ty });
        id
    }

    #[inline]
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn is_pack_expansion(&self, id: ExprId) -> bool {
        id.index() < self.exprs.len()
            && matches!(self.get(id).kind, ExprKind::PackExpansion { .. })
    }

    /// Direct children of an expression, in evaluation order.
    pub fn children(&self, id: ExprId) -> &[ExprId] {
        match &self.get(id).kind {
            ExprKind::Int(_) | ExprKind::Param(_) => &[],
            ExprKind::Call { args, .. } => args,
            ExprKind::Tuple(elems) => elems,
            ExprKind::PackElement { pack } => std::slice::from_ref(pack),
            ExprKind::MaterializePack { from } => std::slice::from_ref(from),
            ExprKind::PackExpansion { pattern, .. } => std::slice::from_ref(pattern),
        }
    }
}

/// What a walk does after visiting a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkAction {
    Continue,
    SkipChildren,
}

/// Pre-order walk of the expression tree rooted at `root`.
pub fn walk_expr(
    arena: &ExprArena,
    root: ExprId,
    visit: &mut impl FnMut(ExprId, &Expr) -> WalkAction,
) {
    if visit(root, arena.get(root)) == WalkAction::SkipChildren {
        return;
    }
    for &child in arena.children(root) {
        walk_expr(arena, child, visit);
    }
}
