//! Parameter bindings for expression emission.

use pax_ir::VarId;
use rustc_hash::FxHashMap;

/// Name to IR value bindings of the function being lowered.
#[derive(Clone, Default)]
pub struct ParamScope {
    bindings: FxHashMap<String, VarId>,
}

impl ParamScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any earlier binding.
    pub fn bind(&mut self, name: &str, var: VarId) {
        self.bindings.insert(name.to_owned(), var);
    }

    /// Look up a binding.
    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.bindings.get(name).copied()
    }
}
