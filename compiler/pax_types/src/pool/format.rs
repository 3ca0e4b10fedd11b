//! Human-readable rendering of pool types.

use std::fmt::Write;

use crate::{Idx, Pool, TypeData};

impl Pool {
    /// Render a type as a string.
    pub fn format_type(&self, idx: Idx) -> String {
        let mut buf = String::new();
        self.format_type_into(idx, &mut buf);
        buf
    }

    /// Render a type into an existing buffer.
    pub fn format_type_into(&self, idx: Idx, buf: &mut String) {
        if let Some(name) = idx.name() {
            buf.push_str(name);
            return;
        }
        match self.data(idx) {
            TypeData::Nominal { name, args, .. } => {
                buf.push_str(name);
                if !args.is_empty() {
                    buf.push('<');
                    self.format_list(args, buf);
                    buf.push('>');
                }
            }
            TypeData::PackArchetype { name, .. } => {
                buf.push_str("each ");
                buf.push_str(name);
            }
            TypeData::ElementArchetype { env, pack } => {
                let _ = write!(buf, "@{env}.");
                self.format_type_into(*pack, buf);
            }
            TypeData::Expansion { pattern, count } => {
                buf.push_str("repeat ");
                self.format_type_into(*pattern, buf);
                buf.push_str(" for ");
                self.format_type_into(*count, buf);
            }
            TypeData::Pack(elems) => {
                buf.push_str("Pack{");
                self.format_list(elems, buf);
                buf.push('}');
            }
            TypeData::LoweredPack(elems) => {
                buf.push_str("$Pack{");
                self.format_list(elems, buf);
                buf.push('}');
            }
            TypeData::Tuple(elems) => {
                buf.push('(');
                self.format_list(elems, buf);
                buf.push(')');
            }
            // Primitives are handled by `Idx::name` above.
            TypeData::Int
            | TypeData::Bool
            | TypeData::Str
            | TypeData::Unit
            | TypeData::Word
            | TypeData::Int1
            | TypeData::PackIndex => {
                let _ = write!(buf, "{idx}");
            }
        }
    }

    fn format_list(&self, elems: &[Idx], buf: &mut String) {
        for (i, &elem) in elems.iter().enumerate() {
            if i > 0 {
                buf.push_str(", ");
            }
            self.format_type_into(elem, buf);
        }
    }
}
