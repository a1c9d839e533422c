//! Template compiler: AST to stack machine bytecode.
//!
//! The compiler resolves nothing at runtime for statically named templates:
//! undefined attributes, undefined templates and malformed argument
//! bindings are all reported here, against a [`TemplateDirectory`].

mod bytecode;
mod codegen;

use std::collections::BTreeMap;

use thiserror::Error;

pub use bytecode::{Addr, ArgShape, CompiledTemplate, ConstId, Instr, option_bits};
pub use codegen::compile;

use crate::diagnostic::Diagnostic;
use crate::types::Formals;

/// The templates a compilation may refer to by name.
pub trait TemplateDirectory {
    /// Parameters of the closest definition of `name`, if one exists.
    fn formals_of(&self, name: &str) -> Option<Formals>;

    /// Parameters of the definition `super.name` would invoke.
    fn super_formals_of(&self, name: &str) -> Option<Formals>;

    /// Every visible template name, for suggestions.
    fn template_names(&self) -> Vec<String>;
}

/// A fixed set of templates with no import chain.
impl TemplateDirectory for BTreeMap<String, Formals> {
    fn formals_of(&self, name: &str) -> Option<Formals> {
        self.get(name).cloned()
    }

    fn super_formals_of(&self, _name: &str) -> Option<Formals> {
        None
    }

    fn template_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

/// Compilation of one template failed.
#[derive(Debug, Clone, Error)]
#[error("template {template} failed to compile with {} error(s)", diagnostics.len())]
pub struct CompileError {
    pub template: String,
    pub diagnostics: Vec<Diagnostic>,
}
