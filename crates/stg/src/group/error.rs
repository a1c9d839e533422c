//! Error types for group and instance operations.

use thiserror::Error;

use crate::diagnostic::did_you_mean;

/// An error returned by a [`Group`](crate::Group) operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// Template names are identifiers, optionally with `/` separators.
    #[error("invalid template name '{name}'")]
    InvalidName { name: String },

    /// The name is already defined in this group. Imported definitions
    /// may be overridden; own definitions may not.
    #[error("template '{name}' is already defined in group '{group}'")]
    Redefinition { group: String, name: String },

    #[error("template '{template}' declares parameter '{parameter}' more than once")]
    DuplicateParameter { template: String, parameter: String },

    #[error("no such template: {name}{}", did_you_mean(suggestions))]
    NoSuchTemplate {
        name: String,
        suggestions: Vec<String>,
    },

    /// Diagnostics for each failure were sent to the group's listener.
    #[error("failed to compile: {}", templates.join(", "))]
    CompileFailed { templates: Vec<String> },
}

/// An error from assigning an attribute on a template instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("template '{template}' has no formal parameter '{name}'")]
    NoSuchAttribute { template: String, name: String },
}

/// Why a name could not be resolved at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolveError {
    Undefined,
    CompileFailed,
}
