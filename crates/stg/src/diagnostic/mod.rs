//! Structured diagnostics reported by the compiler and the interpreter.
//!
//! A [`Diagnostic`] pairs an [`ErrorKind`] from a fixed catalog with up to
//! three message arguments. Formatting is deferred until the diagnostic is
//! displayed. Diagnostics are delivered to a host-owned
//! [`DiagnosticListener`].

mod kind;
mod listener;
mod message;
mod suggest;

pub use kind::{ErrorCategory, ErrorKind, Severity};
pub use listener::{CollectingListener, DiagnosticListener, TracingListener};
pub use message::{Diagnostic, Location, MAX_ARGS, Phase};
pub use suggest::compute_suggestions;
pub(crate) use suggest::did_you_mean;
