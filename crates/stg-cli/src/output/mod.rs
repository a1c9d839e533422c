//! Formatting of command results for the terminal and for JSON.

pub mod diagnostic;
pub mod table;

pub use diagnostic::{report, DiagnosticJson};
