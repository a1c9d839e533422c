//! Parser for template source.

pub mod ast;
mod error;
mod template;

pub use error::ParseError;
pub use template::{parse_expression, parse_template};
