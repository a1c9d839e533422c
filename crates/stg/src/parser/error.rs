//! Parse error types.

use thiserror::Error;

/// An error that occurred while parsing template source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A syntax error with location information.
    #[error("{line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        /// Byte offset of the error.
        offset: usize,
        message: String,
    },
}

impl ParseError {
    pub fn offset(&self) -> usize {
        match self {
            ParseError::Syntax { offset, .. } => *offset,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Syntax { message, .. } => message,
        }
    }
}
