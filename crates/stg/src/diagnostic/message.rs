use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::diagnostic::kind::format_message;
use crate::diagnostic::{ErrorCategory, ErrorKind, Severity};

/// Maximum number of message arguments a diagnostic carries.
pub const MAX_ARGS: usize = 3;

/// When a diagnostic was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Compile,
    Render,
}

/// A position in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// 1-based line.
    pub line: usize,
    /// 1-based column, in characters.
    pub column: usize,
    /// Byte offset of the start.
    pub offset: usize,
    /// Length in bytes of the offending region (at least 1 when known).
    pub len: usize,
}

impl Location {
    /// Compute the location of `offset..offset + len` in `source`.
    pub fn in_source(source: &str, offset: usize, len: usize) -> Location {
        let offset = offset.min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |pos| pos + 1);
        let column = before[line_start..].chars().count() + 1;
        Location {
            line,
            column,
            offset,
            len,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A structured compile-time or render-time problem.
///
/// Diagnostics are built at the detection site, handed to a
/// [`DiagnosticListener`](crate::DiagnosticListener) once, and never changed
/// afterwards. The text is produced on demand by [`Diagnostic::message`].
#[derive(Debug, Clone)]
pub struct Diagnostic {
    kind: ErrorKind,
    args: [Option<String>; MAX_ARGS],
    phase: Phase,
    template: Option<String>,
    location: Option<Location>,
    call_path: Vec<String>,
    cause: Option<Arc<dyn Error + Send + Sync>>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, phase: Phase) -> Self {
        Self {
            kind,
            args: [None, None, None],
            phase,
            template: None,
            location: None,
            call_path: Vec::new(),
            cause: None,
        }
    }

    /// A compile-time diagnostic for `template`.
    pub fn compile(kind: ErrorKind, template: impl Into<String>) -> Self {
        Self::new(kind, Phase::Compile).in_template(template)
    }

    /// A render-time diagnostic.
    pub fn render(kind: ErrorKind) -> Self {
        Self::new(kind, Phase::Render)
    }

    /// Append the next positional argument. Arguments past the third are
    /// ignored.
    pub fn arg(mut self, arg: impl Display) -> Self {
        if let Some(slot) = self.args.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(arg.to_string());
        }
        self
    }

    pub fn in_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach the chain of template names from the root invocation to the
    /// one that reported.
    pub fn with_call_path(mut self, path: Vec<String>) -> Self {
        self.call_path = path;
        self
    }

    pub fn caused_by(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn caused_by_boxed(mut self, cause: Box<dyn Error + Send + Sync>) -> Self {
        self.cause = Some(Arc::from(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The arguments that were supplied, in order.
    pub fn args(&self) -> Vec<&str> {
        self.args.iter().map_while(Option::as_deref).collect()
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn call_path(&self) -> &[String] {
        &self.call_path
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// The kind's message template with arguments substituted.
    pub fn message(&self) -> String {
        format_message(self.kind.message_template(), &self.args())
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.phase {
            Phase::Compile => {
                if let Some(template) = &self.template {
                    write!(f, "{template} ")?;
                }
                if let Some(location) = self.location {
                    write!(f, "{location}: ")?;
                }
            }
            Phase::Render => {
                if !self.call_path.is_empty() {
                    write!(f, "context [{}] ", self.call_path.join(" "))?;
                } else if let Some(template) = &self.template {
                    write!(f, "context [{template}] ")?;
                }
                if let Some(location) = self.location {
                    write!(f, "{location} ")?;
                }
            }
        }
        f.write_str(&self.message())?;
        if let Some(cause) = &self.cause {
            write!(f, "\nCaused by: {cause}")?;
            let mut source = cause.source();
            while let Some(inner) = source {
                write!(f, "\nCaused by: {inner}")?;
                source = inner.source();
            }
        }
        Ok(())
    }
}

impl Error for Diagnostic {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}
