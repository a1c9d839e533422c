//! The fixed catalog of diagnostic kinds.

use serde::Serialize;

/// Broad class of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    /// Malformed template source.
    Syntax,
    /// Well-formed source that references something it may not.
    Semantic,
    /// A template could not be found when it was invoked.
    UndefinedTemplate,
    /// A property or index could not be read; the value became null.
    AttributeAccess,
    /// A host-supplied collaborator failed, or a resource limit was hit.
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// Every diagnostic the engine can produce.
///
/// Each kind carries a message template whose `%1`..`%3` placeholders are
/// filled from the diagnostic's arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    SyntaxError,
    NoSuchAttribute,
    NoSuchTemplate,
    NoSuchFormalArgument,
    ArgumentCountMismatch,
    DuplicateArgument,
    NoSuchOption,
    DuplicateOption,
    PositionalMapArguments,
    MapTemplateWithoutParameters,
    UndefinedTemplate,
    EmptyTemplateName,
    TemplateCompileFailed,
    NoSuchProperty,
    IndexOutOfRange,
    RendererFailure,
    RecursionLimit,
    OutputFailure,
    InternalError,
}

impl ErrorKind {
    /// The message template for this kind.
    pub fn message_template(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "%1",
            ErrorKind::NoSuchAttribute => "attribute %1 isn't defined%2",
            ErrorKind::NoSuchTemplate => "no such template: %1%2",
            ErrorKind::NoSuchFormalArgument => "template %1 has no formal argument %2",
            ErrorKind::ArgumentCountMismatch => {
                "passed %1 arg(s) to template %2 with %3 declared arg(s)"
            }
            ErrorKind::DuplicateArgument => "argument %1 passed more than once to template %2",
            ErrorKind::NoSuchOption => "no such option: %1",
            ErrorKind::DuplicateOption => "option %1 given more than once",
            ErrorKind::PositionalMapArguments => {
                "arguments to mapped template %1 must be named"
            }
            ErrorKind::MapTemplateWithoutParameters => {
                "mapped template %1 declares no parameter to receive the element"
            }
            ErrorKind::UndefinedTemplate => "no such template: %1",
            ErrorKind::EmptyTemplateName => "template name expression %1 evaluated to nothing",
            ErrorKind::TemplateCompileFailed => "template %1 has compile errors",
            ErrorKind::NoSuchProperty => "no such property or can't access: %1",
            ErrorKind::IndexOutOfRange => "index %1 out of range for sequence of length %2",
            ErrorKind::RendererFailure => "attribute renderer for %1 failed",
            ErrorKind::RecursionLimit => "template nesting deeper than %1 invoking %2",
            ErrorKind::OutputFailure => "output writer failed",
            ErrorKind::InternalError => "internal error: %1",
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::SyntaxError => ErrorCategory::Syntax,
            ErrorKind::NoSuchAttribute
            | ErrorKind::NoSuchTemplate
            | ErrorKind::NoSuchFormalArgument
            | ErrorKind::ArgumentCountMismatch
            | ErrorKind::DuplicateArgument
            | ErrorKind::NoSuchOption
            | ErrorKind::DuplicateOption
            | ErrorKind::PositionalMapArguments
            | ErrorKind::MapTemplateWithoutParameters => ErrorCategory::Semantic,
            ErrorKind::UndefinedTemplate
            | ErrorKind::EmptyTemplateName
            | ErrorKind::TemplateCompileFailed => ErrorCategory::UndefinedTemplate,
            ErrorKind::NoSuchProperty | ErrorKind::IndexOutOfRange => {
                ErrorCategory::AttributeAccess
            }
            ErrorKind::RendererFailure
            | ErrorKind::RecursionLimit
            | ErrorKind::OutputFailure
            | ErrorKind::InternalError => ErrorCategory::Internal,
        }
    }

    pub fn severity(self) -> Severity {
        match self.category() {
            ErrorCategory::AttributeAccess => Severity::Warning,
            ErrorCategory::Syntax
            | ErrorCategory::Semantic
            | ErrorCategory::UndefinedTemplate
            | ErrorCategory::Internal => Severity::Error,
        }
    }
}

/// Substitute `%1`..`%3` in `template` with `args`, in order.
///
/// Placeholders without a corresponding argument become empty. A `%` not
/// followed by `1`, `2`, or `3` is copied through.
pub(crate) fn format_message(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            if let Some(index) = chars.peek().and_then(|d| d.to_digit(10)) {
                if (1..=3).contains(&index) {
                    chars.next();
                    let slot = usize::try_from(index - 1).unwrap_or(0);
                    if let Some(arg) = args.get(slot) {
                        out.push_str(arg);
                    }
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_in_order() {
        assert_eq!(
            format_message("passed %1 arg(s) to template %2 with %3 declared arg(s)", &[
                "2", "box", "1"
            ]),
            "passed 2 arg(s) to template box with 1 declared arg(s)"
        );
    }

    #[test]
    fn missing_arguments_render_empty() {
        assert_eq!(format_message("attribute %1 isn't defined%2", &["x"]), "attribute x isn't defined");
    }

    #[test]
    fn literal_percent_is_kept() {
        assert_eq!(format_message("100% %4", &[]), "100% %4");
    }
}
