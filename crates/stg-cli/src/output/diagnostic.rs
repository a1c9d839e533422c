//! Terminal and JSON forms of engine diagnostics.

use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use serde::Serialize;
use stg::{ErrorCategory, ErrorKind, Group, Severity};
use thiserror::Error;

/// A miette-compatible view of an engine diagnostic, with the template
/// source attached when the group still has it.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(stg::template))]
pub struct StgDiagnostic {
    #[source_code]
    src: NamedSource<String>,

    #[label("{label}")]
    span: Option<SourceSpan>,

    label: String,

    message: String,

    #[help]
    help: Option<String>,
}

impl StgDiagnostic {
    pub fn new(diagnostic: &stg::Diagnostic, group: &Group) -> Self {
        let name = diagnostic.template().unwrap_or("<template>");
        let source = diagnostic
            .template()
            .and_then(|template| group.source_of(template))
            .unwrap_or_default();

        // Subtemplate frames have no definition of their own, so only spans
        // inside a known source are kept.
        let span = diagnostic
            .location()
            .filter(|_| !source.is_empty())
            .map(|location| {
                let offset = location.offset.min(source.len());
                let len = location.len.min(source.len().saturating_sub(offset));
                SourceSpan::from((offset, len))
            });

        let message = if diagnostic.call_path().len() > 1 {
            format!(
                "[{}] {}",
                diagnostic.call_path().join(" "),
                diagnostic.message()
            )
        } else {
            diagnostic.message()
        };

        StgDiagnostic {
            src: NamedSource::new(format!("{name}.st"), source.to_string()),
            span,
            label: format!("{:?}", diagnostic.kind()),
            message,
            help: diagnostic.cause().map(|cause| format!("caused by: {cause}")),
        }
    }
}

/// Render `diagnostic` as a miette report.
pub fn report(diagnostic: &stg::Diagnostic, group: &Group) -> Report {
    Report::new(StgDiagnostic::new(diagnostic, group))
}

/// JSON output for one diagnostic.
#[derive(Debug, Serialize)]
pub struct DiagnosticJson {
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub template: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub call_path: Vec<String>,
    pub message: String,
    pub cause: Option<String>,
}

impl From<&stg::Diagnostic> for DiagnosticJson {
    fn from(diagnostic: &stg::Diagnostic) -> Self {
        let location = diagnostic.location();
        DiagnosticJson {
            kind: diagnostic.kind(),
            category: diagnostic.category(),
            severity: diagnostic.severity(),
            template: diagnostic.template().map(str::to_string),
            line: location.map(|l| l.line),
            column: location.map(|l| l.column),
            call_path: diagnostic.call_path().to_vec(),
            message: diagnostic.message(),
            cause: diagnostic.cause().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stg::{CollectingListener, Formals};

    use super::*;

    fn broken() -> (Group, stg::Diagnostic) {
        let listener = Arc::new(CollectingListener::new());
        let mut group = Group::new("test");
        group.set_listener(listener.clone());
        group
            .define("page", Formals::names(["title"]), "<titel>")
            .unwrap();
        assert!(group.lookup("page").is_err());
        let diagnostic = listener.take().remove(0);
        (group, diagnostic)
    }

    #[test]
    fn span_points_into_the_template_source() {
        let (group, diagnostic) = broken();
        let rendered = StgDiagnostic::new(&diagnostic, &group);
        assert_eq!(rendered.span, Some(SourceSpan::from((1, 5))));
        assert_eq!(rendered.label, "NoSuchAttribute");
        assert_eq!(
            rendered.message,
            "attribute titel isn't defined (did you mean title?)"
        );
    }

    #[test]
    fn unknown_templates_have_no_span() {
        let (_, diagnostic) = broken();
        let rendered = StgDiagnostic::new(&diagnostic, &Group::new("empty"));
        assert_eq!(rendered.span, None);
    }

    #[test]
    fn json_carries_location_and_kind() {
        let (_, diagnostic) = broken();
        let json = serde_json::to_value(DiagnosticJson::from(&diagnostic)).unwrap();
        assert_eq!(json["kind"], "NoSuchAttribute");
        assert_eq!(json["severity"], "Error");
        assert_eq!(json["template"], "page");
        assert_eq!(json["line"], 1);
        assert_eq!(json["column"], 2);
    }
}
