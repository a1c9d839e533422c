//! Implementation of the `stg check` command.

use std::path::Path;
use std::sync::Arc;

use miette::{IntoDiagnostic, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use stg::{CollectingListener, GroupError, Severity};

use crate::commands::load;
use crate::output::{report, DiagnosticJson};

/// Arguments for the check command.
#[derive(Debug, clap::Args)]
pub struct CheckArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for check results.
#[derive(Serialize)]
struct CheckResult {
    templates: usize,
    failed: Vec<String>,
    diagnostics: Vec<DiagnosticJson>,
}

/// Run the check command.
pub fn run_check(dir: &Path, args: CheckArgs) -> Result<i32> {
    let listener = Arc::new(CollectingListener::new());
    let group = match load(dir, listener.clone()) {
        Ok(group) => group,
        Err(code) => return Ok(code),
    };

    let templates = group.own_template_names().len();
    let failed = match group.compile_all() {
        Ok(_) => Vec::new(),
        Err(GroupError::CompileFailed { templates }) => templates,
        Err(e) => return Err(e).into_diagnostic(),
    };
    let diagnostics = listener.take();
    let has_errors = diagnostics
        .iter()
        .any(|diagnostic| diagnostic.severity() == Severity::Error);

    if args.json {
        let result = CheckResult {
            templates,
            failed,
            diagnostics: diagnostics.iter().map(DiagnosticJson::from).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else {
        for diagnostic in &diagnostics {
            eprintln!("{:?}", report(diagnostic, &group));
        }
        if failed.is_empty() {
            println!(
                "{} {templates} template(s) compiled",
                "ok:".if_supports_color(Stream::Stdout, |text| text.green())
            );
        } else {
            println!(
                "{} {} of {templates} template(s) failed: {}",
                "failed:".if_supports_color(Stream::Stdout, |text| text.red()),
                failed.len(),
                failed.join(", ")
            );
        }
    }

    Ok(if has_errors { exitcode::DATAERR } else { exitcode::OK })
}
