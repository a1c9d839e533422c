//! Implementation of the `stg render` command.

use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::{miette, IntoDiagnostic, Result};
use serde::Serialize;
use stg::{CollectingListener, Diagnostic, Group, Interpreter, Severity, TemplateInstance, Value};

use crate::commands::load;
use crate::output::table::format_trace_table;
use crate::output::{report, DiagnosticJson};

/// Arguments for the render command.
#[derive(Debug, clap::Args)]
pub struct RenderArgs {
    /// Name of the template to render (its file stem)
    #[arg(short, long, required = true)]
    pub template: String,

    /// JSON file holding an object of attribute bindings
    #[arg(long)]
    pub attrs: Option<PathBuf>,

    /// Attributes in name=value format (repeatable, appended in order)
    #[arg(short = 'a', long = "attr", value_parser = parse_key_val)]
    pub attr: Vec<(String, String)>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print the invocation tree
    #[arg(long)]
    pub trace: bool,
}

/// JSON output for render results.
#[derive(Serialize)]
pub struct RenderResult {
    pub output: String,
    pub diagnostics: Vec<DiagnosticJson>,
}

/// Parse a key=value attribute string.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid attribute format '{s}': expected name=value"))?;
    Ok((name.to_string(), value.to_string()))
}

/// Integers become numbers, everything else stays text.
fn attr_value(text: String) -> Value {
    match text.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(text),
    }
}

fn bind_attributes(instance: &mut TemplateInstance, args: &RenderArgs) -> Result<()> {
    if let Some(path) = &args.attrs {
        let content = read_to_string(path)
            .map_err(|e| miette!("Cannot read attributes file {}: {}", path.display(), e))?;
        let bindings: BTreeMap<String, Value> = serde_json::from_str(&content)
            .map_err(|e| miette!("Invalid attributes file {}: {}", path.display(), e))?;
        for (name, value) in bindings {
            instance.set(&name, value).into_diagnostic()?;
        }
    }
    for (name, value) in &args.attr {
        instance
            .append(name, attr_value(value.clone()))
            .into_diagnostic()?;
    }
    Ok(())
}

/// Run the render command.
pub fn run_render(dir: &Path, args: RenderArgs) -> Result<i32> {
    let listener = Arc::new(CollectingListener::new());
    let group = match load(dir, listener.clone()) {
        Ok(group) => group,
        Err(code) => return Ok(code),
    };

    let mut instance = match group.instance_of(&args.template) {
        Ok(instance) => instance,
        Err(e) => {
            print_diagnostics(&listener.take(), &group);
            eprintln!("{e}");
            return Ok(exitcode::DATAERR);
        }
    };
    if let Err(e) = bind_attributes(&mut instance, &args) {
        eprintln!("{e:?}");
        return Ok(exitcode::NOINPUT);
    }

    let interpreter = Interpreter::default();
    let (output, trace) = if args.trace {
        let trace = interpreter.trace(&instance);
        (trace.output().to_string(), Some(trace))
    } else {
        (interpreter.run(&instance), None)
    };
    let diagnostics = listener.take();
    let failed = diagnostics
        .iter()
        .any(|diagnostic| diagnostic.severity() == Severity::Error);

    if args.json {
        let result = RenderResult {
            output,
            diagnostics: diagnostics.iter().map(DiagnosticJson::from).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else {
        println!("{output}");
        if let Some(trace) = &trace {
            eprintln!("{}", format_trace_table(trace));
        }
        print_diagnostics(&diagnostics, &group);
    }

    Ok(if failed { exitcode::DATAERR } else { exitcode::OK })
}

fn print_diagnostics(diagnostics: &[Diagnostic], group: &Group) {
    for diagnostic in diagnostics {
        eprintln!("{:?}", report(diagnostic, group));
    }
}

#[cfg(test)]
mod tests {
    use std::fs::write;

    use stg::Scalar;
    use tempfile::TempDir;

    use super::*;

    fn args(attrs: Option<PathBuf>, attr: Vec<(String, String)>) -> RenderArgs {
        RenderArgs {
            template: "t".into(),
            attrs,
            attr,
            json: false,
            trace: false,
        }
    }

    #[test]
    fn key_val_splits_on_first_equals() {
        assert_eq!(
            parse_key_val("expr=a=b"),
            Ok(("expr".to_string(), "a=b".to_string()))
        );
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn integer_attributes_become_numbers() {
        assert!(matches!(
            attr_value("42".into()),
            Value::Scalar(Scalar::Int(42))
        ));
        assert!(matches!(
            attr_value("4x".into()),
            Value::Scalar(Scalar::Str(text)) if text == "4x"
        ));
    }

    #[test]
    fn json_file_and_flags_bind_attributes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attrs.json");
        write(&path, r#"{"names": ["Ter", "Tom"], "n": 3}"#).unwrap();

        let group = Group::new("test");
        let mut st = group
            .instance_from_source("<names; separator=\",\"> <n>")
            .unwrap();
        let flags = vec![("names".to_string(), "Sumana".to_string())];
        bind_attributes(&mut st, &args(Some(path), flags)).unwrap();
        assert_eq!(st.render(), "Ter,Tom,Sumana 3");
    }

    #[test]
    fn unreadable_attributes_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let group = Group::new("test");
        let mut st = group.instance_from_source("<n>").unwrap();
        let missing = dir.path().join("missing.json");
        assert!(bind_attributes(&mut st, &args(Some(missing), Vec::new())).is_err());
    }
}
