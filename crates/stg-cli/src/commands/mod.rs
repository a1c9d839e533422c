//! CLI command implementations.

mod check;
mod dump;
mod render;

pub use check::{run_check, CheckArgs};
pub use dump::{run_dump, DumpArgs};
pub use render::{run_render, RenderArgs};

use std::path::Path;
use std::sync::Arc;

use owo_colors::{OwoColorize, Stream};
use stg::{DiagnosticListener, Group};

use crate::loader::{load_group, LoadError};

/// Load the template directory, or report why not and return the exit code
/// to stop with.
fn load(dir: &Path, listener: Arc<dyn DiagnosticListener>) -> Result<Group, i32> {
    load_group(dir, listener).map_err(|e| {
        eprintln!(
            "{} {e}",
            "error:".if_supports_color(Stream::Stderr, |text| text.red())
        );
        match e {
            LoadError::Unreadable { .. } => exitcode::NOINPUT,
            LoadError::Define(_) => exitcode::DATAERR,
        }
    })
}
