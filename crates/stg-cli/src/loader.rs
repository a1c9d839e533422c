//! Builds a template group from a directory of `.st` files.

use std::ffi::OsStr;
use std::fs::{read_dir, read_to_string, DirEntry};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stg::{DiagnosticListener, Formals, Group, GroupError};
use thiserror::Error;
use tracing::debug;

/// File extension of template sources.
pub const TEMPLATE_EXTENSION: &str = "st";

/// Errors from loading a template directory.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The directory or one of its templates could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file name is not a valid template name.
    #[error(transparent)]
    Define(#[from] GroupError),
}

/// Load every `*.st` file in `dir` as an open template named after its
/// file stem. Files are defined in name order.
pub fn load_group(dir: &Path, listener: Arc<dyn DiagnosticListener>) -> Result<Group, LoadError> {
    let unreadable = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| LoadError::Unreadable { path, source }
    };

    let entries = read_dir(dir)
        .map_err(unreadable(dir))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(unreadable(dir))?;
    let mut files: Vec<PathBuf> = entries
        .iter()
        .map(DirEntry::path)
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION)
        })
        .collect();
    files.sort();

    let group_name = dir
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("templates");
    let mut group = Group::new(group_name);
    group.set_listener(listener);

    for path in files {
        let Some(name) = path.file_stem().and_then(OsStr::to_str) else {
            continue;
        };
        let source = read_to_string(&path).map_err(unreadable(&path))?;
        group.define(name, Formals::Open, source)?;
        debug!(template = name, path = %path.display(), "loaded template");
    }
    Ok(group)
}
