//! Sinks that receive diagnostics from the engine.

use std::mem;
use std::sync::{Mutex, PoisonError};

use crate::diagnostic::{Diagnostic, Severity};

/// Receives every diagnostic the engine produces, exactly once.
///
/// Listeners are owned by the host. The engine never retries or
/// accumulates diagnostics itself; a listener that wants to turn a
/// diagnostic into a hard failure does so on its own side.
pub trait DiagnosticListener: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

impl<F> DiagnosticListener for F
where
    F: Fn(Diagnostic) + Send + Sync,
{
    fn report(&self, diagnostic: Diagnostic) {
        self(diagnostic);
    }
}

/// Default listener: emits each diagnostic as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl DiagnosticListener for TracingListener {
    fn report(&self, diagnostic: Diagnostic) {
        let kind = format!("{:?}", diagnostic.kind());
        let template = diagnostic.template().unwrap_or_default();
        match diagnostic.severity() {
            Severity::Error => tracing::error!(%kind, template, "{diagnostic}"),
            Severity::Warning => tracing::warn!(%kind, template, "{diagnostic}"),
        }
    }
}

/// Keeps every diagnostic in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingListener {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything collected so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain everything collected so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        let mut guard = self
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        mem::take(&mut *guard)
    }

    pub fn len(&self) -> usize {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticListener for CollectingListener {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}
