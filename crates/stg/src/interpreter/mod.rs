//! The interpreter: runs compiled templates against their attributes.
//!
//! Rendering never fails as a whole. Data problems such as a missing
//! property render as empty text and produce a warning; structural problems
//! such as an undefined template stop the affected instance only. Both are
//! reported to a [`DiagnosticListener`].

mod builtins;
mod machine;
mod render;
mod scope;

use std::fmt;
use std::sync::Arc;

use bon::Builder;

use crate::diagnostic::DiagnosticListener;
use crate::group::TemplateInstance;
use machine::Machine;
use render::Sink;

pub use scope::{Event, ExprEvent, Frame, ScopeChain, ScopeId, TemplateEvent, Trace};

/// Nesting depth at which invocations stop with a diagnostic.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Rendering settings.
///
/// ```
/// use stg::{Group, Interpreter};
///
/// let group = Group::new("demo");
/// let instance = group.instance_from_source("<[\"a\", \"b\"]; separator=\"+\">").unwrap();
/// let interpreter = Interpreter::builder().max_depth(10).build();
/// assert_eq!(interpreter.run(&instance), "a+b");
/// ```
#[derive(Builder, Clone)]
pub struct Interpreter {
    /// Maximum number of nested template invocations.
    #[builder(default = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Keep frames and record events while rendering.
    #[builder(default)]
    debug: bool,

    /// Receives diagnostics instead of the listener of the instance's
    /// group.
    listener: Option<Arc<dyn DiagnosticListener>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::builder().build()
    }
}

impl Interpreter {
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Render `instance` to a string.
    pub fn run(&self, instance: &TemplateInstance) -> String {
        let mut output = String::new();
        self.run_to(instance, &mut output);
        output
    }

    /// Render `instance` into `out`, returning the number of characters
    /// written.
    pub fn run_to(&self, instance: &TemplateInstance, out: &mut dyn fmt::Write) -> usize {
        let listener = self.listener(instance);
        let mut machine = Machine::new(
            self.max_depth,
            listener.as_ref(),
            instance.group().clone(),
            ScopeChain::new(self.debug),
        );
        let mut sink = Sink::new(out);
        machine.invoke(instance, None, &mut sink);
        sink.written()
    }

    /// Render `instance` with event recording on, keeping every frame.
    pub fn trace(&self, instance: &TemplateInstance) -> Trace {
        let listener = self.listener(instance);
        let mut machine = Machine::new(
            self.max_depth,
            listener.as_ref(),
            instance.group().clone(),
            ScopeChain::new(true),
        );
        let mut output = String::new();
        {
            let mut sink = Sink::new(&mut output);
            machine.invoke(instance, None, &mut sink);
        }
        Trace {
            output,
            chain: machine.chain,
        }
    }

    fn listener(&self, instance: &TemplateInstance) -> Arc<dyn DiagnosticListener> {
        self.listener
            .clone()
            .unwrap_or_else(|| instance.group().listener())
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("max_depth", &self.max_depth)
            .field("debug", &self.debug)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
