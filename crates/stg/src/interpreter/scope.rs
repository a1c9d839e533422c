//! Call frames for template invocations.
//!
//! Frames live in an arena and point at their parent by [`ScopeId`], so the
//! invocation path of any frame can be rebuilt without touching the
//! instruction streams. When tracing is enabled frames are retained after
//! exit together with the events recorded while they ran.

use std::collections::HashMap;
use std::mem;
use std::ops::Range;

use crate::types::Value;

/// Handle to a frame in a [`ScopeChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The runtime record of one template invocation.
#[derive(Debug, Clone)]
pub struct Frame {
    parent: Option<ScopeId>,
    template: String,
    ip: usize,
    early_eval: bool,
    depth: usize,
    defaults: HashMap<String, Value>,
    events: Vec<Event>,
    child_events: Vec<TemplateEvent>,
}

impl Frame {
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// Name of the template this frame executes.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Address of the next instruction.
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Whether this frame runs while a template name or `(expr)` is being
    /// evaluated.
    pub fn early_eval(&self) -> bool {
        self.early_eval
    }

    /// Number of frames above this one; the root is at depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Events recorded in this frame, in order: its expression writes and,
    /// last, its own completion.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Completion events of the frames this one invoked.
    pub fn child_events(&self) -> &[TemplateEvent] {
        &self.child_events
    }
}

/// Something that happened while rendering, recorded only when tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Expr(ExprEvent),
    Template(TemplateEvent),
}

/// An expression wrote to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprEvent {
    pub scope: ScopeId,
    /// Character range of the output produced.
    pub output: Range<usize>,
    /// Byte range of the expression in the template source.
    pub source: Option<Range<usize>>,
}

/// A template invocation completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEvent {
    pub scope: ScopeId,
    pub template: String,
    /// Character range of the output produced by the whole invocation.
    pub output: Range<usize>,
    pub early_eval: bool,
}

/// Arena of frames for one render call.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    frames: Vec<Frame>,
    retain: bool,
    log: Vec<Event>,
}

impl ScopeChain {
    /// A chain that drops frames on exit, or keeps them with their events
    /// when `retain` is set.
    pub fn new(retain: bool) -> Self {
        Self {
            frames: Vec::new(),
            retain,
            log: Vec::new(),
        }
    }

    pub fn is_tracing(&self) -> bool {
        self.retain
    }

    /// Push a frame for `template` invoked from `parent`. The early
    /// evaluation flag is inherited from the parent.
    pub fn enter(&mut self, parent: Option<ScopeId>, template: &str) -> ScopeId {
        let (early_eval, depth) = parent
            .and_then(|id| self.frame(id))
            .map_or((false, 0), |frame| (frame.early_eval, frame.depth + 1));
        self.frames.push(Frame {
            parent,
            template: template.to_string(),
            ip: 0,
            early_eval,
            depth,
            defaults: HashMap::new(),
            events: Vec::new(),
            child_events: Vec::new(),
        });
        ScopeId(self.frames.len() - 1)
    }

    /// Leave `scope`. Without tracing the frame is discarded.
    pub fn exit(&mut self, scope: ScopeId) {
        if !self.retain && scope.0 + 1 == self.frames.len() {
            self.frames.pop();
        }
    }

    pub fn frame(&self, scope: ScopeId) -> Option<&Frame> {
        self.frames.get(scope.0)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Every event in completion order, across all frames.
    pub fn log(&self) -> &[Event] {
        &self.log
    }

    /// Template names from the root down to `scope`.
    pub fn call_path(&self, scope: ScopeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = Some(scope);
        while let Some(frame) = current.and_then(|id| self.frame(id)) {
            path.push(frame.template.clone());
            current = frame.parent;
        }
        path.reverse();
        path
    }

    pub(crate) fn ip(&self, scope: ScopeId) -> usize {
        self.frame(scope).map_or(0, |frame| frame.ip)
    }

    pub(crate) fn set_ip(&mut self, scope: ScopeId, ip: usize) {
        if let Some(frame) = self.frames.get_mut(scope.0) {
            frame.ip = ip;
        }
    }

    pub(crate) fn depth(&self, scope: ScopeId) -> usize {
        self.frame(scope).map_or(0, |frame| frame.depth)
    }

    pub(crate) fn early_eval(&self, scope: ScopeId) -> bool {
        self.frame(scope).is_some_and(|frame| frame.early_eval)
    }

    /// Set the early evaluation flag, returning the previous value.
    pub(crate) fn set_early_eval(&mut self, scope: ScopeId, early_eval: bool) -> bool {
        self.frames
            .get_mut(scope.0)
            .is_some_and(|frame| mem::replace(&mut frame.early_eval, early_eval))
    }

    pub(crate) fn default_of(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        self.frame(scope).and_then(|frame| frame.defaults.get(name))
    }

    pub(crate) fn store_default(&mut self, scope: ScopeId, name: &str, value: Value) {
        if let Some(frame) = self.frames.get_mut(scope.0) {
            frame.defaults.insert(name.to_string(), value);
        }
    }

    pub(crate) fn record_expr(&mut self, event: ExprEvent) {
        if !self.retain {
            return;
        }
        if let Some(frame) = self.frames.get_mut(event.scope.0) {
            frame.events.push(Event::Expr(event.clone()));
        }
        self.log.push(Event::Expr(event));
    }

    /// Record a completed invocation in its own frame, its parent's child
    /// list and the global log.
    pub(crate) fn record_template(&mut self, event: TemplateEvent) {
        if !self.retain {
            return;
        }
        let parent = self.frame(event.scope).and_then(|frame| frame.parent);
        if let Some(frame) = self.frames.get_mut(event.scope.0) {
            frame.events.push(Event::Template(event.clone()));
        }
        if let Some(parent) = parent.and_then(|id| self.frames.get_mut(id.0)) {
            parent.child_events.push(event.clone());
        }
        self.log.push(Event::Template(event));
    }
}

/// The outcome of a traced render: output plus every retained frame.
#[derive(Debug, Clone)]
pub struct Trace {
    pub(crate) output: String,
    pub(crate) chain: ScopeChain,
}

impl Trace {
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn frames(&self) -> &[Frame] {
        self.chain.frames()
    }

    pub fn frame(&self, scope: ScopeId) -> Option<&Frame> {
        self.chain.frame(scope)
    }

    /// The global event log.
    pub fn events(&self) -> &[Event] {
        self.chain.log()
    }

    pub fn call_path(&self, scope: ScopeId) -> Vec<String> {
        self.chain.call_path(scope)
    }

    /// Completion events of template invocations only, in completion order.
    pub fn template_events(&self) -> impl Iterator<Item = &TemplateEvent> {
        self.events().iter().filter_map(|event| match event {
            Event::Template(template) => Some(template),
            Event::Expr(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_dropped_without_tracing() {
        let mut chain = ScopeChain::new(false);
        let root = chain.enter(None, "root");
        let child = chain.enter(Some(root), "child");
        assert_eq!(chain.call_path(child), ["root", "child"]);
        chain.exit(child);
        assert_eq!(chain.frames().len(), 1);
    }

    #[test]
    fn early_eval_is_inherited() {
        let mut chain = ScopeChain::new(true);
        let root = chain.enter(None, "root");
        chain.set_early_eval(root, true);
        let child = chain.enter(Some(root), "child");
        assert!(chain.early_eval(child));
        assert_eq!(chain.depth(child), 1);
    }

    #[test]
    fn set_early_eval_returns_the_previous_flag() {
        let mut chain = ScopeChain::new(false);
        let root = chain.enter(None, "root");
        assert!(!chain.set_early_eval(root, true));
        assert!(chain.set_early_eval(root, false));
        assert!(!chain.early_eval(root));
        chain.exit(root);
        assert!(!chain.set_early_eval(root, true));
    }

    #[test]
    fn template_events_have_three_views() {
        let mut chain = ScopeChain::new(true);
        let root = chain.enter(None, "root");
        let child = chain.enter(Some(root), "child");
        chain.record_template(TemplateEvent {
            scope: child,
            template: "child".into(),
            output: 0..3,
            early_eval: false,
        });
        assert_eq!(chain.frame(child).map(|f| f.events().len()), Some(1));
        assert_eq!(chain.frame(root).map(|f| f.child_events().len()), Some(1));
        assert_eq!(chain.log().len(), 1);
    }
}
