//! The template group: a named directory of templates with an import chain.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use crate::compiler::{self, CompileError, CompiledTemplate, TemplateDirectory};
use crate::diagnostic::{DiagnosticListener, ErrorKind, TracingListener, compute_suggestions};
use crate::group::{AttributeRenderer, GroupError, ResolveError, TemplateInstance};
use crate::types::{Formals, ScalarKind};

/// Name given to templates compiled from ad-hoc source.
pub const ANONYMOUS_TEMPLATE: &str = "anonymous";

/// The outcome of compiling an entry.
#[derive(Clone)]
enum Compiled {
    Ready(Arc<CompiledTemplate>),
    /// `retry` is set when a later definition could make the source compile.
    Failed { retry: bool },
}

impl Compiled {
    fn failed(error: &CompileError) -> Self {
        let retry = error.diagnostics.iter().any(|diagnostic| {
            matches!(
                diagnostic.kind(),
                ErrorKind::NoSuchTemplate
                    | ErrorKind::NoSuchFormalArgument
                    | ErrorKind::ArgumentCountMismatch
                    | ErrorKind::MapTemplateWithoutParameters
            )
        });
        Compiled::Failed { retry }
    }

    fn template(&self) -> Option<Arc<CompiledTemplate>> {
        match self {
            Compiled::Ready(template) => Some(Arc::clone(template)),
            Compiled::Failed { .. } => None,
        }
    }
}

/// One definition and its lazily compiled form.
struct TemplateEntry {
    formals: Formals,
    source: String,
    compiled: OnceLock<Compiled>,
    /// Diagnostics already sent to the listener, shared by every
    /// recompilation of this definition.
    reported: Arc<Mutex<BTreeSet<String>>>,
}

impl TemplateEntry {
    fn new(formals: Formals, source: String) -> Self {
        Self {
            formals,
            source,
            compiled: OnceLock::new(),
            reported: Arc::default(),
        }
    }

    /// Whether a new definition in the directory calls for recompiling.
    fn is_stale(&self) -> bool {
        !matches!(self.compiled.get(), Some(Compiled::Failed { retry: false }))
    }

    fn uncompiled(&self) -> Self {
        Self {
            formals: self.formals.clone(),
            source: self.source.clone(),
            compiled: OnceLock::new(),
            reported: Arc::clone(&self.reported),
        }
    }

    /// Record a diagnostic; false if this definition already reported it.
    fn first_report(&self, key: String) -> bool {
        self.reported
            .lock()
            .map(|mut seen| seen.insert(key))
            .unwrap_or(true)
    }
}

#[derive(Clone)]
struct GroupData {
    name: String,
    templates: BTreeMap<String, Arc<TemplateEntry>>,
    imports: Vec<Group>,
    listener: Arc<dyn DiagnosticListener>,
    renderers: HashMap<ScalarKind, Arc<dyn AttributeRenderer>>,
}

/// A named directory of templates.
///
/// Groups are cheap handles. Cloning shares the definitions and their
/// compiled forms; mutating a handle copies the directory first, so
/// instances already created from a group keep seeing the definitions they
/// were created with. An imported group is captured as it was when
/// [`import`](Group::import) was called.
///
/// Templates compile on first use. Compile errors are sent to the group's
/// listener once. The template stays unusable until a later definition
/// supplies a missing callee.
///
/// # Example
///
/// ```
/// use stg::{Formals, Group};
///
/// let mut group = Group::new("people");
/// group.define("hello", Formals::names(["name"]), "Hello, <name>!").unwrap();
///
/// let mut hello = group.instance_of("hello").unwrap();
/// hello.set("name", "Ter").unwrap();
/// assert_eq!(hello.render(), "Hello, Ter!");
/// ```
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupData>,
}

impl Group {
    /// Create an empty group that reports diagnostics through `tracing`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GroupData {
                name: name.into(),
                templates: BTreeMap::new(),
                imports: Vec::new(),
                listener: Arc::new(TracingListener),
                renderers: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Send this group's compile and render diagnostics to `listener`.
    pub fn set_listener(&mut self, listener: Arc<dyn DiagnosticListener>) {
        Arc::make_mut(&mut self.inner).listener = listener;
    }

    pub fn listener(&self) -> Arc<dyn DiagnosticListener> {
        Arc::clone(&self.inner.listener)
    }

    /// Use `renderer` for every scalar of `kind` rendered from this group.
    pub fn register_renderer(
        &mut self,
        kind: ScalarKind,
        renderer: impl AttributeRenderer + 'static,
    ) {
        Arc::make_mut(&mut self.inner)
            .renderers
            .insert(kind, Arc::new(renderer));
    }

    /// The renderer for `kind`, searching imported groups when this group
    /// has none.
    pub fn renderer_for(&self, kind: &ScalarKind) -> Option<&Arc<dyn AttributeRenderer>> {
        self.inner.renderers.get(kind).or_else(|| {
            self.inner
                .imports
                .iter()
                .find_map(|group| group.renderer_for(kind))
        })
    }

    /// Add a template to this group.
    ///
    /// The source is compiled on first use. Defining a name an imported
    /// group also defines overrides it.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        formals: impl Into<Formals>,
        source: impl Into<String>,
    ) -> Result<(), GroupError> {
        let name = name.into();
        let formals = formals.into();
        if !is_valid_name(&name) {
            return Err(GroupError::InvalidName { name });
        }
        if self.inner.templates.contains_key(&name) {
            return Err(GroupError::Redefinition {
                group: self.inner.name.clone(),
                name,
            });
        }
        if let Some(parameter) = formals.duplicate() {
            return Err(GroupError::DuplicateParameter {
                parameter: parameter.to_string(),
                template: name,
            });
        }

        debug!(group = %self.inner.name, template = %name, "define template");
        let data = Arc::make_mut(&mut self.inner);
        // A new name can change how the existing templates compile. Syntax
        // failures cannot be fixed that way and stay failed.
        data.templates = data
            .templates
            .iter()
            .map(|(key, entry)| {
                let entry = if entry.is_stale() {
                    Arc::new(entry.uncompiled())
                } else {
                    Arc::clone(entry)
                };
                (key.clone(), entry)
            })
            .collect();
        data.templates
            .insert(name, Arc::new(TemplateEntry::new(formals, source.into())));
        Ok(())
    }

    /// Make the templates of `other` visible from this group. Names
    /// defined here take precedence; earlier imports take precedence over
    /// later ones.
    pub fn import(&mut self, other: &Group) {
        debug!(group = %self.inner.name, import = %other.inner.name, "import group");
        Arc::make_mut(&mut self.inner).imports.push(other.clone());
    }

    pub fn imports(&self) -> &[Group] {
        &self.inner.imports
    }

    /// Whether `name` is defined here or in an imported group.
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Names defined in this group only, sorted.
    pub fn own_template_names(&self) -> Vec<String> {
        self.inner.templates.keys().cloned().collect()
    }

    /// The source text of the closest definition of `name`.
    pub fn source_of(&self, name: &str) -> Option<&str> {
        self.find(name).map(|(_, entry)| entry.source.as_str())
    }

    /// The compiled form of the closest definition of `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<CompiledTemplate>, GroupError> {
        self.resolve(name)
            .map(|(_, template)| template)
            .map_err(|e| self.resolve_error(name, e))
    }

    /// A fresh instance of `name` with no attributes set.
    pub fn instance_of(&self, name: &str) -> Result<TemplateInstance, GroupError> {
        let (native, template) = self
            .resolve(name)
            .map_err(|e| self.resolve_error(name, e))?;
        Ok(TemplateInstance::new(self.clone(), native, template, None))
    }

    /// Compile `source` as an open template outside the directory and
    /// return an instance of it. Templates it invokes resolve against this
    /// group.
    pub fn instance_from_source(&self, source: &str) -> Result<TemplateInstance, GroupError> {
        match compiler::compile(self, ANONYMOUS_TEMPLATE, &Formals::Open, source) {
            Ok(template) => Ok(TemplateInstance::new(
                self.clone(),
                self.clone(),
                Arc::new(template),
                None,
            )),
            Err(e) => {
                for diagnostic in e.diagnostics {
                    self.inner.listener.report(diagnostic);
                }
                Err(GroupError::CompileFailed {
                    templates: vec![ANONYMOUS_TEMPLATE.to_string()],
                })
            }
        }
    }

    /// Compile every template defined in this group, returning the number
    /// compiled. Failures are reported to the listener as usual and listed
    /// in the error.
    pub fn compile_all(&self) -> Result<usize, GroupError> {
        let failed: Vec<String> = self
            .inner
            .templates
            .iter()
            .filter(|(name, entry)| self.compiled(name, entry).is_none())
            .map(|(name, _)| name.clone())
            .collect();
        if failed.is_empty() {
            Ok(self.inner.templates.len())
        } else {
            Err(GroupError::CompileFailed { templates: failed })
        }
    }

    /// Resolve `name` to its compiled form and the group that defines it.
    pub(crate) fn resolve(
        &self,
        name: &str,
    ) -> Result<(Group, Arc<CompiledTemplate>), ResolveError> {
        let (group, entry) = self.find(name).ok_or(ResolveError::Undefined)?;
        let template = group
            .compiled(name, entry)
            .ok_or(ResolveError::CompileFailed)?;
        Ok((group.clone(), template))
    }

    /// Resolve `name` skipping this group's own definitions, for
    /// `super.name(...)`.
    pub(crate) fn resolve_super(
        &self,
        name: &str,
    ) -> Result<(Group, Arc<CompiledTemplate>), ResolveError> {
        let (group, entry) = self.find_super(name).ok_or(ResolveError::Undefined)?;
        let template = group
            .compiled(name, entry)
            .ok_or(ResolveError::CompileFailed)?;
        Ok((group.clone(), template))
    }

    fn find(&self, name: &str) -> Option<(&Group, &Arc<TemplateEntry>)> {
        match self.inner.templates.get(name) {
            Some(entry) => Some((self, entry)),
            None => self.find_super(name),
        }
    }

    fn find_super(&self, name: &str) -> Option<(&Group, &Arc<TemplateEntry>)> {
        self.inner
            .imports
            .iter()
            .find_map(|group| group.find(name))
    }

    /// Compile an entry of this group against this group's directory.
    fn compiled(&self, name: &str, entry: &TemplateEntry) -> Option<Arc<CompiledTemplate>> {
        entry
            .compiled
            .get_or_init(|| {
                debug!(group = %self.inner.name, template = name, "compiling on first use");
                match compiler::compile(self, name, &entry.formals, &entry.source) {
                    Ok(template) => Compiled::Ready(Arc::new(template)),
                    Err(e) => {
                        let compiled = Compiled::failed(&e);
                        for diagnostic in e.diagnostics {
                            if entry.first_report(diagnostic.to_string()) {
                                self.inner.listener.report(diagnostic);
                            }
                        }
                        compiled
                    }
                }
            })
            .template()
    }

    fn resolve_error(&self, name: &str, error: ResolveError) -> GroupError {
        match error {
            ResolveError::Undefined => GroupError::NoSuchTemplate {
                name: name.to_string(),
                suggestions: compute_suggestions(name, &self.template_names()),
            },
            ResolveError::CompileFailed => GroupError::CompileFailed {
                templates: vec![name.to_string()],
            },
        }
    }
}

impl TemplateDirectory for Group {
    fn formals_of(&self, name: &str) -> Option<Formals> {
        self.find(name).map(|(_, entry)| entry.formals.clone())
    }

    fn super_formals_of(&self, name: &str) -> Option<Formals> {
        self.find_super(name).map(|(_, entry)| entry.formals.clone())
    }

    /// Every name visible from this group, sorted and without duplicates.
    fn template_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        collect_names(self, &mut names);
        names.into_iter().collect()
    }
}

fn collect_names(group: &Group, names: &mut BTreeSet<String>) {
    names.extend(group.inner.templates.keys().cloned());
    for import in &group.inner.imports {
        collect_names(import, names);
    }
}

impl Debug for Group {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.inner.name)
            .field("templates", &self.inner.templates.keys().collect::<Vec<_>>())
            .field(
                "imports",
                &self.inner.imports.iter().map(Group::name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// An identifier, optionally with `/`-separated segments.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_identifiers() {
        assert!(is_valid_name("a"));
        assert!(is_valid_name("_sub/x1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1a"));
        assert!(!is_valid_name("a-b"));
    }

    #[test]
    fn clones_are_isolated_from_later_definitions() {
        let mut group = Group::new("g");
        group.define("a", Formals::Open, "a").unwrap();
        let snapshot = group.clone();
        group.define("b", Formals::Open, "b").unwrap();
        assert!(group.contains("b"));
        assert!(!snapshot.contains("b"));
    }

    #[test]
    fn defining_a_name_resets_compiled_forms() {
        let mut group = Group::new("g");
        group.define("a", Formals::Open, "<b()>").unwrap();
        assert!(group.lookup("a").is_err());
        group.define("b", Formals::Open, "b").unwrap();
        assert!(group.lookup("a").is_ok());
    }
}
