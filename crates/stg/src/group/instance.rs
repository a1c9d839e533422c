use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::compiler::CompiledTemplate;
use crate::group::{AttributeError, Group};
use crate::interpreter::{Interpreter, ScopeId};
use crate::types::{AttributeStore, Value};

/// A template bound to a set of attributes, ready to render.
///
/// Attributes are assigned with [`set`](Self::set) and
/// [`append`](Self::append) before rendering; rendering never modifies
/// the instance. Cloning copies the attributes and shares the compiled
/// template.
#[derive(Clone)]
pub struct TemplateInstance {
    /// The group invocations resolve against.
    group: Group,
    /// The group that defines the template, for `super` lookups.
    native: Group,
    template: Arc<CompiledTemplate>,
    attributes: AttributeStore,
    /// For anonymous subtemplates, the frame of the instance that
    /// created them.
    enclosing: Option<ScopeId>,
}

impl TemplateInstance {
    pub(crate) fn new(
        group: Group,
        native: Group,
        template: Arc<CompiledTemplate>,
        enclosing: Option<ScopeId>,
    ) -> Self {
        Self {
            group,
            native,
            template,
            attributes: AttributeStore::new(),
            enclosing,
        }
    }

    pub fn name(&self) -> &str {
        self.template.name()
    }

    pub fn template(&self) -> &CompiledTemplate {
        &self.template
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    /// The group whose directory holds this template's definition.
    pub fn native(&self) -> &Group {
        &self.native
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    pub(crate) fn enclosing(&self) -> Option<ScopeId> {
        self.enclosing
    }

    /// Replace the value of attribute `name`.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, AttributeError> {
        self.check(name)?;
        self.attributes.set(name, value);
        Ok(self)
    }

    /// Add a value to attribute `name`; a second value turns the attribute
    /// into a list. See [`AttributeStore::append`].
    pub fn append(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, AttributeError> {
        self.check(name)?;
        self.attributes.append(name, value);
        Ok(self)
    }

    /// Read attribute `name`; unset attributes read as null.
    pub fn get(&self, name: &str) -> &Value {
        self.attributes.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// Render with the default interpreter settings.
    pub fn render(&self) -> String {
        Interpreter::default().run(self)
    }

    /// Render into `out`, returning the number of characters written.
    pub fn render_to(&self, out: &mut dyn fmt::Write) -> usize {
        Interpreter::default().run_to(self, out)
    }

    /// Bind without checking the formal parameters; used for arguments and
    /// iteration values.
    pub(crate) fn bind(&mut self, name: String, value: Value) {
        self.attributes.set(name, value);
    }

    fn check(&self, name: &str) -> Result<(), AttributeError> {
        if self.template.formals().accepts(name) {
            Ok(())
        } else {
            Err(AttributeError::NoSuchAttribute {
                template: self.name().to_string(),
                name: name.to_string(),
            })
        }
    }
}

impl Debug for TemplateInstance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateInstance")
            .field("template", &self.name())
            .field("group", &self.group.name())
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}
