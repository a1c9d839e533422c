//! The stack machine.
//!
//! One `Machine` exists per top-level render call. It owns the operand
//! stack and the scope chain; the instruction pointer of each invocation
//! lives in that invocation's frame.

use std::cell::Cell;

use tracing::{debug, trace};

use crate::compiler::{ArgShape, Instr, option_bits};
use crate::diagnostic::{Diagnostic, DiagnosticListener, ErrorKind, Location};
use crate::group::{Group, ResolveError, TemplateInstance};
use crate::interpreter::builtins::{self, PropertyError};
use crate::interpreter::render::{Sink, WriteOptions};
use crate::interpreter::scope::{ExprEvent, ScopeChain, ScopeId, TemplateEvent};
use crate::types::{Formals, ITERATION_PARAMETER, Value};

/// The current instance stopped early. Its caller keeps going.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Aborted;

/// The lexical environment of an executing instance.
///
/// Envs form a linked list on the Rust stack that mirrors the scope chain.
/// Anonymous subtemplates reach the attributes of the instance that created
/// them by walking up to its env.
pub(crate) struct Env<'a> {
    pub(crate) instance: &'a TemplateInstance,
    pub(crate) scope: ScopeId,
    parent: Option<&'a Env<'a>>,
}

impl<'a> Env<'a> {
    fn ancestor(&self, scope: ScopeId) -> Option<&'a Env<'a>> {
        let mut current = self.parent;
        while let Some(env) = current {
            if env.scope == scope {
                return Some(env);
            }
            current = env.parent;
        }
        None
    }
}

/// Arguments popped off the operand stack.
enum Arguments {
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

pub(crate) struct Machine<'l> {
    max_depth: usize,
    listener: &'l dyn DiagnosticListener,
    /// The group of the root instance. Invocations resolve here first.
    group: Group,
    pub(crate) chain: ScopeChain,
    stack: Vec<Value>,
    /// Position in the top-level output of the innermost sink.
    pub(crate) cursor: Cell<usize>,
}

impl<'l> Machine<'l> {
    pub(crate) fn new(
        max_depth: usize,
        listener: &'l dyn DiagnosticListener,
        group: Group,
        chain: ScopeChain,
    ) -> Self {
        Self {
            max_depth,
            listener,
            group,
            chain,
            stack: Vec::new(),
            cursor: Cell::new(0),
        }
    }

    pub(crate) fn group(&self) -> &Group {
        &self.group
    }

    /// Execute `instance` in a new frame under `parent`, writing to `sink`.
    pub(crate) fn invoke(
        &mut self,
        instance: &TemplateInstance,
        parent: Option<&Env<'_>>,
        sink: &mut Sink<'_>,
    ) {
        let depth = parent.map_or(0, |env| self.chain.depth(env.scope) + 1);
        if depth > self.max_depth {
            if let Some(env) = parent {
                self.report(
                    env,
                    Diagnostic::render(ErrorKind::RecursionLimit)
                        .arg(self.max_depth)
                        .arg(instance.name()),
                );
            }
            return;
        }

        let scope = self.chain.enter(parent.map(|env| env.scope), instance.name());
        let env = Env {
            instance,
            scope,
            parent,
        };
        trace!(template = instance.name(), depth, "enter template");
        let start = sink.position();
        let base = self.stack.len();
        if self.exec(&env, sink).is_err() {
            debug!(template = instance.name(), "template aborted");
        }
        self.stack.truncate(base);
        self.chain.record_template(TemplateEvent {
            scope,
            template: instance.name().to_string(),
            output: start..sink.position(),
            early_eval: self.chain.early_eval(scope),
        });
        self.chain.exit(scope);
    }

    fn exec(&mut self, env: &Env<'_>, sink: &mut Sink<'_>) -> Result<(), Aborted> {
        let template = env.instance.template();
        loop {
            let ip = self.chain.ip(env.scope);
            let Some(&instr) = template.code().get(ip) else {
                return Ok(());
            };
            self.chain.set_ip(env.scope, ip + 1);
            match instr {
                Instr::Text(id) => {
                    self.write_text(env, sink, template.string(id));
                }
                Instr::LoadStr(id) => self.stack.push(Value::from(template.string(id))),
                Instr::LoadBool(b) => self.stack.push(Value::from(b)),
                Instr::LoadAttr(id) => {
                    let value = self.lookup(env, template.string(id)).unwrap_or_default();
                    self.stack.push(value);
                }
                Instr::LoadProp(id) => {
                    let target = self.pop();
                    let value = self.property(env, &target, template.string(id));
                    self.stack.push(value);
                }
                Instr::LoadPropDyn => {
                    let key = self.pop();
                    let target = self.pop();
                    let name = match key.as_int() {
                        Some(index) => index.to_string(),
                        None => self.render_text(env, &key),
                    };
                    let value = self.property(env, &target, &name);
                    self.stack.push(value);
                }
                Instr::Call(func) => {
                    let value = self.pop();
                    let value = if func.takes_text() && !value.is_null() {
                        Value::from(self.render_text(env, &value))
                    } else {
                        value
                    };
                    self.stack.push(builtins::apply(func, value));
                }
                Instr::List(n) => {
                    let items = self.pop_n(n);
                    self.stack.push(builtins::list(items));
                }
                Instr::New {
                    name,
                    args,
                    is_super,
                } => {
                    let args = self.pop_args(args);
                    let instance = self.instantiate(env, template.string(name), args, is_super)?;
                    self.stack.push(Value::from(instance));
                }
                Instr::NewIndirect { args } => {
                    let args = self.pop_args(args);
                    let name = self.pop();
                    let name = name.as_str().unwrap_or_default();
                    if name.is_empty() {
                        let source = template
                            .span_of(ip)
                            .and_then(|range| template.source().get(range))
                            .unwrap_or_default()
                            .to_string();
                        self.report(env, Diagnostic::render(ErrorKind::EmptyTemplateName).arg(source));
                        return Err(Aborted);
                    }
                    let instance = self.instantiate(env, name, args, false)?;
                    self.stack.push(Value::from(instance));
                }
                Instr::NewSub(index) => {
                    let Some(sub) = template.subtemplates().get(index) else {
                        self.report(
                            env,
                            Diagnostic::render(ErrorKind::InternalError)
                                .arg(format!("no subtemplate {index}")),
                        );
                        return Err(Aborted);
                    };
                    let instance = TemplateInstance::new(
                        self.group.clone(),
                        env.instance.native().clone(),
                        sub.clone(),
                        Some(env.scope),
                    );
                    self.stack.push(Value::from(instance));
                }
                Instr::Map(n) => {
                    let prototypes = self.pop_n(n);
                    let target = self.pop();
                    let mapped = self.map(env, &target, &prototypes);
                    self.stack.push(mapped);
                }
                Instr::ToStr => {
                    let value = self.pop();
                    let previous = self.chain.set_early_eval(env.scope, true);
                    let text = self.render_text(env, &value);
                    self.chain.set_early_eval(env.scope, previous);
                    self.stack.push(Value::from(text));
                }
                Instr::Write => {
                    let value = self.pop();
                    self.write_expr(env, sink, &value, &WriteOptions::default(), ip);
                }
                Instr::WriteOpt(bits) => {
                    let options = self.pop_options(env, bits);
                    let value = self.pop();
                    self.write_expr(env, sink, &value, &options, ip);
                }
                Instr::Not => {
                    let value = self.pop();
                    self.stack.push(Value::from(!value.is_truthy()));
                }
                Instr::And => {
                    let right = self.pop();
                    let left = self.pop();
                    self.stack
                        .push(Value::from(left.is_truthy() && right.is_truthy()));
                }
                Instr::Or => {
                    let right = self.pop();
                    let left = self.pop();
                    self.stack
                        .push(Value::from(left.is_truthy() || right.is_truthy()));
                }
                Instr::Br(target) => self.chain.set_ip(env.scope, target),
                Instr::BrF(target) => {
                    if !self.pop().is_truthy() {
                        self.chain.set_ip(env.scope, target);
                    }
                }
                Instr::BrIfSet { attr, target } => {
                    if env.instance.attributes().contains(template.string(attr)) {
                        self.chain.set_ip(env.scope, target);
                    }
                }
                Instr::StoreDefault(attr) => {
                    let value = self.pop();
                    self.chain
                        .store_default(env.scope, template.string(attr), value);
                }
            }
        }
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_default()
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len().saturating_sub(n);
        self.stack.split_off(at)
    }

    fn pop_args(&mut self, shape: ArgShape) -> Arguments {
        let values = self.pop_n(shape.slots());
        match shape {
            ArgShape::Positional(_) => Arguments::Positional(values),
            ArgShape::Named(_) => {
                let mut pairs = Vec::new();
                let mut values = values.into_iter();
                while let (Some(name), Some(value)) = (values.next(), values.next()) {
                    pairs.push((name.as_str().unwrap_or_default().to_string(), value));
                }
                Arguments::Named(pairs)
            }
        }
    }

    /// Pop option values pushed in `option_bits` order and render them.
    fn pop_options(&mut self, env: &Env<'_>, bits: u8) -> WriteOptions {
        let mut options = WriteOptions::default();
        if bits & option_bits::NULL != 0 {
            let value = self.pop();
            options.null = Some(self.render_text(env, &value));
        }
        if bits & option_bits::FORMAT != 0 {
            let value = self.pop();
            options.format = Some(self.render_text(env, &value));
        }
        if bits & option_bits::SEPARATOR != 0 {
            let value = self.pop();
            options.separator = Some(self.render_text(env, &value));
        }
        options
    }

    /// Resolve an attribute: the instance's own attributes, then defaults
    /// stored in its frame, then (for anonymous subtemplates only) the
    /// instance that lexically encloses it.
    pub(crate) fn lookup(&self, env: &Env<'_>, name: &str) -> Option<Value> {
        let mut current = Some(env);
        while let Some(env) = current {
            if let Some(value) = env.instance.attributes().lookup(name) {
                return Some(value.clone());
            }
            if let Some(value) = self.chain.default_of(env.scope, name) {
                return Some(value.clone());
            }
            current = env.instance.enclosing().and_then(|scope| env.ancestor(scope));
        }
        None
    }

    fn property(&self, env: &Env<'_>, target: &Value, name: &str) -> Value {
        match builtins::property(target, name) {
            Ok(value) => value,
            Err(PropertyError::NoSuchProperty(description)) => {
                self.report(env, Diagnostic::render(ErrorKind::NoSuchProperty).arg(description));
                Value::Null
            }
            Err(PropertyError::IndexOutOfRange { index, len }) => {
                self.report(
                    env,
                    Diagnostic::render(ErrorKind::IndexOutOfRange)
                        .arg(index)
                        .arg(len),
                );
                Value::Null
            }
        }
    }

    /// Create an instance of a named template and bind its arguments.
    ///
    /// Names resolve against the root instance's group, so overrides in a
    /// group that imports this template's group take effect. `super`
    /// resolves against the imports of the group that defined the caller.
    fn instantiate(
        &mut self,
        env: &Env<'_>,
        name: &str,
        args: Arguments,
        is_super: bool,
    ) -> Result<TemplateInstance, Aborted> {
        let resolved = if is_super {
            env.instance.native().resolve_super(name)
        } else {
            self.group.resolve(name)
        };
        let (native, template) = match resolved {
            Ok(found) => found,
            Err(ResolveError::Undefined) => {
                let shown = if is_super {
                    format!("super.{name}")
                } else {
                    name.to_string()
                };
                self.report(env, Diagnostic::render(ErrorKind::UndefinedTemplate).arg(shown));
                return Err(Aborted);
            }
            Err(ResolveError::CompileFailed) => {
                self.report(env, Diagnostic::render(ErrorKind::TemplateCompileFailed).arg(name));
                return Err(Aborted);
            }
        };

        let mut instance = TemplateInstance::new(self.group.clone(), native, template, None);
        match args {
            Arguments::Positional(values) => {
                let declared = instance.template().formals().len();
                if values.len() > declared {
                    self.report(
                        env,
                        Diagnostic::render(ErrorKind::ArgumentCountMismatch)
                            .arg(values.len())
                            .arg(name)
                            .arg(declared),
                    );
                    return Err(Aborted);
                }
                let names: Vec<String> = instance
                    .template()
                    .formals()
                    .parameters()
                    .iter()
                    .map(|p| p.name.clone())
                    .collect();
                for (param, value) in names.into_iter().zip(values) {
                    instance.bind(param, value);
                }
            }
            Arguments::Named(pairs) => {
                for (param, value) in pairs {
                    if instance.template().formals().accepts(&param) {
                        instance.bind(param, value);
                    } else {
                        self.report(
                            env,
                            Diagnostic::render(ErrorKind::NoSuchFormalArgument)
                                .arg(name)
                                .arg(&param),
                        );
                    }
                }
            }
        }
        Ok(instance)
    }

    /// Apply template prototypes to each element of `target`, cycling
    /// through them by index. Null elements stay null and do not advance
    /// the index.
    fn map(&self, env: &Env<'_>, target: &Value, prototypes: &[Value]) -> Value {
        if target.is_null() || prototypes.is_empty() {
            return Value::Null;
        }
        let mut results = Vec::new();
        let mut index = 0;
        for element in target.elements() {
            if element.is_null() {
                results.push(Value::Null);
            } else {
                let prototype = prototypes.get(index % prototypes.len());
                let mapped = match prototype {
                    Some(Value::Instance(prototype)) => {
                        self.bind_element(env, prototype, element.into_owned(), index)
                    }
                    _ => Value::Null,
                };
                results.push(mapped);
                index += 1;
            }
        }
        if target.is_multi_valued() {
            Value::Sequence(results)
        } else {
            results.pop().unwrap_or_default()
        }
    }

    fn bind_element(
        &self,
        env: &Env<'_>,
        prototype: &TemplateInstance,
        element: Value,
        index: usize,
    ) -> Value {
        let mut instance = prototype.clone();
        let parameter = match instance.template().formals() {
            Formals::Open => Some(ITERATION_PARAMETER.to_string()),
            Formals::Declared(params) => params.first().map(|p| p.name.clone()),
        };
        let Some(parameter) = parameter else {
            self.report(
                env,
                Diagnostic::render(ErrorKind::MapTemplateWithoutParameters).arg(instance.name()),
            );
            return Value::Null;
        };
        instance.bind(parameter, element);
        instance.bind("i".to_string(), Value::from(index + 1));
        instance.bind("i0".to_string(), Value::from(index));
        Value::from(instance)
    }

    fn write_expr(
        &mut self,
        env: &Env<'_>,
        sink: &mut Sink<'_>,
        value: &Value,
        options: &WriteOptions,
        ip: usize,
    ) {
        let start = sink.position();
        self.write_value(env, sink, value, options);
        if self.chain.is_tracing() && !self.chain.early_eval(env.scope) {
            self.chain.record_expr(ExprEvent {
                scope: env.scope,
                output: start..sink.position(),
                source: env.instance.template().span_of(ip),
            });
        }
    }

    /// Send a render-time diagnostic, tagged with the invocation path and
    /// the source location of the current instruction.
    pub(crate) fn report(&self, env: &Env<'_>, diagnostic: Diagnostic) {
        let template = env.instance.template();
        let ip = self.chain.ip(env.scope).saturating_sub(1);
        let mut diagnostic = diagnostic
            .in_template(template.name())
            .with_call_path(self.chain.call_path(env.scope));
        if let Some(range) = template.span_of(ip) {
            diagnostic = diagnostic.at(Location::in_source(
                template.source(),
                range.start,
                range.len(),
            ));
        }
        self.listener.report(diagnostic);
    }
}
