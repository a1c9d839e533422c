//! Lowering from AST to bytecode, with static checks.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::compiler::bytecode::{Addr, ArgShape, CompiledTemplate, ConstId, Instr, option_bits};
use crate::compiler::{CompileError, TemplateDirectory};
use crate::diagnostic::{Diagnostic, ErrorKind, Location, compute_suggestions, did_you_mean};
use crate::parser::ast::{
    Args, Condition, Element, Expr, ExprKind, ExprOption, NamedArg, Span, Subtemplate,
};
use crate::parser::{ParseError, parse_expression, parse_template};
use crate::types::{FormalParameter, Formals, ITERATION_PARAMETER};

/// Compile `source` as the body of template `name`.
///
/// Template references are checked against `directory`. All semantic
/// problems found are returned together; a syntax error stops compilation
/// at the first one.
pub fn compile(
    directory: &dyn TemplateDirectory,
    name: &str,
    formals: &Formals,
    source: &str,
) -> Result<CompiledTemplate, CompileError> {
    let template = parse_template(source).map_err(|e| CompileError {
        template: name.to_string(),
        diagnostics: vec![syntax_diagnostic(name, source, &e)],
    })?;

    let mut defaults = Vec::new();
    let mut diagnostics = Vec::new();
    for FormalParameter { name: param, default } in formals.parameters() {
        if let Some(default) = default {
            match parse_expression(default) {
                Ok(expr) => defaults.push((param.clone(), expr)),
                Err(e) => diagnostics.push(
                    Diagnostic::compile(ErrorKind::SyntaxError, name)
                        .arg(format!("default value of {param}: {}", e.message())),
                ),
            }
        }
    }
    if !diagnostics.is_empty() {
        return Err(CompileError {
            template: name.to_string(),
            diagnostics,
        });
    }

    let mut compiler = Compiler {
        directory,
        template: name,
        source: Arc::from(source),
        diagnostics: Vec::new(),
        visible: vec![formals.clone()],
        next_subtemplate: 0,
        in_default: false,
    };
    let mut unit = Unit::default();
    for (param, expr) in &defaults {
        compiler.default_value(&mut unit, param, expr);
    }
    compiler.elements(&mut unit, &template.elements);

    if !compiler.diagnostics.is_empty() {
        return Err(CompileError {
            template: name.to_string(),
            diagnostics: compiler.diagnostics,
        });
    }
    debug!(template = name, instructions = unit.code.len(), "compiled template");
    Ok(unit.finish(name.to_string(), formals.clone(), compiler.source, false))
}

fn syntax_diagnostic(name: &str, source: &str, error: &ParseError) -> Diagnostic {
    Diagnostic::compile(ErrorKind::SyntaxError, name)
        .arg(error.message())
        .at(Location::in_source(source, error.offset(), 1))
}

/// Code being emitted for one template or subtemplate.
#[derive(Default)]
struct Unit {
    code: Vec<Instr>,
    spans: Vec<Option<Range<usize>>>,
    strings: Vec<String>,
    subtemplates: Vec<Arc<CompiledTemplate>>,
}

impl Unit {
    fn constant(&mut self, value: &str) -> ConstId {
        if let Some(id) = self.strings.iter().position(|s| s == value) {
            return id;
        }
        self.strings.push(value.to_string());
        self.strings.len() - 1
    }

    fn finish(
        self,
        name: String,
        formals: Formals,
        source: Arc<str>,
        anonymous: bool,
    ) -> CompiledTemplate {
        CompiledTemplate {
            name,
            formals,
            source,
            code: self.code,
            spans: self.spans,
            strings: self.strings,
            subtemplates: self.subtemplates,
            anonymous,
        }
    }
}

struct Compiler<'a> {
    directory: &'a dyn TemplateDirectory,
    template: &'a str,
    source: Arc<str>,
    diagnostics: Vec<Diagnostic>,
    /// Parameter lists in scope, outermost first. Anonymous subtemplates
    /// see their own parameter and everything their enclosing template
    /// sees.
    visible: Vec<Formals>,
    next_subtemplate: usize,
    /// Default expressions come from parameter declarations, not the
    /// template source, so they carry no source spans.
    in_default: bool,
}

impl Compiler<'_> {
    fn emit(&self, unit: &mut Unit, instr: Instr, span: Span) -> Addr {
        let range = (!self.in_default).then(|| span.range(self.source.len()));
        unit.code.push(instr);
        unit.spans.push(range);
        unit.code.len() - 1
    }

    /// Point the branch at `addr` to `target`.
    fn patch(unit: &mut Unit, addr: Addr, target: Addr) {
        if let Some(Instr::Br(t) | Instr::BrF(t) | Instr::BrIfSet { target: t, .. }) =
            unit.code.get_mut(addr)
        {
            *t = target;
        }
    }

    fn report(&mut self, diagnostic: Diagnostic, span: Span) {
        let diagnostic = if self.in_default {
            diagnostic
        } else {
            let location =
                Location::in_source(&self.source, span.offset(self.source.len()), span.len());
            diagnostic.at(location)
        };
        self.diagnostics.push(diagnostic);
    }

    fn error(&self, kind: ErrorKind) -> Diagnostic {
        Diagnostic::compile(kind, self.template)
    }

    /// `br_if_set attr, skip; <expr>; store_default attr; skip:`
    fn default_value(&mut self, unit: &mut Unit, param: &str, expr: &Expr) {
        self.in_default = true;
        let attr = unit.constant(param);
        let branch = self.emit(unit, Instr::BrIfSet { attr, target: 0 }, expr.span);
        self.expr(unit, expr);
        self.emit(unit, Instr::StoreDefault(attr), expr.span);
        let end = unit.code.len();
        Self::patch(unit, branch, end);
        self.in_default = false;
    }

    fn elements(&mut self, unit: &mut Unit, elements: &[Element]) {
        for element in elements {
            match element {
                Element::Text(text) => {
                    let id = unit.constant(text);
                    self.emit(unit, Instr::Text(id), Span::default());
                }
                Element::Expr {
                    expr,
                    options,
                    span,
                } => {
                    self.expr(unit, expr);
                    let bits = self.options(unit, options);
                    let write = if bits == 0 {
                        Instr::Write
                    } else {
                        Instr::WriteOpt(bits)
                    };
                    self.emit(unit, write, *span);
                }
                Element::If {
                    branches,
                    otherwise,
                } => {
                    let mut exits = Vec::new();
                    for branch in branches {
                        self.condition(unit, &branch.condition);
                        let skip = self.emit(unit, Instr::BrF(0), branch.span);
                        self.elements(unit, &branch.body);
                        exits.push(self.emit(unit, Instr::Br(0), branch.span));
                        let next = unit.code.len();
                        Self::patch(unit, skip, next);
                    }
                    if let Some(body) = otherwise {
                        self.elements(unit, body);
                    }
                    let end = unit.code.len();
                    for exit in exits {
                        Self::patch(unit, exit, end);
                    }
                }
            }
        }
    }

    /// Validate and push option values. Returns the option bits.
    fn options(&mut self, unit: &mut Unit, options: &[ExprOption]) -> u8 {
        let mut slots: [Option<&ExprOption>; 3] = [None, None, None];
        for option in options {
            let slot = match option.name.as_str() {
                "separator" => 0,
                "format" => 1,
                "null" => 2,
                other => {
                    let diagnostic = self.error(ErrorKind::NoSuchOption).arg(other);
                    self.report(diagnostic, option.span);
                    continue;
                }
            };
            if slots[slot].is_some() {
                let diagnostic = self.error(ErrorKind::DuplicateOption).arg(&option.name);
                self.report(diagnostic, option.span);
            } else {
                slots[slot] = Some(option);
            }
        }
        let mut bits = 0;
        for (option, bit) in slots.into_iter().zip([
            option_bits::SEPARATOR,
            option_bits::FORMAT,
            option_bits::NULL,
        ]) {
            if let Some(option) = option {
                self.expr(unit, &option.value);
                bits |= bit;
            }
        }
        bits
    }

    fn condition(&mut self, unit: &mut Unit, condition: &Condition) {
        match condition {
            Condition::Expr(expr) => self.expr(unit, expr),
            Condition::Not(inner) => {
                self.condition(unit, inner);
                self.emit(unit, Instr::Not, Span::default());
            }
            Condition::And(left, right) => {
                self.condition(unit, left);
                self.condition(unit, right);
                self.emit(unit, Instr::And, Span::default());
            }
            Condition::Or(left, right) => {
                self.condition(unit, left);
                self.condition(unit, right);
                self.emit(unit, Instr::Or, Span::default());
            }
        }
    }

    fn expr(&mut self, unit: &mut Unit, expr: &Expr) {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Attribute(name) => {
                self.check_attribute(name, span);
                let id = unit.constant(name);
                self.emit(unit, Instr::LoadAttr(id), span);
            }
            ExprKind::Str(text) => {
                let id = unit.constant(text);
                self.emit(unit, Instr::LoadStr(id), span);
            }
            ExprKind::Bool(b) => {
                self.emit(unit, Instr::LoadBool(*b), span);
            }
            ExprKind::List(items) => {
                for item in items {
                    self.expr(unit, item);
                }
                self.emit(unit, Instr::List(items.len()), span);
            }
            ExprKind::Property { target, name } => {
                self.expr(unit, target);
                let id = unit.constant(name);
                self.emit(unit, Instr::LoadProp(id), span);
            }
            ExprKind::DynamicProperty { target, property } => {
                self.expr(unit, target);
                self.expr(unit, property);
                self.emit(unit, Instr::LoadPropDyn, span);
            }
            ExprKind::Include {
                name,
                args,
                is_super,
            } => {
                self.include(unit, name, args, *is_super, span, false);
            }
            ExprKind::IndirectInclude { name, args } => {
                self.expr(unit, name);
                self.emit(unit, Instr::ToStr, name.span);
                let shape = self.args(unit, args, None);
                self.emit(unit, Instr::NewIndirect { args: shape }, span);
            }
            ExprKind::ToStr(inner) => {
                self.expr(unit, inner);
                self.emit(unit, Instr::ToStr, span);
            }
            ExprKind::Builtin { func, arg } => {
                self.expr(unit, arg);
                self.emit(unit, Instr::Call(*func), span);
            }
            ExprKind::Subtemplate(sub) => {
                let index = self.subtemplate(unit, sub);
                self.emit(unit, Instr::NewSub(index), span);
            }
            ExprKind::Map { target, templates } => {
                self.expr(unit, target);
                for template in templates {
                    self.map_target(unit, template);
                }
                self.emit(unit, Instr::Map(templates.len()), span);
            }
        }
    }

    fn map_target(&mut self, unit: &mut Unit, target: &Expr) {
        let span = target.span;
        match &target.kind {
            ExprKind::Include {
                name,
                args,
                is_super,
            } => {
                self.include(unit, name, args, *is_super, span, true);
            }
            ExprKind::IndirectInclude { args, .. } => {
                if matches!(args, Args::Positional(values) if !values.is_empty()) {
                    let diagnostic = self.error(ErrorKind::PositionalMapArguments).arg("(...)");
                    self.report(diagnostic, span);
                }
                self.expr(unit, target);
            }
            _ => self.expr(unit, target),
        }
    }

    fn include(
        &mut self,
        unit: &mut Unit,
        name: &str,
        args: &Args,
        is_super: bool,
        span: Span,
        mapped: bool,
    ) {
        let callee = if is_super {
            self.directory.super_formals_of(name)
        } else {
            self.directory.formals_of(name)
        };
        match &callee {
            None => {
                let suggestions = compute_suggestions(name, &self.directory.template_names());
                let diagnostic = self
                    .error(ErrorKind::NoSuchTemplate)
                    .arg(if is_super {
                        format!("super.{name}")
                    } else {
                        name.to_string()
                    })
                    .arg(did_you_mean(&suggestions));
                self.report(diagnostic, span);
            }
            Some(formals) => {
                if mapped {
                    if let Args::Positional(values) = args {
                        if !values.is_empty() {
                            let diagnostic =
                                self.error(ErrorKind::PositionalMapArguments).arg(name);
                            self.report(diagnostic, span);
                        }
                    }
                    if !formals.is_open() && formals.is_empty() {
                        let diagnostic =
                            self.error(ErrorKind::MapTemplateWithoutParameters).arg(name);
                        self.report(diagnostic, span);
                    }
                } else if let Args::Positional(values) = args {
                    if values.len() > formals.len() {
                        let diagnostic = self
                            .error(ErrorKind::ArgumentCountMismatch)
                            .arg(values.len())
                            .arg(name)
                            .arg(formals.len());
                        self.report(diagnostic, span);
                    }
                }
            }
        }
        let shape = self.args(unit, args, callee.as_ref().map(|formals| (name, formals)));
        let name = unit.constant(name);
        self.emit(
            unit,
            Instr::New {
                name,
                args: shape,
                is_super,
            },
            span,
        );
    }

    /// Push argument values. Named arguments are checked against the
    /// callee's parameters when it is known statically.
    fn args(&mut self, unit: &mut Unit, args: &Args, callee: Option<(&str, &Formals)>) -> ArgShape {
        match args {
            Args::Positional(values) => {
                for value in values {
                    self.expr(unit, value);
                }
                ArgShape::Positional(values.len())
            }
            Args::Named(named) => {
                let mut seen = HashSet::new();
                for NamedArg { name, value, span } in named {
                    let template = callee.map_or("", |(template, _)| template);
                    if !seen.insert(name.as_str()) {
                        let diagnostic = self
                            .error(ErrorKind::DuplicateArgument)
                            .arg(name)
                            .arg(template);
                        self.report(diagnostic, *span);
                    } else if let Some((template, formals)) = callee {
                        if !formals.accepts(name) {
                            let diagnostic = self
                                .error(ErrorKind::NoSuchFormalArgument)
                                .arg(template)
                                .arg(name);
                            self.report(diagnostic, *span);
                        }
                    }
                    let id = unit.constant(name);
                    self.emit(unit, Instr::LoadStr(id), *span);
                    self.expr(unit, value);
                }
                ArgShape::Named(named.len())
            }
        }
    }

    fn subtemplate(&mut self, unit: &mut Unit, sub: &Subtemplate) -> usize {
        self.next_subtemplate += 1;
        let name = format!("_sub{}", self.next_subtemplate);
        let parameter = sub.parameter.as_deref().unwrap_or(ITERATION_PARAMETER);
        let formals = Formals::names([parameter]);

        self.visible.push(formals.clone());
        let mut inner = Unit::default();
        self.elements(&mut inner, &sub.body.elements);
        self.visible.pop();

        let compiled = inner.finish(name, formals, Arc::clone(&self.source), true);
        unit.subtemplates.push(Arc::new(compiled));
        unit.subtemplates.len() - 1
    }

    fn check_attribute(&mut self, name: &str, span: Span) {
        if self.visible.iter().any(|formals| formals.accepts(name)) {
            return;
        }
        let candidates: Vec<String> = self
            .visible
            .iter()
            .flat_map(|formals| formals.parameters().iter().map(|p| p.name.clone()))
            .collect();
        let suggestions = compute_suggestions(name, &candidates);
        let diagnostic = self
            .error(ErrorKind::NoSuchAttribute)
            .arg(name)
            .arg(did_you_mean(&suggestions));
        self.report(diagnostic, span);
    }
}
