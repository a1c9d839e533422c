//! AST types for template source.

use std::ops::Range;

/// A region of template source.
///
/// Recorded as distances from the end of the source, which is all a parser
/// over `&str` can observe. [`Span::offset`] converts back to a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    rest_at_start: usize,
    rest_at_end: usize,
}

impl Span {
    pub(crate) fn new(rest_at_start: usize, rest_at_end: usize) -> Self {
        Self {
            rest_at_start,
            rest_at_end,
        }
    }

    /// Byte offset of the start within a source of `source_len` bytes.
    pub fn offset(self, source_len: usize) -> usize {
        source_len.saturating_sub(self.rest_at_start)
    }

    /// Length in bytes.
    pub fn len(self) -> usize {
        self.rest_at_start.saturating_sub(self.rest_at_end)
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// The byte range within a source of `source_len` bytes.
    pub fn range(self, source_len: usize) -> Range<usize> {
        let start = self.offset(source_len);
        start..start + self.len()
    }
}

/// A parsed template body.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub elements: Vec<Element>,
}

/// One piece of a template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// Literal text, with escapes already resolved.
    Text(String),

    /// `<expr; options>`.
    Expr {
        expr: Expr,
        options: Vec<ExprOption>,
        span: Span,
    },

    /// `<if(c)>..<elseif(c)>..<else>..<endif>`.
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Element>>,
    },
}

/// A conditional arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Condition,
    pub body: Vec<Element>,
    pub span: Span,
}

/// `name=value` after the `;` of an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprOption {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// A boolean test inside `<if(...)>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Expr(Expr),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A bare name: `<name>`.
    Attribute(String),

    /// `"text"`.
    Str(String),

    /// `true` or `false`.
    Bool(bool),

    /// `[a, b, c]`.
    List(Vec<Expr>),

    /// `target.name`, including numeric names such as `items.0`.
    Property { target: Box<Expr>, name: String },

    /// `target.(expr)`.
    DynamicProperty {
        target: Box<Expr>,
        property: Box<Expr>,
    },

    /// `name(args)` or `super.name(args)`.
    Include {
        name: String,
        args: Args,
        is_super: bool,
    },

    /// `(expr)(args)`: invoke the template whose name `expr` renders to.
    IndirectInclude { name: Box<Expr>, args: Args },

    /// `(expr)`: render `expr` to a string immediately.
    ToStr(Box<Expr>),

    /// `first(expr)` and the other built-in functions.
    Builtin { func: Builtin, arg: Box<Expr> },

    /// `{param | body}`.
    Subtemplate(Subtemplate),

    /// `target:t1(),t2()`. More than one template means round-robin.
    Map {
        target: Box<Expr>,
        templates: Vec<Expr>,
    },
}

/// Arguments of a template invocation. Mixing the two forms is a syntax
/// error.
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    Positional(Vec<Expr>),
    Named(Vec<NamedArg>),
}

impl Args {
    pub fn len(&self) -> usize {
        match self {
            Args::Positional(args) => args.len(),
            Args::Named(args) => args.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedArg {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// An anonymous template written inline.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtemplate {
    /// The declared parameter name, `it` when omitted.
    pub parameter: Option<String>,
    pub body: Template,
}

/// Built-in functions over attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    First,
    Last,
    Rest,
    Trunc,
    Strip,
    Length,
    Strlen,
    Trim,
    Reverse,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        Some(match name {
            "first" => Builtin::First,
            "last" => Builtin::Last,
            "rest" => Builtin::Rest,
            "trunc" => Builtin::Trunc,
            "strip" => Builtin::Strip,
            "length" => Builtin::Length,
            "strlen" => Builtin::Strlen,
            "trim" => Builtin::Trim,
            "reverse" => Builtin::Reverse,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::First => "first",
            Builtin::Last => "last",
            Builtin::Rest => "rest",
            Builtin::Trunc => "trunc",
            Builtin::Strip => "strip",
            Builtin::Length => "length",
            Builtin::Strlen => "strlen",
            Builtin::Trim => "trim",
            Builtin::Reverse => "reverse",
        }
    }

    /// Whether the argument is rendered to text before the function runs.
    pub fn takes_text(self) -> bool {
        matches!(self, Builtin::Strlen | Builtin::Trim)
    }
}
