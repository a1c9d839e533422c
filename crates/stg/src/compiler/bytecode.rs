//! Instruction set and compiled template representation.

use std::fmt::Write as _;
use std::ops::Range;
use std::sync::Arc;

use crate::parser::ast::Builtin;
use crate::types::Formals;

/// Index into a template's string pool.
pub type ConstId = usize;

/// Index into a template's instruction stream.
pub type Addr = usize;

/// Option bits carried by [`Instr::WriteOpt`]. Values for set bits are on
/// the operand stack in this order, separator deepest.
pub mod option_bits {
    pub const SEPARATOR: u8 = 1;
    pub const FORMAT: u8 = 2;
    pub const NULL: u8 = 4;
}

/// How invocation arguments were pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    /// `n` values, bound to formals in declaration order.
    Positional(usize),
    /// `n` pairs of (name string, value).
    Named(usize),
}

impl ArgShape {
    /// Number of operand stack slots the arguments occupy.
    pub fn slots(self) -> usize {
        match self {
            ArgShape::Positional(n) => n,
            ArgShape::Named(n) => n * 2,
        }
    }
}

/// A single stack machine instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    /// Write a pooled string straight to the output.
    Text(ConstId),
    LoadStr(ConstId),
    LoadBool(bool),
    /// Push the value of the named attribute.
    LoadAttr(ConstId),
    /// Replace the top of stack with its named property.
    LoadProp(ConstId),
    /// Pop a property key, then replace the top of stack with that property.
    LoadPropDyn,
    /// Apply a built-in function to the top of stack.
    Call(Builtin),
    /// Pop `n` values and push them as one flattened sequence.
    List(usize),
    /// Pop arguments and push a new instance of a named template.
    New {
        name: ConstId,
        args: ArgShape,
        is_super: bool,
    },
    /// Like `New`, but the template name is on the stack beneath the
    /// arguments.
    NewIndirect { args: ArgShape },
    /// Push an instance of the given anonymous subtemplate.
    NewSub(usize),
    /// Pop `n` template prototypes and a value, push the mapped result.
    Map(usize),
    /// Render the top of stack to a string in early-evaluation mode.
    ToStr,
    /// Pop and write a value.
    Write,
    /// Pop options per [`option_bits`], then pop and write a value.
    WriteOpt(u8),
    Not,
    And,
    Or,
    Br(Addr),
    /// Pop a value and branch if it is falsy.
    BrF(Addr),
    /// Branch if the named attribute was supplied to this instance.
    BrIfSet { attr: ConstId, target: Addr },
    /// Pop a value and store it as the named attribute's default.
    StoreDefault(ConstId),
}

impl Instr {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Instr::Text(_) => "text",
            Instr::LoadStr(_) => "load_str",
            Instr::LoadBool(_) => "load_bool",
            Instr::LoadAttr(_) => "load_attr",
            Instr::LoadProp(_) => "load_prop",
            Instr::LoadPropDyn => "load_prop_dyn",
            Instr::Call(_) => "call",
            Instr::List(_) => "list",
            Instr::New { is_super: true, .. } => "super_new",
            Instr::New { .. } => "new",
            Instr::NewIndirect { .. } => "new_ind",
            Instr::NewSub(_) => "new_sub",
            Instr::Map(_) => "map",
            Instr::ToStr => "tostr",
            Instr::Write => "write",
            Instr::WriteOpt(_) => "write_opt",
            Instr::Not => "not",
            Instr::And => "and",
            Instr::Or => "or",
            Instr::Br(_) => "br",
            Instr::BrF(_) => "brf",
            Instr::BrIfSet { .. } => "br_if_set",
            Instr::StoreDefault(_) => "store_default",
        }
    }
}

/// A compiled template: immutable once built, shared by every instance.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub(crate) name: String,
    pub(crate) formals: Formals,
    pub(crate) source: Arc<str>,
    pub(crate) code: Vec<Instr>,
    /// Source region of each instruction, parallel to `code`.
    pub(crate) spans: Vec<Option<Range<usize>>>,
    pub(crate) strings: Vec<String>,
    pub(crate) subtemplates: Vec<Arc<CompiledTemplate>>,
    pub(crate) anonymous: bool,
}

impl CompiledTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formals(&self) -> &Formals {
        &self.formals
    }

    /// The complete source this template was compiled from. Anonymous
    /// subtemplates share their enclosing template's source.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn subtemplates(&self) -> &[Arc<CompiledTemplate>] {
        &self.subtemplates
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// The source region that produced the instruction at `addr`.
    pub fn span_of(&self, addr: Addr) -> Option<Range<usize>> {
        self.spans.get(addr).cloned().flatten()
    }

    pub(crate) fn string(&self, id: ConstId) -> &str {
        self.strings.get(id).map_or("", String::as_str)
    }

    /// Render the operands of `instr` for listings.
    pub fn operands(&self, instr: Instr) -> String {
        match instr {
            Instr::Text(id)
            | Instr::LoadStr(id)
            | Instr::LoadAttr(id)
            | Instr::LoadProp(id)
            | Instr::StoreDefault(id) => format!("{:?}", self.string(id)),
            Instr::LoadBool(b) => b.to_string(),
            Instr::Call(func) => func.name().to_string(),
            Instr::List(n) | Instr::Map(n) => n.to_string(),
            Instr::New { name, args, .. } => {
                format!("{:?} {}", self.string(name), describe_args(args))
            }
            Instr::NewIndirect { args } => describe_args(args),
            Instr::NewSub(index) => self
                .subtemplates
                .get(index)
                .map_or_else(|| index.to_string(), |sub| sub.name.clone()),
            Instr::WriteOpt(bits) => describe_options(bits),
            Instr::Br(target) | Instr::BrF(target) => format!("{target:04}"),
            Instr::BrIfSet { attr, target } => {
                format!("{:?} {target:04}", self.string(attr))
            }
            Instr::LoadPropDyn
            | Instr::ToStr
            | Instr::Write
            | Instr::Not
            | Instr::And
            | Instr::Or => String::new(),
        }
    }

    /// A listing of the instruction stream followed by each subtemplate's.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out);
        out
    }

    fn disassemble_into(&self, out: &mut String) {
        let _ = writeln!(out, "{}:", self.name);
        for (addr, instr) in self.code.iter().enumerate() {
            let operands = self.operands(*instr);
            if operands.is_empty() {
                let _ = writeln!(out, "{addr:04}: {}", instr.mnemonic());
            } else {
                let _ = writeln!(out, "{addr:04}: {} {operands}", instr.mnemonic());
            }
        }
        for sub in &self.subtemplates {
            sub.disassemble_into(out);
        }
    }
}

fn describe_args(args: ArgShape) -> String {
    match args {
        ArgShape::Positional(n) => format!("args={n}"),
        ArgShape::Named(n) => format!("named={n}"),
    }
}

fn describe_options(bits: u8) -> String {
    let mut names = Vec::new();
    if bits & option_bits::SEPARATOR != 0 {
        names.push("separator");
    }
    if bits & option_bits::FORMAT != 0 {
        names.push("format");
    }
    if bits & option_bits::NULL != 0 {
        names.push("null");
    }
    names.join(",")
}
