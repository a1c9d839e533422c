//! Template source parser using winnow.
//!
//! Parses template text into an AST. Handles:
//! - Literal text with `\<`, `\>`, `\{`, `\}` escapes
//! - `<expr>` with `; name=value` options
//! - `<if(..)>`, `<elseif(..)>`, `<else>`, `<endif>`
//! - Comments `<! .. !>` and special characters `<\n>`, `<\t>`, `<\ >`,
//!   `<\uXXXX>`, `<\\>`
//! - Map, round-robin map, invocation, property access, anonymous
//!   subtemplates and built-in functions inside expressions

use winnow::combinator::{cut_err, fail, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, literal, one_of, take_until, take_while};

use super::ast::*;
use super::error::ParseError;

/// Parse a template body into an AST.
pub fn parse_template(source: &str) -> Result<Template, ParseError> {
    let mut remaining = source;
    let result = template(&mut remaining);
    finish(source, remaining, result)
}

/// Parse a standalone expression, such as a parameter default.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let mut remaining = source;
    let result = standalone_expression(&mut remaining);
    finish(source, remaining, result)
}

fn finish<T>(source: &str, remaining: &str, result: ModalResult<T>) -> Result<T, ParseError> {
    match result {
        Ok(value) if remaining.is_empty() => Ok(value),
        Ok(_) => Err(syntax_error(
            source,
            remaining,
            format!(
                "unexpected character: '{}'",
                remaining.chars().next().unwrap_or('?')
            ),
        )),
        Err(e) => Err(syntax_error(source, remaining, describe(e))),
    }
}

fn syntax_error(source: &str, remaining: &str, message: String) -> ParseError {
    let (line, column) = calculate_position(source, remaining);
    ParseError::Syntax {
        line,
        column,
        offset: source.len().saturating_sub(remaining.len()),
        message,
    }
}

/// Calculate line and column from original input and remaining input.
fn calculate_position(original: &str, remaining: &str) -> (usize, usize) {
    let consumed = original.len().saturating_sub(remaining.len());
    let consumed_str = original.get(..consumed).unwrap_or(original);
    let line = consumed_str.chars().filter(|&c| c == '\n').count() + 1;
    let line_start = consumed_str.rfind('\n').map_or(0, |pos| pos + 1);
    let column = consumed_str[line_start..].chars().count() + 1;
    (line, column)
}

/// Turn winnow's context stack into a one-line message.
fn describe(error: ErrMode<ContextError>) -> String {
    let error = match error {
        ErrMode::Backtrack(e) | ErrMode::Cut(e) => e,
        ErrMode::Incomplete(_) => return "unexpected end of input".to_string(),
    };
    let mut labels = Vec::new();
    let mut expected = Vec::new();
    for context in error.context() {
        if let StrContext::Label(label) = context {
            labels.push((*label).to_string());
        } else if let StrContext::Expected(value) = context {
            expected.push(value.to_string());
        }
    }
    match (labels.is_empty(), expected.is_empty()) {
        (true, true) => "invalid syntax".to_string(),
        (false, true) => labels.join(": "),
        (true, false) => format!("expected {}", expected.join(" or ")),
        (false, false) => format!("{}: expected {}", labels.join(": "), expected.join(" or ")),
    }
}

/// Fail here with `label` as the message, committing to this branch.
fn fail_with<T>(input: &mut &str, label: &'static str) -> ModalResult<T> {
    cut_err(fail::<_, T, _>.context(StrContext::Label(label))).parse_next(input)
}

/// Consume `token` or fail with an "expected" message.
fn expect(input: &mut &str, token: &'static str) -> ModalResult<()> {
    cut_err(
        literal(token)
            .void()
            .context(StrContext::Expected(StrContextValue::StringLiteral(token))),
    )
    .parse_next(input)
}

fn template(input: &mut &str) -> ModalResult<Template> {
    let elements = elements(input, false)?;
    if at_branch_tag(input) {
        return fail_with(input, "`<elseif>`, `<else>` or `<endif>` without matching `<if>`");
    }
    Ok(Template { elements })
}

fn standalone_expression(input: &mut &str) -> ModalResult<Expr> {
    ws(input)?;
    let expr = expression(input)?;
    ws(input)?;
    Ok(expr)
}

fn at_branch_tag(input: &str) -> bool {
    input.starts_with("<elseif(") || input.starts_with("<else>") || input.starts_with("<endif>")
}

/// Parse elements until end of input, a branch tag, or (inside a
/// subtemplate) the closing brace.
fn elements(input: &mut &str, nested: bool) -> ModalResult<Vec<Element>> {
    let mut elements = Vec::new();
    loop {
        if input.is_empty() || (nested && input.starts_with('}')) || at_branch_tag(input) {
            return Ok(merge_text(elements));
        }
        if input.starts_with("<!") {
            comment(input)?;
        } else if input.starts_with("<\\") {
            elements.push(Element::Text(special_characters(input)?));
        } else if input.starts_with("<if(") {
            elements.push(conditional(input, nested)?);
        } else if input.starts_with('<') {
            elements.push(expression_tag(input)?);
        } else {
            elements.push(Element::Text(text(input, nested)?));
        }
    }
}

/// Merge adjacent text elements and drop empty ones.
fn merge_text(elements: Vec<Element>) -> Vec<Element> {
    let mut result = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            Element::Text(text) if text.is_empty() => {}
            Element::Text(text) => {
                if let Some(Element::Text(prev)) = result.last_mut() {
                    prev.push_str(&text);
                } else {
                    result.push(Element::Text(text));
                }
            }
            other => result.push(other),
        }
    }
    result
}

fn text(input: &mut &str, nested: bool) -> ModalResult<String> {
    let mut out = String::new();
    loop {
        let chunk = take_while(0.., |c: char| c != '<' && c != '\\' && !(nested && c == '}'))
            .parse_next(input)?;
        out.push_str(chunk);
        if !input.starts_with('\\') {
            return Ok(out);
        }
        '\\'.parse_next(input)?;
        match input.chars().next() {
            Some(c @ ('<' | '>' | '{' | '}')) => {
                any.parse_next(input)?;
                out.push(c);
            }
            _ => out.push('\\'),
        }
    }
}

fn comment(input: &mut &str) -> ModalResult<()> {
    "<!".parse_next(input)?;
    cut_err(take_until(0.., "!>"))
        .context(StrContext::Label("unterminated comment"))
        .parse_next(input)?;
    "!>".void().parse_next(input)
}

/// `<\n>`, `<\t>`, `<\ >`, `<\uXXXX>` and the newline-swallowing `<\\>`.
fn special_characters(input: &mut &str) -> ModalResult<String> {
    '<'.parse_next(input)?;
    let mut out = String::new();
    let mut swallow_newline = false;
    while !input.starts_with('>') {
        expect(input, "\\")?;
        match any.parse_next(input)? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            ' ' => out.push(' '),
            '\\' => swallow_newline = true,
            'u' => {
                let digits: &str = cut_err(take_while(4, |c: char| c.is_ascii_hexdigit()))
                    .context(StrContext::Label("unicode escape"))
                    .context(StrContext::Expected(StrContextValue::Description(
                        "four hex digits",
                    )))
                    .parse_next(input)?;
                match u32::from_str_radix(digits, 16).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => return fail_with(input, "invalid unicode escape"),
                }
            }
            _ => return fail_with(input, "invalid escape character"),
        }
    }
    '>'.parse_next(input)?;
    if swallow_newline {
        opt('\r').parse_next(input)?;
        opt('\n').parse_next(input)?;
    }
    Ok(out)
}

fn conditional(input: &mut &str, nested: bool) -> ModalResult<Element> {
    let mut branches = Vec::new();
    let mut tag = "<if(";
    loop {
        let start = input.len();
        literal(tag).parse_next(input)?;
        ws(input)?;
        let condition = condition(input)?;
        ws(input)?;
        expect(input, ")>")?;
        let span = Span::new(start, input.len());
        let body = elements(input, nested)?;
        branches.push(Branch {
            condition,
            body,
            span,
        });
        if !input.starts_with("<elseif(") {
            break;
        }
        tag = "<elseif(";
    }
    let otherwise = if input.starts_with("<else>") {
        "<else>".parse_next(input)?;
        Some(elements(input, nested)?)
    } else {
        None
    };
    expect(input, "<endif>")?;
    Ok(Element::If {
        branches,
        otherwise,
    })
}

fn expression_tag(input: &mut &str) -> ModalResult<Element> {
    let start = input.len();
    '<'.parse_next(input)?;
    ws(input)?;
    let expr = expression(input)?;
    ws(input)?;
    let mut options = Vec::new();
    if opt(';').parse_next(input)?.is_some() {
        loop {
            options.push(expression_option(input)?);
            ws(input)?;
            if opt(',').parse_next(input)?.is_none() {
                break;
            }
        }
    }
    expect(input, ">")?;
    Ok(Element::Expr {
        expr,
        options,
        span: Span::new(start, input.len()),
    })
}

fn expression_option(input: &mut &str) -> ModalResult<ExprOption> {
    ws(input)?;
    let start = input.len();
    let name = cut_err(identifier)
        .context(StrContext::Expected(StrContextValue::Description("option name")))
        .parse_next(input)?;
    let span = Span::new(start, input.len());
    ws(input)?;
    expect(input, "=")?;
    ws(input)?;
    let value = expression_no_comma(input)?;
    Ok(ExprOption {
        name: name.to_string(),
        value,
        span,
    })
}

fn condition(input: &mut &str) -> ModalResult<Condition> {
    let mut left = and_condition(input)?;
    loop {
        let checkpoint = *input;
        ws(input)?;
        if opt("||").parse_next(input)?.is_none() {
            *input = checkpoint;
            return Ok(left);
        }
        ws(input)?;
        let right = and_condition(input)?;
        left = Condition::Or(Box::new(left), Box::new(right));
    }
}

fn and_condition(input: &mut &str) -> ModalResult<Condition> {
    let mut left = not_condition(input)?;
    loop {
        let checkpoint = *input;
        ws(input)?;
        if opt("&&").parse_next(input)?.is_none() {
            *input = checkpoint;
            return Ok(left);
        }
        ws(input)?;
        let right = not_condition(input)?;
        left = Condition::And(Box::new(left), Box::new(right));
    }
}

fn not_condition(input: &mut &str) -> ModalResult<Condition> {
    if opt('!').parse_next(input)?.is_some() {
        ws(input)?;
        return Ok(Condition::Not(Box::new(not_condition(input)?)));
    }
    if input.starts_with('(') {
        // A parenthesized condition, unless the parentheses turn out to be
        // an expression such as `(name)(args)` or `(a).b`.
        let checkpoint = *input;
        match parenthesized_condition(input) {
            Ok(condition) if !input.starts_with(['(', '.', ':']) => return Ok(condition),
            _ => *input = checkpoint,
        }
    }
    Ok(Condition::Expr(expression(input)?))
}

fn parenthesized_condition(input: &mut &str) -> ModalResult<Condition> {
    '('.parse_next(input)?;
    ws(input)?;
    let condition = condition(input)?;
    ws(input)?;
    ')'.parse_next(input)?;
    Ok(condition)
}

/// A full expression, including round-robin map targets.
fn expression(input: &mut &str) -> ModalResult<Expr> {
    map_chain(input, true)
}

/// An expression in a comma-separated context: arguments, list elements,
/// option values. Round-robin map lists are not allowed here.
fn expression_no_comma(input: &mut &str) -> ModalResult<Expr> {
    map_chain(input, false)
}

/// `member (':' target (',' target)*)*`, left-associative.
fn map_chain(input: &mut &str, round_robin: bool) -> ModalResult<Expr> {
    let start = input.len();
    let mut expr = member(input)?;
    loop {
        let checkpoint = *input;
        ws(input)?;
        if opt(':').parse_next(input)?.is_none() {
            *input = checkpoint;
            return Ok(expr);
        }
        ws(input)?;
        let mut templates = vec![map_target(input)?];
        if round_robin {
            loop {
                let checkpoint = *input;
                ws(input)?;
                if opt(',').parse_next(input)?.is_none() {
                    *input = checkpoint;
                    break;
                }
                ws(input)?;
                templates.push(map_target(input)?);
            }
        }
        expr = Expr {
            kind: ExprKind::Map {
                target: Box::new(expr),
                templates,
            },
            span: Span::new(start, input.len()),
        };
    }
}

/// The right-hand side of `:`: `name(args)`, `super.name(args)`,
/// `(expr)(args)`, or `{...}`.
fn map_target(input: &mut &str) -> ModalResult<Expr> {
    let start = input.len();
    let kind = match input.chars().next() {
        Some('{') => ExprKind::Subtemplate(subtemplate(input)?),
        Some('(') => {
            let name = parenthesized_expression(input)?;
            let args = call_args(input)?;
            ExprKind::IndirectInclude {
                name: Box::new(name),
                args,
            }
        }
        Some(c) if is_ident_start(c) => {
            let name = identifier(input)?;
            if name == "super" && input.starts_with('.') {
                '.'.parse_next(input)?;
                super_include(input)?
            } else {
                let args = call_args(input)?;
                ExprKind::Include {
                    name: name.to_string(),
                    args,
                    is_super: false,
                }
            }
        }
        _ => return fail_with(input, "expected a template to map after ':'"),
    };
    Ok(Expr {
        kind,
        span: Span::new(start, input.len()),
    })
}

fn super_include(input: &mut &str) -> ModalResult<ExprKind> {
    let name = cut_err(identifier)
        .context(StrContext::Expected(StrContextValue::Description("template name")))
        .parse_next(input)?;
    let args = call_args(input)?;
    Ok(ExprKind::Include {
        name: name.to_string(),
        args,
        is_super: true,
    })
}

/// A primary followed by any number of `.name` or `.(expr)` accesses.
fn member(input: &mut &str) -> ModalResult<Expr> {
    let start = input.len();
    let mut expr = primary(input)?;
    while opt('.').parse_next(input)?.is_some() {
        let kind = if input.starts_with('(') {
            let property = parenthesized_expression(input)?;
            ExprKind::DynamicProperty {
                target: Box::new(expr),
                property: Box::new(property),
            }
        } else {
            let name = cut_err(property_name)
                .context(StrContext::Expected(StrContextValue::Description("property name")))
                .parse_next(input)?;
            ExprKind::Property {
                target: Box::new(expr),
                name: name.to_string(),
            }
        };
        expr = Expr {
            kind,
            span: Span::new(start, input.len()),
        };
    }
    Ok(expr)
}

fn primary(input: &mut &str) -> ModalResult<Expr> {
    let start = input.len();
    let kind = match input.chars().next() {
        Some('"') => ExprKind::Str(string_literal(input)?),
        Some('[') => ExprKind::List(list(input)?),
        Some('{') => ExprKind::Subtemplate(subtemplate(input)?),
        Some('(') => {
            let inner = parenthesized_expression(input)?;
            if input.starts_with('(') {
                ExprKind::IndirectInclude {
                    name: Box::new(inner),
                    args: call_args(input)?,
                }
            } else {
                ExprKind::ToStr(Box::new(inner))
            }
        }
        Some(c) if is_ident_start(c) => {
            let name = identifier(input)?;
            if name == "super" && input.starts_with('.') {
                '.'.parse_next(input)?;
                super_include(input)?
            } else if input.starts_with('(') {
                match Builtin::from_name(name) {
                    Some(func) => {
                        '('.parse_next(input)?;
                        ws(input)?;
                        let arg = expression(input)?;
                        ws(input)?;
                        expect(input, ")")?;
                        ExprKind::Builtin {
                            func,
                            arg: Box::new(arg),
                        }
                    }
                    None => ExprKind::Include {
                        name: name.to_string(),
                        args: call_args(input)?,
                        is_super: false,
                    },
                }
            } else if name == "true" {
                ExprKind::Bool(true)
            } else if name == "false" {
                ExprKind::Bool(false)
            } else {
                ExprKind::Attribute(name.to_string())
            }
        }
        _ => return fail_with(input, "expected an expression"),
    };
    Ok(Expr {
        kind,
        span: Span::new(start, input.len()),
    })
}

fn parenthesized_expression(input: &mut &str) -> ModalResult<Expr> {
    '('.parse_next(input)?;
    ws(input)?;
    let expr = expression(input)?;
    ws(input)?;
    expect(input, ")")?;
    Ok(expr)
}

/// `(a, b)` or `(x=a, y=b)`.
fn call_args(input: &mut &str) -> ModalResult<Args> {
    expect(input, "(")?;
    ws(input)?;
    if opt(')').parse_next(input)?.is_some() {
        return Ok(Args::Positional(Vec::new()));
    }
    let args = if starts_named_arg(input) {
        let mut named = Vec::new();
        loop {
            if !starts_named_arg(input) {
                return fail_with(input, "cannot mix named and positional arguments");
            }
            named.push(named_arg(input)?);
            if !next_arg(input)? {
                break;
            }
        }
        Args::Named(named)
    } else {
        let mut positional = Vec::new();
        loop {
            if starts_named_arg(input) {
                return fail_with(input, "cannot mix named and positional arguments");
            }
            positional.push(expression_no_comma(input)?);
            if !next_arg(input)? {
                break;
            }
        }
        Args::Positional(positional)
    };
    ws(input)?;
    expect(input, ")")?;
    Ok(args)
}

/// Consume a separating comma. Returns false at the end of the list.
fn next_arg(input: &mut &str) -> ModalResult<bool> {
    ws(input)?;
    if opt(',').parse_next(input)?.is_none() {
        return Ok(false);
    }
    ws(input)?;
    Ok(true)
}

/// Whether the input starts with `name =` (and not `name ==`).
fn starts_named_arg(input: &str) -> bool {
    let mut probe = input;
    if identifier(&mut probe).is_err() || ws(&mut probe).is_err() {
        return false;
    }
    probe.starts_with('=') && !probe.starts_with("==")
}

fn named_arg(input: &mut &str) -> ModalResult<NamedArg> {
    let start = input.len();
    let name = identifier(input)?;
    let span = Span::new(start, input.len());
    ws(input)?;
    expect(input, "=")?;
    ws(input)?;
    let value = expression_no_comma(input)?;
    Ok(NamedArg {
        name: name.to_string(),
        value,
        span,
    })
}

fn list(input: &mut &str) -> ModalResult<Vec<Expr>> {
    '['.parse_next(input)?;
    ws(input)?;
    let mut items = Vec::new();
    if opt(']').parse_next(input)?.is_some() {
        return Ok(items);
    }
    loop {
        items.push(expression_no_comma(input)?);
        if !next_arg(input)? {
            break;
        }
    }
    ws(input)?;
    expect(input, "]")?;
    Ok(items)
}

/// `{body}` or `{name | body}`.
fn subtemplate(input: &mut &str) -> ModalResult<Subtemplate> {
    '{'.parse_next(input)?;
    let parameter = opt(subtemplate_parameter).parse_next(input)?;
    if parameter.is_some() {
        opt(' ').parse_next(input)?;
    }
    let body = elements(input, true)?;
    expect(input, "}")?;
    Ok(Subtemplate {
        parameter: parameter.map(str::to_string),
        body: Template { elements: body },
    })
}

fn subtemplate_parameter<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    ws(input)?;
    let name = identifier(input)?;
    ws(input)?;
    '|'.parse_next(input)?;
    Ok(name)
}

/// Parse a string literal with `\"`, `\\`, `\n`, `\t` and `\r` escapes.
fn string_literal(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut out = String::new();
    loop {
        let chunk = take_while(0.., |c: char| c != '"' && c != '\\').parse_next(input)?;
        out.push_str(chunk);
        if input.is_empty() {
            return fail_with(input, "unterminated string literal");
        }
        if opt('"').parse_next(input)?.is_some() {
            return Ok(out);
        }
        '\\'.parse_next(input)?;
        match opt(any).parse_next(input)? {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(c @ ('"' | '\\')) => out.push(c),
            Some(c) => {
                out.push('\\');
                out.push(c);
            }
            None => return fail_with(input, "unterminated string literal"),
        }
    }
}

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., char::is_whitespace)
        .void()
        .parse_next(input)
}

fn identifier<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (one_of(is_ident_start), take_while(0.., is_ident_cont))
        .take()
        .parse_next(input)
}

fn property_name<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    let first = input.chars().next();
    if first.is_some_and(|c| c.is_ascii_digit()) {
        take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)
    } else {
        identifier(input)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '/'
}
