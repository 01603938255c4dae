//! Value-construction trees and their evaluator.
//!
//! Attribute values and expression islands (`{{ ... }}`) parse into
//! [`VcmNode`] trees at document-parse time and are evaluated against the
//! current frame every time they are needed. Evaluation is pure with
//! respect to the tree: all state comes from the [`VcmEvalCtx`] the caller
//! supplies.

use crate::document::ContentPart;
use crate::error::{EvalError, ParseError};
use hvml_variant::Variant;

#[derive(Debug, Clone, PartialEq)]
pub enum VcmNode {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    LongInt(i64),
    ULongInt(u64),
    String(Box<str>),
    /// An interpolated string: literal and expression parts concatenated.
    Concat(Vec<VcmNode>),
    Array(Vec<VcmNode>),
    Object(Vec<(String, VcmNode)>),
    /// `$name`
    Variable(Box<str>),
    /// `$?`, `$%`, ... - one of the eight frame symbols.
    Symbol(char),
    /// `base.member`
    GetMember {
        base: Box<VcmNode>,
        member: Box<str>,
    },
    /// `base[index]`
    GetByIndex {
        base: Box<VcmNode>,
        index: Box<VcmNode>,
    },
    /// `base.method(args...)`
    CallMethod {
        base: Box<VcmNode>,
        method: Box<str>,
        args: Vec<VcmNode>,
    },
    /// `name(args...)` - `raise` plus whatever the host context exposes.
    CallFunction {
        name: Box<str>,
        args: Vec<VcmNode>,
    },
    And(Box<VcmNode>, Box<VcmNode>),
    Or(Box<VcmNode>, Box<VcmNode>),
    Neg(Box<VcmNode>),
}

/// Name resolution the evaluator needs from the interpreter.
pub trait VcmEvalCtx {
    /// Resolve `$name` - frame scope chain first, then document built-ins.
    fn resolve_variable(&self, name: &str) -> Option<Variant>;

    /// Resolve one of the eight symbol variables (`?`, `%`, `<`, `@`, `!`,
    /// `^`, `&`, `:`).
    fn resolve_symbol(&self, symbol: char) -> Option<Variant>;

    /// Host functions callable by bare name. `raise` is handled by the
    /// evaluator itself and never reaches this hook.
    fn call_function(&self, _name: &str, _args: &[Variant]) -> Option<Result<Variant, EvalError>> {
        None
    }
}

/// Evaluate `tree` against `ctx`.
///
/// With `silently` set, resolution failures (missing variables, missing
/// keys, kind mismatches) degrade to `undefined`; explicitly raised
/// exceptions still propagate, since `silently` silences errors, not
/// control flow.
pub fn eval_vcm(
    tree: &VcmNode,
    ctx: &dyn VcmEvalCtx,
    silently: bool,
) -> Result<Variant, EvalError> {
    match eval_inner(tree, ctx) {
        Ok(v) => Ok(v),
        Err(err @ EvalError::Exception { .. }) => Err(err),
        Err(err) if silently => {
            log::warn!("silently demoted: {err}");
            Ok(Variant::undefined())
        }
        Err(err) => Err(err),
    }
}

fn eval_inner(tree: &VcmNode, ctx: &dyn VcmEvalCtx) -> Result<Variant, EvalError> {
    match tree {
        VcmNode::Undefined => Ok(Variant::undefined()),
        VcmNode::Null => Ok(Variant::null()),
        VcmNode::Boolean(b) => Ok(Variant::boolean(*b)),
        VcmNode::Number(n) => Ok(Variant::number(*n)),
        VcmNode::LongInt(n) => Ok(Variant::longint(*n)),
        VcmNode::ULongInt(n) => Ok(Variant::ulongint(*n)),
        VcmNode::String(s) => Ok(Variant::string(&**s)),
        VcmNode::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&eval_inner(part, ctx)?.to_string());
            }
            Ok(Variant::string(out))
        }
        VcmNode::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_inner(item, ctx)?);
            }
            Ok(Variant::array(out))
        }
        VcmNode::Object(entries) => {
            let obj = Variant::object();
            for (key, value) in entries {
                let value = eval_inner(value, ctx)?;
                obj.object_set(key.clone(), value)?;
            }
            Ok(obj)
        }
        VcmNode::Variable(name) => ctx
            .resolve_variable(name)
            .ok_or_else(|| EvalError::NoSuchVariable(name.to_string())),
        VcmNode::Symbol(sym) => ctx
            .resolve_symbol(*sym)
            .ok_or_else(|| EvalError::NoSuchVariable(format!("${sym}"))),
        VcmNode::GetMember { base, member } => {
            let base = eval_inner(base, ctx)?;
            get_member(&base, member)
        }
        VcmNode::GetByIndex { base, index } => {
            let base = eval_inner(base, ctx)?;
            let index = eval_inner(index, ctx)?;
            if let Some(key) = index.as_str() {
                return get_member(&base, key);
            }
            let idx = index.coerce_i64()?;
            if idx < 0 {
                return Err(EvalError::NoSuchKey(idx.to_string()));
            }
            base.array_get(idx as usize)
                .ok_or_else(|| EvalError::NoSuchKey(idx.to_string()))
        }
        VcmNode::CallMethod { base, method, args } => {
            let base = eval_inner(base, ctx)?;
            let args = eval_args(args, ctx)?;
            call_member(&base, method, &args)
        }
        VcmNode::CallFunction { name, args } => {
            let args = eval_args(args, ctx)?;
            if &**name == "raise" {
                let atom = args
                    .first()
                    .and_then(|a| a.as_str().map(str::to_owned))
                    .unwrap_or_else(|| String::from("ExternalFailure"));
                return Err(EvalError::Exception {
                    atom,
                    info: args.get(1).map(|a| a.stringify()),
                });
            }
            match ctx.call_function(name, &args) {
                Some(result) => result,
                None => Err(EvalError::NoSuchVariable(name.to_string())),
            }
        }
        VcmNode::And(lhs, rhs) => {
            let lhs = eval_inner(lhs, ctx)?;
            if !lhs.truthy() {
                return Ok(lhs);
            }
            eval_inner(rhs, ctx)
        }
        VcmNode::Or(lhs, rhs) => {
            let lhs = eval_inner(lhs, ctx)?;
            if lhs.truthy() {
                return Ok(lhs);
            }
            eval_inner(rhs, ctx)
        }
        VcmNode::Neg(inner) => {
            let value = eval_inner(inner, ctx)?;
            Ok(Variant::number(-value.coerce_number()?))
        }
    }
}

fn eval_args(args: &[VcmNode], ctx: &dyn VcmEvalCtx) -> Result<Vec<Variant>, EvalError> {
    args.iter().map(|a| eval_inner(a, ctx)).collect()
}

fn get_member(base: &Variant, member: &str) -> Result<Variant, EvalError> {
    if base.is_native() || base.is_dynamic() {
        return Ok(base.invoke_getter(member, &[])?);
    }
    base.object_get(member)
        .or_else(|| base.set_get_by_key(member))
        .ok_or_else(|| EvalError::NoSuchKey(member.to_owned()))
}

fn call_member(base: &Variant, method: &str, args: &[Variant]) -> Result<Variant, EvalError> {
    if base.is_native() || base.is_dynamic() {
        return Ok(base.invoke_getter(method, args)?);
    }
    // objects may hold dynamic members acting as bound methods
    let member = base
        .object_get(method)
        .ok_or_else(|| EvalError::NoSuchKey(method.to_owned()))?;
    if let Some(ops) = member.as_dynamic_ops() {
        return Ok((ops.getter)(args)?);
    }
    if member.is_native() {
        return Ok(member.invoke_getter(method, args)?);
    }
    if args.is_empty() {
        return Ok(member);
    }
    Err(EvalError::Unsupported("call on data member"))
}

// ---------------------------------------------------------------- parsing

struct ExprParser<'a> {
    chars: &'a [char],
    pos: usize,
    base: usize,
}

/// Parse a standalone expression, as found in `{{ ... }}` islands and
/// unquoted attribute values.
pub fn parse_expression(src: &str) -> Result<VcmNode, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut p = ExprParser {
        chars: &chars,
        pos: 0,
        base: 0,
    };
    p.skip_ws();
    let node = p.parse_or()?;
    p.skip_ws();
    if p.pos < p.chars.len() {
        return Err(ParseError::UnexpectedChar {
            at: p.offset(),
            found: p.chars[p.pos],
            expected: "end of expression",
        });
    }
    Ok(node)
}

/// Split text content into literal runs and embedded expressions.
pub(crate) fn parse_content(src: &str) -> Result<Vec<ContentPart>, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '{' && chars.get(i + 1) == Some(&'{') {
            if !literal.is_empty() {
                parts.push(ContentPart::Literal(std::mem::take(&mut literal)));
            }
            let close = find_island_end(&chars, i + 2)
                .ok_or(ParseError::UnexpectedEof(i))?;
            let inner: String = chars[i + 2..close].iter().collect();
            parts.push(ContentPart::Expr(parse_expression(inner.trim())?));
            i = close + 2;
        } else if c == '$' && i + 1 < chars.len() && is_ref_start(chars[i + 1]) {
            if !literal.is_empty() {
                parts.push(ContentPart::Literal(std::mem::take(&mut literal)));
            }
            let mut p = ExprParser {
                chars: &chars,
                pos: i,
                base: 0,
            };
            let node = p.parse_postfix()?;
            parts.push(ContentPart::Expr(node));
            i = p.pos;
        } else {
            literal.push(c);
            i += 1;
        }
    }

    if !literal.is_empty() {
        parts.push(ContentPart::Literal(literal));
    }
    Ok(parts)
}

fn find_island_end(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '}' && chars[i + 1] == '}' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn is_ref_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || "?%<@!^&:".contains(c)
}

impl<'a> ExprParser<'a> {
    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char, expected: &'static str) -> Result<(), ParseError> {
        match self.bump() {
            Some(found) if found == c => Ok(()),
            Some(found) => Err(ParseError::UnexpectedChar {
                at: self.offset() - 1,
                found,
                expected,
            }),
            None => Err(ParseError::UnexpectedEof(self.offset())),
        }
    }

    fn parse_or(&mut self) -> Result<VcmNode, ParseError> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('|') && self.chars.get(self.pos + 1) == Some(&'|') {
                self.pos += 2;
                self.skip_ws();
                let rhs = self.parse_and()?;
                lhs = VcmNode::Or(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_and(&mut self) -> Result<VcmNode, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('&') && self.chars.get(self.pos + 1) == Some(&'&') {
                self.pos += 2;
                self.skip_ws();
                let rhs = self.parse_unary()?;
                lhs = VcmNode::And(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<VcmNode, ParseError> {
        if self.peek() == Some('-')
            && !matches!(self.chars.get(self.pos + 1), Some(c) if c.is_ascii_digit())
        {
            self.pos += 1;
            self.skip_ws();
            let inner = self.parse_postfix()?;
            return Ok(VcmNode::Neg(Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<VcmNode, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            match self.peek() {
                Some('.') if matches!(self.chars.get(self.pos + 1), Some(c) if c.is_ascii_alphabetic() || *c == '_') =>
                {
                    self.pos += 1;
                    let member = self.parse_ident();
                    if self.peek() == Some('(') {
                        let args = self.parse_call_args()?;
                        node = VcmNode::CallMethod {
                            base: Box::new(node),
                            method: member.into(),
                            args,
                        };
                    } else {
                        node = VcmNode::GetMember {
                            base: Box::new(node),
                            member: member.into(),
                        };
                    }
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    let index = self.parse_or()?;
                    self.skip_ws();
                    self.expect(']', "]")?;
                    node = VcmNode::GetByIndex {
                        base: Box::new(node),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<VcmNode, ParseError> {
        match self.peek() {
            None => Err(ParseError::UnexpectedEof(self.offset())),
            Some('$') => {
                self.pos += 1;
                match self.peek() {
                    Some(c) if "?%<@!^&:".contains(c) => {
                        self.pos += 1;
                        Ok(VcmNode::Symbol(c))
                    }
                    Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                        let name = self.parse_ident();
                        Ok(VcmNode::Variable(name.into()))
                    }
                    Some(found) => Err(ParseError::UnexpectedChar {
                        at: self.offset(),
                        found,
                        expected: "variable name or symbol",
                    }),
                    None => Err(ParseError::UnexpectedEof(self.offset())),
                }
            }
            Some('\'') => {
                let text = self.parse_quoted('\'')?;
                Ok(VcmNode::String(text.into()))
            }
            Some('`') => {
                let text = self.parse_quoted('`')?;
                Ok(VcmNode::String(text.into()))
            }
            Some('"') => {
                let text = self.parse_quoted('"')?;
                interpolated_string(&text)
            }
            Some('[') => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_ws();
                    if self.eat(']') {
                        return Ok(VcmNode::Array(items));
                    }
                    items.push(self.parse_or()?);
                    self.skip_ws();
                    if !self.eat(',') {
                        self.expect(']', "] or ,")?;
                        return Ok(VcmNode::Array(items));
                    }
                }
            }
            Some('{') => {
                self.pos += 1;
                let mut entries = Vec::new();
                loop {
                    self.skip_ws();
                    if self.eat('}') {
                        return Ok(VcmNode::Object(entries));
                    }
                    let key = match self.peek() {
                        Some('\'') => self.parse_quoted('\'')?,
                        Some('"') => self.parse_quoted('"')?,
                        _ => self.parse_ident(),
                    };
                    if key.is_empty() {
                        return Err(ParseError::UnexpectedChar {
                            at: self.offset(),
                            found: self.peek().unwrap_or('\0'),
                            expected: "object key",
                        });
                    }
                    self.skip_ws();
                    self.expect(':', ":")?;
                    self.skip_ws();
                    let value = self.parse_or()?;
                    entries.push((key, value));
                    self.skip_ws();
                    if !self.eat(',') {
                        self.expect('}', "} or ,")?;
                        return Ok(VcmNode::Object(entries));
                    }
                }
            }
            Some('(') => {
                self.pos += 1;
                self.skip_ws();
                let node = self.parse_or()?;
                self.skip_ws();
                self.expect(')', ")")?;
                Ok(node)
            }
            Some(c) if c.is_ascii_digit() || c == '-' => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let ident = self.parse_ident();
                match ident.as_str() {
                    "true" => Ok(VcmNode::Boolean(true)),
                    "false" => Ok(VcmNode::Boolean(false)),
                    "null" => Ok(VcmNode::Null),
                    "undefined" => Ok(VcmNode::Undefined),
                    _ if self.peek() == Some('(') => {
                        let args = self.parse_call_args()?;
                        Ok(VcmNode::CallFunction {
                            name: ident.into(),
                            args,
                        })
                    }
                    // a bare word reads as a string, matching lax attribute values
                    _ => Ok(VcmNode::String(ident.into())),
                }
            }
            Some(found) => Err(ParseError::UnexpectedChar {
                at: self.offset(),
                found,
                expected: "expression",
            }),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<VcmNode>, ParseError> {
        self.expect('(', "(")?;
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(')') {
                return Ok(args);
            }
            args.push(self.parse_or()?);
            self.skip_ws();
            if !self.eat(',') {
                self.expect(')', ") or ,")?;
                return Ok(args);
            }
        }
    }

    fn parse_ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String, ParseError> {
        self.expect(quote, "quote")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::UnexpectedEof(self.offset())),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err(ParseError::UnexpectedEof(self.offset())),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_number(&mut self) -> Result<VcmNode, ParseError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !is_float
                && matches!(self.chars.get(self.pos + 1), Some(d) if d.is_ascii_digit())
            {
                is_float = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let digits: String = self.chars[start..self.pos].iter().collect();

        // suffixes: L = longint, UL = ulongint, FL = number
        if self.eat('U') {
            self.expect('L', "L")?;
            return digits
                .parse::<u64>()
                .map(VcmNode::ULongInt)
                .map_err(|_| ParseError::BadNumber(digits));
        }
        if self.eat('L') {
            return digits
                .parse::<i64>()
                .map(VcmNode::LongInt)
                .map_err(|_| ParseError::BadNumber(digits));
        }
        if self.eat('F') {
            self.expect('L', "L")?;
            return digits
                .parse::<f64>()
                .map(VcmNode::Number)
                .map_err(|_| ParseError::BadNumber(digits));
        }

        if is_float {
            digits
                .parse::<f64>()
                .map(VcmNode::Number)
                .map_err(|_| ParseError::BadNumber(digits))
        } else {
            digits
                .parse::<i64>()
                .map(VcmNode::LongInt)
                .map_err(|_| ParseError::BadNumber(digits))
        }
    }
}

/// Double-quoted strings interpolate `$refs`; collapse to a plain literal
/// when there is nothing to interpolate.
pub(crate) fn interpolated_string(text: &str) -> Result<VcmNode, ParseError> {
    let parts = parse_content(text)?;
    if parts.len() == 1 {
        if let ContentPart::Literal(s) = &parts[0] {
            return Ok(VcmNode::String(s.as_str().into()));
        }
    }
    if parts.is_empty() {
        return Ok(VcmNode::String("".into()));
    }
    Ok(VcmNode::Concat(
        parts
            .into_iter()
            .map(|p| match p {
                ContentPart::Literal(s) => VcmNode::String(s.into()),
                ContentPart::Expr(e) => e,
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCtx;
    impl VcmEvalCtx for NoCtx {
        fn resolve_variable(&self, _: &str) -> Option<Variant> {
            None
        }
        fn resolve_symbol(&self, _: char) -> Option<Variant> {
            None
        }
    }

    #[test]
    fn number_suffixes() {
        assert_eq!(parse_expression("3L").unwrap(), VcmNode::LongInt(3));
        assert_eq!(parse_expression("3UL").unwrap(), VcmNode::ULongInt(3));
        assert_eq!(parse_expression("3.5").unwrap(), VcmNode::Number(3.5));
        assert_eq!(parse_expression("7").unwrap(), VcmNode::LongInt(7));
    }

    #[test]
    fn symbol_and_member_chains() {
        let node = parse_expression("$TIMERS").unwrap();
        assert_eq!(node, VcmNode::Variable("TIMERS".into()));

        let node = parse_expression("$%").unwrap();
        assert_eq!(node, VcmNode::Symbol('%'));

        match parse_expression("$L.streq($?, 'ok')").unwrap() {
            VcmNode::CallMethod { method, args, .. } => {
                assert_eq!(&*method, "streq");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn raise_becomes_exception() {
        let node = parse_expression("raise('BadName')").unwrap();
        let err = eval_vcm(&node, &NoCtx, false).unwrap_err();
        assert_eq!(
            err,
            EvalError::Exception {
                atom: "BadName".into(),
                info: None
            }
        );
        // silently does not swallow raised exceptions
        assert!(eval_vcm(&node, &NoCtx, true).is_err());
    }

    #[test]
    fn silently_demotes_missing_variables() {
        let node = parse_expression("$nope").unwrap();
        assert!(eval_vcm(&node, &NoCtx, false).is_err());
        assert!(eval_vcm(&node, &NoCtx, true).unwrap().is_undefined());
    }

    #[test]
    fn content_splits_literals_and_refs() {
        let parts = parse_content("count: $% end").unwrap();
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], ContentPart::Literal(s) if s == "count: "));
        assert!(matches!(&parts[1], ContentPart::Expr(VcmNode::Symbol('%'))));
        assert!(matches!(&parts[2], ContentPart::Literal(s) if s == " end"));
    }

    #[test]
    fn island_content() {
        let parts = parse_content("{{ raise('BadName') }}").unwrap();
        assert_eq!(parts.len(), 1);
        assert!(matches!(&parts[0], ContentPart::Expr(VcmNode::CallFunction { .. })));
    }
}
