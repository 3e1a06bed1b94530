//! Template syntax: lexing and parsing into a node tree.
//!
//! Supported constructs:
//! - `{{ expr }}` output
//! - `{% for x in expr %}...{% endfor %}`
//! - `{% if cond %}...{% else %}...{% endif %}`
//! - `{# comment #}`
//!
//! A single newline directly after `%}` or `#}` is dropped.

use serde_json::{Number, Value};

use super::RenderError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Output(Expr),
    For {
        var: String,
        iterable: Expr,
        body: Vec<Node>,
    },
    If {
        cond: Cond,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Path(Vec<String>),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilterKind {
    Length,
    Default,
    Join,
    Where,
    Upper,
    Lower,
}

impl FilterKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "length" | "count" => Some(FilterKind::Length),
            "default" => Some(FilterKind::Default),
            "join" => Some(FilterKind::Join),
            "where" | "selectattr" => Some(FilterKind::Where),
            "upper" => Some(FilterKind::Upper),
            "lower" => Some(FilterKind::Lower),
            _ => None,
        }
    }

    fn arity(&self) -> std::ops::RangeInclusive<usize> {
        match self {
            FilterKind::Length | FilterKind::Upper | FilterKind::Lower => 0..=0,
            FilterKind::Default => 1..=1,
            FilterKind::Join => 0..=1,
            FilterKind::Where => 1..=2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Filter {
    pub kind: FilterKind,
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Expr {
    pub base: Operand,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cond {
    Truthy(Expr),
    Not(Box<Cond>),
    Compare(Expr, CompareOp, Expr),
}

// =============================================================================
// Segments
// =============================================================================

enum Segment<'a> {
    Text(&'a str),
    Output(&'a str, usize),
    Tag(&'a str, usize),
}

fn line_at(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

fn segments(source: &str) -> Result<Vec<Segment<'_>>, RenderError> {
    let mut out = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let next_open = ["{{", "{%", "{#"]
            .iter()
            .filter_map(|open| rest.find(open).map(|i| (i, *open)))
            .min_by_key(|(i, _)| *i);

        let Some((offset, open)) = next_open else {
            out.push(Segment::Text(rest));
            break;
        };
        if offset > 0 {
            out.push(Segment::Text(&rest[..offset]));
        }

        let start = pos + offset;
        let close = match open {
            "{{" => "}}",
            "{%" => "%}",
            _ => "#}",
        };
        let inner_start = start + 2;
        let Some(len) = source[inner_start..].find(close) else {
            return Err(RenderError::syntax(
                line_at(source, start),
                format!("unclosed '{}'", open),
            ));
        };
        let inner = source[inner_start..inner_start + len].trim();
        let line = line_at(source, start);
        pos = inner_start + len + 2;

        match open {
            "{{" => out.push(Segment::Output(inner, line)),
            "{%" => out.push(Segment::Tag(inner, line)),
            _ => {}
        }

        if open != "{{" {
            if source[pos..].starts_with("\r\n") {
                pos += 2;
            } else if source[pos..].starts_with('\n') {
                pos += 1;
            }
        }
    }

    Ok(out)
}

// =============================================================================
// Expression tokens
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Num(Number),
    Dot,
    Pipe,
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
}

fn tokenize(src: &str, line: usize) -> Result<Vec<Tok>, RenderError> {
    let chars: Vec<char> = src.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                toks.push(Tok::Dot);
                i += 1;
            }
            '|' => {
                toks.push(Tok::Pipe);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::EqEq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::NotEq);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(RenderError::syntax(line, "unterminated string literal"));
                        }
                        Some('\\') if chars.get(i + 1).is_some() => {
                            s.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                toks.push(Tok::Str(s));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(|d| d.is_ascii_digit()) {
                    i += 1;
                }
                // Path indices (`items.0.id`) are integers only.
                let after_dot = matches!(toks.last(), Some(Tok::Dot));
                if !after_dot
                    && chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())
                {
                    i += 1;
                    while chars.get(i).is_some_and(|d| d.is_ascii_digit()) {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<i64>()
                    .ok()
                    .map(Number::from)
                    .or_else(|| text.parse::<f64>().ok().and_then(Number::from_f64))
                    .ok_or_else(|| RenderError::syntax(line, format!("bad number '{}'", text)))?;
                toks.push(Tok::Num(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|d| d.is_alphanumeric() || *d == '_')
                {
                    i += 1;
                }
                toks.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(RenderError::syntax(
                    line,
                    format!("unexpected character '{}'", other),
                ));
            }
        }
    }

    Ok(toks)
}

// =============================================================================
// Expression parser
// =============================================================================

struct ExprParser {
    toks: Vec<Tok>,
    pos: usize,
    line: usize,
}

impl ExprParser {
    fn new(src: &str, line: usize) -> Result<Self, RenderError> {
        Ok(Self {
            toks: tokenize(src, line)?,
            pos: 0,
            line,
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(w)) if w == word)
    }

    fn error(&self, message: impl Into<String>) -> RenderError {
        RenderError::syntax(self.line, message)
    }

    fn finish(&self) -> Result<(), RenderError> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(self.error(format!("unexpected trailing token {:?}", tok))),
        }
    }

    fn operand(&mut self) -> Result<Operand, RenderError> {
        match self.next() {
            Some(Tok::Str(s)) => Ok(Operand::Literal(Value::String(s))),
            Some(Tok::Num(n)) => Ok(Operand::Literal(Value::Number(n))),
            Some(Tok::Ident(word)) => match word.as_str() {
                "true" => Ok(Operand::Literal(Value::Bool(true))),
                "false" => Ok(Operand::Literal(Value::Bool(false))),
                "none" | "null" => Ok(Operand::Literal(Value::Null)),
                "in" | "not" => Err(self.error(format!("unexpected keyword '{}'", word))),
                _ => {
                    let mut path = vec![word];
                    while self.peek() == Some(&Tok::Dot) {
                        self.pos += 1;
                        match self.next() {
                            Some(Tok::Ident(seg)) => path.push(seg),
                            Some(Tok::Num(n)) if n.is_u64() => path.push(n.to_string()),
                            _ => return Err(self.error("expected field name after '.'")),
                        }
                    }
                    Ok(Operand::Path(path))
                }
            },
            Some(tok) => Err(self.error(format!("unexpected token {:?}", tok))),
            None => Err(self.error("expected an expression")),
        }
    }

    fn expr(&mut self) -> Result<Expr, RenderError> {
        let base = self.operand()?;
        let mut filters = Vec::new();

        while self.peek() == Some(&Tok::Pipe) {
            self.pos += 1;
            let name = match self.next() {
                Some(Tok::Ident(name)) => name,
                _ => return Err(self.error("expected filter name after '|'")),
            };
            let kind = FilterKind::parse(&name)
                .ok_or_else(|| self.error(format!("unknown filter '{}'", name)))?;

            let mut args = Vec::new();
            if self.peek() == Some(&Tok::LParen) {
                self.pos += 1;
                if self.peek() != Some(&Tok::RParen) {
                    loop {
                        args.push(self.operand()?);
                        match self.next() {
                            Some(Tok::Comma) => continue,
                            Some(Tok::RParen) => break,
                            _ => return Err(self.error("expected ',' or ')' in filter arguments")),
                        }
                    }
                } else {
                    self.pos += 1;
                }
            }

            if !kind.arity().contains(&args.len()) {
                return Err(self.error(format!(
                    "filter '{}' takes {:?} argument(s), got {}",
                    name,
                    kind.arity(),
                    args.len()
                )));
            }
            filters.push(Filter { kind, args });
        }

        Ok(Expr { base, filters })
    }

    fn cond(&mut self) -> Result<Cond, RenderError> {
        if self.is_keyword("not") {
            self.pos += 1;
            return Ok(Cond::Not(Box::new(self.cond()?)));
        }

        let left = self.expr()?;
        let op = match self.peek().cloned() {
            Some(Tok::EqEq) => Some(CompareOp::Eq),
            Some(Tok::NotEq) => Some(CompareOp::Ne),
            Some(Tok::Ident(w)) if w == "in" => Some(CompareOp::In),
            Some(Tok::Ident(w)) if w == "not" => {
                let followed_by_in =
                    matches!(self.toks.get(self.pos + 1), Some(Tok::Ident(w)) if w == "in");
                if !followed_by_in {
                    return Err(self.error("expected 'in' after 'not'"));
                }
                self.pos += 1;
                Some(CompareOp::NotIn)
            }
            _ => None,
        };

        match op {
            None => Ok(Cond::Truthy(left)),
            Some(op) => {
                self.pos += 1;
                let right = self.expr()?;
                Ok(Cond::Compare(left, op, right))
            }
        }
    }
}

pub(crate) fn parse_expr(src: &str, line: usize) -> Result<Expr, RenderError> {
    let mut parser = ExprParser::new(src, line)?;
    let expr = parser.expr()?;
    parser.finish()?;
    Ok(expr)
}

fn parse_cond(src: &str, line: usize) -> Result<Cond, RenderError> {
    let mut parser = ExprParser::new(src, line)?;
    let cond = parser.cond()?;
    parser.finish()?;
    Ok(cond)
}

// =============================================================================
// Block structure
// =============================================================================

enum Frame {
    For {
        var: String,
        iterable: Expr,
        line: usize,
    },
    If {
        cond: Cond,
        then: Option<Vec<Node>>,
        line: usize,
    },
}

/// Parse template source into nodes.
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, RenderError> {
    let mut stack: Vec<(Frame, Vec<Node>)> = Vec::new();
    let mut current: Vec<Node> = Vec::new();

    for segment in segments(source)? {
        match segment {
            Segment::Text(text) => current.push(Node::Text(text.to_string())),
            Segment::Output(src, line) => current.push(Node::Output(parse_expr(src, line)?)),
            Segment::Tag(src, line) => {
                let (keyword, rest) = src.split_once(char::is_whitespace).unwrap_or((src, ""));
                let rest = rest.trim();
                match keyword {
                    "for" => {
                        let (var, iterable) = rest
                            .split_once(" in ")
                            .ok_or_else(|| RenderError::syntax(line, "expected 'for <name> in <expr>'"))?;
                        let var = var.trim();
                        if var.is_empty()
                            || !var.chars().all(|c| c.is_alphanumeric() || c == '_')
                        {
                            return Err(RenderError::syntax(
                                line,
                                format!("invalid loop variable '{}'", var),
                            ));
                        }
                        let frame = Frame::For {
                            var: var.to_string(),
                            iterable: parse_expr(iterable, line)?,
                            line,
                        };
                        stack.push((frame, std::mem::take(&mut current)));
                    }
                    "if" => {
                        let frame = Frame::If {
                            cond: parse_cond(rest, line)?,
                            then: None,
                            line,
                        };
                        stack.push((frame, std::mem::take(&mut current)));
                    }
                    "else" => match stack.last_mut() {
                        Some((Frame::If { then, .. }, _)) if then.is_none() => {
                            *then = Some(std::mem::take(&mut current));
                        }
                        _ => return Err(RenderError::syntax(line, "'else' outside of 'if'")),
                    },
                    "endfor" => match stack.pop() {
                        Some((Frame::For { var, iterable, .. }, parent)) => {
                            let body = std::mem::replace(&mut current, parent);
                            current.push(Node::For {
                                var,
                                iterable,
                                body,
                            });
                        }
                        _ => return Err(RenderError::syntax(line, "'endfor' without 'for'")),
                    },
                    "endif" => match stack.pop() {
                        Some((Frame::If { cond, then, .. }, parent)) => {
                            let block = std::mem::replace(&mut current, parent);
                            let (then, otherwise) = match then {
                                Some(then) => (then, block),
                                None => (block, Vec::new()),
                            };
                            current.push(Node::If {
                                cond,
                                then,
                                otherwise,
                            });
                        }
                        _ => return Err(RenderError::syntax(line, "'endif' without 'if'")),
                    },
                    other => {
                        return Err(RenderError::syntax(
                            line,
                            format!("unknown tag '{}'", other),
                        ));
                    }
                }
            }
        }
    }

    if let Some((frame, _)) = stack.last() {
        let (tag, line) = match frame {
            Frame::For { line, .. } => ("for", *line),
            Frame::If { line, .. } => ("if", *line),
        };
        return Err(RenderError::syntax(line, format!("unclosed '{}' block", tag)));
    }

    Ok(current)
}
