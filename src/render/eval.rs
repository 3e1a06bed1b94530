//! Evaluation of parsed template nodes against a JSON context.

use serde_json::{Map, Value};

use super::syntax::{CompareOp, Cond, Expr, Filter, FilterKind, Node, Operand};

struct Scope<'a> {
    root: &'a Value,
    locals: Vec<(String, Value)>,
}

impl Scope<'_> {
    fn lookup(&self, path: &[String]) -> Value {
        let Some((head, tail)) = path.split_first() else {
            return Value::Null;
        };
        let start = self
            .locals
            .iter()
            .rev()
            .find(|(name, _)| name == head)
            .map(|(_, value)| value)
            .or_else(|| self.root.get(head.as_str()));

        match start {
            Some(value) => walk(value, tail).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    fn operand(&self, operand: &Operand) -> Value {
        match operand {
            Operand::Path(path) => self.lookup(path),
            Operand::Literal(value) => value.clone(),
        }
    }

    fn expr(&self, expr: &Expr) -> Value {
        expr.filters
            .iter()
            .fold(self.operand(&expr.base), |value, filter| {
                self.filter(value, filter)
            })
    }

    fn filter(&self, value: Value, filter: &Filter) -> Value {
        let args: Vec<Value> = filter.args.iter().map(|a| self.operand(a)).collect();
        match filter.kind {
            FilterKind::Length => Value::from(match &value {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(s) => s.chars().count(),
                _ => 0,
            }),
            FilterKind::Default => {
                if value.is_null() || value == Value::String(String::new()) {
                    args.into_iter().next().unwrap_or(Value::Null)
                } else {
                    value
                }
            }
            FilterKind::Join => {
                let sep = args.first().map(stringify).unwrap_or_default();
                match value {
                    Value::Array(items) => {
                        Value::String(items.iter().map(stringify).collect::<Vec<_>>().join(&sep))
                    }
                    other => other,
                }
            }
            FilterKind::Where => {
                let field = args.first().map(stringify).unwrap_or_default();
                let segments: Vec<String> = field.split('.').map(str::to_string).collect();
                let wanted = args.get(1);
                match value {
                    Value::Array(items) => Value::Array(
                        items
                            .into_iter()
                            .filter(|item| {
                                let found = walk(item, &segments).unwrap_or(&Value::Null);
                                match wanted {
                                    Some(wanted) => loosely_equal(found, wanted),
                                    None => truthy(found),
                                }
                            })
                            .collect(),
                    ),
                    _ => Value::Array(Vec::new()),
                }
            }
            FilterKind::Upper => Value::String(stringify(&value).to_uppercase()),
            FilterKind::Lower => Value::String(stringify(&value).to_lowercase()),
        }
    }

    fn cond(&self, cond: &Cond) -> bool {
        match cond {
            Cond::Truthy(expr) => truthy(&self.expr(expr)),
            Cond::Not(inner) => !self.cond(inner),
            Cond::Compare(left, op, right) => {
                let left = self.expr(left);
                let right = self.expr(right);
                match op {
                    CompareOp::Eq => loosely_equal(&left, &right),
                    CompareOp::Ne => !loosely_equal(&left, &right),
                    CompareOp::In => contains(&right, &left),
                    CompareOp::NotIn => !contains(&right, &left),
                }
            }
        }
    }

    fn render(&mut self, nodes: &[Node], out: &mut String) {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => out.push_str(&stringify(&self.expr(expr))),
                Node::For {
                    var,
                    iterable,
                    body,
                } => {
                    let Value::Array(items) = self.expr(iterable) else {
                        continue;
                    };
                    let total = items.len();
                    for (index, item) in items.into_iter().enumerate() {
                        let mut info = Map::new();
                        info.insert("index".to_string(), Value::from(index + 1));
                        info.insert("index0".to_string(), Value::from(index));
                        info.insert("first".to_string(), Value::Bool(index == 0));
                        info.insert("last".to_string(), Value::Bool(index + 1 == total));
                        info.insert("length".to_string(), Value::from(total));

                        self.locals.push(("loop".to_string(), Value::Object(info)));
                        self.locals.push((var.clone(), item));
                        self.render(body, out);
                        self.locals.truncate(self.locals.len() - 2);
                    }
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.cond(cond) {
                        self.render(then, out);
                    } else {
                        self.render(otherwise, out);
                    }
                }
            }
        }
    }
}

fn walk<'v>(value: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::String(s) => s.contains(&stringify(needle)),
        Value::Object(map) => map.contains_key(&stringify(needle)),
        _ => false,
    }
}

/// Text form of a value as it appears in rendered output.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn render_nodes(nodes: &[Node], data: &Value) -> String {
    let mut scope = Scope {
        root: data,
        locals: Vec::new(),
    };
    let mut out = String::new();
    scope.render(nodes, &mut out);
    out
}
