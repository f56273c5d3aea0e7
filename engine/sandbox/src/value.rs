//! Runtime values.
//!
//! Values borrow function bodies from the compiled program (`'a`), so they
//! live only for the duration of one invocation and never cross threads.
//! Every aggregate records its nesting depth at construction time.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::ast::Expr;
use crate::builtins::Builtin;

/// Largest magnitude emitted as a JSON integer.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

pub(crate) type Env<'a> = Option<Rc<Frame<'a>>>;

#[derive(Debug)]
pub(crate) struct Frame<'a> {
    pub name: &'a str,
    pub value: Value<'a>,
    pub parent: Env<'a>,
    pub depth: usize,
}

pub(crate) fn bind<'a>(parent: &Env<'a>, name: &'a str, value: Value<'a>) -> Env<'a> {
    let depth = 1 + value.depth().max(env_depth(parent));
    Some(Rc::new(Frame {
        name,
        value,
        parent: parent.clone(),
        depth,
    }))
}

pub(crate) fn env_depth(env: &Env) -> usize {
    env.as_ref().map_or(0, |f| f.depth)
}

pub(crate) fn lookup<'a>(env: &Env<'a>, name: &str) -> Option<Value<'a>> {
    let mut cursor = env.as_ref();
    while let Some(frame) = cursor {
        if frame.name == name {
            return Some(frame.value.clone());
        }
        cursor = frame.parent.as_ref();
    }
    None
}

#[derive(Debug)]
pub(crate) struct Closure<'a> {
    pub name: Option<&'a str>,
    pub params: &'a [String],
    pub body: &'a Expr,
    pub env: Env<'a>,
    pub depth: usize,
}

#[derive(Debug)]
pub(crate) struct ListVal<'a> {
    pub items: Vec<Value<'a>>,
    pub depth: usize,
}

#[derive(Debug)]
pub(crate) struct MapVal<'a> {
    pub entries: BTreeMap<String, Value<'a>>,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum Value<'a> {
    Null,
    Root,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    List(Rc<ListVal<'a>>),
    Map(Rc<MapVal<'a>>),
    Closure(Rc<Closure<'a>>),
    Builtin(Builtin),
}

impl<'a> Value<'a> {
    pub fn list(items: Vec<Value<'a>>) -> Self {
        let depth = 1 + items.iter().map(Value::depth).max().unwrap_or(0);
        Value::List(Rc::new(ListVal { items, depth }))
    }

    pub fn map(entries: BTreeMap<String, Value<'a>>) -> Self {
        let depth = 1 + entries.values().map(Value::depth).max().unwrap_or(0);
        Value::Map(Rc::new(MapVal { entries, depth }))
    }

    pub fn closure(
        name: Option<&'a str>,
        params: &'a [String],
        body: &'a Expr,
        env: Env<'a>,
    ) -> Self {
        let depth = 1 + env_depth(&env);
        Value::Closure(Rc::new(Closure {
            name,
            params,
            body,
            env,
            depth,
        }))
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn depth(&self) -> usize {
        match self {
            Value::List(l) => l.depth,
            Value::Map(m) => m.depth,
            Value::Closure(c) => c.depth,
            _ => 0,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Root => "root",
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Closure(_) | Value::Builtin(_) => "function",
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    /// Rough heap footprint in memory cells.
    pub fn cells(&self) -> usize {
        match self {
            Value::Str(s) => 1 + s.len() / 8,
            Value::List(l) => 1 + l.items.len(),
            Value::Map(m) => 1 + 2 * m.entries.len(),
            _ => 1,
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON for storage in the tree.
    pub fn to_json(&self) -> Result<serde_json::Value, String> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Num(n) => number_to_json(*n)?,
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::List(l) => serde_json::Value::Array(
                l.items.iter().map(Value::to_json).collect::<Result<_, _>>()?,
            ),
            Value::Map(m) => serde_json::Value::Object(
                m.entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_, String>>()?,
            ),
            Value::Root => return Err("the root sentinel cannot be stored in a state".into()),
            Value::Closure(_) | Value::Builtin(_) => {
                return Err("functions cannot be stored in a state".into())
            }
        })
    }

    /// Text form used by `str()`; strings at top level are unquoted.
    pub fn display(&self) -> String {
        let mut out = String::new();
        match self {
            Value::Str(s) => out.push_str(s),
            other => other.render(&mut out),
        }
        out
    }

    fn render(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Root => out.push_str("root"),
            Value::Bool(b) => {
                let _ = write!(out, "{}", b);
            }
            Value::Num(n) => out.push_str(&format_number(*n)),
            Value::Str(s) => {
                let _ = write!(out, "{:?}", s);
            }
            Value::List(l) => {
                out.push('[');
                for (i, item) in l.items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.render(out);
                }
                out.push(']');
            }
            Value::Map(m) => {
                out.push('{');
                for (i, (k, v)) in m.entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{:?}: ", k);
                    v.render(out);
                }
                out.push('}');
            }
            Value::Closure(c) => {
                let _ = write!(out, "<fn {}>", c.name.unwrap_or("lambda"));
            }
            Value::Builtin(b) => {
                let _ = write!(out, "<builtin {}>", b.name());
            }
        }
    }

    /// Structural equality. Functions never compare equal.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Root, Value::Root) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.items.len() == b.items.len()
                    && a.items.iter().zip(&b.items).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.entries.len() == b.entries.len()
                    && a
                        .entries
                        .iter()
                        .zip(&b.entries)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
            }
            _ => false,
        }
    }

    /// Ordering for numbers, strings and lists of those. `None` when the
    /// operands are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.items.iter().zip(&b.items) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.items.len().cmp(&b.items.len()))
            }
            _ => None,
        }
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn number_to_json(n: f64) -> Result<serde_json::Value, String> {
    if !n.is_finite() {
        return Err(format!("state contains a non-finite number ({})", n));
    }
    if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        return Ok(serde_json::Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .ok_or_else(|| format!("state contains a non-finite number ({})", n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_keeps_integers() {
        let json = json!({"board": [1, 2.5, "x"], "done": false, "next": null});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_root_and_functions_are_not_states() {
        assert!(Value::Root.to_json().is_err());
        assert!(Value::Builtin(Builtin::Len).to_json().is_err());
        assert!(Value::list(vec![Value::Num(f64::NAN)]).to_json().is_err());
    }

    #[test]
    fn test_depth_tracking() {
        let inner = Value::list(vec![Value::Num(1.0)]);
        let outer = Value::list(vec![inner.clone(), Value::Null]);
        assert_eq!(inner.depth(), 1);
        assert_eq!(outer.depth(), 2);
        let env = bind(&None, "x", outer);
        assert_eq!(env_depth(&env), 3);
    }

    #[test]
    fn test_equality_and_ordering() {
        let a = Value::list(vec![Value::Num(1.0), Value::str("b")]);
        let b = Value::list(vec![Value::Num(1.0), Value::str("c")]);
        assert!(a.equals(&a.clone()));
        assert!(!a.equals(&b));
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(Value::Num(1.0).compare(&Value::str("a")), None);
    }

    #[test]
    fn test_display() {
        let v = Value::list(vec![Value::Num(2.0), Value::Num(0.5), Value::str("s")]);
        assert_eq!(v.display(), r#"[2, 0.5, "s"]"#);
        assert_eq!(Value::str("plain").display(), "plain");
    }
}
