//! Tree-walking evaluator.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::trace;

use crate::ast::{BinaryOp, Expr, ExprKind, Item, Program, Span, TypeTag, UnaryOp};
use crate::builtins::{Builtin, CONSTANTS};
use crate::limits::{Budget, Eval, Fault, Limits};
use crate::value::{bind, lookup, Env, Value};

/// Names tried, in order, when a script has no trailing expression.
pub const ENTRY_NAMES: &[&str] = &["generate", "generate_fn"];

pub(crate) fn truthy(value: Value, span: Span) -> Eval<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(Fault::runtime(
            format!("condition must be a bool, got {}", other.type_name()),
            span,
        )),
    }
}

pub(crate) struct Interp<'a> {
    program: &'a Program,
    globals: HashMap<&'a str, Value<'a>>,
    pub(crate) budget: Budget,
    pub(crate) rng: ChaCha20Rng,
}

impl<'a> Interp<'a> {
    pub(crate) fn new(program: &'a Program, limits: &Limits, seed: u64) -> Self {
        Self {
            program,
            globals: HashMap::new(),
            budget: Budget::new(limits),
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Bind top-level items, resolve the entry point and apply it to `state`.
    pub(crate) fn run(&mut self, state: Value<'a>) -> Eval<Value<'a>> {
        let program = self.program;
        for item in &program.items {
            if let Item::Fn {
                name, params, body, ..
            } = item
            {
                let f = Value::closure(Some(name.as_str()), params, body, None);
                self.globals.insert(name.as_str(), f);
            }
        }
        for item in &program.items {
            if let Item::Let { name, value, .. } = item {
                let v = self.eval(value, &None)?;
                self.globals.insert(name.as_str(), v);
            }
        }

        let (entry, span) = match &program.entry {
            Some(expr) => (self.eval(expr, &None)?, expr.span),
            None => {
                let named = ENTRY_NAMES
                    .iter()
                    .find_map(|n| self.globals.get(n).cloned().map(|v| (v, *n)));
                let span = program
                    .items
                    .iter()
                    .find(|i| named.as_ref().is_some_and(|(_, n)| i.name() == *n))
                    .map(Item::span)
                    .unwrap_or_default();
                match named {
                    Some((v, _)) => (v, span),
                    None => {
                        return Err(Fault::runtime("script defines no entry function", span));
                    }
                }
            }
        };
        if !entry.is_function() {
            return Err(Fault::runtime(
                format!(
                    "entry expression must evaluate to a function, got {}",
                    entry.type_name()
                ),
                span,
            ));
        }
        trace!(
            instructions = self.budget.instructions_used(),
            "entry resolved"
        );
        self.apply(&entry, vec![state], span)
    }

    pub(crate) fn apply(
        &mut self,
        f: &Value<'a>,
        args: Vec<Value<'a>>,
        span: Span,
    ) -> Eval<Value<'a>> {
        match f {
            Value::Closure(closure) => {
                if closure.params.len() != args.len() {
                    return Err(Fault::runtime(
                        format!(
                            "{} expects {} argument(s), got {}",
                            closure
                                .name
                                .map_or_else(|| "lambda".to_string(), |n| format!("'{}'", n)),
                            closure.params.len(),
                            args.len()
                        ),
                        span,
                    ));
                }
                let mut env = closure.env.clone();
                for (param, arg) in closure.params.iter().zip(args) {
                    env = bind(&env, param, arg);
                }
                self.eval(closure.body, &env)
            }
            Value::Builtin(builtin) => {
                self.budget.tick()?;
                self.budget.enter()?;
                let result = self.call_builtin(*builtin, args, span);
                self.budget.leave();
                result
            }
            other => Err(Fault::runtime(
                format!("cannot call a {}", other.type_name()),
                span,
            )),
        }
    }

    fn resolve(&self, name: &str, env: &Env<'a>, span: Span) -> Eval<Value<'a>> {
        if let Some(v) = lookup(env, name) {
            return Ok(v);
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        if let Some((_, c)) = CONSTANTS.iter().find(|(n, _)| *n == name) {
            return Ok(Value::Num(*c));
        }
        if let Some(b) = Builtin::lookup(name) {
            return Ok(Value::Builtin(b));
        }
        Err(Fault::runtime(format!("'{}' is not defined yet", name), span))
    }

    pub(crate) fn eval(&mut self, expr: &'a Expr, env: &Env<'a>) -> Eval<Value<'a>> {
        self.budget.tick()?;
        self.budget.enter()?;
        let result = self.eval_inner(expr, env);
        self.budget.leave();
        result
    }

    fn eval_inner(&mut self, expr: &'a Expr, env: &Env<'a>) -> Eval<Value<'a>> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Root => Ok(Value::Root),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Num(n) => Ok(Value::Num(*n)),
            ExprKind::Str(s) => {
                let v = Value::str(s);
                self.budget.alloc(v.cells())?;
                Ok(v)
            }
            ExprKind::Var(name) => self.resolve(name, env, span),
            ExprKind::List(items) => {
                self.budget.alloc(items.len() + 1)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, env)?);
                }
                let v = Value::list(out);
                self.budget.check_value_depth(v.depth())?;
                Ok(v)
            }
            ExprKind::Map(entries) => {
                self.budget.alloc(2 * entries.len() + 1)?;
                let mut out = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    out.insert(key.clone(), self.eval(value, env)?);
                }
                let v = Value::map(out);
                self.budget.check_value_depth(v.depth())?;
                Ok(v)
            }
            ExprKind::Lambda { params, body } => {
                self.budget.alloc(1)?;
                let v = Value::closure(None, params, body, env.clone());
                self.budget.check_value_depth(v.depth())?;
                Ok(v)
            }
            ExprKind::Let { name, value, body } => {
                let v = self.eval(value, env)?;
                let inner = bind(env, name, v);
                self.budget.alloc(1)?;
                self.budget
                    .check_value_depth(crate::value::env_depth(&inner))?;
                self.eval(body, &inner)
            }
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                if truthy(self.eval(cond, env)?, cond.span)? {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            ExprKind::Unary { op, expr: operand } => {
                let v = self.eval(operand, env)?;
                match (op, v) {
                    (UnaryOp::Neg, Value::Num(n)) => Ok(Value::Num(-n)),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, other) => Err(Fault::runtime(
                        format!("cannot negate a {}", other.type_name()),
                        span,
                    )),
                    (UnaryOp::Not, other) => Err(Fault::runtime(
                        format!("'not' expects a bool, got {}", other.type_name()),
                        span,
                    )),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let a = self.eval(lhs, env)?;
                let b = self.eval(rhs, env)?;
                self.binary(*op, a, b, span)
            }
            ExprKind::And(lhs, rhs) => {
                if truthy(self.eval(lhs, env)?, lhs.span)? {
                    Ok(Value::Bool(truthy(self.eval(rhs, env)?, rhs.span)?))
                } else {
                    Ok(Value::Bool(false))
                }
            }
            ExprKind::Or(lhs, rhs) => {
                if truthy(self.eval(lhs, env)?, lhs.span)? {
                    Ok(Value::Bool(true))
                } else {
                    Ok(Value::Bool(truthy(self.eval(rhs, env)?, rhs.span)?))
                }
            }
            ExprKind::Is {
                expr: operand,
                tag,
                negated,
            } => {
                let v = self.eval(operand, env)?;
                let matches = match tag {
                    TypeTag::Root => matches!(v, Value::Root),
                    TypeTag::Null => matches!(v, Value::Null),
                    TypeTag::Number => matches!(v, Value::Num(_)),
                    TypeTag::String => matches!(v, Value::Str(_)),
                    TypeTag::Bool => matches!(v, Value::Bool(_)),
                    TypeTag::List => matches!(v, Value::List(_)),
                    TypeTag::Map => matches!(v, Value::Map(_)),
                    TypeTag::Function => v.is_function(),
                };
                Ok(Value::Bool(matches != *negated))
            }
            ExprKind::Call { callee, args } => {
                let f = self.eval(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                self.apply(&f, values, span)
            }
            ExprKind::Index { target, index } => {
                let container = self.eval(target, env)?;
                let key = self.eval(index, env)?;
                index_value(&container, &key, span)
            }
            ExprKind::Field { target, name } => match self.eval(target, env)? {
                Value::Map(m) => m.entries.get(name).cloned().ok_or_else(|| {
                    Fault::runtime(format!("map has no key '{}'", name), span)
                }),
                other => Err(Fault::runtime(
                    format!("cannot read field '{}' of a {}", name, other.type_name()),
                    span,
                )),
            },
        }
    }

    fn binary(&mut self, op: BinaryOp, a: Value<'a>, b: Value<'a>, span: Span) -> Eval<Value<'a>> {
        use std::cmp::Ordering;

        match op {
            BinaryOp::Eq => return Ok(Value::Bool(a.equals(&b))),
            BinaryOp::Ne => return Ok(Value::Bool(!a.equals(&b))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ord = a.compare(&b).ok_or_else(|| {
                    Fault::runtime(
                        format!(
                            "cannot compare {} with {}",
                            a.type_name(),
                            b.type_name()
                        ),
                        span,
                    )
                })?;
                let result = match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                return Ok(Value::Bool(result));
            }
            BinaryOp::Add if !matches!((&a, &b), (Value::Num(_), Value::Num(_))) => {
                return self.concat(&a, &b, span);
            }
            _ => {}
        }

        let (x, y) = match (&a, &b) {
            (Value::Num(x), Value::Num(y)) => (*x, *y),
            _ => {
                return Err(Fault::runtime(
                    format!(
                        "unsupported operands for '{}': {} and {}",
                        op.symbol(),
                        a.type_name(),
                        b.type_name()
                    ),
                    span,
                ))
            }
        };
        let n = match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div | BinaryOp::Rem if y == 0.0 => {
                return Err(Fault::runtime("division by zero", span));
            }
            BinaryOp::Div => x / y,
            // Result takes the sign of the divisor
            _ => x - y * (x / y).floor(),
        };
        Ok(Value::Num(n))
    }
}

fn index_value<'a>(container: &Value<'a>, key: &Value<'a>, span: Span) -> Eval<Value<'a>> {
    match (container, key) {
        (Value::List(l), Value::Num(n)) => {
            let i = list_index(*n, l.items.len(), span)?;
            Ok(l.items[i].clone())
        }
        (Value::Str(s), Value::Num(n)) => {
            let len = s.chars().count();
            let i = list_index(*n, len, span)?;
            let c: String = s.chars().skip(i).take(1).collect();
            Ok(Value::str(&c))
        }
        (Value::Map(m), Value::Str(k)) => m
            .entries
            .get(&**k)
            .cloned()
            .ok_or_else(|| Fault::runtime(format!("map has no key '{}'", k), span)),
        (c, k) => Err(Fault::runtime(
            format!("cannot index a {} with a {}", c.type_name(), k.type_name()),
            span,
        )),
    }
}

fn list_index(n: f64, len: usize, span: Span) -> Eval<usize> {
    if n.fract() != 0.0 || !n.is_finite() {
        return Err(Fault::runtime(
            format!("index must be an integer, got {}", n),
            span,
        ));
    }
    let signed = n as i64;
    let resolved = if signed < 0 { len as i64 + signed } else { signed };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Fault::runtime(
            format!("index {} out of range for length {}", signed, len),
            span,
        ));
    }
    Ok(resolved as usize)
}
