//! Builtin functions available to every script.
//!
//! Everything here is pure apart from the random helpers, which draw from
//! the invocation's own seeded generator.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::ast::Span;
use crate::interp::{truthy, Interp};
use crate::limits::{Eval, Fault};
use crate::value::{ListVal, MapVal, Value};

/// Named numeric constants.
pub const CONSTANTS: &[(&str, f64)] = &[("pi", std::f64::consts::PI), ("e", std::f64::consts::E)];

macro_rules! builtins {
    ($($variant:ident => $name:literal, $min:expr, $max:expr;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $($variant,)*
        }

        impl Builtin {
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name,)*
                }
            }

            /// Accepted argument counts; `None` upper bound means variadic.
            pub fn arity(self) -> (usize, Option<usize>) {
                match self {
                    $(Builtin::$variant => ($min, $max),)*
                }
            }
        }
    };
}

builtins! {
    Abs => "abs", 1, Some(1);
    Floor => "floor", 1, Some(1);
    Ceil => "ceil", 1, Some(1);
    Round => "round", 1, Some(2);
    Sqrt => "sqrt", 1, Some(1);
    Exp => "exp", 1, Some(1);
    Ln => "ln", 1, Some(1);
    Log => "log", 1, Some(2);
    Pow => "pow", 2, Some(2);
    Sin => "sin", 1, Some(1);
    Cos => "cos", 1, Some(1);
    Tan => "tan", 1, Some(1);
    Min => "min", 1, None;
    Max => "max", 1, None;
    Clamp => "clamp", 3, Some(3);
    Random => "random", 0, Some(0);
    Uniform => "uniform", 2, Some(2);
    Randint => "randint", 2, Some(2);
    Gauss => "gauss", 2, Some(2);
    Choice => "choice", 1, Some(1);
    Shuffle => "shuffle", 1, Some(1);
    Len => "len", 1, Some(1);
    Range => "range", 1, Some(3);
    Map => "map", 2, Some(2);
    Filter => "filter", 2, Some(2);
    Fold => "fold", 3, Some(3);
    Sum => "sum", 1, Some(1);
    Any => "any", 1, Some(2);
    All => "all", 1, Some(2);
    Sort => "sort", 1, Some(2);
    Reverse => "reverse", 1, Some(1);
    Append => "append", 2, Some(2);
    Concat => "concat", 2, Some(2);
    Contains => "contains", 2, Some(2);
    Slice => "slice", 2, Some(3);
    Zip => "zip", 2, Some(2);
    Enumerate => "enumerate", 1, Some(1);
    Keys => "keys", 1, Some(1);
    Values => "values", 1, Some(1);
    Get => "get", 2, Some(3);
    Insert => "insert", 3, Some(3);
    Str => "str", 1, Some(1);
    Num => "num", 1, Some(1);
    Join => "join", 2, Some(2);
    Split => "split", 2, Some(2);
    Upper => "upper", 1, Some(1);
    Lower => "lower", 1, Some(1);
    Type => "type", 1, Some(1);
    Iterate => "iterate", 3, Some(3);
    Error => "error", 1, Some(1);
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }

    pub fn accepts(self, argc: usize) -> bool {
        let (min, max) = self.arity();
        argc >= min && max.map_or(true, |max| argc <= max)
    }

    pub fn arity_text(self) -> String {
        match self.arity() {
            (min, Some(max)) if min == max => format!("{}", min),
            (min, Some(max)) => format!("{} to {}", min, max),
            (min, None) => format!("at least {}", min),
        }
    }
}

struct Args<'v, 'a> {
    builtin: Builtin,
    values: &'v [Value<'a>],
    span: Span,
}

impl<'v, 'a> Args<'v, 'a> {
    fn err<T>(&self, message: impl AsRef<str>) -> Eval<T> {
        Err(Fault::runtime(
            format!("{}(): {}", self.builtin.name(), message.as_ref()),
            self.span,
        ))
    }

    fn get(&self, i: usize) -> &'v Value<'a> {
        &self.values[i]
    }

    fn opt(&self, i: usize) -> Option<&'v Value<'a>> {
        self.values.get(i)
    }

    fn num(&self, i: usize) -> Eval<f64> {
        match self.get(i) {
            Value::Num(n) => Ok(*n),
            other => self.err(format!(
                "argument {} must be a number, got {}",
                i + 1,
                other.type_name()
            )),
        }
    }

    fn int(&self, i: usize) -> Eval<i64> {
        let n = self.num(i)?;
        if n.fract() != 0.0 || !n.is_finite() {
            return self.err(format!("argument {} must be an integer, got {}", i + 1, n));
        }
        Ok(n as i64)
    }

    fn list(&self, i: usize) -> Eval<&'v Rc<ListVal<'a>>> {
        match self.get(i) {
            Value::List(l) => Ok(l),
            other => self.err(format!(
                "argument {} must be a list, got {}",
                i + 1,
                other.type_name()
            )),
        }
    }

    fn map(&self, i: usize) -> Eval<&'v Rc<MapVal<'a>>> {
        match self.get(i) {
            Value::Map(m) => Ok(m),
            other => self.err(format!(
                "argument {} must be a map, got {}",
                i + 1,
                other.type_name()
            )),
        }
    }

    fn string(&self, i: usize) -> Eval<&'v Rc<str>> {
        match self.get(i) {
            Value::Str(s) => Ok(s),
            other => self.err(format!(
                "argument {} must be a string, got {}",
                i + 1,
                other.type_name()
            )),
        }
    }

    fn function(&self, i: usize) -> Eval<&'v Value<'a>> {
        let value = self.get(i);
        if value.is_function() {
            Ok(value)
        } else {
            self.err(format!(
                "argument {} must be a function, got {}",
                i + 1,
                value.type_name()
            ))
        }
    }
}

/// Python-style index normalisation for slices; clamps into `0..=len`.
fn slice_bound(index: i64, len: usize) -> usize {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    resolved.clamp(0, len) as usize
}

impl<'a> Interp<'a> {
    pub(crate) fn call_builtin(
        &mut self,
        builtin: Builtin,
        values: Vec<Value<'a>>,
        span: Span,
    ) -> Eval<Value<'a>> {
        if !builtin.accepts(values.len()) {
            return Err(Fault::runtime(
                format!(
                    "{}() takes {} arguments, got {}",
                    builtin.name(),
                    builtin.arity_text(),
                    values.len()
                ),
                span,
            ));
        }
        let args = Args {
            builtin,
            values: &values,
            span,
        };
        match builtin {
            Builtin::Abs => Ok(Value::Num(args.num(0)?.abs())),
            Builtin::Floor => Ok(Value::Num(args.num(0)?.floor())),
            Builtin::Ceil => Ok(Value::Num(args.num(0)?.ceil())),
            Builtin::Round => {
                let x = args.num(0)?;
                match args.opt(1) {
                    None => Ok(Value::Num(x.round())),
                    Some(_) => {
                        let digits = args.int(1)?.clamp(-15, 15) as i32;
                        let factor = 10f64.powi(digits);
                        Ok(Value::Num((x * factor).round() / factor))
                    }
                }
            }
            Builtin::Sqrt => {
                let x = args.num(0)?;
                if x < 0.0 {
                    return args.err("negative argument");
                }
                Ok(Value::Num(x.sqrt()))
            }
            Builtin::Exp => Ok(Value::Num(args.num(0)?.exp())),
            Builtin::Ln => {
                let x = args.num(0)?;
                if x <= 0.0 {
                    return args.err("argument must be positive");
                }
                Ok(Value::Num(x.ln()))
            }
            Builtin::Log => {
                let x = args.num(0)?;
                if x <= 0.0 {
                    return args.err("argument must be positive");
                }
                match args.opt(1) {
                    None => Ok(Value::Num(x.ln())),
                    Some(_) => {
                        let base = args.num(1)?;
                        if base <= 0.0 || base == 1.0 {
                            return args.err("base must be positive and not 1");
                        }
                        Ok(Value::Num(x.log(base)))
                    }
                }
            }
            Builtin::Pow => Ok(Value::Num(args.num(0)?.powf(args.num(1)?))),
            Builtin::Sin => Ok(Value::Num(args.num(0)?.sin())),
            Builtin::Cos => Ok(Value::Num(args.num(0)?.cos())),
            Builtin::Tan => Ok(Value::Num(args.num(0)?.tan())),
            Builtin::Min | Builtin::Max => {
                let pool: &[Value<'a>] = match (values.len(), args.get(0)) {
                    (1, Value::List(l)) => &l.items,
                    _ => &values,
                };
                let want = if builtin == Builtin::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let mut best: Option<&Value<'a>> = None;
                for candidate in pool {
                    self.budget.tick()?;
                    best = match best {
                        None => Some(candidate),
                        Some(current) => match candidate.compare(current) {
                            Some(ord) if ord == want => Some(candidate),
                            Some(_) => Some(current),
                            None => {
                                return args.err(format!(
                                    "cannot compare {} with {}",
                                    candidate.type_name(),
                                    current.type_name()
                                ))
                            }
                        },
                    };
                }
                match best {
                    Some(v) => Ok(v.clone()),
                    None => args.err("empty sequence"),
                }
            }
            Builtin::Clamp => {
                let (x, lo, hi) = (args.num(0)?, args.num(1)?, args.num(2)?);
                if lo > hi {
                    return args.err("lower bound exceeds upper bound");
                }
                Ok(Value::Num(x.clamp(lo, hi)))
            }
            Builtin::Random => Ok(Value::Num(self.rng.gen::<f64>())),
            Builtin::Uniform => {
                let (lo, hi) = (args.num(0)?, args.num(1)?);
                if !(lo.is_finite() && hi.is_finite()) || lo > hi {
                    return args.err("bounds must be finite with low <= high");
                }
                let u: f64 = self.rng.gen();
                Ok(Value::Num(lo + (hi - lo) * u))
            }
            Builtin::Randint => {
                let (lo, hi) = (args.int(0)?, args.int(1)?);
                if lo > hi {
                    return args.err("low exceeds high");
                }
                Ok(Value::Num(self.rng.gen_range(lo..=hi) as f64))
            }
            Builtin::Gauss => {
                let (mu, sigma) = (args.num(0)?, args.num(1)?);
                let normal = match Normal::new(mu, sigma) {
                    Ok(n) if sigma >= 0.0 => n,
                    _ => return args.err("sigma must be finite and non-negative"),
                };
                Ok(Value::Num(normal.sample(&mut self.rng)))
            }
            Builtin::Choice => {
                let list = args.list(0)?;
                match list.items.choose(&mut self.rng) {
                    Some(v) => Ok(v.clone()),
                    None => args.err("empty list"),
                }
            }
            Builtin::Shuffle => {
                let list = args.list(0)?;
                self.budget.alloc(list.items.len() + 1)?;
                let mut items = list.items.clone();
                items.shuffle(&mut self.rng);
                Ok(Value::list(items))
            }
            Builtin::Len => match args.get(0) {
                Value::List(l) => Ok(Value::Num(l.items.len() as f64)),
                Value::Map(m) => Ok(Value::Num(m.entries.len() as f64)),
                Value::Str(s) => Ok(Value::Num(s.chars().count() as f64)),
                other => args.err(format!("{} has no length", other.type_name())),
            },
            Builtin::Range => {
                let (start, stop, step) = match values.len() {
                    1 => (0, args.int(0)?, 1),
                    2 => (args.int(0)?, args.int(1)?, 1),
                    _ => (args.int(0)?, args.int(1)?, args.int(2)?),
                };
                if step == 0 {
                    return args.err("step must not be zero");
                }
                let count = if (step > 0 && start < stop) || (step < 0 && start > stop) {
                    let stride = step.unsigned_abs();
                    let n = stop
                        .checked_sub(start)
                        .and_then(|span| span.unsigned_abs().checked_add(stride - 1))
                        .and_then(|n| i64::try_from(n / stride).ok());
                    match n {
                        Some(n) => n,
                        None => return args.err("range is too large"),
                    }
                } else {
                    0
                };
                self.budget.alloc(usize::try_from(count).unwrap_or(usize::MAX).saturating_add(1))?;
                let items: Option<Vec<Value>> = (0..count)
                    .map(|i| {
                        i.checked_mul(step)
                            .and_then(|offset| start.checked_add(offset))
                            .map(|v| Value::Num(v as f64))
                    })
                    .collect();
                match items {
                    Some(items) => Ok(Value::list(items)),
                    None => args.err("range is too large"),
                }
            }
            Builtin::Map => {
                let list = args.list(0)?;
                let f = args.function(1)?;
                self.budget.alloc(list.items.len() + 1)?;
                let mut out = Vec::with_capacity(list.items.len());
                for item in &list.items {
                    out.push(self.apply(f, vec![item.clone()], span)?);
                }
                self.finish_list(out)
            }
            Builtin::Filter => {
                let list = args.list(0)?;
                let f = args.function(1)?;
                let mut out = Vec::new();
                for item in &list.items {
                    if truthy(self.apply(f, vec![item.clone()], span)?, span)? {
                        out.push(item.clone());
                    }
                }
                self.budget.alloc(out.len() + 1)?;
                Ok(Value::list(out))
            }
            Builtin::Fold => {
                let list = args.list(0)?;
                let f = args.function(2)?;
                let mut acc = args.get(1).clone();
                for item in &list.items {
                    acc = self.apply(f, vec![acc, item.clone()], span)?;
                }
                Ok(acc)
            }
            Builtin::Sum => {
                let list = args.list(0)?;
                let mut total = 0.0;
                for item in &list.items {
                    self.budget.tick()?;
                    match item {
                        Value::Num(n) => total += n,
                        other => {
                            return args.err(format!("cannot sum a {}", other.type_name()));
                        }
                    }
                }
                Ok(Value::Num(total))
            }
            Builtin::Any | Builtin::All => {
                let list = args.list(0)?;
                let want_any = builtin == Builtin::Any;
                for item in &list.items {
                    self.budget.tick()?;
                    let hit = match args.opt(1) {
                        Some(_) => {
                            let f = args.function(1)?;
                            truthy(self.apply(f, vec![item.clone()], span)?, span)?
                        }
                        None => truthy(item.clone(), span)?,
                    };
                    if hit == want_any {
                        return Ok(Value::Bool(want_any));
                    }
                }
                Ok(Value::Bool(!want_any))
            }
            Builtin::Sort => {
                let list = args.list(0)?;
                self.budget.alloc(2 * list.items.len() + 1)?;
                let mut keyed = Vec::with_capacity(list.items.len());
                for item in &list.items {
                    let key = match args.opt(1) {
                        Some(_) => self.apply(args.function(1)?, vec![item.clone()], span)?,
                        None => item.clone(),
                    };
                    keyed.push((key, item.clone()));
                }
                // Validate comparability up front so the sort itself cannot fail
                for pair in keyed.windows(2) {
                    self.budget.tick()?;
                    if pair[0].0.compare(&pair[1].0).is_none() {
                        return args.err(format!(
                            "cannot compare {} with {}",
                            pair[0].0.type_name(),
                            pair[1].0.type_name()
                        ));
                    }
                }
                keyed.sort_by(|a, b| a.0.compare(&b.0).unwrap_or(Ordering::Equal));
                Ok(Value::list(keyed.into_iter().map(|(_, v)| v).collect()))
            }
            Builtin::Reverse => match args.get(0) {
                Value::List(l) => {
                    self.budget.alloc(l.items.len() + 1)?;
                    Ok(Value::list(l.items.iter().rev().cloned().collect()))
                }
                Value::Str(s) => {
                    self.budget.alloc(1 + s.len() / 8)?;
                    Ok(Value::str(&s.chars().rev().collect::<String>()))
                }
                other => args.err(format!("cannot reverse a {}", other.type_name())),
            },
            Builtin::Append => {
                let list = args.list(0)?;
                self.budget.alloc(list.items.len() + 2)?;
                let mut items = list.items.clone();
                items.push(args.get(1).clone());
                self.finish_list(items)
            }
            Builtin::Concat => self.concat(args.get(0), args.get(1), span),
            Builtin::Contains => match (args.get(0), args.get(1)) {
                (Value::List(l), needle) => {
                    for item in &l.items {
                        self.budget.tick()?;
                        if item.equals(needle) {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }
                (Value::Map(m), Value::Str(key)) => Ok(Value::Bool(m.entries.contains_key(&**key))),
                (Value::Str(hay), Value::Str(needle)) => Ok(Value::Bool(hay.contains(&**needle))),
                (coll, needle) => args.err(format!(
                    "cannot search a {} for a {}",
                    coll.type_name(),
                    needle.type_name()
                )),
            },
            Builtin::Slice => {
                let start = args.int(1)?;
                let end = match args.opt(2) {
                    Some(_) => Some(args.int(2)?),
                    None => None,
                };
                match args.get(0) {
                    Value::List(l) => {
                        let len = l.items.len();
                        let (s, e) = (
                            slice_bound(start, len),
                            end.map_or(len, |e| slice_bound(e, len)),
                        );
                        let items: Vec<_> = if s < e {
                            l.items[s..e].to_vec()
                        } else {
                            Vec::new()
                        };
                        self.budget.alloc(items.len() + 1)?;
                        Ok(Value::list(items))
                    }
                    Value::Str(text) => {
                        let chars: Vec<char> = text.chars().collect();
                        let len = chars.len();
                        let (s, e) = (
                            slice_bound(start, len),
                            end.map_or(len, |e| slice_bound(e, len)),
                        );
                        let out: String = if s < e {
                            chars[s..e].iter().collect()
                        } else {
                            String::new()
                        };
                        self.budget.alloc(1 + out.len() / 8)?;
                        Ok(Value::str(&out))
                    }
                    other => args.err(format!("cannot slice a {}", other.type_name())),
                }
            }
            Builtin::Zip => {
                let (a, b) = (args.list(0)?, args.list(1)?);
                let n = a.items.len().min(b.items.len());
                self.budget.alloc(3 * n + 1)?;
                let items = a
                    .items
                    .iter()
                    .zip(&b.items)
                    .map(|(x, y)| Value::list(vec![x.clone(), y.clone()]))
                    .collect();
                self.finish_list(items)
            }
            Builtin::Enumerate => {
                let list = args.list(0)?;
                self.budget.alloc(3 * list.items.len() + 1)?;
                let items = list
                    .items
                    .iter()
                    .enumerate()
                    .map(|(i, x)| Value::list(vec![Value::Num(i as f64), x.clone()]))
                    .collect();
                self.finish_list(items)
            }
            Builtin::Keys => {
                let map = args.map(0)?;
                self.budget.alloc(map.entries.len() + 1)?;
                Ok(Value::list(map.entries.keys().map(|k| Value::str(k)).collect()))
            }
            Builtin::Values => {
                let map = args.map(0)?;
                self.budget.alloc(map.entries.len() + 1)?;
                Ok(Value::list(map.entries.values().cloned().collect()))
            }
            Builtin::Get => {
                let fallback = args.opt(2).cloned().unwrap_or(Value::Null);
                match (args.get(0), args.get(1)) {
                    (Value::Map(m), Value::Str(key)) => {
                        Ok(m.entries.get(&**key).cloned().unwrap_or(fallback))
                    }
                    (Value::List(l), Value::Num(_)) => {
                        let i = args.int(1)?;
                        let len = l.items.len() as i64;
                        let idx = if i < 0 { len + i } else { i };
                        if (0..len).contains(&idx) {
                            Ok(l.items[idx as usize].clone())
                        } else {
                            Ok(fallback)
                        }
                    }
                    (coll, key) => args.err(format!(
                        "cannot look up a {} key in a {}",
                        key.type_name(),
                        coll.type_name()
                    )),
                }
            }
            Builtin::Insert => {
                let map = args.map(0)?;
                let key = args.string(1)?;
                self.budget.alloc(2 * map.entries.len() + 3)?;
                let mut entries: BTreeMap<String, Value<'a>> = map.entries.clone();
                entries.insert(key.to_string(), args.get(2).clone());
                let value = Value::map(entries);
                self.budget.check_value_depth(value.depth())?;
                Ok(value)
            }
            Builtin::Str => {
                let text = args.get(0).display();
                self.budget.alloc(1 + text.len() / 8)?;
                Ok(Value::str(&text))
            }
            Builtin::Num => match args.get(0) {
                Value::Num(n) => Ok(Value::Num(*n)),
                Value::Bool(b) => Ok(Value::Num(if *b { 1.0 } else { 0.0 })),
                Value::Str(s) => match s.trim().parse::<f64>() {
                    Ok(n) => Ok(Value::Num(n)),
                    Err(_) => args.err(format!("cannot parse {:?} as a number", s)),
                },
                other => args.err(format!("cannot convert a {} to a number", other.type_name())),
            },
            Builtin::Join => {
                let list = args.list(0)?;
                let sep = args.string(1)?;
                let parts: Vec<String> = list.items.iter().map(Value::display).collect();
                let joined = parts.join(sep);
                self.budget.alloc(1 + joined.len() / 8)?;
                Ok(Value::str(&joined))
            }
            Builtin::Split => {
                let text = args.string(0)?;
                let sep = args.string(1)?;
                if sep.is_empty() {
                    return args.err("separator must not be empty");
                }
                let parts: Vec<Value<'a>> = text.split(&**sep).map(Value::str).collect();
                self.budget.alloc(parts.len() + 1 + text.len() / 8)?;
                Ok(Value::list(parts))
            }
            Builtin::Upper => Ok(Value::str(&args.string(0)?.to_uppercase())),
            Builtin::Lower => Ok(Value::str(&args.string(0)?.to_lowercase())),
            Builtin::Type => Ok(Value::str(args.get(0).type_name())),
            Builtin::Iterate => {
                let cond = args.function(1)?;
                let step = args.function(2)?;
                let mut current = args.get(0).clone();
                while truthy(self.apply(cond, vec![current.clone()], span)?, span)? {
                    current = self.apply(step, vec![current], span)?;
                }
                Ok(current)
            }
            Builtin::Error => Err(Fault::runtime(args.get(0).display(), span)),
        }
    }

    fn finish_list(&mut self, items: Vec<Value<'a>>) -> Eval<Value<'a>> {
        let value = Value::list(items);
        self.budget.check_value_depth(value.depth())?;
        Ok(value)
    }

    pub(crate) fn concat(&mut self, a: &Value<'a>, b: &Value<'a>, span: Span) -> Eval<Value<'a>> {
        match (a, b) {
            (Value::List(x), Value::List(y)) => {
                self.budget.alloc(x.items.len() + y.items.len() + 1)?;
                let mut items = Vec::with_capacity(x.items.len() + y.items.len());
                items.extend(x.items.iter().cloned());
                items.extend(y.items.iter().cloned());
                Ok(Value::list(items))
            }
            (Value::Str(x), Value::Str(y)) => {
                self.budget.alloc(1 + (x.len() + y.len()) / 8)?;
                let mut out = String::with_capacity(x.len() + y.len());
                out.push_str(x);
                out.push_str(y);
                Ok(Value::str(&out))
            }
            (x, y) => Err(Fault::runtime(
                format!("cannot concatenate {} and {}", x.type_name(), y.type_name()),
                span,
            )),
        }
    }
}
