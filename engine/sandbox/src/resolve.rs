//! Static checks on a parsed program: name binding, builtin arity and the
//! entry point.

use std::collections::HashMap;

use crate::ast::{Expr, ExprKind, Item, Program, Span};
use crate::builtins::{Builtin, CONSTANTS};
use crate::interp::ENTRY_NAMES;

#[derive(Debug, Clone, PartialEq)]
pub struct StaticError {
    pub message: String,
    pub span: Span,
}

impl StaticError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

#[derive(Clone, Copy)]
enum Global {
    Fn(usize),
    Let,
}

struct Resolver<'p> {
    globals: HashMap<&'p str, Global>,
    /// Let items visible so far; fn bodies see all of them.
    lets_visible: usize,
    let_order: Vec<&'p str>,
    fn_bodies: bool,
    scopes: Vec<&'p str>,
}

impl<'p> Resolver<'p> {
    fn global(&self, name: &str) -> Option<Global> {
        let global = self.globals.get(name).copied()?;
        match global {
            Global::Let if !self.fn_bodies => self.let_order[..self.lets_visible]
                .iter()
                .any(|n| *n == name)
                .then_some(global),
            other => Some(other),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| *s == name)
    }

    fn check(&mut self, expr: &'p Expr) -> Result<(), StaticError> {
        match &expr.kind {
            ExprKind::Null
            | ExprKind::Root
            | ExprKind::Bool(_)
            | ExprKind::Num(_)
            | ExprKind::Str(_) => Ok(()),
            ExprKind::Var(name) => {
                if self.is_local(name)
                    || self.global(name).is_some()
                    || CONSTANTS.iter().any(|(n, _)| *n == name.as_str())
                    || Builtin::lookup(name).is_some()
                {
                    Ok(())
                } else if self.globals.contains_key(name.as_str()) {
                    Err(StaticError::new(
                        format!("'{}' is used before its definition", name),
                        expr.span,
                    ))
                } else {
                    Err(StaticError::new(
                        format!("unbound identifier '{}'", name),
                        expr.span,
                    ))
                }
            }
            ExprKind::List(items) => items.iter().try_for_each(|e| self.check(e)),
            ExprKind::Map(entries) => entries.iter().try_for_each(|(_, e)| self.check(e)),
            ExprKind::Lambda { params, body } => {
                let mark = self.scopes.len();
                self.scopes.extend(params.iter().map(String::as_str));
                let result = self.check(body);
                self.scopes.truncate(mark);
                result
            }
            ExprKind::Let { name, value, body } => {
                self.check(value)?;
                self.scopes.push(name);
                let result = self.check(body);
                self.scopes.pop();
                result
            }
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.check(cond)?;
                self.check(then)?;
                self.check(otherwise)
            }
            ExprKind::Unary { expr, .. } => self.check(expr),
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::And(lhs, rhs)
            | ExprKind::Or(lhs, rhs) => {
                self.check(lhs)?;
                self.check(rhs)
            }
            ExprKind::Is { expr, .. } => self.check(expr),
            ExprKind::Call { callee, args } => {
                self.check(callee)?;
                if let ExprKind::Var(name) = &callee.kind {
                    self.check_arity(name, args.len(), expr.span)?;
                }
                args.iter().try_for_each(|e| self.check(e))
            }
            ExprKind::Index { target, index } => {
                self.check(target)?;
                self.check(index)
            }
            ExprKind::Field { target, .. } => self.check(target),
        }
    }

    fn check_arity(&self, name: &str, argc: usize, span: Span) -> Result<(), StaticError> {
        if self.is_local(name) {
            return Ok(());
        }
        match self.global(name) {
            Some(Global::Fn(params)) if params != argc => Err(StaticError::new(
                format!("'{}' takes {} argument(s), got {}", name, params, argc),
                span,
            )),
            Some(_) => Ok(()),
            None => match Builtin::lookup(name) {
                Some(b) if !b.accepts(argc) => Err(StaticError::new(
                    format!("{}() takes {} arguments, got {}", name, b.arity_text(), argc),
                    span,
                )),
                _ => Ok(()),
            },
        }
    }
}

/// Validate bindings and locate a usable entry point.
pub fn check_program(program: &Program) -> Result<(), StaticError> {
    let mut resolver = Resolver {
        globals: HashMap::new(),
        lets_visible: 0,
        let_order: Vec::new(),
        fn_bodies: false,
        scopes: Vec::new(),
    };
    for item in &program.items {
        let global = match item {
            Item::Fn { params, .. } => Global::Fn(params.len()),
            Item::Let { name, .. } => {
                resolver.let_order.push(name);
                Global::Let
            }
        };
        if resolver.globals.insert(item.name(), global).is_some() {
            return Err(StaticError::new(
                format!("'{}' is defined more than once", item.name()),
                item.span(),
            ));
        }
    }

    for item in &program.items {
        match item {
            Item::Let { value, .. } => {
                resolver.fn_bodies = false;
                resolver.check(value)?;
                resolver.lets_visible += 1;
            }
            Item::Fn { params, body, .. } => {
                resolver.fn_bodies = true;
                resolver.scopes.extend(params.iter().map(String::as_str));
                resolver.check(body)?;
                resolver.scopes.clear();
            }
        }
    }

    resolver.fn_bodies = true;
    match &program.entry {
        Some(expr) => {
            resolver.check(expr)?;
            if let ExprKind::Lambda { params, .. } = &expr.kind {
                if params.len() != 1 {
                    return Err(StaticError::new(
                        format!(
                            "entry function must take exactly one argument, takes {}",
                            params.len()
                        ),
                        expr.span,
                    ));
                }
            }
            Ok(())
        }
        None => {
            let entry = ENTRY_NAMES.iter().find_map(|name| {
                program.items.iter().find(|i| i.name() == *name)
            });
            match entry {
                Some(Item::Fn { params, span, .. }) if params.len() != 1 => Err(StaticError::new(
                    format!(
                        "entry function must take exactly one argument, takes {}",
                        params.len()
                    ),
                    *span,
                )),
                Some(_) => Ok(()),
                None => Err(StaticError::new(
                    "no entry point: end the script with a function expression \
                     or define fn generate(state)",
                    Span::new(1, 1),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn check(source: &str) -> Result<(), StaticError> {
        check_program(&parse_program(source).unwrap())
    }

    #[test]
    fn test_accepts_valid_programs() {
        check(r#"state -> state is root ? [("start", 0.5)] : []"#).unwrap();
        check("let w = 2;\nfn generate(s) = map(range(w), i -> [i, i / w]);").unwrap();
        check("fn helper(x) = x + limit;\nlet limit = 3;\ns -> [helper(s)]").unwrap();
        check("s -> [pi, e, sqrt(2)]").unwrap();
    }

    #[test]
    fn test_unbound_identifier_has_location() {
        let err = check("state ->\n  [(stat, 0.5)]").unwrap_err();
        assert_eq!(err.message, "unbound identifier 'stat'");
        assert_eq!(err.span, Span::new(2, 5));
    }

    #[test]
    fn test_let_used_before_definition() {
        let err = check("let a = b;\nlet b = 1;\ns -> []").unwrap_err();
        assert!(err.message.contains("before its definition"));
    }

    #[test]
    fn test_builtin_arity() {
        let err = check("s -> range(1, 2, 3, 4)").unwrap_err();
        assert!(err.message.starts_with("range() takes 1 to 3"));
        // Shadowed builtins follow the local binding
        check("s -> let range = (a, b, c, d) -> a in range(1, 2, 3, 4)").unwrap();
    }

    #[test]
    fn test_fn_item_arity() {
        let err = check("fn pair(a, b) = [a, b];\ns -> pair(1)").unwrap_err();
        assert!(err.message.contains("takes 2 argument(s), got 1"));
    }

    #[test]
    fn test_entry_point_rules() {
        assert!(check("let x = 1;").unwrap_err().message.starts_with("no entry point"));
        assert!(check("fn generate(a, b) = [];").is_err());
        assert!(check("(a, b) -> []").is_err());
        check("fn generate_fn(state) = [];").unwrap();
    }

    #[test]
    fn test_duplicate_definitions() {
        let err = check("let a = 1;\nfn a(x) = x;\ns -> []").unwrap_err();
        assert!(err.message.contains("more than once"));
        assert_eq!(err.span.line, 2);
    }
}
