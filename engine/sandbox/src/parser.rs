//! Expansion script parser built on pest.

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct ScriptParser;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    fn from_pest_error(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        Self::new(
            format!("syntax error: {}", err.variant.message()),
            Span::new(line, column),
        )
    }
}

type ParseResult<T> = Result<T, SyntaxError>;

/// Parse a full script into items plus the optional trailing expression.
pub fn parse_program(source: &str) -> ParseResult<Program> {
    let mut pairs =
        ScriptParser::parse(Rule::program, source).map_err(SyntaxError::from_pest_error)?;
    let program = next(&mut pairs, Span::new(1, 1))?;

    let mut items = Vec::new();
    let mut entry = None;
    for inner in program.into_inner() {
        match inner.as_rule() {
            Rule::let_item => items.push(parse_let_item(inner)?),
            Rule::fn_item => items.push(parse_fn_item(inner)?),
            Rule::EOI => {}
            _ => entry = Some(build_expr(inner)?),
        }
    }
    Ok(Program { items, entry })
}

fn span_of(pair: &Pair<Rule>) -> Span {
    let (line, column) = pair.line_col();
    Span::new(line, column)
}

fn next<'i>(inner: &mut Pairs<'i, Rule>, span: Span) -> ParseResult<Pair<'i, Rule>> {
    inner
        .next()
        .ok_or_else(|| SyntaxError::new("malformed expression", span))
}

fn parse_let_item(pair: Pair<Rule>) -> ParseResult<Item> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let name = next(&mut inner, span)?.as_str().to_string();
    let value = build_expr(next(&mut inner, span)?)?;
    Ok(Item::Let { name, value, span })
}

fn parse_fn_item(pair: Pair<Rule>) -> ParseResult<Item> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let name = next(&mut inner, span)?.as_str().to_string();
    let params = parse_params(next(&mut inner, span)?)?;
    let body = build_expr(next(&mut inner, span)?)?;
    Ok(Item::Fn {
        name,
        params,
        body,
        span,
    })
}

fn parse_params(pair: Pair<Rule>) -> ParseResult<Vec<String>> {
    let mut params: Vec<String> = Vec::new();
    for ident in pair.into_inner() {
        let name = ident.as_str();
        if params.iter().any(|p| p == name) {
            return Err(SyntaxError::new(
                format!("duplicate parameter '{}'", name),
                span_of(&ident),
            ));
        }
        params.push(name.to_string());
    }
    Ok(params)
}

fn boxed(pair: Pair<Rule>) -> ParseResult<Box<Expr>> {
    build_expr(pair).map(Box::new)
}

fn build_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::lambda => {
            let mut inner = pair.into_inner();
            let head = next(&mut inner, span)?;
            let params = match head.into_inner().next() {
                Some(p) if p.as_rule() == Rule::ident => vec![p.as_str().to_string()],
                Some(p) => parse_params(p)?,
                None => Vec::new(),
            };
            let body = boxed(next(&mut inner, span)?)?;
            Ok(Expr::new(ExprKind::Lambda { params, body }, span))
        }
        Rule::let_expr => {
            let mut inner = pair.into_inner();
            let name = next(&mut inner, span)?.as_str().to_string();
            let value = boxed(next(&mut inner, span)?)?;
            let body = boxed(next(&mut inner, span)?)?;
            Ok(Expr::new(ExprKind::Let { name, value, body }, span))
        }
        Rule::if_expr => {
            let mut inner = pair.into_inner();
            let cond = boxed(next(&mut inner, span)?)?;
            let then = boxed(next(&mut inner, span)?)?;
            let otherwise = boxed(next(&mut inner, span)?)?;
            Ok(Expr::new(
                ExprKind::If {
                    cond,
                    then,
                    otherwise,
                },
                span,
            ))
        }
        Rule::ternary => {
            let mut inner = pair.into_inner();
            let cond = build_expr(next(&mut inner, span)?)?;
            match inner.next() {
                None => Ok(cond),
                Some(then) => {
                    let then = boxed(then)?;
                    let otherwise = boxed(next(&mut inner, span)?)?;
                    Ok(Expr::new(
                        ExprKind::If {
                            cond: Box::new(cond),
                            then,
                            otherwise,
                        },
                        span,
                    ))
                }
            }
        }
        Rule::or_expr | Rule::and_expr => {
            let is_or = pair.as_rule() == Rule::or_expr;
            let mut inner = pair.into_inner();
            let mut acc = build_expr(next(&mut inner, span)?)?;
            while let Some(op) = inner.next() {
                let op_span = span_of(&op);
                let rhs = boxed(next(&mut inner, op_span)?)?;
                let kind = if is_or {
                    ExprKind::Or(Box::new(acc), rhs)
                } else {
                    ExprKind::And(Box::new(acc), rhs)
                };
                acc = Expr::new(kind, op_span);
            }
            Ok(acc)
        }
        Rule::cmp_expr | Rule::add_expr | Rule::mul_expr => {
            let mut inner = pair.into_inner();
            let mut acc = build_expr(next(&mut inner, span)?)?;
            while let Some(op) = inner.next() {
                let op_span = span_of(&op);
                let op = binary_op(op.as_str(), op_span)?;
                let rhs = boxed(next(&mut inner, op_span)?)?;
                acc = Expr::new(
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(acc),
                        rhs,
                    },
                    op_span,
                );
            }
            Ok(acc)
        }
        Rule::is_expr => {
            let mut inner = pair.into_inner();
            let expr = build_expr(next(&mut inner, span)?)?;
            let mut negated = false;
            let mut out = expr;
            for part in inner {
                match part.as_rule() {
                    Rule::is_not => negated = true,
                    Rule::type_name => {
                        let tag = TypeTag::parse(part.as_str()).ok_or_else(|| {
                            SyntaxError::new(
                                format!("unknown type '{}'", part.as_str()),
                                span_of(&part),
                            )
                        })?;
                        out = Expr::new(
                            ExprKind::Is {
                                expr: Box::new(out),
                                tag,
                                negated,
                            },
                            span_of(&part),
                        );
                    }
                    _ => {}
                }
            }
            Ok(out)
        }
        Rule::unary => {
            let mut ops = Vec::new();
            let mut operand = None;
            for part in pair.into_inner() {
                if part.as_rule() == Rule::op_unary {
                    let op = if part.as_str() == "-" {
                        UnaryOp::Neg
                    } else {
                        UnaryOp::Not
                    };
                    ops.push((op, span_of(&part)));
                } else {
                    operand = Some(build_expr(part)?);
                }
            }
            let mut expr = operand.ok_or_else(|| SyntaxError::new("missing operand", span))?;
            for (op, op_span) in ops.into_iter().rev() {
                expr = Expr::new(
                    ExprKind::Unary {
                        op,
                        expr: Box::new(expr),
                    },
                    op_span,
                );
            }
            Ok(expr)
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let mut expr = build_expr(next(&mut inner, span)?)?;
            for suffix in inner {
                let s_span = span_of(&suffix);
                let kind = match suffix.as_rule() {
                    Rule::call => ExprKind::Call {
                        callee: Box::new(expr),
                        args: build_all(suffix.into_inner())?,
                    },
                    Rule::index => ExprKind::Index {
                        target: Box::new(expr),
                        index: boxed(next(&mut suffix.into_inner(), s_span)?)?,
                    },
                    Rule::field => ExprKind::Field {
                        target: Box::new(expr),
                        name: next(&mut suffix.into_inner(), s_span)?.as_str().to_string(),
                    },
                    other => {
                        return Err(SyntaxError::new(
                            format!("unexpected {:?}", other),
                            s_span,
                        ))
                    }
                };
                expr = Expr::new(kind, s_span);
            }
            Ok(expr)
        }
        Rule::number => {
            let value: f64 = pair
                .as_str()
                .parse()
                .map_err(|_| {
                    SyntaxError::new(format!("invalid number '{}'", pair.as_str()), span)
                })?;
            Ok(Expr::new(ExprKind::Num(value), span))
        }
        Rule::string => Ok(Expr::new(ExprKind::Str(unescape(pair.as_str(), span)?), span)),
        Rule::bool_lit => Ok(Expr::new(ExprKind::Bool(pair.as_str() == "true"), span)),
        Rule::null_lit => Ok(Expr::new(ExprKind::Null, span)),
        Rule::root_lit => Ok(Expr::new(ExprKind::Root, span)),
        Rule::ident => Ok(Expr::new(ExprKind::Var(pair.as_str().to_string()), span)),
        Rule::list => Ok(Expr::new(ExprKind::List(build_all(pair.into_inner())?), span)),
        Rule::map => {
            let mut entries: Vec<(String, Expr)> = Vec::new();
            for entry in pair.into_inner() {
                let e_span = span_of(&entry);
                let mut inner = entry.into_inner();
                let key_pair = next(&mut inner, e_span)?;
                let key = match key_pair.as_rule() {
                    Rule::string => unescape(key_pair.as_str(), e_span)?,
                    _ => key_pair.as_str().to_string(),
                };
                if entries.iter().any(|(k, _)| *k == key) {
                    return Err(SyntaxError::new(format!("duplicate key '{}'", key), e_span));
                }
                entries.push((key, build_expr(next(&mut inner, e_span)?)?));
            }
            Ok(Expr::new(ExprKind::Map(entries), span))
        }
        Rule::group => {
            let mut commas = 0;
            let mut exprs = Vec::new();
            for part in pair.into_inner() {
                if part.as_rule() == Rule::comma {
                    commas += 1;
                } else {
                    exprs.push(build_expr(part)?);
                }
            }
            if exprs.len() == 1 && commas == 0 {
                Ok(exprs.remove(0))
            } else {
                Ok(Expr::new(ExprKind::List(exprs), span))
            }
        }
        other => Err(SyntaxError::new(format!("unexpected {:?}", other), span)),
    }
}

fn build_all(pairs: Pairs<Rule>) -> ParseResult<Vec<Expr>> {
    pairs.map(build_expr).collect()
}

fn binary_op(symbol: &str, span: Span) -> ParseResult<BinaryOp> {
    Ok(match symbol {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        other => {
            return Err(SyntaxError::new(format!("unknown operator '{}'", other), span));
        }
    })
}

fn unescape(raw: &str, span: Span) -> ParseResult<String> {
    // Both quote styles are one byte wide
    let body = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => {
                return Err(SyntaxError::new(format!("unknown escape '\\{}'", other), span));
            }
            None => return Err(SyntaxError::new("dangling escape", span)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str) -> ExprKind {
        parse_program(source).unwrap().entry.unwrap().kind
    }

    #[test]
    fn test_parse_lambda_with_ternary() {
        let kind = entry(r#"state -> state is root ? [("start", 0.5)] : []"#);
        let ExprKind::Lambda { params, body } = kind else {
            panic!("expected lambda");
        };
        assert_eq!(params, vec!["state".to_string()]);
        let ExprKind::If { cond, then, .. } = body.kind else {
            panic!("expected conditional");
        };
        assert!(matches!(
            cond.kind,
            ExprKind::Is {
                tag: TypeTag::Root,
                negated: false,
                ..
            }
        ));
        let ExprKind::List(items) = then.kind else {
            panic!("expected list");
        };
        assert!(matches!(&items[0].kind, ExprKind::List(pair) if pair.len() == 2));
    }

    #[test]
    fn test_group_and_tuples() {
        assert!(matches!(entry("(1)"), ExprKind::Num(n) if n == 1.0));
        assert!(matches!(entry("(1,)"), ExprKind::List(v) if v.len() == 1));
        assert!(matches!(entry("()"), ExprKind::List(v) if v.is_empty()));
        assert!(matches!(entry("(1, 2, 3)"), ExprKind::List(v) if v.len() == 3));
    }

    #[test]
    fn test_precedence() {
        let ExprKind::Binary { op, rhs, .. } = entry("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_keyword_prefixed_identifiers() {
        assert!(matches!(entry("nothing"), ExprKind::Var(v) if v == "nothing"));
        assert!(matches!(entry("not done"), ExprKind::Unary { op: UnaryOp::Not, .. }));
        assert!(matches!(entry("island"), ExprKind::Var(v) if v == "island"));
        assert!(matches!(entry("order or flag"), ExprKind::Or(..)));
    }

    #[test]
    fn test_items_and_entry() {
        let program = parse_program(
            "let depth = 3;\nfn grow(s) = [s + 1, s];\n# trailing comment\nstate -> [grow(state)]",
        )
        .unwrap();
        assert_eq!(program.items.len(), 2);
        assert_eq!(program.items[0].name(), "depth");
        assert_eq!(program.items[1].span().line, 2);
        assert!(program.entry.is_some());
    }

    #[test]
    fn test_fn_only_program_has_no_entry_expr() {
        let program = parse_program("fn generate(state) = [];").unwrap();
        assert!(program.entry.is_none());
    }

    #[test]
    fn test_let_in_and_if() {
        assert!(matches!(entry("let x = 1 in x + 1"), ExprKind::Let { .. }));
        assert!(matches!(
            entry("if true then 1 else 2"),
            ExprKind::If { .. }
        ));
    }

    #[test]
    fn test_strings_and_maps() {
        let ExprKind::Map(entries) = entry(r#"{state: 'a\'b', "score": 1}"#) else {
            panic!("expected map");
        };
        assert_eq!(entries[0].0, "state");
        assert!(matches!(&entries[0].1.kind, ExprKind::Str(s) if s == "a'b"));
        assert_eq!(entries[1].0, "score");
    }

    #[test]
    fn test_syntax_error_location() {
        let err = parse_program("state ->\n  [1, 2").unwrap_err();
        assert_eq!(err.span.line, 2);
        assert!(err.message.starts_with("syntax error"));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = parse_program("(a, a) -> a").unwrap_err();
        assert!(err.message.contains("duplicate parameter"));
    }

    #[test]
    fn test_postfix_chain() {
        let ExprKind::Field { target, name } = entry("f(1)[0].score") else {
            panic!("expected field access");
        };
        assert_eq!(name, "score");
        assert!(matches!(target.kind, ExprKind::Index { .. }));
    }
}
