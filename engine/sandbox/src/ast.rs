//! Syntax tree for expansion scripts.

use std::fmt;

use serde::Serialize;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub items: Vec<Item>,
    pub entry: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Let {
        name: String,
        value: Expr,
        span: Span,
    },
    Fn {
        name: String,
        params: Vec<String>,
        body: Expr,
        span: Span,
    },
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Let { name, .. } | Item::Fn { name, .. } => name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Item::Let { span, .. } | Item::Fn { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// Type tags accepted on the right of `is`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Root,
    Null,
    Number,
    String,
    Bool,
    List,
    Map,
    Function,
}

impl TypeTag {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "root" => TypeTag::Root,
            "null" => TypeTag::Null,
            "number" => TypeTag::Number,
            "string" => TypeTag::String,
            "bool" => TypeTag::Bool,
            "list" => TypeTag::List,
            "map" => TypeTag::Map,
            "function" => TypeTag::Function,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Root,
    Bool(bool),
    Num(f64),
    Str(String),
    Var(String),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Is {
        expr: Box<Expr>,
        tag: TypeTag,
        negated: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        target: Box<Expr>,
        name: String,
    },
}
