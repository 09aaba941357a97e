//! Syntax tree for one source file.
//!
//! Identifiers and function-like nodes carry interior-mutable slots that the
//! resolver fills in; everything else is immutable once parsed.

use std::cell::Cell;

use crate::resolve::{BindingId, FunctionId};
use crate::token::Position;

#[derive(Debug)]
pub struct File {
    pub name: String,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug)]
pub struct Ident {
    pub name: String,
    pub pos: Position,
    pub binding: Cell<Option<BindingId>>,
}

impl Ident {
    pub fn new(name: impl Into<String>, pos: Position) -> Self {
        Self {
            name: name.into(),
            pos,
            binding: Cell::new(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    Tilde,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Pipe,
    Caret,
    Amp,
    LtLt,
    GtGt,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Pipe => "|",
            BinaryOp::Caret => "^",
            BinaryOp::Amp => "&",
            BinaryOp::LtLt => "<<",
            BinaryOp::GtGt => ">>",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Star => "*",
            BinaryOp::Slash => "/",
            BinaryOp::SlashSlash => "//",
            BinaryOp::Percent => "%",
        }
    }

    /// Comparison operators do not associate: `a < b < c` is rejected.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::In
                | BinaryOp::NotIn
        )
    }
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "not",
            UnaryOp::Tilde => "~",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

#[derive(Debug)]
pub struct DictEntry {
    pub key: Expr,
    pub value: Expr,
    pub colon: Position,
}

#[derive(Debug)]
pub enum Arg {
    Positional(Expr),
    Named { name: String, pos: Position, value: Expr },
    Star { pos: Position, value: Expr },
    StarStar { pos: Position, value: Expr },
}

impl Arg {
    pub fn pos(&self) -> Position {
        match self {
            Arg::Positional(e) => e.pos(),
            Arg::Named { pos, .. } | Arg::Star { pos, .. } | Arg::StarStar { pos, .. } => *pos,
        }
    }
}

#[derive(Debug)]
pub enum Param {
    /// `x`
    Required(Ident),
    /// `x=default`
    Optional { name: Ident, default: Expr },
    /// `*` or `*args`
    Star { pos: Position, name: Option<Ident> },
    /// `**kwargs`
    StarStar { pos: Position, name: Ident },
}

#[derive(Debug)]
pub enum Clause {
    For { vars: Expr, iterable: Expr, pos: Position },
    If { cond: Expr, pos: Position },
}

#[derive(Debug)]
pub enum ComprehensionBody {
    Elem(Expr),
    Entry(DictEntry),
}

#[derive(Debug)]
pub struct Comprehension {
    pub body: ComprehensionBody,
    pub clauses: Vec<Clause>,
    pub pos: Position,
}

impl Comprehension {
    /// `{k: v for ...}` rather than `[x for ...]`.
    pub fn is_dict(&self) -> bool {
        matches!(self.body, ComprehensionBody::Entry(_))
    }
}

#[derive(Debug)]
pub struct Lambda {
    pub params: Vec<Param>,
    pub body: Expr,
    pub pos: Position,
    pub function: Cell<Option<FunctionId>>,
}

#[derive(Debug)]
pub enum Expr {
    Ident(Ident),
    Literal {
        value: Literal,
        pos: Position,
    },
    List {
        elems: Vec<Expr>,
        pos: Position,
    },
    Tuple {
        elems: Vec<Expr>,
        pos: Position,
    },
    Dict {
        entries: Vec<DictEntry>,
        pos: Position,
    },
    Unary {
        op: UnaryOp,
        x: Box<Expr>,
        pos: Position,
    },
    Binary {
        op: BinaryOp,
        x: Box<Expr>,
        y: Box<Expr>,
        op_pos: Position,
    },
    Dot {
        x: Box<Expr>,
        name: String,
        dot: Position,
    },
    Index {
        x: Box<Expr>,
        y: Box<Expr>,
        lbrack: Position,
    },
    Slice {
        x: Box<Expr>,
        lo: Option<Box<Expr>>,
        hi: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
        lbrack: Position,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
        lparen: Position,
    },
    Comprehension(Box<Comprehension>),
    CondExpr {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
        pos: Position,
    },
    Lambda(Box<Lambda>),
    Paren {
        x: Box<Expr>,
        pos: Position,
    },
}

impl Expr {
    /// Start position of the expression in the source.
    pub fn pos(&self) -> Position {
        match self {
            Expr::Ident(id) => id.pos,
            Expr::Literal { pos, .. }
            | Expr::List { pos, .. }
            | Expr::Tuple { pos, .. }
            | Expr::Dict { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Paren { pos, .. } => *pos,
            Expr::Binary { x, .. }
            | Expr::Dot { x, .. }
            | Expr::Index { x, .. }
            | Expr::Slice { x, .. } => x.pos(),
            Expr::Call { func, .. } => func.pos(),
            Expr::CondExpr { then, .. } => then.pos(),
            Expr::Comprehension(c) => c.pos,
            Expr::Lambda(l) => l.pos,
        }
    }

    /// Strips any number of enclosing parentheses.
    pub fn unparen(&self) -> &Expr {
        let mut e = self;
        while let Expr::Paren { x, .. } = e {
            e = x;
        }
        e
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Break,
    Continue,
    Pass,
}

impl BranchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchKind::Break => "break",
            BranchKind::Continue => "continue",
            BranchKind::Pass => "pass",
        }
    }
}

#[derive(Debug)]
pub struct Def {
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub pos: Position,
    pub function: Cell<Option<FunctionId>>,
}

#[derive(Debug)]
pub struct Load {
    pub module: String,
    pub module_pos: Position,
    /// Exported names, parallel to `to`.
    pub from: Vec<Ident>,
    pub to: Vec<Ident>,
    pub pos: Position,
}

#[derive(Debug)]
pub enum Stmt {
    Expr(Expr),
    Branch {
        kind: BranchKind,
        pos: Position,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
        pos: Position,
    },
    /// `lhs = rhs` when `op` is `None`, else `lhs op= rhs`.
    Assign {
        op: Option<BinaryOp>,
        lhs: Expr,
        rhs: Expr,
        op_pos: Position,
    },
    Def(Box<Def>),
    For {
        vars: Expr,
        iterable: Expr,
        body: Vec<Stmt>,
        pos: Position,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        pos: Position,
    },
    Return {
        result: Option<Expr>,
        pos: Position,
    },
    Load(Box<Load>),
}

impl Stmt {
    pub fn pos(&self) -> Position {
        match self {
            Stmt::Expr(e) => e.pos(),
            Stmt::Assign { lhs, .. } => lhs.pos(),
            Stmt::Def(def) => def.pos,
            Stmt::Load(load) => load.pos,
            Stmt::Branch { pos, .. }
            | Stmt::If { pos, .. }
            | Stmt::For { pos, .. }
            | Stmt::While { pos, .. }
            | Stmt::Return { pos, .. } => *pos,
        }
    }
}

/// Doc string of a function body: a leading string literal statement.
pub fn doc_string(body: &[Stmt]) -> Option<&str> {
    match body.first() {
        Some(Stmt::Expr(Expr::Literal {
            value: Literal::Str(s), ..
        })) => Some(s),
        _ => None,
    }
}
