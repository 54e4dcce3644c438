//! Abstract syntax tree.
//!
//! Nodes own their children outright; there are no back-references and
//! no cycles. Every expression carries the value type resolved for it
//! during parsing and an lvalue flag, which is what the code generator
//! consults when it decides between an address and a loaded value.

use crate::symtab::{ScopeId, SymbolTable};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Assign,
    LogOr,
    LogAnd,
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// `&expr`
    AddrOf,
    /// `*expr`
    Deref,
    /// `!expr`
    Not,
    /// `-expr`
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Binop {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        val: Box<Expr>,
    },
    IntLit(u64),
    StrLit(String),
    Ident(String),
    Cast {
        target: Type,
        val: Box<Expr>,
    },
    SizeOf(Type),
    Call {
        /// Address-producing expression for the callee. A direct call
        /// is wrapped in `AddrOf` by the parser so the generator can
        /// emit a call by name.
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub vtype: Type,
    pub lvalue: bool,
}

impl Expr {
    pub fn new(kind: ExprKind, vtype: Type) -> Self {
        Expr {
            kind,
            vtype,
            lvalue: false,
        }
    }
}

/// A brace-delimited statement list with its own scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub scope: ScopeId,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    VarDef {
        name: String,
        init: Option<Expr>,
    },
    FuncDef {
        name: String,
        body: Block,
    },
    /// Raw assembly text, emitted verbatim.
    Asm(String),
    Return {
        value: Option<Expr>,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        init: Box<Stmt>,
        cond: Expr,
        update: Box<Stmt>,
        body: Block,
    },
    Label(String),
    Goto(String),
}

/// A parsed compilation unit: the global block plus the scope arena
/// built while parsing it. The code generator resolves variable sizes
/// through the arena, so both travel together.
#[derive(Debug)]
pub struct Program {
    pub root: Block,
    pub symtab: SymbolTable,
}
