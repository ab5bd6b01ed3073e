use std::rc::Rc;

use serde::Serialize;

use crate::expr::Expr;
use crate::token::Token;

/// A named function or method: `IDENT "(" parameters? ")" block`.
///
/// Shared behind an `Rc` so that every closure created from the same
/// declaration points at one body instead of cloning the subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    pub name: Token,

    /// Parameter name tokens (arity ≤ 255).
    pub params: Vec<Token>,

    pub body: Vec<Stmt>,
}

/// `class Name (< Super)? { method* }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDecl {
    pub name: Token,

    /// Always an [`Expr::Variable`] when present.
    pub superclass: Option<Expr>,

    pub methods: Vec<Rc<FunctionDecl>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    Expression(Expr),

    Print(Expr),

    /// `var` declaration with optional initializer.
    Var {
        name: Token,
        initializer: Option<Expr>,
    },

    /// `{ ... }`; `line` is that of the opening brace.
    Block { statements: Vec<Stmt>, line: usize },

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `while` loop; `for` loops are desugared into this form, with the
    /// increment kept apart so it still runs after a `continue`.
    While {
        condition: Expr,
        body: Box<Stmt>,
        increment: Option<Expr>,
    },

    Function(Rc<FunctionDecl>),

    Class(ClassDecl),

    Return {
        /// The `return` keyword token, for runtime error locations.
        keyword: Token,
        value: Option<Expr>,
    },

    Break { keyword: Token },

    Continue { keyword: Token },
}

impl Stmt {
    /// Source line of the statement, for diagnostics.
    pub fn line(&self) -> usize {
        match self {
            Stmt::Expression(expr) | Stmt::Print(expr) => expr.line(),
            Stmt::Var { name, .. } => name.line,
            Stmt::Block { line, .. } => *line,
            Stmt::If { condition, .. } | Stmt::While { condition, .. } => condition.line(),
            Stmt::Function(declaration) => declaration.name.line,
            Stmt::Class(class) => class.name.line,
            Stmt::Return { keyword, .. }
            | Stmt::Break { keyword }
            | Stmt::Continue { keyword } => keyword.line,
        }
    }
}
