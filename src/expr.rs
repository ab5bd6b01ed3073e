use serde::Serialize;

use crate::token::{LiteralValue, Token};

/// Stable identity of a name-resolving expression node.
///
/// The parser hands out one id per `Variable`, `Assign`, `This` and `Super`
/// node; the resolver records the scope distance of each id and the
/// interpreter looks it up again at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ExprId(pub usize);

/// **Abstract-Syntax-Tree node** representing every kind of *expression*.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// A literal constant: number, string, `true`, `false`, or `nil`.
    Literal { value: LiteralValue, line: usize },

    /// Parenthesised sub-expression: `"(" expression ")"`.
    Grouping(Box<Expr>),

    /// Variable access.
    Variable { id: ExprId, name: Token },

    /// Assignment expression: `identifier "=" expression`.
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },

    /// Short-circuiting `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Infix binary operator expression, e.g. `a + b`, `x <= y`.
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Prefix `!` or `-`.
    Unary { operator: Token, right: Box<Expr> },

    /// Function-, method- or constructor-call expression.
    Call {
        callee: Box<Expr>,
        /// The closing `)` token, retained for error reporting.
        paren: Token,
        arguments: Vec<Expr>,
    },

    /// object.property
    Get { object: Box<Expr>, name: Token },

    /// object.property = value
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },

    /// The `this` keyword inside a method.
    This { id: ExprId, keyword: Token },

    /// `super.method` inside a subclass method.
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
}

impl Expr {
    /// Best-effort source line of the expression, for diagnostics.
    pub fn line(&self) -> usize {
        match self {
            Expr::Literal { line, .. } => *line,

            Expr::Grouping(expr) => expr.line(),

            Expr::Variable { name, .. } | Expr::Assign { name, .. } => name.line,

            Expr::Logical { operator, .. }
            | Expr::Binary { operator, .. }
            | Expr::Unary { operator, .. } => operator.line,

            Expr::Call { paren, .. } => paren.line,

            Expr::Get { name, .. } | Expr::Set { name, .. } => name.line,

            Expr::This { keyword, .. } | Expr::Super { keyword, .. } => keyword.line,
        }
    }
}
