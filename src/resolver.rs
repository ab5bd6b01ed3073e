//! Static resolver pass for the **Rill** interpreter.
//!
//! This resolver does two things in one AST walk:
//! 1. Mirrors the runtime scope structure (stack of name sets, one per block,
//!    function call, `this` frame and `super` frame) and tells the
//!    interpreter, for *each* variable, `this` or `super` occurrence, how many
//!    scopes separate it from its declaration. Names found in no scope are
//!    globals and are looked up dynamically.
//! 2. Reports the few errors that are visible without running anything:
//!    `this`/`super` outside a class and `super` in a class without a
//!    superclass.
//!
//! Control-flow misuse (`break` outside a loop, top-level `return`) is left to
//! the interpreter, which reports it when the statement actually executes.

use std::collections::HashSet;

use crate::error::{Result, RillError};
use crate::expr::{Expr, ExprId};
use crate::interpreter::Interpreter;
use crate::stack::ensure_sufficient_stack;
use crate::stmt::{ClassDecl, FunctionDecl, Stmt};
use crate::token::Token;
use log::{debug, info};

/// Which kind of class body we are in. Used to validate `this` / `super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Resolver: tracks scopes and *records* binding distances by calling back
/// into the interpreter.
pub struct Resolver<'interp, 'out> {
    interpreter: &'interp mut Interpreter<'out>,
    scopes: Vec<HashSet<String>>,
    current_class: ClassType,
}

impl<'interp, 'out> Resolver<'interp, 'out> {
    /// Create a new resolver bound to the given interpreter.
    pub fn new(interpreter: &'interp mut Interpreter<'out>) -> Self {
        info!("Resolver instantiated");
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_class: ClassType::None,
        }
    }

    /// Walk all top-level statements.
    pub fn resolve(&mut self, statements: &[Stmt]) -> Result<()> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );
        for stmt in statements {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        ensure_sufficient_stack(|| self.resolve_stmt_inner(stmt))
    }

    fn resolve_stmt_inner(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block { statements, .. } => {
                self.begin_scope();
                let result = statements.iter().try_for_each(|s| self.resolve_stmt(s));
                self.end_scope();
                result?;
            }

            Stmt::Var { name, initializer } => {
                // The initializer still sees an enclosing binding of the same name.
                if let Some(expr) = initializer {
                    self.resolve_expr(expr)?;
                }
                self.declare(name);
            }

            Stmt::Function(declaration) => {
                // Declared before the body so the function can call itself.
                self.declare(&declaration.name);
                self.resolve_function(declaration)?;
            }

            Stmt::Class(class) => self.resolve_class(class)?,

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr)?;
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(then_branch)?;
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb)?;
                }
            }

            Stmt::While {
                condition,
                body,
                increment,
            } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(body)?;
                if let Some(inc) = increment {
                    self.resolve_expr(inc)?;
                }
            }

            Stmt::Return { value, .. } => {
                if let Some(expr) = value {
                    self.resolve_expr(expr)?;
                }
            }

            Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
        Ok(())
    }

    fn resolve_class(&mut self, class: &ClassDecl) -> Result<()> {
        debug!("Resolving class '{}'", class.name.lexeme);

        let enclosing = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(&class.name);

        if let Some(superclass) = &class.superclass {
            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass)?;

            self.begin_scope();
            self.declare_str("super");
        }

        self.begin_scope();
        self.declare_str("this");

        let result = class
            .methods
            .iter()
            .try_for_each(|method| self.resolve_function(method));

        self.end_scope();

        if class.superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing;
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) -> Result<()> {
        ensure_sufficient_stack(|| self.resolve_expr_inner(expr))
    }

    fn resolve_expr_inner(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Literal { .. } => {}

            Expr::Grouping(inner) => {
                self.resolve_expr(inner)?;
            }

            Expr::Unary { right, .. } => {
                self.resolve_expr(right)?;
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)?;
            }

            Expr::Variable { id, name } => {
                self.resolve_local(*id, &name.lexeme);
            }

            Expr::Assign { id, name, value } => {
                self.resolve_expr(value)?;
                self.resolve_local(*id, &name.lexeme);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee)?;
                for arg in arguments {
                    self.resolve_expr(arg)?;
                }
            }

            Expr::Get { object, .. } => self.resolve_expr(object)?,

            Expr::Set { object, value, .. } => {
                self.resolve_expr(value)?;
                self.resolve_expr(object)?;
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    return Err(outside_class(keyword));
                }
                self.resolve_local(*id, "this");
            }

            Expr::Super { id, keyword, .. } => match self.current_class {
                ClassType::None => return Err(outside_class(keyword)),
                ClassType::Class => {
                    return Err(RillError::resolve(
                        keyword.line,
                        "Can't use 'super' in a class with no superclass.",
                    ))
                }
                ClassType::Subclass => self.resolve_local(*id, "super"),
            },
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// One scope holds both the parameters and the top level of the body,
    /// matching the single environment a call creates.
    fn resolve_function(&mut self, declaration: &FunctionDecl) -> Result<()> {
        self.begin_scope();
        for param in &declaration.params {
            self.declare(param);
        }
        let result = declaration
            .body
            .iter()
            .try_for_each(|stmt| self.resolve_stmt(stmt));
        self.end_scope();

        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Redeclaring a name in the same scope is allowed.
    fn declare(&mut self, name: &Token) {
        self.declare_str(&name.lexeme);
    }

    fn declare_str(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding-distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this occurrence as either a local at depth `d`, or a global if
    /// it is not found in *any* scope.
    fn resolve_local(&mut self, id: ExprId, name: &str) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains(name) {
                debug!("Resolved '{}' at depth {}", name, depth);
                self.interpreter.note_local(id, depth);
                return;
            }
        }

        debug!("Resolved '{}' as global", name);
    }
}

fn outside_class(keyword: &Token) -> RillError {
    RillError::resolve(
        keyword.line,
        format!("Can't use '{}' outside of a class.", keyword.lexeme),
    )
}
