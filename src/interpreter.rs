//! Tree-walking evaluator.
//!
//! Statements execute to a [`ControlSignal`] instead of unwinding with an
//! error: `break`, `continue` and `return` travel back up the Rust call stack
//! as ordinary values until the loop or call that consumes them. Real
//! failures use the `Err` side of [`Result`] and abort the program.
//!
//! Interpreted recursion maps onto native recursion. Every `execute` and
//! `evaluate` step grows the native stack on demand, and
//! [`InterpreterConfig::max_call_depth`] bounds how far a script may recurse
//! before it gets a `Stack overflow.` runtime error.
//!
//! Scopes are reference counted. Cycles between closures and the scopes they
//! capture are collected by [`crate::heap`] between statements that run
//! outside any call, at the end of every [`Interpreter::interpret`], and when
//! the interpreter is dropped. Values obtained from an interpreter should not
//! be used after it is gone.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};

use crate::environment::{EnvRef, Environment};
use crate::error::{Result, RillError};
use crate::expr::{Expr, ExprId};
use crate::heap::{self, HeapRef};
use crate::resolver::Resolver;
use crate::stack::ensure_sufficient_stack;
use crate::stmt::{ClassDecl, Stmt};
use crate::token::{LiteralValue, Token, TokenType};
use crate::value::{Callable, Class, Function, Instance, NativeFunction, Value};

/// Receives one line of program output per `print`.
pub type OutputSink<'out> = Box<dyn FnMut(&str) + 'out>;

/// Polled before every statement; returning `true` stops the program.
pub type InterruptHook<'out> = Box<dyn FnMut() -> bool + 'out>;

#[derive(Debug, Clone, Copy)]
pub struct InterpreterConfig {
    /// Maximum nesting of user function calls.
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
        }
    }
}

/// How a statement finished.
#[derive(Debug)]
pub enum ControlSignal {
    Normal,
    Break { line: usize },
    Continue { line: usize },
    Return { value: Value, line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Script,
    Function,
    Initializer,
}

/// Per-call bookkeeping for validating `return`, `break` and `continue`.
#[derive(Debug, Clone, Copy)]
struct CallFrame {
    kind: FrameKind,
    loop_depth: usize,
}

impl CallFrame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            loop_depth: 0,
        }
    }
}

pub struct Interpreter<'out> {
    globals: EnvRef,
    heap: HeapRef,
    environment: EnvRef,
    locals: HashMap<ExprId, usize>,
    frame: CallFrame,
    call_depth: usize,
    config: InterpreterConfig,
    output: OutputSink<'out>,
    interrupt: Option<InterruptHook<'out>>,
}

impl Default for Interpreter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'out> Interpreter<'out> {
    /// Creates an interpreter that prints to stdout.
    pub fn new() -> Self {
        Self::with_output(|line: &str| println!("{}", line))
    }

    /// Creates an interpreter that hands every printed line to `output`.
    /// Native functions such as `clock` are defined in its global scope.
    pub fn with_output(output: impl FnMut(&str) + 'out) -> Self {
        info!("Initializing Interpreter");

        let globals: EnvRef = Rc::new(RefCell::new(Environment::new()));

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::Callable(Callable::Native(Rc::new(NativeFunction {
                name: "clock".to_string(),
                arity: 0,
                func: |_args: &[Value]| {
                    let millis: i64 = chrono::Utc::now().timestamp_millis();
                    Ok(Value::Number(millis as f64 / 1000.0))
                },
            }))),
        );

        let heap: HeapRef = globals.borrow().heap();

        Self {
            environment: Rc::clone(&globals),
            globals,
            heap,
            locals: HashMap::new(),
            frame: CallFrame::new(FrameKind::Script),
            call_depth: 0,
            config: InterpreterConfig::default(),
            output: Box::new(output),
            interrupt: None,
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs the hook polled between statements.
    pub fn set_interrupt_hook(&mut self, hook: impl FnMut() -> bool + 'out) {
        self.interrupt = Some(Box::new(hook));
    }

    /// Called by the resolver for every local reference.
    pub fn note_local(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    /// Scopes created by this interpreter that are still allocated.
    pub fn live_scopes(&self) -> usize {
        self.heap.borrow().live_scopes()
    }

    /// Instances created by this interpreter that are still allocated.
    pub fn live_instances(&self) -> usize {
        self.heap.borrow().live_instances()
    }

    /// Resolves and then runs a program. The first runtime error aborts the
    /// rest of it.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        Resolver::new(self).resolve(statements)?;

        debug!("Interpreting {} statements", statements.len());

        let result = self.run_program(statements);
        heap::collect(&self.heap, &self.environment);

        if result.is_ok() {
            info!("Interpretation completed successfully");
        }
        result
    }

    fn run_program(&mut self, statements: &[Stmt]) -> Result<()> {
        for stmt in statements {
            match self.execute(stmt)? {
                ControlSignal::Normal => {}
                ControlSignal::Break { line } => return Err(outside_loop("break", line)),
                ControlSignal::Continue { line } => return Err(outside_loop("continue", line)),
                ControlSignal::Return { line, .. } => return Err(top_level_return(line)),
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    pub fn execute(&mut self, stmt: &Stmt) -> Result<ControlSignal> {
        ensure_sufficient_stack(|| self.execute_stmt(stmt))
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> Result<ControlSignal> {
        self.check_interrupt(stmt)?;

        // Outside any call every live value is reachable from the scope chain.
        if self.call_depth == 0 && self.heap.borrow().should_collect() {
            heap::collect(&self.heap, &self.environment);
        }

        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;
                let text: String = value.to_string();
                debug!("Printing: {}", text);
                (self.output)(&text);
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                self.environment.borrow_mut().define(&name.lexeme, value);
            }

            Stmt::Block { statements, .. } => {
                let scope: EnvRef = Environment::child_of(&self.environment);
                return self.execute_block(statements, scope);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.evaluate(condition)?) {
                    return self.execute(then_branch);
                } else if let Some(else_stmt) = else_branch {
                    return self.execute(else_stmt);
                }
            }

            Stmt::While {
                condition,
                body,
                increment,
            } => {
                self.frame.loop_depth += 1;
                let result = self.run_loop(condition, body, increment.as_ref());
                self.frame.loop_depth -= 1;
                return result;
            }

            Stmt::Function(declaration) => {
                debug!("Defining function '{}'", declaration.name.lexeme);
                let function = Function::new(
                    Rc::clone(declaration),
                    Rc::clone(&self.environment),
                    false,
                );
                self.environment.borrow_mut().define(
                    &declaration.name.lexeme,
                    Value::Callable(Callable::Function(Rc::new(function))),
                );
            }

            Stmt::Class(class) => self.execute_class(class)?,

            Stmt::Return { keyword, value } => {
                match self.frame.kind {
                    FrameKind::Script => return Err(top_level_return(keyword.line)),
                    FrameKind::Initializer if value.is_some() => {
                        return Err(RillError::runtime(
                            keyword.line,
                            "Can't return a value from an initializer.",
                        ))
                    }
                    FrameKind::Function | FrameKind::Initializer => {}
                }

                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                return Ok(ControlSignal::Return {
                    value,
                    line: keyword.line,
                });
            }

            Stmt::Break { keyword } => {
                if self.frame.loop_depth == 0 {
                    return Err(outside_loop("break", keyword.line));
                }
                return Ok(ControlSignal::Break { line: keyword.line });
            }

            Stmt::Continue { keyword } => {
                if self.frame.loop_depth == 0 {
                    return Err(outside_loop("continue", keyword.line));
                }
                return Ok(ControlSignal::Continue { line: keyword.line });
            }
        }

        Ok(ControlSignal::Normal)
    }

    /// Runs `statements` in `scope`, restoring the previous scope on every
    /// exit path.
    pub fn execute_block(&mut self, statements: &[Stmt], scope: EnvRef) -> Result<ControlSignal> {
        let previous: EnvRef = std::mem::replace(&mut self.environment, scope);
        let result = self.run_statements(statements);
        self.environment = previous;
        result
    }

    fn run_statements(&mut self, statements: &[Stmt]) -> Result<ControlSignal> {
        for stmt in statements {
            match self.execute(stmt)? {
                ControlSignal::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(ControlSignal::Normal)
    }

    fn run_loop(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        increment: Option<&Expr>,
    ) -> Result<ControlSignal> {
        while is_truthy(&self.evaluate(condition)?) {
            match self.execute(body)? {
                ControlSignal::Break { .. } => break,
                ControlSignal::Normal | ControlSignal::Continue { .. } => {}
                signal @ ControlSignal::Return { .. } => return Ok(signal),
            }

            if let Some(increment) = increment {
                self.evaluate(increment)?;
            }
        }

        Ok(ControlSignal::Normal)
    }

    fn execute_class(&mut self, class: &ClassDecl) -> Result<()> {
        debug!("Declaring class '{}'", class.name.lexeme);

        let superclass: Option<Rc<Class>> = match &class.superclass {
            Some(expr) => {
                if let Expr::Variable { name, .. } = expr {
                    if name.lexeme == class.name.lexeme {
                        return Err(RillError::runtime(
                            name.line,
                            "A class can't inherit from itself.",
                        ));
                    }
                }

                match self.evaluate(expr)? {
                    Value::Callable(Callable::Class(superclass)) => Some(superclass),
                    _ => {
                        return Err(RillError::runtime(
                            expr.line(),
                            "Superclass must be a class.",
                        ))
                    }
                }
            }
            None => None,
        };

        // Methods of a subclass close over an extra scope holding `super`.
        let method_scope: EnvRef = match &superclass {
            Some(superclass) => {
                let scope: EnvRef = Environment::child_of(&self.environment);
                scope.borrow_mut().define(
                    "super",
                    Value::Callable(Callable::Class(Rc::clone(superclass))),
                );
                scope
            }
            None => Rc::clone(&self.environment),
        };

        let methods: HashMap<String, Rc<Function>> = class
            .methods
            .iter()
            .map(|declaration| {
                let name: String = declaration.name.lexeme.clone();
                let is_initializer: bool = name == "init";
                let method = Function::new(
                    Rc::clone(declaration),
                    Rc::clone(&method_scope),
                    is_initializer,
                );
                (name, Rc::new(method))
            })
            .collect();

        let class_value = Class {
            name: class.name.lexeme.clone(),
            superclass,
            methods,
        };

        self.environment.borrow_mut().define(
            &class.name.lexeme,
            Value::Callable(Callable::Class(Rc::new(class_value))),
        );

        Ok(())
    }

    fn check_interrupt(&mut self, stmt: &Stmt) -> Result<()> {
        if let Some(hook) = self.interrupt.as_mut() {
            if hook() {
                info!("Execution interrupted by host");
                return Err(RillError::runtime(stmt.line(), "Execution interrupted."));
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal { value, .. } => Ok(literal_value(value)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Variable { id, name } => self.lookup_variable(*id, &name.lexeme, name.line),

            Expr::Assign { id, name, value } => {
                let value: Value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&distance) => Environment::assign_at(
                        &self.environment,
                        distance,
                        &name.lexeme,
                        value.clone(),
                        name.line,
                    )?,
                    None => {
                        self.globals
                            .borrow_mut()
                            .assign(&name.lexeme, value.clone(), name.line)?
                    }
                }

                Ok(value)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left: Value = self.evaluate(left)?;

                let short_circuit: bool = if operator.token_type == TokenType::OR {
                    is_truthy(&left)
                } else {
                    !is_truthy(&left)
                };

                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Unary { operator, right } => {
                let right: Value = self.evaluate(right)?;

                match operator.token_type {
                    TokenType::MINUS => match right {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(RillError::runtime(
                            operator.line,
                            "Operand must be a number.",
                        )),
                    },
                    TokenType::BANG => Ok(Value::Bool(!is_truthy(&right))),
                    _ => Err(RillError::runtime(
                        operator.line,
                        format!("Invalid unary operator '{}'.", operator.lexeme),
                    )),
                }
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee: Value = self.evaluate(callee)?;

                let mut args: Vec<Value> = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    args.push(self.evaluate(arg)?);
                }

                self.call_value(callee, args, paren.line)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Instance::get(&instance, &name.lexeme, name.line),
                _ => Err(RillError::runtime(
                    name.line,
                    "Only instances have properties.",
                )),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(RillError::runtime(name.line, "Only instances have fields."));
                };

                let value: Value = self.evaluate(value)?;
                instance.set(&name.lexeme, value.clone());
                Ok(value)
            }

            Expr::This { id, keyword } => self.lookup_variable(*id, "this", keyword.line),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value> {
        let left: Value = self.evaluate(left)?;
        let right: Value = self.evaluate(right)?;

        debug!("Binary {} on {} and {}", operator.lexeme, left, right);

        match operator.token_type {
            TokenType::PLUS => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => {
                    let mut joined = String::with_capacity(a.len() + b.len());
                    joined.push_str(&a);
                    joined.push_str(&b);
                    Ok(Value::String(joined.into()))
                }
                _ => Err(RillError::runtime(
                    operator.line,
                    "Operands must be two numbers or two strings.",
                )),
            },

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left == right)),
            TokenType::BANG_EQUAL => Ok(Value::Bool(left != right)),

            TokenType::MINUS
            | TokenType::STAR
            | TokenType::SLASH
            | TokenType::GREATER
            | TokenType::GREATER_EQUAL
            | TokenType::LESS
            | TokenType::LESS_EQUAL => {
                let (Value::Number(a), Value::Number(b)) = (left, right) else {
                    return Err(RillError::runtime(
                        operator.line,
                        "Operands must be numbers.",
                    ));
                };

                Ok(match operator.token_type {
                    TokenType::MINUS => Value::Number(a - b),
                    TokenType::STAR => Value::Number(a * b),
                    TokenType::SLASH => Value::Number(a / b),
                    TokenType::GREATER => Value::Bool(a > b),
                    TokenType::GREATER_EQUAL => Value::Bool(a >= b),
                    TokenType::LESS => Value::Bool(a < b),
                    _ => Value::Bool(a <= b),
                })
            }

            _ => Err(RillError::runtime(
                operator.line,
                format!("Invalid binary operator '{}'.", operator.lexeme),
            )),
        }
    }

    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> Result<Value> {
        let Some(&distance) = self.locals.get(&id) else {
            return Err(RillError::runtime(
                keyword.line,
                "Can't use 'super' outside of a class.",
            ));
        };

        let superclass: Value =
            Environment::get_at(&self.environment, distance, "super", keyword.line)?;

        // `this` lives in the scope just inside the one holding `super`.
        let receiver: Value = Environment::get_at(
            &self.environment,
            distance.saturating_sub(1),
            "this",
            keyword.line,
        )?;

        let (Value::Callable(Callable::Class(superclass)), Value::Instance(receiver)) =
            (superclass, receiver)
        else {
            return Err(RillError::runtime(
                keyword.line,
                "Invalid 'super' binding.",
            ));
        };

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Callable(Callable::BoundMethod(Rc::new(
                found.bind(&receiver),
            )))),
            None => Err(RillError::runtime(
                method.line,
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }

    fn lookup_variable(&self, id: ExprId, name: &str, line: usize) -> Result<Value> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, name, line),
            None => self.globals.borrow().get(name, line),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────────

    /// Checks callability and arity, then dispatches on the kind of callable.
    fn call_value(&mut self, callee: Value, args: Vec<Value>, line: usize) -> Result<Value> {
        let Value::Callable(callable) = callee else {
            return Err(RillError::runtime(
                line,
                "Can only call functions and classes.",
            ));
        };

        if args.len() != callable.arity() {
            return Err(RillError::runtime(
                line,
                format!(
                    "Expected {} arguments but got {}.",
                    callable.arity(),
                    args.len()
                ),
            ));
        }

        debug!("Calling {} with {} argument(s)", callable, args.len());

        match callable {
            Callable::Native(native) => {
                let result: Value =
                    (native.func)(&args).map_err(|msg| RillError::runtime(line, msg))?;
                debug!("Native function '{}' returned: {}", native.name, result);
                Ok(result)
            }

            Callable::Function(function) => self.call_function(&function, args, line),

            Callable::BoundMethod(bound) => self.call_function(&bound.method, args, line),

            Callable::Class(class) => {
                let instance: Rc<Instance> = Rc::new(Instance::new(Rc::clone(&class)));
                self.heap.borrow_mut().track_instance(&instance);

                if let Some(initializer) = class.find_method("init") {
                    let bound = initializer.bind(&instance);
                    self.call_function(&bound.method, args, line)?;
                }

                Ok(Value::Instance(instance))
            }
        }
    }

    /// Runs a user function body in a fresh scope parented to its closure.
    fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        line: usize,
    ) -> Result<Value> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(RillError::runtime(line, "Stack overflow."));
        }

        let scope: EnvRef = Environment::child_of(&function.closure);
        {
            let mut scope = scope.borrow_mut();
            for (param, arg) in function.declaration.params.iter().zip(args) {
                scope.define(&param.lexeme, arg);
            }
        }

        let kind: FrameKind = if function.is_initializer {
            FrameKind::Initializer
        } else {
            FrameKind::Function
        };

        let saved: CallFrame = std::mem::replace(&mut self.frame, CallFrame::new(kind));
        self.call_depth += 1;
        let result = self.execute_block(&function.declaration.body, scope);
        self.call_depth -= 1;
        self.frame = saved;

        let value: Value = match result? {
            ControlSignal::Normal => Value::Nil,
            ControlSignal::Return { value, .. } => value,
            ControlSignal::Break { line } => return Err(outside_loop("break", line)),
            ControlSignal::Continue { line } => return Err(outside_loop("continue", line)),
        };

        if function.is_initializer {
            return Environment::get_at(&function.closure, 0, "this", line);
        }

        debug!("Function '{}' returned: {}", function.name(), value);
        Ok(value)
    }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        heap::release_all(&self.heap, &self.globals);
    }
}

fn literal_value(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::Str(s) => Value::String(Rc::from(s.as_str())),
        LiteralValue::True => Value::Bool(true),
        LiteralValue::False => Value::Bool(false),
        LiteralValue::Nil => Value::Nil,
    }
}

/// `nil` and `false` are falsy; everything else, `0` and `''` included, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Bool(b) => *b,
        _ => true,
    }
}

fn outside_loop(keyword: &str, line: usize) -> RillError {
    RillError::runtime(line, format!("Can't use '{}' outside of a loop.", keyword))
}

fn top_level_return(line: usize) -> RillError {
    RillError::runtime(line, "Can't return from top-level code.")
}
