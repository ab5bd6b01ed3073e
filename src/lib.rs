//! Rill: a tree-walking interpreter for a small dynamically-typed scripting
//! language with closures, classes and single inheritance.
//!
//! The pipeline is `lex` → `parse` → `interpret`; [`run`] chains all three.

pub mod ast_printer;
pub mod environment;
pub mod error;
pub mod expr;
pub mod heap;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod scanner;
mod stack;
pub mod stmt;
pub mod token;
pub mod value;

pub use error::{Result, RillError};
pub use interpreter::{Interpreter, InterpreterConfig};
pub use stmt::Stmt;
pub use token::Token;
pub use value::Value;

/// Tokenizes `source`. The first lexical error aborts.
pub fn lex(source: &str) -> Result<Vec<Token>> {
    scanner::lex(source)
}

/// Parses a token stream into a program, collecting every syntax error.
pub fn parse(tokens: Vec<Token>) -> std::result::Result<Vec<Stmt>, Vec<RillError>> {
    parser::Parser::new(tokens).parse()
}

/// Runs `statements` on a fresh interpreter whose `print` output goes to
/// `output`.
pub fn interpret<'out>(statements: &[Stmt], output: impl FnMut(&str) + 'out) -> Result<()> {
    Interpreter::with_output(output).interpret(statements)
}

/// Lexes, parses and runs `source`. Lex and runtime failures come back as a
/// single error, parse failures as all of them.
pub fn run<'out>(
    source: &str,
    output: impl FnMut(&str) + 'out,
) -> std::result::Result<(), Vec<RillError>> {
    let tokens: Vec<Token> = lex(source).map_err(|e| vec![e])?;
    let statements: Vec<Stmt> = parse(tokens)?;

    interpret(&statements, output).map_err(|e| vec![e])
}
