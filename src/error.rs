//! Centralised error hierarchy for the **Rill interpreter**.
//!
//! Every stage (scanner, parser, resolver, runtime, CLI) converts its failure
//! modes into one of the variants defined here. The diagnostic variants all
//! carry a message and the 1-based source line they refer to, so callers can
//! report them uniformly.
//!
//! The module **does not** print diagnostics itself.

use std::io;
use thiserror::Error;

use log::info;

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RillError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human-readable description.
        message: String,

        /// 1-based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error: {message}")]
    Parse { message: String, line: usize },

    /// Static-analysis failure found by the resolver before execution.
    #[error("[line {line}] Error: {message}")]
    Resolve { message: String, line: usize },

    /// Runtime evaluation error.
    #[error("[line {line}] Error: {message}")]
    Runtime { message: String, line: usize },

    /// Wrapper around `std::io::Error` (transparent). Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF-8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl RillError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        RillError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", line, message);

        RillError::Parse { message, line }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", line, message);

        RillError::Resolve { message, line }
    }

    /// Helper constructor for the **interpreter**.
    pub fn runtime<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Runtime error: line={}, msg={}", line, message);

        RillError::Runtime { message, line }
    }

    /// Source line of a diagnostic, `None` for I/O and decoding failures.
    pub fn line(&self) -> Option<usize> {
        match self {
            RillError::Lex { line, .. }
            | RillError::Parse { line, .. }
            | RillError::Resolve { line, .. }
            | RillError::Runtime { line, .. } => Some(*line),
            RillError::Io(_) | RillError::Utf8(_) => None,
        }
    }

    /// The bare message without the `[line N]` prefix.
    pub fn message(&self) -> String {
        match self {
            RillError::Lex { message, .. }
            | RillError::Parse { message, .. }
            | RillError::Resolve { message, .. }
            | RillError::Runtime { message, .. } => message.clone(),
            RillError::Io(e) => e.to_string(),
            RillError::Utf8(e) => e.to_string(),
        }
    }

    /// `true` for errors raised while executing the program.
    pub fn is_runtime(&self) -> bool {
        matches!(self, RillError::Runtime { .. })
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, RillError>;
