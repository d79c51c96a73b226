use thiserror::Error;

use crate::token::{Token, TokenType};

#[derive(Debug, Error)]
pub enum TarnError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("[line {line}] Error: {message}")]
    Scan { line: usize, message: String },

    #[error("[line {line}] Error{place}: {message}")]
    Parse {
        line: usize,
        place: String,
        message: String,
    },

    #[error("[line {line}] Error{place}: {message}")]
    Resolve {
        line: usize,
        place: String,
        message: String,
    },

    #[error("{message}\n[line {line}]")]
    Runtime { line: usize, message: String },
}

impl TarnError {
    pub fn scan(line: usize, message: impl Into<String>) -> Self {
        TarnError::Scan {
            line,
            message: message.into(),
        }
    }

    pub fn parse(token: &Token, message: impl Into<String>) -> Self {
        TarnError::Parse {
            line: token.line,
            place: place_of(token),
            message: message.into(),
        }
    }

    pub fn resolve(token: &Token, message: impl Into<String>) -> Self {
        TarnError::Resolve {
            line: token.line,
            place: place_of(token),
            message: message.into(),
        }
    }

    /// True for errors raised during execution, as opposed to the
    /// scan/parse/resolve stages. The driver picks its exit code off this.
    pub fn is_runtime(&self) -> bool {
        matches!(self, TarnError::Runtime { .. })
    }
}

fn place_of(token: &Token) -> String {
    if token.token_type == TokenType::Eof {
        " at end".to_string()
    } else {
        format!(" at '{}'", token.lexeme)
    }
}

/// Execution-stage error pinned to the token it happened at. Converted into
/// `TarnError::Runtime` once it reaches the facade.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub token: Token,
    pub message: String,
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> Self {
        RuntimeError {
            token: token.clone(),
            message: message.into(),
        }
    }
}

impl From<RuntimeError> for TarnError {
    fn from(error: RuntimeError) -> Self {
        TarnError::Runtime {
            line: error.token.line,
            message: error.message,
        }
    }
}
