mod ast;
mod environment;
mod error;
mod interpreter;
mod parser;
mod resolver;
mod scanner;
mod token;
mod value;

use std::io::Write;

use log::debug;

pub use ast::{Expr, Stmt};
pub use error::TarnError;
pub use parser::Parser;
pub use resolver::Resolver;
pub use scanner::{Scanner, is_identifier_char, is_identifier_start};
pub use token::{Literal, Token, TokenType};
pub use value::Value;

/// A persistent evaluation session. The interpreter keeps its globals and
/// resolutions between calls, so a REPL can feed it one line at a time.
pub struct Tarn {
    interpreter: interpreter::Interpreter,
}

impl Default for Tarn {
    fn default() -> Self {
        Self::new()
    }
}

impl Tarn {
    pub fn new() -> Self {
        Self {
            interpreter: interpreter::Interpreter::new(),
        }
    }

    /// Run `source` through the full pipeline, writing program output to
    /// `stdout`. Each stage aborts the run on error; execution only starts
    /// on a clean resolve.
    pub fn run<O: Write>(&mut self, source: &str, mut stdout: O) -> Vec<TarnError> {
        let mut errors = Vec::new();

        let mut tokens = Vec::new();
        for result in scanner::Scanner::new(source) {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => errors.push(error),
            }
        }
        if !errors.is_empty() {
            return errors;
        }

        let mut parser = parser::Parser::new(tokens);
        let statements = parser.parse();
        errors.extend(parser.take_errors());
        if !errors.is_empty() {
            return errors;
        }

        let resolutions = match resolver::Resolver::new().resolve(&statements) {
            Ok(resolutions) => resolutions,
            Err(errors) => return errors,
        };
        self.interpreter.set_resolutions(resolutions);

        debug!("executing {} statements", statements.len());
        if let Err(error) = self.interpreter.interpret(&statements, &mut stdout) {
            errors.push(error);
        }
        errors
    }
}
