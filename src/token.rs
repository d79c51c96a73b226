use std::fmt;
use std::ops::Range;

/// Byte range of a lexeme in the source text. Unique per token occurrence,
/// which is what lets the resolver key its side table off tokens.
pub type Span = Range<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    Question,
    Colon,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    LessMinus,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Break,
    Catch,
    Class,
    Do,
    Else,
    False,
    For,
    Fun,
    If,
    Let,
    Nil,
    Or,
    Panic,
    Print,
    Return,
    Super,
    This,
    True,
    Try,
    Var,
    While,

    Eof,
}

/// Literal payload carried by number and string tokens, and the value form
/// the parser emits for `true`/`false`/`nil`.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Nil,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64's Display drops a trailing ".0", so 2.0 prints as "2"
            Literal::Number(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "{}", s),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
    pub span: Span,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.literal {
            Some(value) => write!(f, "{:?} {} {}", self.token_type, self.lexeme, value),
            None => write!(f, "{:?} {} None", self.token_type, self.lexeme),
        }
    }
}
