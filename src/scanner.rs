use phf::phf_map;

use crate::error::TarnError;
use crate::token::{Literal, Token, TokenType};

/// Check if a character can start an identifier
pub fn is_identifier_start(c: char) -> bool {
    !c.is_ascii_digit() && (c.is_alphabetic() || c == '_')
}

/// Check if a character can continue an identifier
pub fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and" => TokenType::And,
    "break" => TokenType::Break,
    "catch" => TokenType::Catch,
    "class" => TokenType::Class,
    "do" => TokenType::Do,
    "else" => TokenType::Else,
    "false" => TokenType::False,
    "for" => TokenType::For,
    "fun" => TokenType::Fun,
    "if" => TokenType::If,
    "let" => TokenType::Let,
    "nil" => TokenType::Nil,
    "or" => TokenType::Or,
    "panic" => TokenType::Panic,
    "print" => TokenType::Print,
    "return" => TokenType::Return,
    "super" => TokenType::Super,
    "this" => TokenType::This,
    "true" => TokenType::True,
    "try" => TokenType::Try,
    "var" => TokenType::Var,
    "while" => TokenType::While,
};

pub struct Scanner<'a> {
    source: &'a str,
    start: usize,
    current: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token, TarnError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current > self.source.len() {
                return None;
            }

            if self.is_at_end() {
                let span = self.current..self.current;
                self.current += 1;
                return Some(Ok(Token {
                    token_type: TokenType::Eof,
                    lexeme: String::new(),
                    literal: None,
                    line: self.line,
                    span,
                }));
            }

            self.start = self.current;
            let c = self.advance();

            match c {
                ' ' | '\r' | '\t' => continue,
                '\n' => {
                    self.line += 1;
                    continue;
                }
                '(' => return Some(Ok(self.add_token(TokenType::LeftParen))),
                ')' => return Some(Ok(self.add_token(TokenType::RightParen))),
                '{' => return Some(Ok(self.add_token(TokenType::LeftBrace))),
                '}' => return Some(Ok(self.add_token(TokenType::RightBrace))),
                '[' => return Some(Ok(self.add_token(TokenType::LeftBracket))),
                ']' => return Some(Ok(self.add_token(TokenType::RightBracket))),
                ',' => return Some(Ok(self.add_token(TokenType::Comma))),
                '.' => return Some(Ok(self.add_token(TokenType::Dot))),
                '-' => return Some(Ok(self.add_token(TokenType::Minus))),
                '+' => return Some(Ok(self.add_token(TokenType::Plus))),
                ';' => return Some(Ok(self.add_token(TokenType::Semicolon))),
                '*' => return Some(Ok(self.add_token(TokenType::Star))),
                '?' => return Some(Ok(self.add_token(TokenType::Question))),
                ':' => return Some(Ok(self.add_token(TokenType::Colon))),
                '/' => {
                    if self.match_char('/') {
                        while self.peek() != Some('\n') && !self.is_at_end() {
                            self.advance();
                        }
                        continue;
                    } else if self.match_char('*') {
                        if let Err(e) = self.block_comment() {
                            return Some(Err(e));
                        }
                        continue;
                    } else {
                        return Some(Ok(self.add_token(TokenType::Slash)));
                    }
                }
                '!' => {
                    let token_type = if self.match_char('=') {
                        TokenType::BangEqual
                    } else {
                        TokenType::Bang
                    };
                    return Some(Ok(self.add_token(token_type)));
                }
                '=' => {
                    let token_type = if self.match_char('=') {
                        TokenType::EqualEqual
                    } else {
                        TokenType::Equal
                    };
                    return Some(Ok(self.add_token(token_type)));
                }
                '<' => {
                    // Maximal munch: `<=`, then `<-`, then `<`.
                    let token_type = if self.match_char('=') {
                        TokenType::LessEqual
                    } else if self.match_char('-') {
                        TokenType::LessMinus
                    } else {
                        TokenType::Less
                    };
                    return Some(Ok(self.add_token(token_type)));
                }
                '>' => {
                    let token_type = if self.match_char('=') {
                        TokenType::GreaterEqual
                    } else {
                        TokenType::Greater
                    };
                    return Some(Ok(self.add_token(token_type)));
                }
                '"' => return Some(self.string()),
                c if c.is_ascii_digit() => return Some(Ok(self.number())),
                c if is_identifier_start(c) => return Some(Ok(self.identifier())),
                _ => {
                    return Some(Err(TarnError::scan(
                        self.line,
                        format!("Unexpected character, '{}'.", c),
                    )));
                }
            }
        }
    }
}

impl<'a> Scanner<'a> {
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current..]
            .chars()
            .next()
            .unwrap_or('\0');
        self.current += c.len_utf8();
        c
    }

    fn peek(&self) -> Option<char> {
        self.source[self.current..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.current..].chars();
        chars.next();
        chars.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn add_token(&self, token_type: TokenType) -> Token {
        Token {
            token_type,
            lexeme: self.source[self.start..self.current].to_string(),
            literal: None,
            line: self.line,
            span: self.start..self.current,
        }
    }

    fn add_token_with_literal(&self, token_type: TokenType, literal: Literal) -> Token {
        Token {
            token_type,
            lexeme: self.source[self.start..self.current].to_string(),
            literal: Some(literal),
            line: self.line,
            span: self.start..self.current,
        }
    }

    fn identifier(&mut self) -> Token {
        while self.peek().is_some_and(is_identifier_char) {
            self.advance();
        }

        let text = &self.source[self.start..self.current];
        let token_type = KEYWORDS
            .get(text)
            .copied()
            .unwrap_or(TokenType::Identifier);
        self.add_token(token_type)
    }

    fn number(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        // Fractional part only when the dot is followed by a digit, so
        // `1.foo()` still scans as number, dot, identifier.
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let value: f64 = self.source[self.start..self.current]
            .parse()
            .unwrap_or_default();
        self.add_token_with_literal(TokenType::Number, Literal::Number(value))
    }

    fn string(&mut self) -> Result<Token, TarnError> {
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            if c == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            return Err(TarnError::scan(self.line, "Unterminated string."));
        }

        self.advance();

        // No escape sequences; the value is the raw text between the quotes.
        let value = self.source[self.start + 1..self.current - 1].to_string();
        Ok(self.add_token_with_literal(TokenType::String, Literal::String(value)))
    }

    fn block_comment(&mut self) -> Result<(), TarnError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => return Err(TarnError::scan(self.line, "Unterminated block comment.")),
                Some('/') if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    depth += 1;
                }
                Some('*') if self.peek_next() == Some('/') => {
                    self.advance();
                    self.advance();
                    depth -= 1;
                }
                Some('\n') => {
                    self.line += 1;
                    self.advance();
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<Token> {
        Scanner::new(source)
            .collect::<Result<Vec<_>, _>>()
            .expect("scan should succeed")
    }

    fn types(source: &str) -> Vec<TokenType> {
        scan(source).into_iter().map(|t| t.token_type).collect()
    }

    // === single and double character tokens ===

    #[test]
    fn scans_punctuation() {
        assert_eq!(
            types("(){}[],.;"),
            vec![
                TokenType::LeftParen,
                TokenType::RightParen,
                TokenType::LeftBrace,
                TokenType::RightBrace,
                TokenType::LeftBracket,
                TokenType::RightBracket,
                TokenType::Comma,
                TokenType::Dot,
                TokenType::Semicolon,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn scans_operators() {
        assert_eq!(
            types("+ - * / ! != = == > >= ? :"),
            vec![
                TokenType::Plus,
                TokenType::Minus,
                TokenType::Star,
                TokenType::Slash,
                TokenType::Bang,
                TokenType::BangEqual,
                TokenType::Equal,
                TokenType::EqualEqual,
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Question,
                TokenType::Colon,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn scans_less_family_by_maximal_munch() {
        assert_eq!(
            types("< <= <-"),
            vec![
                TokenType::Less,
                TokenType::LessEqual,
                TokenType::LessMinus,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn adjacent_less_minus_is_append_token() {
        // `a<-b` is append; `a < -b` keeps the comparison.
        assert_eq!(
            types("a<-b"),
            vec![
                TokenType::Identifier,
                TokenType::LessMinus,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
        assert_eq!(
            types("a < -b"),
            vec![
                TokenType::Identifier,
                TokenType::Less,
                TokenType::Minus,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    // === literals ===

    #[test]
    fn scans_integer_and_decimal_numbers() {
        let tokens = scan("42 3.14");
        assert_eq!(tokens[0].literal, Some(Literal::Number(42.0)));
        assert_eq!(tokens[1].literal, Some(Literal::Number(3.14)));
    }

    #[test]
    fn trailing_dot_is_not_part_of_number() {
        assert_eq!(
            types("1."),
            vec![TokenType::Number, TokenType::Dot, TokenType::Eof]
        );
    }

    #[test]
    fn scans_string_literal() {
        let tokens = scan("\"hello\"");
        assert_eq!(tokens[0].token_type, TokenType::String);
        assert_eq!(tokens[0].literal, Some(Literal::String("hello".to_string())));
        assert_eq!(tokens[0].lexeme, "\"hello\"");
    }

    #[test]
    fn string_may_span_lines() {
        let tokens = scan("\"a\nb\"");
        assert_eq!(tokens[0].literal, Some(Literal::String("a\nb".to_string())));
        // Line of a multi-line string is where it closes.
        assert_eq!(tokens[0].line, 2);
    }

    #[test]
    fn unterminated_string_errors() {
        let result: Result<Vec<_>, _> = Scanner::new("\"abc").collect();
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "[line 1] Error: Unterminated string.");
    }

    // === identifiers and keywords ===

    #[test]
    fn scans_keywords() {
        assert_eq!(
            types("and break catch class do else false for fun if let nil or panic print return super this true try var while"),
            vec![
                TokenType::And,
                TokenType::Break,
                TokenType::Catch,
                TokenType::Class,
                TokenType::Do,
                TokenType::Else,
                TokenType::False,
                TokenType::For,
                TokenType::Fun,
                TokenType::If,
                TokenType::Let,
                TokenType::Nil,
                TokenType::Or,
                TokenType::Panic,
                TokenType::Print,
                TokenType::Return,
                TokenType::Super,
                TokenType::This,
                TokenType::True,
                TokenType::Try,
                TokenType::Var,
                TokenType::While,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keyword_prefix_is_identifier() {
        let tokens = scan("variable classes");
        assert_eq!(tokens[0].token_type, TokenType::Identifier);
        assert_eq!(tokens[1].token_type, TokenType::Identifier);
    }

    #[test]
    fn scans_underscore_and_unicode_identifiers() {
        let tokens = scan("_tmp żółw");
        assert_eq!(tokens[0].token_type, TokenType::Identifier);
        assert_eq!(tokens[0].lexeme, "_tmp");
        assert_eq!(tokens[1].token_type, TokenType::Identifier);
        assert_eq!(tokens[1].lexeme, "żółw");
    }

    // === comments and whitespace ===

    #[test]
    fn line_comment_is_skipped() {
        assert_eq!(
            types("1 // the rest is gone\n2"),
            vec![TokenType::Number, TokenType::Number, TokenType::Eof]
        );
    }

    #[test]
    fn block_comment_is_skipped_and_nests() {
        assert_eq!(
            types("1 /* outer /* inner */ still outer */ 2"),
            vec![TokenType::Number, TokenType::Number, TokenType::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment_errors() {
        let result: Result<Vec<_>, _> = Scanner::new("/* no end").collect();
        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "[line 1] Error: Unterminated block comment."
        );
    }

    // === line and span bookkeeping ===

    #[test]
    fn tracks_lines() {
        let tokens = scan("1\n2\n\n3");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[2].line, 4);
    }

    #[test]
    fn spans_index_into_source() {
        let source = "var answer = 42;";
        let tokens = scan(source);
        for token in &tokens {
            if token.token_type != TokenType::Eof {
                assert_eq!(&source[token.span.clone()], token.lexeme);
            }
        }
    }

    #[test]
    fn eof_is_always_last_and_only_once() {
        let tokens = scan("1 + 2");
        assert_eq!(tokens.last().map(|t| t.token_type), Some(TokenType::Eof));
        let eofs = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::Eof)
            .count();
        assert_eq!(eofs, 1);
    }

    #[test]
    fn empty_source_yields_single_eof() {
        let tokens = scan("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token_type, TokenType::Eof);
    }

    #[test]
    fn unexpected_character_names_the_character() {
        let result: Result<Vec<_>, _> = Scanner::new("@").collect();
        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "[line 1] Error: Unexpected character, '@'."
        );
    }

    #[test]
    fn scanning_continues_after_error_tokens() {
        let results: Vec<_> = Scanner::new("@ 1").collect();
        assert!(results[0].is_err());
        assert!(matches!(
            results[1].as_ref().map(|t| t.token_type),
            Ok(TokenType::Number)
        ));
    }
}
