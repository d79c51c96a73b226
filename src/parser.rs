use crate::ast::{CatchClause, Expr, FunctionDecl, Stmt};
use crate::error::TarnError;
use crate::token::{Literal, Token, TokenType};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<TarnError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        statements
    }

    pub fn take_errors(&mut self) -> Vec<TarnError> {
        std::mem::take(&mut self.errors)
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_types(&[TokenType::Class]) {
            self.class_declaration()
        } else if self.check(&TokenType::Fun) && self.check_next(&TokenType::Identifier) {
            self.advance();
            self.function("function")
        } else if self.match_types(&[TokenType::Var]) {
            self.var_declaration(false)
        } else if self.match_types(&[TokenType::Let]) {
            self.var_declaration(true)
        } else {
            self.statement()
        };

        match result {
            Ok(stmt) => Some(stmt),
            Err(e) => {
                self.errors.push(e);
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> Result<Stmt, TarnError> {
        let name = self
            .consume(TokenType::Identifier, "Expected class name.")?
            .clone();

        let superclass = if self.match_types(&[TokenType::Less]) {
            let super_name = self
                .consume(TokenType::Identifier, "Expected superclass name.")?
                .clone();
            Some(Expr::Variable { name: super_name })
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expected '{' before class body.")?;

        let mut methods = Vec::new();
        let mut statics = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            // A `class` prefix inside the body marks a static method.
            if self.match_types(&[TokenType::Class]) {
                statics.push(self.method("static method")?);
            } else {
                methods.push(self.method("method")?);
            }
        }

        self.consume(TokenType::RightBrace, "Expected '}' after class body.")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
            statics,
        })
    }

    fn method(&mut self, kind: &str) -> Result<FunctionDecl, TarnError> {
        let name = self
            .consume(TokenType::Identifier, format!("Expected {} name.", kind))?
            .clone();

        // No parameter list makes the method a getter.
        let (params, is_getter) = if self.match_types(&[TokenType::LeftParen]) {
            let params = self.parameters()?;
            self.consume(TokenType::RightParen, "Expected ')' after parameters.")?;
            (params, false)
        } else {
            (Vec::new(), true)
        };

        self.consume(
            TokenType::LeftBrace,
            format!("Expected '{{' before {} body.", kind),
        )?;
        let body = self.block_statements()?;

        Ok(FunctionDecl {
            name,
            params,
            body,
            is_getter,
        })
    }

    fn function(&mut self, kind: &str) -> Result<Stmt, TarnError> {
        let name = self
            .consume(TokenType::Identifier, format!("Expected {} name.", kind))?
            .clone();

        self.consume(
            TokenType::LeftParen,
            format!("Expected '(' after {} name.", kind),
        )?;
        let params = self.parameters()?;
        self.consume(TokenType::RightParen, "Expected ')' after parameters.")?;

        self.consume(
            TokenType::LeftBrace,
            format!("Expected '{{' before {} body.", kind),
        )?;
        let body = self.block_statements()?;

        Ok(Stmt::Function {
            declaration: FunctionDecl {
                name,
                params,
                body,
                is_getter: false,
            },
        })
    }

    fn parameters(&mut self) -> Result<Vec<Token>, TarnError> {
        let mut params = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    let token = self.peek().clone();
                    self.errors.push(TarnError::parse(
                        &token,
                        "Cannot have more than 255 parameters.",
                    ));
                }
                let param = self
                    .consume(TokenType::Identifier, "Expected parameter name.")?
                    .clone();
                params.push(param);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        Ok(params)
    }

    fn var_declaration(&mut self, constant: bool) -> Result<Stmt, TarnError> {
        let name = self
            .consume(TokenType::Identifier, "Expected variable name.")?
            .clone();

        let initializer = if constant {
            self.consume(TokenType::Equal, "Expected '=' after constant name.")?;
            Some(self.expression()?)
        } else if self.match_types(&[TokenType::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::Semicolon,
            "Expected ';' after variable declaration.",
        )?;
        Ok(Stmt::Var {
            name,
            initializer,
            constant,
        })
    }

    fn statement(&mut self) -> Result<Stmt, TarnError> {
        if self.match_types(&[TokenType::Break]) {
            self.break_statement()
        } else if self.match_types(&[TokenType::Do]) {
            self.do_while_statement()
        } else if self.match_types(&[TokenType::For]) {
            self.for_statement()
        } else if self.match_types(&[TokenType::If]) {
            self.if_statement()
        } else if self.match_types(&[TokenType::Panic]) {
            self.panic_statement()
        } else if self.match_types(&[TokenType::Print]) {
            self.print_statement()
        } else if self.match_types(&[TokenType::Return]) {
            self.return_statement()
        } else if self.match_types(&[TokenType::Try]) {
            self.try_statement()
        } else if self.match_types(&[TokenType::While]) {
            self.while_statement()
        } else if self.match_types(&[TokenType::LeftBrace]) {
            Ok(Stmt::Block {
                statements: self.block_statements()?,
            })
        } else {
            self.expression_statement()
        }
    }

    fn break_statement(&mut self) -> Result<Stmt, TarnError> {
        let keyword = self.previous().clone();
        self.consume(TokenType::Semicolon, "Expected ';' after 'break'.")?;
        Ok(Stmt::Break { keyword })
    }

    fn do_while_statement(&mut self) -> Result<Stmt, TarnError> {
        let body = Box::new(self.statement()?);
        self.consume(TokenType::While, "Expected 'while' after do body.")?;
        self.consume(TokenType::LeftParen, "Expected '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after condition.")?;
        self.consume(TokenType::Semicolon, "Expected ';' after condition.")?;
        Ok(Stmt::DoWhile { body, condition })
    }

    fn for_statement(&mut self) -> Result<Stmt, TarnError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'for'.")?;

        let initializer = if self.match_types(&[TokenType::Semicolon]) {
            None
        } else if self.match_types(&[TokenType::Var]) {
            Some(self.var_declaration(false)?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if self.check(&TokenType::Semicolon) {
            Expr::Literal {
                value: Literal::Bool(true),
            }
        } else {
            self.expression()?
        };
        self.consume(TokenType::Semicolon, "Expected ';' after 'for' condition.")?;

        let increment = if self.check(&TokenType::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::RightParen, "Expected ')' after 'for' clauses.")?;

        let mut body = self.statement()?;

        // Desugar: append the increment, wrap in while, prepend the initializer.
        if let Some(increment) = increment {
            body = Stmt::Block {
                statements: vec![
                    body,
                    Stmt::Expression {
                        expression: increment,
                    },
                ],
            };
        }

        body = Stmt::While {
            condition,
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block {
                statements: vec![initializer, body],
            };
        }

        Ok(body)
    }

    fn if_statement(&mut self) -> Result<Stmt, TarnError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_types(&[TokenType::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn panic_statement(&mut self) -> Result<Stmt, TarnError> {
        let keyword = self.previous().clone();
        let code = self.expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after panic code.")?;
        Ok(Stmt::Panic { keyword, code })
    }

    fn print_statement(&mut self) -> Result<Stmt, TarnError> {
        let expression = self.expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after expression.")?;
        Ok(Stmt::Print { expression })
    }

    fn return_statement(&mut self) -> Result<Stmt, TarnError> {
        let keyword = self.previous().clone();
        let value = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon, "Expected ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn try_statement(&mut self) -> Result<Stmt, TarnError> {
        self.consume(TokenType::LeftBrace, "Expected '{' after 'try'.")?;
        let body = self.block_statements()?;

        if !self.check(&TokenType::Catch) {
            let token = self.peek().clone();
            return Err(TarnError::parse(&token, "Expected 'catch' after try block."));
        }

        let mut catches = Vec::new();
        while self.match_types(&[TokenType::Catch]) {
            let code = if self.match_types(&[TokenType::LeftParen]) {
                let code_token = self
                    .consume(TokenType::Number, "Expected panic code.")?
                    .clone();
                self.consume(TokenType::RightParen, "Expected ')' after panic code.")?;
                if let Some(Literal::Number(n)) = code_token.literal {
                    Some(n)
                } else {
                    None
                }
            } else {
                None
            };
            self.consume(TokenType::LeftBrace, "Expected '{' before catch body.")?;
            let body = self.block_statements()?;
            catches.push(CatchClause { code, body });
        }

        Ok(Stmt::Try { body, catches })
    }

    fn while_statement(&mut self) -> Result<Stmt, TarnError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    fn block_statements(&mut self) -> Result<Vec<Stmt>, TarnError> {
        let mut statements = Vec::new();

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        self.consume(TokenType::RightBrace, "Expected '}' after block.")?;
        Ok(statements)
    }

    fn expression_statement(&mut self) -> Result<Stmt, TarnError> {
        let expression = self.expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after expression.")?;
        Ok(Stmt::Expression { expression })
    }

    fn expression(&mut self) -> Result<Expr, TarnError> {
        self.sequence()
    }

    fn sequence(&mut self) -> Result<Expr, TarnError> {
        let mut expr = self.assignment()?;

        while self.match_types(&[TokenType::Comma]) {
            let second = self.assignment()?;
            expr = Expr::Sequence {
                first: Box::new(expr),
                second: Box::new(second),
            };
        }

        Ok(expr)
    }

    fn assignment(&mut self) -> Result<Expr, TarnError> {
        let expr = self.append()?;

        if self.match_types(&[TokenType::Equal]) {
            let equals = self.previous().clone();
            let value = self.assignment()?;

            match expr {
                Expr::Variable { name } => {
                    return Ok(Expr::Assign {
                        name,
                        value: Box::new(value),
                    });
                }
                Expr::Get { object, name } => {
                    return Ok(Expr::Set {
                        object,
                        name,
                        value: Box::new(value),
                    });
                }
                Expr::Index {
                    object,
                    bracket,
                    index,
                } => {
                    return Ok(Expr::IndexSet {
                        object,
                        bracket,
                        index,
                        value: Box::new(value),
                    });
                }
                _ => {
                    // Report but keep parsing; no need to synchronize here.
                    self.errors
                        .push(TarnError::parse(&equals, "Invalid assignment target."));
                    return Ok(expr);
                }
            }
        }

        Ok(expr)
    }

    fn append(&mut self) -> Result<Expr, TarnError> {
        let mut expr = self.ternary()?;

        while self.match_types(&[TokenType::LessMinus]) {
            let operator = self.previous().clone();
            // `xs <- v` appends; with no operand following, `xs <-` is the
            // postfix remove form.
            if self.next_starts_expression() {
                let right = self.ternary()?;
                expr = Expr::Binary {
                    left: Box::new(expr),
                    operator,
                    right: Box::new(right),
                };
            } else {
                expr = Expr::Postfix {
                    operator,
                    left: Box::new(expr),
                };
            }
        }

        Ok(expr)
    }

    fn ternary(&mut self) -> Result<Expr, TarnError> {
        let expr = self.or()?;

        if self.match_types(&[TokenType::Question]) {
            let then_branch = self.expression()?;
            self.consume(TokenType::Colon, "Expected ':' in ternary expression.")?;
            let else_branch = self.ternary()?;
            return Ok(Expr::Ternary {
                condition: Box::new(expr),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, TarnError> {
        let mut expr = self.and()?;

        while self.match_types(&[TokenType::Or]) {
            let operator = self.previous().clone();
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, TarnError> {
        let mut expr = self.equality()?;

        while self.match_types(&[TokenType::And]) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, TarnError> {
        let mut expr = self.comparison()?;

        while self.match_types(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, TarnError> {
        let mut expr = self.term()?;

        while self.match_types(&[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let operator = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, TarnError> {
        let mut expr = self.factor()?;

        while self.match_types(&[TokenType::Minus, TokenType::Plus]) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, TarnError> {
        let mut expr = self.unary()?;

        while self.match_types(&[TokenType::Slash, TokenType::Star]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, TarnError> {
        if self.match_types(&[TokenType::Bang, TokenType::Minus, TokenType::LessMinus]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }
        self.call()
    }

    fn call(&mut self) -> Result<Expr, TarnError> {
        let mut expr = self.primary()?;

        loop {
            if self.match_types(&[TokenType::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_types(&[TokenType::Dot]) {
                let name = self
                    .consume(TokenType::Identifier, "Expected property name after '.'")?
                    .clone();
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else if self.match_types(&[TokenType::LeftBracket]) {
                let bracket = self.previous().clone();
                let index = self.expression()?;
                self.consume(TokenType::RightBracket, "Expected ']' after index.")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    bracket,
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, TarnError> {
        let mut arguments = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                if arguments.len() >= 255 {
                    let token = self.peek().clone();
                    self.errors.push(TarnError::parse(
                        &token,
                        "Cannot have more than 255 arguments.",
                    ));
                }
                arguments.push(self.assignment()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let paren = self
            .consume(TokenType::RightParen, "Expected ')' after arguments.")?
            .clone();

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn primary(&mut self) -> Result<Expr, TarnError> {
        let token = self.peek().clone();
        match token.token_type {
            TokenType::False => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Bool(false),
                })
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Bool(true),
                })
            }
            TokenType::Nil => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Nil,
                })
            }
            TokenType::Number | TokenType::String => {
                let value = token.literal.clone().unwrap_or(Literal::Nil);
                self.advance();
                Ok(Expr::Literal { value })
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenType::RightParen, "Expected ')' after expression.")?;
                Ok(Expr::Grouping {
                    expression: Box::new(expr),
                })
            }
            TokenType::LeftBracket => {
                self.advance();
                let bracket = self.previous().clone();
                let mut elements = Vec::new();
                if !self.check(&TokenType::RightBracket) {
                    loop {
                        elements.push(self.assignment()?);
                        if !self.match_types(&[TokenType::Comma]) {
                            break;
                        }
                    }
                }
                self.consume(TokenType::RightBracket, "Expected ']' after list elements.")?;
                Ok(Expr::List { bracket, elements })
            }
            TokenType::Identifier => {
                self.advance();
                Ok(Expr::Variable { name: token })
            }
            TokenType::This => {
                self.advance();
                Ok(Expr::This { keyword: token })
            }
            TokenType::Super => {
                self.advance();
                self.consume(TokenType::Dot, "Expected '.' after 'super'.")?;
                let method = self
                    .consume(TokenType::Identifier, "Expected superclass method name.")?
                    .clone();
                Ok(Expr::Super {
                    keyword: token,
                    method,
                })
            }
            TokenType::Fun => {
                self.advance();
                self.consume(TokenType::LeftParen, "Expected '(' after 'fun'.")?;
                let params = self.parameters()?;
                self.consume(TokenType::RightParen, "Expected ')' after parameters.")?;
                self.consume(TokenType::LeftBrace, "Expected '{' before lambda body.")?;
                let body = self.block_statements()?;
                Ok(Expr::Lambda { params, body })
            }
            _ => Err(TarnError::parse(&token, "Expected expression.")),
        }
    }

    fn next_starts_expression(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::Number
                | TokenType::String
                | TokenType::Identifier
                | TokenType::True
                | TokenType::False
                | TokenType::Nil
                | TokenType::This
                | TokenType::Super
                | TokenType::LeftParen
                | TokenType::LeftBracket
                | TokenType::Minus
                | TokenType::Bang
                | TokenType::Fun
                | TokenType::LessMinus
        )
    }

    fn consume(
        &mut self,
        token_type: TokenType,
        message: impl Into<String>,
    ) -> Result<&Token, TarnError> {
        if self.check(&token_type) {
            return Ok(self.advance());
        }
        let token = self.peek().clone();
        Err(TarnError::parse(&token, message))
    }

    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Break
                | TokenType::Class
                | TokenType::Do
                | TokenType::For
                | TokenType::Fun
                | TokenType::If
                | TokenType::Let
                | TokenType::Panic
                | TokenType::Print
                | TokenType::Return
                | TokenType::Try
                | TokenType::Var
                | TokenType::While => return,
                _ => {}
            }

            self.advance();
        }
    }

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for t in types {
            if self.check(t) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }
        &self.peek().token_type == token_type
    }

    fn check_next(&self, token_type: &TokenType) -> bool {
        self.tokens
            .get(self.current + 1)
            .is_some_and(|t| &t.token_type == token_type)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }
}
