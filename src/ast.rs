use std::fmt;

use crate::token::{Literal, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
    },
    Variable {
        name: Token,
    },
    Assign {
        name: Token,
        value: Box<Expr>,
    },
    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    /// The postfix remove form `xs<-`; the prefix form is an ordinary Unary.
    Postfix {
        operator: Token,
        left: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Sequence {
        first: Box<Expr>,
        second: Box<Expr>,
    },
    Grouping {
        expression: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        arguments: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    Index {
        object: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
    },
    IndexSet {
        object: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    List {
        bracket: Token,
        elements: Vec<Expr>,
    },
    This {
        keyword: Token,
    },
    Super {
        keyword: Token,
        method: Token,
    },
    Lambda {
        params: Vec<Token>,
        body: Vec<Stmt>,
    },
}

/// A named function: `fun` declarations and class methods. Methods declared
/// without a parameter list are getters.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
    pub is_getter: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// `None` is the wildcard clause.
    pub code: Option<f64>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expression {
        expression: Expr,
    },
    Print {
        expression: Expr,
    },
    Var {
        name: Token,
        initializer: Option<Expr>,
        constant: bool,
    },
    Block {
        statements: Vec<Stmt>,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    Break {
        keyword: Token,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Function {
        declaration: FunctionDecl,
    },
    Class {
        name: Token,
        superclass: Option<Expr>,
        methods: Vec<FunctionDecl>,
        statics: Vec<FunctionDecl>,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
    },
    Panic {
        keyword: Token,
        code: Expr,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal { value } => write!(f, "{}", value),
            Expr::Variable { name } => write!(f, "{}", name.lexeme),
            Expr::Assign { name, value } => write!(f, "(= {} {})", name.lexeme, value),
            Expr::Unary { operator, right } => write!(f, "({} {})", operator.lexeme, right),
            Expr::Postfix { operator, left } => write!(f, "(post{} {})", operator.lexeme, left),
            Expr::Binary {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", operator.lexeme, left, right),
            Expr::Logical {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", operator.lexeme, left, right),
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "(?: {} {} {})", condition, then_branch, else_branch),
            Expr::Sequence { first, second } => write!(f, "(, {} {})", first, second),
            Expr::Grouping { expression } => write!(f, "(group {})", expression),
            Expr::Call {
                callee, arguments, ..
            } => {
                write!(f, "(call {}", callee)?;
                for argument in arguments {
                    write!(f, " {}", argument)?;
                }
                write!(f, ")")
            }
            Expr::Get { object, name } => write!(f, "(. {} {})", object, name.lexeme),
            Expr::Set {
                object,
                name,
                value,
            } => write!(f, "(.= {} {} {})", object, name.lexeme, value),
            Expr::Index { object, index, .. } => write!(f, "([] {} {})", object, index),
            Expr::IndexSet {
                object,
                index,
                value,
                ..
            } => write!(f, "([]= {} {} {})", object, index, value),
            Expr::List { elements, .. } => {
                write!(f, "(list")?;
                for element in elements {
                    write!(f, " {}", element)?;
                }
                write!(f, ")")
            }
            Expr::This { .. } => write!(f, "this"),
            Expr::Super { method, .. } => write!(f, "(super {})", method.lexeme),
            Expr::Lambda { params, .. } => {
                write!(f, "(fun (")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", param.lexeme)?;
                }
                write!(f, "))")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn make_token(token_type: TokenType, lexeme: &str) -> Token {
        Token {
            token_type,
            lexeme: lexeme.to_string(),
            literal: None,
            line: 1,
            span: 0..lexeme.len(),
        }
    }

    fn number(n: f64) -> Expr {
        Expr::Literal {
            value: Literal::Number(n),
        }
    }

    #[test]
    fn displays_nested_expression() {
        // -123 * (45.67)
        let expr = Expr::Binary {
            left: Box::new(Expr::Unary {
                operator: make_token(TokenType::Minus, "-"),
                right: Box::new(number(123.0)),
            }),
            operator: make_token(TokenType::Star, "*"),
            right: Box::new(Expr::Grouping {
                expression: Box::new(number(45.67)),
            }),
        };
        assert_eq!(expr.to_string(), "(* (- 123) (group 45.67))");
    }

    #[test]
    fn displays_assignment() {
        let expr = Expr::Assign {
            name: make_token(TokenType::Identifier, "x"),
            value: Box::new(number(42.0)),
        };
        assert_eq!(expr.to_string(), "(= x 42)");
    }

    #[test]
    fn displays_ternary() {
        let expr = Expr::Ternary {
            condition: Box::new(Expr::Literal {
                value: Literal::Bool(true),
            }),
            then_branch: Box::new(number(1.0)),
            else_branch: Box::new(number(2.0)),
        };
        assert_eq!(expr.to_string(), "(?: true 1 2)");
    }

    #[test]
    fn displays_call_with_arguments() {
        let expr = Expr::Call {
            callee: Box::new(Expr::Variable {
                name: make_token(TokenType::Identifier, "f"),
            }),
            paren: make_token(TokenType::RightParen, ")"),
            arguments: vec![number(1.0), number(2.0)],
        };
        assert_eq!(expr.to_string(), "(call f 1 2)");
    }

    #[test]
    fn displays_property_access_chain() {
        let expr = Expr::Get {
            object: Box::new(Expr::This {
                keyword: make_token(TokenType::This, "this"),
            }),
            name: make_token(TokenType::Identifier, "x"),
        };
        assert_eq!(expr.to_string(), "(. this x)");
    }

    #[test]
    fn displays_super_method() {
        let expr = Expr::Super {
            keyword: make_token(TokenType::Super, "super"),
            method: make_token(TokenType::Identifier, "greet"),
        };
        assert_eq!(expr.to_string(), "(super greet)");
    }

    #[test]
    fn displays_list_and_index_forms() {
        let list = Expr::List {
            bracket: make_token(TokenType::LeftBracket, "["),
            elements: vec![number(1.0), number(2.0)],
        };
        assert_eq!(list.to_string(), "(list 1 2)");

        let index = Expr::Index {
            object: Box::new(Expr::Variable {
                name: make_token(TokenType::Identifier, "xs"),
            }),
            bracket: make_token(TokenType::LeftBracket, "["),
            index: Box::new(number(0.0)),
        };
        assert_eq!(index.to_string(), "([] xs 0)");
    }

    #[test]
    fn displays_remove_forms() {
        let prefix = Expr::Unary {
            operator: make_token(TokenType::LessMinus, "<-"),
            right: Box::new(Expr::Variable {
                name: make_token(TokenType::Identifier, "xs"),
            }),
        };
        assert_eq!(prefix.to_string(), "(<- xs)");

        let postfix = Expr::Postfix {
            operator: make_token(TokenType::LessMinus, "<-"),
            left: Box::new(Expr::Variable {
                name: make_token(TokenType::Identifier, "xs"),
            }),
        };
        assert_eq!(postfix.to_string(), "(post<- xs)");
    }

    #[test]
    fn creates_class_statement_with_statics() {
        let stmt = Stmt::Class {
            name: make_token(TokenType::Identifier, "Math"),
            superclass: None,
            methods: vec![],
            statics: vec![FunctionDecl {
                name: make_token(TokenType::Identifier, "square"),
                params: vec![make_token(TokenType::Identifier, "n")],
                body: vec![],
                is_getter: false,
            }],
        };
        assert!(matches!(stmt, Stmt::Class { statics, .. } if statics.len() == 1));
    }
}
