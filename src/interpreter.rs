use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace};

use crate::ast::{Expr, FunctionDecl, Stmt};
use crate::environment::Environment;
use crate::error::{RuntimeError, TarnError};
use crate::resolver::Resolutions;
use crate::token::{Token, TokenType};
use crate::value::{Callable, Class, Function, NativeFunction, TarnFunction, Value};

/// Why execution is leaving the current statement early. `break`, `return`
/// and `panic` travel the same path as errors until something catches them;
/// whatever escapes to the top level becomes a runtime error.
#[derive(Debug)]
pub enum Unwind {
    Error(TarnError),
    Break(Token),
    Return { keyword: Token, value: Value },
    Panic { keyword: Token, code: f64 },
}

impl From<RuntimeError> for Unwind {
    fn from(error: RuntimeError) -> Self {
        Unwind::Error(error.into())
    }
}

impl From<std::io::Error> for Unwind {
    fn from(error: std::io::Error) -> Self {
        Unwind::Error(error.into())
    }
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    resolutions: Resolutions,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));

        globals.borrow_mut().define_unchecked(
            "clock",
            false,
            Value::Function(Rc::new(Function::Native(NativeFunction {
                name: "clock".to_string(),
                arity: 0,
                func: |_| {
                    let elapsed = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default();
                    Value::Number(elapsed.as_secs_f64())
                },
            }))),
        );

        debug!("registered native function 'clock'");

        Self {
            environment: Rc::clone(&globals),
            globals,
            resolutions: HashMap::new(),
        }
    }

    /// Merge in a freshly resolved batch. Spans are unique per token, so
    /// re-running earlier source in a session cannot collide with new input.
    pub fn set_resolutions(&mut self, resolutions: Resolutions) {
        self.resolutions.extend(resolutions);
    }

    pub fn interpret(
        &mut self,
        statements: &[Stmt],
        output: &mut dyn Write,
    ) -> Result<(), TarnError> {
        for stmt in statements {
            if let Err(unwind) = self.execute(stmt, output) {
                return Err(match unwind {
                    Unwind::Error(error) => error,
                    Unwind::Break(keyword) => {
                        RuntimeError::new(&keyword, "Unexpected 'break' outside of a loop.").into()
                    }
                    // The resolver rejects top-level `return`; this arm only
                    // keeps the mapping total.
                    Unwind::Return { keyword, .. } => {
                        RuntimeError::new(&keyword, "Cannot return from top-level code.").into()
                    }
                    Unwind::Panic { keyword, code } => {
                        RuntimeError::new(&keyword, format!("Uncaught panic: {}.", code)).into()
                    }
                });
            }
        }
        Ok(())
    }

    fn execute(&mut self, stmt: &Stmt, output: &mut dyn Write) -> Result<(), Unwind> {
        match stmt {
            Stmt::Print { expression } => {
                let value = self.evaluate(expression, output)?;
                writeln!(output, "{}", value)?;
                Ok(())
            }
            Stmt::Expression { expression } => {
                self.evaluate(expression, output)?;
                Ok(())
            }
            Stmt::Var {
                name,
                initializer,
                constant,
            } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr, output)?,
                    None => Value::Nil,
                };
                self.environment.borrow_mut().define(name, *constant, value)?;
                Ok(())
            }
            Stmt::Block { statements } => {
                let environment = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
                    &self.environment,
                ))));
                self.execute_block(statements, environment, output)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, output)?.is_truthy() {
                    self.execute(then_branch, output)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt, output)
                } else {
                    Ok(())
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition, output)?.is_truthy() {
                    match self.execute(body, output) {
                        Ok(()) => {}
                        Err(Unwind::Break(_)) => break,
                        Err(unwind) => return Err(unwind),
                    }
                }
                Ok(())
            }
            Stmt::DoWhile { body, condition } => {
                loop {
                    match self.execute(body, output) {
                        Ok(()) => {}
                        Err(Unwind::Break(_)) => break,
                        Err(unwind) => return Err(unwind),
                    }
                    if !self.evaluate(condition, output)?.is_truthy() {
                        break;
                    }
                }
                Ok(())
            }
            Stmt::Break { keyword } => Err(Unwind::Break(keyword.clone())),
            Stmt::Return { keyword, value } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, output)?,
                    None => Value::Nil,
                };
                Err(Unwind::Return {
                    keyword: keyword.clone(),
                    value,
                })
            }
            Stmt::Function { declaration } => {
                let function = TarnFunction::from_decl(
                    declaration,
                    Rc::clone(&self.environment),
                    false,
                );
                self.environment.borrow_mut().define(
                    &declaration.name,
                    false,
                    Value::Function(Rc::new(Function::Tarn(function))),
                )?;
                Ok(())
            }
            Stmt::Class {
                name,
                superclass,
                methods,
                statics,
            } => self.execute_class(name, superclass.as_ref(), methods, statics, output),
            Stmt::Try { body, catches } => {
                let environment = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
                    &self.environment,
                ))));
                match self.execute_block(body, environment, output) {
                    Err(Unwind::Panic { keyword, code }) => {
                        // Exact-code clauses win over the wildcard regardless
                        // of their order in the source.
                        let clause = catches
                            .iter()
                            .find(|catch| catch.code == Some(code))
                            .or_else(|| catches.iter().find(|catch| catch.code.is_none()));
                        match clause {
                            Some(catch) => {
                                let environment = Rc::new(RefCell::new(
                                    Environment::with_enclosing(Rc::clone(&self.environment)),
                                ));
                                self.execute_block(&catch.body, environment, output)
                            }
                            None => Err(Unwind::Panic { keyword, code }),
                        }
                    }
                    result => result,
                }
            }
            Stmt::Panic { keyword, code } => {
                let value = self.evaluate(code, output)?;
                let Value::Number(code) = value else {
                    return Err(
                        RuntimeError::new(keyword, "Panic code must be a number.").into(),
                    );
                };
                Err(Unwind::Panic {
                    keyword: keyword.clone(),
                    code,
                })
            }
        }
    }

    /// Run `statements` with `environment` as the current scope, restoring
    /// the previous scope on every exit path.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
        output: &mut dyn Write,
    ) -> Result<(), Unwind> {
        let previous = std::mem::replace(&mut self.environment, environment);

        let result = statements
            .iter()
            .try_for_each(|stmt| self.execute(stmt, output));

        self.environment = previous;
        result
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[FunctionDecl],
        statics: &[FunctionDecl],
        output: &mut dyn Write,
    ) -> Result<(), Unwind> {
        let superclass_value = match superclass {
            Some(expr) => match self.evaluate(expr, output)? {
                Value::Class(class) => Some(class),
                _ => {
                    let token = match expr {
                        Expr::Variable { name } => name,
                        _ => name,
                    };
                    return Err(RuntimeError::new(token, "Superclass must be a class.").into());
                }
            },
            None => None,
        };

        // The name exists (as nil) while methods are built, so method bodies
        // may refer to the class itself.
        self.environment.borrow_mut().define(name, false, Value::Nil)?;

        let previous = superclass_value.as_ref().map(|superclass| {
            let mut environment = Environment::with_enclosing(Rc::clone(&self.environment));
            environment.define_unchecked("super", false, Value::Class(Rc::clone(superclass)));
            std::mem::replace(&mut self.environment, Rc::new(RefCell::new(environment)))
        });

        let mut static_methods = HashMap::new();
        for declaration in statics {
            let function =
                TarnFunction::from_decl(declaration, Rc::clone(&self.environment), false);
            static_methods.insert(
                declaration.name.lexeme.clone(),
                Rc::new(Function::Tarn(function)),
            );
        }

        let mut instance_methods = HashMap::new();
        for declaration in methods {
            let is_initializer = declaration.name.lexeme == "init";
            let function =
                TarnFunction::from_decl(declaration, Rc::clone(&self.environment), is_initializer);
            instance_methods.insert(
                declaration.name.lexeme.clone(),
                Rc::new(Function::Tarn(function)),
            );
        }

        // Statics live on a synthesized metaclass. It carries the superclass
        // pointer, so inherited lookups funnel through it.
        let metaclass = Rc::new(Class {
            name: format!("{} metaclass", name.lexeme),
            metaclass: None,
            superclass: superclass_value.clone(),
            methods: static_methods,
            fields: RefCell::new(HashMap::new()),
        });

        let class = Rc::new(Class {
            name: name.lexeme.clone(),
            metaclass: Some(metaclass),
            superclass: superclass_value,
            methods: instance_methods,
            fields: RefCell::new(HashMap::new()),
        });

        if let Some(previous) = previous {
            self.environment = previous;
        }

        trace!("defined class '{}'", name.lexeme);
        self.environment
            .borrow_mut()
            .assign(name, Value::Class(class))?;
        Ok(())
    }

    fn evaluate(&mut self, expr: &Expr, output: &mut dyn Write) -> Result<Value, Unwind> {
        match expr {
            Expr::Literal { value } => Ok(value.clone().into()),
            Expr::Grouping { expression } => self.evaluate(expression, output),
            Expr::Variable { name } => self.look_up_variable(name),
            Expr::Assign { name, value } => {
                let value = self.evaluate(value, output)?;
                match self.resolutions.get(&name.span) {
                    Some(distance) => {
                        self.environment
                            .borrow_mut()
                            .assign_at(*distance, name, value.clone())?;
                    }
                    None => {
                        self.globals.borrow_mut().assign(name, value.clone())?;
                    }
                }
                Ok(value)
            }
            Expr::Unary { operator, right } => {
                let right = self.evaluate(right, output)?;
                match operator.token_type {
                    TokenType::Minus => match right {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(RuntimeError::new(operator, "Operand must be a number.").into()),
                    },
                    TokenType::Bang => Ok(Value::Bool(!right.is_truthy())),
                    // Prefix remove takes from the front.
                    TokenType::LessMinus => self.remove_element(&right, operator, true),
                    _ => unreachable!("unary operator {:?}", operator.token_type),
                }
            }
            Expr::Postfix { operator, left } => {
                let left = self.evaluate(left, output)?;
                self.remove_element(&left, operator, false)
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, output)?;
                let right = self.evaluate(right, output)?;
                self.evaluate_binary(&left, operator, &right)
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, output)?;
                if operator.token_type == TokenType::Or {
                    if left.is_truthy() {
                        return Ok(left);
                    }
                } else if !left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(right, output)
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, output)?.is_truthy() {
                    self.evaluate(then_branch, output)
                } else {
                    self.evaluate(else_branch, output)
                }
            }
            Expr::Sequence { first, second } => {
                self.evaluate(first, output)?;
                self.evaluate(second, output)
            }
            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee, output)?;
                let mut evaluated = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    evaluated.push(self.evaluate(argument, output)?);
                }

                let callable: &dyn Callable = match &callee {
                    Value::Function(function) => function.as_ref(),
                    Value::Class(class) => class,
                    _ => {
                        return Err(RuntimeError::new(
                            paren,
                            "Can only call functions and classes.",
                        )
                        .into());
                    }
                };

                // Surplus arguments are tolerated; missing ones are not.
                if evaluated.len() < callable.arity() {
                    return Err(RuntimeError::new(
                        paren,
                        format!(
                            "Expected {} arguments but got {}.",
                            callable.arity(),
                            evaluated.len()
                        ),
                    )
                    .into());
                }

                callable.call(self, evaluated, output)
            }
            Expr::Get { object, name } => {
                let object = self.evaluate(object, output)?;
                self.get_property(&object, name, output)
            }
            Expr::Set {
                object,
                name,
                value,
            } => {
                let object = self.evaluate(object, output)?;
                let value = self.evaluate(value, output)?;
                match &object {
                    Value::Instance(instance) => {
                        instance
                            .fields
                            .borrow_mut()
                            .insert(name.lexeme.clone(), value.clone());
                        Ok(value)
                    }
                    Value::Class(class) => {
                        class
                            .fields
                            .borrow_mut()
                            .insert(name.lexeme.clone(), value.clone());
                        Ok(value)
                    }
                    _ => Err(RuntimeError::new(name, "Only instances have fields.").into()),
                }
            }
            Expr::Index {
                object,
                bracket,
                index,
            } => {
                let object = self.evaluate(object, output)?;
                let index = self.evaluate(index, output)?;
                let Value::List(items) = object else {
                    return Err(
                        RuntimeError::new(bracket, "Can only index into lists.").into()
                    );
                };
                let items = items.borrow();
                let position = Self::list_position(&index, bracket, items.len())?;
                Ok(items[position].clone())
            }
            Expr::IndexSet {
                object,
                bracket,
                index,
                value,
            } => {
                let object = self.evaluate(object, output)?;
                let index = self.evaluate(index, output)?;
                let value = self.evaluate(value, output)?;
                let Value::List(items) = object else {
                    return Err(
                        RuntimeError::new(bracket, "Can only index into lists.").into()
                    );
                };
                let mut items = items.borrow_mut();
                let position = Self::list_position(&index, bracket, items.len())?;
                items[position] = value.clone();
                Ok(value)
            }
            Expr::List { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element, output)?);
                }
                Ok(Value::List(Rc::new(RefCell::new(values))))
            }
            Expr::This { keyword } => self.look_up_variable(keyword),
            Expr::Super { keyword, method } => {
                let distance = match self.resolutions.get(&keyword.span) {
                    Some(distance) => *distance,
                    None => {
                        return Err(
                            RuntimeError::new(keyword, "Undefined variable 'super'.").into()
                        );
                    }
                };
                let superclass = match self.environment.borrow().get_at(distance, "super") {
                    Some(Value::Class(class)) => class,
                    _ => {
                        return Err(
                            RuntimeError::new(keyword, "Undefined variable 'super'.").into()
                        );
                    }
                };
                // `this` sits one scope inside the `super` scope.
                let object = self
                    .environment
                    .borrow()
                    .get_at(distance - 1, "this")
                    .unwrap_or(Value::Nil);
                let found = superclass.find_method(&method.lexeme).ok_or_else(|| {
                    RuntimeError::new(
                        method,
                        format!("Undefined property '{}'.", method.lexeme),
                    )
                })?;
                self.bind_property(&found, object, output)
            }
            Expr::Lambda { params, body } => {
                Ok(Value::Function(Rc::new(Function::Tarn(TarnFunction {
                    name: None,
                    params: Rc::new(params.clone()),
                    body: Rc::new(body.clone()),
                    closure: Rc::clone(&self.environment),
                    is_initializer: false,
                    is_getter: false,
                }))))
            }
        }
    }

    fn evaluate_binary(
        &mut self,
        left: &Value,
        operator: &Token,
        right: &Value,
    ) -> Result<Value, Unwind> {
        match operator.token_type {
            TokenType::Minus | TokenType::Star | TokenType::Slash => {
                let (a, b) = Self::require_numbers(left, right, operator)?;
                match operator.token_type {
                    TokenType::Minus => Ok(Value::Number(a - b)),
                    TokenType::Star => Ok(Value::Number(a * b)),
                    TokenType::Slash => {
                        if b == 0.0 {
                            Err(RuntimeError::new(operator, "Division by zero.").into())
                        } else {
                            Ok(Value::Number(a / b))
                        }
                    }
                    _ => unreachable!(),
                }
            }
            // When either side is not a number, both are stringified and
            // joined, so `+` never fails.
            TokenType::Plus => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                _ => Ok(Value::String(format!("{}{}", left, right))),
            },
            TokenType::Greater
            | TokenType::GreaterEqual
            | TokenType::Less
            | TokenType::LessEqual => {
                let (a, b) = Self::require_numbers(left, right, operator)?;
                let result = match operator.token_type {
                    TokenType::Greater => a > b,
                    TokenType::GreaterEqual => a >= b,
                    TokenType::Less => a < b,
                    TokenType::LessEqual => a <= b,
                    _ => unreachable!(),
                };
                Ok(Value::Bool(result))
            }
            TokenType::EqualEqual => Ok(Value::Bool(left == right)),
            TokenType::BangEqual => Ok(Value::Bool(left != right)),
            TokenType::LessMinus => {
                if let Value::List(items) = left {
                    items.borrow_mut().push(right.clone());
                    Ok(left.clone())
                } else if let Value::List(items) = right {
                    items.borrow_mut().insert(0, left.clone());
                    Ok(right.clone())
                } else {
                    Err(RuntimeError::new(operator, "Can only append to lists.").into())
                }
            }
            _ => unreachable!("binary operator {:?}", operator.token_type),
        }
    }

    fn remove_element(
        &self,
        value: &Value,
        operator: &Token,
        from_front: bool,
    ) -> Result<Value, Unwind> {
        let Value::List(items) = value else {
            return Err(RuntimeError::new(operator, "Can only remove from lists.").into());
        };
        let mut items = items.borrow_mut();
        if items.is_empty() {
            return Err(
                RuntimeError::new(operator, "Cannot remove from an empty list.").into()
            );
        }
        if from_front {
            Ok(items.remove(0))
        } else {
            Ok(items.pop().unwrap_or(Value::Nil))
        }
    }

    fn list_position(index: &Value, bracket: &Token, len: usize) -> Result<usize, Unwind> {
        let Value::Number(n) = index else {
            return Err(RuntimeError::new(bracket, "List index must be an integer.").into());
        };
        if n.fract() != 0.0 || *n < 0.0 {
            return Err(RuntimeError::new(bracket, "List index must be an integer.").into());
        }
        let position = *n as usize;
        if position >= len {
            return Err(RuntimeError::new(bracket, "List index out of range.").into());
        }
        Ok(position)
    }

    fn require_numbers(
        left: &Value,
        right: &Value,
        operator: &Token,
    ) -> Result<(f64, f64), Unwind> {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
            _ => Err(RuntimeError::new(operator, "Operands must be numbers.").into()),
        }
    }

    fn look_up_variable(&self, name: &Token) -> Result<Value, Unwind> {
        match self.resolutions.get(&name.span) {
            Some(distance) => self
                .environment
                .borrow()
                .get_at(*distance, &name.lexeme)
                .ok_or_else(|| {
                    RuntimeError::new(name, format!("Undefined variable '{}'.", name.lexeme))
                        .into()
                }),
            None => Ok(self.globals.borrow().get(name)?),
        }
    }

    fn get_property(
        &mut self,
        object: &Value,
        name: &Token,
        output: &mut dyn Write,
    ) -> Result<Value, Unwind> {
        match object {
            Value::Instance(instance) => {
                if let Some(value) = instance.fields.borrow().get(&name.lexeme).cloned() {
                    return Ok(value);
                }
                if let Some(method) = instance.class.find_method(&name.lexeme) {
                    return self.bind_property(&method, object.clone(), output);
                }
                Err(RuntimeError::new(
                    name,
                    format!("Undefined property '{}'.", name.lexeme),
                )
                .into())
            }
            Value::Class(class) => {
                if let Some(value) = class.fields.borrow().get(&name.lexeme).cloned() {
                    return Ok(value);
                }
                if let Some(method) = class.find_method(&name.lexeme) {
                    return self.bind_property(&method, object.clone(), output);
                }
                Err(RuntimeError::new(
                    name,
                    format!("Undefined property '{}'.", name.lexeme),
                )
                .into())
            }
            _ => Err(RuntimeError::new(name, "Only instances have properties.").into()),
        }
    }

    /// Bind a looked-up method to its receiver. Getters run immediately; the
    /// property read is the call.
    fn bind_property(
        &mut self,
        method: &Rc<Function>,
        receiver: Value,
        output: &mut dyn Write,
    ) -> Result<Value, Unwind> {
        let bound = method.bind(receiver);
        if bound.is_getter() {
            bound.call(self, Vec::new(), output)
        } else {
            Ok(Value::Function(Rc::new(bound)))
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
