use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::ast::{FunctionDecl, Stmt};
use crate::environment::Environment;
use crate::interpreter::{Interpreter, Unwind};
use crate::token::{Literal, Token};

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    Nil,
    List(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
}

impl Value {
    /// `nil` and `false` are falsy; everything else, including `0` and `""`,
    /// is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }
}

/// The capability of being invoked with an argument list.
pub trait Callable {
    fn arity(&self) -> usize;

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        output: &mut dyn Write,
    ) -> Result<Value, Unwind>;
}

#[derive(Debug)]
pub enum Function {
    Tarn(TarnFunction),
    Native(NativeFunction),
}

impl Function {
    /// Bind this function to a receiver (instance or class object).
    /// Only TarnFunctions can be bound; natives are never class methods.
    pub fn bind(&self, receiver: Value) -> Function {
        let Function::Tarn(function) = self else {
            unreachable!("Native functions are never class methods")
        };
        Function::Tarn(function.bind(receiver))
    }

    pub fn is_getter(&self) -> bool {
        matches!(self, Function::Tarn(function) if function.is_getter)
    }
}

impl Callable for Function {
    fn arity(&self) -> usize {
        match self {
            Function::Tarn(function) => function.params.len(),
            Function::Native(function) => function.arity,
        }
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        output: &mut dyn Write,
    ) -> Result<Value, Unwind> {
        match self {
            Function::Native(function) => Ok((function.func)(&arguments)),
            Function::Tarn(function) => function.call(interpreter, arguments, output),
        }
    }
}

pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub func: fn(&[Value]) -> Value,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Runtime function value: the declaration plus the environment captured at
/// the point of declaration.
#[derive(Debug)]
pub struct TarnFunction {
    pub name: Option<Token>,
    pub params: Rc<Vec<Token>>,
    pub body: Rc<Vec<Stmt>>,
    pub closure: Rc<RefCell<Environment>>,
    pub is_initializer: bool,
    pub is_getter: bool,
}

impl TarnFunction {
    pub fn from_decl(
        declaration: &FunctionDecl,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            name: Some(declaration.name.clone()),
            params: Rc::new(declaration.params.clone()),
            body: Rc::new(declaration.body.clone()),
            closure,
            is_initializer,
            is_getter: declaration.is_getter,
        }
    }

    /// Wrap the closure in a one-entry scope redefining `this` as the
    /// receiver, so the freshest fields are visible to the body.
    pub fn bind(&self, receiver: Value) -> TarnFunction {
        let mut environment = Environment::with_enclosing(Rc::clone(&self.closure));
        environment.define_unchecked("this", false, receiver);
        TarnFunction {
            name: self.name.clone(),
            params: Rc::clone(&self.params),
            body: Rc::clone(&self.body),
            closure: Rc::new(RefCell::new(environment)),
            is_initializer: self.is_initializer,
            is_getter: self.is_getter,
        }
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        output: &mut dyn Write,
    ) -> Result<Value, Unwind> {
        let mut environment = Environment::with_enclosing(Rc::clone(&self.closure));
        // Surplus arguments beyond the parameter list are dropped here; the
        // caller already checked arguments.len() >= arity.
        for (param, argument) in self.params.iter().zip(arguments) {
            environment.define_unchecked(param.lexeme.clone(), false, argument);
        }

        let result =
            interpreter.execute_block(&self.body, Rc::new(RefCell::new(environment)), output);

        match result {
            Ok(()) => {
                if self.is_initializer {
                    Ok(self.bound_instance())
                } else {
                    Ok(Value::Nil)
                }
            }
            Err(Unwind::Return { value, .. }) => {
                if self.is_initializer {
                    Ok(self.bound_instance())
                } else {
                    Ok(value)
                }
            }
            Err(other) => Err(other),
        }
    }

    /// For initializers, the return value is always the receiver bind()
    /// placed at distance 0.
    fn bound_instance(&self) -> Value {
        self.closure.borrow().get_at(0, "this").unwrap_or(Value::Nil)
    }
}

#[derive(Debug)]
pub struct Class {
    pub name: String,
    /// Synthesized class holding the static methods. The class object
    /// behaves as its instance.
    pub metaclass: Option<Rc<Class>>,
    pub superclass: Option<Rc<Class>>,
    pub methods: HashMap<String, Rc<Function>>,
    /// Class objects carry fields just like instances do.
    pub fields: RefCell<HashMap<String, Value>>,
}

impl Class {
    /// Ordered method search: own map first, then the metaclass (which
    /// carries the superclass pointer and so funnels the inherited lookup),
    /// then the bare superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }
        if let Some(metaclass) = &self.metaclass {
            return metaclass.find_method(name);
        }
        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.find_method(name))
    }
}

impl Callable for Rc<Class> {
    fn arity(&self) -> usize {
        self.find_method("init")
            .map_or(0, |initializer| initializer.arity())
    }

    /// Calling a class allocates an instance and runs `init` bound to it,
    /// when one exists. The instance is returned either way.
    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        output: &mut dyn Write,
    ) -> Result<Value, Unwind> {
        let instance = Rc::new(Instance::new(Rc::clone(self)));
        if let Some(initializer) = self.find_method("init") {
            initializer
                .bind(Value::Instance(Rc::clone(&instance)))
                .call(interpreter, arguments, output)?;
        }
        Ok(Value::Instance(instance))
    }
}

#[derive(Debug)]
pub struct Instance {
    pub class: Rc<Class>,
    pub fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64's Display drops a trailing ".0", so 2.0 prints as "2"
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Function(function) => write!(f, "{}", function),
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Instance(instance) => write!(f, "<instance {}>", instance.class.name),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Tarn(function) => match &function.name {
                Some(name) => write!(f, "<fn {}>", name.lexeme),
                None => write!(f, "<fn>"),
            },
            Function::Native(_) => write!(f, "<native fn>"),
        }
    }
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::Number(n) => Value::Number(n),
            Literal::String(s) => Value::String(s),
            Literal::Bool(b) => Value::Bool(b),
            Literal::Nil => Value::Nil,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
