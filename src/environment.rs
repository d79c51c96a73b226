use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::token::Token;
use crate::value::Value;

/// One storage cell. `constant` cells reject reassignment.
#[derive(Debug, Clone)]
struct Cell {
    value: Value,
    constant: bool,
}

/// A single lexical scope: a name→cell map plus a link to the enclosing
/// scope. Scopes are shared (`Rc<RefCell<..>>`) because a closure keeps its
/// declaration environment alive after the frame that created it returns.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Cell>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Self {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Declare a name in this scope. Shadowing an outer binding is fine, but
    /// a name that is already a constant in this exact scope stays put.
    pub fn define(
        &mut self,
        name: &Token,
        constant: bool,
        value: Value,
    ) -> Result<(), RuntimeError> {
        if let Some(existing) = self.values.get(&name.lexeme)
            && existing.constant
        {
            return Err(RuntimeError::new(
                name,
                format!("Cannot redeclare constant variable '{}'.", name.lexeme),
            ));
        }
        self.values
            .insert(name.lexeme.clone(), Cell { value, constant });
        Ok(())
    }

    /// Host-side bindings that bypass the constant check: natives, `this`,
    /// `super`, and function parameters.
    pub fn define_unchecked(&mut self, name: impl Into<String>, constant: bool, value: Value) {
        self.values.insert(name.into(), Cell { value, constant });
    }

    /// Walk outward until the name is found. Only used for names the
    /// resolver left undistanced, i.e. assumed globals.
    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(cell) = self.values.get(&name.lexeme) {
            return Ok(cell.value.clone());
        }

        if let Some(enclosing) = &self.enclosing {
            return enclosing.borrow().get(name);
        }

        Err(RuntimeError::new(
            name,
            format!("Undefined variable '{}'.", name.lexeme),
        ))
    }

    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        if let Some(cell) = self.values.get_mut(&name.lexeme) {
            if cell.constant {
                return Err(RuntimeError::new(
                    name,
                    format!("Cannot assign to constant variable '{}'.", name.lexeme),
                ));
            }
            cell.value = value;
            return Ok(());
        }

        if let Some(enclosing) = &self.enclosing {
            return enclosing.borrow_mut().assign(name, value);
        }

        Err(RuntimeError::new(
            name,
            format!("Undefined variable '{}'.", name.lexeme),
        ))
    }

    /// Jump straight to the scope `distance` hops outward and read from that
    /// scope's map only. The resolver-informed fast path.
    pub fn get_at(&self, distance: usize, name: &str) -> Option<Value> {
        if distance == 0 {
            self.values.get(name).map(|cell| cell.value.clone())
        } else {
            self.enclosing
                .as_ref()
                .and_then(|enclosing| enclosing.borrow().get_at(distance - 1, name))
        }
    }

    pub fn assign_at(
        &mut self,
        distance: usize,
        name: &Token,
        value: Value,
    ) -> Result<(), RuntimeError> {
        if distance == 0 {
            match self.values.get_mut(&name.lexeme) {
                Some(cell) if cell.constant => Err(RuntimeError::new(
                    name,
                    format!("Cannot assign to constant variable '{}'.", name.lexeme),
                )),
                Some(cell) => {
                    cell.value = value;
                    Ok(())
                }
                None => Err(RuntimeError::new(
                    name,
                    format!("Undefined variable '{}'.", name.lexeme),
                )),
            }
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign_at(distance - 1, name, value)
        } else {
            Err(RuntimeError::new(
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn name(lexeme: &str) -> Token {
        Token {
            token_type: TokenType::Identifier,
            lexeme: lexeme.to_string(),
            literal: None,
            line: 1,
            span: 0..lexeme.len(),
        }
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn define_and_get_variable() {
        let mut env = Environment::new();
        env.define(&name("x"), false, num(42.0)).unwrap();
        assert_eq!(env.get(&name("x")).unwrap(), num(42.0));
    }

    #[test]
    fn get_undefined_variable_errors() {
        let env = Environment::new();
        let err = env.get(&name("x")).unwrap_err();
        assert_eq!(err.message, "Undefined variable 'x'.");
    }

    #[test]
    fn assign_updates_existing_variable() {
        let mut env = Environment::new();
        env.define(&name("x"), false, num(1.0)).unwrap();
        env.assign(&name("x"), num(42.0)).unwrap();
        assert_eq!(env.get(&name("x")).unwrap(), num(42.0));
    }

    #[test]
    fn assign_undefined_variable_errors() {
        let mut env = Environment::new();
        let err = env.assign(&name("x"), num(1.0)).unwrap_err();
        assert_eq!(err.message, "Undefined variable 'x'.");
    }

    #[test]
    fn assign_to_constant_errors() {
        let mut env = Environment::new();
        env.define(&name("x"), true, num(1.0)).unwrap();
        let err = env.assign(&name("x"), num(2.0)).unwrap_err();
        assert_eq!(err.message, "Cannot assign to constant variable 'x'.");
        // Value unchanged.
        assert_eq!(env.get(&name("x")).unwrap(), num(1.0));
    }

    #[test]
    fn redeclaring_constant_in_same_scope_errors() {
        let mut env = Environment::new();
        env.define(&name("x"), true, num(1.0)).unwrap();
        let err = env.define(&name("x"), false, num(2.0)).unwrap_err();
        assert_eq!(err.message, "Cannot redeclare constant variable 'x'.");
    }

    #[test]
    fn redeclaring_mutable_in_same_scope_is_allowed() {
        let mut env = Environment::new();
        env.define(&name("x"), false, num(1.0)).unwrap();
        env.define(&name("x"), false, num(2.0)).unwrap();
        assert_eq!(env.get(&name("x")).unwrap(), num(2.0));
    }

    #[test]
    fn inner_scope_may_shadow_outer_constant() {
        let outer = Rc::new(RefCell::new(Environment::new()));
        outer.borrow_mut().define(&name("x"), true, num(1.0)).unwrap();

        let mut inner = Environment::with_enclosing(Rc::clone(&outer));
        inner.define(&name("x"), false, num(99.0)).unwrap();
        assert_eq!(inner.get(&name("x")).unwrap(), num(99.0));
    }

    // === enclosing chain ===

    #[test]
    fn get_walks_to_enclosing_scope() {
        let outer = Rc::new(RefCell::new(Environment::new()));
        outer
            .borrow_mut()
            .define(&name("x"), false, num(42.0))
            .unwrap();

        let inner = Environment::with_enclosing(Rc::clone(&outer));
        assert_eq!(inner.get(&name("x")).unwrap(), num(42.0));
    }

    #[test]
    fn assign_updates_enclosing_scope() {
        let outer = Rc::new(RefCell::new(Environment::new()));
        outer
            .borrow_mut()
            .define(&name("x"), false, num(1.0))
            .unwrap();

        let mut inner = Environment::with_enclosing(Rc::clone(&outer));
        inner.assign(&name("x"), num(42.0)).unwrap();

        assert_eq!(outer.borrow().get(&name("x")).unwrap(), num(42.0));
    }

    #[test]
    fn assign_to_enclosing_constant_errors() {
        let outer = Rc::new(RefCell::new(Environment::new()));
        outer.borrow_mut().define(&name("x"), true, num(1.0)).unwrap();

        let mut inner = Environment::with_enclosing(Rc::clone(&outer));
        let err = inner.assign(&name("x"), num(2.0)).unwrap_err();
        assert_eq!(err.message, "Cannot assign to constant variable 'x'.");
    }

    // === distanced access ===

    #[test]
    fn get_at_distance_zero_reads_local_only() {
        let outer = Rc::new(RefCell::new(Environment::new()));
        outer
            .borrow_mut()
            .define(&name("x"), false, num(1.0))
            .unwrap();

        let inner = Environment::with_enclosing(Rc::clone(&outer));
        // Distance 0 does not walk outward.
        assert_eq!(inner.get_at(0, "x"), None);
        assert_eq!(inner.get_at(1, "x"), Some(num(1.0)));
    }

    #[test]
    fn get_at_skips_shadowing_scope() {
        let outer = Rc::new(RefCell::new(Environment::new()));
        outer
            .borrow_mut()
            .define(&name("x"), false, num(1.0))
            .unwrap();

        let mut inner = Environment::with_enclosing(Rc::clone(&outer));
        inner.define(&name("x"), false, num(99.0)).unwrap();

        assert_eq!(inner.get_at(0, "x"), Some(num(99.0)));
        assert_eq!(inner.get_at(1, "x"), Some(num(1.0)));
    }

    #[test]
    fn assign_at_targets_exact_scope() {
        let outer = Rc::new(RefCell::new(Environment::new()));
        outer
            .borrow_mut()
            .define(&name("x"), false, num(1.0))
            .unwrap();

        let mut inner = Environment::with_enclosing(Rc::clone(&outer));
        inner.define(&name("x"), false, num(0.0)).unwrap();
        inner.assign_at(1, &name("x"), num(42.0)).unwrap();

        assert_eq!(inner.get_at(0, "x"), Some(num(0.0)));
        assert_eq!(outer.borrow().get_at(0, "x"), Some(num(42.0)));
    }

    #[test]
    fn assign_at_to_constant_errors() {
        let mut env = Environment::new();
        env.define(&name("x"), true, num(1.0)).unwrap();
        let err = env.assign_at(0, &name("x"), num(2.0)).unwrap_err();
        assert_eq!(err.message, "Cannot assign to constant variable 'x'.");
    }

    #[test]
    fn mutation_is_visible_through_shared_handle() {
        // Two holders of the same scope see each other's writes. This is the
        // closure-capture contract.
        let shared = Rc::new(RefCell::new(Environment::new()));
        shared
            .borrow_mut()
            .define(&name("x"), false, num(1.0))
            .unwrap();

        let holder = Rc::clone(&shared);
        shared.borrow_mut().assign(&name("x"), num(42.0)).unwrap();
        assert_eq!(holder.borrow().get(&name("x")).unwrap(), num(42.0));
    }
}
