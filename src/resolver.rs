use std::collections::HashMap;

use log::{debug, trace};

use crate::ast::{Expr, FunctionDecl, Stmt};
use crate::error::TarnError;
use crate::token::{Span, Token};

/// Maps each variable-reference token (by its source span) to the number of
/// scopes to walk outward from the environment active at that reference.
/// Names absent from the map are assumed global and looked up dynamically.
pub type Resolutions = HashMap<Span, usize>;

/// Tracks function context for validating `return`.
#[derive(Clone, Copy, PartialEq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

/// Tracks class context for validating `this` and `super`.
#[derive(Clone, Copy, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

pub struct Resolver {
    /// Stack of lexical scopes. Each maps a name to whether its initializer
    /// has finished (declared vs defined).
    scopes: Vec<HashMap<String, bool>>,
    resolutions: Resolutions,
    current_function: FunctionType,
    current_class: ClassType,
    errors: Vec<TarnError>,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            resolutions: HashMap::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            errors: Vec::new(),
        }
    }

    pub fn resolve(mut self, statements: &[Stmt]) -> Result<Resolutions, Vec<TarnError>> {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
        if self.errors.is_empty() {
            debug!("resolved {} local references", self.resolutions.len());
            Ok(self.resolutions)
        } else {
            Err(self.errors)
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
        trace!("begin scope (depth {})", self.scopes.len());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
        trace!("end scope (depth {})", self.scopes.len());
    }

    /// Mark the name as existing but not yet usable. A no-op at global
    /// scope, where redeclaration is allowed.
    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(&name.lexeme) {
                self.errors.push(TarnError::resolve(
                    name,
                    "Already a variable with this name in this scope.",
                ));
            }
            trace!("declare '{}'", name.lexeme);
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    fn resolve_local(&mut self, name: &Token) {
        for (distance, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                trace!("'{}' resolved at distance {}", name.lexeme, distance);
                self.resolutions.insert(name.span.clone(), distance);
                return;
            }
        }
        // Not found in any enclosing scope: assumed global.
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { statements } => {
                self.begin_scope();
                for statement in statements {
                    self.resolve_stmt(statement);
                }
                self.end_scope();
            }
            Stmt::Var {
                name, initializer, ..
            } => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer);
                }
                self.define(name);
            }
            Stmt::Expression { expression } | Stmt::Print { expression } => {
                self.resolve_expr(expression);
            }
            Stmt::Function { declaration } => {
                // Defined before its body resolves, so the function may
                // recurse into itself.
                self.declare(&declaration.name);
                self.define(&declaration.name);
                self.resolve_function(
                    &declaration.params,
                    &declaration.body,
                    FunctionType::Function,
                );
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.errors.push(TarnError::resolve(
                        keyword,
                        "Cannot return from top-level code.",
                    ));
                }
                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.errors.push(TarnError::resolve(
                            keyword,
                            "Cannot return a value from an initializer.",
                        ));
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }
            Stmt::DoWhile { body, condition } => {
                self.resolve_stmt(body);
                self.resolve_expr(condition);
            }
            Stmt::Break { .. } => {}
            Stmt::Class {
                name,
                superclass,
                methods,
                statics,
            } => self.resolve_class(name, superclass.as_ref(), methods, statics),
            Stmt::Try { body, catches } => {
                self.begin_scope();
                for statement in body {
                    self.resolve_stmt(statement);
                }
                self.end_scope();
                for catch in catches {
                    self.begin_scope();
                    for statement in &catch.body {
                        self.resolve_stmt(statement);
                    }
                    self.end_scope();
                }
            }
            Stmt::Panic { code, .. } => {
                self.resolve_expr(code);
            }
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[FunctionDecl],
        statics: &[FunctionDecl],
    ) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(name);
        self.define(name);

        if let Some(superclass_expr) = superclass {
            if let Expr::Variable {
                name: superclass_name,
            } = superclass_expr
                && superclass_name.lexeme == name.lexeme
            {
                self.errors.push(TarnError::resolve(
                    superclass_name,
                    "A class cannot inherit from itself.",
                ));
            }
            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass_expr);

            // Scope holding `super`, shared by every method closure.
            self.begin_scope();
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert("super".to_string(), true);
            }
        }

        // Scope holding `this`, inside the `super` scope when there is one.
        self.begin_scope();
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert("this".to_string(), true);
        }

        // Statics bind `this` to the class object; a static named `init` is
        // an ordinary method, not an initializer.
        for method in statics {
            self.resolve_function(&method.params, &method.body, FunctionType::Method);
        }

        for method in methods {
            let function_type = if method.name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(&method.params, &method.body, function_type);
        }

        self.end_scope();
        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, params: &[Token], body: &[Stmt], function_type: FunctionType) {
        let enclosing_function = self.current_function;
        self.current_function = function_type;

        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        for stmt in body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.current_function = enclosing_function;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal { .. } => {}
            Expr::Variable { name } => {
                // Declared but not yet defined in the innermost scope means
                // the initializer is reading the name it declares.
                if let Some(scope) = self.scopes.last()
                    && scope.get(&name.lexeme) == Some(&false)
                {
                    self.errors.push(TarnError::resolve(
                        name,
                        "Cannot read local variable in its own initializer.",
                    ));
                }
                self.resolve_local(name);
            }
            Expr::Assign { name, value } => {
                self.resolve_expr(value);
                self.resolve_local(name);
            }
            Expr::Unary { right, .. } => {
                self.resolve_expr(right);
            }
            Expr::Postfix { left, .. } => {
                self.resolve_expr(left);
            }
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }
            Expr::Sequence { first, second } => {
                self.resolve_expr(first);
                self.resolve_expr(second);
            }
            Expr::Grouping { expression } => {
                self.resolve_expr(expression);
            }
            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            Expr::Get { object, .. } => {
                self.resolve_expr(object);
            }
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::Index { object, index, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(index);
            }
            Expr::IndexSet {
                object,
                index,
                value,
                ..
            } => {
                self.resolve_expr(object);
                self.resolve_expr(index);
                self.resolve_expr(value);
            }
            Expr::List { elements, .. } => {
                for element in elements {
                    self.resolve_expr(element);
                }
            }
            Expr::This { keyword } => {
                if self.current_class == ClassType::None {
                    self.errors.push(TarnError::resolve(
                        keyword,
                        "Cannot use 'this' outside of a class.",
                    ));
                }
                self.resolve_local(keyword);
            }
            Expr::Super { keyword, .. } => {
                if self.current_class == ClassType::None {
                    self.errors.push(TarnError::resolve(
                        keyword,
                        "Cannot use 'super' outside of a class.",
                    ));
                } else if self.current_class == ClassType::Class {
                    self.errors.push(TarnError::resolve(
                        keyword,
                        "Cannot use 'super' in a class with no superclass.",
                    ));
                }
                self.resolve_local(keyword);
            }
            Expr::Lambda { params, body } => {
                self.resolve_function(params, body, FunctionType::Function);
            }
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;
    use crate::token::Token;

    fn resolve_source(source: &str) -> Result<Resolutions, Vec<TarnError>> {
        let tokens: Vec<Token> = Scanner::new(source)
            .collect::<Result<Vec<_>, _>>()
            .expect("scan should succeed");
        let mut parser = Parser::new(tokens);
        let statements = parser.parse();
        assert!(parser.take_errors().is_empty(), "parse should succeed");
        Resolver::new().resolve(&statements)
    }

    /// Span of the nth occurrence of `needle` in `source`.
    fn span_of(source: &str, needle: &str, occurrence: usize) -> Span {
        let (start, text) = source
            .match_indices(needle)
            .nth(occurrence)
            .expect("needle not found");
        start..start + text.len()
    }

    #[test]
    fn empty_program_resolves_to_empty_map() {
        let resolutions = resolve_source("").unwrap();
        assert!(resolutions.is_empty());
    }

    #[test]
    fn local_reference_resolves_at_distance_zero() {
        let source = "{ var value = 1; print value; }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "value", 1)), Some(&0));
    }

    #[test]
    fn enclosing_reference_resolves_at_distance_one() {
        let source = "{ var value = 1; { print value; } }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "value", 1)), Some(&1));
    }

    #[test]
    fn global_references_stay_out_of_the_map() {
        let source = "var value = 1; print value;";
        let resolutions = resolve_source(source).unwrap();
        assert!(!resolutions.contains_key(&span_of(source, "value", 1)));
    }

    #[test]
    fn shadowing_resolves_to_the_inner_binding() {
        let source = "{ var item = 1; { var item = 2; print item; } }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "item", 2)), Some(&0));
    }

    #[test]
    fn parameters_resolve_at_distance_zero() {
        let source = "fun greet(who) { print who; }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "who", 1)), Some(&0));
    }

    #[test]
    fn closure_capture_resolves_past_the_function_scope() {
        let source = "fun outer() { var captured = 1; fun inner() { print captured; } }";
        let resolutions = resolve_source(source).unwrap();
        // inner's body is one scope inside outer's body.
        assert_eq!(resolutions.get(&span_of(source, "captured", 1)), Some(&1));
    }

    #[test]
    fn lambda_body_resolves_like_a_function() {
        let source = "{ var base = 1; var add = fun(amount) { return base + amount; }; }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "base", 1)), Some(&1));
        assert_eq!(resolutions.get(&span_of(source, "amount", 1)), Some(&0));
    }

    #[test]
    fn function_name_is_visible_to_its_own_body() {
        let source = "{ fun again() { again(); } }";
        let resolutions = resolve_source(source).unwrap();
        // The recursive call reaches out of the body scope to the block.
        assert_eq!(resolutions.get(&span_of(source, "again", 1)), Some(&1));
    }

    #[test]
    fn reading_a_local_in_its_own_initializer_errors() {
        let errors = resolve_source("{ var cycle = cycle; }").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0]
                .to_string()
                .contains("Cannot read local variable in its own initializer.")
        );
    }

    #[test]
    fn initializer_may_read_a_different_outer_name() {
        let source = "{ var first = 1; { var second = first; print second; } }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "first", 1)), Some(&1));
    }

    #[test]
    fn duplicate_declaration_in_same_scope_errors() {
        let errors = resolve_source("{ var twice = 1; var twice = 2; }").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0]
                .to_string()
                .contains("Already a variable with this name in this scope.")
        );
    }

    #[test]
    fn duplicate_declaration_at_global_scope_is_allowed() {
        assert!(resolve_source("var again = 1; var again = 2;").is_ok());
    }

    #[test]
    fn returning_a_value_from_an_initializer_errors() {
        let errors = resolve_source("class Widget { init() { return 1; } }").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0]
                .to_string()
                .contains("Cannot return a value from an initializer.")
        );
    }

    #[test]
    fn bare_return_from_an_initializer_is_allowed() {
        assert!(resolve_source("class Widget { init() { return; } }").is_ok());
    }

    #[test]
    fn return_at_top_level_errors() {
        let errors = resolve_source("return 1;").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0]
                .to_string()
                .contains("Cannot return from top-level code.")
        );
    }

    #[test]
    fn bare_return_at_top_level_errors() {
        let errors = resolve_source("return;").unwrap_err();
        assert!(
            errors[0]
                .to_string()
                .contains("Cannot return from top-level code.")
        );
    }

    #[test]
    fn return_inside_a_block_at_top_level_errors() {
        let errors = resolve_source("{ return 1; }").unwrap_err();
        assert!(
            errors[0]
                .to_string()
                .contains("Cannot return from top-level code.")
        );
    }

    #[test]
    fn static_init_may_return_a_value() {
        // A static named init is an ordinary method.
        assert!(resolve_source("class Widget { class init() { return 1; } }").is_ok());
    }

    #[test]
    fn this_outside_a_class_errors() {
        let errors = resolve_source("print this;").unwrap_err();
        assert!(
            errors[0]
                .to_string()
                .contains("Cannot use 'this' outside of a class.")
        );
    }

    #[test]
    fn this_in_a_function_outside_a_class_errors() {
        let errors = resolve_source("fun loose() { print this; }").unwrap_err();
        assert!(
            errors[0]
                .to_string()
                .contains("Cannot use 'this' outside of a class.")
        );
    }

    #[test]
    fn this_resolves_inside_a_method() {
        let source = "class Widget { show() { print this; } }";
        let resolutions = resolve_source(source).unwrap();
        // Method body scope, then the `this` scope.
        assert_eq!(resolutions.get(&span_of(source, "this", 0)), Some(&1));
    }

    #[test]
    fn this_resolves_inside_a_static_method() {
        let source = "class Widget { class describe() { print this; } }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "this", 0)), Some(&1));
    }

    #[test]
    fn super_outside_a_class_errors() {
        let errors = resolve_source("print super.show;").unwrap_err();
        assert!(
            errors[0]
                .to_string()
                .contains("Cannot use 'super' outside of a class.")
        );
    }

    #[test]
    fn super_without_a_superclass_errors() {
        let errors = resolve_source("class Widget { show() { super.show(); } }").unwrap_err();
        assert!(
            errors[0]
                .to_string()
                .contains("Cannot use 'super' in a class with no superclass.")
        );
    }

    #[test]
    fn super_resolves_one_scope_past_this() {
        let source = "class Base { show() {} } class Sub < Base { show() { super.show(); } }";
        let resolutions = resolve_source(source).unwrap();
        // Method body, `this` scope, then the `super` scope.
        assert_eq!(resolutions.get(&span_of(source, "super", 0)), Some(&2));
    }

    #[test]
    fn self_inheritance_errors() {
        let errors = resolve_source("class Loop < Loop {}").unwrap_err();
        assert!(
            errors[0]
                .to_string()
                .contains("A class cannot inherit from itself.")
        );
    }

    #[test]
    fn try_and_catch_bodies_get_their_own_scopes() {
        let source =
            "try { var local = 2; print local; } catch { var other = 3; print other; }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "local", 1)), Some(&0));
        assert_eq!(resolutions.get(&span_of(source, "other", 1)), Some(&0));
    }

    #[test]
    fn do_while_resolves_body_and_condition() {
        let source = "{ var running = true; do { print running; } while (running); }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "running", 1)), Some(&1));
        assert_eq!(resolutions.get(&span_of(source, "running", 2)), Some(&0));
    }

    #[test]
    fn list_and_index_expressions_resolve_their_parts() {
        let source = "{ var items = [1, 2]; var at = 0; print items[at]; items[at] = 3; }";
        let resolutions = resolve_source(source).unwrap();
        assert_eq!(resolutions.get(&span_of(source, "items", 1)), Some(&0));
        assert_eq!(resolutions.get(&span_of(source, "at", 1)), Some(&0));
        assert_eq!(resolutions.get(&span_of(source, "items", 2)), Some(&0));
        assert_eq!(resolutions.get(&span_of(source, "at", 2)), Some(&0));
    }

    #[test]
    fn multiple_errors_are_all_reported() {
        let errors = resolve_source("print this; print super.show;").unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
