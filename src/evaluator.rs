use crate::ast::{ParamSpec, Procedure, Symbol, Value};
use crate::builtinops::get_builtin_ops;
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation};
use crate::evaluator::scope::Scope;
use crate::interop::{ForeignResolver, NullResolver};
use crate::macros::MacroFn;
use crate::{DEFAULT_MAX_EVAL_DEPTH, Error, Unwind, continuations, quasiquote, syntaxrules};
use std::rc::Rc;
use tracing::{debug, trace, warn};

pub mod intooperation;
pub mod scope;

pub use crate::builtinops::Arity;
pub use intooperation::{ByteIter, NumIter, StringIter, ValueIter};

#[cfg(feature = "scheme")]
const PRELUDE: &str = include_str!("prelude.scm");

/// Result of one evaluation step.
///
/// Special forms and procedure application return `TailCall`/`Apply` for their
/// tail position instead of recursing; [`Runtime`] resolves the markers in a loop,
/// so tail recursion runs in constant native stack.
pub enum Trampoline {
    Value(Value),
    /// Evaluate `form` in `scope`
    TailCall { scope: Rc<Scope>, form: Value },
    /// Apply an already-evaluated callee to already-evaluated arguments
    Apply { callee: Value, args: Vec<Value> },
}

impl From<Value> for Trampoline {
    fn from(value: Value) -> Self {
        Trampoline::Value(value)
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Limit on nested native evaluation; tail calls do not count
    pub max_eval_depth: usize,
    /// Evaluate the embedded prelude into the root scope at startup
    pub load_prelude: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_eval_depth: DEFAULT_MAX_EVAL_DEPTH,
            load_prelude: true,
        }
    }
}

/// Interpreter state: the two-tier environment plus dynamic evaluation context.
///
/// The root scope holds builtins, special forms and the prelude and cannot be
/// changed with `set!`. Programs run in the root's direct child, the user scope.
///
/// A runtime is confined to the thread that created it:
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<lispwright::Runtime>();
/// ```
pub struct Runtime {
    root: Rc<Scope>,
    user: Rc<Scope>,
    resolver: Box<dyn ForeignResolver>,
    config: RuntimeConfig,
    depth: usize,
    /// Installed exception handlers, innermost last
    pub(crate) handlers: Vec<Value>,
    /// Escape procedures whose `call/cc` frame is still on the stack
    pub(crate) active_escapes: Vec<u64>,
    next_escape_id: u64,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let root = Scope::new_root();
        for op in get_builtin_ops() {
            if let Err(err) = root.define(Symbol::new(op.scheme_id), op.to_value()) {
                warn!(%err, "skipping builtin registration");
            }
        }
        let user = root.create_child();
        let load_prelude = config.load_prelude;
        let mut runtime = Runtime {
            root,
            user,
            resolver: Box::new(NullResolver),
            config,
            depth: 0,
            handlers: Vec::new(),
            active_escapes: Vec::new(),
            next_escape_id: 0,
        };
        if load_prelude && let Err(err) = runtime.load_prelude() {
            warn!(%err, "prelude failed to load");
        }
        runtime
    }

    /// Install the resolver consulted for names the program does not bind
    pub fn with_resolver(mut self, resolver: impl ForeignResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    #[cfg(feature = "scheme")]
    pub(crate) fn load_prelude(&mut self) -> Result<(), Error> {
        debug!("loading prelude");
        let program = crate::scheme::parse_program(PRELUDE)?;
        let root = Rc::clone(&self.root);
        self.evaluate(&root, &program)?;
        debug!(bindings = root.local_names().len(), "prelude loaded");
        Ok(())
    }

    #[cfg(not(feature = "scheme"))]
    pub(crate) fn load_prelude(&mut self) -> Result<(), Error> {
        debug!("prelude requires the scheme reader; skipped");
        Ok(())
    }

    pub fn root_scope(&self) -> &Rc<Scope> {
        &self.root
    }

    pub fn user_scope(&self) -> &Rc<Scope> {
        &self.user
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Evaluate a form (or a whole `Program`) in the user scope
    pub fn eval(&mut self, expr: &Value) -> Result<Value, Error> {
        let user = Rc::clone(&self.user);
        let result = self.evaluate(&user, expr).map_err(Error::from);
        self.reset_dynamic_state();
        result
    }

    /// Read and evaluate source text in the user scope
    #[cfg(feature = "scheme")]
    pub fn eval_str(&mut self, source: &str) -> Result<Value, Error> {
        let program = crate::scheme::parse_program(source)?;
        self.eval(&program)
    }

    /// Look up a name as the user scope sees it
    pub fn get(&self, name: &str) -> Option<Value> {
        self.user.resolve(Symbol::new(name))
    }

    /// Define a name in the user scope
    pub fn define(&mut self, name: &str, value: Value) -> Result<(), Error> {
        self.user.define(Symbol::new(name), value)
    }

    /// Register a strongly-typed Rust function as a builtin in the root scope.
    ///
    /// ```
    /// use lispwright::{Error, Runtime, Value};
    ///
    /// fn add(a: i64, b: i64) -> Result<i64, Error> {
    ///     Ok(a + b)
    /// }
    ///
    /// let mut runtime = Runtime::new();
    /// runtime.register_builtin::<_, (i64, i64)>("add2", add).unwrap();
    /// assert_eq!(runtime.eval_str("(add2 7 5)").unwrap(), Value::from(12));
    /// ```
    pub fn register_builtin<F, Args>(&mut self, name: &str, func: F) -> Result<(), Error>
    where
        F: IntoOperation<Args>,
    {
        let builtin = crate::ast::BuiltinFunction {
            name: Rc::from(name),
            arity: Arity::Any,
            func: func.into_operation(),
        };
        self.root
            .define(Symbol::new(name), Value::Builtin(Rc::new(builtin)))
    }

    /// Register a builtin whose last Rust parameter is a rest parameter.
    ///
    /// `arity` is checked before the call since minimum and maximum argument
    /// counts are not derivable from the Rust signature alone.
    pub fn register_variadic_builtin<F, Args>(
        &mut self,
        name: &str,
        arity: Arity,
        func: F,
    ) -> Result<(), Error>
    where
        F: IntoVariadicOperation<Args>,
    {
        let builtin = crate::ast::BuiltinFunction {
            name: Rc::from(name),
            arity,
            func: func.into_variadic_operation(),
        };
        self.root
            .define(Symbol::new(name), Value::Builtin(Rc::new(builtin)))
    }

    /// Register a host special form that receives its operands unevaluated
    pub fn register_special_form(
        &mut self,
        name: &str,
        arity: Arity,
        func: MacroFn,
    ) -> Result<(), Error> {
        let form = crate::ast::SpecialForm {
            name: Rc::from(name),
            arity,
            func,
        };
        self.root
            .define(Symbol::new(name), Value::Macro(Rc::new(form)))
    }

    // Dynamic context left behind by an aborted evaluation must not leak into the next one.
    fn reset_dynamic_state(&mut self) {
        self.depth = 0;
        self.handlers.clear();
        self.active_escapes.clear();
    }

    pub(crate) fn fresh_escape_id(&mut self) -> u64 {
        self.next_escape_id += 1;
        self.next_escape_id
    }

    /// Evaluate `expr` in `scope`, resolving all tail calls before returning
    pub fn evaluate(&mut self, scope: &Rc<Scope>, expr: &Value) -> Result<Value, Unwind> {
        self.nested(|runtime| {
            let step = runtime.eval_step(scope, expr)?;
            runtime.resolve(step)
        })
    }

    /// Apply `callee` to evaluated `args`, resolving all tail calls before returning
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, Unwind> {
        self.nested(|runtime| {
            let step = runtime.apply(callee, args)?;
            runtime.resolve(step)
        })
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Unwind>,
    ) -> Result<T, Unwind> {
        if self.depth >= self.config.max_eval_depth {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.config.max_eval_depth
            ))
            .into());
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub(crate) fn resolve(&mut self, mut step: Trampoline) -> Result<Value, Unwind> {
        loop {
            step = match step {
                Trampoline::Value(value) => return Ok(value),
                Trampoline::TailCall { scope, form } => {
                    trace!(form = %form, "tail call");
                    self.eval_step(&scope, &form)?
                }
                Trampoline::Apply { callee, args } => {
                    trace!(callee = %callee, "tail apply");
                    self.apply(&callee, args)?
                }
            };
        }
    }

    /// Hand `form` back to the trampoline as the tail of the current construct
    pub(crate) fn tail(&mut self, scope: &Rc<Scope>, form: Value) -> Result<Trampoline, Unwind> {
        if matches!(form, Value::Pair(_) | Value::Program(_)) {
            return Ok(Trampoline::TailCall {
                scope: Rc::clone(scope),
                form,
            });
        }
        Ok(Trampoline::Value(self.evaluate(scope, &form)?))
    }

    /// Tail application of an already-evaluated callee
    pub(crate) fn tail_apply(
        &mut self,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Trampoline, Unwind> {
        Ok(Trampoline::Apply { callee, args })
    }

    /// Evaluate a body: every form but the last for effect, the last in tail position
    pub(crate) fn eval_body(
        &mut self,
        scope: &Rc<Scope>,
        forms: &[Value],
    ) -> Result<Trampoline, Unwind> {
        let Some((last, init)) = forms.split_last() else {
            return Ok(Trampoline::Value(Value::Unspecified));
        };
        for form in init {
            self.evaluate(scope, form)?;
        }
        self.tail(scope, last.clone())
    }

    fn eval_step(&mut self, scope: &Rc<Scope>, expr: &Value) -> Result<Trampoline, Unwind> {
        match expr {
            Value::Nil
            | Value::Unspecified
            | Value::Atom(_)
            | Value::Bytevector(_)
            | Value::Regex(_)
            | Value::Procedure(_)
            | Value::Builtin(_)
            | Value::Macro(_)
            | Value::Syntax(_)
            | Value::Escape(_)
            | Value::Parameter(_)
            | Value::Condition(_)
            | Value::Foreign(_) => Ok(expr.clone().into()),

            Value::Symbol(name) => Ok(self.lookup(scope, *name, None)?.into()),

            Value::Scoped(ident) => {
                let home = ident.scope.upgrade();
                match home.and_then(|home| home.resolve(ident.symbol)) {
                    Some(value) => Ok(value.into()),
                    None => Ok(self.lookup(scope, ident.symbol, None)?.into()),
                }
            }

            Value::Vector(items) => {
                let items = items.borrow().clone();
                let mut fresh = Vec::with_capacity(items.len());
                for item in items {
                    let nested = matches!(
                        item,
                        Value::Pair(_)
                            | Value::Vector(_)
                            | Value::Quote(_)
                            | Value::Quasiquote(_)
                            | Value::Unquote(_)
                            | Value::UnquoteSplicing(_)
                    );
                    fresh.push(if nested {
                        self.evaluate(scope, &item)?
                    } else {
                        item
                    });
                }
                Ok(Value::vector(fresh).into())
            }

            Value::Quote(inner) => Ok(quasiquote::quote_value(inner).into()),
            Value::Quasiquote(template) => {
                Ok(quasiquote::quasiquote(self, scope, template)?.into())
            }
            Value::Unquote(_) | Value::UnquoteSplicing(_) => Err(Error::EvalError(format!(
                "{expr} is only valid inside quasiquote"
            ))
            .into()),

            Value::Program(forms) => self.eval_body(scope, forms),

            Value::Pair(_) => self.eval_application(scope, expr),
        }
    }

    /// Resolve a symbol: scope chain, then the `null`/`nil` keywords, then the
    /// foreign resolver
    fn lookup(
        &self,
        scope: &Rc<Scope>,
        name: Symbol,
        arity_hint: Option<usize>,
    ) -> Result<Value, Error> {
        if let Some(value) = scope.resolve(name) {
            return Ok(value);
        }
        let text = name.name();
        match text.as_str() {
            "null" => Ok(Value::Unspecified),
            "nil" => Ok(Value::Nil),
            _ => self
                .resolver
                .resolve(&text, arity_hint, &scope.namespaces())
                .ok_or(Error::UnboundVariable(text)),
        }
    }

    fn eval_application(&mut self, scope: &Rc<Scope>, form: &Value) -> Result<Trampoline, Unwind> {
        let Value::Pair(pair) = form else {
            return Err(Error::EvalError(format!("not an application: {form}")).into());
        };
        let operator = pair.car();
        let operands = pair.cdr();

        if let Value::Symbol(symbol) = &operator
            && let Some(member) = member_name(*symbol)
        {
            let args = self.eval_operands(scope, &operands)?;
            return Ok(self.resolver.invoke_member(&member, args)?.into());
        }

        let arity_hint = operands.list_length();
        let callee = match &operator {
            Value::Symbol(symbol) => self.lookup(scope, *symbol, arity_hint)?,
            other => self.evaluate(scope, other)?,
        };

        match &callee {
            Value::Macro(special) => {
                let args = operands.list_to_vec()?;
                special
                    .arity
                    .validate(args.len())
                    .map_err(|err| with_expression(err, form))?;
                (special.func)(self, scope, &args)
            }
            Value::Syntax(syntax) => {
                let expansion = syntaxrules::expand(syntax, &operands)?;
                self.tail(scope, expansion)
            }
            _ => {
                let args = self.eval_operands(scope, &operands)?;
                self.apply(&callee, args).map_err(|unwind| match unwind {
                    Unwind::Error(err) => Unwind::Error(with_expression(err, form)),
                    escape => escape,
                })
            }
        }
    }

    pub(crate) fn eval_operands(
        &mut self,
        scope: &Rc<Scope>,
        operands: &Value,
    ) -> Result<Vec<Value>, Unwind> {
        if !operands.is_list() {
            return Err(Error::EvalError(format!(
                "argument list must be proper, got {}",
                operands.shape()
            ))
            .into());
        }
        let mut args = Vec::new();
        for operand in operands.iter_list() {
            args.push(self.evaluate(scope, &operand)?);
        }
        Ok(args)
    }

    /// Apply a callable value; procedure bodies come back as a tail call
    pub(crate) fn apply(&mut self, callee: &Value, args: Vec<Value>) -> Result<Trampoline, Unwind> {
        match callee {
            Value::Procedure(procedure) => {
                let call_scope = procedure.scope.create_child();
                bind_parameters(procedure, &call_scope, args)?;
                let body = Rc::clone(&procedure.body);
                self.eval_body(&call_scope, &body)
            }
            Value::Builtin(builtin) => {
                builtin.arity.validate(args.len())?;
                Ok((builtin.func)(args)?.into())
            }
            Value::Escape(escape) => Err(continuations::invoke_escape(self, escape, args)),
            Value::Parameter(parameter) => {
                if !args.is_empty() {
                    return Err(Error::arity_error(0, args.len()).into());
                }
                Ok(parameter.value.borrow().clone().into())
            }
            Value::Foreign(handle) => Ok(handle.call(args)?.into()),
            other => Err(Error::TypeError(format!(
                "Cannot apply non-procedure: {other}"
            ))
            .into()),
        }
    }
}

/// Member-access operator text without its leading `.`
fn member_name(symbol: Symbol) -> Option<String> {
    symbol.with_name(|text| {
        (text.len() > 1 && text.starts_with('.') && text != "...").then(|| text[1..].to_owned())
    })
}

fn with_expression(error: Error, form: &Value) -> Error {
    match error {
        Error::ArityError {
            expected,
            got,
            expression: None,
        } => Error::arity_error_with_expr(expected, got, form.to_string()),
        other => other,
    }
}

fn bind_parameters(procedure: &Procedure, scope: &Rc<Scope>, args: Vec<Value>) -> Result<(), Error> {
    let arity_failure = |expected: usize, got: usize| match *procedure.name.borrow() {
        Some(name) => Error::arity_error_with_expr(expected, got, format!("({name} ...)")),
        None => Error::arity_error(expected, got),
    };
    match &procedure.params {
        ParamSpec::Variadic(name) => scope.define(*name, Value::list_from(args)),
        ParamSpec::Fixed(names) => {
            if names.len() != args.len() {
                return Err(arity_failure(names.len(), args.len()));
            }
            for (name, arg) in names.iter().zip(args) {
                scope.define(*name, arg)?;
            }
            Ok(())
        }
        ParamSpec::Rest(names, rest) => {
            if args.len() < names.len() {
                return Err(arity_failure(names.len(), args.len()));
            }
            let mut args = args.into_iter();
            for (name, arg) in names.iter().zip(args.by_ref()) {
                scope.define(*name, arg)?;
            }
            scope.define(*rest, Value::list_from(args.collect::<Vec<_>>()))
        }
    }
}

/// Build a procedure value closing over `scope`
pub(crate) fn make_procedure(
    params: ParamSpec,
    body: Vec<Value>,
    scope: &Rc<Scope>,
    name: Option<Symbol>,
) -> Value {
    Value::Procedure(Rc::new(Procedure {
        params,
        body: Rc::from(body),
        scope: Rc::clone(scope),
        name: std::cell::RefCell::new(name),
    }))
}

#[cfg(all(test, feature = "scheme"))]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{Atom, NumberType, nil, sym, val};
    use crate::scheme::parse_program;

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    /// Macro for setup expressions that return Unspecified (like define)
    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, EvalResult(Value::Unspecified))
        };
    }

    /// Run tests in isolated runtimes with shared state
    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let mut runtime = Runtime::new();
            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut runtime, &test_id);
            }
        }
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(input: &str, expected: &TestResult, runtime: &mut Runtime, test_id: &str) {
        let program = match parse_program(input) {
            Ok(program) => program,
            Err(parse_err) => {
                panic!("{test_id}: unexpected parse error for '{input}': {parse_err:?}");
            }
        };

        match (runtime.eval(&program), expected) {
            (Ok(actual), EvalResult(expected_val)) => match (&actual, expected_val) {
                (Value::Unspecified, Value::Unspecified) => {}
                _ => assert!(
                    actual == *expected_val,
                    "{test_id}: '{input}' expected {expected_val:?}, got {actual:?}"
                ),
            },
            (Err(_), Error) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: '{input}' error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), Error) => {
                panic!("{test_id}: '{input}' expected error, got {actual:?}");
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!(
                    "{test_id}: '{input}' expected error containing '{expected_text}', got {actual:?}"
                );
            }
            (Err(err), EvalResult(expected_val)) => {
                panic!("{test_id}: '{input}' expected {expected_val:?}, got error {err:?}");
            }
        }
    }

    /// Simplified test runner with specific error message support
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut runtime = Runtime::new();
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &mut runtime, &test_id);
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", success(42)),
            ("-271", success(-271)),
            ("9223372036854775807", success(NumberType::MAX)),
            ("2.5", success(2.5)),
            ("#t", success(true)),
            ("#f", success(false)),
            ("\"hello\"", success("hello")),
            ("\"with\\\"quotes\"", success("with\"quotes")),
            ("#\\a", success('a')),
            ("", EvalResult(Value::Unspecified)),
            // === SYMBOL RESOLUTION ===
            ("null", EvalResult(Value::Unspecified)),
            ("nil", EvalResult(nil())),
            ("undefined-thing", SpecificError("Unbound variable: undefined-thing")),
            // === ARITHMETIC ===
            ("(+ 1 2 3)", success(6)),
            ("(+)", success(0)),
            ("(- 10 3 2)", success(5)),
            ("(- 10)", success(-10)),
            ("(* 2 3 4)", success(24)),
            ("(+ 1 2.5)", success(3.5)),
            ("(/ 10 4)", success(2.5)),
            ("(/ 10 5)", success(2)),
            ("(/ 1 0)", SpecificError("Division by zero")),
            ("(+ (* 2 3) (- 8 2))", success(12)),
            ("(+ 9223372036854775807 1)", SpecificError("overflow")),
            ("(+ 1 \"a\")", SpecificError("expected number")),
            // === COMPARISON ===
            ("(= 5 5)", success(true)),
            ("(< 1 2 3)", success(true)),
            ("(< 1 3 2)", success(false)),
            ("(>= 3 3 1)", success(true)),
            // === IF AND TRUTHINESS ===
            ("(if #t 1 2)", success(1)),
            ("(if #f 1 2)", success(2)),
            ("(if 0 'yes 'no)", EvalResult(sym("yes"))),
            ("(if \"\" 'yes 'no)", EvalResult(sym("yes"))),
            ("(if '() 'yes 'no)", EvalResult(sym("yes"))),
            ("(if #f #f)", EvalResult(Value::Unspecified)),
            ("(if)", Error),
            // === QUOTE ===
            ("'foo", EvalResult(sym("foo"))),
            ("'(1 2 3)", success([1, 2, 3])),
            ("(quote (a b))", EvalResult(val(vec![sym("a"), sym("b")]))),
            ("''a", EvalResult(val(vec![sym("quote"), sym("a")]))),
            ("'()", EvalResult(nil())),
            // === VECTOR LITERALS ===
            ("#(1 2 3)", EvalResult(Value::vector(vec![val(1), val(2), val(3)]))),
            ("#(a (+ 1 2))", EvalResult(Value::vector(vec![sym("a"), val(3)]))),
            // === LAMBDA AND APPLICATION ===
            ("((lambda (x) (* x x)) 5)", success(25)),
            ("((lambda args args) 1 2 3)", success([1, 2, 3])),
            ("((lambda (a . rest) rest) 1 2 3)", success([2, 3])),
            ("((lambda (a . rest) rest) 1)", EvalResult(nil())),
            ("((lambda () 42))", success(42)),
            ("((lambda (x x) x) 1 2)", SpecificError("Duplicate parameter name")),
            ("((lambda (x) x))", SpecificError("ArityError")),
            ("((lambda (a b . c) a) 1)", SpecificError("ArityError")),
            ("(5 1 2)", SpecificError("Cannot apply non-procedure")),
            ("(car)", SpecificError("expected 1 arguments, got 0")),
            // === UNQUOTE OUTSIDE QUASIQUOTE ===
            (",x", SpecificError("only valid inside quasiquote")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_environment_sensitive_operations() {
        let test_environments = vec![
            TestEnvironment(vec![
                test_setup!("(define x 10)"),
                ("x", success(10)),
                ("(define x 20)", SpecificError("Duplicate definition")),
                ("(set! x 30)", EvalResult(Value::Unspecified)),
                ("x", success(30)),
                ("(set! car 1)", SpecificError("Immutable scope")),
                ("(set! nowhere 1)", SpecificError("Undefined variable")),
            ]),
            TestEnvironment(vec![
                test_setup!("(define (make-counter) (let ((n 0)) (lambda () (set! n (+ n 1)) n)))"),
                test_setup!("(define c1 (make-counter))"),
                test_setup!("(define c2 (make-counter))"),
                ("(c1)", success(1)),
                ("(c1)", success(2)),
                ("(c2)", success(1)),
            ]),
            TestEnvironment(vec![
                test_setup!("(define y 1)"),
                test_setup!("(define (shadow y) (define y 2) y)"),
                ("(shadow 5)", SpecificError("Duplicate definition")),
                test_setup!("(define (inner) (define y 2) y)"),
                ("(inner)", success(2)),
                ("y", success(1)),
            ]),
            TestEnvironment(vec![
                test_setup!("(define (loop n acc) (if (= n 0) acc (loop (- n 1) (+ acc n))))"),
                ("(loop 100000 0)", success(5_000_050_000_i64)),
            ]),
            TestEnvironment(vec![
                test_setup!("(define (even? n) (if (= n 0) #t (odd? (- n 1))))"),
                test_setup!("(define (odd? n) (if (= n 0) #f (even? (- n 1))))"),
                ("(even? 10001)", success(false)),
            ]),
        ];

        run_tests_in_environment(test_environments);
    }

    #[test]
    fn test_depth_guard_stops_non_tail_recursion() {
        let mut runtime = Runtime::with_config(RuntimeConfig {
            max_eval_depth: 64,
            load_prelude: false,
        });
        let program = parse_program("(define (down n) (+ 1 (down n))) (down 1)").unwrap();
        let err = runtime.eval(&program).unwrap_err();
        assert!(format!("{err}").contains("depth limit exceeded"), "{err}");

        // the runtime stays usable after an aborted evaluation
        assert_eq!(runtime.eval_str("(+ 1 2)").unwrap(), val(3));
    }

    #[test]
    fn test_register_builtin_operations() {
        fn add(a: NumberType, b: NumberType) -> Result<NumberType, crate::Error> {
            Ok(a + b)
        }
        fn weighted_sum(weight: NumberType, nums: NumIter) -> Result<Value, crate::Error> {
            let total: f64 = nums.map(|n| n.as_f64()).sum();
            Ok(val(weight as f64 * total))
        }

        let mut runtime = Runtime::new();
        runtime.register_builtin::<_, (NumberType, NumberType)>("add2", add).unwrap();
        runtime
            .register_variadic_builtin::<_, (NumberType, NumIter)>(
                "weighted-sum",
                Arity::AtLeast(1),
                weighted_sum,
            )
            .unwrap();

        assert_eq!(runtime.eval_str("(add2 7 5)").unwrap(), val(12));
        assert_eq!(runtime.eval_str("(weighted-sum 2 1 2 3)").unwrap(), val(12.0));
        assert!(matches!(
            runtime.eval_str("(weighted-sum)"),
            Err(crate::Error::ArityError { .. })
        ));
        // builtins are first-class values
        assert_eq!(
            runtime.eval_str("((lambda (op a b) (op a b)) add2 1 2)").unwrap(),
            val(3)
        );
    }

    #[test]
    fn test_procedures_capture_defining_scope() {
        let mut runtime = Runtime::new();
        let result = runtime
            .eval_str(
                "(define x 'outer)
                 (define (get-x) x)
                 (define (call-with-x x) (get-x))
                 (call-with-x 'inner)",
            )
            .unwrap();
        assert_eq!(result, sym("outer"));
    }

    #[test]
    fn test_define_names_procedures() {
        let mut runtime = Runtime::new();
        let result = runtime.eval_str("(define (square x) (* x x)) square").unwrap();
        assert_eq!(result.to_string(), "#<procedure square>");
        let anonymous = runtime.eval_str("(lambda (x) x)").unwrap();
        assert_eq!(anonymous.to_string(), "#<procedure>");
    }

    #[test]
    fn test_member_access_delegates_to_resolver() {
        use crate::interop::{ForeignFn, ForeignResolver};

        struct Host;

        impl ForeignResolver for Host {
            fn resolve(
                &self,
                name: &str,
                arity: Option<usize>,
                namespaces: &[Rc<str>],
            ) -> Option<Value> {
                match name {
                    "host-arity" => Some(val(arity.map_or(-1, |a| a as NumberType))),
                    "Greet" if namespaces.iter().any(|ns| &**ns == "Demo") => Some(
                        ForeignFn::new("Greet", |args: Vec<Value>| Ok(val(args.len() as NumberType)))
                            .into_value(),
                    ),
                    _ => None,
                }
            }

            fn invoke_member(&self, member: &str, args: Vec<Value>) -> Result<Value, crate::Error> {
                Ok(Value::list_from(
                    std::iter::once(val(member)).chain(args).collect::<Vec<_>>(),
                ))
            }
        }

        let mut runtime = Runtime::new().with_resolver(Host);
        assert_eq!(
            runtime.eval_str("(.Length \"abc\" (+ 1 2))").unwrap(),
            val(vec![val("Length"), val("abc"), val(3)])
        );
        assert_eq!(runtime.eval_str("host-arity").unwrap(), val(-1));
        assert!(runtime.eval_str("(Greet 1 2)").is_err());
        runtime.eval_str("(use-namespace \"Demo\")").unwrap();
        assert_eq!(runtime.eval_str("(Greet 1 2)").unwrap(), val(2));
        // `...` and `.` are never member access
        assert!(matches!(
            runtime.eval_str("(... 1)"),
            Err(crate::Error::UnboundVariable(_))
        ));
    }

    #[test]
    fn test_raw_ast_evaluation() {
        let mut runtime = Runtime::new();
        let expr = val(vec![sym("+"), val(1), val(vec![sym("*"), val(2), val(3)])]);
        assert_eq!(runtime.eval(&expr).unwrap(), val(7));
        assert!(matches!(
            runtime.eval(&Value::Atom(Atom::Bool(false))).unwrap(),
            Value::Atom(Atom::Bool(false))
        ));
    }
}
