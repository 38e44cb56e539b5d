//! Host special forms.
//!
//! A special form receives the runtime, the use-site scope and its operand forms
//! *unevaluated*. Forms that end in a tail position (`if` branches, bodies, the
//! applied procedure of `apply` or `cond =>`) return a [`Trampoline`] marker for
//! that position instead of evaluating it, which keeps loops written with them in
//! constant native stack.
//!
//! ```scheme
//! (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))
//! (let loop ((i 0) (acc '())) (if (= i 3) acc (loop (+ i 1) (cons i acc))))
//! (cond ((assv 2 '((1 . a) (2 . b))) => cdr) (else 'none))
//! ```
//!
//! Registration happens in [`crate::builtinops`]; the arity declared there is
//! checked before any of these functions run.

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::ast::{ParamSpec, Parameter, Symbol, Value, eqv};
use crate::evaluator::scope::Scope;
use crate::evaluator::{Runtime, Trampoline, make_procedure};
use crate::quasiquote::quote_value;
use crate::{Error, Unwind};

/// Host special form: receives raw operand forms and may return a tail marker
pub type MacroFn = fn(&mut Runtime, &Rc<Scope>, &[Value]) -> Result<Trampoline, Unwind>;

fn binding_name(form: &Value, context: &str) -> Result<Symbol, Error> {
    form.as_binding_symbol()
        .ok_or_else(|| Error::TypeError(format!("{context} requires a symbol, got {form}")))
}

/// Evaluate if special form
pub(crate) fn eval_if(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let (test, consequent, alternative) = match args {
        [test, consequent] => (test, consequent, None),
        [test, consequent, alternative] => (test, consequent, Some(alternative)),
        _ => return Err(Error::arity_error(3, args.len()).into()),
    };
    if runtime.evaluate(scope, test)?.is_truthy() {
        runtime.tail(scope, consequent.clone())
    } else {
        match alternative {
            Some(alternative) => runtime.tail(scope, alternative.clone()),
            None => Ok(Value::Unspecified.into()),
        }
    }
}

/// Evaluate begin special form
pub(crate) fn eval_begin(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    runtime.eval_body(scope, args)
}

/// Evaluate define special form
pub(crate) fn eval_define(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    match args {
        // (define (name . params) body...)
        [Value::Pair(signature), body @ ..] => {
            let name = binding_name(&signature.car(), "define")?;
            let params = ParamSpec::from_form(&signature.cdr())?;
            let procedure = make_procedure(params, body.to_vec(), scope, Some(name));
            scope.define(name, procedure)?;
        }
        [target] => scope.define(binding_name(target, "define")?, Value::Unspecified)?,
        [target, expr] => {
            let name = binding_name(target, "define")?;
            let value = runtime.evaluate(scope, expr)?;
            if let Value::Procedure(procedure) = &value {
                let mut slot = procedure.name.borrow_mut();
                if slot.is_none() {
                    *slot = Some(name);
                }
            }
            scope.define(name, value)?;
        }
        _ => return Err(Error::arity_error(2, args.len()).into()),
    }
    Ok(Value::Unspecified.into())
}

/// Evaluate set! special form
pub(crate) fn eval_set(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    match args {
        [target, expr] => {
            let name = binding_name(target, "set!")?;
            let value = runtime.evaluate(scope, expr)?;
            scope.set(name, value)?;
            Ok(Value::Unspecified.into())
        }
        _ => Err(Error::arity_error(2, args.len()).into()),
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(
    _runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    match args {
        [params, body @ ..] if !body.is_empty() => {
            let params = ParamSpec::from_form(params)?;
            Ok(make_procedure(params, body.to_vec(), scope, None).into())
        }
        _ => Err(Error::arity_error(2, args.len()).into()),
    }
}

struct Binding {
    name: Symbol,
    init: Option<Value>,
}

// `x`, `(x)` and `(x expr)` are all accepted
fn parse_bindings(form: &Value) -> Result<SmallVec<[Binding; 8]>, Error> {
    let mut bindings = SmallVec::new();
    for entry in form.list_to_vec()? {
        let binding = match &entry {
            Value::Pair(_) => match entry.list_to_vec()?.as_slice() {
                [name] => Binding {
                    name: binding_name(name, "let binding")?,
                    init: None,
                },
                [name, init] => Binding {
                    name: binding_name(name, "let binding")?,
                    init: Some(init.clone()),
                },
                _ => {
                    return Err(Error::EvalError(format!("malformed let binding: {entry}")));
                }
            },
            other => Binding {
                name: binding_name(other, "let binding")?,
                init: None,
            },
        };
        bindings.push(binding);
    }
    Ok(bindings)
}

// Initializers run one at a time in the new scope, so later ones see earlier names
fn let_block(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    bindings: &Value,
    body: &[Value],
) -> Result<Trampoline, Unwind> {
    let block = scope.create_child();
    for Binding { name, init } in parse_bindings(bindings)? {
        let value = match init {
            Some(init) => runtime.evaluate(&block, &init)?,
            None => Value::Unspecified,
        };
        block.define(name, value)?;
    }
    runtime.eval_body(&block, body)
}

/// Evaluate let special form, including the named-let loop form
pub(crate) fn eval_let(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    match args {
        [name @ (Value::Symbol(_) | Value::Scoped(_)), bindings, body @ ..] => {
            let name = binding_name(name, "named let")?;
            let bindings = parse_bindings(bindings)?;
            let mut params = Vec::with_capacity(bindings.len());
            let mut inits = Vec::with_capacity(bindings.len());
            for Binding { name, init } in bindings {
                params.push(Value::Symbol(name));
                inits.push(match init {
                    Some(init) => runtime.evaluate(scope, &init)?,
                    None => Value::Unspecified,
                });
            }
            let params = ParamSpec::from_form(&Value::list_from(params))?;
            let loop_scope = scope.create_child();
            let procedure = make_procedure(params, body.to_vec(), &loop_scope, Some(name));
            loop_scope.define(name, procedure.clone())?;
            runtime.tail_apply(procedure, inits)
        }
        [bindings, body @ ..] => let_block(runtime, scope, bindings, body),
        [] => Err(Error::arity_error(1, 0).into()),
    }
}

/// Evaluate let* special form
pub(crate) fn eval_let_star(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    match args {
        [bindings, body @ ..] => let_block(runtime, scope, bindings, body),
        [] => Err(Error::arity_error(1, 0).into()),
    }
}

/// Evaluate letrec and letrec* special forms
pub(crate) fn eval_letrec(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    eval_let_star(runtime, scope, args)
}

fn clause_parts(clause: &Value, form: &str) -> Result<Vec<Value>, Error> {
    match clause.list_to_vec() {
        Ok(parts) if !parts.is_empty() => Ok(parts),
        _ => Err(Error::EvalError(format!("malformed {form} clause: {clause}"))),
    }
}

// Shared tail of cond and case clauses: `=> proc` or a body
fn clause_result(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    tested: Value,
    rest: &[Value],
) -> Result<Trampoline, Unwind> {
    match rest {
        [] => Ok(tested.into()),
        [arrow, receiver] if arrow.is_symbol_named("=>") => {
            let receiver = runtime.evaluate(scope, receiver)?;
            runtime.tail_apply(receiver, vec![tested])
        }
        [arrow, ..] if arrow.is_symbol_named("=>") => Err(Error::EvalError(
            "=> must be followed by exactly one expression".to_owned(),
        )
        .into()),
        body => runtime.eval_body(scope, body),
    }
}

/// Evaluate cond special form
pub(crate) fn eval_cond(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    for (index, clause) in args.iter().enumerate() {
        let parts = clause_parts(clause, "cond")?;
        let (test, rest) = (&parts[0], &parts[1..]);
        if test.is_symbol_named("else") {
            if index + 1 != args.len() {
                return Err(Error::EvalError("else clause must be the last cond clause".to_owned()).into());
            }
            return runtime.eval_body(scope, rest);
        }
        let tested = runtime.evaluate(scope, test)?;
        if tested.is_truthy() {
            return clause_result(runtime, scope, tested, rest);
        }
    }
    Err(Error::EvalError("cond: no clause matched and there is no else clause".to_owned()).into())
}

/// Evaluate case special form
pub(crate) fn eval_case(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [key, clauses @ ..] = args else {
        return Err(Error::arity_error(2, args.len()).into());
    };
    let key = runtime.evaluate(scope, key)?;
    for (index, clause) in clauses.iter().enumerate() {
        let parts = clause_parts(clause, "case")?;
        let (data, rest) = (&parts[0], &parts[1..]);
        if data.is_symbol_named("else") {
            if index + 1 != clauses.len() {
                return Err(Error::EvalError("else clause must be the last case clause".to_owned()).into());
            }
            return match rest {
                [arrow, ..] if arrow.is_symbol_named("=>") => {
                    clause_result(runtime, scope, key, rest)
                }
                body => runtime.eval_body(scope, body),
            };
        }
        let matched = data
            .list_to_vec()?
            .iter()
            .any(|datum| eqv(&quote_value(datum), &key));
        if matched {
            return match rest {
                [] => Ok(Value::Unspecified.into()),
                _ => clause_result(runtime, scope, key, rest),
            };
        }
    }
    Ok(Value::Unspecified.into())
}

/// Evaluate and special form
pub(crate) fn eval_and(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let Some((last, init)) = args.split_last() else {
        return Err(Error::arity_error(2, 0).into());
    };
    for form in init {
        if !runtime.evaluate(scope, form)?.is_truthy() {
            return Ok(Value::boolean(false).into());
        }
    }
    runtime.tail(scope, last.clone())
}

/// Evaluate or special form
pub(crate) fn eval_or(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let Some((last, init)) = args.split_last() else {
        return Err(Error::arity_error(2, 0).into());
    };
    for form in init {
        let value = runtime.evaluate(scope, form)?;
        if value.is_truthy() {
            return Ok(value.into());
        }
    }
    runtime.tail(scope, last.clone())
}

/// `(apply proc arg... list)`: the last operand is spread into the call
pub(crate) fn eval_apply(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [operator, operands @ ..] = args else {
        return Err(Error::arity_error(2, 0).into());
    };
    let Some((spread, leading)) = operands.split_last() else {
        return Err(Error::arity_error(2, 1).into());
    };
    let callee = runtime.evaluate(scope, operator)?;
    let mut call_args = Vec::with_capacity(leading.len());
    for operand in leading {
        call_args.push(runtime.evaluate(scope, operand)?);
    }
    let spread = runtime.evaluate(scope, spread)?;
    call_args.extend(spread.list_to_vec()?);
    runtime.tail_apply(callee, call_args)
}

fn each_item(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
    mut visit: impl FnMut(Value),
) -> Result<(), Unwind> {
    let [operator, list] = args else {
        return Err(Error::arity_error(2, args.len()).into());
    };
    let callee = runtime.evaluate(scope, operator)?;
    let items = runtime.evaluate(scope, list)?.list_to_vec()?;
    for item in items {
        visit(runtime.call(&callee, vec![item])?);
    }
    Ok(())
}

/// `(map proc list)`
pub(crate) fn eval_map(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let mut results = Vec::new();
    each_item(runtime, scope, args, |value| results.push(value))?;
    Ok(Value::list_from(results).into())
}

/// `(for-each proc list)`
pub(crate) fn eval_for_each(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    each_item(runtime, scope, args, |_| {})?;
    Ok(Value::Unspecified.into())
}

/// `(eval expr [environment])`: the environment operand is evaluated and ignored
pub(crate) fn eval_eval(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let form = match args {
        [expr] => runtime.evaluate(scope, expr)?,
        [expr, environment] => {
            let form = runtime.evaluate(scope, expr)?;
            runtime.evaluate(scope, environment)?;
            form
        }
        _ => return Err(Error::arity_error(1, args.len()).into()),
    };
    runtime.tail(scope, form)
}

/// `(make-parameter value [converter])`
pub(crate) fn eval_make_parameter(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let (value, converter) = match args {
        [value] => (runtime.evaluate(scope, value)?, None),
        [value, converter] => {
            let value = runtime.evaluate(scope, value)?;
            let converter = runtime.evaluate(scope, converter)?;
            (runtime.call(&converter, vec![value])?, Some(converter))
        }
        _ => return Err(Error::arity_error(1, args.len()).into()),
    };
    Ok(Value::Parameter(Rc::new(Parameter {
        value: RefCell::new(value),
        converter,
    }))
    .into())
}

/// `(parameterize ((param value) ...) body...)`
///
/// The body runs to completion here so the previous values can be restored on
/// every exit path, escapes included.
pub(crate) fn eval_parameterize(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [bindings, body @ ..] = args else {
        return Err(Error::arity_error(1, 0).into());
    };
    let mut rebound: SmallVec<[(Rc<Parameter>, Value); 4]> = SmallVec::new();
    for entry in bindings.list_to_vec()? {
        let [param, value]: [Value; 2] = entry.list_to_vec()?.try_into().map_err(|_| {
            Error::EvalError(format!("malformed parameterize binding: {entry}"))
        })?;
        let Value::Parameter(param) = runtime.evaluate(scope, &param)? else {
            return Err(Error::TypeError(format!("parameterize expects a parameter object: {entry}")).into());
        };
        let mut value = runtime.evaluate(scope, &value)?;
        if let Some(converter) = &param.converter {
            value = runtime.call(converter, vec![value])?;
        }
        rebound.push((param, value));
    }

    for (param, value) in &mut rebound {
        std::mem::swap(&mut *param.value.borrow_mut(), value);
    }
    let block = scope.create_child();
    let result = runtime
        .eval_body(&block, body)
        .and_then(|step| runtime.resolve(step));
    for (param, previous) in rebound.into_iter().rev() {
        *param.value.borrow_mut() = previous;
    }
    Ok(result?.into())
}

/// `(use-namespace "Name")` or `(use-namespace Name)`
pub(crate) fn eval_use_namespace(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [namespace] = args else {
        return Err(Error::arity_error(1, args.len()).into());
    };
    let namespace = match namespace.as_binding_symbol() {
        Some(symbol) => symbol.name(),
        None => match runtime.evaluate(scope, namespace)? {
            Value::Atom(crate::ast::Atom::String(text)) => text.to_string(),
            other => {
                return Err(Error::TypeError(format!(
                    "use-namespace expects a string or symbol, got {other}"
                ))
                .into());
            }
        },
    };
    scope.use_namespace(&namespace);
    Ok(Value::Unspecified.into())
}

#[cfg(all(test, feature = "scheme"))]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
    }
    use TestResult::*;

    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let mut runtime = Runtime::new();
            let result = runtime.eval_str(input);
            match (result, expected) {
                (Ok(Value::Unspecified), EvalResult(Value::Unspecified)) => {}
                (Ok(actual), EvalResult(expected)) => {
                    assert_eq!(actual, expected, "#{}: '{input}'", i + 1);
                }
                (Err(_), Error) => {}
                (Err(err), SpecificError(text)) => {
                    let message = err.to_string();
                    assert!(
                        message.contains(text),
                        "#{}: '{input}' error should contain '{text}', got: {message}",
                        i + 1
                    );
                }
                (actual, expected) => {
                    panic!("#{}: '{input}' expected {expected:?}, got {actual:?}", i + 1)
                }
            }
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_special_forms_data_driven() {
        let test_cases = vec![
            // === DEFINE / SET! ===
            ("(define x 5) x", success(5)),
            ("(define x) x", EvalResult(Value::Unspecified)),
            ("(define (f . args) args) (f 1 2)", success([1, 2])),
            ("(define (f a #t) a)", SpecificError("Lambda parameters must be symbols")),
            ("(define 5 1)", SpecificError("define requires a symbol")),
            ("(define x 1 2)", SpecificError("ArityError")),
            // === BEGIN ===
            ("(begin)", EvalResult(Value::Unspecified)),
            ("(begin 1 2 3)", success(3)),
            ("(begin (define b 1) (set! b (+ b 1)) b)", success(2)),
            // === LET FAMILY ===
            ("(let ((x 1) (y 2)) (+ x y))", success(3)),
            ("(let ((x 1) (y x)) y)", success(1)),
            ("(let (x) x)", EvalResult(Value::Unspecified)),
            ("(let ((x)) x)", EvalResult(Value::Unspecified)),
            ("(let ((x 1) (x 2)) x)", SpecificError("Duplicate definition")),
            ("(let ((x 1 2)) x)", SpecificError("malformed let binding")),
            ("(let ())", EvalResult(Value::Unspecified)),
            ("(let* ((a 1) (b (+ a 1))) b)", success(2)),
            ("(letrec ((ev? (lambda (n) (if (= n 0) #t (od? (- n 1))))) (od? (lambda (n) (if (= n 0) #f (ev? (- n 1)))))) (ev? 100))", success(true)),
            ("(letrec* ((a 1) (b (* a 10))) b)", success(10)),
            ("(let loop ((i 0) (acc '())) (if (= i 3) acc (loop (+ i 1) (cons i acc))))", success([2, 1, 0])),
            ("(let loop ((i 0)) (if (< i 100000) (loop (+ i 1)) i))", success(100_000)),
            ("(define x 10) (let ((x 1)) (set! x 2)) x", success(10)),
            // === COND / CASE ===
            ("(cond (#f 1) (#t 2))", success(2)),
            ("(cond ((+ 1 1)))", success(2)),
            ("(cond (#f 1) (else 3))", success(3)),
            ("(cond ((assv 2 '((1 . a) (2 . b))) => cdr) (else 'none))", EvalResult(sym("b"))),
            ("(cond (else 1) (#t 2))", SpecificError("else clause must be the last")),
            ("(cond (#f 1))", SpecificError("no clause matched")),
            ("(cond ())", SpecificError("malformed cond clause")),
            ("(case 3 ((1 2) 'low) ((3 4) 'mid) (else 'high))", EvalResult(sym("mid"))),
            ("(case 'x ((a) 1) ((x y) 2))", success(2)),
            ("(case 9 ((1) 'one) (else => (lambda (k) (* k 2))))", success(18)),
            ("(case 9 ((1) 'one))", EvalResult(Value::Unspecified)),
            // === AND / OR ===
            ("(and 1 2 3)", success(3)),
            ("(and 1 #f 3)", success(false)),
            ("(and 1)", SpecificError("ArityError")),
            ("(or #f 2 3)", success(2)),
            ("(or #f #f)", success(false)),
            ("(or '() #f)", EvalResult(nil())),
            ("(define n 0) (or #t (set! n 1)) n", success(0)),
            // === APPLY / MAP / FOR-EACH / EVAL ===
            ("(apply + '(1 2 3))", success(6)),
            ("(apply + 1 2 '(3 4))", success(10)),
            ("(apply + 1)", Error),
            ("(map (lambda (x) (* x x)) '(1 2 3))", success([1, 4, 9])),
            ("(map car '((a 1) (b 2)))", EvalResult(val(vec![sym("a"), sym("b")]))),
            ("(map + '(1 2) '(3 4))", SpecificError("ArityError")),
            ("(define total 0) (for-each (lambda (x) (set! total (+ total x))) '(1 2 3)) total", success(6)),
            ("(eval '(+ 1 2))", success(3)),
            ("(eval (list 'quote 'a))", EvalResult(sym("a"))),
            // === PARAMETERS ===
            ("(define p (make-parameter 10)) (p)", success(10)),
            ("(define p (make-parameter 10)) (parameterize ((p 20)) (p))", success(20)),
            ("(define p (make-parameter 10)) (parameterize ((p 20)) 1) (p)", success(10)),
            ("(define p (make-parameter 1 (lambda (x) (* x 2)))) (list (p) (parameterize ((p 5)) (p)))", success([2, 10])),
            ("(parameterize ((car 1)) 1)", SpecificError("parameter object")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_parameterize_restores_on_error() {
        let mut runtime = Runtime::new();
        runtime.eval_str("(define p (make-parameter 'outer))").unwrap();
        assert!(runtime.eval_str("(parameterize ((p 'inner)) (car '()))").is_err());
        assert_eq!(runtime.eval_str("(p)").unwrap(), sym("outer"));
    }

    #[test]
    fn test_define_does_not_rename_procedures() {
        let mut runtime = Runtime::new();
        let value = runtime
            .eval_str("(define (original) 1) (define alias original) alias")
            .unwrap();
        assert_eq!(value.to_string(), "#<procedure original>");
    }

    #[test]
    fn test_use_namespace_forms() {
        let mut runtime = Runtime::new();
        runtime.eval_str("(use-namespace \"System\") (use-namespace Linq)").unwrap();
        let names: Vec<String> = runtime
            .user_scope()
            .namespaces()
            .iter()
            .map(|ns| ns.to_string())
            .collect();
        assert_eq!(names, vec!["System", "Linq"]);
        assert!(runtime.eval_str("(use-namespace 42)").is_err());
    }
}
