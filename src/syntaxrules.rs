//! `syntax-rules` pattern macros.
//!
//! A [`Syntax`] value holds a literal set, an ordered list of `(pattern template)`
//! rules and a weak back-reference to the scope it was defined in. Expansion picks
//! the first rule whose pattern matches the raw operand forms, then instantiates
//! its template:
//!
//! - pattern variables are replaced by the forms they captured, verbatim;
//! - `sub ...` in a template repeats `sub` once per captured element;
//! - a free template symbol that is bound in the defining scope becomes a scoped
//!   identifier, so it resolves where the macro was written rather than where it
//!   is used;
//! - a symbol the template binds itself (`lambda` formals, `define` targets,
//!   `let`-family and named-`let` names) stays a plain symbol everywhere in that
//!   template, so its references see the local binding.
//!
//! Nothing is renamed, so a template binding can capture a use-site name passed
//! in through a pattern variable. Only the free identifiers the macro author
//! introduces are protected.
//!
//! ```scheme
//! (define-syntax swap!
//!   (syntax-rules ()
//!     ((_ a b) (let ((tmp a)) (set! a b) (set! b tmp)))))
//! (define-syntax my-let
//!   (syntax-rules ()
//!     ((_ ((name val) ...) body ...) ((lambda (name ...) body ...) val ...))))
//! ```

use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::ast::{ScopedIdent, Symbol, Value};
use crate::evaluator::scope::Scope;
use crate::evaluator::{Runtime, Trampoline};
use crate::quasiquote::quote_value;
use crate::{Error, Unwind};

/// User macro defined with `syntax-rules`
pub struct Syntax {
    pub name: Symbol,
    literals: Vec<Symbol>,
    rules: Vec<SyntaxRule>,
    scope: Weak<Scope>,
}

struct SyntaxRule {
    /// Pattern without its leading keyword position
    pattern: Value,
    template: Value,
}

impl fmt::Debug for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Syntax")
            .field("name", &self.name)
            .field("literals", &self.literals)
            .field("rules", &self.rules.len())
            .finish()
    }
}

#[derive(Clone, Debug)]
enum MatchTree {
    One(Value),
    /// One entry per element matched by an ellipsis
    Seq(Vec<MatchTree>),
}

type Bindings = HashMap<Symbol, MatchTree>;

// Reserved identifiers, interned once per expansion
struct Keywords {
    ellipsis: Symbol,
    underscore: Symbol,
}

impl Keywords {
    fn new() -> Self {
        Keywords {
            ellipsis: Symbol::new("..."),
            underscore: Symbol::new("_"),
        }
    }

    fn is_ellipsis(&self, form: &Value) -> bool {
        form.as_binding_symbol() == Some(self.ellipsis)
    }
}

fn split_list(list: &Value) -> (Vec<Value>, Value) {
    let mut iter = list.iter_list();
    let items = iter.by_ref().collect();
    (items, iter.tail().clone())
}

impl Syntax {
    /// Build a macro from the operands of a `syntax-rules` form:
    /// `((literal ...) (pattern template) ...)`
    pub(crate) fn from_rules(name: Symbol, scope: &Rc<Scope>, operands: &[Value]) -> Result<Self, Error> {
        let [literals, rules @ ..] = operands else {
            return Err(Error::EvalError("syntax-rules requires a literal list".to_owned()));
        };
        let literals = literals
            .list_to_vec()?
            .iter()
            .map(|literal| {
                literal.as_binding_symbol().ok_or_else(|| {
                    Error::TypeError(format!("syntax-rules literals must be symbols, got {literal}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rules = rules
            .iter()
            .map(|rule| match rule.list_to_vec()?.as_slice() {
                [Value::Pair(pattern), template] => Ok(SyntaxRule {
                    pattern: pattern.cdr(),
                    template: template.clone(),
                }),
                _ => Err(Error::EvalError(format!("malformed syntax rule: {rule}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Syntax {
            name,
            literals,
            rules,
            scope: Rc::downgrade(scope),
        })
    }

    fn matcher(&self) -> Matcher<'_> {
        Matcher {
            literals: &self.literals,
            keywords: Keywords::new(),
        }
    }
}

struct Matcher<'a> {
    literals: &'a [Symbol],
    keywords: Keywords,
}

impl Matcher<'_> {
    fn is_variable(&self, symbol: Symbol) -> bool {
        symbol != self.keywords.ellipsis
            && symbol != self.keywords.underscore
            && !self.literals.contains(&symbol)
    }

    fn match_form(&self, pattern: &Value, form: &Value, bindings: &mut Bindings) -> bool {
        match pattern {
            Value::Symbol(_) | Value::Scoped(_) => {
                let Some(symbol) = pattern.as_binding_symbol() else {
                    return false;
                };
                if symbol == self.keywords.underscore {
                    true
                } else if self.literals.contains(&symbol) {
                    form.as_binding_symbol() == Some(symbol)
                } else {
                    bindings.insert(symbol, MatchTree::One(form.clone()));
                    true
                }
            }
            Value::Pair(_) => match form {
                Value::Pair(_) | Value::Nil => {
                    let (patterns, pattern_tail) = split_list(pattern);
                    let (forms, form_tail) = split_list(form);
                    self.match_sequence(&patterns, &pattern_tail, &forms, &form_tail, bindings)
                }
                _ => false,
            },
            Value::Vector(patterns) => match form {
                Value::Vector(forms) => {
                    let patterns = patterns.borrow().clone();
                    let forms = forms.borrow().clone();
                    self.match_sequence(&patterns, &Value::Nil, &forms, &Value::Nil, bindings)
                }
                _ => false,
            },
            literal => literal == form,
        }
    }

    fn match_all(&self, patterns: &[Value], forms: &[Value], bindings: &mut Bindings) -> bool {
        patterns
            .iter()
            .zip(forms)
            .all(|(pattern, form)| self.match_form(pattern, form, bindings))
    }

    fn match_sequence(
        &self,
        patterns: &[Value],
        pattern_tail: &Value,
        forms: &[Value],
        form_tail: &Value,
        bindings: &mut Bindings,
    ) -> bool {
        let ellipsis = patterns.iter().position(|p| self.keywords.is_ellipsis(p));
        match ellipsis {
            None if pattern_tail.is_nil() => {
                forms.len() == patterns.len()
                    && form_tail.is_nil()
                    && self.match_all(patterns, forms, bindings)
            }
            // (a b . rest)
            None => {
                if forms.len() < patterns.len() || !self.match_all(patterns, forms, bindings) {
                    return false;
                }
                let rest = Value::list_with_tail(forms[patterns.len()..].to_vec(), form_tail.clone());
                self.match_form(pattern_tail, &rest, bindings)
            }
            // a bare `...` takes the whole remaining group
            Some(0) => {
                if patterns.len() != 1 || !pattern_tail.is_nil() || !form_tail.is_nil() {
                    return false;
                }
                let group = forms.iter().cloned().map(MatchTree::One).collect();
                bindings.insert(self.keywords.ellipsis, MatchTree::Seq(group));
                true
            }
            Some(index) => {
                let (before, repeated, after) =
                    (&patterns[..index - 1], &patterns[index - 1], &patterns[index + 1..]);
                if !pattern_tail.is_nil()
                    || !form_tail.is_nil()
                    || forms.len() < before.len() + after.len()
                    || after.iter().any(|p| self.keywords.is_ellipsis(p))
                {
                    return false;
                }
                let middle_end = forms.len() - after.len();
                if !self.match_all(before, &forms[..before.len()], bindings)
                    || !self.match_all(after, &forms[middle_end..], bindings)
                {
                    return false;
                }

                let mut iterations = Vec::with_capacity(middle_end - before.len());
                for form in &forms[before.len()..middle_end] {
                    let mut iteration = Bindings::new();
                    if !self.match_form(repeated, form, &mut iteration) {
                        return false;
                    }
                    iterations.push(iteration);
                }
                let mut variables = Vec::new();
                self.collect_variables(repeated, &mut variables);
                for variable in variables {
                    let trees = iterations
                        .iter_mut()
                        .map(|iteration| {
                            iteration
                                .remove(&variable)
                                .unwrap_or(MatchTree::Seq(Vec::new()))
                        })
                        .collect();
                    bindings.insert(variable, MatchTree::Seq(trees));
                }
                true
            }
        }
    }

    /// Pattern variables occurring in `form`, which may be a pattern or a template
    fn collect_variables(&self, form: &Value, out: &mut Vec<Symbol>) {
        match form {
            Value::Symbol(_) | Value::Scoped(_) => {
                if let Some(symbol) = form.as_binding_symbol()
                    && self.is_variable(symbol)
                    && !out.contains(&symbol)
                {
                    out.push(symbol);
                }
            }
            Value::Pair(_) => {
                let (items, tail) = split_list(form);
                for item in &items {
                    self.collect_variables(item, out);
                }
                self.collect_variables(&tail, out);
            }
            Value::Vector(items) => {
                for item in items.borrow().iter() {
                    self.collect_variables(item, out);
                }
            }
            Value::Quote(inner)
            | Value::Quasiquote(inner)
            | Value::Unquote(inner)
            | Value::UnquoteSplicing(inner) => self.collect_variables(inner, out),
            _ => {}
        }
    }
}

struct Instantiator<'a> {
    matcher: Matcher<'a>,
    home: Option<Rc<Scope>>,
    scope: &'a Weak<Scope>,
    /// Names the template binds itself; these stay plain symbols
    local: Vec<Symbol>,
}

impl Instantiator<'_> {
    fn instantiate(&self, template: &Value, bindings: &Bindings) -> Result<Value, Error> {
        match template {
            Value::Symbol(_) | Value::Scoped(_) => {
                let Some(symbol) = template.as_binding_symbol() else {
                    return Ok(template.clone());
                };
                match bindings.get(&symbol) {
                    Some(MatchTree::One(value)) => Ok(value.clone()),
                    Some(MatchTree::Seq(_)) => Err(Error::EvalError(format!(
                        "pattern variable {symbol} must be followed by ..."
                    ))),
                    None => Ok(self.free_identifier(template, symbol)),
                }
            }
            Value::Pair(_) => {
                let (items, tail) = split_list(template);
                let items = self.instantiate_sequence(&items, bindings)?;
                let tail = self.instantiate(&tail, bindings)?;
                Ok(Value::list_with_tail(items, tail))
            }
            Value::Vector(items) => {
                let items = items.borrow().clone();
                Ok(Value::vector(self.instantiate_sequence(&items, bindings)?))
            }
            Value::Quote(inner) => Ok(Value::Quote(Rc::new(self.instantiate(inner, bindings)?))),
            Value::Quasiquote(inner) => {
                Ok(Value::Quasiquote(Rc::new(self.instantiate(inner, bindings)?)))
            }
            Value::Unquote(inner) => Ok(Value::Unquote(Rc::new(self.instantiate(inner, bindings)?))),
            Value::UnquoteSplicing(inner) => Ok(Value::UnquoteSplicing(Rc::new(
                self.instantiate(inner, bindings)?,
            ))),
            other => Ok(other.clone()),
        }
    }

    fn free_identifier(&self, template: &Value, symbol: Symbol) -> Value {
        match (template, &self.home) {
            (Value::Scoped(_), _) => template.clone(),
            _ if self.local.contains(&symbol) => Value::Symbol(symbol),
            (_, Some(home)) if home.is_bound(symbol) => Value::Scoped(Rc::new(ScopedIdent {
                symbol,
                scope: Weak::clone(self.scope),
            })),
            _ => Value::Symbol(symbol),
        }
    }

    fn rest_group(&self, bindings: &Bindings) -> Result<Vec<Value>, Error> {
        match bindings.get(&self.matcher.keywords.ellipsis) {
            Some(MatchTree::Seq(trees)) => trees
                .iter()
                .map(|tree| match tree {
                    MatchTree::One(value) => Ok(value.clone()),
                    MatchTree::Seq(_) => Err(Error::EvalError("nested rest group".to_owned())),
                })
                .collect(),
            _ => Err(Error::EvalError(
                "... in template has no pattern variable to repeat".to_owned(),
            )),
        }
    }

    fn instantiate_sequence(&self, items: &[Value], bindings: &Bindings) -> Result<Vec<Value>, Error> {
        let keywords = &self.matcher.keywords;
        let mut out = Vec::with_capacity(items.len());
        let mut index = 0;
        while let Some(item) = items.get(index) {
            if keywords.is_ellipsis(item) {
                out.extend(self.rest_group(bindings)?);
                index += 1;
                continue;
            }
            let repeated = items.get(index + 1).is_some_and(|next| keywords.is_ellipsis(next));
            if !repeated {
                out.push(self.instantiate(item, bindings)?);
                index += 1;
                continue;
            }

            let mut variables = Vec::new();
            self.matcher.collect_variables(item, &mut variables);
            let groups: Vec<(Symbol, &Vec<MatchTree>)> = variables
                .into_iter()
                .filter_map(|variable| match bindings.get(&variable) {
                    Some(MatchTree::Seq(trees)) => Some((variable, trees)),
                    _ => None,
                })
                .collect();

            match groups.first() {
                None => {
                    out.push(self.instantiate(item, bindings)?);
                    out.extend(self.rest_group(bindings)?);
                }
                Some((_, first)) => {
                    let len = first.len();
                    if groups.iter().any(|(_, trees)| trees.len() != len) {
                        return Err(Error::EvalError(format!(
                            "mismatched ellipsis repetition lengths in {item}"
                        )));
                    }
                    for position in 0..len {
                        let mut iteration = bindings.clone();
                        for (variable, trees) in &groups {
                            iteration.insert(*variable, trees[position].clone());
                        }
                        out.push(self.instantiate(item, &iteration)?);
                    }
                }
            }
            index += 2;
        }
        Ok(out)
    }
}

fn push_binder(form: &Value, out: &mut Vec<Symbol>) {
    if let Some(symbol) = form.as_binding_symbol()
        && !out.contains(&symbol)
    {
        out.push(symbol);
    }
}

// `x`, `(a b)` or `(a b . rest)`
fn push_formals(formals: &Value, out: &mut Vec<Symbol>) {
    let mut iter = formals.iter_list();
    for formal in iter.by_ref() {
        push_binder(&formal, out);
    }
    push_binder(iter.tail(), out);
}

/// Identifiers bound by `lambda`, `define` and the `let` family inside a template
fn template_binders(form: &Value, out: &mut Vec<Symbol>) {
    let Value::Pair(_) = form else {
        return;
    };
    let (items, tail) = split_list(form);
    let head = items.first().and_then(Value::as_binding_symbol).map(Symbol::name);
    match (head.as_deref(), items.get(1)) {
        (Some("lambda"), Some(formals)) => push_formals(formals, out),
        (Some("define"), Some(target)) => push_formals(target, out),
        (Some("let" | "let*" | "letrec" | "letrec*"), Some(first)) => {
            let bindings = if first.as_binding_symbol().is_some() {
                push_binder(first, out);
                items.get(2)
            } else {
                Some(first)
            };
            for binding in bindings.into_iter().flat_map(Value::iter_list) {
                match &binding {
                    Value::Pair(pair) => push_binder(&pair.car(), out),
                    bare => push_binder(bare, out),
                }
            }
        }
        _ => {}
    }
    for item in &items {
        template_binders(item, out);
    }
    template_binders(&tail, out);
}

/// Expand one use of `syntax` with the given (unevaluated) operand list
pub(crate) fn expand(syntax: &Syntax, operands: &Value) -> Result<Value, Error> {
    let matcher = syntax.matcher();
    for (index, rule) in syntax.rules.iter().enumerate() {
        let mut bindings = Bindings::new();
        if matcher.match_form(&rule.pattern, operands, &mut bindings) {
            debug!(syntax = %syntax.name, rule = index, "syntax-rules rule selected");
            let mut local = Vec::new();
            template_binders(&rule.template, &mut local);
            let instantiator = Instantiator {
                matcher,
                home: syntax.scope.upgrade(),
                scope: &syntax.scope,
                local,
            };
            return instantiator.instantiate(&rule.template, &bindings);
        }
    }
    Err(Error::EvalError(format!(
        "no matching syntax rule for ({} {operands})",
        syntax.name
    )))
}

fn syntax_rules_form(form: &Value) -> Option<Vec<Value>> {
    match form {
        Value::Pair(pair) if pair.car().is_symbol_named("syntax-rules") => {
            pair.cdr().list_to_vec().ok()
        }
        _ => None,
    }
}

/// `(define-syntax name (syntax-rules (literal ...) (pattern template) ...))`
pub(crate) fn eval_define_syntax(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [name, transformer] = args else {
        return Err(Error::arity_error(2, args.len()).into());
    };
    let name = name
        .as_binding_symbol()
        .ok_or_else(|| Error::TypeError(format!("define-syntax requires a symbol, got {name}")))?;
    let syntax = match syntax_rules_form(transformer) {
        Some(rules) => Value::Syntax(Rc::new(Syntax::from_rules(name, scope, &rules)?)),
        None => match runtime.evaluate(scope, transformer)? {
            syntax @ Value::Syntax(_) => syntax,
            other => {
                return Err(Error::TypeError(format!(
                    "define-syntax expects a syntax-rules transformer, got {other}"
                ))
                .into());
            }
        },
    };
    scope.define(name, syntax)?;
    Ok(Value::Unspecified.into())
}

/// Anonymous `(syntax-rules ...)` transformer value
pub(crate) fn eval_syntax_rules(
    _runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let syntax = Syntax::from_rules(Symbol::new("anonymous"), scope, args)?;
    Ok(Value::Syntax(Rc::new(syntax)).into())
}

/// `(macroexpand 'form)`: expand until the head is no longer a syntax-rules macro
pub(crate) fn eval_macroexpand(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [form] = args else {
        return Err(Error::arity_error(1, args.len()).into());
    };
    let mut form = runtime.evaluate(scope, form)?;
    while let Value::Pair(pair) = &form {
        let transformer = pair
            .car()
            .as_binding_symbol()
            .and_then(|symbol| scope.resolve(symbol));
        let Some(Value::Syntax(syntax)) = transformer else {
            break;
        };
        let expansion = expand(&syntax, &pair.cdr())?;
        form = expansion;
    }
    Ok(quote_value(&form).into())
}

#[cfg(all(test, feature = "scheme"))]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    fn run(runtime: &mut Runtime, source: &str) -> Result<Value, Error> {
        runtime.eval_str(source)
    }

    #[test]
    fn test_syntax_rules_expansion_data_driven() {
        let definitions = "
            (define-syntax my-list (syntax-rules () ((_ a ...) (list a ...))))
            (define-syntax swap!
              (syntax-rules () ((_ a b) (let ((tmp a)) (set! a b) (set! b tmp)))))
            (define-syntax my-or
              (syntax-rules ()
                ((_) #f)
                ((_ e) e)
                ((_ e r ...) (let ((t e)) (if t t (my-or r ...))))))
            (define-syntax my-let
              (syntax-rules ()
                ((_ ((name val) ...) body ...) ((lambda (name ...) body ...) val ...))))
            (define-syntax arrow
              (syntax-rules (=>)
                ((_ a => b) (list 'forward a b))
                ((_ a b) (list 'plain a b))))
            (define-syntax first-of (syntax-rules () ((_ (a . rest)) 'a)))
            (define-syntax count-args (syntax-rules () ((_ ...) (length '(...)))))
            (define-syntax vec-mac (syntax-rules () ((_ #(a b)) (+ a b))))
            (define-syntax kw (syntax-rules () ((_ 1 x) x) ((_ _ x) 'other)))
        ";

        let test_cases: Vec<(&str, Result<Value, &str>)> = vec![
            ("(my-list 1 2 3)", Ok(val([1, 2, 3]))),
            ("(my-list)", Ok(Value::Nil)),
            ("(define p 1) (define q 2) (swap! p q) (list p q)", Ok(val([2, 1]))),
            ("(my-or #f #f 7)", Ok(val(7))),
            ("(my-or)", Ok(val(false))),
            ("(my-let ((a 1) (b 2)) (+ a b))", Ok(val(3))),
            ("(arrow 1 => 2)", Ok(val(vec![sym("forward"), val(1), val(2)]))),
            ("(arrow 1 2)", Ok(val(vec![sym("plain"), val(1), val(2)]))),
            ("(first-of (x y z))", Ok(sym("x"))),
            ("(count-args a b c)", Ok(val(3))),
            ("(vec-mac #(1 2))", Ok(val(3))),
            ("(kw 1 'one)", Ok(sym("one"))),
            ("(kw 2 'one)", Ok(sym("other"))),
            ("(swap! 1)", Err("no matching syntax rule")),
            ("(first-of 5)", Err("no matching syntax rule")),
        ];

        for (source, expected) in test_cases {
            let mut runtime = Runtime::new();
            run(&mut runtime, definitions).unwrap();
            match (run(&mut runtime, source), expected) {
                (Ok(actual), Ok(expected)) => assert_eq!(actual, expected, "{source}"),
                (Err(err), Err(text)) => {
                    assert!(err.to_string().contains(text), "{source}: {err}");
                }
                (actual, expected) => panic!("{source}: got {actual:?}, expected {expected:?}"),
            }
        }
    }

    #[test]
    fn test_free_identifiers_resolve_at_definition_site() {
        let mut runtime = Runtime::new();
        let result = run(
            &mut runtime,
            "(define helper (lambda () 'outer))
             (define-syntax call-helper (syntax-rules () ((_) (helper))))
             (define (f) (let ((helper (lambda () 'inner))) (call-helper)))
             (f)",
        )
        .unwrap();
        assert_eq!(result, sym("outer"));
    }

    #[test]
    fn test_pattern_variables_can_capture() {
        // `tmp` bound by the template is not renamed, so a use-site `tmp` is captured:
        // the expansion sets the local `tmp` and leaves the global one alone
        let mut runtime = Runtime::new();
        let result = run(
            &mut runtime,
            "(define-syntax swap!
               (syntax-rules () ((_ a b) (let ((tmp a)) (set! a b) (set! b tmp)))))
             (define tmp 1)
             (define other 2)
             (swap! tmp other)
             (list tmp other)",
        )
        .unwrap();
        assert_eq!(result, val([1, 2]));
    }

    #[test]
    fn test_template_locals_shadow_outer_definitions() {
        let test_cases = vec![
            (
                "(define x 10)
                 (define-syntax double (syntax-rules () ((_ e) (let ((x e)) (+ x x)))))
                 (double 3)",
                val(6),
            ),
            (
                "(define-syntax swap-with-list!
                   (syntax-rules () ((_ a b) (let ((list a)) (set! a b) (set! b list)))))
                 (define p 1)
                 (define q 2)
                 (swap-with-list! p q)
                 (cons p q)",
                Value::cons(val(2), val(1)),
            ),
            (
                "(define y 100)
                 (define-syntax add-y (syntax-rules () ((_ e) ((lambda (y) (+ y e)) 1))))
                 (add-y 5)",
                val(6),
            ),
            (
                "(define n 0)
                 (define-syntax count-to
                   (syntax-rules () ((_ k) (let loop ((n 0)) (if (< n k) (loop (+ n 1)) n)))))
                 (count-to 4)",
                val(4),
            ),
            (
                "(define z 'global)
                 (define-syntax with-z
                   (syntax-rules () ((_) (let () (define z 'local) z))))
                 (list (with-z) z)",
                val(vec![sym("local"), sym("global")]),
            ),
        ];

        for (source, expected) in test_cases {
            let mut runtime = Runtime::new();
            assert_eq!(run(&mut runtime, source).unwrap(), expected, "{source}");
        }
    }

    #[test]
    fn test_macroexpand() {
        let mut runtime = Runtime::new();
        run(
            &mut runtime,
            "(define-syntax my-list (syntax-rules () ((_ a ...) (list a ...))))
             (define-syntax wrap (syntax-rules () ((_ x) (my-list x x))))",
        )
        .unwrap();
        assert_eq!(
            run(&mut runtime, "(macroexpand '(my-list 1 2 3))").unwrap(),
            val(vec![sym("list"), val(1), val(2), val(3)])
        );
        assert_eq!(
            run(&mut runtime, "(macroexpand '(wrap 9))").unwrap(),
            val(vec![sym("list"), val(9), val(9)])
        );
        assert_eq!(run(&mut runtime, "(macroexpand '(+ 1 2))").unwrap(), val(vec![sym("+"), val(1), val(2)]));
    }

    #[test]
    fn test_anonymous_and_aliased_transformers() {
        let mut runtime = Runtime::new();
        let value = run(&mut runtime, "(syntax-rules () ((_ x) x))").unwrap();
        assert_eq!(value.to_string(), "#<syntax anonymous>");
        run(
            &mut runtime,
            "(define-syntax ident (syntax-rules () ((_ x) x)))
             (define-syntax same ident)",
        )
        .unwrap();
        assert_eq!(run(&mut runtime, "(same 5)").unwrap(), val(5));
        assert!(run(&mut runtime, "(define-syntax bad 5)").is_err());
        assert!(run(&mut runtime, "(define-syntax bad (syntax-rules (1) ((_) 1)))").is_err());
    }

    #[test]
    fn test_ellipsis_errors() {
        let mut runtime = Runtime::new();
        run(
            &mut runtime,
            "(define-syntax bad-template (syntax-rules () ((_ a ...) (list a))))
             (define-syntax pairs (syntax-rules () ((_ (a ...) (b ...)) '((a b) ...))))",
        )
        .unwrap();
        assert!(run(&mut runtime, "(bad-template 1 2)").is_err());
        assert_eq!(
            run(&mut runtime, "(pairs (1 2) (3 4))").unwrap(),
            val(vec![val([1, 3]), val([2, 4])])
        );
        assert!(run(&mut runtime, "(pairs (1 2) (3))").is_err());
    }
}
