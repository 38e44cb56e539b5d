//! Built-in operations registry.
//!
//! This module provides the single registry of operations bound in the root
//! scope when a [`Runtime`](crate::Runtime) starts: host functions that receive
//! evaluated arguments, and special forms that receive raw operand forms.
//!
//! ```scheme
//! (+ 1 2.5)                ; => 3.5
//! (vector-ref #(1 2 3) 0)  ; => 1
//! (if (pair? x) (car x) x) ; `if` is a special form
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: Evaluate all arguments before application (e.g., `+`, `car`)
//! - **Special Forms**: Control evaluation of their operands (e.g., `if`, `let`,
//!   `call/cc`) and may hand their tail position back to the trampoline
//!
//! ## Error Handling
//!
//! - **Type checks**: numeric operations reject non-numbers with `TypeError`
//! - **Overflow Detection**: exact integer arithmetic reports overflow instead of wrapping
//! - **Arity Checking**: argument counts are validated against the declared [`Arity`]
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** as a typed Rust function returning `Result<T, Error>`
//! 2. **Add to BUILTIN_OPS** with its identifier and arity
//! 3. **Add test cases** to the data-driven table below

use crate::Error;
use crate::ast::{
    Atom, BuiltinFunction, Number, NumberType, SpecialForm, Symbol, Value, eqv,
};
use crate::continuations::{
    builtin_error, builtin_raise, eval_call_cc, eval_dynamic_wind, eval_raise_continuable,
    eval_with_exception_handler,
};
use crate::evaluator::intooperation::{
    ByteIter, IntoOperation, IntoVariadicOperation, NumIter, OperationFn, StringIter, ValueIter,
};
use crate::macros::{
    MacroFn, eval_and, eval_apply, eval_begin, eval_case, eval_cond, eval_define, eval_eval,
    eval_for_each, eval_if, eval_lambda, eval_let, eval_let_star, eval_letrec,
    eval_make_parameter, eval_map, eval_or, eval_parameterize, eval_set, eval_use_namespace,
};
use crate::quasiquote::{eval_quasiquote, eval_quote};
use crate::syntaxrules::{eval_define_syntax, eval_macroexpand, eval_syntax_rules};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, LazyLock};

/// Accepted argument counts of a builtin or special form
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn validate(self, got: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(n) if got != n => Err(Error::arity_error(n, got)),
            Arity::AtLeast(n) if got < n => Err(Error::arity_error(n, got)),
            Arity::Range(min, _) if got < min => Err(Error::arity_error(min, got)),
            Arity::Range(_, max) if got > max => Err(Error::arity_error(max, got)),
            _ => Ok(()),
        }
    }
}

/// Represents the implementation of a built-in expression (function or special form)
#[derive(Clone)]
pub enum OpKind {
    /// Regular function that takes evaluated arguments and returns a value
    /// via the canonical erased builtin signature used by the evaluator.
    Function(Arc<OperationFn>),
    /// Special form that receives the runtime, the use-site scope and the raw operands
    SpecialForm(MacroFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The identifier this operation is bound to in the root scope
    pub scheme_id: &'static str,
    /// The implementation of this operation (function or special form)
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    /// Check if this operation is a special form
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    /// The runtime value bound for this operation
    pub(crate) fn to_value(&self) -> Value {
        let name: Rc<str> = Rc::from(self.scheme_id);
        match &self.op_kind {
            OpKind::Function(func) => Value::Builtin(Rc::new(BuiltinFunction {
                name,
                arity: self.arity,
                func: Arc::clone(func),
            })),
            OpKind::SpecialForm(func) => Value::Macro(Rc::new(SpecialForm {
                name,
                arity: self.arity,
                func: *func,
            })),
        }
    }
}

//
// Builtin Function Implementations
//

fn overflow(operation: &str) -> Error {
    Error::EvalError(format!("Integer overflow in {operation}"))
}

// Exact integer arithmetic when both operands are integers, real otherwise
macro_rules! numeric_binary {
    ($name:ident, $checked:ident, $op:tt, $op_str:expr) => {
        fn $name(a: Number, b: Number) -> Result<Number, Error> {
            match (a, b) {
                (Number::Integer(x), Number::Integer(y)) => {
                    x.$checked(y).map(Number::Integer).ok_or_else(|| overflow($op_str))
                }
                _ => Ok(Number::Real(a.as_f64() $op b.as_f64())),
            }
        }
    };
}

numeric_binary!(add_numbers, checked_add, +, "addition");
numeric_binary!(sub_numbers, checked_sub, -, "subtraction");
numeric_binary!(mul_numbers, checked_mul, *, "multiplication");

fn div_numbers(a: Number, b: Number) -> Result<Number, Error> {
    if b.as_f64() == 0.0 {
        return Err(Error::EvalError("Division by zero".into()));
    }
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => match x.checked_rem(y) {
            Some(0) => x
                .checked_div(y)
                .map(Number::Integer)
                .ok_or_else(|| overflow("division")),
            Some(_) => Ok(Number::Real(x as f64 / y as f64)),
            None => Err(overflow("division")),
        },
        _ => Ok(Number::Real(a.as_f64() / b.as_f64())),
    }
}

fn compare_numbers(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => Some(x.cmp(&y)),
        _ => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $( $ord:pat_param )|+) => {
        fn $name(first: Number, rest: NumIter) -> Result<bool, Error> {
            let mut prev = first;
            let mut holds = true;
            for current in rest {
                holds &= matches!(compare_numbers(prev, current), Some($( $ord )|+));
                prev = current;
            }
            Ok(holds)
        }
    };
}

numeric_comparison!(builtin_num_eq, Ordering::Equal);
numeric_comparison!(builtin_lt, Ordering::Less);
numeric_comparison!(builtin_gt, Ordering::Greater);
numeric_comparison!(builtin_le, Ordering::Less | Ordering::Equal);
numeric_comparison!(builtin_ge, Ordering::Greater | Ordering::Equal);

fn builtin_add(args: NumIter) -> Result<Number, Error> {
    args.into_iter().try_fold(Number::Integer(0), add_numbers)
}

fn builtin_mul(args: NumIter) -> Result<Number, Error> {
    args.into_iter().try_fold(Number::Integer(1), mul_numbers)
}

fn builtin_sub(first: Number, rest: NumIter) -> Result<Number, Error> {
    if rest.len() == 0 {
        return sub_numbers(Number::Integer(0), first).map_err(|_| overflow("negation"));
    }
    rest.into_iter().try_fold(first, sub_numbers)
}

fn builtin_div(first: Number, rest: NumIter) -> Result<Number, Error> {
    if rest.len() == 0 {
        return div_numbers(Number::Integer(1), first);
    }
    rest.into_iter().try_fold(first, div_numbers)
}

fn integer_division(
    a: NumberType,
    b: NumberType,
    op: fn(NumberType, NumberType) -> Option<NumberType>,
) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(Error::EvalError("Division by zero".into()));
    }
    op(a, b).ok_or_else(|| overflow("division"))
}

fn builtin_quotient(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    integer_division(a, b, NumberType::checked_div)
}

fn builtin_remainder(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    integer_division(a, b, NumberType::checked_rem)
}

fn builtin_modulo(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    let rem = integer_division(a, b, NumberType::checked_rem)?;
    Ok(if rem != 0 && (rem < 0) != (b < 0) { rem + b } else { rem })
}

fn builtin_abs(n: Number) -> Result<Number, Error> {
    match n {
        Number::Integer(i) => i
            .checked_abs()
            .map(Number::Integer)
            .ok_or_else(|| overflow("abs")),
        Number::Real(r) => Ok(Number::Real(r.abs())),
    }
}

fn builtin_max(first: Number, rest: NumIter) -> Result<Number, Error> {
    extremum(first, rest, Ordering::Greater)
}

fn builtin_min(first: Number, rest: NumIter) -> Result<Number, Error> {
    extremum(first, rest, Ordering::Less)
}

// Any real argument makes the result real
fn extremum(first: Number, rest: NumIter, keep: Ordering) -> Result<Number, Error> {
    let mut inexact = matches!(first, Number::Real(_));
    let mut best = first;
    for n in rest {
        inexact |= matches!(n, Number::Real(_));
        if compare_numbers(n, best) == Some(keep) {
            best = n;
        }
    }
    Ok(if inexact { Number::Real(best.as_f64()) } else { best })
}

fn builtin_not(value: Value) -> Result<bool, Error> {
    Ok(!value.is_truthy())
}

fn builtin_eqv(a: Value, b: Value) -> Result<bool, Error> {
    Ok(eqv(&a, &b))
}

fn builtin_equal(a: Value, b: Value) -> Result<bool, Error> {
    Ok(a == b)
}

fn builtin_car(pair: Value) -> Result<Value, Error> {
    match pair {
        Value::Pair(p) => Ok(p.car()),
        other => Err(Error::TypeError(format!("car: expected pair, got {other}"))),
    }
}

fn builtin_cdr(pair: Value) -> Result<Value, Error> {
    match pair {
        Value::Pair(p) => Ok(p.cdr()),
        other => Err(Error::TypeError(format!("cdr: expected pair, got {other}"))),
    }
}

fn builtin_cons(car: Value, cdr: Value) -> Result<Value, Error> {
    Ok(Value::cons(car, cdr))
}

fn builtin_set_car(pair: Value, value: Value) -> Result<Value, Error> {
    match pair {
        Value::Pair(p) => {
            p.set_car(value);
            Ok(Value::Unspecified)
        }
        other => Err(Error::TypeError(format!("set-car!: expected pair, got {other}"))),
    }
}

fn builtin_set_cdr(pair: Value, value: Value) -> Result<Value, Error> {
    match pair {
        Value::Pair(p) => {
            p.set_cdr(value);
            Ok(Value::Unspecified)
        }
        other => Err(Error::TypeError(format!("set-cdr!: expected pair, got {other}"))),
    }
}

fn builtin_list(args: ValueIter) -> Result<Value, Error> {
    Ok(Value::list_from(args))
}

fn builtin_length(list: Value) -> Result<NumberType, Error> {
    list.list_length()
        .map(|len| len as NumberType)
        .ok_or_else(|| Error::TypeError(format!("length: expected proper list, got {}", list.shape())))
}

// Every argument but the last is copied; the last becomes the shared tail.
fn builtin_append(args: ValueIter) -> Result<Value, Error> {
    let mut lists: Vec<Value> = args.collect();
    let Some(mut result) = lists.pop() else {
        return Ok(Value::Nil);
    };
    for list in lists.into_iter().rev() {
        let items = list.list_to_vec()?;
        result = Value::list_with_tail(items, result);
    }
    Ok(result)
}

fn builtin_reverse(list: Value) -> Result<Value, Error> {
    if !list.is_list() {
        return Err(Error::TypeError(format!("reverse: expected proper list, got {}", list.shape())));
    }
    Ok(list
        .iter_list()
        .fold(Value::Nil, |acc, item| Value::cons(item, acc)))
}

macro_rules! type_predicate {
    ($name:ident, $value:ident => $test:expr) => {
        fn $name($value: Value) -> Result<bool, Error> {
            Ok($test)
        }
    };
}

type_predicate!(builtin_is_null, v => v.is_nil());
type_predicate!(builtin_is_pair, v => matches!(v, Value::Pair(_)));
type_predicate!(builtin_is_list, v => v.is_list());
type_predicate!(builtin_is_symbol, v => matches!(v, Value::Symbol(_) | Value::Scoped(_)));
type_predicate!(builtin_is_procedure, v => v.is_procedure());
type_predicate!(builtin_is_number, v => matches!(v, Value::Atom(Atom::Integer(_) | Atom::Real(_))));
type_predicate!(builtin_is_integer, v => match v {
    Value::Atom(Atom::Integer(_)) => true,
    Value::Atom(Atom::Real(r)) => r.is_finite() && r.fract() == 0.0,
    _ => false,
});
type_predicate!(builtin_is_string, v => matches!(v, Value::Atom(Atom::String(_))));
type_predicate!(builtin_is_boolean, v => matches!(v, Value::Atom(Atom::Bool(_))));
type_predicate!(builtin_is_char, v => matches!(v, Value::Atom(Atom::Char(_))));
type_predicate!(builtin_is_vector, v => matches!(v, Value::Vector(_)));
type_predicate!(builtin_is_bytevector, v => matches!(v, Value::Bytevector(_)));
type_predicate!(builtin_is_regex, v => matches!(v, Value::Regex(_)));
type_predicate!(builtin_is_error_object, v => matches!(v, Value::Condition(_)));

fn builtin_vector(args: ValueIter) -> Result<Value, Error> {
    Ok(Value::vector(args.collect()))
}

fn builtin_make_vector(len: usize, fill: ValueIter) -> Result<Value, Error> {
    let fill = fill.into_iter().next().unwrap_or(Value::Unspecified);
    Ok(Value::vector(vec![fill; len]))
}

fn vector_cell(value: &Value) -> Result<&Rc<RefCell<Vec<Value>>>, Error> {
    match value {
        Value::Vector(items) => Ok(items),
        other => Err(Error::TypeError(format!("expected vector, got {other}"))),
    }
}

fn index_error(index: usize, len: usize) -> Error {
    Error::EvalError(format!("index {index} out of range for length {len}"))
}

fn builtin_vector_ref(vector: Value, index: usize) -> Result<Value, Error> {
    let items = vector_cell(&vector)?.borrow();
    items
        .get(index)
        .cloned()
        .ok_or_else(|| index_error(index, items.len()))
}

fn builtin_vector_set(vector: Value, index: usize, value: Value) -> Result<Value, Error> {
    let mut items = vector_cell(&vector)?.borrow_mut();
    let len = items.len();
    let slot = items.get_mut(index).ok_or_else(|| index_error(index, len))?;
    *slot = value;
    Ok(Value::Unspecified)
}

fn builtin_vector_length(vector: Value) -> Result<NumberType, Error> {
    Ok(vector_cell(&vector)?.borrow().len() as NumberType)
}

fn builtin_vector_to_list(vector: Value) -> Result<Value, Error> {
    let items = vector_cell(&vector)?.borrow().clone();
    Ok(Value::list_from(items))
}

fn builtin_list_to_vector(list: Value) -> Result<Value, Error> {
    Ok(Value::vector(list.list_to_vec()?))
}

fn builtin_bytevector(bytes: ByteIter) -> Result<Value, Error> {
    Ok(Value::Bytevector(Rc::new(RefCell::new(bytes.collect()))))
}

fn bytevector_cell(value: &Value) -> Result<&Rc<RefCell<Vec<u8>>>, Error> {
    match value {
        Value::Bytevector(bytes) => Ok(bytes),
        other => Err(Error::TypeError(format!("expected bytevector, got {other}"))),
    }
}

fn builtin_bytevector_ref(bytes: Value, index: usize) -> Result<NumberType, Error> {
    let bytes = bytevector_cell(&bytes)?.borrow();
    bytes
        .get(index)
        .map(|b| NumberType::from(*b))
        .ok_or_else(|| index_error(index, bytes.len()))
}

fn builtin_bytevector_set(bytes: Value, index: usize, byte: Value) -> Result<Value, Error> {
    let byte = match byte {
        Value::Atom(Atom::Integer(n)) => {
            u8::try_from(n).map_err(|_| Error::TypeError(format!("byte out of range: {n}")))?
        }
        other => return Err(Error::TypeError(format!("expected byte, got {other}"))),
    };
    let mut bytes = bytevector_cell(&bytes)?.borrow_mut();
    let len = bytes.len();
    let slot = bytes.get_mut(index).ok_or_else(|| index_error(index, len))?;
    *slot = byte;
    Ok(Value::Unspecified)
}

fn builtin_bytevector_length(bytes: Value) -> Result<NumberType, Error> {
    Ok(bytevector_cell(&bytes)?.borrow().len() as NumberType)
}

fn builtin_string_append(args: StringIter) -> Result<String, Error> {
    Ok(args.fold(String::new(), |mut acc, s| {
        acc.push_str(&s);
        acc
    }))
}

fn builtin_string_length(s: Rc<str>) -> Result<NumberType, Error> {
    Ok(s.chars().count() as NumberType)
}

fn builtin_symbol_to_string(symbol: Symbol) -> Result<String, Error> {
    Ok(symbol.name())
}

fn builtin_string_to_symbol(s: Rc<str>) -> Result<Symbol, Error> {
    Ok(Symbol::new(&s))
}

fn builtin_number_to_string(n: Number) -> Result<String, Error> {
    Ok(Value::from(n).to_string())
}

fn builtin_regex_match(pattern: Value, text: Rc<str>) -> Result<bool, Error> {
    match pattern {
        Value::Regex(re) => Ok(re.is_match(&text)),
        other => Err(Error::TypeError(format!("expected regex, got {other}"))),
    }
}

fn builtin_error_object_message(object: Value) -> Result<Value, Error> {
    match object {
        Value::Condition(object) => Ok(Value::string(&object.message)),
        other => Err(Error::TypeError(format!("expected error object, got {other}"))),
    }
}

fn builtin_error_object_irritants(object: Value) -> Result<Value, Error> {
    match object {
        Value::Condition(object) => Ok(Value::list_from(object.irritants.clone())),
        other => Err(Error::TypeError(format!("expected error object, got {other}"))),
    }
}

/// Global registry of all built-in operations.
///
/// The registry is a single contiguous collection of `BuiltinOp` values
/// for ease of auditing; the typed builtin implementations are wired
/// through the same adapter layer used for custom builtin registration,
/// once, at initialization time via a `LazyLock`.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    fn builtin_variadic<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoVariadicOperation<Args>,
    {
        <F as IntoVariadicOperation<Args>>::into_variadic_operation(f)
    }

    fn function(scheme_id: &'static str, arity: Arity, func: Arc<OperationFn>) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::Function(func),
            arity,
        }
    }

    fn special(scheme_id: &'static str, arity: Arity, func: MacroFn) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::SpecialForm(func),
            arity,
        }
    }

    use Arity::{Any, AtLeast, Exact, Range};

    vec![
        // Arithmetic operations
        function("+", Any, builtin_variadic::<(NumIter,), _>(builtin_add)),
        function("*", Any, builtin_variadic::<(NumIter,), _>(builtin_mul)),
        function("-", AtLeast(1), builtin_variadic::<(Number, NumIter), _>(builtin_sub)),
        function("/", AtLeast(1), builtin_variadic::<(Number, NumIter), _>(builtin_div)),
        function("quotient", Exact(2), builtin_fixed::<(NumberType, NumberType), _>(builtin_quotient)),
        function("remainder", Exact(2), builtin_fixed::<(NumberType, NumberType), _>(builtin_remainder)),
        function("modulo", Exact(2), builtin_fixed::<(NumberType, NumberType), _>(builtin_modulo)),
        function("abs", Exact(1), builtin_fixed::<(Number,), _>(builtin_abs)),
        function("max", AtLeast(1), builtin_variadic::<(Number, NumIter), _>(builtin_max)),
        function("min", AtLeast(1), builtin_variadic::<(Number, NumIter), _>(builtin_min)),
        // Comparison operations
        function("=", AtLeast(2), builtin_variadic::<(Number, NumIter), _>(builtin_num_eq)),
        function("<", AtLeast(2), builtin_variadic::<(Number, NumIter), _>(builtin_lt)),
        function(">", AtLeast(2), builtin_variadic::<(Number, NumIter), _>(builtin_gt)),
        function("<=", AtLeast(2), builtin_variadic::<(Number, NumIter), _>(builtin_le)),
        function(">=", AtLeast(2), builtin_variadic::<(Number, NumIter), _>(builtin_ge)),
        // Equivalence and logic
        function("not", Exact(1), builtin_fixed::<(Value,), _>(builtin_not)),
        function("eq?", Exact(2), builtin_fixed::<(Value, Value), _>(builtin_eqv)),
        function("eqv?", Exact(2), builtin_fixed::<(Value, Value), _>(builtin_eqv)),
        function("equal?", Exact(2), builtin_fixed::<(Value, Value), _>(builtin_equal)),
        // Pairs and lists
        function("car", Exact(1), builtin_fixed::<(Value,), _>(builtin_car)),
        function("cdr", Exact(1), builtin_fixed::<(Value,), _>(builtin_cdr)),
        function("cons", Exact(2), builtin_fixed::<(Value, Value), _>(builtin_cons)),
        function("set-car!", Exact(2), builtin_fixed::<(Value, Value), _>(builtin_set_car)),
        function("set-cdr!", Exact(2), builtin_fixed::<(Value, Value), _>(builtin_set_cdr)),
        function("list", Any, builtin_variadic::<(ValueIter,), _>(builtin_list)),
        function("length", Exact(1), builtin_fixed::<(Value,), _>(builtin_length)),
        function("append", Any, builtin_variadic::<(ValueIter,), _>(builtin_append)),
        function("reverse", Exact(1), builtin_fixed::<(Value,), _>(builtin_reverse)),
        // Type predicates
        function("null?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_null)),
        function("pair?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_pair)),
        function("list?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_list)),
        function("symbol?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_symbol)),
        function("procedure?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_procedure)),
        function("number?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_number)),
        function("integer?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_integer)),
        function("string?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_string)),
        function("boolean?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_boolean)),
        function("char?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_char)),
        function("vector?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_vector)),
        function("bytevector?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_bytevector)),
        function("regex?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_regex)),
        // Vectors and bytevectors
        function("vector", Any, builtin_variadic::<(ValueIter,), _>(builtin_vector)),
        function("make-vector", Range(1, 2), builtin_variadic::<(usize, ValueIter), _>(builtin_make_vector)),
        function("vector-ref", Exact(2), builtin_fixed::<(Value, usize), _>(builtin_vector_ref)),
        function("vector-set!", Exact(3), builtin_fixed::<(Value, usize, Value), _>(builtin_vector_set)),
        function("vector-length", Exact(1), builtin_fixed::<(Value,), _>(builtin_vector_length)),
        function("vector->list", Exact(1), builtin_fixed::<(Value,), _>(builtin_vector_to_list)),
        function("list->vector", Exact(1), builtin_fixed::<(Value,), _>(builtin_list_to_vector)),
        function("bytevector", Any, builtin_variadic::<(ByteIter,), _>(builtin_bytevector)),
        function("bytevector-u8-ref", Exact(2), builtin_fixed::<(Value, usize), _>(builtin_bytevector_ref)),
        function("bytevector-u8-set!", Exact(3), builtin_fixed::<(Value, usize, Value), _>(builtin_bytevector_set)),
        function("bytevector-length", Exact(1), builtin_fixed::<(Value,), _>(builtin_bytevector_length)),
        // Strings, symbols and regexes
        function("string-append", Any, builtin_variadic::<(StringIter,), _>(builtin_string_append)),
        function("string-length", Exact(1), builtin_fixed::<(Rc<str>,), _>(builtin_string_length)),
        function("symbol->string", Exact(1), builtin_fixed::<(Symbol,), _>(builtin_symbol_to_string)),
        function("string->symbol", Exact(1), builtin_fixed::<(Rc<str>,), _>(builtin_string_to_symbol)),
        function("number->string", Exact(1), builtin_fixed::<(Number,), _>(builtin_number_to_string)),
        function("regex-match?", Exact(2), builtin_fixed::<(Value, Rc<str>), _>(builtin_regex_match)),
        // Conditions
        function("error", AtLeast(1), builtin_variadic::<(Value, ValueIter), _>(builtin_error)),
        function("raise", Exact(1), builtin_fixed::<(Value,), _>(builtin_raise)),
        function("error-object?", Exact(1), builtin_fixed::<(Value,), _>(builtin_is_error_object)),
        function("error-object-message", Exact(1), builtin_fixed::<(Value,), _>(builtin_error_object_message)),
        function("error-object-irritants", Exact(1), builtin_fixed::<(Value,), _>(builtin_error_object_irritants)),
        // Core special forms
        special("quote", Exact(1), eval_quote),
        special("quasiquote", Exact(1), eval_quasiquote),
        special("if", Range(2, 3), eval_if),
        special("begin", Any, eval_begin),
        special("define", AtLeast(1), eval_define),
        special("set!", Exact(2), eval_set),
        special("lambda", AtLeast(2), eval_lambda),
        special("let", AtLeast(1), eval_let),
        special("let*", AtLeast(1), eval_let_star),
        special("letrec", AtLeast(1), eval_letrec),
        special("letrec*", AtLeast(1), eval_letrec),
        special("cond", AtLeast(1), eval_cond),
        special("case", AtLeast(2), eval_case),
        special("and", AtLeast(2), eval_and),
        special("or", AtLeast(2), eval_or),
        special("apply", AtLeast(2), eval_apply),
        special("map", Exact(2), eval_map),
        special("for-each", Exact(2), eval_for_each),
        special("eval", Range(1, 2), eval_eval),
        special("make-parameter", Range(1, 2), eval_make_parameter),
        special("parameterize", AtLeast(1), eval_parameterize),
        special("use-namespace", Exact(1), eval_use_namespace),
        // Macros
        special("define-syntax", Exact(2), eval_define_syntax),
        special("syntax-rules", AtLeast(1), eval_syntax_rules),
        special("macroexpand", Exact(1), eval_macroexpand),
        // Continuations and conditions
        special("call/cc", Exact(1), eval_call_cc),
        special("call-with-current-continuation", Exact(1), eval_call_cc),
        special("call/ec", Exact(1), eval_call_cc),
        special("dynamic-wind", Exact(3), eval_dynamic_wind),
        special("raise-continuable", Exact(1), eval_raise_continuable),
        special("with-exception-handler", Exact(2), eval_with_exception_handler),
    ]
});

/// Lazy static map from scheme_id to BuiltinOp (private - use find_scheme_op)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its identifier
pub fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}
