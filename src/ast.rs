//! This module defines the closed value/AST union, [`Value`], shared by the reader, the
//! evaluator and every builtin. Source forms and runtime values are the same type: a
//! pair is both a cons cell a program can mutate and the call form the evaluator
//! dispatches on. The module also provides interned [`Symbol`]s, the mutable [`Pair`]
//! cell with iterative list helpers, and the runtime objects (procedures, builtins,
//! parameters, error objects) that evaluation produces. Ergonomic helper functions
//! such as [`val`], [`sym`], [`nil`] and [`list`] are provided for building ASTs in
//! code and tests.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

use crate::Error;
use crate::evaluator::Arity;
use crate::evaluator::intooperation::OperationFn;
use crate::evaluator::scope::Scope;
use crate::interop::ForeignCallable;
use crate::macros::MacroFn;
use crate::syntaxrules::Syntax;

/// Type alias for exact integers in the interpreter
pub(crate) type NumberType = i64;

thread_local! {
    static INTERNER: RefCell<StringInterner<DefaultBackend>> =
        RefCell::new(StringInterner::new());
}

/// Interned identifier.
///
/// Two symbols are equal iff their text is equal; interning makes that an integer
/// comparison. The interner is per thread, which matches the single-threaded runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(DefaultSymbol);

impl Symbol {
    pub fn new(name: &str) -> Self {
        INTERNER.with(|interner| Symbol(interner.borrow_mut().get_or_intern(name)))
    }

    /// Run `f` against the symbol's text without allocating.
    ///
    /// `f` must not intern new symbols.
    pub fn with_name<R>(self, f: impl FnOnce(&str) -> R) -> R {
        INTERNER.with(|interner| {
            let interner = interner.borrow();
            f(interner.resolve(self.0).unwrap_or_default())
        })
    }

    pub fn name(self) -> String {
        self.with_name(str::to_owned)
    }

    pub fn is(self, text: &str) -> bool {
        self.with_name(|name| name == text)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_name(|name| write!(f, "{name}"))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_name(|name| write!(f, "Symbol({name})"))
    }
}

/// Tagged literal
#[derive(Clone, Debug)]
pub enum Atom {
    Integer(NumberType),
    Real(f64),
    String(Rc<str>),
    Bool(bool),
    Char(char),
}

impl Atom {
    /// Numeric projection; integers widen, characters project to their code point
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Atom::Integer(n) => Some(*n as f64),
            Atom::Real(r) => Some(*r),
            Atom::Char(c) => Some(u32::from(*c) as f64),
            Atom::Bool(_) | Atom::String(_) => None,
        }
    }
}

/// Numeric view used by arithmetic builtins
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(NumberType),
    Real(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Real(r) => r,
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(i) => Value::Atom(Atom::Integer(i)),
            Number::Real(r) => Value::Atom(Atom::Real(r)),
        }
    }
}

/// Mutable cons cell
pub struct Pair {
    car: RefCell<Value>,
    cdr: RefCell<Value>,
}

impl Pair {
    pub fn new(car: Value, cdr: Value) -> Self {
        Pair {
            car: RefCell::new(car),
            cdr: RefCell::new(cdr),
        }
    }

    pub fn car(&self) -> Value {
        self.car.borrow().clone()
    }

    pub fn cdr(&self) -> Value {
        self.cdr.borrow().clone()
    }

    pub fn set_car(&self, value: Value) {
        *self.car.borrow_mut() = value;
    }

    pub fn set_cdr(&self, value: Value) {
        *self.cdr.borrow_mut() = value;
    }
}

// Unlink the cdr chain one cell at a time so dropping a long list does not recurse.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut next = std::mem::replace(self.cdr.get_mut(), Value::Nil);
        while let Value::Pair(rc) = next {
            match Rc::try_unwrap(rc) {
                Ok(mut pair) => next = std::mem::replace(pair.cdr.get_mut(), Value::Nil),
                Err(_) => break,
            }
        }
    }
}

/// Formal parameter specification of a procedure
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSpec {
    /// `(lambda args ...)`: every argument collected into one list
    Variadic(Symbol),
    /// `(lambda (a b) ...)`
    Fixed(Vec<Symbol>),
    /// `(lambda (a b . rest) ...)`
    Rest(Vec<Symbol>, Symbol),
}

impl ParamSpec {
    /// Parse a lambda parameter form, rejecting non-symbols and duplicate names
    pub fn from_form(form: &Value) -> Result<Self, Error> {
        if let Some(name) = form.as_binding_symbol() {
            return Ok(ParamSpec::Variadic(name));
        }

        let mut names: Vec<Symbol> = Vec::new();
        let push = |param: &Value, names: &[Symbol]| -> Result<Symbol, Error> {
            let name = param.as_binding_symbol().ok_or_else(|| {
                Error::TypeError(format!("Lambda parameters must be symbols, got {param}"))
            })?;
            if names.contains(&name) {
                return Err(Error::EvalError(format!("Duplicate parameter name: {name}")));
            }
            Ok(name)
        };

        let mut iter = form.iter_list();
        for param in iter.by_ref() {
            let name = push(&param, &names)?;
            names.push(name);
        }
        match iter.tail() {
            Value::Nil => Ok(ParamSpec::Fixed(names)),
            tail => {
                let rest = push(tail, &names)?;
                Ok(ParamSpec::Rest(names, rest))
            }
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            ParamSpec::Variadic(_) => Arity::Any,
            ParamSpec::Fixed(names) => Arity::Exact(names.len()),
            ParamSpec::Rest(names, _) => Arity::AtLeast(names.len()),
        }
    }
}

/// User-defined procedure (a closure over its defining scope)
pub struct Procedure {
    pub params: ParamSpec,
    pub body: Rc<[Value]>,
    pub scope: Rc<Scope>,
    pub name: RefCell<Option<Symbol>>,
}

/// Host function taking evaluated arguments
pub struct BuiltinFunction {
    pub name: Rc<str>,
    pub arity: Arity,
    pub func: Arc<OperationFn>,
}

/// Host special form taking unevaluated operand forms
pub struct SpecialForm {
    pub name: Rc<str>,
    pub arity: Arity,
    pub func: MacroFn,
}

/// One-shot upward escape created by `call/cc`
#[derive(Debug)]
pub struct EscapeProcedure {
    pub(crate) id: u64,
}

/// Parameter object created by `make-parameter`
pub struct Parameter {
    pub(crate) value: RefCell<Value>,
    pub(crate) converter: Option<Value>,
}

/// Structured error raised by `error`
#[derive(Debug)]
pub struct ErrorObject {
    pub message: String,
    pub irritants: Vec<Value>,
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.message)?;
        for irritant in &self.irritants {
            write!(f, " {irritant}")?;
        }
        Ok(())
    }
}

/// Free template identifier introduced by a syntax-rules expansion.
///
/// Resolves against the macro's defining scope rather than the use site.
pub struct ScopedIdent {
    pub symbol: Symbol,
    pub scope: Weak<Scope>,
}

/// Core AST and value type
///
/// The source-level node kinds are `Program`, `Pair`, `Nil`, `Atom`, `Symbol`,
/// `Vector`, `Bytevector`, the quote family and `Regex`. The remaining variants only
/// arise at runtime.
#[derive(Clone)]
pub enum Value {
    /// Empty list
    Nil,
    /// The empty value (result of `define`, absent `if` branch, ...)
    /// Unspecified values never equal themselves or any other value
    Unspecified,
    Atom(Atom),
    Symbol(Symbol),
    Pair(Rc<Pair>),
    Vector(Rc<RefCell<Vec<Value>>>),
    Bytevector(Rc<RefCell<Vec<u8>>>),
    Quote(Rc<Value>),
    Quasiquote(Rc<Value>),
    Unquote(Rc<Value>),
    UnquoteSplicing(Rc<Value>),
    Regex(Rc<regex::Regex>),
    Program(Rc<[Value]>),
    Procedure(Rc<Procedure>),
    Builtin(Rc<BuiltinFunction>),
    Macro(Rc<SpecialForm>),
    Syntax(Rc<Syntax>),
    Escape(Rc<EscapeProcedure>),
    Parameter(Rc<Parameter>),
    Condition(Rc<ErrorObject>),
    Foreign(Rc<dyn ForeignCallable>),
    Scoped(Rc<ScopedIdent>),
}

/// Iterator over the cars of a pair chain.
///
/// Stops at the first non-pair; [`ListIter::tail`] then exposes it (Nil for a
/// proper list).
pub struct ListIter {
    current: Value,
}

impl ListIter {
    pub fn tail(&self) -> &Value {
        &self.current
    }
}

impl Iterator for ListIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let (car, cdr) = match &self.current {
            Value::Pair(pair) => (pair.car(), pair.cdr()),
            _ => return None,
        };
        self.current = cdr;
        Some(car)
    }
}

impl Value {
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair::new(car, cdr)))
    }

    /// Build a proper list, consing from the back
    pub fn list_from<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        Self::list_with_tail(items, Value::Nil)
    }

    pub fn list_with_tail<I>(items: I, tail: Value) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Value::cons(item, acc))
    }

    pub fn string(s: &str) -> Value {
        Value::Atom(Atom::String(Rc::from(s)))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Symbol::new(name))
    }

    pub fn boolean(b: bool) -> Value {
        Value::Atom(Atom::Bool(b))
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(Rc::new(RefCell::new(items)))
    }

    /// Every value is truthy except `#f`, including Nil, 0 and the empty string
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Atom(Atom::Bool(false)))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, Value::Unspecified)
    }

    pub fn iter_list(&self) -> ListIter {
        ListIter {
            current: self.clone(),
        }
    }

    /// Final cdr of the pair chain, or `None` when the chain is cyclic.
    /// Tortoise and hare, so O(n) time and constant stack.
    fn chain_end(&self) -> Option<Value> {
        let mut slow = self.clone();
        let mut fast = self.clone();
        loop {
            for _ in 0..2 {
                fast = match &fast {
                    Value::Pair(pair) => pair.cdr(),
                    end => return Some(end.clone()),
                };
            }
            if let Value::Pair(pair) = &slow {
                slow = pair.cdr();
            }
            if let (Value::Pair(a), Value::Pair(b)) = (&slow, &fast)
                && Rc::ptr_eq(a, b)
            {
                return None;
            }
        }
    }

    /// Proper-list check; cyclic chains are not lists
    pub fn is_list(&self) -> bool {
        matches!(self.chain_end(), Some(Value::Nil))
    }

    pub fn is_cyclic(&self) -> bool {
        self.chain_end().is_none()
    }

    /// Short description for error messages that must not print the whole value
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Pair(_) => match self.chain_end() {
                None => "circular list",
                Some(Value::Nil) => "list",
                Some(_) => "improper list",
            },
            other => other.type_name(),
        }
    }

    /// Length of a proper list
    pub fn list_length(&self) -> Option<usize> {
        if !self.is_list() {
            return None;
        }
        Some(self.iter_list().count())
    }

    pub fn list_to_vec(&self) -> Result<Vec<Value>, Error> {
        if !self.is_list() {
            return Err(Error::TypeError(format!(
                "expected a proper list, got {}",
                self.shape()
            )));
        }
        Ok(self.iter_list().collect())
    }

    /// Symbol usable in a binding position, seeing through expansion-introduced identifiers
    pub fn as_binding_symbol(&self) -> Option<Symbol> {
        match self {
            Value::Symbol(s) => Some(*s),
            Value::Scoped(ident) => Some(ident.symbol),
            _ => None,
        }
    }

    pub fn is_symbol_named(&self, text: &str) -> bool {
        self.as_binding_symbol().is_some_and(|s| s.is(text))
    }

    /// Callable values as seen by `procedure?`
    pub fn is_procedure(&self) -> bool {
        matches!(
            self,
            Value::Procedure(_)
                | Value::Builtin(_)
                | Value::Escape(_)
                | Value::Parameter(_)
                | Value::Foreign(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "empty list",
            Value::Unspecified => "unspecified",
            Value::Atom(Atom::Integer(_)) | Value::Atom(Atom::Real(_)) => "number",
            Value::Atom(Atom::String(_)) => "string",
            Value::Atom(Atom::Bool(_)) => "boolean",
            Value::Atom(Atom::Char(_)) => "character",
            Value::Symbol(_) | Value::Scoped(_) => "symbol",
            Value::Pair(_) => "pair",
            Value::Vector(_) => "vector",
            Value::Bytevector(_) => "bytevector",
            Value::Quote(_) | Value::Quasiquote(_) => "quoted form",
            Value::Unquote(_) | Value::UnquoteSplicing(_) => "unquoted form",
            Value::Regex(_) => "regex",
            Value::Program(_) => "program",
            Value::Procedure(_) => "procedure",
            Value::Builtin(_) => "builtin function",
            Value::Macro(_) => "special form",
            Value::Syntax(_) => "syntax",
            Value::Escape(_) => "continuation",
            Value::Parameter(_) => "parameter",
            Value::Condition(_) => "error object",
            Value::Foreign(_) => "foreign object",
        }
    }
}

/// `eqv?`: identity for mutable and procedural objects, value for atoms
pub fn eqv(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Atom(x), Value::Atom(y)) => match (x, y) {
            (Atom::Integer(m), Atom::Integer(n)) => m == n,
            (Atom::Real(m), Atom::Real(n)) => m == n,
            (Atom::Bool(m), Atom::Bool(n)) => m == n,
            (Atom::Char(m), Atom::Char(n)) => m == n,
            (Atom::String(m), Atom::String(n)) => Rc::ptr_eq(m, n) || (m.is_empty() && n.is_empty()),
            _ => false,
        },
        (Value::Symbol(_) | Value::Scoped(_), Value::Symbol(_) | Value::Scoped(_)) => {
            a.as_binding_symbol() == b.as_binding_symbol()
        }
        (Value::Pair(x), Value::Pair(y)) => Rc::ptr_eq(x, y),
        (Value::Vector(x), Value::Vector(y)) => Rc::ptr_eq(x, y),
        (Value::Bytevector(x), Value::Bytevector(y)) => Rc::ptr_eq(x, y),
        (Value::Procedure(x), Value::Procedure(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => Rc::ptr_eq(x, y),
        (Value::Macro(x), Value::Macro(y)) => Rc::ptr_eq(x, y),
        (Value::Syntax(x), Value::Syntax(y)) => Rc::ptr_eq(x, y),
        (Value::Escape(x), Value::Escape(y)) => Rc::ptr_eq(x, y),
        (Value::Parameter(x), Value::Parameter(y)) => Rc::ptr_eq(x, y),
        (Value::Condition(x), Value::Condition(y)) => Rc::ptr_eq(x, y),
        (Value::Foreign(x), Value::Foreign(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Atom(Atom::String(Rc::from(s)))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Atom(Atom::String(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Atom(Atom::Char(c))
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Atom(Atom::Real(r))
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unspecified
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Atom(Atom::Integer(n as NumberType))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list_from(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list_from(arr.into_iter().map(Into::into))
    }
}

/// Helper function for creating symbols in mixed lists
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::symbol(name.as_ref())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the empty list
pub fn nil() -> Value {
    Value::Nil
}

/// Helper function for building proper lists from already-built values
pub fn list(items: Vec<Value>) -> Value {
    Value::list_from(items)
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

pub(crate) fn char_name(c: char) -> Option<&'static str> {
    match c {
        ' ' => Some("space"),
        '\n' => Some("newline"),
        '\t' => Some("tab"),
        '\r' => Some("return"),
        '\0' => Some("null"),
        '\u{7f}' => Some("delete"),
        '\u{1b}' => Some("escape"),
        '\u{7}' => Some("alarm"),
        '\u{8}' => Some("backspace"),
        _ => None,
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Integer(n) => write!(f, "{n}"),
            Atom::Real(r) if r.is_finite() && r.fract() == 0.0 => write!(f, "{r:.1}"),
            Atom::Real(r) if r.is_nan() => write!(f, "+nan.0"),
            Atom::Real(r) if r.is_infinite() => {
                write!(f, "{}", if *r > 0.0 { "+inf.0" } else { "-inf.0" })
            }
            Atom::Real(r) => write!(f, "{r}"),
            Atom::String(s) => write_string_literal(f, s),
            Atom::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Atom::Char(c) => match char_name(*c) {
                Some(name) => write!(f, "#\\{name}"),
                None => write!(f, "#\\{c}"),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "()"),
            Value::Unspecified => write!(f, "#<unspecified>"),
            Value::Atom(atom) => write!(f, "{atom}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Scoped(ident) => write!(f, "{}", ident.symbol),
            Value::Pair(_) => {
                // A cyclic cdr chain is printed up to the point the walk revisits a cell
                let mut current = self.clone();
                let mut slow = self.clone();
                let mut steps = 0usize;
                write!(f, "(")?;
                while let Value::Pair(pair) = &current {
                    if steps > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", pair.car())?;
                    let next = pair.cdr();
                    steps += 1;
                    if steps % 2 == 0
                        && let Value::Pair(behind) = &slow
                    {
                        slow = behind.cdr();
                    }
                    if let (Value::Pair(a), Value::Pair(b)) = (&next, &slow)
                        && Rc::ptr_eq(a, b)
                    {
                        return write!(f, " ...)");
                    }
                    current = next;
                }
                match current {
                    Value::Nil => write!(f, ")"),
                    tail => write!(f, " . {tail})"),
                }
            }
            Value::Vector(items) => {
                write!(f, "#(")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Bytevector(bytes) => {
                write!(f, "#u8(")?;
                for (i, byte) in bytes.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{byte}")?;
                }
                write!(f, ")")
            }
            Value::Quote(inner) => write!(f, "'{inner}"),
            Value::Quasiquote(inner) => write!(f, "`{inner}"),
            Value::Unquote(inner) => write!(f, ",{inner}"),
            Value::UnquoteSplicing(inner) => write!(f, ",@{inner}"),
            Value::Regex(re) => write!(f, "#/{}/", re.as_str()),
            Value::Program(forms) => {
                for (i, form) in forms.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{form}")?;
                }
                Ok(())
            }
            Value::Procedure(proc) => match *proc.name.borrow() {
                Some(name) => write!(f, "#<procedure {name}>"),
                None => write!(f, "#<procedure>"),
            },
            Value::Builtin(builtin) => write!(f, "#<builtin-function:{}>", builtin.name),
            Value::Macro(form) => write!(f, "#<special-form:{}>", form.name),
            Value::Syntax(syntax) => write!(f, "#<syntax {}>", syntax.name),
            Value::Escape(_) => write!(f, "#<continuation>"),
            Value::Parameter(_) => write!(f, "#<parameter>"),
            Value::Condition(object) => {
                write!(f, "#<error ")?;
                write_string_literal(f, &object.message)?;
                for irritant in &object.irritants {
                    write!(f, " {irritant}")?;
                }
                write!(f, ">")
            }
            Value::Foreign(handle) => write!(f, "#<foreign {}>", handle.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Atom(Atom::Integer(n)) => write!(f, "Integer({n})"),
            Value::Atom(Atom::Real(r)) => write!(f, "Real({r})"),
            Value::Atom(Atom::String(s)) => write!(f, "String({s:?})"),
            Value::Atom(Atom::Bool(b)) => write!(f, "Bool({b})"),
            Value::Atom(Atom::Char(c)) => write!(f, "Char({c:?})"),
            Value::Symbol(s) => write!(f, "{s:?}"),
            Value::Nil => write!(f, "Nil"),
            Value::Unspecified => write!(f, "Unspecified"),
            Value::Pair(_) => write!(f, "List({self})"),
            other => write!(f, "{other}"),
        }
    }
}

// Structural equality (`equal?`), iterative along cdr chains.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        // Circular lists compare by identity
        if let (Value::Pair(a), Value::Pair(b)) = (self, other)
            && (self.is_cyclic() || other.is_cyclic())
        {
            return Rc::ptr_eq(a, b);
        }
        let mut left = self.clone();
        let mut right = other.clone();
        loop {
            let (next_left, next_right) = match (&left, &right) {
                (Value::Pair(a), Value::Pair(b)) => {
                    if Rc::ptr_eq(a, b) {
                        return true;
                    }
                    if a.car() != b.car() {
                        return false;
                    }
                    (a.cdr(), b.cdr())
                }
                (Value::Unspecified, _) | (_, Value::Unspecified) => return false,
                (Value::Atom(Atom::String(a)), Value::Atom(Atom::String(b))) => return a == b,
                (Value::Atom(Atom::Real(a)), Value::Atom(Atom::Real(b))) => return a == b,
                (Value::Vector(a), Value::Vector(b)) => return *a.borrow() == *b.borrow(),
                (Value::Bytevector(a), Value::Bytevector(b)) => return *a.borrow() == *b.borrow(),
                (Value::Quote(a), Value::Quote(b))
                | (Value::Quasiquote(a), Value::Quasiquote(b))
                | (Value::Unquote(a), Value::Unquote(b))
                | (Value::UnquoteSplicing(a), Value::UnquoteSplicing(b)) => return a == b,
                (Value::Regex(a), Value::Regex(b)) => return a.as_str() == b.as_str(),
                (Value::Program(a), Value::Program(b)) => return a == b,
                (Value::Condition(a), Value::Condition(b)) => {
                    return Rc::ptr_eq(a, b)
                        || (a.message == b.message && a.irritants == b.irritants);
                }
                _ => return eqv(&left, &right),
            };
            left = next_left;
            right = next_right;
        }
    }
}
