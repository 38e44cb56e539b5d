use crate::Error;
use crate::ast::{Atom, Number, NumberType, Symbol, Value};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

// NOTE: This module is internal plumbing for the evaluator.
// It defines the adapter layer that turns strongly-typed Rust
// functions into the erased `OperationFn` used at runtime.
//
// Builtins are registered through `builtinops.rs` and
// `Runtime::register_builtin`; the traits are public only so they
// can appear in those registration bounds.

/// Canonical erased builtin function type used by the evaluator.
///
/// Builtins receive ownership of their argument vector, enabling
/// implementations that consume or rearrange arguments if desired.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

// =====================================================================
// Fixed-parameter conversion
// =====================================================================

/// Converts one evaluated argument into a strongly-typed parameter.
pub trait FromParam: Sized {
    fn from_arg(value: Value) -> Result<Self, Error>;
}

impl FromParam for Value {
    fn from_arg(value: Value) -> Result<Self, Error> {
        Ok(value)
    }
}

impl FromParam for NumberType {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::Atom(Atom::Integer(n)) => Ok(n),
            other => Err(Error::TypeError(format!("expected integer, got {other}"))),
        }
    }
}

impl FromParam for usize {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::Atom(Atom::Integer(n)) if n >= 0 => Ok(n as usize),
            other => Err(Error::TypeError(format!(
                "expected non-negative integer, got {other}"
            ))),
        }
    }
}

impl FromParam for Number {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::Atom(Atom::Integer(n)) => Ok(Number::Integer(n)),
            Value::Atom(Atom::Real(r)) => Ok(Number::Real(r)),
            other => Err(Error::TypeError(format!("expected number, got {other}"))),
        }
    }
}

impl FromParam for bool {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::Atom(Atom::Bool(b)) => Ok(b),
            other => Err(Error::TypeError(format!("expected boolean, got {other}"))),
        }
    }
}

impl FromParam for Rc<str> {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::Atom(Atom::String(s)) => Ok(s),
            other => Err(Error::TypeError(format!("expected string, got {other}"))),
        }
    }
}

impl FromParam for Symbol {
    fn from_arg(value: Value) -> Result<Self, Error> {
        value
            .as_binding_symbol()
            .ok_or_else(|| Error::TypeError(format!("expected symbol, got {value}")))
    }
}

// =====================================================================
// Typed rest parameters
// =====================================================================

/// Marker trait describing how to view the trailing arguments as a
/// typed sequence. Every element is converted before the builtin runs,
/// so a type error is reported before any side effect.
#[doc(hidden)]
pub trait ValueElementKind {
    type Item;

    fn project(value: Value) -> Result<Self::Item, Error>;
}

/// Iterator over the converted rest arguments of a builtin call.
#[doc(hidden)]
pub struct TypedValueIter<K: ValueElementKind> {
    inner: std::vec::IntoIter<K::Item>,
    _marker: PhantomData<K>,
}

impl<K> TypedValueIter<K>
where
    K: ValueElementKind,
{
    pub(crate) fn new(values: Vec<Value>) -> Result<Self, Error> {
        let items = values
            .into_iter()
            .map(K::project)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TypedValueIter {
            inner: items.into_iter(),
            _marker: PhantomData,
        })
    }
}

impl<K> Iterator for TypedValueIter<K>
where
    K: ValueElementKind,
{
    type Item = K::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> DoubleEndedIterator for TypedValueIter<K>
where
    K: ValueElementKind,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<K> ExactSizeIterator for TypedValueIter<K> where K: ValueElementKind {}
impl<K> FusedIterator for TypedValueIter<K> where K: ValueElementKind {}

#[doc(hidden)]
pub struct ValueKind;

impl ValueElementKind for ValueKind {
    type Item = Value;

    fn project(value: Value) -> Result<Value, Error> {
        Ok(value)
    }
}

#[doc(hidden)]
pub struct NumberKind;

impl ValueElementKind for NumberKind {
    type Item = Number;

    fn project(value: Value) -> Result<Number, Error> {
        Number::from_arg(value)
    }
}

#[doc(hidden)]
pub struct StringKind;

impl ValueElementKind for StringKind {
    type Item = Rc<str>;

    fn project(value: Value) -> Result<Rc<str>, Error> {
        Rc::<str>::from_arg(value)
    }
}

#[doc(hidden)]
pub struct ByteKind;

impl ValueElementKind for ByteKind {
    type Item = u8;

    fn project(value: Value) -> Result<u8, Error> {
        match value {
            Value::Atom(Atom::Integer(n)) => u8::try_from(n)
                .map_err(|_| Error::TypeError(format!("byte out of range: {n}"))),
            other => Err(Error::TypeError(format!("expected byte, got {other}"))),
        }
    }
}

/// Rest arguments taken as-is.
pub type ValueIter = TypedValueIter<ValueKind>;

/// Rest arguments checked to be numbers.
pub type NumIter = TypedValueIter<NumberKind>;

/// Rest arguments checked to be strings.
pub type StringIter = TypedValueIter<StringKind>;

/// Rest arguments checked to be integers in `0..=255`.
pub type ByteIter = TypedValueIter<ByteKind>;

/// Constructs a rest parameter from the trailing arguments.
pub trait FromRest: Sized {
    fn from_rest(values: Vec<Value>) -> Result<Self, Error>;
}

impl<K> FromRest for TypedValueIter<K>
where
    K: ValueElementKind,
{
    fn from_rest(values: Vec<Value>) -> Result<Self, Error> {
        TypedValueIter::new(values)
    }
}

// =====================================================================
// Erasure traits
// =====================================================================

/// Converts a strongly-typed Rust function into the erased
/// [`OperationFn`], parameterized by its argument tuple type.
///
/// Builtins return `Result<T, Error>` for some `T: Into<Value>`.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// Same as [`IntoOperation`] for functions whose last parameter is a
/// rest parameter ([`ValueIter`], [`NumIter`], ...), optionally after
/// a fixed prefix of [`FromParam`] parameters.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> Result<R, Error> + Send + Sync + 'static,
    R: Into<Value>,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(Error::arity_error(0, args.len()));
            }
            (self)().map(Into::into)
        })
    }
}

/// Implements `IntoOperation` for a fixed number of `FromParam`
/// parameters.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: Fn( $( $A ),+ ) -> Result<R, Error> + Send + Sync + 'static,
            $( $A: FromParam, )+
            R: Into<Value>,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |args: Vec<Value>| {
                    let got = args.len();
                    if got != $arity {
                        return Err(Error::arity_error($arity, got));
                    }
                    let mut args = args.into_iter();
                    $(
                        let $p = match args.next() {
                            Some(value) => <$A as FromParam>::from_arg(value)?,
                            None => return Err(Error::arity_error($arity, got)),
                        };
                    )+
                    (self)( $( $p ),+ ).map(Into::into)
                })
            }
        }
    };
}

impl_into_operation_for_arity!(1, a: A1);
impl_into_operation_for_arity!(2, a: A1, b: A2);
impl_into_operation_for_arity!(3, a: A1, b: A2, c: A3);

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: Fn(I) -> Result<R, Error> + Send + Sync + 'static,
    R: Into<Value>,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            let rest = I::from_rest(args)?;
            (self)(rest).map(Into::into)
        })
    }
}

/// Implements `IntoVariadicOperation` for a fixed prefix of
/// `FromParam` parameters followed by one rest parameter.
macro_rules! impl_into_variadic_operation_for_prefix_and_rest {
    ($prefix:expr, $( $p:ident : $A:ident ),+ ) => {
        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRest,
            $( $A: FromParam, )+
            F: Fn( $( $A ),+ , I) -> Result<R, Error> + Send + Sync + 'static,
            R: Into<Value>,
        {
            fn into_variadic_operation(self) -> Arc<OperationFn> {
                Arc::new(move |args: Vec<Value>| {
                    let got = args.len();
                    if got < $prefix {
                        return Err(Error::arity_error($prefix, got));
                    }
                    let mut args = args.into_iter();
                    $(
                        let $p = match args.next() {
                            Some(value) => <$A as FromParam>::from_arg(value)?,
                            None => return Err(Error::arity_error($prefix, got)),
                        };
                    )+
                    let rest = I::from_rest(args.collect())?;
                    (self)( $( $p ),+ , rest).map(Into::into)
                })
            }
        }
    };
}

impl_into_variadic_operation_for_prefix_and_rest!(1, a: A1);
impl_into_variadic_operation_for_prefix_and_rest!(2, a: A1, b: A2);

#[cfg(test)]
#[expect(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ast::val;

    fn add(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
        Ok(a + b)
    }

    fn count_strings(items: StringIter) -> Result<NumberType, Error> {
        Ok(items.map(|s| s.len() as NumberType).sum())
    }

    fn scale(factor: NumberType, nums: NumIter) -> Result<Value, Error> {
        Ok(Value::list_from(
            nums.map(|n| val(factor as f64 * n.as_f64()))
                .collect::<Vec<_>>(),
        ))
    }

    #[test]
    fn test_fixed_adapter() {
        let op = IntoOperation::<(NumberType, NumberType)>::into_operation(add);
        assert_eq!(op(vec![val(2), val(3)]).unwrap(), val(5));
        assert!(matches!(
            op(vec![val(2)]),
            Err(Error::ArityError { expected: 2, got: 1, .. })
        ));
        assert!(matches!(op(vec![val(2), val("x")]), Err(Error::TypeError(_))));
    }

    #[test]
    fn test_variadic_adapters() {
        let op = IntoVariadicOperation::<(StringIter,)>::into_variadic_operation(count_strings);
        assert_eq!(op(vec![val("ab"), val("cde")]).unwrap(), val(5));
        assert_eq!(op(vec![]).unwrap(), val(0));
        assert!(matches!(op(vec![val(1)]), Err(Error::TypeError(_))));

        let op = IntoVariadicOperation::<(NumberType, NumIter)>::into_variadic_operation(scale);
        assert_eq!(op(vec![val(2), val(1), val(2.5)]).unwrap(), val([2.0, 5.0]));
        assert!(matches!(op(vec![]), Err(Error::ArityError { .. })));
    }
}
