//! Escape continuations and conditions.
//!
//! Continuations are escape-only: `call/cc` hands its procedure an escape value
//! that, when applied, unwinds back to the originating `call/cc` with
//! [`Unwind::Escape`]. Once that `call/cc` has returned, applying the escape
//! fails with [`Error::ContinuationExpired`]; re-entry is not supported.
//!
//! Conditions ride on ordinary errors. `raise` produces [`Error::Raised`] and
//! `error` produces [`Error::StructuredError`]; `with-exception-handler` offers
//! exactly those two to its handler and lets every other error (and every escape)
//! pass untouched.
//!
//! The handler of a non-continuable condition runs only after the thunk has fully
//! unwound, so every `dynamic-wind` after thunk entered inside the thunk has
//! already run when the handler sees the condition. `raise-continuable` is the
//! exception: its handler runs at the point of the raise.
//!
//! ```scheme
//! (call/cc (lambda (k) (+ 1 (k 42))))          ; => 42
//! (call/cc
//!   (lambda (k)
//!     (with-exception-handler
//!       (lambda (e) (k (error-object-message e)))
//!       (lambda () (error "bad thing" 1 2)))))   ; => "bad thing"
//! (call/cc
//!   (lambda (k)
//!     (dynamic-wind
//!       (lambda () (set! depth (+ depth 1)))
//!       (lambda () (k 'out))
//!       (lambda () (set! depth (- depth 1))))))  ; after thunk still runs
//! ```

use std::rc::Rc;

use tracing::debug;

use crate::ast::{Atom, ErrorObject, EscapeProcedure, Value};
use crate::evaluator::intooperation::ValueIter;
use crate::evaluator::scope::Scope;
use crate::evaluator::{Runtime, Trampoline};
use crate::{Error, EscapeSignal, Unwind};

/// `(error message irritant ...)`
pub(crate) fn builtin_error(message: Value, irritants: ValueIter) -> Result<Value, Error> {
    let message = match message {
        Value::Atom(Atom::String(text)) => text.to_string(),
        other => other.to_string(),
    };
    Err(Error::StructuredError(Rc::new(ErrorObject {
        message,
        irritants: irritants.collect(),
    })))
}

/// `(raise obj)`; re-raising a caught error object keeps it structured
pub(crate) fn builtin_raise(obj: Value) -> Result<Value, Error> {
    match obj {
        Value::Condition(object) => Err(Error::StructuredError(object)),
        other => Err(Error::Raised(other)),
    }
}

/// Unwind signal produced by applying an escape procedure
pub(crate) fn invoke_escape(runtime: &Runtime, escape: &EscapeProcedure, args: Vec<Value>) -> Unwind {
    if !runtime.active_escapes.contains(&escape.id) {
        return Error::ContinuationExpired.into();
    }
    let value = match <[Value; 1]>::try_from(args) {
        Ok([value]) => value,
        Err(args) if args.is_empty() => Value::Unspecified,
        Err(args) => return Error::arity_error(1, args.len()).into(),
    };
    Unwind::Escape(EscapeSignal {
        id: escape.id,
        value,
    })
}

/// `(call/cc proc)`
pub(crate) fn eval_call_cc(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [receiver] = args else {
        return Err(Error::arity_error(1, args.len()).into());
    };
    let receiver = runtime.evaluate(scope, receiver)?;
    let id = runtime.fresh_escape_id();
    let escape = Value::Escape(Rc::new(EscapeProcedure { id }));

    runtime.active_escapes.push(id);
    let result = runtime.call(&receiver, vec![escape]);
    runtime.active_escapes.retain(|active| *active != id);

    match result {
        Ok(value) => Ok(value.into()),
        Err(Unwind::Escape(signal)) if signal.id == id => {
            debug!(escape = id, "continuation escape caught");
            Ok(signal.value.into())
        }
        Err(unwind) => Err(unwind),
    }
}

/// `(dynamic-wind before thunk after)`
pub(crate) fn eval_dynamic_wind(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [before, thunk, after] = args else {
        return Err(Error::arity_error(3, args.len()).into());
    };
    let before = runtime.evaluate(scope, before)?;
    let thunk = runtime.evaluate(scope, thunk)?;
    let after = runtime.evaluate(scope, after)?;

    runtime.call(&before, Vec::new())?;
    let result = runtime.call(&thunk, Vec::new());
    if let Err(unwind) = &result {
        debug!(%unwind, "running dynamic-wind after thunk while unwinding");
    }
    runtime.call(&after, Vec::new())?;
    Ok(result?.into())
}

/// `(raise-continuable obj)`: the innermost handler's result is the value of the form
pub(crate) fn eval_raise_continuable(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [obj] = args else {
        return Err(Error::arity_error(1, args.len()).into());
    };
    let obj = runtime.evaluate(scope, obj)?;
    let Some(handler) = runtime.handlers.pop() else {
        return Err(Error::Raised(obj).into());
    };
    debug!(condition = %obj, "dispatching continuable condition");
    let result = runtime.call(&handler, vec![obj]);
    runtime.handlers.push(handler);
    Ok(result?.into())
}

/// `(with-exception-handler handler thunk)`
pub(crate) fn eval_with_exception_handler(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    let [handler, thunk] = args else {
        return Err(Error::arity_error(2, args.len()).into());
    };
    let handler = runtime.evaluate(scope, handler)?;
    let thunk = runtime.evaluate(scope, thunk)?;
    if !handler.is_procedure() {
        return Err(Error::TypeError(format!("exception handler must be a procedure, got {handler}")).into());
    }

    // The thunk is never a tail call of this form: its trampoline resolves
    // inside this frame, so the handler stays installed until it returns.
    runtime.handlers.push(handler.clone());
    let result = runtime.call(&thunk, Vec::new());
    runtime.handlers.pop();

    let error = match result {
        Ok(value) => return Ok(value.into()),
        Err(Unwind::Error(error)) => error,
        Err(escape) => return Err(escape),
    };
    let Some(condition) = error.condition_value() else {
        return Err(error.into());
    };
    debug!(%condition, "dispatching condition to handler");
    let handled = runtime.call(&handler, vec![condition])?;
    if handled.is_unspecified() {
        Ok(Value::Unspecified.into())
    } else {
        Err(Error::EvalError(format!(
            "handler returned from non-continuable raise: {handled}"
        ))
        .into())
    }
}
