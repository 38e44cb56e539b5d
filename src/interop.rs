//! Foreign binding boundary.
//!
//! The evaluator never reflects over host objects itself. When a symbol has no
//! binding it asks the installed [`ForeignResolver`], and `(.member target args...)`
//! forms are handed to [`ForeignResolver::invoke_member`] with every operand already
//! evaluated. Resolved host functions come back as [`Value::Foreign`] handles.

use std::rc::Rc;

use crate::Error;
use crate::ast::Value;

/// Host function or object exposed to programs
pub trait ForeignCallable {
    fn name(&self) -> &str;

    fn call(&self, args: Vec<Value>) -> Result<Value, Error>;
}

/// Resolution of names the program does not bind itself
pub trait ForeignResolver {
    /// Look up `name` in the host.
    ///
    /// `arity` is the operand count when the symbol is in operator position of a
    /// proper call form; `namespaces` is the use-site scope's namespace list.
    fn resolve(&self, name: &str, arity: Option<usize>, namespaces: &[Rc<str>]) -> Option<Value>;

    /// Invoke `member` (without its leading `.`) with the evaluated operands
    fn invoke_member(&self, member: &str, args: Vec<Value>) -> Result<Value, Error>;
}

/// Resolver with no host bindings
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl ForeignResolver for NullResolver {
    fn resolve(&self, _name: &str, _arity: Option<usize>, _namespaces: &[Rc<str>]) -> Option<Value> {
        None
    }

    fn invoke_member(&self, member: &str, _args: Vec<Value>) -> Result<Value, Error> {
        Err(Error::Interop(format!("no foreign resolver installed for member .{member}")))
    }
}

/// Wraps a Rust closure as a foreign handle
pub struct ForeignFn<F> {
    name: String,
    func: F,
}

impl<F> ForeignFn<F>
where
    F: Fn(Vec<Value>) -> Result<Value, Error> + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        ForeignFn {
            name: name.into(),
            func,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Foreign(Rc::new(self))
    }
}

impl<F> ForeignCallable for ForeignFn<F>
where
    F: Fn(Vec<Value>) -> Result<Value, Error>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: Vec<Value>) -> Result<Value, Error> {
        (self.func)(args)
    }
}
