//! Quote transform and quasiquote expansion.
//!
//! Quoting never evaluates: [`quote_value`] strips the reader's wrapper nodes and
//! rebuilds literal structure, turning nested `'x` sugar into `(quote x)` lists and
//! macro-introduced identifiers back into plain symbols. [`quasiquote`] walks a
//! template the same way but evaluates `unquote` forms at nesting level one and
//! splices `unquote-splicing` results into the surrounding list or vector.
//!
//! ```scheme
//! (define xs '(2 3))
//! `(1 ,@xs ,(+ 2 2))      ; => (1 2 3 4)
//! `(1 `(2 ,(3 ,(+ 1 3)))) ; => (1 (quasiquote (2 (unquote (3 (unquote 4))))))
//! ```
//!
//! Both the wrapper nodes produced by the reader and the equivalent long-hand
//! list forms (`(unquote x)`) are recognized.

use std::rc::Rc;

use crate::ast::Value;
use crate::evaluator::scope::Scope;
use crate::evaluator::{Runtime, Trampoline};
use crate::{Error, Unwind};

#[derive(Clone, Copy, PartialEq)]
enum Marker {
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplicing,
}

impl Marker {
    fn keyword(self) -> &'static str {
        match self {
            Marker::Quote => "quote",
            Marker::Quasiquote => "quasiquote",
            Marker::Unquote => "unquote",
            Marker::UnquoteSplicing => "unquote-splicing",
        }
    }

    fn wrap(self, datum: Value) -> Value {
        Value::list_from([Value::symbol(self.keyword()), datum])
    }
}

/// Recognize `'x`-style wrapper nodes and `(keyword x)` list forms
fn as_marker(form: &Value) -> Option<(Marker, Value)> {
    match form {
        Value::Quote(inner) => Some((Marker::Quote, (**inner).clone())),
        Value::Quasiquote(inner) => Some((Marker::Quasiquote, (**inner).clone())),
        Value::Unquote(inner) => Some((Marker::Unquote, (**inner).clone())),
        Value::UnquoteSplicing(inner) => Some((Marker::UnquoteSplicing, (**inner).clone())),
        Value::Pair(pair) => {
            let head = pair.car();
            let marker = [
                Marker::Quote,
                Marker::Quasiquote,
                Marker::Unquote,
                Marker::UnquoteSplicing,
            ]
            .into_iter()
            .find(|marker| head.is_symbol_named(marker.keyword()))?;
            match pair.cdr() {
                Value::Pair(rest) if rest.cdr().is_nil() => Some((marker, rest.car())),
                _ => None,
            }
        }
        _ => None,
    }
}

fn needs_rewrite(datum: &Value) -> bool {
    match datum {
        Value::Quote(_)
        | Value::Quasiquote(_)
        | Value::Unquote(_)
        | Value::UnquoteSplicing(_)
        | Value::Scoped(_) => true,
        Value::Pair(_) => {
            let mut iter = datum.iter_list();
            iter.by_ref().any(|item| needs_rewrite(&item)) || needs_rewrite(iter.tail())
        }
        Value::Vector(items) => items.borrow().iter().any(needs_rewrite),
        _ => false,
    }
}

/// Literal structure of a quoted datum.
///
/// Data without wrapper nodes or scoped identifiers is returned as is, sharing
/// structure with the source form.
pub(crate) fn quote_value(datum: &Value) -> Value {
    match datum {
        Value::Quote(inner) => Marker::Quote.wrap(quote_value(inner)),
        Value::Quasiquote(inner) => Marker::Quasiquote.wrap(quote_value(inner)),
        Value::Unquote(inner) => Marker::Unquote.wrap(quote_value(inner)),
        Value::UnquoteSplicing(inner) => Marker::UnquoteSplicing.wrap(quote_value(inner)),
        Value::Scoped(ident) => Value::Symbol(ident.symbol),
        Value::Pair(_) if needs_rewrite(datum) => {
            let mut iter = datum.iter_list();
            let items: Vec<Value> = iter.by_ref().map(|item| quote_value(&item)).collect();
            let tail = quote_value(iter.tail());
            Value::list_with_tail(items, tail)
        }
        Value::Vector(items) if needs_rewrite(datum) => {
            Value::vector(items.borrow().iter().map(quote_value).collect())
        }
        _ => datum.clone(),
    }
}

/// Expand a quasiquote template in `scope`
pub(crate) fn quasiquote(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    template: &Value,
) -> Result<Value, Unwind> {
    Expander { runtime, scope }.expand(template, 1)
}

struct Expander<'a> {
    runtime: &'a mut Runtime,
    scope: &'a Rc<Scope>,
}

impl Expander<'_> {
    fn expand(&mut self, template: &Value, depth: usize) -> Result<Value, Unwind> {
        match as_marker(template) {
            Some((Marker::Unquote, inner)) if depth == 1 => {
                self.runtime.evaluate(self.scope, &inner)
            }
            Some((marker @ (Marker::Unquote | Marker::UnquoteSplicing), inner)) if depth > 1 => {
                Ok(marker.wrap(self.expand(&inner, depth - 1)?))
            }
            Some((Marker::UnquoteSplicing, _)) => Err(Error::EvalError(format!(
                "{template} is only valid in list or vector position"
            ))
            .into()),
            Some((Marker::Quasiquote, inner)) => {
                Ok(Marker::Quasiquote.wrap(self.expand(&inner, depth + 1)?))
            }
            Some((marker, inner)) => Ok(marker.wrap(self.expand(&inner, depth)?)),
            None => match template {
                Value::Pair(_) => self.expand_list(template, depth),
                Value::Vector(items) => {
                    let items = items.borrow().clone();
                    let mut expanded = Vec::with_capacity(items.len());
                    for item in &items {
                        self.expand_item(&mut expanded, item, depth)?;
                    }
                    Ok(Value::vector(expanded))
                }
                other => Ok(quote_value(other)),
            },
        }
    }

    fn expand_list(&mut self, template: &Value, depth: usize) -> Result<Value, Unwind> {
        let mut items = Vec::new();
        let mut rest = template.clone();
        loop {
            // `(a . ,b)` reads as `(a unquote b)`: the marker ends the list walk
            let next = match &rest {
                Value::Pair(pair) if as_marker(&rest).is_none() => {
                    self.expand_item(&mut items, &pair.car(), depth)?;
                    pair.cdr()
                }
                _ => break,
            };
            rest = next;
        }
        let tail = self.expand(&rest, depth)?;
        Ok(Value::list_with_tail(items, tail))
    }

    fn expand_item(
        &mut self,
        items: &mut Vec<Value>,
        item: &Value,
        depth: usize,
    ) -> Result<(), Unwind> {
        match as_marker(item) {
            Some((Marker::UnquoteSplicing, inner)) if depth == 1 => {
                let spliced = self.runtime.evaluate(self.scope, &inner)?;
                let spliced = spliced.list_to_vec().map_err(|_| {
                    Error::EvalError(format!(
                        "unquote-splicing expects a proper list, got {}",
                        spliced.shape()
                    ))
                })?;
                items.extend(spliced);
            }
            _ => items.push(self.expand(item, depth)?),
        }
        Ok(())
    }
}

/// `(quote datum)`
pub(crate) fn eval_quote(
    _runtime: &mut Runtime,
    _scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    match args {
        [datum] => Ok(quote_value(datum).into()),
        _ => Err(Error::arity_error(1, args.len()).into()),
    }
}

/// `(quasiquote template)`
pub(crate) fn eval_quasiquote(
    runtime: &mut Runtime,
    scope: &Rc<Scope>,
    args: &[Value],
) -> Result<Trampoline, Unwind> {
    match args {
        [template] => Ok(quasiquote(runtime, scope, template)?.into()),
        _ => Err(Error::arity_error(1, args.len()).into()),
    }
}
