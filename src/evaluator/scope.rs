// Scope - lexical environment frames shared through Rc
//
// A scope is a mutable binding table plus an optional parent. Procedures keep
// their defining scope alive; every call, `let` block and `parameterize` block
// gets a fresh child. The parentless root holds builtins and the prelude and is
// read-only to `set!`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Symbol, Value};

#[derive(Default)]
pub struct Scope {
    bindings: RefCell<HashMap<Symbol, Value>>,
    parent: Option<Rc<Scope>>,
    /// Interop namespaces searched when a symbol has no binding
    namespaces: RefCell<Vec<Rc<str>>>,
}

impl Scope {
    /// Create a parentless root scope
    pub fn new_root() -> Rc<Self> {
        Rc::new(Scope::default())
    }

    /// Create a child scope
    ///
    /// The namespace configuration is copied, so later `use_namespace` calls on
    /// either side are not seen by the other.
    pub fn create_child(self: &Rc<Self>) -> Rc<Self> {
        Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(self)),
            namespaces: RefCell::new(self.namespaces.borrow().clone()),
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    /// Nearest binding of `name`, walking parents
    pub fn resolve(&self, name: Symbol) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.bindings.borrow().get(&name) {
                return Some(value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    pub fn is_bound(&self, name: Symbol) -> bool {
        self.resolve(name).is_some()
    }

    /// Bind `name` in this scope; shadowing a parent binding is allowed
    pub fn define(&self, name: Symbol, value: Value) -> Result<(), Error> {
        let mut bindings = self.bindings.borrow_mut();
        if bindings.contains_key(&name) {
            return Err(Error::DuplicateDefinition(name.name()));
        }
        bindings.insert(name, value);
        Ok(())
    }

    /// Replace the value of the nearest binding of `name`
    pub fn set(&self, name: Symbol, value: Value) -> Result<(), Error> {
        let mut scope = self;
        loop {
            if let Some(slot) = scope.bindings.borrow_mut().get_mut(&name) {
                if scope.is_root() {
                    return Err(Error::ImmutableScope(name.name()));
                }
                *slot = value;
                return Ok(());
            }
            scope = scope
                .parent
                .as_deref()
                .ok_or_else(|| Error::UndefinedVariable(name.name()))?;
        }
    }

    pub fn use_namespace(&self, namespace: &str) {
        let mut namespaces = self.namespaces.borrow_mut();
        if !namespaces.iter().any(|ns| &**ns == namespace) {
            namespaces.push(Rc::from(namespace));
        }
    }

    pub fn namespaces(&self) -> Vec<Rc<str>> {
        self.namespaces.borrow().clone()
    }

    /// Names bound directly in this scope, sorted
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.borrow().keys().map(|s| s.name()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ast::val;
    use maplit::hashmap;

    fn s(name: &str) -> Symbol {
        Symbol::new(name)
    }

    #[test]
    fn test_define_and_resolve_through_parents() {
        let root = Scope::new_root();
        let expected = hashmap! {
            "x" => val(1),
            "y" => val("two"),
            "z" => val(true),
        };
        for (name, value) in &expected {
            root.define(s(name), value.clone()).unwrap();
        }
        let child = root.create_child().create_child();
        for (name, value) in &expected {
            assert_eq!(child.resolve(s(name)).as_ref(), Some(value), "lookup of {name}");
        }
        assert!(child.resolve(s("missing")).is_none());
    }

    #[test]
    fn test_duplicate_define_fails_but_shadowing_succeeds() {
        let root = Scope::new_root();
        root.define(s("x"), val(1)).unwrap();
        assert!(matches!(
            root.define(s("x"), val(2)),
            Err(Error::DuplicateDefinition(name)) if name == "x"
        ));

        let child = root.create_child();
        child.define(s("x"), val(2)).unwrap();
        assert_eq!(child.resolve(s("x")), Some(val(2)));
        assert_eq!(root.resolve(s("x")), Some(val(1)));
    }

    #[test]
    fn test_set_rules() {
        let root = Scope::new_root();
        root.define(s("builtin"), val(1)).unwrap();
        let user = root.create_child();
        user.define(s("counter"), val(0)).unwrap();
        let inner = user.create_child();

        inner.set(s("counter"), val(5)).unwrap();
        assert_eq!(user.resolve(s("counter")), Some(val(5)));

        assert!(matches!(
            inner.set(s("builtin"), val(2)),
            Err(Error::ImmutableScope(_))
        ));
        assert!(matches!(
            inner.set(s("nowhere"), val(2)),
            Err(Error::UndefinedVariable(_))
        ));
    }

    #[test]
    fn test_namespaces_copied_at_creation() {
        let root = Scope::new_root();
        root.use_namespace("System");
        let child = root.create_child();
        root.use_namespace("System.Text");
        child.use_namespace("System");

        assert_eq!(child.namespaces().len(), 1);
        assert_eq!(root.namespaces().len(), 2);
        assert_eq!(root.create_child().namespaces().len(), 2);
    }

    #[test]
    fn test_local_names() {
        let root = Scope::new_root();
        root.define(s("b"), val(1)).unwrap();
        root.define(s("a"), val(1)).unwrap();
        let child = root.create_child();
        child.define(s("c"), val(1)).unwrap();
        assert_eq!(root.local_names(), vec!["a", "b"]);
        assert_eq!(child.local_names(), vec!["c"]);
        assert!(root.is_root() && !child.is_root());
    }
}
