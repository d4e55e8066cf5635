//! Variable storage with call scopes, redirects and change observers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use plume_core::{ListDefinitions, Value};
use tracing::{debug, trace};

use crate::error::{ExprError, ExprResult};

/// Callback fired when a global variable changes. Receives the variable's
/// canonical name and its new value.
pub type Observer = Rc<dyn Fn(&str, &Value)>;

/// One call scope: the temporaries and parameter redirects of an active
/// knot, tunnel, thread or function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    temporaries: HashMap<String, Value>,
    redirects: HashMap<String, String>,
}

impl Scope {
    /// Whether the scope declares a temporary with this name.
    pub fn has_temporary(&self, name: &str) -> bool {
        self.temporaries.contains_key(name)
    }
}

/// Globals, constants, per-call scopes, list definitions and observers.
///
/// Name resolution chases redirects first, then consults constants, then
/// temporaries innermost scope first, then globals. There is always at
/// least one scope.
pub struct VariableStore {
    globals: HashMap<String, Value>,
    constants: HashMap<String, Value>,
    scopes: Vec<Scope>,
    lists: ListDefinitions,
    observers: HashMap<String, Vec<Observer>>,
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableStore")
            .field("globals", &self.globals)
            .field("constants", &self.constants)
            .field("scopes", &self.scopes)
            .field("lists", &self.lists)
            .field("observed", &self.observers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VariableStore {
    /// Create an empty store with a single root scope.
    pub fn new() -> Self {
        Self {
            globals: HashMap::new(),
            constants: HashMap::new(),
            scopes: vec![Scope::default()],
            lists: ListDefinitions::new(),
            observers: HashMap::new(),
        }
    }

    /// The list definition registry.
    pub fn lists(&self) -> &ListDefinitions {
        &self.lists
    }

    /// The list definition registry, mutably.
    pub fn lists_mut(&mut self) -> &mut ListDefinitions {
        &mut self.lists
    }

    /// Chase redirects from `name` to its canonical name.
    ///
    /// Each step looks for the alias innermost scope first. A cycle stops
    /// at the last name before it repeats.
    pub fn resolve_name(&self, name: &str) -> String {
        let mut current = name.to_string();
        let mut seen = HashSet::new();
        seen.insert(current.clone());
        while let Some(target) = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.redirects.get(&current))
        {
            if !seen.insert(target.clone()) {
                break;
            }
            current = target.clone();
        }
        current
    }

    /// Read a variable. `None` if it is not defined anywhere.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = self.resolve_name(name);
        self.constants
            .get(&name)
            .or_else(|| {
                self.scopes
                    .iter()
                    .rev()
                    .find_map(|scope| scope.temporaries.get(&name))
            })
            .or_else(|| self.globals.get(&name))
    }

    /// Whether `name` resolves to a constant.
    pub fn is_constant(&self, name: &str) -> bool {
        self.constants.contains_key(&self.resolve_name(name))
    }

    /// Whether `name` is defined anywhere.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Write a variable.
    ///
    /// Redirects are chased; the innermost scope holding a temporary of
    /// that name receives the write, otherwise the global is created or
    /// replaced. Observers fire only when a global actually changes.
    pub fn set(&mut self, name: &str, value: Value) -> ExprResult<()> {
        let name = self.resolve_name(name);
        if self.constants.contains_key(&name) {
            return Err(ExprError::AssignToConstant(name));
        }
        if let Some(scope) = self
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.temporaries.contains_key(&name))
        {
            trace!(variable = %name, value = %value, "temporary updated");
            scope.temporaries.insert(name, value);
            return Ok(());
        }

        let changed = self.globals.get(&name) != Some(&value);
        self.globals.insert(name.clone(), value.clone());
        if changed {
            self.notify(&name, &value);
        }
        Ok(())
    }

    fn notify(&self, name: &str, value: &Value) {
        if let Some(observers) = self.observers.get(name) {
            debug!(variable = %name, value = %value, observers = observers.len(), "variable changed");
            for observer in observers {
                observer(name, value);
            }
        }
    }

    /// Declare a temporary in the innermost scope, shadowing any variable
    /// or redirect of the same name.
    pub fn declare_temporary(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.redirects.remove(name);
            scope.temporaries.insert(name.to_string(), value);
        }
    }

    /// Make `alias` refer to `target` within the innermost scope.
    pub fn add_redirect(&mut self, alias: &str, target: &str) {
        let target = self.resolve_name(target);
        if let Some(scope) = self.scopes.last_mut() {
            scope.temporaries.remove(alias);
            scope.redirects.insert(alias.to_string(), target);
        }
    }

    /// Define or replace a global without notifying observers.
    pub fn define_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Define a constant.
    pub fn define_constant(&mut self, name: impl Into<String>, value: Value) {
        self.constants.insert(name.into(), value);
    }

    /// Whether a global (not a constant or temporary) with this name exists.
    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    /// Names of all globals.
    pub fn global_names(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }

    /// Enter a new call scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Leave the innermost call scope. The root scope is never removed.
    pub fn pop_scope(&mut self) -> Option<Scope> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// Clear the innermost scope without removing it.
    pub fn reset_scope(&mut self) {
        if let Some(scope) = self.scopes.last_mut() {
            *scope = Scope::default();
        }
    }

    /// Number of scopes, including the root.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// The current scope stack, outermost first.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Replace the scope stack, e.g. to resume from a saved choice point.
    /// An empty stack is replaced by a single root scope.
    pub fn replace_scopes(&mut self, scopes: Vec<Scope>) {
        self.scopes = if scopes.is_empty() {
            vec![Scope::default()]
        } else {
            scopes
        };
    }

    /// Register an observer for changes to `name`.
    pub fn observe(&mut self, name: impl Into<String>, observer: Observer) {
        self.observers.entry(name.into()).or_default().push(observer);
    }

    /// Remove every observer of `name`.
    pub fn unobserve_all(&mut self, name: &str) {
        self.observers.remove(name);
    }

    /// Remove `observer` from every variable it observes.
    pub fn unobserve_callback(&mut self, observer: &Observer) {
        for observers in self.observers.values_mut() {
            observers.retain(|o| !Rc::ptr_eq(o, observer));
        }
        self.observers.retain(|_, observers| !observers.is_empty());
    }

    /// Remove `observer` from `name` only.
    pub fn unobserve(&mut self, name: &str, observer: &Observer) {
        if let Some(observers) = self.observers.get_mut(name) {
            observers.retain(|o| !Rc::ptr_eq(o, observer));
            if observers.is_empty() {
                self.observers.remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn recorder() -> (Observer, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let observer: Observer = Rc::new(move |name: &str, value: &Value| {
            sink.borrow_mut().push(format!("{name}={value}"));
        });
        (observer, log)
    }

    #[test]
    fn lookup_order_prefers_constants_then_temporaries() {
        let mut store = VariableStore::new();
        store.define_global("x", Value::Int(1));
        store.push_scope();
        store.declare_temporary("x", Value::Int(2));
        assert_eq!(store.get("x"), Some(&Value::Int(2)));

        store.define_constant("x", Value::Int(3));
        assert_eq!(store.get("x"), Some(&Value::Int(3)));
    }

    #[test]
    fn temporaries_searched_innermost_first() {
        let mut store = VariableStore::new();
        store.declare_temporary("t", Value::Int(1));
        store.push_scope();
        assert_eq!(store.get("t"), Some(&Value::Int(1)));
        store.declare_temporary("t", Value::Int(2));
        assert_eq!(store.get("t"), Some(&Value::Int(2)));
        store.pop_scope();
        assert_eq!(store.get("t"), Some(&Value::Int(1)));
    }

    #[test]
    fn redirects_chase_to_fixpoint() {
        let mut store = VariableStore::new();
        store.define_global("health", Value::Int(10));
        store.push_scope();
        store.add_redirect("hp", "health");
        store.push_scope();
        store.add_redirect("points", "hp");

        assert_eq!(store.resolve_name("points"), "health");
        store.set("points", Value::Int(4)).unwrap();
        store.pop_scope();
        store.pop_scope();
        assert_eq!(store.get("health"), Some(&Value::Int(4)));
    }

    #[test]
    fn redirect_cycle_terminates() {
        let mut store = VariableStore::new();
        store.add_redirect("a", "b");
        store.add_redirect("b", "a");
        let resolved = store.resolve_name("a");
        assert!(resolved == "a" || resolved == "b");
    }

    #[test]
    fn write_prefers_existing_temporary() {
        let mut store = VariableStore::new();
        store.define_global("n", Value::Int(0));
        store.push_scope();
        store.declare_temporary("n", Value::Int(1));
        store.set("n", Value::Int(5)).unwrap();
        store.pop_scope();
        assert_eq!(store.get("n"), Some(&Value::Int(0)));
    }

    #[test]
    fn constants_reject_writes() {
        let mut store = VariableStore::new();
        store.define_constant("MAX", Value::Int(9));
        assert!(matches!(
            store.set("MAX", Value::Int(1)),
            Err(ExprError::AssignToConstant(name)) if name == "MAX"
        ));
    }

    #[test]
    fn observers_fire_only_on_change() {
        let mut store = VariableStore::new();
        let (observer, log) = recorder();
        store.observe("gold", observer);

        store.set("gold", Value::Int(5)).unwrap();
        store.set("gold", Value::Int(5)).unwrap();
        store.set("gold", Value::Int(6)).unwrap();

        assert_eq!(*log.borrow(), vec!["gold=5", "gold=6"]);
    }

    #[test]
    fn observers_ignore_temporaries() {
        let mut store = VariableStore::new();
        let (observer, log) = recorder();
        store.observe("t", observer);
        store.declare_temporary("t", Value::Int(0));
        store.set("t", Value::Int(1)).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unobserve_variants() {
        let mut store = VariableStore::new();
        let (first, first_log) = recorder();
        let (second, second_log) = recorder();
        store.observe("a", Rc::clone(&first));
        store.observe("b", Rc::clone(&first));
        store.observe("a", Rc::clone(&second));

        store.unobserve("a", &second);
        store.set("a", Value::Int(1)).unwrap();
        assert_eq!(first_log.borrow().len(), 1);
        assert!(second_log.borrow().is_empty());

        store.unobserve_callback(&first);
        store.set("a", Value::Int(2)).unwrap();
        store.set("b", Value::Int(2)).unwrap();
        assert_eq!(first_log.borrow().len(), 1);

        store.observe("a", Rc::clone(&second));
        store.unobserve_all("a");
        store.set("a", Value::Int(3)).unwrap();
        assert!(second_log.borrow().is_empty());
    }

    #[test]
    fn root_scope_is_never_popped() {
        let mut store = VariableStore::new();
        assert!(store.pop_scope().is_none());
        assert_eq!(store.scope_depth(), 1);
    }
}
