//! The environment an expression is evaluated in.

use std::collections::HashMap;
use std::fmt;

use plume_core::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ExprError, ExprResult};
use crate::expression::Expression;
use crate::lexer::SymbolTable;
use crate::variables::VariableStore;

/// A host function bound by name. Returning `None` yields no value.
pub type ExternalFn = Box<dyn FnMut(&[Value]) -> Option<Value>>;

/// A resolved argument to a story function call.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// The argument's value.
    pub value: Value,
    /// The variable the argument was read from, if it was a plain variable.
    /// Reference parameters bind to this name.
    pub variable: Option<String>,
}

/// Everything the evaluator needs from its surroundings.
///
/// A story implements this over its state; [`Sandbox`] implements it for
/// standalone evaluation. Defaults describe a host with no story.
pub trait EvalHost {
    /// The variable store.
    fn variables(&self) -> &VariableStore;

    /// The variable store, mutably.
    fn variables_mut(&mut self) -> &mut VariableStore;

    /// Read count of the section at `path`, or `None` if no such section.
    fn read_count(&self, _path: &str) -> Option<i64> {
        None
    }

    /// Turns since the section at `path` was visited (-1 if never), or
    /// `None` if no such section.
    fn turns_since(&self, _path: &str) -> Option<i64> {
        None
    }

    /// Number of completed turns.
    fn turn_index(&self) -> i64 {
        0
    }

    /// Number of choices gathered so far in the current turn.
    fn choice_count(&self) -> i64 {
        0
    }

    /// Uniform integer in `min..=max`. Callers guarantee `min <= max`.
    fn random(&mut self, min: i64, max: i64) -> i64;

    /// Reseed the random source.
    fn seed_random(&mut self, seed: u64);

    /// Whether `name` is a story function knot.
    fn is_story_function(&self, _name: &str) -> bool {
        false
    }

    /// Run a story function to completion and return its value.
    ///
    /// This is where evaluation leaves the expression layer and re-enters
    /// story flow.
    fn call_story_function(
        &mut self,
        name: &str,
        _args: Vec<Argument>,
    ) -> ExprResult<Option<Value>> {
        Err(ExprError::UnknownFunction(name.to_string()))
    }

    /// Whether a host function with this name is bound.
    fn is_external_function(&self, _name: &str) -> bool {
        false
    }

    /// Call a bound host function.
    fn call_external(&mut self, name: &str, _args: &[Value]) -> ExprResult<Option<Value>> {
        Err(ExprError::UnknownFunction(name.to_string()))
    }
}

/// A self-contained evaluation environment: a variable store, a seeded RNG
/// and optional host functions, with no story attached.
pub struct Sandbox {
    variables: VariableStore,
    rng: StdRng,
    externals: HashMap<String, ExternalFn>,
}

impl Sandbox {
    /// Create a sandbox whose RNG is seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            variables: VariableStore::new(),
            rng: StdRng::seed_from_u64(seed),
            externals: HashMap::new(),
        }
    }

    /// Bind a host function by name.
    pub fn bind_external(
        &mut self,
        name: impl Into<String>,
        function: impl FnMut(&[Value]) -> Option<Value> + 'static,
    ) {
        self.externals.insert(name.into(), Box::new(function));
    }

    /// Parse and evaluate `source`, returning its value.
    pub fn eval(&mut self, source: &str) -> ExprResult<Option<Value>> {
        let expression = Expression::parse(source, &*self)?;
        Ok(expression.evaluate(self)?.value)
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("variables", &self.variables)
            .field("externals", &self.externals.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SymbolTable for Sandbox {
    fn is_external_function(&self, name: &str) -> bool {
        self.externals.contains_key(name)
    }

    fn is_list_definition(&self, name: &str) -> bool {
        self.variables.lists().contains_name(name)
    }
}

impl EvalHost for Sandbox {
    fn variables(&self) -> &VariableStore {
        &self.variables
    }

    fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    fn random(&mut self, min: i64, max: i64) -> i64 {
        self.rng.random_range(min..=max)
    }

    fn seed_random(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn is_external_function(&self, name: &str) -> bool {
        self.externals.contains_key(name)
    }

    fn call_external(&mut self, name: &str, args: &[Value]) -> ExprResult<Option<Value>> {
        let function = self
            .externals
            .get_mut(name)
            .ok_or_else(|| ExprError::UnknownFunction(name.to_string()))?;
        Ok(function(args))
    }
}
