//! The story as an evaluation environment for its own expressions.

use plume_core::{Uuid, Value};
use plume_expr::{Argument, EvalHost, ExprError, ExprResult, VariableStore};

use crate::story::Story;

impl Story {
    fn path_count(&self, path: &str, read: impl Fn(&Self, Uuid) -> i64) -> Option<i64> {
        let address = self.content.resolve(path, self.current_knot()).ok()?;
        let uuid = self.content.uuid_of(address)?;
        Some(read(self, uuid))
    }
}

impl EvalHost for Story {
    fn variables(&self) -> &VariableStore {
        &self.state.variables
    }

    fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.state.variables
    }

    fn read_count(&self, path: &str) -> Option<i64> {
        self.path_count(path, |story, uuid| {
            i64::from(story.state.times_visited(uuid))
        })
    }

    fn turns_since(&self, path: &str) -> Option<i64> {
        self.path_count(path, |story, uuid| story.state.turns_since(uuid))
    }

    fn turn_index(&self) -> i64 {
        self.state.turn_index()
    }

    fn choice_count(&self) -> i64 {
        let visible = self.state.choices.iter().filter(|c| !c.fallback).count();
        i64::try_from(visible).unwrap_or(i64::MAX)
    }

    fn random(&mut self, min: i64, max: i64) -> i64 {
        self.state.random(min, max)
    }

    fn seed_random(&mut self, seed: u64) {
        self.state.reseed(seed);
    }

    fn is_story_function(&self, name: &str) -> bool {
        self.content
            .knot_id(name)
            .and_then(|id| self.content.knot(id))
            .is_some_and(|knot| knot.is_function)
    }

    fn call_story_function(&mut self, name: &str, args: Vec<Argument>) -> ExprResult<Option<Value>> {
        self.run_function(name, args).map_err(ExprError::from)
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
