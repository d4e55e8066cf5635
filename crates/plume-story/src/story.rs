//! The turn-by-turn story driver.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use plume_core::{List, Value};
use plume_expr::{ExprError, ExternalFn, Observer, VariableStore};
use tracing::debug;

use crate::binary;
use crate::config::StoryConfig;
use crate::content::{ContentObject, GlobalVariable, ListDeclaration, walk};
use crate::error::{StoryError, StoryResult, StructureError};
use crate::frame::{Frame, FrameKind};
use crate::output::OutputBuffer;
use crate::state::{FlowStatus, StoryState};
use crate::weave::{Address, StoryContent};

/// A loaded story and its running state.
///
/// ```text
/// while story.can_continue() {
///     println!("{}", story.continue_line()?);
/// }
/// // then show story.current_choices() and call story.choose(i)
/// ```
pub struct Story {
    pub(crate) content: Rc<StoryContent>,
    pub(crate) state: StoryState,
    pub(crate) output: OutputBuffer,
    pub(crate) config: StoryConfig,
    pub(crate) externals: HashMap<String, ExternalFn>,
    current_tags: Vec<String>,
}

impl Story {
    /// Load `content`, declare its globals and position the flow at the
    /// configured entry point.
    pub fn new(content: StoryContent, config: StoryConfig) -> StoryResult<Self> {
        let mut story = Self {
            content: Rc::new(content),
            state: StoryState::new(config.seed),
            output: OutputBuffer::new(),
            config,
            externals: HashMap::new(),
            current_tags: Vec::new(),
        };
        story.declare_globals()?;

        let entry = match &story.config.entry_point {
            Some(path) => path.clone(),
            None => story
                .content
                .first_knot()
                .and_then(|id| story.content.knot(id))
                .map(|knot| knot.name.clone())
                .ok_or(StructureError::NoEntryPoint)?,
        };
        story.start_at(&entry)?;
        debug!(entry = %entry, knots = story.content.knots().len(), "story loaded");
        Ok(story)
    }

    /// Load a story from its JSON form.
    pub fn from_json(json: &str, config: StoryConfig) -> StoryResult<Self> {
        Self::new(StoryContent::from_json(json)?, config)
    }

    /// Load a story from the binary `INKB` format.
    pub fn from_bytes(bytes: &[u8], config: StoryConfig) -> StoryResult<Self> {
        Self::new(binary::decode(bytes)?, config)
    }

    /// The content tree.
    pub fn content(&self) -> &StoryContent {
        &self.content
    }

    /// The running state.
    pub fn state(&self) -> &StoryState {
        &self.state
    }

    fn declare_globals(&mut self) -> StoryResult<()> {
        let content = Rc::clone(&self.content);
        let mut lists: Vec<ListDeclaration> = Vec::new();
        let mut globals: Vec<GlobalVariable> = Vec::new();
        for knot in content.knots() {
            walk(&knot.objects, &mut |object| match object {
                ContentObject::ListDeclaration(list) => lists.push(list.clone()),
                ContentObject::GlobalVariable(global) => globals.push(global.clone()),
                _ => {}
            });
        }

        // Lists first: variable initializers may name their items.
        for list in &lists {
            let definitions = self.state.variables.lists_mut();
            let id = definitions
                .define(
                    list.name.as_str(),
                    list.entries.iter().map(|e| (e.label.as_str(), e.value)),
                )
                .map_err(ExprError::from)?;
            let selected = definitions
                .get(id)
                .map(|definition| {
                    list.entries
                        .iter()
                        .filter(|e| e.selected)
                        .filter_map(|e| definition.item(&e.label))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            let value = List::from_items(selected).with_origin(id);
            self.state
                .variables
                .define_global(list.name.clone(), Value::List(value));
        }

        for global in &globals {
            let value = global
                .init
                .value(self)?
                .ok_or(ExprError::MissingValue("global initializer"))?;
            debug!(variable = %global.name, value = %value, constant = global.constant, "global declared");
            if global.constant {
                self.state.variables.define_constant(global.name.clone(), value);
            } else {
                self.state.variables.define_global(global.name.clone(), value);
            }
        }
        Ok(())
    }

    /// Reset the flow to start at `path`.
    fn start_at(&mut self, path: &str) -> StoryResult<()> {
        let address = self.content.resolve(path, None)?;
        let location = self.content.locate(address)?;
        let objects = self.knot_objects(location.knot)?;

        self.state.choices.clear();
        self.state.frames.clear();
        self.state.variables.replace_scopes(Vec::new());
        self.push_frame(Frame::at(FrameKind::Root, objects, &location));
        if let Address::Knot(id) = address {
            self.bind_parameters(id, Vec::new())?;
        }
        self.enter(&location);
        self.state.status = FlowStatus::Running;
        Ok(())
    }

    /// Whether `continue_line` has anything to return.
    pub fn can_continue(&self) -> bool {
        self.output.has_line() || self.state.status == FlowStatus::Running
    }

    /// Run until the next complete line and return it.
    pub fn continue_line(&mut self) -> StoryResult<String> {
        if !self.can_continue() {
            return Err(StoryError::CannotContinue);
        }
        let limit = self.config.step_limit;
        let mut steps = 0;
        while self.state.status == FlowStatus::Running && !self.line_settled() {
            steps += 1;
            if steps > limit {
                return Err(StoryError::StepLimitExceeded(limit));
            }
            self.step()?;
        }
        let line = self.output.pop_line().unwrap_or_default();
        self.current_tags = line.tags;
        Ok(line.text)
    }

    /// Run until the story stops, joining the non-empty lines produced.
    pub fn continue_maximally(&mut self) -> StoryResult<String> {
        let mut lines = Vec::new();
        while self.can_continue() {
            let line = self.continue_line()?;
            if !line.is_empty() {
                lines.push(line);
            }
        }
        Ok(lines.join("\n"))
    }

    /// A finished line is settled once the next object would start new
    /// text. Silent objects after it (diverts, logic, glue) run first.
    fn line_settled(&self) -> bool {
        self.output.has_line()
            && matches!(
                self.state.frames.last().and_then(Frame::peek),
                Some(ContentObject::Text(_) | ContentObject::Interpolation(_))
            )
    }

    /// Text of the choices on offer.
    pub fn current_choices(&self) -> Vec<String> {
        self.visible_choices().map(|c| c.text.clone()).collect()
    }

    /// Tags of the choice at `index`.
    pub fn choice_tags(&self, index: usize) -> Option<&[String]> {
        self.visible_choices().nth(index).map(|c| c.tags.as_slice())
    }

    /// Whether the choice at `index` was contributed by a thread.
    pub fn choice_is_from_thread(&self, index: usize) -> Option<bool> {
        self.visible_choices().nth(index).map(|c| c.from_thread)
    }

    fn visible_choices(&self) -> impl Iterator<Item = &crate::state::PendingChoice> {
        self.state.choices.iter().filter(|c| !c.fallback)
    }

    /// Tags of the line most recently returned by `continue_line`.
    pub fn current_tags(&self) -> &[String] {
        &self.current_tags
    }

    /// Select the choice at `index` of [`Story::current_choices`].
    pub fn choose(&mut self, index: usize) -> StoryResult<()> {
        let available = self.visible_choices().count();
        let position = self
            .state
            .choices
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.fallback)
            .nth(index)
            .map(|(position, _)| position);
        match position {
            Some(position) if self.state.status == FlowStatus::AtChoice => {
                self.select(position, true)
            }
            _ => Err(StoryError::InvalidChoice { index, available }),
        }
    }

    /// Abandon the current flow and continue from `path`.
    pub fn choose_path(&mut self, path: &str) -> StoryResult<()> {
        debug!(path = %path, "jumping to path");
        self.start_at(path)
    }

    /// Whether the story has ended and every line has been read.
    pub fn is_finished(&self) -> bool {
        !self.can_continue() && self.state.status == FlowStatus::Ended
    }

    /// Read a variable.
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.state.variables.get(name).cloned()
    }

    /// Write a declared global variable. Observers fire if it changes.
    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) -> StoryResult<()> {
        let variables = &mut self.state.variables;
        if !variables.has_global(name) && !variables.is_constant(name) {
            return Err(StoryError::UnknownVariable(name.to_string()));
        }
        let value = value.into();
        if let Value::List(list) = &value {
            variables.lists().check(list).map_err(ExprError::from)?;
        }
        variables.set(name, value)?;
        Ok(())
    }

    /// The variable store.
    pub fn variables(&self) -> &VariableStore {
        &self.state.variables
    }

    /// Call `callback` whenever global `name` changes. The returned handle
    /// removes it again.
    pub fn observe_variable(
        &mut self,
        name: &str,
        callback: impl Fn(&str, &Value) + 'static,
    ) -> Observer {
        let observer: Observer = Rc::new(callback);
        self.state.variables.observe(name, Rc::clone(&observer));
        observer
    }

    /// Remove every observer of `name`.
    pub fn unobserve_variable(&mut self, name: &str) {
        self.state.variables.unobserve_all(name);
    }

    /// Remove `observer` from every variable.
    pub fn remove_observer(&mut self, observer: &Observer) {
        self.state.variables.unobserve_callback(observer);
    }

    /// Remove `observer` from `name` only.
    pub fn remove_variable_observer(&mut self, name: &str, observer: &Observer) {
        self.state.variables.unobserve(name, observer);
    }

    /// Bind a host function callable from story expressions.
    pub fn bind_external_function(
        &mut self,
        name: impl Into<String>,
        function: impl FnMut(&[Value]) -> Option<Value> + 'static,
    ) {
        self.externals.insert(name.into(), Box::new(function));
    }

    /// Times the section at `path` has been visited.
    pub fn visit_count(&self, path: &str) -> StoryResult<u32> {
        let uuid = self.path_uuid(path)?;
        Ok(self.state.times_visited(uuid))
    }

    /// Turns since the section at `path` was visited, or -1 if never.
    pub fn turns_since(&self, path: &str) -> StoryResult<i64> {
        let uuid = self.path_uuid(path)?;
        Ok(self.state.turns_since(uuid))
    }

    fn path_uuid(&self, path: &str) -> StoryResult<plume_core::Uuid> {
        let address = self.content.resolve(path, self.current_knot())?;
        self.content
            .uuid_of(address)
            .ok_or_else(|| crate::error::NavigationError::UnknownTarget(path.to_string()).into())
    }
}

impl fmt::Debug for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Story")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("externals", &self.externals.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CompileContext;

    fn story(build: impl FnOnce(&mut CompileContext)) -> Story {
        let mut ctx = CompileContext::new();
        build(&mut ctx);
        Story::new(ctx.finish().unwrap(), StoryConfig::default()).unwrap()
    }

    #[test]
    fn lines_come_out_one_at_a_time() {
        let mut story = story(|ctx| {
            ctx.knot("start", |k| {
                k.line("One.").line("Two.").end();
            });
        });
        assert!(story.can_continue());
        assert_eq!(story.continue_line().unwrap(), "One.");
        assert_eq!(story.continue_line().unwrap(), "Two.");
        assert!(!story.can_continue());
        assert!(story.is_finished());
        assert!(matches!(
            story.continue_line(),
            Err(StoryError::CannotContinue)
        ));
    }

    #[test]
    fn globals_are_declared_before_start() {
        let mut story = story(|ctx| {
            ctx.knot("start", |k| {
                k.list("Mood", &[("calm", 1, true), ("angry", 2, false)])
                    .global("gold", "10")
                    .constant("MAX_GOLD", "gold * 10")
                    .text("Gold: ")
                    .interpolate("gold")
                    .line_break()
                    .done();
            });
        });
        assert_eq!(story.get_variable("gold"), Some(Value::Int(10)));
        assert_eq!(story.get_variable("MAX_GOLD"), Some(Value::Int(100)));
        assert_eq!(
            story.get_variable("Mood").map(|v| v.to_string()),
            Some("calm".to_string())
        );
        assert_eq!(story.continue_maximally().unwrap(), "Gold: 10");
    }

    #[test]
    fn set_variable_requires_declaration() {
        let mut story = story(|ctx| {
            ctx.knot("start", |k| {
                k.global("hp", "3").constant("CAP", "5").done();
            });
        });
        story.set_variable("hp", 4).unwrap();
        assert_eq!(story.get_variable("hp"), Some(Value::Int(4)));
        assert!(matches!(
            story.set_variable("mana", 1),
            Err(StoryError::UnknownVariable(_))
        ));
        assert!(matches!(
            story.set_variable("CAP", 6),
            Err(StoryError::Expression(ExprError::AssignToConstant(_)))
        ));
    }

    #[test]
    fn observers_fire_on_change() {
        use std::cell::RefCell;

        let mut story = story(|ctx| {
            ctx.knot("start", |k| {
                k.global("score", "0").logic("score = score + 5").done();
            });
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let handle = story.observe_variable("score", move |name, value| {
            sink.borrow_mut().push(format!("{name}={value}"));
        });
        story.continue_maximally().unwrap();
        story.set_variable("score", 5).unwrap();
        story.remove_observer(&handle);
        story.set_variable("score", 9).unwrap();
        assert_eq!(*seen.borrow(), vec!["score=5".to_string()]);
    }

    #[test]
    fn missing_entry_point_is_an_error() {
        let mut ctx = CompileContext::new();
        ctx.function("f", &[], |k| {
            k.logic("return 1");
        });
        let result = Story::new(ctx.finish().unwrap(), StoryConfig::default());
        assert!(matches!(
            result,
            Err(StoryError::Structure(StructureError::NoEntryPoint))
        ));
    }

    #[test]
    fn entry_point_from_config() {
        let mut ctx = CompileContext::new();
        ctx.knot("first", |k| {
            k.line("First.").end();
        });
        ctx.knot("second", |k| {
            k.line("Second.").end();
        });
        let config = StoryConfig::default().with_entry_point("second");
        let mut story = Story::new(ctx.finish().unwrap(), config).unwrap();
        assert_eq!(story.continue_maximally().unwrap(), "Second.");
        assert_eq!(story.visit_count("first").unwrap(), 0);
        assert_eq!(story.visit_count("second").unwrap(), 1);
    }
}
