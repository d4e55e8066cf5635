//! Content execution: one object at a time, dispatched by kind.

use std::rc::Rc;

use plume_core::{BinaryOp, Value};
use plume_expr::{Argument, ExprError, Expression, Token};
use tracing::{debug, trace, warn};

use crate::content::{
    Choice, Conditional, Content, ContentObject, DONE, Divert, DivertKind, END, MixMarker,
};
use crate::error::{NavigationError, StoryError, StoryResult, StructureError};
use crate::frame::{Frame, FrameKind, resume_point};
use crate::state::{FlowStatus, PendingChoice};
use crate::story::Story;
use crate::weave::{Address, KnotId, Location};

/// What the top frame wants next.
enum Next {
    Execute {
        content: Content,
        index: usize,
        knot: KnotId,
        arrived: bool,
    },
    Exhausted,
    Idle,
}

/// Why the flow stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Choice,
    Done,
    End,
}

/// Choice text regions, see [`MixMarker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Shared,
    ChoiceOnly,
    OutputOnly,
}

#[derive(Debug, Default)]
struct ChoiceText {
    text: String,
    echo: String,
    tags: Vec<String>,
}

impl ChoiceText {
    fn push(&mut self, region: Region, text: &str) {
        if region != Region::OutputOnly {
            self.text.push_str(text);
        }
        if region != Region::ChoiceOnly {
            self.echo.push_str(text);
        }
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn advance(frame: &mut Frame) -> Next {
    while let Some(cursor) = frame.cursors.last_mut() {
        if cursor.is_done() {
            frame.cursors.pop();
            continue;
        }
        let index = cursor.index;
        cursor.index += 1;
        let arrived = cursor.top_level && cursor.counted != Some(index);
        return Next::Execute {
            content: Rc::clone(&cursor.content),
            index,
            knot: frame.knot,
            arrived,
        };
    }
    Next::Exhausted
}

impl Story {
    /// Execute one object, or pop one finished frame.
    pub(crate) fn step(&mut self) -> StoryResult<()> {
        let next = match self.state.frames.last_mut() {
            Some(frame) => advance(frame),
            None => Next::Idle,
        };
        match next {
            Next::Idle => self.stop(Stop::Done),
            Next::Exhausted => self.finish_frame(),
            Next::Execute {
                content,
                index,
                knot,
                arrived,
            } => {
                if arrived {
                    let gather = self
                        .content
                        .knot(knot)
                        .and_then(|k| k.gather_starting_at(index))
                        .map(|g| g.uuid);
                    if let Some(uuid) = gather {
                        trace!(gather = %uuid, "gather reached");
                        self.state.visit(uuid);
                    }
                }
                match content.get(index) {
                    Some(object) => self.execute(knot, object),
                    None => Ok(()),
                }
            }
        }
    }

    fn execute(&mut self, knot: KnotId, object: &ContentObject) -> StoryResult<()> {
        trace!(?object, "execute");
        match object {
            ContentObject::Text(text) => self.output.push_text(text),
            ContentObject::LineBreak => self.output.line_break(),
            ContentObject::Glue => self.output.glue(),
            ContentObject::Tag(tag) => self.output.push_tag(tag),
            ContentObject::Interpolation(expr) => {
                if let Some(value) = expr.value(self)? {
                    self.output.push_text(&value.to_string());
                }
            }
            ContentObject::Logic(expr) => {
                let evaluation = expr.evaluate(self)?;
                if evaluation.returned {
                    self.return_from_function(evaluation.value)?;
                }
            }
            ContentObject::Divert(divert) => self.divert(divert)?,
            ContentObject::Choice(choice) => self.offer(knot, choice)?,
            ContentObject::Conditional(conditional) => {
                if let Some(branch) = self.pick_branch(conditional)? {
                    self.push_content(branch);
                }
            }
            ContentObject::Sequence(sequence) => {
                let group = self
                    .state
                    .next_group(sequence.id, sequence.kind, sequence.groups.len());
                if let Some(group) = group.and_then(|g| sequence.groups.get(g)) {
                    self.push_content(Rc::clone(group));
                }
            }
            ContentObject::ChoiceTextMix(_) => trace!("mix marker outside choice text"),
            // Declared when the story is loaded.
            ContentObject::GlobalVariable(_) | ContentObject::ListDeclaration(_) => {}
        }
        Ok(())
    }

    fn push_content(&mut self, content: Content) {
        if let Some(frame) = self.state.frames.last_mut() {
            frame.push_content(content);
        }
    }

    /// The branch a conditional takes, if any.
    fn pick_branch(&mut self, conditional: &Conditional) -> StoryResult<Option<Content>> {
        match &conditional.switch {
            Some(switch) => {
                let subject = switch.value(self)?;
                for branch in &conditional.branches {
                    let case = branch.condition.value(self)?;
                    let matched = match (&subject, &case) {
                        (Some(subject), Some(case)) => Value::apply(
                            BinaryOp::Equal,
                            subject,
                            case,
                            self.state.variables.lists(),
                        )
                        .map_err(ExprError::from)?
                        .is_some_and(|v| v.is_truthy()),
                        _ => false,
                    };
                    if matched {
                        return Ok(Some(Rc::clone(&branch.content)));
                    }
                }
            }
            None => {
                for branch in &conditional.branches {
                    if branch.condition.is_true(self)? {
                        return Ok(Some(Rc::clone(&branch.content)));
                    }
                }
            }
        }
        Ok(conditional.otherwise.clone())
    }

    fn top_kind(&self) -> Option<FrameKind> {
        self.state.frames.last().map(|f| f.kind)
    }

    pub(crate) fn current_knot(&self) -> Option<KnotId> {
        self.state.frames.last().map(|f| f.knot)
    }

    pub(crate) fn knot_objects(&self, id: KnotId) -> StoryResult<Content> {
        self.content
            .knot(id)
            .map(|k| Rc::clone(&k.objects))
            .ok_or_else(|| NavigationError::UnknownTarget(id.to_string()).into())
    }

    fn knot_name(&self, id: KnotId) -> String {
        self.content
            .knot(id)
            .map_or_else(|| id.to_string(), |k| k.name.clone())
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        if self.state.frames.is_empty() {
            self.state.variables.reset_scope();
        } else {
            self.state.variables.push_scope();
        }
        debug!(kind = ?frame.kind, knot = %self.knot_name(frame.knot), depth = self.state.frames.len(), "frame pushed");
        self.state.frames.push(frame);
    }

    fn pop_frame(&mut self) -> StoryResult<Frame> {
        let frame = self
            .state
            .frames
            .pop()
            .ok_or(NavigationError::EmptyFrameStack)?;
        if self.state.frames.is_empty() {
            self.state.variables.reset_scope();
        } else {
            self.state.variables.pop_scope();
        }
        debug!(kind = ?frame.kind, knot = %self.knot_name(frame.knot), "frame popped");
        Ok(frame)
    }

    /// The top frame ran out of content.
    fn finish_frame(&mut self) -> StoryResult<()> {
        let frame = self.pop_frame()?;
        match frame.kind {
            FrameKind::Root => self.stop(Stop::Done),
            FrameKind::Tunnel { .. } => {
                warn!(knot = %self.knot_name(frame.knot), "tunnel ran out of content without returning");
                Ok(())
            }
            FrameKind::Function { .. } => {
                self.state.function_return = Some(None);
                Ok(())
            }
            FrameKind::Thread { .. } => Ok(()),
        }
    }

    /// Halt the flow. Choices gathered so far stay on offer unless the
    /// story ended outright.
    fn stop(&mut self, how: Stop) -> StoryResult<()> {
        self.state.frames.clear();
        self.state.variables.replace_scopes(Vec::new());
        self.output.flush();

        if how == Stop::End {
            self.state.choices.clear();
            self.state.status = FlowStatus::Ended;
            debug!("story ended");
            return Ok(());
        }

        let visible = self.state.choices.iter().filter(|c| !c.fallback).count();
        if visible > 0 {
            self.state.status = FlowStatus::AtChoice;
            debug!(choices = visible, "awaiting choice");
            return Ok(());
        }
        if let Some(fallback) = self.state.choices.iter().position(|c| c.fallback) {
            debug!("taking fallback choice");
            return self.select(fallback, false);
        }

        if how == Stop::Choice {
            warn!("ran out of choices");
        }
        self.state.status = FlowStatus::Ended;
        debug!("story ended");
        Ok(())
    }

    fn done(&mut self) -> StoryResult<()> {
        if let Some(FrameKind::Thread { .. }) = self.top_kind() {
            self.pop_frame()?;
            return Ok(());
        }
        self.stop(Stop::Done)
    }

    fn divert(&mut self, divert: &Divert) -> StoryResult<()> {
        if divert.kind == DivertKind::TunnelReturn {
            if !matches!(self.top_kind(), Some(FrameKind::Tunnel { .. })) {
                return Err(NavigationError::TunnelReturnWithoutTunnel.into());
            }
            self.pop_frame()?;
            debug!(then = ?divert.target, "tunnel returned");
            return match &divert.target {
                Some(target) => self.goto(target, &divert.args),
                None => Ok(()),
            };
        }

        let target = divert.target.as_deref().unwrap_or_default();
        if let Some(FrameKind::Function { .. }) = self.top_kind() {
            return Err(NavigationError::DivertInFunction(target.to_string()).into());
        }
        match divert.kind {
            DivertKind::Tunnel => self.call(target, &divert.args, |depth| FrameKind::Tunnel {
                return_to: depth,
            }),
            DivertKind::Thread => self.call(target, &divert.args, |depth| FrameKind::Thread {
                spawned_from: depth,
            }),
            _ => self.goto(target, &divert.args),
        }
    }

    /// Move the top frame to `target`.
    fn goto(&mut self, target: &str, args: &[Expression]) -> StoryResult<()> {
        match target {
            END => return self.stop(Stop::End),
            DONE => return self.done(),
            _ => {}
        }
        let current = self.current_knot();
        let address = self.content.resolve(target, current)?;
        let location = self.content.locate(address)?;
        let arguments = self.evaluate_arguments(args)?;
        let objects = self.knot_objects(location.knot)?;
        debug!(target = %target, "divert");

        let frame = self
            .state
            .frames
            .last_mut()
            .ok_or(NavigationError::EmptyFrameStack)?;
        frame.relocate(objects, &location);
        // Temporaries belong to the knot they were declared in.
        if current != Some(location.knot) {
            self.state.variables.reset_scope();
        }
        if let Address::Knot(id) = address {
            self.bind_parameters(id, arguments)?;
        }
        self.enter(&location);
        Ok(())
    }

    /// Push a tunnel or thread frame at `target`.
    fn call(
        &mut self,
        target: &str,
        args: &[Expression],
        kind: impl FnOnce(usize) -> FrameKind,
    ) -> StoryResult<()> {
        let address = self.content.resolve(target, self.current_knot())?;
        let location = self.content.locate(address)?;
        let arguments = self.evaluate_arguments(args)?;
        let objects = self.knot_objects(location.knot)?;
        let depth = self.state.frames.len().saturating_sub(1);
        self.push_frame(Frame::at(kind(depth), objects, &location));
        if let Address::Knot(id) = address {
            self.bind_parameters(id, arguments)?;
        }
        self.enter(&location);
        Ok(())
    }

    pub(crate) fn enter(&mut self, location: &Location) {
        for uuid in &location.visits {
            self.state.visit(*uuid);
        }
    }

    fn evaluate_arguments(&mut self, args: &[Expression]) -> StoryResult<Vec<Argument>> {
        let mut arguments = Vec::with_capacity(args.len());
        for arg in args {
            let value = arg
                .value(self)?
                .ok_or(ExprError::MissingValue("divert argument"))?;
            let variable = match arg.tokens() {
                [Token::Variable(name)] => Some(self.state.variables.resolve_name(name)),
                _ => None,
            };
            arguments.push(Argument { value, variable });
        }
        Ok(arguments)
    }

    /// Bind `arguments` to the parameters of knot `id` in the innermost
    /// scope.
    pub(crate) fn bind_parameters(&mut self, id: KnotId, arguments: Vec<Argument>) -> StoryResult<()> {
        let content = Rc::clone(&self.content);
        let knot = content
            .knot(id)
            .ok_or_else(|| NavigationError::UnknownTarget(id.to_string()))?;
        if knot.parameters.len() != arguments.len() {
            return Err(StructureError::ArgumentCount {
                target: knot.name.clone(),
                expected: knot.parameters.len(),
                found: arguments.len(),
            }
            .into());
        }
        for (parameter, argument) in knot.parameters.iter().zip(arguments) {
            if parameter.by_ref {
                let variable = argument.variable.ok_or_else(|| StructureError::ByRefArgument {
                    target: knot.name.clone(),
                    parameter: parameter.name.clone(),
                })?;
                self.state.variables.add_redirect(&parameter.name, &variable);
            } else {
                self.state
                    .variables
                    .declare_temporary(&parameter.name, argument.value);
            }
        }
        Ok(())
    }

    fn return_from_function(&mut self, value: Option<Value>) -> StoryResult<()> {
        if !matches!(self.top_kind(), Some(FrameKind::Function { .. })) {
            return Err(StructureError::ReturnOutsideFunction.into());
        }
        self.pop_frame()?;
        self.state.function_return = Some(value);
        Ok(())
    }

    /// Run the function knot `name` to completion.
    pub(crate) fn run_function(
        &mut self,
        name: &str,
        arguments: Vec<Argument>,
    ) -> StoryResult<Option<Value>> {
        let id = self
            .content
            .knot_id(name)
            .ok_or_else(|| NavigationError::UnknownTarget(name.to_string()))?;
        let location = self.content.locate(Address::Knot(id))?;
        if !self.content.knot(id).is_some_and(|k| k.is_function) {
            return Err(StructureError::NotAFunction(name.to_string()).into());
        }
        let objects = self.knot_objects(id)?;

        let depth = self.state.frames.len();
        let caller = depth.saturating_sub(1);
        self.push_frame(Frame::at(FrameKind::Function { caller }, objects, &location));
        self.bind_parameters(id, arguments)?;
        self.enter(&location);

        let outer = self.state.function_return.take();
        let limit = self.config.step_limit;
        let mut steps = 0;
        while self.state.frames.len() > depth {
            steps += 1;
            if steps > limit {
                return Err(StoryError::StepLimitExceeded(limit));
            }
            self.step()?;
        }
        let value = self.state.function_return.take().flatten();
        self.state.function_return = outer;
        trace!(function = %name, ?value, "function returned");
        Ok(value)
    }

    /// Publish the entries of `choice` that are on offer.
    fn offer(&mut self, knot: KnotId, choice: &Choice) -> StoryResult<()> {
        let kind = self.top_kind();
        if let Some(FrameKind::Function { .. }) = kind {
            return Err(StructureError::ChoiceInFunction(self.knot_name(knot)).into());
        }
        let from_thread = matches!(kind, Some(FrameKind::Thread { .. }));
        let resume = resume_point(&self.state.frames, self.state.variables.scopes());

        let mut offered = 0;
        for (index, entry) in choice.entries.iter().enumerate() {
            if !entry.sticky && self.state.is_taken(knot, choice.id, index) {
                continue;
            }
            let mut open = true;
            for condition in &entry.conditions {
                if !condition.is_true(self)? {
                    open = false;
                    break;
                }
            }
            if !open {
                continue;
            }

            let rendered = if entry.fallback {
                ChoiceText::default()
            } else {
                self.render_choice_text(&entry.text)?
            };
            self.state.choices.push(PendingChoice {
                text: rendered.text,
                echo: rendered.echo,
                tags: rendered.tags,
                knot,
                choice: choice.id,
                entry: index,
                result: Rc::clone(&entry.result),
                immediately_continue: entry.immediately_continue,
                fallback: entry.fallback,
                from_thread,
                resume: resume.clone(),
            });
            offered += 1;
        }
        debug!(choice = %choice.id, offered, from_thread, "choices offered");

        if from_thread {
            self.pop_frame()?;
            Ok(())
        } else {
            self.stop(Stop::Choice)
        }
    }

    fn render_choice_text(&mut self, content: &[ContentObject]) -> StoryResult<ChoiceText> {
        let mut rendered = ChoiceText::default();
        let mut region = Region::Shared;
        self.render_into(content, &mut rendered, &mut region)?;
        rendered.text = collapse(&rendered.text);
        rendered.echo = collapse(&rendered.echo);
        Ok(rendered)
    }

    fn render_into(
        &mut self,
        content: &[ContentObject],
        out: &mut ChoiceText,
        region: &mut Region,
    ) -> StoryResult<()> {
        for object in content {
            match object {
                ContentObject::Text(text) => out.push(*region, text),
                ContentObject::Interpolation(expr) => {
                    if let Some(value) = expr.value(self)? {
                        out.push(*region, &value.to_string());
                    }
                }
                ContentObject::Tag(tag) => out.tags.push(tag.trim().to_string()),
                ContentObject::ChoiceTextMix(MixMarker::Start) => *region = Region::ChoiceOnly,
                ContentObject::ChoiceTextMix(MixMarker::End) => *region = Region::OutputOnly,
                ContentObject::Conditional(conditional) => {
                    if let Some(branch) = self.pick_branch(conditional)? {
                        self.render_into(&branch, out, region)?;
                    }
                }
                ContentObject::Sequence(sequence) => {
                    let group = self
                        .state
                        .next_group(sequence.id, sequence.kind, sequence.groups.len())
                        .and_then(|g| sequence.groups.get(g))
                        .map(Rc::clone);
                    if let Some(group) = group {
                        self.render_into(&group, out, region)?;
                    }
                }
                ContentObject::Logic(expr) => {
                    expr.evaluate(self)?;
                }
                ContentObject::Glue | ContentObject::LineBreak => {}
                other => warn!(object = ?other, "unsupported object in choice text ignored"),
            }
        }
        Ok(())
    }

    /// Take the choice at `index` of all pending choices.
    pub(crate) fn select(&mut self, index: usize, echo: bool) -> StoryResult<()> {
        let mut choices = std::mem::take(&mut self.state.choices);
        if index >= choices.len() {
            let available = choices.len();
            self.state.choices = choices;
            return Err(StoryError::InvalidChoice { index, available });
        }
        let chosen = choices.swap_remove(index);
        debug!(index, text = %chosen.text, "choice selected");

        self.state.mark_taken(chosen.knot, chosen.choice, chosen.entry);
        let (frames, scopes): (Vec<_>, Vec<_>) = chosen.resume.into_iter().unzip();
        self.state.frames = frames;
        self.state.variables.replace_scopes(scopes);
        self.state.complete_turn();
        self.state.status = FlowStatus::Running;

        if echo && !chosen.immediately_continue && !chosen.echo.is_empty() {
            self.output.push_text(&chosen.echo);
            self.output.line_break();
        }
        self.push_content(chosen.result);
        Ok(())
    }
}
