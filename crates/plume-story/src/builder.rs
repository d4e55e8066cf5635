//! Programmatic construction of content trees.
//!
//! [`CompileContext`] owns the uuid counter and collects knots; closures
//! receive builders for knot bodies, choices, conditionals and sequences.
//! Expression source is parsed as it is added and the first failure is
//! reported by [`CompileContext::finish`].
//!
//! ```
//! use plume_story::{CompileContext, Story, StoryConfig};
//!
//! let mut ctx = CompileContext::new();
//! ctx.knot("start", |k| {
//!     k.line("The door creaks.");
//!     k.choice(|c| {
//!         c.option("Enter", |r| {
//!             r.line("You step inside.").end();
//!         });
//!     });
//! });
//! let mut story = Story::new(ctx.finish().unwrap(), StoryConfig::default()).unwrap();
//! assert_eq!(story.continue_line().unwrap(), "The door creaks.");
//! assert_eq!(story.current_choices(), vec!["Enter"]);
//! ```

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use plume_core::{Uuid, UuidGenerator};
use plume_expr::{Expression, NoSymbols};

use crate::content::{
    Branch, Choice, ChoiceEntry, Conditional, Content, ContentObject, DONE, Divert, DivertKind,
    END, GlobalVariable, ListDeclaration, ListEntry, MixMarker, Sequence, SequenceKind,
};
use crate::error::{StoryError, StoryResult, StructureError};
use crate::weave::{GatherPoint, Knot, Parameter, Stitch, StoryContent};

/// Compile-time state: the uuid counter and the knots built so far.
#[derive(Debug, Default)]
pub struct CompileContext {
    ids: UuidGenerator,
    knots: Vec<Knot>,
    errors: Vec<StoryError>,
}

impl CompileContext {
    /// Create an empty context whose first uuid is `#0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that hands out uuids from `ids`.
    pub fn with_ids(ids: UuidGenerator) -> Self {
        Self {
            ids,
            ..Self::default()
        }
    }

    /// A fresh uuid.
    pub fn next_id(&mut self) -> Uuid {
        self.ids.next_id()
    }

    /// Build a knot.
    pub fn knot(&mut self, name: &str, build: impl FnOnce(&mut KnotBuilder<'_>)) -> &mut Self {
        self.build_knot(name, &[], false, build)
    }

    /// Build a function knot with by-value parameters.
    pub fn function(
        &mut self,
        name: &str,
        parameters: &[&str],
        build: impl FnOnce(&mut KnotBuilder<'_>),
    ) -> &mut Self {
        self.build_knot(name, parameters, true, build)
    }

    fn build_knot(
        &mut self,
        name: &str,
        parameters: &[&str],
        is_function: bool,
        build: impl FnOnce(&mut KnotBuilder<'_>),
    ) -> &mut Self {
        let uuid = self.ids.next_id();
        let mut builder = KnotBuilder {
            body: ContentBuilder::new(self),
            name: name.to_string(),
            uuid,
            parameters: parameters
                .iter()
                .map(|p| Parameter {
                    name: (*p).to_string(),
                    by_ref: false,
                })
                .collect(),
            stitches: Vec::new(),
            gathers: Vec::new(),
            is_function,
        };
        build(&mut builder);
        let knot = builder.into_knot();
        self.knots.push(knot);
        self
    }

    /// Add a knot built elsewhere.
    pub fn add_knot(&mut self, knot: Knot) -> &mut Self {
        self.knots.push(knot);
        self
    }

    /// Validate and index the knots.
    pub fn finish(self) -> StoryResult<StoryContent> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }
        Ok(StoryContent::new(self.knots)?)
    }

    fn content(&mut self, build: impl FnOnce(&mut ContentBuilder<'_>)) -> Content {
        let mut builder = ContentBuilder::new(self);
        build(&mut builder);
        Rc::new(builder.objects)
    }

    fn parse(&mut self, source: &str) -> Option<Expression> {
        match Expression::parse(source, &NoSymbols) {
            Ok(expression) => Some(expression),
            Err(error) => {
                self.errors.push(error.into());
                None
            }
        }
    }
}

/// Appends content objects to a run.
pub struct ContentBuilder<'a> {
    ctx: &'a mut CompileContext,
    objects: Vec<ContentObject>,
}

impl<'a> ContentBuilder<'a> {
    fn new(ctx: &'a mut CompileContext) -> Self {
        Self {
            ctx,
            objects: Vec::new(),
        }
    }

    /// Append any object.
    pub fn object(&mut self, object: ContentObject) -> &mut Self {
        self.objects.push(object);
        self
    }

    /// Literal text.
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.object(ContentObject::Text(text.to_string()))
    }

    /// Text followed by a line break.
    pub fn line(&mut self, text: &str) -> &mut Self {
        self.text(text).line_break()
    }

    /// A line break.
    pub fn line_break(&mut self) -> &mut Self {
        self.object(ContentObject::LineBreak)
    }

    /// Glue.
    pub fn glue(&mut self) -> &mut Self {
        self.object(ContentObject::Glue)
    }

    /// A tag.
    pub fn tag(&mut self, tag: &str) -> &mut Self {
        self.object(ContentObject::Tag(tag.to_string()))
    }

    /// Print the value of `source`.
    pub fn interpolate(&mut self, source: &str) -> &mut Self {
        if let Some(expression) = self.ctx.parse(source) {
            self.objects.push(ContentObject::Interpolation(expression));
        }
        self
    }

    /// Run `source` for its effects.
    pub fn logic(&mut self, source: &str) -> &mut Self {
        if let Some(expression) = self.ctx.parse(source) {
            self.objects.push(ContentObject::Logic(expression));
        }
        self
    }

    /// Declare a global variable.
    pub fn global(&mut self, name: &str, init: &str) -> &mut Self {
        self.declare(name, init, false)
    }

    /// Declare a constant.
    pub fn constant(&mut self, name: &str, init: &str) -> &mut Self {
        self.declare(name, init, true)
    }

    fn declare(&mut self, name: &str, init: &str, constant: bool) -> &mut Self {
        if let Some(init) = self.ctx.parse(init) {
            self.objects.push(ContentObject::GlobalVariable(GlobalVariable {
                name: name.to_string(),
                init,
                constant,
            }));
        }
        self
    }

    /// Declare a list. Entries are `(label, value, selected)`.
    pub fn list(&mut self, name: &str, entries: &[(&str, i64, bool)]) -> &mut Self {
        let entries = entries
            .iter()
            .map(|&(label, value, selected)| ListEntry {
                label: label.to_string(),
                value,
                selected,
            })
            .collect();
        self.object(ContentObject::ListDeclaration(ListDeclaration {
            name: name.to_string(),
            entries,
        }))
    }

    fn divert_object(&mut self, kind: DivertKind, target: Option<&str>, args: &[&str]) -> &mut Self {
        let args = args.iter().filter_map(|a| self.ctx.parse(a)).collect();
        self.object(ContentObject::Divert(
            Divert::new(kind, target.map(str::to_string)).with_args(args),
        ))
    }

    /// `-> target`
    pub fn divert(&mut self, target: &str) -> &mut Self {
        self.divert_object(DivertKind::Goto, Some(target), &[])
    }

    /// `-> target(args)`
    pub fn divert_with(&mut self, target: &str, args: &[&str]) -> &mut Self {
        self.divert_object(DivertKind::Goto, Some(target), args)
    }

    /// `-> target ->`
    pub fn tunnel(&mut self, target: &str) -> &mut Self {
        self.divert_object(DivertKind::Tunnel, Some(target), &[])
    }

    /// `-> target(args) ->`
    pub fn tunnel_with(&mut self, target: &str, args: &[&str]) -> &mut Self {
        self.divert_object(DivertKind::Tunnel, Some(target), args)
    }

    /// `->->`
    pub fn tunnel_return(&mut self) -> &mut Self {
        self.divert_object(DivertKind::TunnelReturn, None, &[])
    }

    /// `->-> target`
    pub fn tunnel_return_to(&mut self, target: &str) -> &mut Self {
        self.divert_object(DivertKind::TunnelReturn, Some(target), &[])
    }

    /// `<- target`
    pub fn thread(&mut self, target: &str) -> &mut Self {
        self.divert_object(DivertKind::Thread, Some(target), &[])
    }

    /// `-> END`
    pub fn end(&mut self) -> &mut Self {
        self.divert(END)
    }

    /// `-> DONE`
    pub fn done(&mut self) -> &mut Self {
        self.divert(DONE)
    }

    /// A choice block.
    pub fn choice(&mut self, build: impl FnOnce(&mut ChoiceBuilder<'_>)) -> &mut Self {
        let id = self.ctx.next_id();
        let mut choice = ChoiceBuilder {
            ctx: &mut *self.ctx,
            entries: Vec::new(),
        };
        build(&mut choice);
        let entries = choice.entries;
        self.object(ContentObject::Choice(Choice { id, entries }))
    }

    /// An if/else-if/else chain.
    pub fn conditional(&mut self, build: impl FnOnce(&mut ConditionalBuilder<'_>)) -> &mut Self {
        self.branching(None, build)
    }

    /// A switch on `subject`; each `when` gives a case value.
    pub fn switch(
        &mut self,
        subject: &str,
        build: impl FnOnce(&mut ConditionalBuilder<'_>),
    ) -> &mut Self {
        let Some(subject) = self.ctx.parse(subject) else {
            return self;
        };
        self.branching(Some(subject), build)
    }

    fn branching(
        &mut self,
        switch: Option<Expression>,
        build: impl FnOnce(&mut ConditionalBuilder<'_>),
    ) -> &mut Self {
        let mut conditional = ConditionalBuilder {
            ctx: &mut *self.ctx,
            branches: Vec::new(),
            otherwise: None,
        };
        build(&mut conditional);
        let (branches, otherwise) = (conditional.branches, conditional.otherwise);
        self.object(ContentObject::Conditional(Conditional {
            switch,
            branches,
            otherwise,
        }))
    }

    /// A sequence of alternatives.
    pub fn sequence(
        &mut self,
        kind: SequenceKind,
        build: impl FnOnce(&mut SequenceBuilder<'_>),
    ) -> &mut Self {
        let id = self.ctx.next_id();
        let mut sequence = SequenceBuilder {
            ctx: &mut *self.ctx,
            groups: Vec::new(),
        };
        build(&mut sequence);
        let groups = sequence.groups;
        self.object(ContentObject::Sequence(Sequence { id, kind, groups }))
    }
}

/// Builds a knot: its body, parameters, stitches and gathers.
pub struct KnotBuilder<'a> {
    body: ContentBuilder<'a>,
    name: String,
    uuid: Uuid,
    parameters: Vec<Parameter>,
    stitches: Vec<Stitch>,
    gathers: Vec<GatherPoint>,
    is_function: bool,
}

impl KnotBuilder<'_> {
    /// Add a by-value parameter.
    pub fn param(&mut self, name: &str) -> &mut Self {
        self.parameters.push(Parameter {
            name: name.to_string(),
            by_ref: false,
        });
        self
    }

    /// Add a reference parameter.
    pub fn ref_param(&mut self, name: &str) -> &mut Self {
        self.parameters.push(Parameter {
            name: name.to_string(),
            by_ref: true,
        });
        self
    }

    /// Start a stitch; everything added after belongs to it.
    pub fn stitch(&mut self, name: &str) -> &mut Self {
        let uuid = self.body.ctx.next_id();
        self.stitches.push(Stitch {
            name: name.to_string(),
            uuid,
            offset: self.body.objects.len(),
            gather_points: Vec::new(),
        });
        self
    }

    /// Start a gather after the choice block just added. `name` may be
    /// empty.
    pub fn gather(&mut self, name: &str) -> &mut Self {
        let uuid = self.body.ctx.next_id();
        let follows_choice = matches!(self.body.objects.last(), Some(ContentObject::Choice(_)));
        if !follows_choice {
            self.body.ctx.errors.push(
                StructureError::InvalidGather {
                    knot: self.name.clone(),
                    gather: name.to_string(),
                }
                .into(),
            );
            return self;
        }
        let gather = GatherPoint {
            name: name.to_string(),
            uuid,
            nesting_level: 1,
            choice_index: self.body.objects.len() - 1,
        };
        match self.stitches.last_mut() {
            Some(stitch) => stitch.gather_points.push(gather),
            None => self.gathers.push(gather),
        }
        self
    }

    fn into_knot(self) -> Knot {
        Knot {
            name: self.name,
            uuid: self.uuid,
            parameters: self.parameters,
            objects: Rc::new(self.body.objects),
            stitches: self.stitches,
            gather_points: self.gathers,
            is_function: self.is_function,
        }
    }
}

impl<'a> Deref for KnotBuilder<'a> {
    type Target = ContentBuilder<'a>;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

impl DerefMut for KnotBuilder<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.body
    }
}

/// Builds the entries of a choice block.
pub struct ChoiceBuilder<'a> {
    ctx: &'a mut CompileContext,
    entries: Vec<ChoiceEntry>,
}

impl ChoiceBuilder<'_> {
    /// A once-only option with plain text.
    pub fn option(&mut self, text: &str, result: impl FnOnce(&mut ContentBuilder<'_>)) -> &mut Self {
        self.entry(|e| {
            e.label(text).result(result);
        })
    }

    /// A sticky option with plain text.
    pub fn sticky(&mut self, text: &str, result: impl FnOnce(&mut ContentBuilder<'_>)) -> &mut Self {
        self.entry(|e| {
            e.label(text).sticky().result(result);
        })
    }

    /// A fallback option, taken when nothing else is on offer.
    pub fn fallback(&mut self, result: impl FnOnce(&mut ContentBuilder<'_>)) -> &mut Self {
        self.entry(|e| {
            e.fallback().result(result);
        })
    }

    /// An option with full control over its text and flags.
    pub fn entry(&mut self, build: impl FnOnce(&mut EntryBuilder<'_>)) -> &mut Self {
        let mut entry = EntryBuilder {
            ctx: &mut *self.ctx,
            entry: ChoiceEntry::new(Rc::new(Vec::new()), Rc::new(Vec::new())),
        };
        build(&mut entry);
        let entry = entry.entry;
        self.entries.push(entry);
        self
    }
}

/// Builds one choice entry.
pub struct EntryBuilder<'a> {
    ctx: &'a mut CompileContext,
    entry: ChoiceEntry,
}

impl EntryBuilder<'_> {
    /// Plain choice text.
    pub fn label(&mut self, text: &str) -> &mut Self {
        self.entry.text = Rc::new(vec![ContentObject::Text(text.to_string())]);
        self
    }

    /// Choice text split into shared, choice-only and output-only parts,
    /// as in `shared [choice only] output only`.
    pub fn mixed(&mut self, shared: &str, choice_only: &str, output_only: &str) -> &mut Self {
        self.entry.text = Rc::new(vec![
            ContentObject::Text(shared.to_string()),
            ContentObject::ChoiceTextMix(MixMarker::Start),
            ContentObject::Text(choice_only.to_string()),
            ContentObject::ChoiceTextMix(MixMarker::End),
            ContentObject::Text(output_only.to_string()),
        ]);
        self
    }

    /// Choice text built from arbitrary content.
    pub fn text(&mut self, build: impl FnOnce(&mut ContentBuilder<'_>)) -> &mut Self {
        self.entry.text = self.ctx.content(build);
        self
    }

    /// Content run when the entry is chosen.
    pub fn result(&mut self, build: impl FnOnce(&mut ContentBuilder<'_>)) -> &mut Self {
        self.entry.result = self.ctx.content(build);
        self
    }

    /// A guard; all guards must hold.
    pub fn condition(&mut self, source: &str) -> &mut Self {
        if let Some(condition) = self.ctx.parse(source) {
            self.entry.conditions.push(condition);
        }
        self
    }

    /// Allow the entry to be chosen more than once.
    pub fn sticky(&mut self) -> &mut Self {
        self.entry.sticky = true;
        self
    }

    /// Mark the entry as a fallback.
    pub fn fallback(&mut self) -> &mut Self {
        self.entry.fallback = true;
        self
    }

    /// Do not echo the choice text.
    pub fn immediately_continue(&mut self) -> &mut Self {
        self.entry.immediately_continue = true;
        self
    }
}

/// Builds the branches of a conditional or switch.
pub struct ConditionalBuilder<'a> {
    ctx: &'a mut CompileContext,
    branches: Vec<Branch>,
    otherwise: Option<Content>,
}

impl ConditionalBuilder<'_> {
    /// A branch guarded by `condition` (or matching a switch case value).
    pub fn when(&mut self, condition: &str, build: impl FnOnce(&mut ContentBuilder<'_>)) -> &mut Self {
        let content = self.ctx.content(build);
        if let Some(condition) = self.ctx.parse(condition) {
            self.branches.push(Branch { condition, content });
        }
        self
    }

    /// The else branch.
    pub fn otherwise(&mut self, build: impl FnOnce(&mut ContentBuilder<'_>)) -> &mut Self {
        self.otherwise = Some(self.ctx.content(build));
        self
    }
}

/// Builds the groups of a sequence.
pub struct SequenceBuilder<'a> {
    ctx: &'a mut CompileContext,
    groups: Vec<Content>,
}

impl SequenceBuilder<'_> {
    /// One alternative.
    pub fn group(&mut self, build: impl FnOnce(&mut ContentBuilder<'_>)) -> &mut Self {
        let group = self.ctx.content(build);
        self.groups.push(group);
        self
    }

    /// An alternative consisting of a single piece of text.
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.groups
            .push(Rc::new(vec![ContentObject::Text(text.to_string())]));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_nested_content() {
        let mut ctx = CompileContext::new();
        ctx.knot("a", |k| {
            k.choice(|c| {
                c.option("x", |r| {
                    r.sequence(SequenceKind::Cycle, |s| {
                        s.text("1").text("2");
                    });
                });
            });
            k.gather("after");
            k.stitch("s");
        });
        let content = ctx.finish().unwrap();
        let knot = &content.knots()[0];
        let mut ids = vec![knot.uuid, knot.gather_points[0].uuid, knot.stitches[0].uuid];
        crate::content::walk(&knot.objects, &mut |object| match object {
            ContentObject::Choice(c) => ids.push(c.id),
            ContentObject::Sequence(s) => ids.push(s.id),
            _ => {}
        });
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert_eq!(count, 5);
    }

    #[test]
    fn gather_indexes_the_preceding_choice() {
        let mut ctx = CompileContext::new();
        ctx.knot("a", |k| {
            k.line("Before.");
            k.choice(|c| {
                c.option("x", |_| {});
            });
            k.gather("join");
            k.line("After.");
        });
        let content = ctx.finish().unwrap();
        let gather = &content.knots()[0].gather_points[0];
        assert_eq!(gather.choice_index, 2);
        assert_eq!(gather.start(), 3);
    }

    #[test]
    fn gather_without_choice_is_reported() {
        let mut ctx = CompileContext::new();
        ctx.knot("a", |k| {
            k.line("No choice here.");
            k.gather("oops");
        });
        assert!(matches!(
            ctx.finish(),
            Err(StoryError::Structure(StructureError::InvalidGather { .. }))
        ));
    }

    #[test]
    fn bad_expression_is_reported() {
        let mut ctx = CompileContext::new();
        ctx.knot("a", |k| {
            k.logic("x = (1 +");
        });
        assert!(matches!(ctx.finish(), Err(StoryError::Expression(_))));
    }

    #[test]
    fn stitch_gathers_belong_to_the_stitch() {
        let mut ctx = CompileContext::new();
        ctx.knot("a", |k| {
            k.stitch("inner");
            k.choice(|c| {
                c.option("x", |_| {});
            });
            k.gather("g");
        });
        let content = ctx.finish().unwrap();
        let knot = &content.knots()[0];
        assert!(knot.gather_points.is_empty());
        assert_eq!(knot.stitches[0].gather_points.len(), 1);
    }
}
