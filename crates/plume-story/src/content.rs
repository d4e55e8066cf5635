//! The compiled content tree: the objects a knot is made of.
//!
//! Content is produced by a compiler (or [`crate::builder`]) and never
//! mutated by the runtime. Nested content is reference counted so the
//! runtime can hold cursors into it while it mutates story state.

use std::rc::Rc;

use plume_core::Uuid;
use plume_expr::Expression;
use serde::{Deserialize, Serialize};

/// An ordered, shared run of content objects.
pub type Content = Rc<Vec<ContentObject>>;

/// Divert target that ends the whole story.
pub const END: &str = "END";

/// Divert target that ends the current flow.
pub const DONE: &str = "DONE";

/// One executable piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentObject {
    /// Literal text.
    Text(String),
    /// End of a source line.
    LineBreak,
    /// Suppresses the next line break.
    Glue,
    /// A jump, tunnel, tunnel return or thread.
    Divert(Divert),
    /// A block of choice entries.
    Choice(Choice),
    /// Region marker inside choice text.
    ChoiceTextMix(MixMarker),
    /// A tag attached to the current line.
    Tag(String),
    /// An expression whose value is printed.
    Interpolation(Expression),
    /// If/else or switch.
    Conditional(Conditional),
    /// Alternatives picked by a cursor.
    Sequence(Sequence),
    /// A global variable or constant declaration.
    GlobalVariable(GlobalVariable),
    /// An expression run for its side effects.
    Logic(Expression),
    /// A list definition and its initially selected items.
    ListDeclaration(ListDeclaration),
}

/// How a divert transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivertKind {
    /// `-> target`: replace the current location.
    Goto,
    /// `-> target ->`: call and come back.
    Tunnel,
    /// `->->`, optionally followed by a target.
    TunnelReturn,
    /// `<- target`: run a side flow and gather its choices.
    Thread,
}

/// A control transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divert {
    /// How control moves.
    pub kind: DivertKind,
    /// Dotted path, `END` or `DONE`. Only a tunnel return may omit it.
    pub target: Option<String>,
    /// Arguments bound to the target knot's parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Expression>,
}

impl Divert {
    /// A plain divert to `target`.
    pub fn goto(target: impl Into<String>) -> Self {
        Self {
            kind: DivertKind::Goto,
            target: Some(target.into()),
            args: Vec::new(),
        }
    }

    /// A divert of `kind` to `target`.
    pub fn new(kind: DivertKind, target: Option<String>) -> Self {
        Self {
            kind,
            target,
            args: Vec::new(),
        }
    }

    /// Attach arguments.
    pub fn with_args(mut self, args: Vec<Expression>) -> Self {
        self.args = args;
        self
    }
}

/// A choice block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Identity used to remember which entries were taken.
    pub id: Uuid,
    /// Entries in presentation order.
    pub entries: Vec<ChoiceEntry>,
}

/// One option in a choice block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceEntry {
    /// Text shown to the player and echoed on selection.
    pub text: Content,
    /// Content run after the entry is chosen.
    pub result: Content,
    /// Sticky entries may be chosen again.
    #[serde(default)]
    pub sticky: bool,
    /// All must be true for the entry to be offered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Expression>,
    /// Never shown; taken automatically when nothing else is on offer.
    #[serde(default)]
    pub fallback: bool,
    /// Skip echoing the choice text.
    #[serde(default)]
    pub immediately_continue: bool,
}

impl ChoiceEntry {
    /// An entry with the given text and result and default flags.
    pub fn new(text: Content, result: Content) -> Self {
        Self {
            text,
            result,
            sticky: false,
            conditions: Vec::new(),
            fallback: false,
            immediately_continue: false,
        }
    }
}

/// Choice text regions: before `Start` is shared, between `Start` and
/// `End` appears only in the listing, after `End` only in the echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixMarker {
    /// Opens the choice-only region.
    Start,
    /// Opens the output-only region.
    End,
}

/// Conditional content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditional {
    /// With a switch, each branch condition is compared for equality
    /// against it instead of being tested for truth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch: Option<Expression>,
    /// Branches tried in order.
    pub branches: Vec<Branch>,
    /// Runs when no branch matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Content>,
}

/// One arm of a conditional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Guard, or switch case value.
    pub condition: Expression,
    /// Content run when the branch is taken.
    pub content: Content,
}

/// How a sequence picks its next group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    /// In order, then stay on the last group.
    Sequence,
    /// In order, wrapping around.
    Cycle,
    /// In order, then nothing.
    OnceOnly,
    /// Random order, reshuffled after every group was seen.
    Shuffle,
    /// Random order, then nothing.
    ShuffleOnce,
    /// Random order over all but the last group, then the last forever.
    ShuffleStop,
}

/// Alternatives selected per visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Identity of the sequence's cursor in story state.
    pub id: Uuid,
    /// Selection strategy.
    pub kind: SequenceKind,
    /// Alternatives.
    pub groups: Vec<Content>,
}

/// A global declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    /// Variable name.
    pub name: String,
    /// Initial value.
    pub init: Expression,
    /// Constants may never be assigned.
    #[serde(default)]
    pub constant: bool,
}

/// A list definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListDeclaration {
    /// Definition name, also the name of the global holding the selection.
    pub name: String,
    /// Items in declaration order.
    pub entries: Vec<ListEntry>,
}

/// One item of a list declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    /// Item label.
    pub label: String,
    /// Item value.
    pub value: i64,
    /// Whether the item starts selected in the global.
    #[serde(default)]
    pub selected: bool,
}

/// Walk `content` and everything nested in it, depth first.
pub fn walk(content: &[ContentObject], visit: &mut dyn FnMut(&ContentObject)) {
    for object in content {
        visit(object);
        match object {
            ContentObject::Choice(choice) => {
                for entry in &choice.entries {
                    walk(&entry.text, visit);
                    walk(&entry.result, visit);
                }
            }
            ContentObject::Conditional(conditional) => {
                for branch in &conditional.branches {
                    walk(&branch.content, visit);
                }
                if let Some(otherwise) = &conditional.otherwise {
                    walk(otherwise, visit);
                }
            }
            ContentObject::Sequence(sequence) => {
                for group in &sequence.groups {
                    walk(group, visit);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_expr::NoSymbols;

    fn expr(source: &str) -> Expression {
        Expression::parse(source, &NoSymbols).unwrap()
    }

    #[test]
    fn walk_reaches_nested_objects() {
        let inner = Rc::new(vec![ContentObject::Text("deep".into())]);
        let content = vec![
            ContentObject::Conditional(Conditional {
                switch: None,
                branches: vec![Branch {
                    condition: expr("true"),
                    content: inner,
                }],
                otherwise: Some(Rc::new(vec![ContentObject::Glue])),
            }),
            ContentObject::LineBreak,
        ];
        let mut seen = 0;
        walk(&content, &mut |_| seen += 1);
        assert_eq!(seen, 4);
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let object = ContentObject::Divert(Divert::goto("END"));
        let json = serde_json::to_string(&object).unwrap();
        assert_eq!(json, r#"{"divert":{"kind":"goto","target":"END"}}"#);

        let back: ContentObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, object);
        assert_eq!(
            serde_json::to_string(&ContentObject::LineBreak).unwrap(),
            r#""line_break""#
        );
    }
}
