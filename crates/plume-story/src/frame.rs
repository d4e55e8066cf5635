//! Call frames: where each active flow is executing.

use plume_expr::Scope;

use crate::content::{Content, ContentObject};
use crate::weave::{KnotId, Location};

/// Why a frame was pushed, and what popping it must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The main flow. Popping it ends the flow.
    Root,
    /// A tunnel; `return_to` is the depth of the frame that resumes.
    Tunnel {
        /// Depth of the caller frame.
        return_to: usize,
    },
    /// A function call evaluated from an expression.
    Function {
        /// Depth of the caller frame.
        caller: usize,
    },
    /// A side flow whose choices merge into the current list.
    Thread {
        /// Depth of the frame that spawned the thread.
        spawned_from: usize,
    },
}

/// A position in a run of content.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Cursor {
    pub content: Content,
    pub index: usize,
    pub end: usize,
    /// Top-level cursors walk a knot's own objects and pass gathers.
    pub top_level: bool,
    /// The gather index whose arrival was already counted.
    pub counted: Option<usize>,
}

impl Cursor {
    pub fn segment(content: Content, location: &Location) -> Self {
        Self {
            end: location.end.min(content.len()),
            content,
            index: location.start,
            top_level: true,
            counted: location.gather_start,
        }
    }

    pub fn nested(content: Content) -> Self {
        Self {
            end: content.len(),
            content,
            index: 0,
            top_level: false,
            counted: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.end
    }

    pub fn peek(&self) -> Option<&ContentObject> {
        if self.is_done() {
            None
        } else {
            self.content.get(self.index)
        }
    }
}

/// One active flow: a knot and a stack of cursors into its content.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// What kind of call this is.
    pub kind: FrameKind,
    /// The knot being executed.
    pub knot: KnotId,
    pub(crate) cursors: Vec<Cursor>,
}

impl Frame {
    pub(crate) fn at(kind: FrameKind, objects: Content, location: &Location) -> Self {
        Self {
            kind,
            knot: location.knot,
            cursors: vec![Cursor::segment(objects, location)],
        }
    }

    /// Move this frame to a new location, dropping its nested cursors.
    pub(crate) fn relocate(&mut self, objects: Content, location: &Location) {
        self.knot = location.knot;
        self.cursors = vec![Cursor::segment(objects, location)];
    }

    /// Run `content` before whatever comes next in this frame.
    pub(crate) fn push_content(&mut self, content: Content) {
        if !content.is_empty() {
            self.cursors.push(Cursor::nested(content));
        }
    }

    /// The next object this frame will execute.
    pub(crate) fn peek(&self) -> Option<&ContentObject> {
        self.cursors.iter().rev().find_map(Cursor::peek)
    }

    /// Whether the frame has nothing left to execute.
    pub fn is_exhausted(&self) -> bool {
        self.cursors.iter().all(Cursor::is_done)
    }
}

/// The frames and scopes to restore when a choice made now is selected.
///
/// Each thread frame takes the place of the frame that spawned it
/// (inheriting its kind) so that choosing a thread's option continues in
/// the thread and discards the flow that was running beside it.
pub(crate) fn resume_point(frames: &[Frame], scopes: &[Scope]) -> Vec<(Frame, Scope)> {
    let mut kept: Vec<(usize, Frame, Scope)> = Vec::with_capacity(frames.len());
    for (depth, frame) in frames.iter().enumerate() {
        let scope = scopes.get(depth).cloned().unwrap_or_default();
        let mut frame = frame.clone();
        if let FrameKind::Thread { spawned_from } = frame.kind {
            if let Some(position) = kept.iter().position(|(d, _, _)| *d == spawned_from) {
                frame.kind = kept[position].1.kind;
                kept.truncate(position);
            }
        }
        kept.push((depth, frame, scope));
    }

    // Depth references are rewritten to the collapsed positions.
    kept.into_iter()
        .enumerate()
        .map(|(position, (_, mut frame, scope))| {
            frame.kind = match frame.kind {
                FrameKind::Root => FrameKind::Root,
                FrameKind::Tunnel { .. } => FrameKind::Tunnel {
                    return_to: position.saturating_sub(1),
                },
                FrameKind::Function { .. } => FrameKind::Function {
                    caller: position.saturating_sub(1),
                },
                FrameKind::Thread { .. } => FrameKind::Thread {
                    spawned_from: position.saturating_sub(1),
                },
            };
            (frame, scope)
        })
        .collect()
}
