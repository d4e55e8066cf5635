//! Story runtime for the Plume narrative engine.
//!
//! A story is a table of knots ([`StoryContent`]) built by a compiler, by
//! [`CompileContext`], or loaded from JSON or the [`binary`] format. A
//! [`Story`] runs it: it produces lines of text one at a time, stops at
//! choices, and resumes when one is chosen.
//!
//! ```
//! use plume_story::{CompileContext, Story, StoryConfig};
//!
//! let mut ctx = CompileContext::new();
//! ctx.knot("start", |k| {
//!     k.global("coins", "3")
//!         .text("You have ")
//!         .interpolate("coins")
//!         .text(" coins.")
//!         .line_break()
//!         .end();
//! });
//! let mut story = Story::new(ctx.finish().unwrap(), StoryConfig::default()).unwrap();
//! assert_eq!(story.continue_maximally().unwrap(), "You have 3 coins.");
//! assert!(story.is_finished());
//! ```

/// The `INKB` binary story format.
pub mod binary;
/// Programmatic construction of content trees.
pub mod builder;
/// Runtime configuration.
pub mod config;
/// Content objects.
pub mod content;
/// Error types for story loading and execution.
pub mod error;
mod execute;
/// Call frames and content cursors.
pub mod frame;
mod host;
/// Line assembly.
pub mod output;
/// Mutable story state.
pub mod state;
/// The story facade.
pub mod story;
/// Knots, stitches, gathers and path resolution.
pub mod weave;

pub use builder::{CompileContext, ContentBuilder, KnotBuilder};
pub use config::StoryConfig;
pub use content::{Content, ContentObject, DONE, END, SequenceKind};
pub use error::{FormatError, NavigationError, StoryError, StoryResult, StructureError};
pub use frame::FrameKind;
pub use output::{Line, OutputBuffer};
pub use state::{FlowStatus, StoryState, VisitCount};
pub use story::Story;
pub use weave::{Address, KnotId, StoryContent};
