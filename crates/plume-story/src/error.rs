//! Error types for the story runtime.

use plume_expr::ExprError;
use thiserror::Error;

/// Result type for story operations.
pub type StoryResult<T> = Result<T, StoryError>;

/// Errors raised while loading or running a story.
#[derive(Debug, Error)]
pub enum StoryError {
    /// An expression failed to parse or evaluate.
    #[error("expression error: {0}")]
    Expression(ExprError),

    /// Control flow could not go where the content asked.
    #[error("navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// The content tree is inconsistent.
    #[error("structure error: {0}")]
    Structure(#[from] StructureError),

    /// `choose` was called with an index that is not on offer.
    #[error("invalid choice {index}: {available} choice(s) available")]
    InvalidChoice {
        /// The requested index.
        index: usize,
        /// Number of choices on offer.
        available: usize,
    },

    /// `continue_line` was called while the story cannot continue.
    #[error("the story cannot continue")]
    CannotContinue,

    /// A single call ran more steps than the configured limit.
    #[error("step limit of {0} exceeded")]
    StepLimitExceeded(usize),

    /// The host referred to a global variable that was never declared.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// A binary story could not be read or written.
    #[error("story format error: {0}")]
    Format(#[from] FormatError),

    /// A JSON story could not be read or written.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ExprError> for StoryError {
    /// Story errors raised while the evaluator was suspended inside a story
    /// function come back out unchanged.
    fn from(err: ExprError) -> Self {
        match err {
            ExprError::Host(inner) => match inner.downcast::<StoryError>() {
                Ok(story) => *story,
                Err(other) => StoryError::Expression(ExprError::Host(other)),
            },
            other => StoryError::Expression(other),
        }
    }
}

impl From<StoryError> for ExprError {
    fn from(err: StoryError) -> Self {
        match err {
            StoryError::Expression(inner) => inner,
            other => ExprError::Host(Box::new(other)),
        }
    }
}

/// Failures to move through the story graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavigationError {
    /// A path does not name any knot, stitch or gather.
    #[error("unknown divert target: {0}")]
    UnknownTarget(String),

    /// `->->` executed outside a tunnel.
    #[error("tunnel return outside a tunnel")]
    TunnelReturnWithoutTunnel,

    /// A frame was popped with none left.
    #[error("frame stack is empty")]
    EmptyFrameStack,

    /// Functions may not divert, open tunnels or spawn threads.
    #[error("divert to {0} inside a function")]
    DivertInFunction(String),
}

/// Inconsistencies in the compiled content tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructureError {
    /// Two knots share a name.
    #[error("duplicate knot: {0}")]
    DuplicateKnot(String),

    /// The story has no knot to start at.
    #[error("no entry point: the story has no non-function knot")]
    NoEntryPoint,

    /// A path with more than three segments.
    #[error("path has too many segments: {0}")]
    PathTooDeep(String),

    /// A knot called as a function is not marked as one.
    #[error("{0} is not a function")]
    NotAFunction(String),

    /// A divert or call supplied the wrong number of arguments.
    #[error("{target} expects {expected} argument(s), got {found}")]
    ArgumentCount {
        /// The knot being entered.
        target: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },

    /// A reference parameter was given something other than a variable.
    #[error("parameter {parameter} of {target} must be passed a variable")]
    ByRefArgument {
        /// The knot being entered.
        target: String,
        /// The parameter name.
        parameter: String,
    },

    /// `return` outside a function.
    #[error("return outside a function")]
    ReturnOutsideFunction,

    /// A choice inside a function body.
    #[error("choice inside function {0}")]
    ChoiceInFunction(String),

    /// A stitch offset lies outside its knot or out of order.
    #[error("stitch {stitch} of {knot} has an invalid offset")]
    InvalidStitchOffset {
        /// The knot.
        knot: String,
        /// The stitch.
        stitch: String,
    },

    /// A gather point does not follow a choice.
    #[error("gather {gather} of {knot} does not follow a choice")]
    InvalidGather {
        /// The knot.
        knot: String,
        /// The gather.
        gather: String,
    },
}

/// Failures reading or writing the binary story format.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The data does not start with `INKB`.
    #[error("bad magic number")]
    BadMagic,

    /// The format version is not understood.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    /// The data ended in the middle of a record.
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// An enum tag byte has no meaning.
    #[error("invalid {what} tag: {tag}")]
    InvalidTag {
        /// What was being decoded.
        what: &'static str,
        /// The tag byte.
        tag: u8,
    },

    /// A string is not valid UTF-8.
    #[error("invalid utf-8 in string")]
    InvalidUtf8,

    /// A uuid varint ran past five bytes or overflowed 32 bits.
    #[error("uuid varint overflow")]
    UuidOverflow,

    /// A string is longer than a `u16` length prefix allows.
    #[error("string of {0} bytes is too long")]
    StringTooLong(usize),

    /// A collection is longer than its count prefix allows.
    #[error("collection of {0} items is too long")]
    CountTooLarge(usize),

    /// A stored expression failed to re-tokenize.
    #[error("invalid expression {source_text:?}: {error}")]
    Expression {
        /// The stored source text.
        source_text: String,
        /// Why it failed.
        error: ExprError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_errors_unwrap_to_story_errors() {
        let original = StoryError::Navigation(NavigationError::TunnelReturnWithoutTunnel);
        let expr: ExprError = original.into();
        assert!(matches!(expr, ExprError::Host(_)));

        let back = StoryError::from(expr);
        assert!(matches!(
            back,
            StoryError::Navigation(NavigationError::TunnelReturnWithoutTunnel)
        ));
    }

    #[test]
    fn expression_errors_pass_through() {
        let err = StoryError::from(ExprError::StackUnderflow);
        assert!(matches!(err, StoryError::Expression(ExprError::StackUnderflow)));
        let expr = ExprError::from(err);
        assert!(matches!(expr, ExprError::StackUnderflow));
    }
}
