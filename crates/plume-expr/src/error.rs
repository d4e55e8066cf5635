//! Error types for expression handling.

use plume_core::{ValueError, ValueKind};
use thiserror::Error;

/// Result type for expression operations.
pub type ExprResult<T> = Result<T, ExprError>;

/// Errors raised while tokenizing, reordering or evaluating an expression.
///
/// Every variant indicates inconsistent input from whoever built the
/// expression; none of them is a routine runtime condition.
#[derive(Debug, Error)]
pub enum ExprError {
    /// The tokenizer met a character it does not understand.
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedCharacter {
        /// Byte offset in the source.
        offset: usize,
        /// The offending text.
        found: String,
    },

    /// A numeric literal is out of range.
    #[error("invalid number literal: {0}")]
    InvalidNumber(String),

    /// `->` not followed by a section name.
    #[error("expected a section name after `->` at offset {0}")]
    ExpectedPath(usize),

    /// A `)` with no matching `(`.
    #[error("unmatched `)` at token {0}")]
    UnmatchedParen(usize),

    /// A `(` that is never closed.
    #[error("unclosed `(`")]
    UnclosedParen,

    /// A `,` outside a function call.
    #[error("misplaced `,` at token {0}")]
    MisplacedComma(usize),

    /// The expression has no tokens.
    #[error("empty expression")]
    Empty,

    /// No builtin, external, story or list function has this name.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A function was called with the wrong number of arguments.
    #[error("{function} expects {expected} argument(s), got {found}")]
    WrongArity {
        /// The function name.
        function: String,
        /// Declared argument count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },

    /// A function received an argument it cannot use.
    #[error("invalid argument to {function}: {message}")]
    InvalidArgument {
        /// The function name.
        function: String,
        /// What was wrong.
        message: String,
    },

    /// A binary operator has no defined result for these operand kinds.
    #[error("operator `{op}` cannot be applied to {lhs} and {rhs}")]
    TypeMismatch {
        /// Operator spelling.
        op: &'static str,
        /// Left operand kind.
        lhs: ValueKind,
        /// Right operand kind.
        rhs: ValueKind,
    },

    /// A unary operator has no defined result for this operand kind.
    #[error("operator `{op}` cannot be applied to {operand}")]
    UnaryTypeMismatch {
        /// Operator spelling.
        op: &'static str,
        /// Operand kind.
        operand: ValueKind,
    },

    /// A variable used as an operand has no value.
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    /// An operator needed a value but its operand produced none.
    #[error("operator `{0}` is missing an operand value")]
    MissingValue(&'static str),

    /// The left side of an assignment is not a variable.
    #[error("assignment target is not a variable")]
    AssignToNonVariable,

    /// Assignment to a constant.
    #[error("cannot assign to constant: {0}")]
    AssignToConstant(String),

    /// An operator or function popped more operands than were pushed.
    #[error("operand stack exhausted")]
    StackUnderflow,

    /// A value-level operation failed.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// An error raised by the host while evaluation was suspended inside it.
    #[error(transparent)]
    Host(Box<dyn std::error::Error + Send + Sync>),
}
