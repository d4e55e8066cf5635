use crate::list::DefinitionId;

/// Alias for `Result<T, ValueError>`.
pub type ValueResult<T> = Result<T, ValueError>;

/// Errors raised by value and list operations.
///
/// Type mismatches are not errors at this level: operators without a defined
/// result for a pair of kinds return `None` and the caller decides.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivideByZero,

    /// A list item refers to a definition that was never registered.
    #[error("unknown list definition: {0}")]
    UnknownDefinition(DefinitionId),

    /// A list definition with the given name was never registered.
    #[error("unknown list: \"{0}\"")]
    UnknownList(String),

    /// A label does not belong to the named definition.
    #[error("list \"{list}\" has no item \"{label}\"")]
    UnknownItem {
        /// The definition name.
        list: String,
        /// The missing label.
        label: String,
    },

    /// A list item carries a value its definition does not assign to it.
    #[error("item \"{label}\" of {origin} has value {found}, expected {expected}")]
    ItemValueMismatch {
        /// The definition the item claims.
        origin: DefinitionId,
        /// The item label.
        label: String,
        /// The value the definition registers.
        expected: i64,
        /// The value the item carried.
        found: i64,
    },

    /// A list definition name was registered twice.
    #[error("list already defined: \"{0}\"")]
    DuplicateList(String),
}
