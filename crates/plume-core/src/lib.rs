//! Core value types for the Plume narrative runtime.
//!
//! This crate defines the dynamic value model that story logic computes with:
//! the tagged [`Value`], the set-valued [`List`] and the registry of
//! [`ListDefinition`]s that give list items their meaning. It has no notion of
//! expressions or story flow; those live in `plume-expr` and `plume-story`.

/// Error types used throughout the crate.
pub mod error;
/// Set-valued lists, list items, and list definitions.
pub mod list;
/// Stable compile-time identifiers for weave content.
pub mod uuid;
/// The dynamic tagged value and its operator algebra.
pub mod value;

/// Re-export error types.
pub use error::{ValueError, ValueResult};
/// Re-export list types.
pub use list::{DefinitionId, List, ListDefinition, ListDefinitions, ListItem};
/// Re-export identifier types.
pub use uuid::{Uuid, UuidGenerator};
/// Re-export value types.
pub use value::{BinaryOp, UnaryOp, Value, ValueKind};
