//! Expression engine for the Plume narrative runtime.
//!
//! Source text goes through three stages: [`lexer::tokenize`] produces a
//! flat token list, [`shunting::to_postfix`] reorders it into postfix
//! indices, and [`eval::evaluate`] runs the postfix sequence as a stack
//! machine against an [`EvalHost`]. [`Expression`] bundles all three.
//! Variables live in a [`VariableStore`] owned by the host.

/// Functions built into the runtime.
pub mod builtins;
/// Error types for expression handling.
pub mod error;
/// The postfix stack machine.
pub mod eval;
/// Parsed, reusable expressions.
pub mod expression;
/// The environment an expression is evaluated in.
pub mod host;
/// Tokenizer and identifier classification.
pub mod lexer;
/// Infix to postfix reordering.
pub mod shunting;
/// Expression tokens.
pub mod token;
/// Variable storage with scopes, redirects and observers.
pub mod variables;

pub use builtins::Builtin;
pub use error::{ExprError, ExprResult};
pub use eval::Evaluation;
pub use expression::Expression;
pub use host::{Argument, EvalHost, ExternalFn, Sandbox};
pub use lexer::{NoSymbols, SymbolTable};
pub use token::{FetchKind, Fixity, FunctionRef, Keyword, Operator, Punct, Token};
pub use variables::{Observer, Scope, VariableStore};
