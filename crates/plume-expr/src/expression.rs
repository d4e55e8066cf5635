//! Parsed expressions.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use plume_core::Value;

use crate::error::{ExprError, ExprResult};
use crate::eval::{Evaluation, evaluate};
use crate::host::EvalHost;
use crate::lexer::{NoSymbols, SymbolTable, tokenize};
use crate::shunting::to_postfix;
use crate::token::{Keyword, Token};

/// A tokenized and reordered expression, ready to evaluate any number of
/// times.
///
/// Serializes as its source text and is re-tokenized on load.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expression {
    source: String,
    tokens: Vec<Token>,
    postfix: Vec<usize>,
}

impl Expression {
    /// Tokenize and reorder `source`.
    pub fn parse(source: &str, symbols: &dyn SymbolTable) -> ExprResult<Self> {
        let tokens = tokenize(source, symbols)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let postfix = to_postfix(&tokens)?;
        Ok(Self {
            source: source.trim().to_string(),
            tokens,
            postfix,
        })
    }

    /// The source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Tokens in source order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Tokens in evaluation order.
    pub fn postfix(&self) -> impl Iterator<Item = &Token> {
        self.postfix.iter().map(|&i| &self.tokens[i])
    }

    /// Whether the expression declares a temporary.
    pub fn is_temp_declaration(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, Token::Keyword(Keyword::Temp)))
    }

    /// Evaluate against `host`.
    pub fn evaluate(&self, host: &mut dyn EvalHost) -> ExprResult<Evaluation> {
        trace!(expression = %self.source, "evaluating");
        evaluate(&self.tokens, &self.postfix, host)
    }

    /// Evaluate and return only the value.
    pub fn value(&self, host: &mut dyn EvalHost) -> ExprResult<Option<Value>> {
        Ok(self.evaluate(host)?.value)
    }

    /// Evaluate as a condition: a missing value is false.
    pub fn is_true(&self, host: &mut dyn EvalHost) -> ExprResult<bool> {
        Ok(self.value(host)?.is_some_and(|v| v.is_truthy()))
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({:?})", self.source)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl TryFrom<String> for Expression {
    type Error = ExprError;

    fn try_from(source: String) -> ExprResult<Self> {
        Self::parse(&source, &NoSymbols)
    }
}

impl From<Expression> for String {
    fn from(expression: Expression) -> Self {
        expression.source
    }
}
