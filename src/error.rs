//! Error types shared by the tokenizer, graph builder, and compiler.
//!
//! Malformed query text never panics and never aborts with an `Err`: every problem is
//! recorded as a positioned [`QueryError`] in the query's error list. [`EngineError`]
//! covers misuse of the registration API.

use crate::ast::QueryToken;

/// Classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum QueryErrorKind {
    /// No lexeme could be recognized at a position. Fatal for the parse.
    #[error("lexical error")]
    Lex,

    /// Missing combinator operand, unbalanced group, malformed filter block.
    /// Fatal for the parse.
    #[error("syntax error")]
    Syntax,

    /// Unknown filter, missing handler, failed coercion and friends. Node-local.
    #[error("semantic error")]
    Semantic,

    /// A graph invariant did not hold (e.g. a node missing from its recorded parent).
    #[error("internal error")]
    Internal,
}

/// A positioned error in a query string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {index}: {reason}")]
pub struct QueryError {
    /// Byte offset of the offending text.
    pub index: usize,
    /// Byte length of the offending text.
    pub length: usize,
    pub reason: String,
    pub kind: QueryErrorKind,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, index: usize, length: usize, reason: impl Into<String>) -> Self {
        QueryError {
            index,
            length,
            reason: reason.into(),
            kind,
        }
    }

    pub fn lex(index: usize, length: usize, reason: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Lex, index, length, reason)
    }

    pub fn syntax(index: usize, length: usize, reason: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Syntax, index, length, reason)
    }

    pub fn semantic(index: usize, length: usize, reason: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Semantic, index, length, reason)
    }

    pub fn internal(index: usize, length: usize, reason: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Internal, index, length, reason)
    }

    /// Semantic error located at `token`.
    pub fn semantic_at(token: &QueryToken, reason: impl Into<String>) -> Self {
        Self::semantic(token.position, token.length, reason)
    }

    /// Syntax error located at `token`.
    pub fn syntax_at(token: &QueryToken, reason: impl Into<String>) -> Self {
        Self::syntax(token.position, token.length, reason)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, QueryErrorKind::Lex | QueryErrorKind::Syntax)
    }
}

/// Errors returned by the registration API of [`crate::QueryEngine`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A handler was added to an operator that was never registered.
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    /// Operator tokens must be non-empty and free of whitespace, letters, digits,
    /// quotes, parentheses and braces.
    #[error("invalid operator token '{0}'")]
    InvalidOperatorToken(String),

    /// A regular-expression filter token failed to compile.
    #[error("invalid filter pattern: {0}")]
    InvalidFilterPattern(#[from] regex::Error),
}
