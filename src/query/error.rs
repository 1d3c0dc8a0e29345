//! Query error types
//!
//! Defines all error conditions that can occur while lexing, parsing or
//! analysing a query.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Location of a token in the query text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    /// Byte offset from the start of the input
    pub offset: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number, counted in characters
    pub column: usize,
}

impl Position {
    /// Compute the position of `offset` within `input`
    ///
    /// Offsets past the end or inside a multi-byte character are moved back
    /// to the previous character boundary.
    pub fn locate(input: &str, offset: usize) -> Self {
        let mut offset = offset.min(input.len());
        while !input.is_char_boundary(offset) {
            offset -= 1;
        }
        let prefix = &input[..offset];
        let line = prefix.matches('\n').count() + 1;
        let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = prefix[line_start..].chars().count() + 1;
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Errors that can occur during query operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The query text could not be split into tokens
    #[error("Lex error at {position}: {message}")]
    Lex { message: String, position: Position },

    /// The token sequence does not match the grammar
    #[error("Syntax error at {position}: {message}")]
    Syntax { message: String, position: Position },

    /// The query parsed but its meaning is invalid (mostly time predicates)
    #[error("Semantic error: {0}")]
    Semantic(String),

    /// Input exceeds the configured size limit
    #[error("Query too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

impl QueryError {
    pub(crate) fn lex(message: impl Into<String>, position: Position) -> Self {
        Self::Lex {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn syntax(message: impl Into<String>, position: Position) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic(message.into())
    }

    /// Position in the input, when the error is tied to one
    pub fn position(&self) -> Option<Position> {
        match self {
            Self::Lex { position, .. } | Self::Syntax { position, .. } => Some(*position),
            Self::Semantic(_) | Self::TooLarge { .. } => None,
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
