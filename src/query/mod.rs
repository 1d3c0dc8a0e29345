//! Chronicle Query Language
//!
//! Front end for time-series queries:
//!
//! - **Lexer**: split query text into tokens
//! - **Parser**: build the [`Query`] AST from tokens
//! - **Time range**: derive the scan range from `time` predicates and
//!   strip them from the WHERE clause
//! - **Columns**: collect the columns each table must project
//!
//! Parsing only checks syntax. Time predicates are interpreted by the
//! accessors, which report semantic errors and read the clock on every call.
//!
//! # Query Language
//!
//! ```text
//! SELECT expr [AS alias] [, ...] FROM table [, ...]
//! [WHERE condition]
//! [GROUP BY expr [, ...]]
//! [ORDER [BY time] ASC|DESC]
//! [LIMIT n]
//! ```
//!
//! # Examples
//!
//! ```rust
//! use chronicle_ql::query::parse_query;
//!
//! let query = parse_query(
//!     "select value from cpu where time > now() - 1d and (value > 90 or value < 10);",
//! )?;
//!
//! let range = query.time_range()?;
//! assert!(range.start < range.end);
//!
//! let residual = query.where_condition()?.expect("value filter remains");
//! assert_eq!(residual.to_string(), "value > 90 or value < 10");
//!
//! let columns = query.referenced_columns();
//! assert!(columns["cpu"].contains("value"));
//! # Ok::<(), chronicle_ql::query::QueryError>(())
//! ```

mod ast;
mod columns;
mod error;
mod lexer;
mod parser;
mod time_range;

pub use ast::{
    ArithOp, ColumnRef, Condition, Connective, DurationLiteral, DurationUnit, Expression,
    FunctionCall, Literal, Operator, Query, SelectItem, SortOrder, TIME_COLUMN,
};
pub use columns::{ColumnMap, ALL_COLUMNS};
pub use error::{Position, QueryError, QueryResult};
pub use lexer::{tokenize, Keyword, Punct, Symbol, Token, TokenKind};
pub use parser::{
    parse, parse_query, parse_query_with, ParserOptions, DEFAULT_MAX_QUERY_BYTES,
    MAX_EXPRESSION_DEPTH, MAX_NESTING_DEPTH,
};
pub use time_range::{BoundSide, QueryTimeRange, TimeBound, TimeBounds};
