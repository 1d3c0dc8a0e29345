//! # Chronicle Query Language
//!
//! Query-language front end for the Chronicle time-series store. Turns
//! SQL-like query text into an AST and answers the questions the storage
//! engine asks before a scan:
//!
//! - which time range to read (`time > now() - 1d and time < now() - 1h`)
//! - which predicate is left to filter on once the time bounds are removed
//! - which columns each table must project
//!
//! ## Modules
//!
//! - [`query`]: lexer, parser and semantic passes
//! - [`config`]: TOML/environment configuration for the CLI
//!
//! ## Quick Start
//!
//! ```rust
//! use chronicle_ql::parse_query;
//!
//! let query = parse_query("select value1, sum(value2) from t where value > 90.0 group by value3;")?;
//! let columns = query.referenced_columns();
//! assert_eq!(columns["t"].len(), 4);
//! # Ok::<(), chronicle_ql::QueryError>(())
//! ```

pub mod config;
pub mod query;

// Re-export top-level types for convenience
pub use query::{
    parse_query, parse_query_with, ColumnMap, Condition, Expression, ParserOptions, Query,
    QueryError, QueryResult, QueryTimeRange,
};

pub use config::{Config, ConfigError, LoggingConfig, OutputConfig, ParserConfig};
