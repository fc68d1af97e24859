//! Crate-wide error taxonomy.
//!
//! Every stage of the pipeline (parse, intern, normalize, translate,
//! execute) raises at the earliest point a problem is detectable and
//! nothing is retried automatically. Store errors carry the offending
//! file path and the underlying engine message verbatim.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QuiverError>;

/// Structured errors surfaced by the query engine.
#[derive(Debug, Error)]
pub enum QuiverError {
    /// The query or index-spec text did not match the grammar. Reports the
    /// furthest position the parser reached.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// 1-based line of the furthest token reached.
        line: usize,
        /// 1-based column of the furthest token reached.
        column: usize,
        /// What the parser expected or rejected.
        message: String,
    },
    /// A pattern construct the engine permanently refuses to support
    /// (multiple labels, undirected arrows, ambiguous graph handles).
    #[error("unsupported pattern: {0}")]
    UnsupportedPattern(String),
    /// Function registry lookup miss.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    /// File-level or SQL-engine-level store failure.
    #[error("store error on '{path}': {message}")]
    StoreIo {
        /// File or database path involved in the failure.
        path: String,
        /// Underlying engine or filesystem message, verbatim.
        message: String,
    },
    /// Illegal configuration, e.g. an unqualified destructive index mode.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An internal invariant was violated; indicates a bug, not bad input.
    #[error("internal error: {0}")]
    Internal(String),
    /// Filesystem failure outside the store's system tables.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Error surfaced by the backing SQL engine.
    #[error("SQL engine error: {0}")]
    Sql(#[from] rusqlite::Error),
    /// Malformed tabular input encountered during import.
    #[error("tabular input error: {0}")]
    Tabular(#[from] csv::Error),
}

impl QuiverError {
    /// Builds a [`QuiverError::Syntax`] at the given position.
    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        QuiverError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    /// Builds a [`QuiverError::StoreIo`] for the given path.
    pub fn store_io(path: impl Into<String>, message: impl Into<String>) -> Self {
        QuiverError::StoreIo {
            path: path.into(),
            message: message.into(),
        }
    }
}
