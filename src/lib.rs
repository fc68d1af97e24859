//! Quiver: a graph-pattern query engine over tabular edge files.
//!
//! Tab-separated edge lists import into a SQL-backed graph cache;
//! Cypher-flavored match queries translate into SQL over the imported
//! tables and execute through cached prepared plans.

#![forbid(unsafe_code)]

/// Translate-once, execute-many query API with result caching.
pub mod api;

/// Crate-wide error taxonomy.
pub mod error;

/// Query function registry and vector similarity functions.
pub mod function;

/// Index specifications and table index descriptions.
pub mod index;

/// Query front end: lexer, parser, interning, normalization.
pub mod query;

/// The SQL-backed graph store and vector storage.
pub mod store;

/// Query-to-SQL translation.
pub mod translate;

pub use api::GraphQuery;
pub use error::{QuiverError, Result};
pub use index::TableIndex;
pub use store::{SqlStore, Value};
pub use translate::{translate_query, TranslatedQuery};
