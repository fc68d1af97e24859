//! Query front end: lexing, parsing, interning, simplification, and
//! path normalization.
//!
//! The pipeline is strictly staged: query text is tokenized and parsed
//! into a raw nested-list tree, interned into typed AST nodes backed by
//! a per-query variable table, simplified into a canonical shape, and
//! finally normalized into node-relationship-node triples that the
//! translator joins against imported graph tables.

/// Typed AST nodes and the per-query variable table.
pub mod ast;

/// Raw-tree to typed-AST interning with tag dispatch.
pub mod intern;

/// Character-level lexer producing positioned tokens.
pub mod lexer;

/// Path normalization into canonical triples.
pub mod normalize;

/// Recursive-descent parser producing the raw nested-list tree.
pub mod parser;

/// Raw nested-list parse tree.
pub mod raw;

/// Wrapper-collapsing simplification pass.
pub mod simplify;

pub use ast::{QueryContext, SingleQuery, VarId};
pub use normalize::Triple;
pub use parser::parse;

use crate::error::Result;

/// Runs the full front-end pipeline: parse, intern, simplify.
///
/// Normalization is left to the translator, which needs the triples
/// interleaved with its own clause handling.
pub fn prepare(text: &str) -> Result<SingleQuery> {
    let raw = parser::parse(text)?;
    let mut query = intern::intern_query(&raw)?;
    simplify::simplify(&mut query)?;
    Ok(query)
}
