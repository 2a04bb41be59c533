//! SQL statement builders for sqlbridge.
//!
//! `sqlbridge-query` turns registered model metadata and a record into
//! dialect-specific SQL with bound parameters. It never talks to a
//! connection; the facade crate executes what is built here.
//!
//! # Role In The Architecture
//!
//! - **Write builders**: `InsertBuilder`, `UpdateBuilder` (full or
//!   baseline-diff) and `DeleteBuilder` produce a `WriteSpec`.
//! - **Key lookups**: `SelectBuilder` reads a model's mapped columns by key.
//! - **Key retrieval**: `resolve_retrieval` picks RETURNING, OUTPUT or
//!   last-insert-id for built and caller-written INSERTs alike.

pub mod builder;
pub mod returning;

pub use builder::{DeleteBuilder, InsertBuilder, SelectBuilder, Statement, UpdateBuilder, WriteSpec};
pub use returning::{
    RetrievalStrategy, find_output_clause, find_returning_clause, parse_insert_table,
    resolve_retrieval,
};
