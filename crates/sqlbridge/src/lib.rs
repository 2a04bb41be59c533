//! sqlbridge: typed records over any SQL dialect.
//!
//! sqlbridge maps Rust structs onto table rows and back without hiding the
//! SQL. Models derive [`Model`], are registered once into an immutable
//! [`Registry`], and are then written and read through a [`Db`] handle that
//! wraps a driver [`Connection`].
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlbridge::prelude::*;
//!
//! #[derive(Model, Debug, Default)]
//! #[sqlbridge(table = "users")]
//! struct User {
//!     #[sqlbridge(primary_key, auto_increment)]
//!     id: i64,
//!     name: String,
//!     is_active: Option<bool>,
//! }
//!
//! let registry = Registry::builder().register::<User>()?.build();
//! let db = Db::new(conn, registry, DbConfig::new(Dialect::Postgres));
//!
//! let mut user = User { name: "Alice".into(), ..User::default() };
//! db.insert(&cx, &mut user).await;
//! let loaded: User = db.load(&cx, &[Value::BigInt(user.id)]).await;
//! ```
//!
//! # Crates
//!
//! - `sqlbridge-core`: values, coercion, dialects, identifiers, metadata,
//!   row deserialization, errors and log events
//! - `sqlbridge-macros`: `#[derive(Model)]`
//! - `sqlbridge-query`: statement builders and generated-key dispatch
//!
//! Generated code refers to `sqlbridge_core`, so crates deriving [`Model`]
//! list it as a dependency next to `sqlbridge`.

pub mod config;
pub mod db;

pub use config::DbConfig;
pub use db::Db;

pub use sqlbridge_core::{
    AutoTimestamp, Connection, Cx, Dialect, DialectCapabilities, Error, FieldInfo, FromValue,
    Json, Kind, LogPolicy, LogScope, Model, ModelMetadata, Outcome, QueryError, QueryErrorKind,
    QueryEvent, QueryLogger, REDACTED, Registry, RegistryBuilder, Result, Row, ToValue, Tracked,
    TracingLogger, TypeMismatch, Value, coerce, quote_identifier, try_quote_identifier,
    validate_identifier,
};
pub use sqlbridge_macros::Model;
pub use sqlbridge_query::{
    DeleteBuilder, InsertBuilder, RetrievalStrategy, SelectBuilder, Statement, UpdateBuilder,
    WriteSpec, resolve_retrieval,
};

/// The usual imports.
pub mod prelude {
    pub use crate::{
        Connection, Cx, Db, DbConfig, Dialect, Error, FromValue, Json, LogScope, Model,
        Outcome, QueryEvent, QueryLogger, Registry, Result, Row, ToValue, Tracked, Value,
    };
}
