//! Core types and traits for sqlbridge.
//!
//! `sqlbridge-core` is the **foundation layer** of the workspace. It holds
//! everything that does not depend on how SQL text is assembled.
//!
//! # Role In The Architecture
//!
//! - **Data model**: `Value` and `Row` are what drivers hand back and accept.
//! - **Coercion**: `coerce`, `FromValue` and `ToValue` turn loosely typed
//!   driver values into typed fields and back.
//! - **Dialects**: the static `DialectCapabilities` table plus identifier
//!   validation and quoting, the only path by which names reach SQL.
//! - **Model metadata**: the `Model` trait, `FieldInfo`, and the immutable
//!   `Registry` built once at start-up.
//! - **Row deserialization** into any `&mut M: Model`.
//! - **Contracts**: the `Connection` trait for drivers and the
//!   `QueryLogger` trait for log sinks.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from
//!   asupersync so cancellation flows through every database call.
//!
//! # Who Uses This Crate
//!
//! - `sqlbridge-macros` generates `Model` implementations defined here.
//! - `sqlbridge-query` consumes `ModelMetadata` and `Value` to build SQL.
//! - `sqlbridge` executes the built statements over a `Connection`.

pub use asupersync::{Cx, Outcome};

pub mod coerce;
pub mod connection;
pub mod deserialize;
pub mod dialect;
pub mod error;
pub mod field;
pub mod fields_set;
pub mod identifiers;
pub mod logging;
pub mod model;
pub mod registry;
pub mod row;
pub mod tracked;
pub mod value;

pub use coerce::{FromValue, Json, Kind, TIME_FORMATS, TimeFormat, ToValue, TypedValue, coerce, stringify};
pub use connection::Connection;
pub use deserialize::{deserialize, deserialize_into, scan_columns};
pub use dialect::{CaseFold, Dialect, DialectCapabilities, PlaceholderStyle, QuoteChars};
pub use error::{BoxError, Error, QueryError, QueryErrorKind, Result, TypeMismatch};
pub use field::{AutoTimestamp, FieldInfo};
pub use fields_set::FieldsSet;
pub use identifiers::{
    MAX_IDENTIFIER_LENGTH, parse_identifier_list, quote_identifier, try_quote_identifier,
    unquote_identifier, validate_identifier,
};
pub use logging::{LogPolicy, LogScope, QueryEvent, QueryLogger, REDACTED, TracingLogger};
pub use model::Model;
pub use registry::{ModelMetadata, Registry, RegistryBuilder};
pub use row::{ColumnInfo, Row};
pub use tracked::Tracked;
pub use value::Value;
