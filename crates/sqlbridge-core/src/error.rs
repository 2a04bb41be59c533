//! Error taxonomy shared by every sqlbridge crate.
//!
//! Validation and coercion failures are reported before any statement is
//! sent. Engine failures coming back from a [`Connection`](crate::Connection)
//! are passed through, only tagged with the operation that issued them.

use std::fmt;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error from a driver or other external source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors produced by sqlbridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A raw value could not be coerced into the target field type.
    #[error("{0}")]
    TypeMismatch(TypeMismatch),

    /// A table or column name failed identifier validation.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The dialect needs a RETURNING/OUTPUT clause to hand back a generated key.
    #[error(
        "dialect `{dialect}` cannot report generated keys without a RETURNING or OUTPUT clause"
    )]
    MissingReturningClause {
        /// Dialect name.
        dialect: &'static str,
    },

    /// A single-record operation matched no rows.
    #[error("no rows found in `{table}`")]
    NotFound {
        /// Table (or statement target) queried.
        table: String,
    },

    /// A single-record operation matched more than one row.
    #[error("expected exactly one row from `{table}`, found {count}")]
    MultipleRows {
        /// Table (or statement target) queried.
        table: String,
        /// Number of rows returned.
        count: usize,
    },

    /// The model declares no primary key but the operation needs one.
    #[error("model `{table}` has no primary key")]
    MissingPrimaryKey {
        /// Table name of the model.
        table: &'static str,
    },

    /// Baseline-diff update requested for a model that did not opt in.
    #[error("model `{table}` is not enabled for partial updates")]
    PartialUpdateDisabled {
        /// Table name of the model.
        table: &'static str,
    },

    /// Whole-record update of a model that only accepts baseline-diff updates.
    #[error("model `{table}` is updated partially; a loaded baseline is required")]
    BaselineRequired {
        /// Table name of the model.
        table: &'static str,
    },

    /// The model type was never registered.
    #[error("model `{0}` is not registered")]
    UnregisteredModel(&'static str),

    /// Two fields of one model map to the same column.
    #[error("model `{table}` maps column `{column}` more than once")]
    DuplicateColumn {
        /// Table name of the model.
        table: &'static str,
        /// Repeated column name.
        column: &'static str,
    },

    /// No dialect with this name exists.
    #[error("unknown dialect `{0}`")]
    UnknownDialect(String),

    /// Last-insert-id retrieval only works for a single auto-increment key.
    #[error("generated key for `{table}` cannot be read back via last-insert-id: {reason}")]
    UnsupportedKeyRetrieval {
        /// Table name of the model.
        table: String,
        /// Why the strategy does not apply.
        reason: &'static str,
    },

    /// Error reported by the database engine.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// An underlying error, attributed to the operation that produced it.
    #[error("{op}: {source}")]
    Operation {
        /// Operation name, such as `insert` or `load`.
        op: &'static str,
        /// The original error.
        #[source]
        source: Box<Error>,
    },

    /// Anything else.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Attribute this error to an operation.
    ///
    /// Errors already attributed keep their original operation.
    pub fn in_operation(self, op: &'static str) -> Self {
        match self {
            Error::Operation { .. } => self,
            other => Error::Operation {
                op,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with operation attribution removed.
    pub fn root(&self) -> &Error {
        match self {
            Error::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when this error (or its root) is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound { .. })
    }
}

impl From<TypeMismatch> for Error {
    fn from(value: TypeMismatch) -> Self {
        Error::TypeMismatch(value)
    }
}

/// A value that could not be coerced into the requested kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    /// Column being deserialized, when known.
    pub column: Option<String>,
    /// Kind of the raw value (see [`Value::kind_name`](crate::Value::kind_name)).
    pub source_kind: &'static str,
    /// Kind of the target field.
    pub target_kind: String,
    /// What went wrong, including the offending input where useful.
    pub detail: String,
}

impl TypeMismatch {
    /// Create a mismatch not yet tied to a column.
    pub fn new(
        source_kind: &'static str,
        target_kind: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            column: None,
            source_kind,
            target_kind: target_kind.into(),
            detail: detail.into(),
        }
    }

    /// Tie a mismatch to the column that produced it.
    pub fn at_column(column: &str, mut err: TypeMismatch) -> Self {
        err.column = Some(column.to_string());
        err
    }
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(
                f,
                "type mismatch in column `{}`: cannot convert {} to {}: {}",
                col, self.source_kind, self.target_kind, self.detail
            ),
            None => write!(
                f,
                "type mismatch: cannot convert {} to {}: {}",
                self.source_kind, self.target_kind, self.detail
            ),
        }
    }
}

impl std::error::Error for TypeMismatch {}

/// Category of an engine-reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Unique, foreign key, check or not-null violation.
    Constraint,
    /// SQL could not be parsed by the engine.
    Syntax,
    /// Connection dropped or unusable.
    Connection,
    /// Statement timed out.
    Timeout,
    /// Any other engine error.
    Database,
}

/// An error reported by the database engine, passed through unchanged.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?} error: {message}")]
pub struct QueryError {
    /// Error category.
    pub kind: QueryErrorKind,
    /// Engine message.
    pub message: String,
    /// Driver-level cause.
    #[source]
    pub source: Option<BoxError>,
}

impl QueryError {
    /// Create a query error without an underlying cause.
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_display_names_column() {
        let err = TypeMismatch::at_column("age", TypeMismatch::new("text", "int32", "\"x\""));
        let msg = err.to_string();
        assert!(msg.contains("`age`"));
        assert!(msg.contains("text"));
        assert!(msg.contains("int32"));
    }

    #[test]
    fn test_operation_attribution_is_not_nested() {
        let err = Error::NotFound {
            table: "users".into(),
        }
        .in_operation("load")
        .in_operation("outer");
        match &err {
            Error::Operation { op, .. } => assert_eq!(*op, "load"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(err.is_not_found());
    }

    #[test]
    fn test_query_error_passthrough() {
        let err: Error = QueryError::new(QueryErrorKind::Constraint, "duplicate key").into();
        assert!(err.to_string().contains("duplicate key"));
    }
}
