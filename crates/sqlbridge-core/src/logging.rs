//! Structured query-log events.
//!
//! sqlbridge only produces [`QueryEvent`]s; where they end up is decided by
//! the [`QueryLogger`] the caller installs. [`TracingLogger`] forwards them
//! to `tracing`, so any subscriber the application configures receives them.

use std::fmt;
use std::time::Duration;

use crate::coerce::stringify;
use crate::value::Value;

/// Marker logged in place of a redacted argument.
pub const REDACTED: &str = "<redacted>";

/// One statement-level log event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryEvent {
    /// Operation name, such as `insert` or `load`.
    pub op: &'static str,
    /// Target table, when known.
    pub table: Option<String>,
    /// Statement text, unless suppressed.
    pub sql: Option<String>,
    /// Rendered arguments, unless suppressed.
    pub args: Option<Vec<String>>,
    /// Rows returned or affected.
    pub rows: Option<u64>,
    /// Wall time spent in the driver.
    pub elapsed: Option<Duration>,
    /// Error text for failures.
    pub error: Option<String>,
    /// Human-readable summary.
    pub message: String,
}

impl QueryEvent {
    /// Start an event for `op`.
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Set the target table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set statement text and arguments as allowed by `policy`.
    pub fn statement(mut self, policy: LogPolicy, sql: &str, args: &[Value], redact: &[bool]) -> Self {
        if policy.sql {
            self.sql = Some(sql.to_string());
        }
        if policy.args {
            self.args = Some(render_args(args, redact));
        }
        self
    }

    /// Set the row count.
    pub fn rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Set the elapsed time.
    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Attach an error.
    pub fn error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Render bind arguments for logging, masking redacted positions.
///
/// `redact` is aligned with `args`; positions past its end are not redacted.
pub fn render_args(args: &[Value], redact: &[bool]) -> Vec<String> {
    args.iter()
        .enumerate()
        .map(|(i, v)| {
            if redact.get(i).copied().unwrap_or(false) {
                REDACTED.to_string()
            } else if v.is_null() {
                "NULL".to_string()
            } else {
                stringify(v)
            }
        })
        .collect()
}

/// Sink for query-log events.
pub trait QueryLogger: Send + Sync + fmt::Debug {
    /// Successful statements.
    fn debug(&self, event: &QueryEvent);
    /// Noteworthy but expected conditions.
    fn info(&self, event: &QueryEvent);
    /// Conditions the caller probably wants to look at.
    fn warn(&self, event: &QueryEvent);
    /// Failed statements.
    fn error(&self, event: &QueryEvent);
}

/// Default logger: forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

macro_rules! forward {
    ($level:ident, $event:expr) => {{
        let e = $event;
        tracing::$level!(
            op = e.op,
            table = e.table.as_deref(),
            sql = e.sql.as_deref(),
            args = ?e.args,
            rows = e.rows,
            elapsed_ms = e.elapsed.map(|d| d.as_secs_f64() * 1000.0),
            error = e.error.as_deref(),
            "{}",
            e.message
        );
    }};
}

impl QueryLogger for TracingLogger {
    fn debug(&self, event: &QueryEvent) {
        forward!(debug, event);
    }

    fn info(&self, event: &QueryEvent) {
        forward!(info, event);
    }

    fn warn(&self, event: &QueryEvent) {
        forward!(warn, event);
    }

    fn error(&self, event: &QueryEvent) {
        forward!(error, event);
    }
}

/// Per-call logging override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogScope {
    /// Use the connection-level settings.
    #[default]
    Inherit,
    /// Emit nothing for this call.
    Silent,
    /// Emit events without statement text.
    NoQuery,
    /// Emit events without argument values.
    NoArgs,
}

/// What a single call may emit, after applying a [`LogScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPolicy {
    /// Emit events for successful statements.
    pub statements: bool,
    /// Emit events for failures.
    pub failures: bool,
    /// Include statement text.
    pub sql: bool,
    /// Include argument values.
    pub args: bool,
}

impl LogPolicy {
    /// A policy that emits nothing.
    pub const SILENT: LogPolicy = LogPolicy {
        statements: false,
        failures: false,
        sql: false,
        args: false,
    };
}

impl LogScope {
    /// Combine this override with connection-level settings.
    pub fn resolve(self, log_queries: bool, log_args: bool) -> LogPolicy {
        let inherited = LogPolicy {
            statements: log_queries,
            failures: true,
            sql: log_queries,
            args: log_queries && log_args,
        };
        match self {
            LogScope::Inherit => inherited,
            LogScope::Silent => LogPolicy::SILENT,
            LogScope::NoQuery => LogPolicy {
                sql: false,
                ..inherited
            },
            LogScope::NoArgs => LogPolicy {
                args: false,
                ..inherited
            },
        }
    }
}
