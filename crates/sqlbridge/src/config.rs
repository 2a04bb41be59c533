//! Connection-level configuration.

use serde::{Deserialize, Serialize};
use sqlbridge_core::{Dialect, Error, Result};

/// Settings shared by every call made through a [`Db`](crate::Db).
///
/// Deserializes from partial documents; missing keys take their defaults.
///
/// ```ignore
/// let config = DbConfig::from_json(r#"{ "dialect": "mssql", "log_args": false }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// SQL dialect of the connection.
    pub dialect: Dialect,
    /// Emit an event for every successful statement.
    pub log_queries: bool,
    /// Include argument values in statement events.
    pub log_args: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            log_queries: true,
            log_args: true,
        }
    }
}

impl DbConfig {
    /// Defaults for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Turn statement events on or off.
    pub fn log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    /// Turn argument logging on or off.
    pub fn log_args(mut self, enabled: bool) -> Self {
        self.log_args = enabled;
        self
    }

    /// Parse a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Custom(format!("invalid configuration: {e}")))
    }
}
