//! Static per-engine capability table.
//!
//! Every supported engine is described once by a [`DialectCapabilities`]
//! record: bind-marker style, identifier quoting, how generated keys come
//! back, and the expression used for database-side timestamps. The records
//! are `static` and never change after startup.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bind-parameter marker style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` for every parameter.
    Positional,
    /// `$1`, `$2`, ...
    NumberedDollar,
    /// `:1`, `:2`, ...
    NumberedColon,
    /// `@p1`, `@p2`, ...
    NumberedAt,
}

impl PlaceholderStyle {
    /// Render the marker for the 1-based parameter `index`.
    pub fn render(self, index: usize) -> String {
        match self {
            PlaceholderStyle::Positional => "?".to_string(),
            PlaceholderStyle::NumberedDollar => format!("${index}"),
            PlaceholderStyle::NumberedColon => format!(":{index}"),
            PlaceholderStyle::NumberedAt => format!("@p{index}"),
        }
    }
}

/// Identifier delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteChars {
    /// Opening delimiter.
    pub open: char,
    /// Closing delimiter.
    pub close: char,
    /// Character escaped by doubling inside a quoted identifier.
    pub escape: char,
}

impl QuoteChars {
    /// `"ident"`, `"` doubled.
    pub const ANSI: QuoteChars = QuoteChars {
        open: '"',
        close: '"',
        escape: '"',
    };

    /// `` `ident` ``, backtick doubled.
    pub const BACKTICK: QuoteChars = QuoteChars {
        open: '`',
        close: '`',
        escape: '`',
    };

    /// `[ident]`, only `]` doubled.
    pub const BRACKET: QuoteChars = QuoteChars {
        open: '[',
        close: ']',
        escape: ']',
    };
}

/// Identifier case folding applied before quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFold {
    /// Identifiers are used as written.
    None,
    /// Identifiers are upper-cased (legacy enterprise engines).
    Upper,
}

/// Immutable capability profile of one SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectCapabilities {
    /// Canonical dialect name.
    pub name: &'static str,
    /// Bind marker style.
    pub placeholder: PlaceholderStyle,
    /// Identifier delimiters.
    pub quote: QuoteChars,
    /// `INSERT ... RETURNING col` is understood.
    pub supports_returning: bool,
    /// `INSERT ... OUTPUT INSERTED.col VALUES ...` is understood.
    pub supports_output: bool,
    /// The driver can report the last auto-increment id of the connection.
    pub last_insert_id: bool,
    /// Case folding before quoting.
    pub case_fold: CaseFold,
    /// Dotted names (`schema.table`) are split and quoted per segment.
    pub qualified_names: bool,
    /// Expression evaluating to the database's current timestamp.
    pub now_expr: &'static str,
}

/// PostgreSQL.
pub static POSTGRES: DialectCapabilities = DialectCapabilities {
    name: "postgres",
    placeholder: PlaceholderStyle::NumberedDollar,
    quote: QuoteChars::ANSI,
    supports_returning: true,
    supports_output: false,
    last_insert_id: false,
    case_fold: CaseFold::None,
    qualified_names: true,
    now_expr: "NOW()",
};

/// SQLite.
pub static SQLITE: DialectCapabilities = DialectCapabilities {
    name: "sqlite",
    placeholder: PlaceholderStyle::Positional,
    quote: QuoteChars::ANSI,
    supports_returning: true,
    supports_output: false,
    last_insert_id: true,
    case_fold: CaseFold::None,
    qualified_names: true,
    now_expr: "CURRENT_TIMESTAMP",
};

/// MySQL / MariaDB.
pub static MYSQL: DialectCapabilities = DialectCapabilities {
    name: "mysql",
    placeholder: PlaceholderStyle::Positional,
    quote: QuoteChars::BACKTICK,
    supports_returning: false,
    supports_output: false,
    last_insert_id: true,
    case_fold: CaseFold::None,
    qualified_names: true,
    now_expr: "NOW()",
};

/// Microsoft SQL Server.
pub static MSSQL: DialectCapabilities = DialectCapabilities {
    name: "mssql",
    placeholder: PlaceholderStyle::NumberedAt,
    quote: QuoteChars::BRACKET,
    supports_returning: false,
    supports_output: true,
    last_insert_id: false,
    case_fold: CaseFold::None,
    qualified_names: true,
    now_expr: "SYSUTCDATETIME()",
};

/// Oracle.
pub static ORACLE: DialectCapabilities = DialectCapabilities {
    name: "oracle",
    placeholder: PlaceholderStyle::NumberedColon,
    quote: QuoteChars::ANSI,
    supports_returning: true,
    supports_output: false,
    last_insert_id: false,
    case_fold: CaseFold::Upper,
    qualified_names: true,
    now_expr: "SYSTIMESTAMP",
};

/// Supported SQL engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Dialect {
    /// PostgreSQL.
    #[default]
    Postgres,
    /// SQLite.
    Sqlite,
    /// MySQL / MariaDB.
    Mysql,
    /// Microsoft SQL Server.
    Mssql,
    /// Oracle.
    Oracle,
}

impl Dialect {
    /// All built-in dialects.
    pub const ALL: [Dialect; 5] = [
        Dialect::Postgres,
        Dialect::Sqlite,
        Dialect::Mysql,
        Dialect::Mssql,
        Dialect::Oracle,
    ];

    /// Capability record of this dialect.
    pub const fn capabilities(self) -> &'static DialectCapabilities {
        match self {
            Dialect::Postgres => &POSTGRES,
            Dialect::Sqlite => &SQLITE,
            Dialect::Mysql => &MYSQL,
            Dialect::Mssql => &MSSQL,
            Dialect::Oracle => &ORACLE,
        }
    }

    /// Canonical name.
    pub const fn name(self) -> &'static str {
        self.capabilities().name
    }

    /// Resolve a dialect by name or common alias, case-insensitively.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "mssql" | "sqlserver" | "sql_server" => Ok(Dialect::Mssql),
            "oracle" | "oci" => Ok(Dialect::Oracle),
            _ => Err(Error::UnknownDialect(name.to_string())),
        }
    }

    /// Render the 1-based bind marker `index`.
    pub fn placeholder(self, index: usize) -> String {
        self.capabilities().placeholder.render(index)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for Dialect {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Dialect::from_name(&value)
    }
}

impl From<Dialect> for &'static str {
    fn from(value: Dialect) -> Self {
        value.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::Mysql.placeholder(1), "?");
        assert_eq!(Dialect::Mssql.placeholder(2), "@p2");
        assert_eq!(Dialect::Oracle.placeholder(4), ":4");
    }

    #[test]
    fn test_from_name_aliases() {
        assert_eq!(Dialect::from_name("PostgreSQL").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_name("sqlserver").unwrap(), Dialect::Mssql);
        assert_eq!(Dialect::from_name(" mariadb ").unwrap(), Dialect::Mysql);
        assert!(matches!(
            Dialect::from_name("db2"),
            Err(Error::UnknownDialect(name)) if name == "db2"
        ));
    }

    #[test]
    fn test_key_retrieval_capabilities() {
        for d in Dialect::ALL {
            let caps = d.capabilities();
            assert!(
                caps.supports_returning || caps.supports_output || caps.last_insert_id,
                "{d} has no way to report generated keys"
            );
        }
        assert!(!Dialect::Mysql.capabilities().supports_returning);
        assert!(Dialect::Mssql.capabilities().supports_output);
    }

    #[test]
    fn test_serde_by_name() {
        let d: Dialect = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(d, Dialect::Sqlite);
        assert_eq!(serde_json::to_string(&Dialect::Oracle).unwrap(), "\"oracle\"");
        assert!(serde_json::from_str::<Dialect>("\"nope\"").is_err());
    }
}
