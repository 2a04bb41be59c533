//! Generated-key retrieval dispatch.
//!
//! Decides how the key (and other server-populated columns) of an INSERT
//! comes back: from a RETURNING clause, from an OUTPUT clause, or from the
//! driver's last-insert-id. The same rules apply to builder output and to
//! SQL written by the caller.

use std::sync::OnceLock;

use regex::Regex;
use sqlbridge_core::{Dialect, Error, Result, parse_identifier_list, unquote_identifier};

/// How a generated key is read back after an INSERT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// Scan the row produced by `RETURNING <columns>`.
    ReturningClause(Vec<String>),
    /// Scan the row produced by `OUTPUT INSERTED.<columns>`.
    OutputClause(Vec<String>),
    /// Ask the driver for the connection's last auto-increment id.
    LastInsertId,
    /// No key requested.
    None,
}

impl RetrievalStrategy {
    /// Columns the statement returns as a row, if any.
    pub fn columns(&self) -> Option<&[String]> {
        match self {
            RetrievalStrategy::ReturningClause(cols) | RetrievalStrategy::OutputClause(cols) => {
                Some(cols)
            }
            RetrievalStrategy::LastInsertId | RetrievalStrategy::None => None,
        }
    }

    /// Whether the statement produces a result row.
    pub fn returns_row(&self) -> bool {
        self.columns().is_some()
    }
}

/// Choose the retrieval strategy for an INSERT statement.
///
/// A RETURNING or OUTPUT clause already present in `sql` always wins and
/// its column list is validated. Without a clause, dialects whose driver
/// reports a last-insert-id use it, which only works for a single
/// auto-increment key. Every other dialect needs the clause.
///
/// # Errors
///
/// - [`Error::InvalidIdentifier`] for a malformed clause column list
/// - [`Error::UnsupportedKeyRetrieval`] when last-insert-id cannot identify the key
/// - [`Error::MissingReturningClause`] when the dialect needs a clause and none is present
pub fn resolve_retrieval(
    dialect: Dialect,
    sql: &str,
    want_key: bool,
    single_auto_key: bool,
) -> Result<RetrievalStrategy> {
    if !want_key {
        return Ok(RetrievalStrategy::None);
    }

    if let Some(list) = find_returning_clause(dialect, sql) {
        return parse_identifier_list(dialect, list).map(RetrievalStrategy::ReturningClause);
    }
    if let Some(list) = find_output_clause(dialect, sql) {
        return parse_output_list(dialect, list).map(RetrievalStrategy::OutputClause);
    }

    let caps = dialect.capabilities();
    if caps.last_insert_id {
        if single_auto_key {
            return Ok(RetrievalStrategy::LastInsertId);
        }
        let table = parse_insert_table(dialect, sql)?.unwrap_or_default();
        return Err(Error::UnsupportedKeyRetrieval {
            table,
            reason: "last-insert-id only identifies a single auto-increment key",
        });
    }

    Err(Error::MissingReturningClause { dialect: caps.name })
}

/// Replace the contents of string literals, quoted identifiers and comments
/// with spaces, keeping byte offsets intact so matches on the masked text
/// can be sliced out of the original.
fn mask_quoted(dialect: Dialect, sql: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Normal,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let backslash_escapes = dialect == Dialect::Mysql;
    let mut out = String::with_capacity(sql.len());
    let mut state = State::Normal;
    let mut chars = sql.chars().peekable();
    let mask = |out: &mut String, c: char| {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    };

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '-' if chars.peek() == Some(&'-') => {
                    mask(&mut out, c);
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    mask(&mut out, c);
                    if let Some(next) = chars.next() {
                        mask(&mut out, next);
                    }
                    state = State::BlockComment;
                }
                '\'' | '"' | '`' => {
                    out.push(c);
                    state = State::Quoted(c);
                }
                '[' => {
                    out.push(c);
                    state = State::Quoted(']');
                }
                _ => out.push(c),
            },
            State::Quoted(close) => {
                if backslash_escapes && close == '\'' && c == '\\' {
                    mask(&mut out, c);
                    if let Some(next) = chars.next() {
                        mask(&mut out, next);
                    }
                } else if c == close {
                    if chars.peek() == Some(&close) {
                        mask(&mut out, c);
                        if let Some(next) = chars.next() {
                            mask(&mut out, next);
                        }
                    } else {
                        out.push(c);
                        state = State::Normal;
                    }
                } else {
                    mask(&mut out, c);
                }
            }
            State::LineComment => {
                if c == '\n' {
                    out.push(c);
                    state = State::Normal;
                } else {
                    mask(&mut out, c);
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    mask(&mut out, c);
                    if let Some(next) = chars.next() {
                        mask(&mut out, next);
                    }
                    state = State::Normal;
                } else {
                    mask(&mut out, c);
                }
            }
        }
    }
    out
}

fn returning_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)\bRETURNING\s+(.+?)\s*;?\s*$").ok())
        .as_ref()
}

fn output_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\bOUTPUT\s+(.+?)\s+(INTO|VALUES|SELECT|DEFAULT\s+VALUES)\b").ok()
    })
    .as_ref()
}

fn insert_table_regex() -> Option<&'static Regex> {
    const SEGMENT: &str = r#"(?:"[^"]*"|`[^`]*`|\[[^\]]*\]|[A-Za-z0-9_]+)"#;
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?is)^\s*INSERT\s+(?:INTO\s+)?({SEGMENT}(?:\.{SEGMENT})*)"
        ))
        .ok()
    })
    .as_ref()
}

/// Body of a RETURNING clause in `sql`, ignoring quoted text and comments.
pub fn find_returning_clause<'a>(dialect: Dialect, sql: &'a str) -> Option<&'a str> {
    let masked = mask_quoted(dialect, sql);
    let caps = returning_regex()?.captures(&masked)?;
    let m = caps.get(1)?;
    sql.get(m.start()..m.end())
}

/// Column list of an `OUTPUT INSERTED.<col>, ...` clause in `sql`.
///
/// `OUTPUT ... INTO <target>` writes into a table instead of returning a
/// row, so it does not count.
pub fn find_output_clause<'a>(dialect: Dialect, sql: &'a str) -> Option<&'a str> {
    let masked = mask_quoted(dialect, sql);
    let caps = output_regex()?.captures(&masked)?;
    let terminator = caps.get(2)?.as_str();
    if terminator.eq_ignore_ascii_case("INTO") {
        return None;
    }
    let m = caps.get(1)?;
    sql.get(m.start()..m.end())
}

/// Parse `INSERTED.a, INSERTED.[b]` into `["a", "b"]`.
fn parse_output_list(dialect: Dialect, list: &str) -> Result<Vec<String>> {
    let stripped: Vec<&str> = list
        .split(',')
        .map(|item| {
            let item = item.trim();
            match item.get(..9) {
                Some(prefix) if prefix.eq_ignore_ascii_case("INSERTED.") => &item[9..],
                _ => item,
            }
        })
        .collect();
    parse_identifier_list(dialect, &stripped.join(","))
}

/// Target table of an INSERT statement.
///
/// Returns `Ok(None)` when `sql` is not an INSERT.
///
/// # Errors
///
/// [`Error::InvalidIdentifier`] when the table name is malformed.
pub fn parse_insert_table(dialect: Dialect, sql: &str) -> Result<Option<String>> {
    let masked = mask_quoted(dialect, sql);
    let Some(m) = insert_table_regex()
        .and_then(|re| re.captures(&masked))
        .and_then(|caps| caps.get(1))
    else {
        return Ok(None);
    };
    let Some(raw) = sql.get(m.start()..m.end()) else {
        return Ok(None);
    };
    unquote_identifier(dialect, raw).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_key_requested() {
        let s = resolve_retrieval(Dialect::Postgres, "INSERT INTO t (a) VALUES ($1)", false, true)
            .unwrap();
        assert_eq!(s, RetrievalStrategy::None);
    }

    #[test]
    fn test_returning_clause_is_parsed() {
        let s = resolve_retrieval(
            Dialect::Postgres,
            "INSERT INTO \"users\" (\"name\") VALUES ($1) RETURNING \"id\", created_at;",
            true,
            true,
        )
        .unwrap();
        assert_eq!(
            s,
            RetrievalStrategy::ReturningClause(vec!["id".into(), "created_at".into()])
        );
    }

    #[test]
    fn test_missing_clause_on_returning_dialect() {
        let err = resolve_retrieval(Dialect::Postgres, "INSERT INTO t (a) VALUES ($1)", true, true)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingReturningClause { dialect: "postgres" }
        ));
        let err = resolve_retrieval(Dialect::Mssql, "INSERT INTO t (a) VALUES (@p1)", true, true)
            .unwrap_err();
        assert!(matches!(err, Error::MissingReturningClause { dialect: "mssql" }));
    }

    #[test]
    fn test_last_insert_id_without_clause() {
        let s = resolve_retrieval(Dialect::Mysql, "INSERT INTO t (a) VALUES (?)", true, true)
            .unwrap();
        assert_eq!(s, RetrievalStrategy::LastInsertId);
    }

    #[test]
    fn test_clause_present_on_last_insert_id_dialect_scans_row() {
        let s = resolve_retrieval(
            Dialect::Mysql,
            "INSERT INTO t (a) VALUES (?) RETURNING id",
            true,
            true,
        )
        .unwrap();
        assert_eq!(s, RetrievalStrategy::ReturningClause(vec!["id".into()]));
    }

    #[test]
    fn test_last_insert_id_needs_single_auto_key() {
        let err = resolve_retrieval(Dialect::Sqlite, "INSERT INTO orders (a) VALUES (?)", true, false)
            .unwrap_err();
        match err {
            Error::UnsupportedKeyRetrieval { table, .. } => assert_eq!(table, "orders"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_returning_inside_literal_is_ignored() {
        let sql = "INSERT INTO notes (body) VALUES ('x RETURNING id') -- RETURNING id";
        assert!(find_returning_clause(Dialect::Postgres, sql).is_none());
        assert!(resolve_retrieval(Dialect::Postgres, sql, true, true).is_err());
    }

    #[test]
    fn test_comment_after_returning_list() {
        for sql in [
            "INSERT INTO t (a) VALUES ($1) RETURNING id -- fetch key",
            "INSERT INTO t (a) VALUES ($1) RETURNING id /* key */",
            "INSERT INTO t (a) VALUES ($1) RETURNING id/* key */;",
        ] {
            let s = resolve_retrieval(Dialect::Postgres, sql, true, true).unwrap();
            assert_eq!(s, RetrievalStrategy::ReturningClause(vec!["id".into()]), "{sql}");
        }
    }

    #[test]
    fn test_malformed_returning_list() {
        let err = resolve_retrieval(
            Dialect::Postgres,
            "INSERT INTO t (a) VALUES ($1) RETURNING id, pg_sleep(10)",
            true,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[test]
    fn test_output_clause() {
        let sql = "INSERT INTO [users] ([name]) OUTPUT INSERTED.[id], inserted.created_at VALUES (@p1)";
        let s = resolve_retrieval(Dialect::Mssql, sql, true, true).unwrap();
        assert_eq!(
            s,
            RetrievalStrategy::OutputClause(vec!["id".into(), "created_at".into()])
        );

        let into = "INSERT INTO t (a) OUTPUT INSERTED.id INTO @ids VALUES (@p1)";
        assert!(find_output_clause(Dialect::Mssql, into).is_none());
    }

    #[test]
    fn test_parse_insert_table() {
        assert_eq!(
            parse_insert_table(Dialect::Postgres, "insert into \"app\".\"users\" (a) values ($1)")
                .unwrap()
                .as_deref(),
            Some("app.users")
        );
        assert_eq!(
            parse_insert_table(Dialect::Mysql, "INSERT INTO `orders` (a) VALUES (?)")
                .unwrap()
                .as_deref(),
            Some("orders")
        );
        assert!(parse_insert_table(Dialect::Postgres, "UPDATE t SET a = 1").unwrap().is_none());
        assert!(matches!(
            parse_insert_table(Dialect::Postgres, "INSERT INTO \"bad table\" VALUES (1)"),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_mask_keeps_offsets() {
        let sql = "SELECT 'héllo', \"a\"\"b\" -- c\n/* d */ x";
        let masked = mask_quoted(Dialect::Postgres, sql);
        assert_eq!(masked.len(), sql.len());
        assert!(masked.ends_with(" x"));
        assert!(!masked.contains("héllo"));
        assert!(!masked.contains('-') && !masked.contains('/'));
    }
}
