//! Identifier validation and quoting.
//!
//! Table and column names cannot be bound as parameters, so every name that
//! reaches generated SQL goes through [`quote_identifier`] (or
//! [`try_quote_identifier`] for caller-supplied text). Nothing else in the
//! workspace concatenates identifiers into SQL.
//!
//! The accepted grammar is an allow-list: ASCII letters, digits, underscore,
//! and the dialect's own escape character. Dialects that understand qualified
//! names also accept `.` between non-empty segments.

use std::borrow::Cow;

use crate::dialect::{CaseFold, Dialect, QuoteChars};
use crate::error::{Error, Result};

/// Longest identifier accepted, in bytes (SQL Server's limit, the largest of
/// the supported engines).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

fn is_identifier_char(quote: QuoteChars, c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == quote.escape
}

/// Validate an identifier against the dialect's allow-list grammar.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] carrying the rejected token when the
/// identifier is empty, too long, has an empty segment, or contains any
/// character outside the grammar (whitespace, NUL, punctuation, ...).
pub fn validate_identifier(dialect: Dialect, ident: &str) -> Result<()> {
    let caps = dialect.capabilities();
    let valid_segment =
        |seg: &str| !seg.is_empty() && seg.chars().all(|c| is_identifier_char(caps.quote, c));

    let valid = ident.len() <= MAX_IDENTIFIER_LENGTH
        && if caps.qualified_names {
            ident.split('.').all(valid_segment)
        } else {
            valid_segment(ident)
        };

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(ident.to_string()))
    }
}

/// Validate a name that is not yet bound to a dialect.
///
/// Accepted when at least one built-in dialect accepts it; the dialect that
/// finally renders the name validates it again.
pub fn validate_portable_identifier(ident: &str) -> Result<()> {
    if Dialect::ALL
        .iter()
        .any(|d| validate_identifier(*d, ident).is_ok())
    {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(ident.to_string()))
    }
}

/// Quote an identifier for `dialect`.
///
/// Case-folding dialects upper-case the name first. Qualified names are split
/// on `.` and each segment is quoted on its own. The dialect's escape
/// character is doubled inside the delimiters.
///
/// # Panics
///
/// Panics if `ident` (or one of its segments) is empty. An empty name can
/// only come from a bug in the calling code, never from row data.
pub fn quote_identifier(dialect: Dialect, ident: &str) -> String {
    assert!(!ident.is_empty(), "cannot quote an empty identifier");
    let caps = dialect.capabilities();
    let folded: Cow<'_, str> = match caps.case_fold {
        CaseFold::None => Cow::Borrowed(ident),
        CaseFold::Upper => Cow::Owned(ident.to_uppercase()),
    };

    if caps.qualified_names {
        folded
            .split('.')
            .map(|seg| quote_segment(caps.quote, seg))
            .collect::<Vec<_>>()
            .join(".")
    } else {
        quote_segment(caps.quote, &folded)
    }
}

fn quote_segment(quote: QuoteChars, seg: &str) -> String {
    assert!(!seg.is_empty(), "cannot quote an empty identifier segment");
    let mut out = String::with_capacity(seg.len() + 2);
    out.push(quote.open);
    for c in seg.chars() {
        if c == quote.escape {
            out.push(c);
        }
        out.push(c);
    }
    out.push(quote.close);
    out
}

/// Validate, then quote.
///
/// Use for names that did not come from registered model metadata.
pub fn try_quote_identifier(dialect: Dialect, ident: &str) -> Result<String> {
    validate_identifier(dialect, ident)?;
    Ok(quote_identifier(dialect, ident))
}

/// Strip dialect quoting from an identifier as it appears in SQL text.
///
/// Quoted segments are unescaped; bare segments are case-folded the way the
/// engine would fold them. The result is validated before it is returned.
pub fn unquote_identifier(dialect: Dialect, text: &str) -> Result<String> {
    let caps = dialect.capabilities();
    let quote = caps.quote;
    let text = text.trim();
    let invalid = || Error::InvalidIdentifier(text.to_string());

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    loop {
        match chars.peek() {
            Some(&c) if c == quote.open => {
                chars.next();
                let start = out.len();
                loop {
                    match chars.next() {
                        Some(c) if c == quote.close => {
                            if chars.peek() == Some(&quote.close) {
                                chars.next();
                                out.push(c);
                            } else {
                                break;
                            }
                        }
                        Some(c) => out.push(c),
                        None => return Err(invalid()),
                    }
                }
                if out.len() == start {
                    return Err(invalid());
                }
            }
            Some(_) => {
                let start = out.len();
                while let Some(&c) = chars.peek() {
                    if c == '.' {
                        break;
                    }
                    if !(c.is_ascii_alphanumeric() || c == '_') {
                        return Err(invalid());
                    }
                    match caps.case_fold {
                        CaseFold::None => out.push(c),
                        CaseFold::Upper => out.push(c.to_ascii_uppercase()),
                    }
                    chars.next();
                }
                if out.len() == start {
                    return Err(invalid());
                }
            }
            None => return Err(invalid()),
        }

        match chars.next() {
            None => break,
            Some('.') if caps.qualified_names => out.push('.'),
            Some(_) => return Err(invalid()),
        }
    }

    validate_identifier(dialect, &out)?;
    Ok(out)
}

/// Parse a comma-separated column list such as the body of a RETURNING
/// clause. `*` is kept as-is; every other item is unquoted and validated.
pub fn parse_identifier_list(dialect: Dialect, list: &str) -> Result<Vec<String>> {
    let list = list.trim();
    if list.is_empty() {
        return Err(Error::InvalidIdentifier(String::new()));
    }
    list.split(',')
        .map(|item| {
            let item = item.trim();
            if item == "*" {
                Ok("*".to_string())
            } else {
                unquote_identifier(dialect, item)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_table() {
        let cases = [
            (Dialect::Postgres, "users", "\"users\""),
            (Dialect::Postgres, "user\"table", "\"user\"\"table\""),
            (Dialect::Sqlite, "user\"table", "\"user\"\"table\""),
            (Dialect::Mysql, "users", "`users`"),
            (Dialect::Mysql, "user`table", "`user``table`"),
            (Dialect::Mssql, "users", "[users]"),
            (Dialect::Mssql, "odd]name", "[odd]]name]"),
            (Dialect::Oracle, "users", "\"USERS\""),
            (Dialect::Oracle, "user\"table", "\"USER\"\"TABLE\""),
        ];
        for (dialect, ident, expected) in cases {
            assert_eq!(quote_identifier(dialect, ident), expected, "{dialect} {ident}");
        }
    }

    #[test]
    fn test_quote_qualified() {
        assert_eq!(
            quote_identifier(Dialect::Postgres, "app.users"),
            "\"app\".\"users\""
        );
        assert_eq!(quote_identifier(Dialect::Mssql, "dbo.users"), "[dbo].[users]");
    }

    #[test]
    #[should_panic(expected = "empty identifier")]
    fn test_quote_empty_panics() {
        let _ = quote_identifier(Dialect::Postgres, "");
    }

    #[test]
    fn test_validate_rejects_suspicious_tokens() {
        for bad in [
            "",
            "users; DROP TABLE x",
            "name--",
            "a b",
            "nul\0byte",
            "a..b",
            ".users",
            "users.",
            "[users]",
        ] {
            assert!(
                matches!(
                    validate_identifier(Dialect::Postgres, bad),
                    Err(Error::InvalidIdentifier(tok)) if tok == bad
                ),
                "{bad:?} should be rejected"
            );
        }
        let long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier(Dialect::Postgres, &long).is_err());
        assert!(validate_identifier(Dialect::Postgres, &long[1..]).is_ok());
    }

    #[test]
    fn test_validate_allows_dialect_quote_only() {
        assert!(validate_identifier(Dialect::Postgres, "user\"table").is_ok());
        assert!(validate_identifier(Dialect::Postgres, "user`table").is_err());
        assert!(validate_identifier(Dialect::Mysql, "user`table").is_ok());
        assert!(validate_identifier(Dialect::Mssql, "odd]name").is_ok());
        assert!(validate_identifier(Dialect::Mssql, "odd[name").is_err());
        assert!(validate_portable_identifier("user`table").is_ok());
        assert!(validate_portable_identifier("user table").is_err());
    }

    #[test]
    fn test_try_quote() {
        assert_eq!(
            try_quote_identifier(Dialect::Mysql, "orders").unwrap(),
            "`orders`"
        );
        assert!(try_quote_identifier(Dialect::Mysql, "orders;").is_err());
    }

    #[test]
    fn test_quote_then_unquote_restores_name() {
        let names = ["users", "user\"table", "user_2", "app.users"];
        for dialect in [Dialect::Postgres, Dialect::Sqlite] {
            for name in names {
                let quoted = quote_identifier(dialect, name);
                assert_eq!(unquote_identifier(dialect, &quoted).unwrap(), name);
            }
        }
        let quoted = quote_identifier(Dialect::Mysql, "user`table");
        assert_eq!(unquote_identifier(Dialect::Mysql, &quoted).unwrap(), "user`table");
        let quoted = quote_identifier(Dialect::Mssql, "odd]name");
        assert_eq!(unquote_identifier(Dialect::Mssql, &quoted).unwrap(), "odd]name");
        let quoted = quote_identifier(Dialect::Oracle, "created_at");
        assert_eq!(unquote_identifier(Dialect::Oracle, &quoted).unwrap(), "CREATED_AT");
    }

    #[test]
    fn test_unquote_bare_and_malformed() {
        assert_eq!(unquote_identifier(Dialect::Postgres, " id ").unwrap(), "id");
        assert_eq!(unquote_identifier(Dialect::Oracle, "id").unwrap(), "ID");
        assert!(unquote_identifier(Dialect::Postgres, "\"open").is_err());
        assert!(unquote_identifier(Dialect::Postgres, "\"\"").is_err());
        assert!(unquote_identifier(Dialect::Postgres, "id)").is_err());
        assert!(unquote_identifier(Dialect::Postgres, "\"a b\"").is_err());
    }

    #[test]
    fn test_parse_identifier_list() {
        assert_eq!(
            parse_identifier_list(Dialect::Postgres, "id, \"created_at\"").unwrap(),
            vec!["id".to_string(), "created_at".to_string()]
        );
        assert_eq!(
            parse_identifier_list(Dialect::Postgres, "*").unwrap(),
            vec!["*".to_string()]
        );
        assert!(matches!(
            parse_identifier_list(Dialect::Postgres, "id, 1=1 --"),
            Err(Error::InvalidIdentifier(_))
        ));
        assert!(parse_identifier_list(Dialect::Postgres, "id,,name").is_err());
    }
}
