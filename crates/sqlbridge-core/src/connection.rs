//! Database connection trait.
//!
//! Drivers implement [`Connection`]; sqlbridge never opens, pools or retries
//! connections itself. Every call takes the caller's [`Cx`], so cancellation
//! and budgets set by the caller propagate into the driver unchanged, and
//! whatever [`Outcome`] the driver produces is handed back as-is.

use std::future::Future;

use asupersync::{Cx, Outcome};

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;

/// A database connection able to run parameterized statements.
///
/// At most one statement is in flight per connection at a time; callers
/// that share a connection must serialize access themselves.
pub trait Connection: Send + Sync {
    /// Run a statement that returns rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Run an INSERT and return the engine's last auto-increment id for
    /// this connection.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send;
}

impl<C: Connection> Connection for &C {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        (**self).query(cx, sql, params)
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        (**self).execute(cx, sql, params)
    }

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        (**self).insert(cx, sql, params)
    }
}
