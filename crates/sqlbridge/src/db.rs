//! The database handle.
//!
//! [`Db`] binds a driver [`Connection`] to a dialect, the model registry and
//! the logging configuration. Every operation validates and builds its SQL
//! first, so a rejected call never reaches the connection. Driver outcomes,
//! cancellation included, are passed back unchanged apart from tagging
//! engine errors with the operation that issued them.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use asupersync::{Cx, Outcome};
use sqlbridge_core::{
    Connection, Dialect, Error, LogPolicy, LogScope, Model, ModelMetadata, QueryEvent,
    QueryLogger, Registry, Result, Row, Tracked, TracingLogger, TypeMismatch, Value, deserialize,
    scan_columns,
};
use sqlbridge_query::{
    DeleteBuilder, InsertBuilder, RetrievalStrategy, SelectBuilder, Statement, UpdateBuilder,
    WriteSpec, find_output_clause, find_returning_clause, resolve_retrieval,
};

use crate::config::DbConfig;

/// A connection plus everything needed to map records onto it.
///
/// # Example
///
/// ```ignore
/// let registry = Registry::builder().register::<User>()?.build();
/// let db = Db::new(conn, registry, DbConfig::new(Dialect::Postgres));
///
/// let mut user = User { name: "alice".into(), ..User::default() };
/// db.insert(&cx, &mut user).await;          // user.id now set
/// db.scoped(LogScope::NoArgs).delete(&cx, &user).await;
/// ```
#[derive(Debug)]
pub struct Db<C: Connection> {
    conn: C,
    registry: Arc<Registry>,
    config: DbConfig,
    logger: Arc<dyn QueryLogger>,
    scope: LogScope,
}

/// One statement on its way to the driver.
struct Call<'a> {
    op: &'static str,
    table: Option<&'a str>,
    sql: &'a str,
    args: &'a [Value],
    redact: &'a [bool],
    started: Instant,
}

impl<'a> Call<'a> {
    fn new(op: &'static str, table: Option<&'a str>, sql: &'a str, args: &'a [Value]) -> Self {
        Self {
            op,
            table,
            sql,
            args,
            redact: &[],
            started: Instant::now(),
        }
    }

    fn for_read(op: &'static str, stmt: &'a Statement) -> Self {
        Self {
            redact: &stmt.redact,
            ..Self::new(op, Some(stmt.table), &stmt.sql, &stmt.args)
        }
    }

    fn for_write(op: &'static str, spec: &'a WriteSpec) -> Self {
        Self {
            redact: &spec.redact,
            ..Self::new(op, Some(spec.table), &spec.sql, &spec.args)
        }
    }
}

#[allow(clippy::ptr_arg)]
fn count_rows(rows: &Vec<Row>) -> u64 {
    rows.len() as u64
}

/// Exactly one row, or `NotFound` / `MultipleRows`.
fn single_row(table: &str, mut rows: Vec<Row>) -> Result<Row> {
    match rows.len() {
        0 => Err(Error::NotFound {
            table: table.to_string(),
        }),
        1 => Ok(rows.remove(0)),
        count => Err(Error::MultipleRows {
            table: table.to_string(),
            count,
        }),
    }
}

impl<C: Connection> Db<C> {
    /// Wrap `conn`. Events go to [`TracingLogger`] until another logger is set.
    pub fn new(conn: C, registry: Arc<Registry>, config: DbConfig) -> Self {
        Self {
            conn,
            registry,
            config,
            logger: Arc::new(TracingLogger),
            scope: LogScope::Inherit,
        }
    }

    /// Send events to `logger` instead.
    pub fn with_logger(mut self, logger: Arc<dyn QueryLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// A view of this handle whose calls apply `scope` on top of the
    /// configured logging.
    pub fn scoped(&self, scope: LogScope) -> Db<&C> {
        Db {
            conn: &self.conn,
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            logger: Arc::clone(&self.logger),
            scope,
        }
    }

    /// Dialect of the connection.
    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    /// Active configuration.
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Model registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Underlying connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Consume the handle and return the connection.
    pub fn into_connection(self) -> C {
        self.conn
    }

    // ------------------------------------------------------------------
    // Logging
    // ------------------------------------------------------------------

    fn policy(&self) -> LogPolicy {
        self.scope
            .resolve(self.config.log_queries, self.config.log_args)
    }

    fn event(&self, call: &Call<'_>, message: &str) -> QueryEvent {
        let event = QueryEvent::new(call.op, message)
            .statement(self.policy(), call.sql, call.args, call.redact)
            .elapsed(call.started.elapsed());
        match call.table {
            Some(table) => event.table(table),
            None => event,
        }
    }

    /// Log and return a failure raised before any SQL was sent.
    fn rejected<T>(&self, op: &'static str, table: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.policy().failures {
                self.logger.error(
                    &QueryEvent::new(op, "Statement rejected")
                        .table(table)
                        .error(e),
                );
            }
        }
        result
    }

    fn not_found(&self, call: &Call<'_>, error: &Error) {
        if self.policy().statements {
            self.logger.info(&self.event(call, "No matching row").error(error));
        }
    }

    fn meta<M: Model>(&self, op: &'static str) -> Result<&Arc<ModelMetadata>> {
        self.rejected(op, M::TABLE_NAME, self.registry.get::<M>())
    }

    /// Await a driver call, logging its result and tagging engine errors.
    async fn observe<T>(
        &self,
        call: &Call<'_>,
        fut: impl Future<Output = Outcome<T, Error>>,
        count: fn(&T) -> u64,
    ) -> Outcome<T, Error> {
        match fut.await {
            Outcome::Ok(value) => {
                if self.policy().statements {
                    self.logger
                        .debug(&self.event(call, "Statement executed").rows(count(&value)));
                }
                Outcome::Ok(value)
            }
            Outcome::Err(e) => {
                let e = e.in_operation(call.op);
                if self.policy().failures {
                    self.logger.error(&self.event(call, "Statement failed").error(&e));
                }
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => {
                if self.policy().failures {
                    self.logger.warn(&self.event(call, "Statement cancelled"));
                }
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Run a write and copy any generated values back into `record`.
    async fn write_back<M: Model>(
        &self,
        cx: &Cx,
        op: &'static str,
        meta: &ModelMetadata,
        record: &mut M,
        spec: &WriteSpec,
    ) -> Outcome<u64, Error> {
        let call = Call::for_write(op, spec);
        match &spec.retrieval {
            RetrievalStrategy::ReturningClause(columns) | RetrievalStrategy::OutputClause(columns) => {
                let rows = match self
                    .observe(&call, self.conn.query(cx, &spec.sql, &spec.args), count_rows)
                    .await
                {
                    Outcome::Ok(rows) => rows,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                };
                let row = match single_row(spec.table, rows) {
                    Ok(row) => row,
                    Err(e) => return Outcome::Err(e),
                };
                match scan_columns(&row, meta, columns, record) {
                    Ok(()) => Outcome::Ok(1),
                    Err(e) => Outcome::Err(e),
                }
            }
            RetrievalStrategy::LastInsertId => {
                let id = match self
                    .observe(&call, self.conn.insert(cx, &spec.sql, &spec.args), |_| 1)
                    .await
                {
                    Outcome::Ok(id) => id,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                };
                if let Some((idx, field)) = meta.single_auto_key() {
                    if let Err(e) = record.set_field(idx, &Value::BigInt(id)) {
                        return Outcome::Err(Error::TypeMismatch(TypeMismatch::at_column(
                            field.column_name,
                            e,
                        )));
                    }
                }
                Outcome::Ok(1)
            }
            RetrievalStrategy::None => {
                self.observe(&call, self.conn.execute(cx, &spec.sql, &spec.args), |n| *n)
                    .await
            }
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert `record`, writing generated key and timestamp values back
    /// into it.
    ///
    /// Every mapped column is written, zero values included.
    pub async fn insert<M: Model>(&self, cx: &Cx, record: &mut M) -> Outcome<(), Error> {
        self.insert_with(cx, "insert", record, false).await
    }

    /// Insert `record`, leaving out partial-update-eligible fields that
    /// hold no value so the column defaults apply.
    pub async fn insert_partial<M: Model>(&self, cx: &Cx, record: &mut M) -> Outcome<(), Error> {
        self.insert_with(cx, "insert_partial", record, true).await
    }

    async fn insert_with<M: Model>(
        &self,
        cx: &Cx,
        op: &'static str,
        record: &mut M,
        partial: bool,
    ) -> Outcome<(), Error> {
        let meta = match self.meta::<M>(op) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Err(e),
        };
        let built = InsertBuilder::new(meta, &*record)
            .dialect(self.dialect())
            .partial(partial)
            .build();
        let spec = match self.rejected(op, meta.table_name(), built) {
            Ok(spec) => spec,
            Err(e) => return Outcome::Err(e),
        };
        match self.write_back(cx, op, meta, record, &spec).await {
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Run a caller-written INSERT for `record`'s model.
    ///
    /// A RETURNING or OUTPUT clause in `sql` is honoured on any dialect and
    /// its row is scanned into `record`. Without one, the generated key of a
    /// single auto-increment primary key is read through last-insert-id
    /// where the driver supports it; dialects that need the clause fail
    /// with [`Error::MissingReturningClause`] before anything is sent.
    ///
    /// If the model has a redacted field, every argument is masked in logs.
    pub async fn insert_sql<M: Model>(
        &self,
        cx: &Cx,
        record: &mut M,
        sql: &str,
        args: &[Value],
    ) -> Outcome<(), Error> {
        const OP: &str = "insert_sql";
        let meta = match self.meta::<M>(OP) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Err(e),
        };
        let dialect = self.dialect();
        let auto_key = meta.single_auto_key().is_some();
        let want_key = auto_key
            || find_returning_clause(dialect, sql).is_some()
            || find_output_clause(dialect, sql).is_some();
        let retrieval = match self.rejected(
            OP,
            meta.table_name(),
            resolve_retrieval(dialect, sql, want_key, auto_key),
        ) {
            Ok(retrieval) => retrieval,
            Err(e) => return Outcome::Err(e),
        };
        // Caller arguments cannot be matched to fields; mask them all when
        // any field is redacted.
        let masked = meta.fields().iter().any(|f| f.redact);
        let spec = WriteSpec {
            table: meta.table_name(),
            sql: sql.to_string(),
            args: args.to_vec(),
            redact: vec![masked; args.len()],
            retrieval,
        };
        match self.write_back(cx, OP, meta, record, &spec).await {
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    async fn run_write(&self, cx: &Cx, op: &'static str, spec: Option<WriteSpec>) -> Outcome<u64, Error> {
        let Some(spec) = spec else {
            tracing::debug!(op, "Nothing to write");
            return Outcome::Ok(0);
        };
        let call = Call::for_write(op, &spec);
        self.observe(&call, self.conn.execute(cx, &spec.sql, &spec.args), |n| *n)
            .await
    }

    /// Overwrite every non-key column of the stored row with `record`.
    ///
    /// Zero values are written too, clearing whatever the row held. Models
    /// declared `partial_update` are rejected with
    /// [`Error::BaselineRequired`]; use [`Db::update_partial`] or
    /// [`Db::save_tracked`] for them. Returns the number of affected rows.
    pub async fn update<M: Model>(&self, cx: &Cx, record: &M) -> Outcome<u64, Error> {
        const OP: &str = "update";
        let meta = match self.meta::<M>(OP) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Err(e),
        };
        let built = UpdateBuilder::full(meta, record).dialect(self.dialect()).build();
        match self.rejected(OP, meta.table_name(), built) {
            Ok(spec) => self.run_write(cx, OP, spec).await,
            Err(e) => Outcome::Err(e),
        }
    }

    /// Write only the columns where `record` differs from `baseline`.
    ///
    /// Returns `Ok(0)` without touching the connection when nothing changed.
    pub async fn update_partial<M: Model>(
        &self,
        cx: &Cx,
        record: &M,
        baseline: &M,
    ) -> Outcome<u64, Error> {
        const OP: &str = "update_partial";
        let meta = match self.meta::<M>(OP) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Err(e),
        };
        let built = UpdateBuilder::partial(meta, record, baseline)
            .dialect(self.dialect())
            .build();
        match self.rejected(OP, meta.table_name(), built) {
            Ok(spec) => self.run_write(cx, OP, spec).await,
            Err(e) => Outcome::Err(e),
        }
    }

    /// Partial update of a tracked record; on success its baseline moves to
    /// the written state.
    pub async fn save_tracked<M: Model + Clone>(
        &self,
        cx: &Cx,
        tracked: &mut Tracked<M>,
    ) -> Outcome<u64, Error> {
        let outcome = self.update_partial(cx, &**tracked, tracked.baseline()).await;
        if let Outcome::Ok(_) = outcome {
            tracked.mark_persisted();
        }
        outcome
    }

    /// Delete the stored row of `record`.
    pub async fn delete<M: Model>(&self, cx: &Cx, record: &M) -> Outcome<u64, Error> {
        const OP: &str = "delete";
        let meta = match self.meta::<M>(OP) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Err(e),
        };
        let built = DeleteBuilder::for_record(meta, record)
            .dialect(self.dialect())
            .build();
        match self.rejected(OP, meta.table_name(), built) {
            Ok(spec) => self.run_write(cx, OP, Some(spec)).await,
            Err(e) => Outcome::Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Load the row with primary key `key` (values in key-column order).
    ///
    /// Fails with [`Error::NotFound`] when no row matches.
    pub async fn load<M: Model>(&self, cx: &Cx, key: &[Value]) -> Outcome<M, Error> {
        const OP: &str = "load";
        let meta = match self.meta::<M>(OP) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Err(e),
        };
        let built = SelectBuilder::by_key(meta, key.to_vec())
            .dialect(self.dialect())
            .build();
        let stmt = match self.rejected(OP, meta.table_name(), built) {
            Ok(stmt) => stmt,
            Err(e) => return Outcome::Err(e),
        };
        let call = Call::for_read(OP, &stmt);
        self.one_row(cx, &call, meta).await
    }

    async fn fetch(&self, cx: &Cx, call: &Call<'_>) -> Outcome<Vec<Row>, Error> {
        self.observe(call, self.conn.query(cx, call.sql, call.args), count_rows)
            .await
    }

    async fn one_row<M: Model>(
        &self,
        cx: &Cx,
        call: &Call<'_>,
        meta: &ModelMetadata,
    ) -> Outcome<M, Error> {
        let rows = match self.fetch(cx, call).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let row = match single_row(meta.table_name(), rows) {
            Ok(row) => row,
            Err(e) => {
                if e.is_not_found() {
                    self.not_found(call, &e);
                }
                return Outcome::Err(e);
            }
        };
        match deserialize(&row, meta) {
            Ok(record) => Outcome::Ok(record),
            Err(e) => Outcome::Err(e),
        }
    }

    /// Run `sql` and map its single row onto `M`.
    ///
    /// Zero rows is [`Error::NotFound`]; more than one is
    /// [`Error::MultipleRows`].
    pub async fn query_one<M: Model>(&self, cx: &Cx, sql: &str, args: &[Value]) -> Outcome<M, Error> {
        const OP: &str = "query_one";
        let meta = match self.meta::<M>(OP) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Err(e),
        };
        let call = Call::new(OP, Some(meta.table_name()), sql, args);
        self.one_row(cx, &call, meta).await
    }

    /// Run `sql` and map its first row onto `M`, if there is one.
    pub async fn query_first<M: Model>(
        &self,
        cx: &Cx,
        sql: &str,
        args: &[Value],
    ) -> Outcome<Option<M>, Error> {
        const OP: &str = "query_first";
        let meta = match self.meta::<M>(OP) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Err(e),
        };
        let call = Call::new(OP, Some(meta.table_name()), sql, args);
        let rows = match self.fetch(cx, &call).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match rows.first().map(|row| deserialize::<M>(row, meta)).transpose() {
            Ok(record) => Outcome::Ok(record),
            Err(e) => Outcome::Err(e),
        }
    }

    /// Run `sql` and map every row onto `M`.
    pub async fn query_all<M: Model>(
        &self,
        cx: &Cx,
        sql: &str,
        args: &[Value],
    ) -> Outcome<Vec<M>, Error> {
        const OP: &str = "query_all";
        let meta = match self.meta::<M>(OP) {
            Ok(meta) => meta,
            Err(e) => return Outcome::Err(e),
        };
        let call = Call::new(OP, Some(meta.table_name()), sql, args);
        let rows = match self.fetch(cx, &call).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match rows
            .iter()
            .map(|row| deserialize::<M>(row, meta))
            .collect::<Result<Vec<_>>>()
        {
            Ok(records) => Outcome::Ok(records),
            Err(e) => Outcome::Err(e),
        }
    }

    /// Run a statement that returns no rows; returns the affected count.
    pub async fn execute(&self, cx: &Cx, sql: &str, args: &[Value]) -> Outcome<u64, Error> {
        let call = Call::new("execute", None, sql, args);
        self.observe(&call, self.conn.execute(cx, sql, args), |n| *n)
            .await
    }
}
