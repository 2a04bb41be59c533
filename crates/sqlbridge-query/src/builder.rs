//! Statement builders for model writes and key lookups.
//!
//! Every table and column name goes through dialect validation and quoting
//! before it is interpolated, and every value is bound as a parameter.
//! Builders fail before producing any SQL when a name is invalid or the
//! model lacks what the statement needs.

use sqlbridge_core::{
    Dialect, Error, FieldInfo, Model, ModelMetadata, Result, Value, try_quote_identifier,
};

use crate::returning::{RetrievalStrategy, resolve_retrieval};

/// A fully prepared write: SQL text, bound arguments and how to read back
/// generated values.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSpec {
    /// Table the statement targets.
    pub table: &'static str,
    /// Statement text with dialect placeholders.
    pub sql: String,
    /// Arguments in placeholder order.
    pub args: Vec<Value>,
    /// Which arguments must be masked in logs, aligned with `args`.
    pub redact: Vec<bool>,
    /// How generated values come back.
    pub retrieval: RetrievalStrategy,
}

/// A prepared read.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Table the statement reads.
    pub table: &'static str,
    /// Statement text with dialect placeholders.
    pub sql: String,
    /// Arguments in placeholder order.
    pub args: Vec<Value>,
    /// Which arguments must be masked in logs, aligned with `args`.
    pub redact: Vec<bool>,
}

/// Collects bound arguments and hands out placeholders in order.
#[derive(Debug)]
struct Binds {
    dialect: Dialect,
    args: Vec<Value>,
    redact: Vec<bool>,
}

impl Binds {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            args: Vec::new(),
            redact: Vec::new(),
        }
    }

    fn push(&mut self, value: Value, redact: bool) -> String {
        self.args.push(value);
        self.redact.push(redact);
        self.dialect.placeholder(self.args.len())
    }
}

fn quoted_table(meta: &ModelMetadata, dialect: Dialect) -> Result<String> {
    try_quote_identifier(dialect, meta.table_name())
}

fn quoted_column(field: &FieldInfo, dialect: Dialect) -> Result<String> {
    try_quote_identifier(dialect, field.column_name)
}

/// `"pk1" = $n AND "pk2" = $m` for the record's key.
fn key_predicate(
    meta: &ModelMetadata,
    dialect: Dialect,
    key: &[Value],
    binds: &mut Binds,
) -> Result<String> {
    let pk = meta.require_primary_key()?;
    if key.len() != pk.len() {
        return Err(Error::Custom(format!(
            "`{}` has {} primary-key column(s), got {} value(s)",
            meta.table_name(),
            pk.len(),
            key.len()
        )));
    }
    let mut clauses = Vec::with_capacity(pk.len());
    for (&idx, value) in pk.iter().zip(key) {
        let Some(field) = meta.field(idx) else {
            continue;
        };
        let column = quoted_column(field, dialect)?;
        let placeholder = binds.push(value.clone(), field.redact);
        clauses.push(format!("{column} = {placeholder}"));
    }
    Ok(clauses.join(" AND "))
}

/// INSERT builder.
///
/// # Example
///
/// ```ignore
/// let spec = InsertBuilder::new(&meta, &user)
///     .dialect(Dialect::Mssql)
///     .build()?;
/// // INSERT INTO [users] ([name]) OUTPUT INSERTED.[id] VALUES (@p1)
/// ```
#[derive(Debug)]
pub struct InsertBuilder<'a, M: Model> {
    meta: &'a ModelMetadata,
    record: &'a M,
    dialect: Dialect,
    partial: bool,
    want_key: bool,
}

impl<'a, M: Model> InsertBuilder<'a, M> {
    /// Start an INSERT of `record`.
    ///
    /// The generated key is requested by default when the model has an
    /// auto-increment primary key.
    pub fn new(meta: &'a ModelMetadata, record: &'a M) -> Self {
        debug_assert!(meta.describes::<M>(), "metadata does not describe record");
        let want_key = meta
            .primary_key()
            .iter()
            .filter_map(|&idx| meta.field(idx))
            .any(|f| f.auto_increment);
        Self {
            meta,
            record,
            dialect: Dialect::default(),
            partial: false,
            want_key,
        }
    }

    /// Target dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Omit partial-update-eligible fields that hold no value.
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Whether generated values should be read back.
    pub fn want_key(mut self, want_key: bool) -> Self {
        self.want_key = want_key;
        self
    }

    /// Columns the engine fills in: auto-increment keys and insert
    /// timestamps. Falls back to the whole key when nothing is generated.
    fn server_columns(&self) -> Vec<&'static FieldInfo> {
        let generated: Vec<_> = self
            .meta
            .fields()
            .iter()
            .filter(|f| (f.primary_key && f.auto_increment) || f.auto_timestamp.on_insert())
            .collect();
        if !generated.is_empty() {
            return generated;
        }
        self.meta
            .primary_key()
            .iter()
            .filter_map(|&idx| self.meta.field(idx))
            .collect()
    }

    /// Build the statement.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIdentifier`] if a name is not valid for the dialect
    /// - [`Error::UnsupportedKeyRetrieval`] if the key cannot be read back
    pub fn build(&self) -> Result<WriteSpec> {
        let dialect = self.dialect;
        let caps = dialect.capabilities();
        let table = quoted_table(self.meta, dialect)?;
        let mut binds = Binds::new(dialect);
        let mut columns = Vec::new();
        let mut values = Vec::new();

        for (idx, field) in self.meta.fields().iter().enumerate() {
            if field.auto_timestamp.on_insert() {
                columns.push(quoted_column(field, dialect)?);
                values.push(caps.now_expr.to_string());
                continue;
            }
            let value = self.record.get_field(idx);
            if field.auto_increment && value.is_zero() {
                continue;
            }
            if self.partial && field.partial_update && !field.primary_key && field.is_absent(&value)
            {
                continue;
            }
            columns.push(quoted_column(field, dialect)?);
            values.push(binds.push(value, field.redact));
        }

        let output = if self.want_key && caps.supports_output && !caps.supports_returning {
            let cols = self
                .server_columns()
                .into_iter()
                .map(|f| quoted_column(f, dialect).map(|c| format!("INSERTED.{c}")))
                .collect::<Result<Vec<_>>>()?;
            (!cols.is_empty()).then(|| format!(" OUTPUT {}", cols.join(", ")))
        } else {
            None
        };
        let output = output.unwrap_or_default();

        let mut sql = if columns.is_empty() {
            match dialect {
                Dialect::Mysql => format!("INSERT INTO {table} (){output} VALUES ()"),
                // No DEFAULT VALUES form; name one column and let it default.
                Dialect::Oracle => {
                    let Some(first) = self.meta.fields().first() else {
                        return Err(Error::Custom(format!(
                            "`{}` maps no columns to insert",
                            self.meta.table_name()
                        )));
                    };
                    let column = quoted_column(first, dialect)?;
                    format!("INSERT INTO {table} ({column}){output} VALUES (DEFAULT)")
                }
                _ => format!("INSERT INTO {table}{output} DEFAULT VALUES"),
            }
        } else {
            format!(
                "INSERT INTO {table} ({}){output} VALUES ({})",
                columns.join(", "),
                values.join(", ")
            )
        };

        if self.want_key && caps.supports_returning {
            let cols = self
                .server_columns()
                .into_iter()
                .map(|f| quoted_column(f, dialect))
                .collect::<Result<Vec<_>>>()?;
            if !cols.is_empty() {
                sql.push_str(" RETURNING ");
                sql.push_str(&cols.join(", "));
            }
        }

        let retrieval = resolve_retrieval(
            dialect,
            &sql,
            self.want_key,
            self.meta.single_auto_key().is_some(),
        )
        .map_err(|e| match e {
            Error::UnsupportedKeyRetrieval { reason, .. } => Error::UnsupportedKeyRetrieval {
                table: self.meta.table_name().to_string(),
                reason,
            },
            other => other,
        })?;
        tracing::trace!(
            table = self.meta.table_name(),
            dialect = caps.name,
            retrieval = ?retrieval,
            "Resolved key retrieval"
        );

        Ok(WriteSpec {
            table: self.meta.table_name(),
            sql,
            args: binds.args,
            redact: binds.redact,
            retrieval,
        })
    }
}

/// UPDATE builder, keyed on the record's primary key.
///
/// A full update writes every non-key column. A partial update writes only
/// the columns that differ from a baseline snapshot. Models declared
/// `partial_update` accept only the latter.
#[derive(Debug)]
pub struct UpdateBuilder<'a, M: Model> {
    meta: &'a ModelMetadata,
    record: &'a M,
    baseline: Option<&'a M>,
    dialect: Dialect,
}

impl<'a, M: Model> UpdateBuilder<'a, M> {
    /// Overwrite every non-key column of the stored row.
    pub fn full(meta: &'a ModelMetadata, record: &'a M) -> Self {
        debug_assert!(meta.describes::<M>(), "metadata does not describe record");
        Self {
            meta,
            record,
            baseline: None,
            dialect: Dialect::default(),
        }
    }

    /// Write only the columns where `record` differs from `baseline`.
    ///
    /// Fields declared `skip_partial` are always written.
    pub fn partial(meta: &'a ModelMetadata, record: &'a M, baseline: &'a M) -> Self {
        Self {
            baseline: Some(baseline),
            ..Self::full(meta, record)
        }
    }

    /// Target dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    fn changed(&self, idx: usize, field: &FieldInfo, current: &Value) -> bool {
        let Some(baseline) = self.baseline else {
            return true;
        };
        if !field.partial_update {
            return true;
        }
        if field.kind.is_nullable() && current.is_null() {
            return false;
        }
        *current != baseline.get_field(idx)
    }

    /// Build the statement.
    ///
    /// Returns `Ok(None)` when there is nothing to write.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingPrimaryKey`] if the model has no key
    /// - [`Error::PartialUpdateDisabled`] for a partial update of a model
    ///   that did not opt in
    /// - [`Error::BaselineRequired`] for a full update of a model that did
    ///   opt in
    /// - [`Error::InvalidIdentifier`] if a name is not valid for the dialect
    pub fn build(&self) -> Result<Option<WriteSpec>> {
        let dialect = self.dialect;
        let caps = dialect.capabilities();
        self.meta.require_primary_key()?;
        match (self.baseline.is_some(), self.meta.partial_update()) {
            (true, false) => {
                return Err(Error::PartialUpdateDisabled {
                    table: self.meta.table_name(),
                });
            }
            (false, true) => {
                return Err(Error::BaselineRequired {
                    table: self.meta.table_name(),
                });
            }
            _ => {}
        }

        let table = quoted_table(self.meta, dialect)?;
        let mut binds = Binds::new(dialect);
        let mut sets = Vec::new();
        let mut stamps = Vec::new();

        for (idx, field) in self.meta.fields().iter().enumerate() {
            if field.primary_key || (field.auto_timestamp.on_insert() && !field.auto_timestamp.on_update()) {
                continue;
            }
            if field.auto_timestamp.on_update() {
                stamps.push(format!("{} = {}", quoted_column(field, dialect)?, caps.now_expr));
                continue;
            }
            let value = self.record.get_field(idx);
            if !self.changed(idx, field, &value) {
                continue;
            }
            let column = quoted_column(field, dialect)?;
            let placeholder = binds.push(value, field.redact);
            sets.push(format!("{column} = {placeholder}"));
        }

        if sets.is_empty() {
            return Ok(None);
        }
        sets.extend(stamps);

        let key = self.record.primary_key_values();
        let predicate = key_predicate(self.meta, dialect, &key, &mut binds)?;
        let sql = format!("UPDATE {table} SET {} WHERE {predicate}", sets.join(", "));

        Ok(Some(WriteSpec {
            table: self.meta.table_name(),
            sql,
            args: binds.args,
            redact: binds.redact,
            retrieval: RetrievalStrategy::None,
        }))
    }
}

/// DELETE by primary key.
#[derive(Debug)]
pub struct DeleteBuilder<'a> {
    meta: &'a ModelMetadata,
    key: Vec<Value>,
    dialect: Dialect,
}

impl<'a> DeleteBuilder<'a> {
    /// Delete the stored row of `record`.
    pub fn for_record<M: Model>(meta: &'a ModelMetadata, record: &M) -> Self {
        debug_assert!(meta.describes::<M>(), "metadata does not describe record");
        Self::by_key(meta, record.primary_key_values())
    }

    /// Delete the row with the given key values, in key-column order.
    pub fn by_key(meta: &'a ModelMetadata, key: Vec<Value>) -> Self {
        Self {
            meta,
            key,
            dialect: Dialect::default(),
        }
    }

    /// Target dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Build the statement.
    pub fn build(&self) -> Result<WriteSpec> {
        let table = quoted_table(self.meta, self.dialect)?;
        let mut binds = Binds::new(self.dialect);
        let predicate = key_predicate(self.meta, self.dialect, &self.key, &mut binds)?;
        Ok(WriteSpec {
            table: self.meta.table_name(),
            sql: format!("DELETE FROM {table} WHERE {predicate}"),
            args: binds.args,
            redact: binds.redact,
            retrieval: RetrievalStrategy::None,
        })
    }
}

/// SELECT of a model's mapped columns.
#[derive(Debug)]
pub struct SelectBuilder<'a> {
    meta: &'a ModelMetadata,
    key: Option<Vec<Value>>,
    dialect: Dialect,
}

impl<'a> SelectBuilder<'a> {
    /// Every row of the table.
    pub fn all(meta: &'a ModelMetadata) -> Self {
        Self {
            meta,
            key: None,
            dialect: Dialect::default(),
        }
    }

    /// The row with the given key values, in key-column order.
    pub fn by_key(meta: &'a ModelMetadata, key: Vec<Value>) -> Self {
        Self {
            key: Some(key),
            ..Self::all(meta)
        }
    }

    /// Target dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Build the statement.
    pub fn build(&self) -> Result<Statement> {
        let dialect = self.dialect;
        let table = quoted_table(self.meta, dialect)?;
        let columns = self
            .meta
            .fields()
            .iter()
            .map(|f| quoted_column(f, dialect))
            .collect::<Result<Vec<_>>>()?;
        let mut sql = format!("SELECT {} FROM {table}", columns.join(", "));
        let mut binds = Binds::new(dialect);
        if let Some(key) = &self.key {
            let predicate = key_predicate(self.meta, dialect, key, &mut binds)?;
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        Ok(Statement {
            table: self.meta.table_name(),
            sql,
            args: binds.args,
            redact: binds.redact,
        })
    }
}
