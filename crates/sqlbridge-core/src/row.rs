//! Result rows as produced by a driver.

use std::collections::HashMap;
use std::sync::Arc;

use crate::coerce::FromValue;
use crate::error::{Error, Result, TypeMismatch};
use crate::value::Value;

/// Column metadata shared by every row of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Build column metadata from ordered column names.
    ///
    /// When a name repeats, lookups by name resolve to its first occurrence.
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    /// Column names in result order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A single result row: column name to raw [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row from column names and values.
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(names)), values)
    }

    /// Create a row that shares column metadata with its siblings.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len(), "row width mismatch");
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (names, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(names, values)
    }

    /// Shared column metadata.
    pub fn columns(&self) -> &Arc<ColumnInfo> {
        &self.columns
    }

    /// Number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a position.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Value for a column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Check if the row contains a column.
    pub fn contains(&self, name: &str) -> bool {
        self.columns.index_of(name).is_some()
    }

    /// Coerce a named column into `T`.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self
            .get_by_name(name)
            .ok_or_else(|| Error::Custom(format!("column `{name}` not present in row")))?;
        T::from_value(value).map_err(|e| Error::TypeMismatch(TypeMismatch::at_column(name, e)))
    }

    /// Iterate `(column, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consume the row and return its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_index() {
        let row = Row::from_pairs([("id", Value::BigInt(1)), ("name", Value::from("Alice"))]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::BigInt(1)));
        assert_eq!(row.get_by_name("name").and_then(Value::as_str), Some("Alice"));
        assert!(row.get_by_name("missing").is_none());
    }

    #[test]
    fn test_get_named_coerces() {
        let row = Row::from_pairs([("age", Value::from("42"))]);
        let age: i32 = row.get_named("age").unwrap();
        assert_eq!(age, 42);
    }

    #[test]
    fn test_get_named_reports_column() {
        let row = Row::from_pairs([("age", Value::from("forty"))]);
        let err = row.get_named::<i32>("age").unwrap_err();
        match err {
            Error::TypeMismatch(m) => assert_eq!(m.column.as_deref(), Some("age")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_column_names_resolve_to_first() {
        let row = Row::new(
            vec!["id".into(), "id".into()],
            vec![Value::Int(1), Value::Int(2)],
        );
        assert_eq!(row.get_by_name("id"), Some(&Value::Int(1)));
    }
}
