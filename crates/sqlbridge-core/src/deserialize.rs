//! Populate model fields from result rows.
//!
//! Fields are visited in declaration order. A column absent from the row
//! leaves its field untouched, so narrow SELECT lists work. The first value
//! that cannot be coerced aborts with a [`TypeMismatch`] naming the column.

use crate::error::{Error, Result, TypeMismatch};
use crate::model::Model;
use crate::registry::ModelMetadata;
use crate::row::Row;
use crate::value::Value;

/// Fill `target` from `row`.
///
/// `target` may be a fresh value or a field borrowed out of an enclosing
/// struct; only the mapped fields are written.
pub fn deserialize_into<M: Model>(row: &Row, meta: &ModelMetadata, target: &mut M) -> Result<()> {
    debug_assert!(meta.describes::<M>(), "metadata does not describe target");
    for (idx, field) in meta.fields().iter().enumerate() {
        let Some(value) = column_value(row, field.column_name) else {
            continue;
        };
        target
            .set_field(idx, value)
            .map_err(|e| Error::TypeMismatch(TypeMismatch::at_column(field.column_name, e)))?;
    }
    Ok(())
}

/// Build a new `M` from `row`, starting from `M::default()`.
pub fn deserialize<M: Model>(row: &Row, meta: &ModelMetadata) -> Result<M> {
    let mut record = M::default();
    deserialize_into(row, meta, &mut record)?;
    Ok(record)
}

/// Copy only `columns` from `row` into `target`.
///
/// Used for rows produced by RETURNING/OUTPUT clauses. `*` selects every
/// mapped column. Listed columns that the model does not map are skipped;
/// listed columns missing from the row are skipped as well.
pub fn scan_columns<M: Model>(
    row: &Row,
    meta: &ModelMetadata,
    columns: &[String],
    target: &mut M,
) -> Result<()> {
    if columns.iter().any(|c| c == "*") {
        return deserialize_into(row, meta, target);
    }
    for column in columns {
        let Some((idx, field)) = meta
            .field_by_column(column)
            .or_else(|| case_insensitive_field(meta, column))
        else {
            tracing::trace!(column = %column, table = meta.table_name(), "Unmapped returned column");
            continue;
        };
        let Some(value) = column_value(row, field.column_name).or_else(|| row.get_by_name(column))
        else {
            continue;
        };
        target
            .set_field(idx, value)
            .map_err(|e| Error::TypeMismatch(TypeMismatch::at_column(field.column_name, e)))?;
    }
    Ok(())
}

// Case-folding engines return `ID` for a column registered as `id`.
fn column_value<'r>(row: &'r Row, column: &str) -> Option<&'r Value> {
    row.get_by_name(column).or_else(|| {
        row.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })
}

fn case_insensitive_field(
    meta: &ModelMetadata,
    column: &str,
) -> Option<(usize, &'static crate::field::FieldInfo)> {
    meta.fields()
        .iter()
        .enumerate()
        .find(|(_, f)| f.column_name.eq_ignore_ascii_case(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{FromValue, Kind, ToValue};
    use crate::field::FieldInfo;
    use crate::value::Value;
    use chrono::{DateTime, NaiveDate, Utc};

    #[derive(Debug, Default, PartialEq)]
    struct Member {
        id: i64,
        name: String,
        is_active: Option<bool>,
        created_at: DateTime<Utc>,
        prefs: serde_json::Map<String, serde_json::Value>,
    }

    impl Model for Member {
        const TABLE_NAME: &'static str = "members";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: [FieldInfo; 5] = [
                FieldInfo::new("id", "id", Kind::Int64).primary_key(true),
                FieldInfo::new("name", "name", Kind::Text),
                FieldInfo::new("is_active", "is_active", Kind::Bool.nullable()),
                FieldInfo::new("created_at", "created_at", Kind::Time),
                FieldInfo::new("prefs", "prefs", Kind::JsonObject),
            ];
            &FIELDS
        }

        fn get_field(&self, idx: usize) -> Value {
            match idx {
                0 => self.id.to_value(),
                1 => self.name.to_value(),
                2 => self.is_active.to_value(),
                3 => self.created_at.to_value(),
                4 => self.prefs.to_value(),
                _ => Value::Null,
            }
        }

        fn set_field(&mut self, idx: usize, value: &Value) -> std::result::Result<(), TypeMismatch> {
            match idx {
                0 => self.id = FromValue::from_value(value)?,
                1 => self.name = FromValue::from_value(value)?,
                2 => self.is_active = FromValue::from_value(value)?,
                3 => self.created_at = FromValue::from_value(value)?,
                4 => self.prefs = FromValue::from_value(value)?,
                _ => {}
            }
            Ok(())
        }
    }

    fn meta() -> ModelMetadata {
        ModelMetadata::of::<Member>().unwrap()
    }

    #[test]
    fn test_null_pointer_field_stays_none() {
        let row = Row::from_pairs([
            ("id", Value::BigInt(1)),
            ("name", Value::from("Alice")),
            ("is_active", Value::Null),
        ]);
        let member: Member = deserialize(&row, &meta()).unwrap();
        assert_eq!(member.id, 1);
        assert_eq!(member.name, "Alice");
        assert_eq!(member.is_active, None);
    }

    #[test]
    fn test_false_is_distinct_from_null() {
        let row = Row::from_pairs([("is_active", Value::Bool(false))]);
        let member: Member = deserialize(&row, &meta()).unwrap();
        assert_eq!(member.is_active, Some(false));
    }

    #[test]
    fn test_date_only_text_into_time() {
        let row = Row::from_pairs([("created_at", Value::from("2023-01-02"))]);
        let member: Member = deserialize(&row, &meta()).unwrap();
        let expected = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(member.created_at, expected);
        assert_ne!(member.created_at, DateTime::<Utc>::default());
    }

    #[test]
    fn test_missing_columns_leave_fields_untouched() {
        let mut member = Member {
            name: "kept".into(),
            ..Member::default()
        };
        let row = Row::from_pairs([("id", Value::Int(9))]);
        deserialize_into(&row, &meta(), &mut member).unwrap();
        assert_eq!(member.id, 9);
        assert_eq!(member.name, "kept");
    }

    #[test]
    fn test_embedded_target() {
        #[derive(Default)]
        struct Envelope {
            member: Member,
            extra: u8,
        }
        let mut env = Envelope::default();
        let row = Row::from_pairs([("id", Value::BigInt(4)), ("name", Value::from("Bo"))]);
        deserialize_into(&row, &meta(), &mut env.member).unwrap();
        assert_eq!(env.member.id, 4);
        assert_eq!(env.extra, 0);
    }

    #[test]
    fn test_first_failure_names_column() {
        let row = Row::from_pairs([
            ("id", Value::from("abc")),
            ("prefs", Value::from("{not json")),
        ]);
        let err = deserialize::<Member>(&row, &meta()).unwrap_err();
        match err {
            Error::TypeMismatch(m) => {
                assert_eq!(m.column.as_deref(), Some("id"));
                assert_eq!(m.source_kind, "text");
                assert_eq!(m.target_kind, "int64");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_text_column() {
        let row = Row::from_pairs([("prefs", Value::from(r#"{"theme":"dark"}"#))]);
        let member: Member = deserialize(&row, &meta()).unwrap();
        assert_eq!(member.prefs["theme"], "dark");
    }

    #[test]
    fn test_scan_columns_restricts_to_list() {
        let mut member = Member::default();
        let row = Row::from_pairs([("ID", Value::BigInt(77)), ("name", Value::from("x"))]);
        scan_columns(&row, &meta(), &["ID".to_string()], &mut member).unwrap();
        assert_eq!(member.id, 77);
        assert_eq!(member.name, "");
    }

    #[test]
    fn test_upper_cased_column_names() {
        let row = Row::from_pairs([("ID", Value::BigInt(5)), ("NAME", Value::from("ann"))]);
        let member: Member = deserialize(&row, &meta()).unwrap();
        assert_eq!(member.id, 5);
        assert_eq!(member.name, "ann");
    }
}
