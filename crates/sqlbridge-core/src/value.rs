//! Dynamically-typed scalar values exchanged with database drivers.
//!
//! `Value` is the closed set of representations a driver may hand back for a
//! single column, and the set of representations accepted as bind arguments.
//! Coercion into concrete Rust types lives in [`crate::coerce`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single SQL scalar value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 8-bit signed integer.
    TinyInt(i8),
    /// 16-bit signed integer.
    SmallInt(i16),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    BigInt(i64),
    /// 64-bit unsigned integer (MySQL `BIGINT UNSIGNED`).
    UBigInt(u64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// Text.
    Text(String),
    /// Raw bytes. Some drivers return every text column this way.
    Bytes(Vec<u8>),
    /// Calendar date without time.
    Date(NaiveDate),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
    /// Timestamp in UTC.
    TimestampTz(DateTime<Utc>),
    /// Structured JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Stable lowercase name of the variant, used in error messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::TinyInt(_) => "tinyint",
            Value::SmallInt(_) => "smallint",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::UBigInt(_) => "ubigint",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Json(_) => "json",
        }
    }

    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is the zero value of its representation.
    ///
    /// NULL, numeric zero, `false`, empty text/bytes, empty JSON containers
    /// and the Unix epoch all count as zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::TinyInt(v) => *v == 0,
            Value::SmallInt(v) => *v == 0,
            Value::Int(v) => *v == 0,
            Value::BigInt(v) => *v == 0,
            Value::UBigInt(v) => *v == 0,
            Value::Float(v) => *v == 0.0,
            Value::Double(v) => *v == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Date(d) => *d == DateTime::<Utc>::default().date_naive(),
            Value::Timestamp(ts) => *ts == DateTime::<Utc>::default().naive_utc(),
            Value::TimestampTz(ts) => *ts == DateTime::<Utc>::default(),
            Value::Json(j) => match j {
                serde_json::Value::Null => true,
                serde_json::Value::Object(m) => m.is_empty(),
                serde_json::Value::Array(a) => a.is_empty(),
                _ => false,
            },
        }
    }

    /// Widen any native integer representation to `i128`.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::TinyInt(v) => Some(i128::from(*v)),
            Value::SmallInt(v) => Some(i128::from(*v)),
            Value::Int(v) => Some(i128::from(*v)),
            Value::BigInt(v) => Some(i128::from(*v)),
            Value::UBigInt(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// Integer value as `i64` if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|v| i64::try_from(v).ok())
    }

    /// Borrow the text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the raw bytes, if this is a byte value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u64 => UBigInt,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    serde_json::Value => Json,
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::SmallInt(i16::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(i32::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Value::BigInt(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Value {
    fn from(v: serde_json::Map<String, serde_json::Value>) -> Self {
        Value::Json(serde_json::Value::Object(v))
    }
}

impl From<Vec<serde_json::Value>> for Value {
    fn from(v: Vec<serde_json::Value>) -> Self {
        Value::Json(serde_json::Value::Array(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values() {
        assert!(Value::Null.is_zero());
        assert!(Value::Bool(false).is_zero());
        assert!(Value::BigInt(0).is_zero());
        assert!(Value::Text(String::new()).is_zero());
        assert!(Value::Json(serde_json::json!({})).is_zero());
        assert!(!Value::Bool(true).is_zero());
        assert!(!Value::Text("x".into()).is_zero());
        assert!(!Value::Json(serde_json::json!([1])).is_zero());
    }

    #[test]
    fn test_integer_widening() {
        assert_eq!(Value::TinyInt(-3).as_integer(), Some(-3));
        assert_eq!(Value::UBigInt(u64::MAX).as_i64(), None);
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::Text("7".into()).as_integer(), None);
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i32> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some(false)), Value::Bool(false));
        assert_eq!(Value::from("hi"), Value::Text("hi".into()));
    }
}
