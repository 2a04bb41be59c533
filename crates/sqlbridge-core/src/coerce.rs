//! Conversion of loosely-typed driver values into typed fields.
//!
//! [`coerce`] is the dynamic entry point: it takes a raw [`Value`] and a
//! target [`Kind`] and produces a [`TypedValue`]. The [`FromValue`] trait is
//! the static counterpart used by derived models; both share the same rules.
//!
//! Rules in brief:
//!
//! - Integer targets take native integers of any width (range checked),
//!   integral floats and trimmed decimal strings.
//! - Boolean targets take booleans, `"true"`/`"false"`/`"1"`/`"0"` and integers.
//! - Text targets take any scalar; NULL renders as the empty string.
//! - Time targets take native temporal values or strings in one of
//!   [`TIME_FORMATS`], first match wins.
//! - JSON targets take structured JSON or text/bytes holding valid JSON.
//! - Nullable targets map NULL to `None` and anything else to `Some`, even
//!   when the coerced value is a zero value.
//! - NULL into a non-nullable target yields the target's zero value.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TypeMismatch;
use crate::value::Value;

type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Target kind of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Platform-width signed integer (`isize`).
    Int,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// Boolean.
    Bool,
    /// Text.
    Text,
    /// Point in time, normalized to UTC.
    Time,
    /// JSON object.
    JsonObject,
    /// JSON array.
    JsonArray,
    /// Nullable wrapper around another kind (`Option<T>`).
    Nullable(&'static Kind),
    /// Anything else; the raw value is handed over as-is.
    Any,
}

impl Kind {
    /// The nullable form of this kind. Already-nullable kinds are unchanged.
    pub const fn nullable(self) -> Kind {
        match self {
            Kind::Int => Kind::Nullable(&Kind::Int),
            Kind::Int32 => Kind::Nullable(&Kind::Int32),
            Kind::Int64 => Kind::Nullable(&Kind::Int64),
            Kind::Bool => Kind::Nullable(&Kind::Bool),
            Kind::Text => Kind::Nullable(&Kind::Text),
            Kind::Time => Kind::Nullable(&Kind::Time),
            Kind::JsonObject => Kind::Nullable(&Kind::JsonObject),
            Kind::JsonArray => Kind::Nullable(&Kind::JsonArray),
            Kind::Any => Kind::Nullable(&Kind::Any),
            Kind::Nullable(inner) => Kind::Nullable(inner),
        }
    }

    /// True for `Nullable` kinds.
    pub const fn is_nullable(&self) -> bool {
        matches!(self, Kind::Nullable(_))
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Int => f.write_str("int"),
            Kind::Int32 => f.write_str("int32"),
            Kind::Int64 => f.write_str("int64"),
            Kind::Bool => f.write_str("bool"),
            Kind::Text => f.write_str("string"),
            Kind::Time => f.write_str("time"),
            Kind::JsonObject => f.write_str("json object"),
            Kind::JsonArray => f.write_str("json array"),
            Kind::Nullable(inner) => write!(f, "nullable {inner}"),
            Kind::Any => f.write_str("any"),
        }
    }
}

/// Result of a dynamic coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// `Kind::Int`.
    Int(isize),
    /// `Kind::Int32`.
    Int32(i32),
    /// `Kind::Int64`.
    Int64(i64),
    /// `Kind::Bool`.
    Bool(bool),
    /// `Kind::Text`.
    Text(String),
    /// `Kind::Time`.
    Time(DateTime<Utc>),
    /// `Kind::JsonObject`.
    JsonObject(JsonMap),
    /// `Kind::JsonArray`.
    JsonArray(Vec<serde_json::Value>),
    /// `Kind::Nullable`: `None` for SQL NULL.
    Nullable(Option<Box<TypedValue>>),
    /// `Kind::Any`.
    Raw(Value),
}

impl TypedValue {
    /// Convert back into a bind value.
    pub fn into_value(self) -> Value {
        match self {
            TypedValue::Int(v) => Value::BigInt(v as i64),
            TypedValue::Int32(v) => Value::Int(v),
            TypedValue::Int64(v) => Value::BigInt(v),
            TypedValue::Bool(v) => Value::Bool(v),
            TypedValue::Text(v) => Value::Text(v),
            TypedValue::Time(v) => Value::TimestampTz(v),
            TypedValue::JsonObject(v) => Value::from(v),
            TypedValue::JsonArray(v) => Value::from(v),
            TypedValue::Nullable(None) => Value::Null,
            TypedValue::Nullable(Some(inner)) => inner.into_value(),
            TypedValue::Raw(v) => v,
        }
    }
}

/// Coerce a raw value into the given kind.
pub fn coerce(value: &Value, kind: &Kind) -> Result<TypedValue, TypeMismatch> {
    match kind {
        Kind::Int => isize::from_value(value).map(TypedValue::Int),
        Kind::Int32 => i32::from_value(value).map(TypedValue::Int32),
        Kind::Int64 => i64::from_value(value).map(TypedValue::Int64),
        Kind::Bool => bool::from_value(value).map(TypedValue::Bool),
        Kind::Text => String::from_value(value).map(TypedValue::Text),
        Kind::Time => DateTime::<Utc>::from_value(value).map(TypedValue::Time),
        Kind::JsonObject => JsonMap::from_value(value).map(TypedValue::JsonObject),
        Kind::JsonArray => Vec::<serde_json::Value>::from_value(value).map(TypedValue::JsonArray),
        Kind::Nullable(inner) => {
            if value.is_null() {
                return Ok(TypedValue::Nullable(None));
            }
            coerce(value, inner)
                .map(|v| TypedValue::Nullable(Some(Box::new(v))))
                .map_err(|mut e| {
                    e.target_kind = kind.to_string();
                    e
                })
        }
        Kind::Any => Ok(TypedValue::Raw(value.clone())),
    }
}

/// Canonical text rendering of a value.
///
/// Booleans render as `true`/`false`, integers in base 10, timestamps as
/// RFC 3339 in UTC and NULL as the empty string.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::UBigInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Text(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Timestamp(ts) => ts.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Value::TimestampTz(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Value::Json(j) => j.to_string(),
    }
}

/// A text layout accepted by time targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// `2006-01-02T15:04:05Z07:00`.
    Rfc3339,
    /// RFC 3339 with fractional seconds and no offset (read as UTC).
    Rfc3339Fraction,
    /// `2006-01-02 15:04:05`, optional fraction, read as UTC.
    Sql,
    /// `2006-01-02`, midnight UTC.
    DateOnly,
    /// `2006-01-02 15:04:05.999999+07`, as emitted by Postgres text output.
    SqlWithOffset,
}

/// Layouts tried in order when a time target receives text.
pub const TIME_FORMATS: &[TimeFormat] = &[
    TimeFormat::Rfc3339,
    TimeFormat::Rfc3339Fraction,
    TimeFormat::Sql,
    TimeFormat::DateOnly,
    TimeFormat::SqlWithOffset,
];

impl TimeFormat {
    fn parse(self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            TimeFormat::Rfc3339 => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            TimeFormat::Rfc3339Fraction => {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|t| t.and_utc())
            }
            TimeFormat::Sql => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc()),
            TimeFormat::DateOnly => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| t.and_utc()),
            TimeFormat::SqlWithOffset => DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z")
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

/// Parse text against [`TIME_FORMATS`], first match wins.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    TIME_FORMATS.iter().find_map(|f| f.parse(s))
}

/// Types that can be populated from a raw [`Value`].
pub trait FromValue: Sized {
    /// Field kind reported in metadata and errors.
    const KIND: Kind;

    /// Coerce a raw value.
    fn from_value(value: &Value) -> Result<Self, TypeMismatch>;
}

/// Types that can be turned into a bind [`Value`].
pub trait ToValue {
    /// Produce the bind value.
    fn to_value(&self) -> Value;
}

fn mismatch(value: &Value, target: impl fmt::Display, detail: impl Into<String>) -> TypeMismatch {
    TypeMismatch::new(value.kind_name(), target.to_string(), detail)
}

/// Borrow text from a text or UTF-8 byte value.
fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::Text(s) => Some(s),
        Value::Bytes(b) => std::str::from_utf8(b).ok(),
        _ => None,
    }
}

fn coerce_integer(value: &Value, target: &str, min: i128, max: i128) -> Result<i128, TypeMismatch> {
    let wide = match value {
        Value::Null => return Ok(0),
        Value::Float(f) => integral_float(f64::from(*f))
            .ok_or_else(|| mismatch(value, target, format!("{f} is not integral")))?,
        Value::Double(f) => {
            integral_float(*f).ok_or_else(|| mismatch(value, target, format!("{f} is not integral")))?
        }
        Value::Text(_) | Value::Bytes(_) => {
            let Some(text) = text_of(value) else {
                return Err(mismatch(value, target, "bytes are not valid UTF-8"));
            };
            parse_decimal(text.trim())
                .ok_or_else(|| mismatch(value, target, format!("{text:?} is not a decimal integer")))?
        }
        other => other
            .as_integer()
            .ok_or_else(|| mismatch(value, target, "not an integer"))?,
    };
    if wide < min || wide > max {
        return Err(mismatch(value, target, format!("{wide} out of range")));
    }
    Ok(wide)
}

fn integral_float(f: f64) -> Option<i128> {
    // Bounds keep the cast below from saturating silently.
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e38 {
        Some(f as i128)
    } else {
        None
    }
}

fn parse_decimal(s: &str) -> Option<i128> {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i128>().ok()
}

macro_rules! impl_integer {
    ($($ty:ty => $kind:expr, $name:literal, $variant:ident as $cast:ty;)*) => {
        $(
            impl FromValue for $ty {
                const KIND: Kind = $kind;

                fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
                    let wide = coerce_integer(
                        value,
                        $name,
                        i128::from(<$ty>::MIN as $cast),
                        i128::from(<$ty>::MAX as $cast),
                    )?;
                    <$ty>::try_from(wide).map_err(|_| mismatch(value, $name, "out of range"))
                }
            }

            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::$variant(*self as $cast)
                }
            }
        )*
    };
}

impl_integer! {
    i8 => Kind::Int32, "int8", TinyInt as i8;
    i16 => Kind::Int32, "int16", SmallInt as i16;
    i32 => Kind::Int32, "int32", Int as i32;
    i64 => Kind::Int64, "int64", BigInt as i64;
    isize => Kind::Int, "int", BigInt as i64;
    u8 => Kind::Int32, "uint8", SmallInt as i16;
    u16 => Kind::Int32, "uint16", Int as i32;
    u32 => Kind::Int64, "uint32", BigInt as i64;
    u64 => Kind::Int64, "uint64", UBigInt as u64;
}

impl FromValue for bool {
    const KIND: Kind = Kind::Bool;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::Text(_) | Value::Bytes(_) => match text_of(value) {
                Some("true" | "1") => Ok(true),
                Some("false" | "0") => Ok(false),
                Some(other) => Err(mismatch(value, Kind::Bool, format!("{other:?} is not a boolean"))),
                None => Err(mismatch(value, Kind::Bool, "bytes are not valid UTF-8")),
            },
            other => other
                .as_integer()
                .map(|i| i != 0)
                .ok_or_else(|| mismatch(value, Kind::Bool, "not a boolean")),
        }
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for String {
    const KIND: Kind = Kind::Text;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        Ok(stringify(value))
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Text((*self).to_string())
    }
}

impl FromValue for DateTime<Utc> {
    const KIND: Kind = Kind::Time;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Null => Ok(DateTime::<Utc>::default()),
            Value::TimestampTz(ts) => Ok(*ts),
            Value::Timestamp(ts) => Ok(ts.and_utc()),
            Value::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(|t| t.and_utc())
                .ok_or_else(|| mismatch(value, Kind::Time, "invalid date")),
            Value::Text(_) | Value::Bytes(_) => {
                let Some(text) = text_of(value) else {
                    return Err(mismatch(value, Kind::Time, "bytes are not valid UTF-8"));
                };
                parse_time(text).ok_or_else(|| {
                    mismatch(value, Kind::Time, format!("{text:?} matches no known time format"))
                })
            }
            _ => Err(mismatch(value, Kind::Time, "not a time value")),
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::TimestampTz(*self)
    }
}

impl FromValue for NaiveDateTime {
    const KIND: Kind = Kind::Time;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            other => DateTime::<Utc>::from_value(other).map(|t| t.naive_utc()),
        }
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for NaiveDate {
    const KIND: Kind = Kind::Time;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Date(d) => Ok(*d),
            other => DateTime::<Utc>::from_value(other).map(|t| t.date_naive()),
        }
    }
}

impl ToValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::Date(*self)
    }
}

/// Parse a JSON document out of a JSON, text or byte value.
fn json_of(value: &Value, target: Kind) -> Result<serde_json::Value, TypeMismatch> {
    match value {
        Value::Json(j) => Ok(j.clone()),
        Value::Text(_) | Value::Bytes(_) => {
            let Some(text) = text_of(value) else {
                return Err(mismatch(value, target, "bytes are not valid UTF-8"));
            };
            serde_json::from_str(text)
                .map_err(|e| mismatch(value, target, format!("malformed JSON {text:?}: {e}")))
        }
        _ => Err(mismatch(value, target, "not a JSON value")),
    }
}

impl FromValue for JsonMap {
    const KIND: Kind = Kind::JsonObject;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        if value.is_null() {
            return Ok(JsonMap::new());
        }
        match json_of(value, Kind::JsonObject)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(mismatch(
                value,
                Kind::JsonObject,
                format!("expected a JSON object, found {other}"),
            )),
        }
    }
}

impl ToValue for JsonMap {
    fn to_value(&self) -> Value {
        Value::Json(serde_json::Value::Object(self.clone()))
    }
}

impl FromValue for Vec<serde_json::Value> {
    const KIND: Kind = Kind::JsonArray;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        match json_of(value, Kind::JsonArray)? {
            serde_json::Value::Array(items) => Ok(items),
            other => Err(mismatch(
                value,
                Kind::JsonArray,
                format!("expected a JSON array, found {other}"),
            )),
        }
    }
}

impl ToValue for Vec<serde_json::Value> {
    fn to_value(&self) -> Value {
        Value::Json(serde_json::Value::Array(self.clone()))
    }
}

impl FromValue for serde_json::Value {
    const KIND: Kind = Kind::Any;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        if value.is_null() {
            return Ok(serde_json::Value::Null);
        }
        json_of(value, Kind::Any)
    }
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }
}

impl FromValue for Vec<u8> {
    const KIND: Kind = Kind::Any;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(mismatch(value, "bytes", "not a byte sequence")),
        }
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FromValue for f64 {
    const KIND: Kind = Kind::Any;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Null => Ok(0.0),
            Value::Float(f) => Ok(f64::from(*f)),
            Value::Double(f) => Ok(*f),
            Value::Text(_) | Value::Bytes(_) => text_of(value)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .ok_or_else(|| mismatch(value, "float64", "not a number")),
            other => other
                .as_integer()
                .map(|i| i as f64)
                .ok_or_else(|| mismatch(value, "float64", "not a number")),
        }
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Double(*self)
    }
}

impl FromValue for Value {
    const KIND: Kind = Kind::Any;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        Ok(value.clone())
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const KIND: Kind = T::KIND.nullable();

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some).map_err(|mut e| {
            e.target_kind = Self::KIND.to_string();
            e
        })
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToValue::to_value)
    }
}

/// A field stored as JSON and decoded with serde.
///
/// Covers record types the closed [`Kind`] set has no name for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> FromValue for Json<T> {
    const KIND: Kind = Kind::Any;

    fn from_value(value: &Value) -> Result<Self, TypeMismatch> {
        let doc = if value.is_null() {
            serde_json::Value::Null
        } else {
            json_of(value, Kind::Any)?
        };
        serde_json::from_value(doc)
            .map(Json)
            .map_err(|e| mismatch(value, std::any::type_name::<T>(), e.to_string()))
    }
}

impl<T: Serialize> ToValue for Json<T> {
    fn to_value(&self) -> Value {
        match serde_json::to_value(&self.0) {
            Ok(doc) => Value::Json(doc),
            Err(e) => {
                tracing::warn!(
                    ty = std::any::type_name::<T>(),
                    error = %e,
                    "JSON field failed to serialize; binding NULL"
                );
                Value::Null
            }
        }
    }
}
