//! SQL value types for destination rows.
//!
//! Source documents are schema-flexible BSON; destination rows are flat
//! column → [`SqlValue`] maps. The PostgreSQL writer streams them through
//! `COPY ... FORMAT TEXT`, so the server parses each field into whatever
//! column type the destination schema declares.

use std::collections::BTreeMap;

use bson::Bson;
use chrono::{DateTime, SecondsFormat, Utc};


/// A flat destination row keyed by column name.
///
/// `BTreeMap` keeps column order deterministic, which matters when a batch
/// of rows is streamed under a single `COPY` column list.
pub type Row = BTreeMap<String, SqlValue>;

/// SQL value for a destination column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 32-bit signed integer.
    I32(i32),

    /// 64-bit signed integer (all allocated ids use this).
    I64(i64),

    /// Double precision float.
    F64(f64),

    /// Text data.
    Text(String),

    /// Structured data written to json/jsonb columns.
    Json(serde_json::Value),

    /// Timestamp with time zone.
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Convert a BSON field value into a destination value.
    ///
    /// Object ids become their hex string, embedded documents and arrays
    /// become relaxed extended JSON.
    pub fn from_bson(value: &Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined => SqlValue::Null,
            Bson::Boolean(b) => SqlValue::Bool(*b),
            Bson::Int32(n) => SqlValue::I32(*n),
            Bson::Int64(n) => SqlValue::I64(*n),
            Bson::Double(f) => SqlValue::F64(*f),
            Bson::String(s) => SqlValue::Text(s.clone()),
            Bson::ObjectId(oid) => SqlValue::Text(oid.to_hex()),
            Bson::DateTime(dt) => SqlValue::Timestamp(dt.to_chrono()),
            Bson::Document(_) | Bson::Array(_) => SqlValue::Json(value.clone().into_relaxed_extjson()),
            other => SqlValue::Text(other.to_string()),
        }
    }

    /// Wrap any BSON value as JSON, regardless of its shape.
    pub fn json_from_bson(value: &Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined => SqlValue::Null,
            other => SqlValue::Json(other.clone().into_relaxed_extjson()),
        }
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, if it holds one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I32(n) => Some(i64::from(*n)),
            SqlValue::I64(n) => Some(*n),
            _ => None,
        }
    }

    /// Render the value as one field of a `COPY ... FORMAT TEXT` line.
    pub fn to_copy_text(&self) -> String {
        match self {
            SqlValue::Null => "\\N".to_string(),
            SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
            SqlValue::I32(n) => n.to_string(),
            SqlValue::I64(n) => n.to_string(),
            SqlValue::F64(f) if f.is_nan() => "NaN".to_string(),
            SqlValue::F64(f) if f.is_infinite() => {
                if *f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
            }
            SqlValue::F64(f) => f.to_string(),
            SqlValue::Text(s) => escape_copy_text(s),
            SqlValue::Json(v) => escape_copy_text(&v.to_string()),
            SqlValue::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

/// Escape text for PostgreSQL COPY.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => SqlValue::Null,
            serde_json::Value::Bool(b) => SqlValue::Bool(b),
            serde_json::Value::String(s) => SqlValue::Text(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::I64(i),
                None => SqlValue::F64(n.as_f64().unwrap_or_default()),
            },
            other => SqlValue::Json(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn test_from_bson_scalars() {
        assert_eq!(SqlValue::from_bson(&Bson::Null), SqlValue::Null);
        assert_eq!(SqlValue::from_bson(&Bson::Int32(4)), SqlValue::I32(4));
        assert_eq!(
            SqlValue::from_bson(&Bson::String("Alpha".into())),
            SqlValue::Text("Alpha".into())
        );
    }

    #[test]
    fn test_from_bson_object_id_is_hex() {
        let oid = ObjectId::parse_str("5f1a2b3c4d5e6f7081920a1b").unwrap();
        assert_eq!(
            SqlValue::from_bson(&Bson::ObjectId(oid)),
            SqlValue::Text("5f1a2b3c4d5e6f7081920a1b".into())
        );
    }

    #[test]
    fn test_from_bson_document_is_json() {
        let value = Bson::Document(bson::doc! { "a": 1 });
        assert_eq!(
            SqlValue::from_bson(&value),
            SqlValue::Json(serde_json::json!({ "a": 1 }))
        );
    }

    #[test]
    fn test_copy_text_rendering() {
        assert_eq!(SqlValue::Null.to_copy_text(), "\\N");
        assert_eq!(SqlValue::I64(7).to_copy_text(), "7");
        assert_eq!(SqlValue::Bool(false).to_copy_text(), "f");
        assert_eq!(SqlValue::from("it's").to_copy_text(), "it's");
        assert_eq!(
            SqlValue::Json(serde_json::json!({"k": "v"})).to_copy_text(),
            "{\"k\":\"v\"}"
        );
        assert_eq!(SqlValue::F64(f64::NAN).to_copy_text(), "NaN");
        assert_eq!(SqlValue::F64(f64::NEG_INFINITY).to_copy_text(), "-Infinity");
    }

    #[test]
    fn test_copy_text_escapes_control_characters() {
        assert_eq!(
            SqlValue::from("a\\'); DROP TABLE x; --").to_copy_text(),
            "a\\\\'); DROP TABLE x; --"
        );
        assert_eq!(SqlValue::from("col\tline\r\n").to_copy_text(), "col\\tline\\r\\n");
        assert_eq!(SqlValue::from("\\N").to_copy_text(), "\\\\N");
        assert_eq!(
            SqlValue::Json(serde_json::json!({"path": "C:\\tmp"})).to_copy_text(),
            "{\"path\":\"C:\\\\\\\\tmp\"}"
        );
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i64> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3i64)), SqlValue::I64(3));
    }
}
