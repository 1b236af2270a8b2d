//! Argument and result value model shared by every backend adapter.
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::dialect::Dialect;
use crate::error::DbError;

/// A single SQL value: a bind argument on the way in, a scanned cell on the
/// way out. Backends convert their native representations to and from this.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Time(DateTime<Utc>),
    /// float32 vector, e.g. an embedding column
    Vector(Vec<f32>),
    /// rendered as a comma-joined literal list, never as a placeholder
    IntList(Vec<i64>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Time(v)
    }
}

impl From<Vec<f32>> for SqlValue {
    fn from(v: Vec<f32>) -> Self {
        SqlValue::Vector(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Kind-based conversion into an `i64` destination.
    pub fn as_i64(&self) -> Result<i64, DbError> {
        match self {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::Bool(v) => Ok(*v as i64),
            SqlValue::Float(v) => Ok(*v as i64),
            SqlValue::Text(s) => s
                .parse::<i64>()
                .map_err(|_| DbError::BadInput(format!("cannot scan {s:?} into i64"))),
            SqlValue::Time(t) => Ok(t.timestamp_nanos_opt().unwrap_or_default()),
            other => Err(DbError::BadInput(format!("cannot scan {other:?} into i64"))),
        }
    }

    pub fn as_f64(&self) -> Result<f64, DbError> {
        match self {
            SqlValue::Float(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v as f64),
            SqlValue::Text(s) => s
                .parse::<f64>()
                .map_err(|_| DbError::BadInput(format!("cannot scan {s:?} into f64"))),
            other => Err(DbError::BadInput(format!("cannot scan {other:?} into f64"))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, DbError> {
        match self {
            SqlValue::Bool(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v != 0),
            SqlValue::Text(s) => match s.as_str() {
                "true" | "TRUE" | "1" => Ok(true),
                "false" | "FALSE" | "0" => Ok(false),
                _ => Err(DbError::BadInput(format!("cannot scan {s:?} into bool"))),
            },
            other => Err(DbError::BadInput(format!("cannot scan {other:?} into bool"))),
        }
    }

    pub fn as_string(&self) -> Result<String, DbError> {
        match self {
            SqlValue::Text(s) => Ok(s.clone()),
            SqlValue::Int(v) => Ok(v.to_string()),
            SqlValue::Float(v) => Ok(v.to_string()),
            SqlValue::Bool(v) => Ok(v.to_string()),
            SqlValue::Uuid(u) => Ok(u.to_string()),
            SqlValue::Time(t) => Ok(t.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            other => Err(DbError::BadInput(format!(
                "cannot scan {other:?} into String"
            ))),
        }
    }

    pub fn as_bytes(&self) -> Result<Vec<u8>, DbError> {
        match self {
            SqlValue::Bytes(b) => Ok(b.clone()),
            SqlValue::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(DbError::BadInput(format!(
                "cannot scan {other:?} into bytes"
            ))),
        }
    }

    pub fn as_uuid(&self) -> Result<Uuid, DbError> {
        match self {
            SqlValue::Uuid(u) => Ok(*u),
            SqlValue::Text(s) => Uuid::parse_str(s)
                .map_err(|e| DbError::BadInput(format!("cannot scan {s:?} into uuid: {e}"))),
            SqlValue::Bytes(b) => Uuid::from_slice(b)
                .map_err(|e| DbError::BadInput(format!("cannot scan bytes into uuid: {e}"))),
            other => Err(DbError::BadInput(format!("cannot scan {other:?} into uuid"))),
        }
    }

    pub fn as_time(&self) -> Result<DateTime<Utc>, DbError> {
        match self {
            SqlValue::Time(t) => Ok(*t),
            SqlValue::Int(ns) => Ok(DateTime::<Utc>::from_timestamp_nanos(*ns)),
            SqlValue::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DbError::BadInput(format!("cannot scan {s:?} into time: {e}"))),
            other => Err(DbError::BadInput(format!("cannot scan {other:?} into time"))),
        }
    }
}

/// Render a float32 vector as the bracketed literal form `[c1,c2,...]`.
pub fn format_vector(v: &[f32]) -> String {
    let body = v
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{body}]")
}

/// Type-directed literal encoder. Every value flows through the dialect's
/// escaping path; this is the only way a value may be embedded into SQL
/// text (interpolated mode, ORDER BY vector forms, SET function calls).
pub fn sqlf(dialect: &dyn Dialect, value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => dialect.encode_bool(*b),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::Float(v) => v.to_string(),
        SqlValue::Text(s) => dialect.encode_string(s),
        SqlValue::Bytes(b) => dialect.encode_bytes(b),
        SqlValue::Uuid(u) => dialect.encode_uuid(u),
        SqlValue::Time(t) => dialect.encode_time(t),
        SqlValue::Vector(v) => dialect.encode_vector(v),
        SqlValue::IntList(vs) => vs
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_conversions() {
        assert_eq!(SqlValue::Text("42".into()).as_i64().unwrap(), 42);
        assert_eq!(SqlValue::Int(1).as_bool().unwrap(), true);
        assert_eq!(SqlValue::Int(7).as_string().unwrap(), "7");
        assert!(SqlValue::Bytes(vec![1]).as_i64().is_err());
    }

    #[test]
    fn vector_literal() {
        assert_eq!(format_vector(&[1.0, 2.5, 3.0]), "[1,2.5,3]");
        assert_eq!(format_vector(&[]), "[]");
    }
}
