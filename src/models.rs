//! Query parameter and result types.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A parameter value for parameterized queries.
///
/// Parameters are always bound through driver placeholders, never
/// interpolated into statement text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for QueryParam {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A single result row: column name to JSON value, in column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// Materialized rows from a read statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRows {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Rows as maps keyed by column name, key order matching `columns`.
    pub rows: Vec<Row>,
}

impl QueryRows {
    /// An empty result set.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of a committed write statement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Number of rows the statement affected.
    pub rows_affected: u64,
    /// Identifier generated by the last insert, when the statement produced
    /// one.
    pub last_insert_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(QueryParam::from("hello").type_name(), "string");
    }

    #[test]
    fn test_query_param_from_conversions() {
        assert!(matches!(QueryParam::from(7i32), QueryParam::Int(7)));
        assert!(matches!(QueryParam::from(true), QueryParam::Bool(true)));
        assert!(matches!(QueryParam::from(1.5f64), QueryParam::Float(_)));
    }

    #[test]
    fn test_query_rows_empty() {
        let rows = QueryRows::empty();
        assert!(rows.is_empty());
        assert_eq!(rows.row_count(), 0);
    }

    #[test]
    fn test_bytes_param_serializes_as_base64() {
        let param = QueryParam::Bytes(vec![1, 2, 3]);
        let json = serde_json::to_string(&param).expect("serialize");
        assert_eq!(json, "\"AQID\"");
    }
}
