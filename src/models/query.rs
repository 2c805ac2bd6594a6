//! Query-related data models.
//!
//! This module defines the gate's output type and materialized results.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;

/// One result row: column name to value, in result descriptor order.
pub type Row = serde_json::Map<String, JsonValue>;

/// SQL text that passed the safety gate.
///
/// Only [`crate::safety::QueryGate`] can construct one, so holding a
/// `ValidatedQuery` means the text is read-only and carries a `LIMIT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub(crate) fn new(sql: String) -> Self {
        Self(sql)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for ValidatedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rows returned by a validated query plus how long the statement took.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(serialize_with = "serialize_millis", rename = "execution_time_ms")]
    pub duration: Duration,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validated_query_exposes_text() {
        let query = ValidatedQuery::new("SELECT 1\nLIMIT 100;".to_string());
        assert_eq!(query.as_str(), "SELECT 1\nLIMIT 100;");
        assert_eq!(query.to_string(), "SELECT 1\nLIMIT 100;");
        assert_eq!(query.into_inner(), "SELECT 1\nLIMIT 100;");
    }

    #[test]
    fn test_query_result_serializes_millis_and_column_order() {
        let mut row = Row::new();
        row.insert("zeta".to_string(), json!(1));
        row.insert("alpha".to_string(), json!("a"));

        let result = QueryResult {
            columns: vec!["zeta".to_string(), "alpha".to_string()],
            rows: vec![row],
            duration: Duration::from_millis(1500),
        };
        assert_eq!(result.row_count(), 1);

        let value = serde_json::to_string(&result).unwrap();
        assert!(value.contains("\"execution_time_ms\":1500"));
        // insertion order survives serialization
        assert!(value.find("zeta").unwrap() < value.find("alpha").unwrap());
    }
}
