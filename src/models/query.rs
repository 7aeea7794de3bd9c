//! Query-related data models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One result row, keyed by column name in column order.
pub type RowMap = Map<String, JsonValue>;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    /// Stored as i64 for maximum range
    Int(i64),
    Float(f64),
    String(String),
    /// Arrays and objects, bound as the engine's JSON type or as text
    Json(JsonValue),
}

impl QueryParam {
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
            Self::Json(_) => "json",
        }
    }
}

impl From<&JsonValue> for QueryParam {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                // u64 beyond i64::MAX and fractions
                None => n
                    .as_f64()
                    .map(Self::Float)
                    .unwrap_or_else(|| Self::String(n.to_string())),
            },
            JsonValue::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }
}

/// Normalized result of running a statement or batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<RowMap>,
    pub columns: Vec<String>,
    /// Rows returned, or rows affected when the statement returns none
    pub row_count: u64,
}

impl QueryResult {
    pub fn from_rows(columns: Vec<String>, rows: Vec<RowMap>) -> Self {
        let row_count = rows.len() as u64;
        Self {
            rows,
            columns,
            row_count,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            columns: Vec::new(),
            row_count: rows_affected,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_param_from_json() {
        assert_eq!(QueryParam::from(&json!(null)), QueryParam::Null);
        assert_eq!(QueryParam::from(&json!(true)), QueryParam::Bool(true));
        assert_eq!(QueryParam::from(&json!(42)), QueryParam::Int(42));
        assert_eq!(QueryParam::from(&json!(1.5)), QueryParam::Float(1.5));
        assert_eq!(
            QueryParam::from(&json!("x")),
            QueryParam::String("x".into())
        );
        assert_eq!(
            QueryParam::from(&json!({"a": 1})).type_name(),
            "json"
        );
    }

    #[test]
    fn test_query_result_json_shape() {
        let mut row = RowMap::new();
        row.insert("id".into(), json!(1));
        row.insert("name".into(), json!("alice"));
        let result = QueryResult::from_rows(vec!["id".into(), "name".into()], vec![row]);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["rowCount"], 1);
        assert_eq!(value["columns"], json!(["id", "name"]));
        assert_eq!(value["rows"][0]["name"], "alice");
    }

    #[test]
    fn test_row_map_keeps_column_order() {
        let mut row = RowMap::new();
        row.insert("zeta".into(), json!(1));
        row.insert("alpha".into(), json!(2));
        let keys: Vec<_> = row.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_affected_result() {
        let result = QueryResult::affected(3);
        assert!(result.is_empty());
        assert_eq!(result.row_count, 3);
    }
}
