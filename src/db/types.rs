//! Result row and cell representations
//!
//! The gateway returns rows as JSON, so the cell model is deliberately small:
//! enough variants to keep numbers as numbers, everything else as text.

use serde::Serialize;

/// A single row of query results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SqlRow {
    /// Cell values in column order
    pub values: Vec<CellValue>,
}

impl SqlRow {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A cell value (single column value in a row)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    /// NULL value
    Null,

    /// Boolean value
    Boolean(bool),

    /// Integer value
    Integer(i64),

    /// Floating point value
    Float(f64),

    /// Text/string value (also the fallback for exotic server types)
    Text(String),

    /// JSON value (parsed)
    Json(serde_json::Value),
}

impl CellValue {
    /// Check if this is a NULL value
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Render the cell as a merge key for rank aggregation.
    pub fn key_string(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Json(v) => v.to_string(),
        }
    }

    /// Interpret the cell as a rank score, if it is numeric (or numeric text).
    pub fn score(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Boolean(_) | CellValue::Null | CellValue::Json(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_from_numeric_variants() {
        assert_eq!(CellValue::Integer(3).score(), Some(3.0));
        assert_eq!(CellValue::Float(0.5).score(), Some(0.5));
        assert_eq!(CellValue::Text("12.25".to_string()).score(), Some(12.25));
    }

    #[test]
    fn test_score_from_non_numeric_is_none() {
        assert_eq!(CellValue::Text("n/a".to_string()).score(), None);
        assert_eq!(CellValue::Null.score(), None);
        assert_eq!(CellValue::Boolean(true).score(), None);
    }

    #[test]
    fn test_key_string_variants() {
        assert_eq!(CellValue::Text("alpha".to_string()).key_string(), "alpha");
        assert_eq!(CellValue::Integer(7).key_string(), "7");
        assert_eq!(CellValue::Null.key_string(), "NULL");
    }

    #[test]
    fn test_row_serializes_as_array() {
        let row = SqlRow::new(vec![
            CellValue::Text("a".to_string()),
            CellValue::Integer(1),
            CellValue::Null,
        ]);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"["a",1,null]"#);
    }
}
