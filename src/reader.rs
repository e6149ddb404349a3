use std::collections::VecDeque;

use rusqlite::types::ValueRef;
use serde_json::Value;

/// Forward-only view over the rows produced by the final statement of a
/// command.
///
/// Rows are materialized up front and handed over as JSON values, so the
/// reader holds no borrow of the connection. Skip emulation lives here: the
/// reader is constructed with the number of leading rows the rewriter removed
/// from the statement text, and discards them before exposing anything.
#[derive(Debug, Clone, PartialEq)]
pub struct JetDataReader {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
}

impl JetDataReader {
    pub(crate) fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, skip: usize) -> Self {
        JetDataReader {
            columns,
            rows: rows.into_iter().skip(skip).collect(),
        }
    }

    /// A reader with no columns and no rows, for commands whose final
    /// statement produced nothing (empty text, suppressed guard).
    pub(crate) fn empty() -> Self {
        JetDataReader {
            columns: Vec::new(),
            rows: VecDeque::new(),
        }
    }

    /// Column names of the result, in select-list order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows not yet consumed.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether any rows remain to be read.
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Consumes the reader into one JSON object per row, keyed by column name.
    pub fn json_rows(self) -> Vec<Value> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| {
                let mut object = serde_json::Map::new();
                for (name, value) in columns.iter().zip(row) {
                    object.insert(name.clone(), value);
                }
                Value::Object(object)
            })
            .collect()
    }
}

impl Iterator for JetDataReader {
    type Item = Vec<Value>;

    fn next(&mut self) -> Option<Vec<Value>> {
        self.rows.pop_front()
    }
}

/// Maps a raw SQLite value to its JSON representation: integers and reals to
/// numbers (non-finite reals to null), text to strings, blobs to arrays of
/// byte values.
pub(crate) fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(r) => serde_json::Number::from_f64(r)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => {
            Value::Array(b.iter().map(|&byte| Value::Number(byte.into())).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(skip: usize) -> JetDataReader {
        JetDataReader::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![json!(1), json!("a")],
                vec![json!(2), json!("b")],
                vec![json!(3), json!("c")],
            ],
            skip,
        )
    }

    #[test]
    fn test_reader_yields_rows_in_order() {
        let mut reader = sample(0);
        assert_eq!(reader.columns(), &["id".to_string(), "name".to_string()]);
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.next(), Some(vec![json!(1), json!("a")]));
        assert_eq!(reader.next(), Some(vec![json!(2), json!("b")]));
        assert!(reader.has_rows());
        assert_eq!(reader.next(), Some(vec![json!(3), json!("c")]));
        assert_eq!(reader.next(), None);
        assert!(!reader.has_rows());
    }

    #[test]
    fn test_skip_discards_leading_rows() {
        let mut reader = sample(2);
        assert_eq!(reader.len(), 1);
        assert_eq!(reader.next(), Some(vec![json!(3), json!("c")]));
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn test_skip_past_the_end_leaves_nothing() {
        let reader = sample(10);
        assert!(reader.is_empty());
        assert_eq!(reader.column_count(), 2);
    }

    #[test]
    fn test_json_rows_keyed_by_column() {
        let rows = sample(1).json_rows();
        assert_eq!(
            rows,
            vec![
                json!({"id": 2, "name": "b"}),
                json!({"id": 3, "name": "c"}),
            ]
        );
    }

    #[test]
    fn test_value_ref_mapping() {
        assert_eq!(value_ref_to_json(ValueRef::Null), json!(null));
        assert_eq!(value_ref_to_json(ValueRef::Integer(9)), json!(9));
        assert_eq!(value_ref_to_json(ValueRef::Real(2.5)), json!(2.5));
        assert_eq!(value_ref_to_json(ValueRef::Text(b"hey")), json!("hey"));
        assert_eq!(
            value_ref_to_json(ValueRef::Blob(&[0, 128, 255])),
            json!([0, 128, 255])
        );
        assert_eq!(value_ref_to_json(ValueRef::Real(f64::NAN)), json!(null));
    }
}
