// ABOUTME: Record type: an ordered column-name to value mapping
// ABOUTME: Conversions from database rows and JSON objects, and key-set comparison

use crate::value::Value;
use std::collections::BTreeSet;
use tokio_postgres::Row;

/// One row of data, keyed by column name.
///
/// Column order is preserved as inserted. Setting an existing column replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Set a column, returning the previous value if the column existed.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let column = column.into();
        let value = value.into();
        match self.position(&column) {
            Some(idx) => Some(std::mem::replace(&mut self.values[idx], value)),
            None => {
                self.columns.push(column);
                self.values.push(value);
                None
            }
        }
    }

    /// Builder-style variant of [`Record::insert`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|idx| &self.values[idx])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Set of column names, independent of insertion order.
    pub fn key_set(&self) -> BTreeSet<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    /// Values for `columns` in that order. Missing columns yield NULL.
    pub fn values_for<'a>(&'a self, columns: &'a [String]) -> impl Iterator<Item = &'a Value> + 'a {
        columns
            .iter()
            .map(move |column| self.get(column).unwrap_or(&Value::Null))
    }

    /// Decode every column of a result row.
    pub fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        let mut record = Record::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            let value: Value = row.try_get(idx)?;
            record.columns.push(column.name().to_string());
            record.values.push(value);
        }
        Ok(record)
    }

    pub fn from_json_object(object: serde_json::Map<String, serde_json::Value>) -> Self {
        object
            .into_iter()
            .map(|(column, value)| (column, Value::from_json(value)))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let object: serde_json::Map<String, serde_json::Value> = self
            .iter()
            .map(|(column, value)| (column.to_string(), value.to_json()))
            .collect();
        serde_json::Value::Object(object)
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut record = Record::new().with("a", 1).with("b", "x");
        let previous = record.insert("a", 2);
        assert_eq!(previous, Some(Value::Int(1)));
        assert_eq!(record.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(record.get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_key_set_ignores_order() {
        let first = Record::new().with("a", 1).with("b", 2);
        let second = Record::new().with("b", 5).with("a", 6);
        assert_eq!(first.key_set(), second.key_set());
    }

    #[test]
    fn test_values_for_fills_missing_with_null() {
        let record = Record::new().with("a", 1);
        let columns = vec!["b".to_string(), "a".to_string()];
        let values: Vec<&Value> = record.values_for(&columns).collect();
        assert_eq!(values, vec![&Value::Null, &Value::Int(1)]);
    }

    #[test]
    fn test_json_object_round_trip() {
        let json = serde_json::json!({"business_key": "app-42", "revenue": 10, "note": null});
        let record = match json.clone() {
            serde_json::Value::Object(map) => Record::from_json_object(map),
            _ => unreachable!(),
        };
        assert_eq!(record.get("revenue"), Some(&Value::Int(10)));
        assert_eq!(record.get("note"), Some(&Value::Null));
        assert_eq!(record.to_json(), json);
    }
}
