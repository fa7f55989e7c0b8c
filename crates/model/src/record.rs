use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single row flowing through a pipeline.
///
/// Fields keep their insertion order. Records carry no schema: two records
/// in the same sequence may have different field sets, and reading a field
/// that is not there yields `None` rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(Map::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Sets `field`, returning the previous value. An existing field keeps
    /// its position.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Builder form of [`Record::insert`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(field, value)| (field.as_str(), value))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl TryFrom<Value> for Record {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Record(map)),
            other => anyhow::bail!("expected a JSON object, found: {other}"),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Record(
            iter.into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }
}

/// Reads a value as a number the way loosely-typed inputs expect: JSON
/// numbers as-is, numeric strings parsed, booleans as 0/1.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                text.parse::<f64>().ok().filter(|number| number.is_finite())
            }
        }
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Converts a computed number back into a JSON value, keeping integral
/// results as integers.
pub fn number_value(number: f64) -> Option<Value> {
    if !number.is_finite() {
        return None;
    }
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        return Some(Value::from(number as i64));
    }
    serde_json::Number::from_f64(number).map(Value::Number)
}

/// Parses a JSON array of objects into records.
pub fn records_from_json(value: Value) -> anyhow::Result<Vec<Record>> {
    let Value::Array(rows) = value else {
        anyhow::bail!("expected a JSON array of objects");
    };
    rows.into_iter().map(Record::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_field_is_absent() {
        let record = Record::new().with("age", 25);
        assert_eq!(record.get("age"), Some(&json!(25)));
        assert_eq!(record.get("salary"), None);
        assert!(!record.contains("salary"));
    }

    #[test]
    fn insertion_order_is_kept() {
        let record = Record::new()
            .with("last_name", "B")
            .with("first_name", "A")
            .with("age", 3);
        let fields: Vec<_> = record.fields().collect();
        assert_eq!(fields, ["last_name", "first_name", "age"]);
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(Record::try_from(json!([1, 2])).is_err());
        assert!(records_from_json(json!({"a": 1})).is_err());
    }

    #[test]
    fn loose_numbers() {
        assert_eq!(as_number(&json!(" 30 ")), Some(30.0));
        assert_eq!(as_number(&json!(true)), Some(1.0));
        assert_eq!(as_number(&json!("thirty")), None);
        assert_eq!(as_number(&json!("")), None);
        assert_eq!(as_number(&json!(null)), None);
    }

    #[test]
    fn integral_results_stay_integers() {
        assert_eq!(number_value(45.0), Some(json!(45)));
        assert_eq!(number_value(2.5), Some(json!(2.5)));
        assert_eq!(number_value(f64::INFINITY), None);
    }
}
