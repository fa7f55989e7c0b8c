use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "asc", alias = "ascending")]
    Ascending,
    #[serde(rename = "desc", alias = "descending")]
    Descending,
}

impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Ascending),
            "desc" | "descending" => Ok(Direction::Descending),
            other => anyhow::bail!("unknown sort direction: {other}"),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Ascending => f.write_str("asc"),
            Direction::Descending => f.write_str("desc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// Ordered list of sort keys, compared lexicographically: the first key on
/// which two records differ decides their order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortKeySpec(Vec<SortKey>);

impl SortKeySpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        SortKeySpec(keys)
    }

    /// Pairs field names with directions positionally. Fields without a
    /// matching direction sort ascending.
    pub fn from_pairs<F, D>(fields: F, directions: D) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
        D: IntoIterator<Item = Direction>,
    {
        let mut directions = directions.into_iter();
        let keys = fields
            .into_iter()
            .map(|field| SortKey {
                field: field.into(),
                direction: directions.next().unwrap_or_default(),
            })
            .collect();
        SortKeySpec(keys)
    }

    /// Parses `field[:asc|:desc]` entries separated by commas,
    /// e.g. `last_name:asc,age:desc`.
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let mut keys = Vec::new();
        for entry in spec.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let key = match entry.split_once(':') {
                Some((field, direction)) => SortKey {
                    field: field.trim().to_owned(),
                    direction: direction.parse()?,
                },
                None => SortKey::asc(entry),
            };
            if key.field.is_empty() {
                anyhow::bail!("empty field name in sort spec: {spec}");
            }
            keys.push(key);
        }
        Ok(SortKeySpec(keys))
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn compare(&self, left: &Record, right: &Record) -> Ordering {
        for key in &self.0 {
            let ordering = compare_values(left.get(&key.field), right.get(&key.field));
            let ordering = match key.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl std::fmt::Display for SortKeySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", key.field, key.direction)?;
        }
        Ok(())
    }
}

impl FromIterator<SortKey> for SortKeySpec {
    fn from_iter<T: IntoIterator<Item = SortKey>>(iter: T) -> Self {
        SortKeySpec(iter.into_iter().collect())
    }
}

/// Total order over optional JSON values.
///
/// Absent sorts lowest, then null, booleans, numbers, strings, arrays and
/// objects. Values of the same kind compare naturally; arrays and objects
/// compare element by element.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => compare_present(left, right),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_present(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(left), Value::Bool(right)) => left.cmp(right),
        (Value::Number(left), Value::Number(right)) => compare_numbers(left, right),
        (Value::String(left), Value::String(right)) => left.cmp(right),
        (Value::Array(left), Value::Array(right)) => left
            .iter()
            .zip(right.iter())
            .map(|(left, right)| compare_present(left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| left.len().cmp(&right.len())),
        (Value::Object(left), Value::Object(right)) => left
            .iter()
            .zip(right.iter())
            .map(|((left_key, left), (right_key, right))| {
                left_key.cmp(right_key).then_with(|| compare_present(left, right))
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| left.len().cmp(&right.len())),
        _ => rank(left).cmp(&rank(right)),
    }
}

fn compare_numbers(left: &serde_json::Number, right: &serde_json::Number) -> Ordering {
    match (integer(left), integer(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(left), None) => compare_integer_float(left, right.as_f64().unwrap_or(f64::NAN)),
        (None, Some(right)) => compare_integer_float(right, left.as_f64().unwrap_or(f64::NAN)).reverse(),
        (None, None) => {
            let left = left.as_f64().unwrap_or(f64::NAN);
            let right = right.as_f64().unwrap_or(f64::NAN);
            left.total_cmp(&right)
        }
    }
}

fn integer(number: &serde_json::Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

/// Exact comparison, so mixed integer and float keys stay transitive past 2^53.
fn compare_integer_float(integer: i128, float: f64) -> Ordering {
    const BOUND: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0; // 2^127
    if float.is_nan() {
        return Ordering::Less;
    }
    if float >= BOUND {
        return Ordering::Less;
    }
    if float < -BOUND {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    // `whole` is integral and inside i128's range, so the cast is exact.
    integer.cmp(&(whole as i128)).then_with(|| 0.0_f64.total_cmp(&(float - whole)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[test]
    fn parse_sort_spec() {
        let spec = SortKeySpec::parse("last_name, age:desc").unwrap();
        assert_eq!(
            spec.keys(),
            [SortKey::asc("last_name"), SortKey::desc("age")]
        );
        assert_eq!(spec.to_string(), "last_name:asc,age:desc");
        assert!(SortKeySpec::parse("age:sideways").is_err());
        assert!(SortKeySpec::parse(":asc").is_err());
    }

    #[test]
    fn positional_directions_default_to_ascending() {
        let spec = SortKeySpec::from_pairs(["a", "b"], [Direction::Descending]);
        assert_eq!(spec.keys(), [SortKey::desc("a"), SortKey::asc("b")]);
    }

    #[test]
    fn first_differing_key_decides() {
        let spec = SortKeySpec::parse("last_name,age:desc").unwrap();
        let older = record(json!({"last_name": "A", "age": 40}));
        let younger = record(json!({"last_name": "A", "age": 20}));
        let other = record(json!({"last_name": "B", "age": 90}));
        assert_eq!(spec.compare(&older, &younger), Ordering::Less);
        assert_eq!(spec.compare(&younger, &other), Ordering::Less);
        assert_eq!(spec.compare(&older, &older.clone()), Ordering::Equal);
    }

    #[test]
    fn missing_field_sorts_lowest() {
        let spec = SortKeySpec::parse("age").unwrap();
        let missing = record(json!({"name": "x"}));
        let null = record(json!({"age": null}));
        let present = record(json!({"age": 1}));
        assert_eq!(spec.compare(&missing, &null), Ordering::Less);
        assert_eq!(spec.compare(&null, &present), Ordering::Less);

        let spec = SortKeySpec::parse("age:desc").unwrap();
        assert_eq!(spec.compare(&missing, &present), Ordering::Greater);
    }

    #[test]
    fn numbers_compare_numerically() {
        assert_eq!(
            compare_values(Some(&json!(9)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!(2.5)), Some(&json!(2))),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(Some(&json!("9")), Some(&json!(10))),
            Ordering::Greater
        );
    }

    #[test]
    fn mixed_numbers_compare_exactly() {
        let two_53 = 9_007_199_254_740_992_i64;
        let int = |n: i64| json!(n);
        let float = json!(two_53 as f64);
        let cmp = |left: &Value, right: &Value| compare_values(Some(left), Some(right));

        assert_eq!(cmp(&int(two_53 + 1), &float), Ordering::Greater);
        assert_eq!(cmp(&float, &int(two_53)), Ordering::Equal);
        assert_eq!(cmp(&int(two_53 + 1), &int(two_53)), Ordering::Greater);
        assert_eq!(cmp(&int(2), &json!(2.5)), Ordering::Less);
        assert_eq!(cmp(&int(-3), &json!(-2.5)), Ordering::Less);
        assert_eq!(cmp(&json!(u64::MAX), &int(-1)), Ordering::Greater);
        assert_eq!(cmp(&json!(1e300), &json!(u64::MAX)), Ordering::Greater);
    }
}
