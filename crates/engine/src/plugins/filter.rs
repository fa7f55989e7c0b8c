//! Record filters comparing one field against a fixed value.
//!
//! A record without the field never matches, whatever the comparison.

use std::cmp::Ordering;

use rowflow_model::{Record, Value, as_number};

use crate::stage::runtime::{RuntimeStage, StageFunction, build_stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparison {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
}

impl Comparison {
    pub fn stage_name(self) -> &'static str {
        match self {
            Comparison::Equals => "Filter.equals",
            Comparison::NotEquals => "Filter.notEquals",
            Comparison::GreaterThan => "Filter.greaterThan",
            Comparison::GreaterThanOrEqualTo => "Filter.greaterThanOrEqualTo",
            Comparison::LessThan => "Filter.lessThan",
            Comparison::LessThanOrEqualTo => "Filter.lessThanOrEqualTo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct FilterParams {
    pub field: String,
    pub value: Value,
    #[serde(default)]
    pub strict: bool,
}

pub fn matches(record: &Record, field: &str, comparison: Comparison, value: &Value, strict: bool) -> bool {
    let Some(actual) = record.get(field) else {
        return false;
    };
    match comparison {
        Comparison::Equals => equal(actual, value, strict),
        Comparison::NotEquals => !equal(actual, value, strict),
        Comparison::GreaterThan => order(actual, value) == Some(Ordering::Greater),
        Comparison::GreaterThanOrEqualTo => {
            matches!(order(actual, value), Some(Ordering::Greater | Ordering::Equal))
        }
        Comparison::LessThan => order(actual, value) == Some(Ordering::Less),
        Comparison::LessThanOrEqualTo => {
            matches!(order(actual, value), Some(Ordering::Less | Ordering::Equal))
        }
    }
}

/// Strict equality compares JSON values as they are; loose equality also
/// treats numeric strings as the number they spell.
fn equal(actual: &Value, expected: &Value, strict: bool) -> bool {
    if strict || actual == expected {
        return actual == expected;
    }
    match (actual, expected) {
        (Value::String(_) | Value::Number(_) | Value::Bool(_), Value::String(_) | Value::Number(_) | Value::Bool(_)) => {
            match (as_number(actual), as_number(expected)) {
                (Some(left), Some(right)) => left == right,
                _ => false,
            }
        }
        _ => false,
    }
}

fn order(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::String(left), Value::String(right)) => Some(left.as_str().cmp(right.as_str())),
        (Value::Number(_) | Value::String(_), Value::Number(_))
        | (Value::Number(_), Value::String(_)) => {
            as_number(actual)?.partial_cmp(&as_number(expected)?)
        }
        _ => None,
    }
}

pub fn filter(comparison: Comparison, params: FilterParams) -> RuntimeStage {
    let FilterParams { field, value, strict } = params;
    build_stage(
        comparison.stage_name(),
        StageFunction::filter(move |record| matches(record, &field, comparison, &value, strict)),
        None,
    )
}

pub fn equals(field: impl Into<String>, value: impl Into<Value>, strict: bool) -> RuntimeStage {
    filter(Comparison::Equals, params(field, value, strict))
}

pub fn not_equals(field: impl Into<String>, value: impl Into<Value>, strict: bool) -> RuntimeStage {
    filter(Comparison::NotEquals, params(field, value, strict))
}

pub fn greater_than(field: impl Into<String>, value: impl Into<Value>) -> RuntimeStage {
    filter(Comparison::GreaterThan, params(field, value, false))
}

pub fn greater_than_or_equal_to(field: impl Into<String>, value: impl Into<Value>) -> RuntimeStage {
    filter(Comparison::GreaterThanOrEqualTo, params(field, value, false))
}

pub fn less_than(field: impl Into<String>, value: impl Into<Value>) -> RuntimeStage {
    filter(Comparison::LessThan, params(field, value, false))
}

pub fn less_than_or_equal_to(field: impl Into<String>, value: impl Into<Value>) -> RuntimeStage {
    filter(Comparison::LessThanOrEqualTo, params(field, value, false))
}

fn params(field: impl Into<String>, value: impl Into<Value>, strict: bool) -> FilterParams {
    FilterParams {
        field: field.into(),
        value: value.into(),
        strict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{records, run_stage};
    use rowflow_model::json;

    fn check(record: Value, comparison: Comparison, value: Value, strict: bool) -> bool {
        let record = Record::try_from(record).unwrap();
        matches(&record, "v", comparison, &value, strict)
    }

    #[test]
    fn loose_and_strict_equality() {
        assert!(check(json!({"v": "30"}), Comparison::Equals, json!(30), false));
        assert!(!check(json!({"v": "30"}), Comparison::Equals, json!(30), true));
        assert!(check(json!({"v": 30}), Comparison::Equals, json!(30.0), false));
        assert!(check(json!({"v": "x"}), Comparison::NotEquals, json!("y"), true));
        assert!(!check(json!({"v": "x"}), Comparison::NotEquals, json!("x"), false));
    }

    #[test]
    fn missing_field_never_matches() {
        for comparison in [Comparison::Equals, Comparison::NotEquals, Comparison::LessThan] {
            assert!(!check(json!({"other": 1}), comparison, json!(1), false));
        }
    }

    #[test]
    fn ordered_comparisons() {
        assert!(check(json!({"v": "31"}), Comparison::GreaterThan, json!(30), false));
        assert!(check(json!({"v": 30}), Comparison::GreaterThanOrEqualTo, json!(30), false));
        assert!(check(json!({"v": "abc"}), Comparison::LessThan, json!("abd"), false));
        assert!(check(json!({"v": 2.5}), Comparison::LessThanOrEqualTo, json!("2.5"), false));
        // mixed kinds do not compare
        assert!(!check(json!({"v": "abc"}), Comparison::GreaterThan, json!(1), false));
        assert!(!check(json!({"v": null}), Comparison::LessThan, json!(1), false));
        assert!(!check(json!({"v": true}), Comparison::GreaterThan, json!(0), false));
    }

    #[tokio::test]
    async fn greater_than_keeps_order() -> anyhow::Result<()> {
        let input = records(json!([{"age": 25}, {"age": 35}, {"age": 31}]));
        let outcome = run_stage(greater_than("age", 30), input).await;
        outcome.result.clone()?;
        assert_eq!(outcome.records(), records(json!([{"age": 35}, {"age": 31}])));
        Ok(())
    }
}
