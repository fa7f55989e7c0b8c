use rowflow_model::{Record, Value, as_number, number_value};

use crate::error::MalformedInput;
use crate::stage::runtime::{RuntimeStage, StageFunction, build_stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    pub fn stage_name(self) -> &'static str {
        match self {
            Operation::Add => "Calculator.add",
            Operation::Subtract => "Calculator.subtract",
            Operation::Multiply => "Calculator.multiply",
            Operation::Divide => "Calculator.divide",
        }
    }

    fn apply(self, left: f64, right: f64) -> Result<f64, MalformedInput> {
        match self {
            Operation::Add => Ok(left + right),
            Operation::Subtract => Ok(left - right),
            Operation::Multiply => Ok(left * right),
            Operation::Divide if right == 0.0 => Err(MalformedInput::new("division by zero")),
            Operation::Divide => Ok(left / right),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ArithmeticParams {
    pub field: String,
    pub operand: f64,
    /// Field receiving the result; the input field when absent.
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ConcatParams {
    pub fields: Vec<String>,
    #[serde(default)]
    pub separator: String,
    pub target: String,
}

pub fn calculate(record: &mut Record, operation: Operation, params: &ArithmeticParams) -> Result<(), MalformedInput> {
    let value = record
        .get(&params.field)
        .ok_or_else(|| MalformedInput(format!("field `{}` is missing", params.field)))?;
    let number = as_number(value)
        .ok_or_else(|| MalformedInput(format!("field `{}` is not numeric: {value}", params.field)))?;
    let result = operation.apply(number, params.operand)?;
    let result = number_value(result)
        .ok_or_else(|| MalformedInput(format!("result for `{}` is not a finite number", params.field)))?;
    let target = params.target.as_deref().unwrap_or(&params.field);
    record.insert(target, result);
    Ok(())
}

pub fn arithmetic(operation: Operation, params: ArithmeticParams) -> RuntimeStage {
    build_stage(
        operation.stage_name(),
        StageFunction::map_sync(move |mut record| {
            calculate(&mut record, operation, &params)?;
            Ok(Some(record))
        }),
        None,
    )
}

pub fn add(field: impl Into<String>, operand: f64, target: Option<&str>) -> RuntimeStage {
    arithmetic(Operation::Add, params(field, operand, target))
}

pub fn subtract(field: impl Into<String>, operand: f64, target: Option<&str>) -> RuntimeStage {
    arithmetic(Operation::Subtract, params(field, operand, target))
}

pub fn multiply(field: impl Into<String>, operand: f64, target: Option<&str>) -> RuntimeStage {
    arithmetic(Operation::Multiply, params(field, operand, target))
}

pub fn divide(field: impl Into<String>, operand: f64, target: Option<&str>) -> RuntimeStage {
    arithmetic(Operation::Divide, params(field, operand, target))
}

fn params(field: impl Into<String>, operand: f64, target: Option<&str>) -> ArithmeticParams {
    ArithmeticParams {
        field: field.into(),
        operand,
        target: target.map(str::to_owned),
    }
}

/// Joins the listed fields into `target`. Missing and null fields are left
/// out; strings are used as is, other values in their JSON form.
pub fn concat(params: ConcatParams) -> RuntimeStage {
    let ConcatParams {
        fields,
        separator,
        target,
    } = params;
    build_stage(
        "Calculator.concat",
        StageFunction::map_sync(move |mut record| {
            let parts: Vec<String> = fields
                .iter()
                .filter_map(|field| match record.get(field)? {
                    Value::Null => None,
                    Value::String(text) => Some(text.clone()),
                    other => Some(other.to_string()),
                })
                .collect();
            record.insert(target.as_str(), parts.join(&separator));
            Ok(Some(record))
        }),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{records, run_stage};
    use rowflow_model::json;

    #[tokio::test]
    async fn arithmetic_writes_target_field() -> anyhow::Result<()> {
        let input = records(json!([{"salary": "1000"}, {"salary": 2500}]));
        let outcome = run_stage(multiply("salary", 1.5, Some("raised")), input).await;
        outcome.result.clone()?;
        assert_eq!(
            outcome.records(),
            records(json!([
                {"salary": "1000", "raised": 1500},
                {"salary": 2500, "raised": 3750},
            ]))
        );
        Ok(())
    }

    #[tokio::test]
    async fn bad_operands_are_skipped() -> anyhow::Result<()> {
        let input = records(json!([{"n": 4}, {"n": "four"}, {"m": 1}, {"n": 2}]));
        let outcome = run_stage(divide("n", 2.0, None), input).await;
        outcome.result.clone()?;
        assert_eq!(outcome.records(), records(json!([{"n": 2}, {"n": 1}])));
        Ok(())
    }

    #[test]
    fn division_by_zero_is_malformed() {
        let mut record = Record::new().with("n", 1);
        let error = calculate(&mut record, Operation::Divide, &params("n", 0.0, None)).unwrap_err();
        assert_eq!(error.0, "division by zero");
        assert_eq!(record.get("n"), Some(&json!(1)));
    }

    #[test]
    fn fractional_results_stay_fractional() -> anyhow::Result<()> {
        let mut record = Record::new().with("n", 1);
        calculate(&mut record, Operation::Subtract, &params("n", 0.25, None))?;
        assert_eq!(record.get("n"), Some(&json!(0.75)));
        Ok(())
    }

    #[tokio::test]
    async fn concat_joins_present_fields() -> anyhow::Result<()> {
        let input = records(json!([
            {"first_name": "Ada", "last_name": "Abbott", "age": 25},
            {"last_name": "Baker", "age": null},
        ]));
        let stage = concat(ConcatParams {
            fields: vec!["first_name".into(), "last_name".into(), "age".into()],
            separator: " ".into(),
            target: "label".into(),
        });
        let outcome = run_stage(stage, input).await;
        outcome.result.clone()?;
        let labels: Vec<_> = outcome
            .records()
            .iter()
            .map(|record| record.get("label").cloned())
            .collect();
        assert_eq!(labels, [Some(json!("Ada Abbott 25")), Some(json!("Baker"))]);
        Ok(())
    }
}
