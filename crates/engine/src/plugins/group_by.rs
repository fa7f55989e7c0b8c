use std::sync::{Arc, Mutex, PoisonError};

use rowflow_model::{Record, as_number, number_value};

use crate::error::MalformedInput;
use crate::stage::runtime::{RuntimeStage, StageFunction, build_stage, finalizer};

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SumByParams {
    pub field: String,
    #[serde(default)]
    pub pass_through: bool,
}

/// Sums `field` over the whole input and emits `{field: sum}` after the
/// last record. Records lacking the field add nothing; records are
/// forwarded only with `pass_through`.
pub fn sum_by(field: impl Into<String>, pass_through: bool) -> RuntimeStage {
    let field = field.into();
    let total = Arc::new(Mutex::new(0.0_f64));

    let sum = {
        let total = total.clone();
        let field = field.clone();
        StageFunction::map_sync(move |record| {
            if let Some(value) = record.get(&field).and_then(as_number) {
                *total.lock().unwrap_or_else(PoisonError::into_inner) += value;
            }
            Ok(pass_through.then_some(record))
        })
    };
    let emit = finalizer(move || {
        let total = *total.lock().unwrap_or_else(PoisonError::into_inner);
        let total = number_value(total)
            .ok_or_else(|| MalformedInput(format!("sum of `{field}` is not a finite number")))?;
        Ok(vec![Record::new().with(field, total)])
    });
    build_stage("GroupBy.sumBy", sum, emit)
}
