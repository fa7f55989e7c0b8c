//! Stage constructors addressable by name, e.g. `Filter.greaterThan`.
//!
//! Parameters arrive as JSON and are deserialized into each stage's typed
//! parameter struct, so a pipeline can be described in a config file.

use std::collections::BTreeMap;

use rowflow_model::{SortKeySpec, Value};

use crate::error::{PipelineError, Result};
use crate::plugins::calculator::{self, ArithmeticParams, ConcatParams, Operation};
use crate::plugins::filter::{self, Comparison, FilterParams};
use crate::plugins::group_by::{self, SumByParams};
use crate::plugins::utils::{self, PluckParams};
use crate::stage::BoxStage;
use crate::stage::sort;

pub type Constructor = fn(Value) -> anyhow::Result<BoxStage>;

const CORE_STAGES: &[(&str, Constructor)] = &[
    ("Filter.equals", |params| filter_stage(Comparison::Equals, params)),
    ("Filter.notEquals", |params| filter_stage(Comparison::NotEquals, params)),
    ("Filter.greaterThan", |params| filter_stage(Comparison::GreaterThan, params)),
    ("Filter.greaterThanOrEqualTo", |params| {
        filter_stage(Comparison::GreaterThanOrEqualTo, params)
    }),
    ("Filter.lessThan", |params| filter_stage(Comparison::LessThan, params)),
    ("Filter.lessThanOrEqualTo", |params| {
        filter_stage(Comparison::LessThanOrEqualTo, params)
    }),
    ("Calculator.add", |params| arithmetic_stage(Operation::Add, params)),
    ("Calculator.subtract", |params| arithmetic_stage(Operation::Subtract, params)),
    ("Calculator.multiply", |params| arithmetic_stage(Operation::Multiply, params)),
    ("Calculator.divide", |params| arithmetic_stage(Operation::Divide, params)),
    ("Calculator.concat", concat_stage),
    ("Utils.pluckProperties", pluck_stage),
    ("GroupBy.sumBy", sum_by_stage),
    ("Sort.sortIn", sort_in_stage),
    ("Sort.sortOut", |_| Ok(Box::new(sort::sort_out()))),
];

fn filter_stage(comparison: Comparison, params: Value) -> anyhow::Result<BoxStage> {
    let params: FilterParams = serde_json::from_value(params)?;
    Ok(Box::new(filter::filter(comparison, params)))
}

fn arithmetic_stage(operation: Operation, params: Value) -> anyhow::Result<BoxStage> {
    let params: ArithmeticParams = serde_json::from_value(params)?;
    Ok(Box::new(calculator::arithmetic(operation, params)))
}

fn concat_stage(params: Value) -> anyhow::Result<BoxStage> {
    let params: ConcatParams = serde_json::from_value(params)?;
    Ok(Box::new(calculator::concat(params)))
}

fn pluck_stage(params: Value) -> anyhow::Result<BoxStage> {
    let PluckParams { fields } = serde_json::from_value(params)?;
    Ok(Box::new(utils::pluck_properties(fields)))
}

fn sum_by_stage(params: Value) -> anyhow::Result<BoxStage> {
    let SumByParams {
        field,
        pass_through,
    } = serde_json::from_value(params)?;
    Ok(Box::new(group_by::sum_by(field, pass_through)))
}

/// `keys` is either `"last_name:asc,age:desc"` or a list of
/// `{"field": .., "direction": "asc" | "desc"}`.
fn sort_in_stage(params: Value) -> anyhow::Result<BoxStage> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Keys {
        Text(String),
        List(SortKeySpec),
    }

    #[derive(serde::Deserialize)]
    struct SortInParams {
        keys: Keys,
    }

    let SortInParams { keys } = serde_json::from_value(params)?;
    let keys = match keys {
        Keys::Text(text) => SortKeySpec::parse(&text)?,
        Keys::List(keys) => keys,
    };
    if keys.is_empty() {
        anyhow::bail!("at least one sort key is required");
    }
    Ok(Box::new(sort::sort_in(keys)))
}

pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

impl Registry {
    pub fn empty() -> Self {
        Registry {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry holding the core stage library.
    pub fn core() -> Self {
        let constructors = CORE_STAGES
            .iter()
            .map(|(name, constructor)| ((*name).to_owned(), *constructor))
            .collect();
        Registry { constructors }
    }

    pub fn register(&mut self, name: impl Into<String>, constructor: Constructor) -> Result<()> {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(PipelineError::InvalidConfig {
                stage: name,
                reason: "a stage with this name is already registered".to_owned(),
            });
        }
        self.constructors.insert(name, constructor);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn build(&self, name: &str, params: Value) -> Result<BoxStage> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| PipelineError::InvalidConfig {
                stage: name.to_owned(),
                reason: "unknown stage".to_owned(),
            })?;
        constructor(params).map_err(|error| PipelineError::InvalidConfig {
            stage: name.to_owned(),
            reason: format!("{error:#}"),
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::core()
    }
}
