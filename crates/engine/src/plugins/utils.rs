use rowflow_model::Record;

use crate::stage::runtime::{RuntimeStage, StageFunction, build_stage};

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct PluckParams {
    pub fields: Vec<String>,
}

/// Keeps only `fields`, in the order listed. Fields a record lacks stay
/// absent.
pub fn pluck_properties<I>(fields: I) -> RuntimeStage
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
    build_stage(
        "Utils.pluckProperties",
        StageFunction::map_sync(move |record| Ok(Some(pluck(&record, &fields)))),
        None,
    )
}

fn pluck(record: &Record, fields: &[String]) -> Record {
    fields
        .iter()
        .filter_map(|field| Some((field.as_str(), record.get(field)?.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{records, run_stage};
    use rowflow_model::json;

    #[tokio::test]
    async fn plucks_in_list_order() -> anyhow::Result<()> {
        let input = records(json!([
            {"id": "a1", "first_name": "Ada", "last_name": "Abbott", "age": 25},
            {"id": "b2", "first_name": "Brook"},
        ]));
        let outcome = run_stage(pluck_properties(["age", "first_name"]), input).await;
        outcome.result.clone()?;
        let plucked = outcome.records();
        assert_eq!(plucked, records(json!([{"age": 25, "first_name": "Ada"}, {"first_name": "Brook"}])));
        assert_eq!(plucked[0].fields().collect::<Vec<_>>(), ["age", "first_name"]);
        Ok(())
    }
}
