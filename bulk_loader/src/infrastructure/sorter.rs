use std::path::{Path, PathBuf};

use crate::application::ports::Sorter;
use crate::config::Config;

use rowflow_engine::plugins::filter;
use rowflow_engine::{Pipeline, RunSummary, Source, StepCounter, sort_in};
use rowflow_model::SortKeySpec;
use rowflow_model::codec::{CsvRecords, read_json_file};

/// Reads the input file, optionally filters it, and sorts every row into a
/// single collection.
pub struct FileSorter {
    config: Config,
    counter: StepCounter,
}

impl FileSorter {
    pub fn new(config: &Config, counter: &StepCounter) -> Self {
        let config = config.clone();
        let counter = counter.clone();
        Self { config, counter }
    }

    fn source(&self) -> anyhow::Result<Source> {
        let paths = &self.config.paths;
        input_source(&paths.input, paths.json_pointer.clone())
    }
}

/// Picks a reader from the file extension: `.json` documents are read whole,
/// anything else is streamed as CSV.
pub fn input_source(path: &Path, json_pointer: Option<String>) -> anyhow::Result<Source> {
    let name = path.display().to_string();
    let path: PathBuf = path.to_owned();
    let is_json = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(Source::from_blocking(name, move || {
            let records = read_json_file(&path, json_pointer.as_deref())?;
            anyhow::Ok(records.into_iter().map(anyhow::Ok))
        }))
    } else {
        if json_pointer.is_some() {
            anyhow::bail!("json pointer given for non-json input {}", path.display());
        }
        Ok(Source::from_blocking(name, move || CsvRecords::open(&path)))
    }
}

impl Sorter for FileSorter {
    async fn run(&self) -> anyhow::Result<RunSummary> {
        let settings = &self.config.bulk_loader;
        let keys = SortKeySpec::parse(&settings.sort)?;

        tracing::info!(input = %self.config.paths.input.display(), %keys, "Sorting input");

        let mut builder = Pipeline::builder("sort")
            .source(self.source()?)
            .counter(&self.counter)
            .with_config(&self.config.rowflow.engine);
        if let Some(rule) = &settings.filter {
            tracing::debug!(field = %rule.field, greater_than = rule.greater_than, "Filtering input");
            builder = builder.stage(filter::greater_than(rule.field.as_str(), rule.greater_than));
        }
        let summary = builder.stage(sort_in(keys)).build()?.run().await?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BulkLoaderConfig, FilterConfig, PathsConfig};
    use rowflow_model::json;

    fn config(input: PathBuf, filter: Option<FilterConfig>) -> Config {
        Config {
            rowflow: rowflow_config::Config::default(),
            paths: PathsConfig {
                input,
                json_pointer: None,
                output_dir: PathBuf::from("unused"),
                report_csv: None,
            },
            bulk_loader: BulkLoaderConfig {
                sort: "last_name:asc,age:desc".to_owned(),
                table: "employees".to_owned(),
                filter,
            },
        }
    }

    #[tokio::test]
    async fn csv_input_is_filtered_and_sorted() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("people.csv");
        std::fs::write(
            &input,
            "first_name,last_name,age\nAda,Baker,40\nBo,Abbott,22\nCy,Abbott,51\nDi,Abbott,35\n",
        )?;
        let filter = FilterConfig {
            field: "age".to_owned(),
            greater_than: 30.0,
        };
        let counter = StepCounter::new();
        let sorter = FileSorter::new(&config(input, Some(filter)), &counter);

        let summary = sorter.run().await?;
        let dropped = summary.steps.step("Filter.greaterThan").and_then(|row| row.dropped());
        assert_eq!(dropped, Some(1));

        let collection = summary.into_collection().expect("collection");
        let names: Vec<&str> = collection
            .records()
            .iter()
            .filter_map(|record| record.get("first_name")?.as_str())
            .collect();
        assert_eq!(names, ["Cy", "Di", "Ada"]);
        Ok(())
    }

    #[tokio::test]
    async fn json_input_is_read_at_pointer() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("people.json");
        let document = json!({"data": [
            {"last_name": "Baker", "age": 40},
            {"last_name": "Abbott", "age": 22},
        ]});
        std::fs::write(&input, document.to_string())?;

        let source = input_source(&input, Some("/data".to_owned()))?;
        let summary = Pipeline::builder("read")
            .source(source)
            .stage(sort_in(SortKeySpec::parse("last_name")?))
            .build()?
            .run()
            .await?;
        let collection = summary.into_collection().expect("collection");
        assert_eq!(collection.records()[0].get("last_name"), Some(&json!("Abbott")));
        Ok(())
    }

    #[tokio::test]
    async fn missing_input_fails_the_run() {
        let counter = StepCounter::new();
        let sorter = FileSorter::new(&config(PathBuf::from("/nonexistent/people.csv"), None), &counter);
        assert!(sorter.run().await.is_err());
    }
}
