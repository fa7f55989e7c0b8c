use crate::application::ports::Loader;
use crate::config::Config;

use rowflow_engine::{BatchedSink, Collection, JsonLinesWriter, Pipeline, RunSummary, StepCounter, Target};

/// Appends the sorted rows to `<output_dir>/<table>.jsonl` in batches.
pub struct JsonLinesLoader {
    config: Config,
    counter: StepCounter,
}

impl JsonLinesLoader {
    pub fn new(config: &Config, counter: &StepCounter) -> Self {
        let config = config.clone();
        let counter = counter.clone();
        Self { config, counter }
    }
}

impl Loader for JsonLinesLoader {
    async fn run(&self, sorted: Collection) -> anyhow::Result<RunSummary> {
        let output_dir = &self.config.paths.output_dir;
        tokio::fs::create_dir_all(output_dir).await?;

        let writer = JsonLinesWriter::new(output_dir);
        let target = Target::new(output_dir.display().to_string(), &self.config.bulk_loader.table);
        let path = writer.path_for(&target);
        // Appending to a previous run's output would duplicate rows.
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }

        tracing::info!(path = %path.display(), records = sorted.len(), "Loading sorted rows");

        let sink = BatchedSink::from_config(writer, target, &self.config.rowflow.sink)?.with_name("load");
        let summary = Pipeline::builder("load")
            .source(sorted.into_source())
            .stage(sink)
            .counter(&self.counter)
            .with_config(&self.config.rowflow.engine)
            .build()?
            .run()
            .await?;

        Ok(summary)
    }
}
