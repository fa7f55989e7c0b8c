use rowflow_engine::{CounterReport, FlushAck};

use super::ports::{Loader, Sorter};

/// The main application service that orchestrates the bulk loading process.
/// It is generic over the Sorter and Loader traits, allowing for
/// dependency injection.
pub struct BulkLoaderService<S: Sorter, L: Loader> {
    sorter: S,
    loader: L,
}

/// What both phases did, with the step counts of each appended in order.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub sorted_records: usize,
    pub acks: Vec<FlushAck>,
    pub steps: CounterReport,
}

impl LoadReport {
    pub fn written_records(&self) -> usize {
        self.acks.iter().map(|ack| ack.records).sum()
    }
}

impl<S: Sorter, L: Loader> BulkLoaderService<S, L> {
    /// Creates a new service with concrete implementations of the ports.
    pub fn new(sorter: S, loader: L) -> Self {
        Self { sorter, loader }
    }

    /// Executes the two-phase process: sort everything, then load it.
    pub async fn run(&self) -> anyhow::Result<LoadReport> {
        let mut report = LoadReport::default();

        tracing::info!("Starting Phase 1: Sorting");
        let mut summary = self.sorter.run().await?;
        report.steps.rows.append(&mut summary.steps.rows);
        let sorted = summary
            .into_collection()
            .ok_or_else(|| anyhow::anyhow!("sort phase produced no collection"))?;
        report.sorted_records = sorted.len();
        tracing::info!(
            records = report.sorted_records,
            keys = %sorted.keys(),
            "Phase 1: Sorting finished successfully"
        );

        tracing::info!("Starting Phase 2: Loading");
        let mut summary = self.loader.run(sorted).await?;
        report.steps.rows.append(&mut summary.steps.rows);
        report.acks = summary.acks().cloned().collect();
        tracing::info!(
            batches = report.acks.len(),
            records = report.written_records(),
            elapsed = ?summary.elapsed,
            "Phase 2: Loading finished successfully"
        );

        Ok(report)
    }
}

/// Prints the step table and, when asked, writes it as CSV too.
pub fn publish_report(steps: &CounterReport, csv_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("{steps}");
    if let Some(path) = csv_path {
        let file = std::fs::File::create(path)?;
        steps.write_csv(std::io::BufWriter::new(file))?;
        tracing::info!(path = %path.display(), "Step report written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_engine::{Collection, MemoryWriter, Pipeline, RunSummary, Source, StepCounter};
    use rowflow_engine::{BatchedSink, Target, sort_in};
    use rowflow_model::{Record, SortKeySpec};

    struct FixedSorter;

    impl Sorter for FixedSorter {
        async fn run(&self) -> anyhow::Result<RunSummary> {
            let records = (1..=5).rev().map(|n| Record::new().with("n", n));
            let counter = StepCounter::new();
            let summary = Pipeline::builder("sort")
                .source(Source::from_records("fixed", records))
                .stage(sort_in(SortKeySpec::parse("n")?))
                .counter(&counter)
                .build()?
                .run()
                .await?;
            Ok(summary)
        }
    }

    struct MemoryLoader(MemoryWriter);

    impl Loader for MemoryLoader {
        async fn run(&self, sorted: Collection) -> anyhow::Result<RunSummary> {
            let sink = BatchedSink::new(self.0.clone(), Target::new("memory", "t"), 2, 1)?;
            let summary = Pipeline::builder("load")
                .source(sorted.into_source())
                .stage(sink)
                .build()?
                .run()
                .await?;
            Ok(summary)
        }
    }

    #[tokio::test]
    async fn phases_run_in_order() -> anyhow::Result<()> {
        let writer = MemoryWriter::new();
        let service = BulkLoaderService::new(FixedSorter, MemoryLoader(writer.clone()));
        let report = service.run().await?;

        assert_eq!(report.sorted_records, 5);
        assert_eq!(report.written_records(), 5);
        assert_eq!(report.acks.len(), 3);
        assert!(report.steps.step("Sort.sortIn").is_some());

        let loaded: Vec<i64> = writer
            .records()
            .iter()
            .filter_map(|record| record.get("n")?.as_i64())
            .collect();
        assert_eq!(loaded, [1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn report_csv_is_written() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("steps.csv");
        publish_report(&CounterReport::default(), Some(&path))?;
        let written = std::fs::read_to_string(&path)?;
        assert!(written.is_empty() || written.starts_with("step"));
        Ok(())
    }
}
