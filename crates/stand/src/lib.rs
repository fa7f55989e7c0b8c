//! Scenarios measured by the `pipeline` bench.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rowflow_engine::{BatchedSink, Collection, MemoryWriter, Pipeline, Source, Target, sort_in};
use rowflow_model::codec::CsvRecords;
use rowflow_model::{Record, SortKeySpec};

/// Directory holding the `employees_<count>.csv` files generated at build time.
pub const DATA_DIR: &str = env!("STAND_DATA_DIR");

pub fn data_files() -> anyhow::Result<Vec<(u64, PathBuf)>> {
    rowflow_model::list_data_files(Path::new(DATA_DIR))
}

pub trait Scenario {
    type Input;
    type Bench: Bench;

    fn prepare(&self, input: &Self::Input) -> impl Future<Output = anyhow::Result<Self::Bench>> + Send;
}

pub trait Bench {
    fn run(self) -> impl Future<Output = anyhow::Result<usize>> + Send;
}

pub struct Context<S> {
    pub runtime: tokio::runtime::Runtime,
    pub scenario: S,
}

impl<S: Scenario> Context<S> {
    pub fn new(scenario: S) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;
        Ok(Context { runtime, scenario })
    }

    pub fn block<O>(&self, f: impl Future<Output = O>) -> O {
        tokio::task::block_in_place(|| self.runtime.block_on(f))
    }
}

/// Reads a CSV file and sorts it into a collection.
pub struct SortFile {
    pub keys: SortKeySpec,
}

pub struct SortFileBench {
    path: PathBuf,
    keys: SortKeySpec,
}

impl Scenario for SortFile {
    type Input = PathBuf;
    type Bench = SortFileBench;

    async fn prepare(&self, input: &PathBuf) -> anyhow::Result<SortFileBench> {
        Ok(SortFileBench {
            path: input.clone(),
            keys: self.keys.clone(),
        })
    }
}

impl Bench for SortFileBench {
    async fn run(self) -> anyhow::Result<usize> {
        let path = self.path;
        let summary = Pipeline::builder("bench.sort")
            .source(Source::from_blocking("bench", move || CsvRecords::open(&path)))
            .stage(sort_in(self.keys))
            .build()?
            .run()
            .await?;
        let sorted = summary.into_collection().map_or(0, |collection| collection.len());
        Ok(sorted)
    }
}

/// Pushes an already sorted collection through a batched sink whose writer
/// takes `write_delay` per batch.
pub struct LoadSorted {
    pub batch_size: usize,
    pub max_concurrent_flushes: usize,
    pub write_delay: Duration,
}

pub struct LoadSortedBench {
    collection: Collection,
    sink: BatchedSink<MemoryWriter>,
}

impl Scenario for LoadSorted {
    type Input = Vec<Record>;
    type Bench = LoadSortedBench;

    async fn prepare(&self, input: &Vec<Record>) -> anyhow::Result<LoadSortedBench> {
        let collection = Collection::sorted(SortKeySpec::default(), input.clone());
        let writer = MemoryWriter::new().with_delay(self.write_delay);
        let sink = BatchedSink::new(
            writer,
            Target::new("memory", "bench"),
            self.batch_size,
            self.max_concurrent_flushes,
        )?;
        Ok(LoadSortedBench { collection, sink })
    }
}

impl Bench for LoadSortedBench {
    async fn run(self) -> anyhow::Result<usize> {
        let summary = Pipeline::builder("bench.load")
            .source(self.collection.into_source())
            .stage(self.sink)
            .build()?
            .run()
            .await?;
        Ok(summary.acks().map(|ack| ack.records).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn scenarios_handle_every_row() -> anyhow::Result<()> {
        let (count, path) = data_files()?.into_iter().next().expect("generated data");

        let sort = SortFile {
            keys: SortKeySpec::parse("last_name,first_name")?,
        };
        let sorted = sort.prepare(&path).await?.run().await?;
        assert_eq!(sorted as u64, count);

        let rows: Vec<Record> = CsvRecords::open(&path)?.collect::<anyhow::Result<_>>()?;
        let load = LoadSorted {
            batch_size: 100,
            max_concurrent_flushes: 4,
            write_delay: Duration::ZERO,
        };
        let loaded = load.prepare(&rows).await?.run().await?;
        assert_eq!(loaded as u64, count);
        Ok(())
    }
}
