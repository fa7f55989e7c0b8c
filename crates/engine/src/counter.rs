use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::channel::{Inlet, Outlet};
use crate::error::Result;
use crate::stage::{Stage, fail_with};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepDirection {
    In,
    Out,
}

impl std::fmt::Display for StepDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepDirection::In => f.write_str("in"),
            StepDirection::Out => f.write_str("out"),
        }
    }
}

struct Entry {
    step: String,
    direction: StepDirection,
    count: Arc<AtomicU64>,
}

/// Per-run record counts keyed by (step, direction).
///
/// Clones share counts, so a counter can be handed to a pipeline builder
/// and still be read from outside while the run is going.
#[derive(Clone, Default)]
pub struct StepCounter {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl StepCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity stage that counts what passes through it. Collections count
    /// as their length and flush acks as the records they acknowledge.
    pub fn count_stream(&self, step: impl Into<String>, direction: StepDirection) -> CountStage {
        let step = step.into();
        let count = self.slot(&step, direction);
        CountStage {
            name: format!("count[{step}:{direction}]"),
            count,
        }
    }

    pub fn get(&self, step: &str, direction: StepDirection) -> Option<u64> {
        self.lock()
            .iter()
            .find(|entry| entry.step == step && entry.direction == direction)
            .map(|entry| entry.count.load(Ordering::Acquire))
    }

    /// Snapshot of all steps, in the order they were first counted.
    pub fn report(&self) -> CounterReport {
        let entries = self.lock();
        let mut rows: Vec<StepRow> = Vec::new();
        for entry in entries.iter() {
            let position = match rows.iter().position(|row| row.step == entry.step) {
                Some(position) => position,
                None => {
                    rows.push(StepRow {
                        step: entry.step.clone(),
                        entered: None,
                        left: None,
                    });
                    rows.len() - 1
                }
            };
            let count = Some(entry.count.load(Ordering::Acquire));
            match entry.direction {
                StepDirection::In => rows[position].entered = count,
                StepDirection::Out => rows[position].left = count,
            }
        }
        CounterReport { rows }
    }

    /// Zeroes every count; stages already built keep counting into the
    /// same entries.
    pub fn reset(&self) {
        for entry in self.lock().iter() {
            entry.count.store(0, Ordering::Release);
        }
    }

    fn slot(&self, step: &str, direction: StepDirection) -> Arc<AtomicU64> {
        let mut entries = self.lock();
        if let Some(entry) = entries
            .iter()
            .find(|entry| entry.step == step && entry.direction == direction)
        {
            return entry.count.clone();
        }
        let count = Arc::new(AtomicU64::new(0));
        entries.push(Entry {
            step: step.to_owned(),
            direction,
            count: count.clone(),
        });
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct CountStage {
    name: String,
    count: Arc<AtomicU64>,
}

impl CountStage {
    async fn execute(self, mut input: Inlet, output: Outlet) -> Result<()> {
        let result = async {
            while let Some(item) = input.recv().await? {
                self.count.fetch_add(item.record_count(), Ordering::AcqRel);
                output.send(item).await?;
            }
            Result::<()>::Ok(())
        }
        .await;
        match result {
            Ok(()) => output.end().await,
            Err(error) => fail_with(output, error).await,
        }
    }
}

impl Stage for CountStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, input: Inlet, output: Outlet) -> BoxFuture<'static, Result<()>> {
        (*self).execute(input, output).boxed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRow {
    pub step: String,
    pub entered: Option<u64>,
    pub left: Option<u64>,
}

impl StepRow {
    /// Records that went in but did not come out. `None` unless both
    /// directions were counted.
    pub fn dropped(&self) -> Option<u64> {
        Some(self.entered?.saturating_sub(self.left?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterReport {
    pub rows: Vec<StepRow>,
}

impl CounterReport {
    pub fn step(&self, step: &str) -> Option<&StepRow> {
        self.rows.iter().find(|row| row.step == step)
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> anyhow::Result<()> {
        #[derive(serde::Serialize)]
        struct CsvRow<'a> {
            step: &'a str,
            #[serde(rename = "in")]
            entered: Option<u64>,
            #[serde(rename = "out")]
            left: Option<u64>,
            dropped: Option<u64>,
        }

        let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(CsvRow {
                step: &row.step,
                entered: row.entered,
                left: row.left,
                dropped: row.dropped(),
            })?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Display for CounterReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn cell(count: Option<u64>) -> String {
            count.map_or_else(|| "-".to_owned(), |count| count.to_string())
        }

        let width = self
            .rows
            .iter()
            .map(|row| row.step.len())
            .chain(std::iter::once("step".len()))
            .max()
            .unwrap_or_default();
        writeln!(f, "{:<width$}  {:>10}  {:>10}  {:>10}", "step", "in", "out", "dropped")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<width$}  {:>10}  {:>10}  {:>10}",
                row.step,
                cell(row.entered),
                cell(row.left),
                cell(row.dropped()),
            )?;
        }
        Ok(())
    }
}
