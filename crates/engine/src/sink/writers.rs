use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWriteExt;

use crate::sink::{Batch, BatchWriter, Target};

/// Keeps written batches in memory. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    inner: Arc<MemoryInner>,
    delay: Option<Duration>,
    fail_on_batch: Option<u64>,
}

#[derive(Default)]
struct MemoryInner {
    batches: Mutex<Vec<Batch>>,
    calls: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write sleeps for `delay` before storing its batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The `n`-th call to `write_batch` (1-based) fails.
    pub fn fail_on_batch(mut self, n: u64) -> Self {
        self.fail_on_batch = Some(n);
        self
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.inner
            .batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn records(&self) -> Batch {
        self.batches().into_iter().flatten().collect()
    }

    /// Highest number of writes observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::Acquire)
    }

    /// Number of `write_batch` calls started so far, failed ones included.
    pub fn calls(&self) -> u64 {
        self.inner.calls.load(Ordering::Acquire)
    }

    pub fn close_count(&self) -> usize {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl BatchWriter for MemoryWriter {
    async fn write_batch(&self, _target: &Target, batch: Batch) -> anyhow::Result<()> {
        let call = self.inner.calls.fetch_add(1, Ordering::AcqRel) + 1;
        let in_flight = self.inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak_in_flight.fetch_max(in_flight, Ordering::AcqRel);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = if self.fail_on_batch == Some(call) {
            Err(anyhow::anyhow!("write #{call} rejected"))
        } else {
            self.inner
                .batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(batch);
            Ok(())
        };

        self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
        result
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.inner.closed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Appends each record as one JSON object per line to
/// `<dir>/<target.table>.jsonl`.
///
/// Files are opened on first write and kept open until `close`. Batches are
/// serialized before any lock is taken; appends then hold only their own
/// file's lock, so batches for different tables are written concurrently
/// while appends to one table stay whole and one at a time.
pub struct JsonLinesWriter {
    dir: PathBuf,
    files: tokio::sync::Mutex<HashMap<String, SharedFile>>,
}

type SharedFile = Arc<tokio::sync::Mutex<tokio::fs::File>>;

impl JsonLinesWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonLinesWriter {
            dir: dir.into(),
            files: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, target: &Target) -> PathBuf {
        self.dir.join(format!("{}.jsonl", target.table))
    }

    async fn file_for(&self, target: &Target) -> anyhow::Result<SharedFile> {
        let mut files = self.files.lock().await;
        if let Some(file) = files.get(&target.table) {
            return Ok(file.clone());
        }
        let path = self.path_for(target);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        let file = Arc::new(tokio::sync::Mutex::new(file));
        files.insert(target.table.clone(), file.clone());
        Ok(file)
    }
}

impl BatchWriter for JsonLinesWriter {
    async fn write_batch(&self, target: &Target, batch: Batch) -> anyhow::Result<()> {
        let mut lines = Vec::new();
        for record in &batch {
            serde_json::to_writer(&mut lines, record)?;
            lines.push(b'\n');
        }

        let file = self.file_for(target).await?;
        let mut file = file.lock().await;
        file.write_all(&lines).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let files: Vec<SharedFile> = self.files.lock().await.drain().map(|(_, file)| file).collect();
        for file in files {
            let mut file = file.lock().await;
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_model::{Record, json, records_from_json};

    #[tokio::test]
    async fn json_lines_are_appended() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = JsonLinesWriter::new(dir.path());
        let target = Target::new(dir.path().display().to_string(), "employees");

        let first = records_from_json(json!([{"a": 1}, {"a": 2}]))?;
        writer.write_batch(&target, first).await?;
        writer
            .write_batch(&target, vec![Record::new().with("b", "x")])
            .await?;
        writer.close().await?;

        let written = std::fs::read_to_string(writer.path_for(&target))?;
        assert_eq!(written, "{\"a\":1}\n{\"a\":2}\n{\"b\":\"x\"}\n");
        Ok(())
    }

    #[tokio::test]
    async fn tables_are_written_concurrently() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = Arc::new(JsonLinesWriter::new(dir.path()));
        let connection = dir.path().display().to_string();
        let employees = Target::new(connection.clone(), "employees");
        let salaries = Target::new(connection, "salaries");

        // Holding one table's file does not block writes to another.
        let held = writer.file_for(&employees).await?;
        let guard = held.lock().await;
        tokio::time::timeout(
            Duration::from_secs(2),
            writer.write_batch(&salaries, vec![Record::new().with("s", 1)]),
        )
        .await??;
        drop(guard);

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..8 {
            let writer = writer.clone();
            let target = employees.clone();
            tasks.spawn(async move {
                let batch = (0..10).map(|i| Record::new().with("n", n * 10 + i)).collect();
                writer.write_batch(&target, batch).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result??;
        }
        writer.close().await?;

        let written = std::fs::read_to_string(writer.path_for(&employees))?;
        assert_eq!(written.lines().count(), 80);
        let salaries = std::fs::read_to_string(writer.path_for(&salaries))?;
        assert_eq!(salaries, "{\"s\":1}\n");
        Ok(())
    }

    #[tokio::test]
    async fn memory_writer_tracks_calls() -> anyhow::Result<()> {
        let writer = MemoryWriter::new().fail_on_batch(2);
        let target = Target::new("memory", "t");
        writer.write_batch(&target, vec![Record::new()]).await?;
        assert!(writer.write_batch(&target, vec![Record::new()]).await.is_err());
        assert_eq!(writer.batches().len(), 1);
        assert_eq!(writer.peak_in_flight(), 1);
        Ok(())
    }
}
