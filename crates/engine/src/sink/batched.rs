use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::task::{Id, JoinError, JoinSet};

use crate::channel::{Inlet, Outlet};
use crate::error::{PipelineError, Result};
use crate::item::Item;
use crate::sink::{Batch, BatchWriter, FlushAck, Target};
use crate::stage::{Stage, fail_with};

/// Stage that groups records into fixed-size batches and writes them with
/// at most `max_concurrent_flushes` writes in flight.
///
/// At the limit the sink stops reading its input until a flush settles, so
/// a slow writer backs up the whole pipeline instead of buffering without
/// bound. Each written batch is acknowledged downstream with a [`FlushAck`].
pub struct BatchedSink<W> {
    name: String,
    writer: Arc<W>,
    target: Target,
    batch_size: usize,
    max_concurrent_flushes: usize,
    flush_timeout: Option<Duration>,
}

impl<W: BatchWriter> BatchedSink<W> {
    pub fn new(
        writer: W,
        target: Target,
        batch_size: usize,
        max_concurrent_flushes: usize,
    ) -> Result<Self> {
        let name = format!("sink[{target}]");
        if batch_size == 0 {
            return Err(PipelineError::InvalidConfig {
                stage: name,
                reason: "batch size must be greater than zero".to_owned(),
            });
        }
        if max_concurrent_flushes == 0 {
            return Err(PipelineError::InvalidConfig {
                stage: name,
                reason: "max concurrent flushes must be greater than zero".to_owned(),
            });
        }
        Ok(BatchedSink {
            name,
            writer: Arc::new(writer),
            target,
            batch_size,
            max_concurrent_flushes,
            flush_timeout: None,
        })
    }

    pub fn from_config(
        writer: W,
        target: Target,
        config: &rowflow_config::SinkConfig,
    ) -> Result<Self> {
        let sink = Self::new(writer, target, config.batch_size, config.max_concurrent_flushes)?;
        Ok(sink.with_flush_timeout(config.flush_timeout))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// A flush running longer than `timeout` fails the run.
    pub fn with_flush_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_concurrent_flushes(&self) -> usize {
        self.max_concurrent_flushes
    }

    async fn execute(self, mut input: Inlet, output: Outlet) -> Result<()> {
        tracing::debug!(
            stage = %self.name,
            target = %self.target,
            batch_size = self.batch_size,
            max_concurrent_flushes = self.max_concurrent_flushes,
            "sink started"
        );
        let mut flushes = Flushes {
            stage: &self.name,
            tasks: JoinSet::new(),
            batches: HashMap::new(),
            started: 0,
        };

        let result = self.consume(&mut flushes, &mut input, &output).await;
        if result.is_err() {
            flushes.settle_all().await;
        }
        let closed = self.writer.close().await.map_err(|error| PipelineError::StageFailure {
            stage: self.name.clone(),
            reason: format!("closing writer: {error:#}"),
        });

        match result.and(closed) {
            Ok(()) => {
                tracing::debug!(stage = %self.name, batches = flushes.started, "sink finished");
                output.end().await
            }
            Err(error) => {
                tracing::error!(stage = %self.name, %error, "sink failed");
                fail_with(output, error).await
            }
        }
    }

    async fn consume(
        &self,
        flushes: &mut Flushes<'_>,
        input: &mut Inlet,
        output: &Outlet,
    ) -> Result<()> {
        let mut buffer: Batch = Vec::with_capacity(self.batch_size);
        loop {
            // A failed flush ends intake even while upstream is idle.
            let next = if flushes.tasks.is_empty() {
                input.recv().await?
            } else {
                tokio::select! {
                    biased;
                    Some(joined) = flushes.tasks.join_next_with_id() => {
                        let ack = flushes.settle(joined)?;
                        output.send(ack).await?;
                        continue;
                    }
                    item = input.recv() => item?,
                }
            };
            let Some(item) = next else {
                break;
            };
            match item {
                Item::Record(record) => buffer.push(record),
                Item::Collection(collection) => buffer.extend(collection.into_records()),
                ack @ Item::Ack(_) => {
                    output.send(ack).await?;
                    continue;
                }
            }
            while buffer.len() >= self.batch_size {
                let rest = buffer.split_off(self.batch_size);
                let batch = std::mem::replace(&mut buffer, rest);
                self.start_flush(flushes, batch, output).await?;
            }
        }
        if !buffer.is_empty() {
            self.start_flush(flushes, buffer, output).await?;
        }
        while let Some(joined) = flushes.tasks.join_next_with_id().await {
            let ack = flushes.settle(joined)?;
            output.send(ack).await?;
        }
        Ok(())
    }

    async fn start_flush(&self, flushes: &mut Flushes<'_>, batch: Batch, output: &Outlet) -> Result<()> {
        // No batch starts once an earlier one has failed.
        while let Some(joined) = flushes.tasks.try_join_next_with_id() {
            let ack = flushes.settle(joined)?;
            output.send(ack).await?;
        }
        // Intake stops here while the flush limit is reached.
        while flushes.tasks.len() >= self.max_concurrent_flushes {
            if let Some(joined) = flushes.tasks.join_next_with_id().await {
                let ack = flushes.settle(joined)?;
                output.send(ack).await?;
            }
        }

        flushes.started += 1;
        let batch_number = flushes.started;
        let records = batch.len();
        let writer = self.writer.clone();
        let target = self.target.clone();
        let timeout = self.flush_timeout;
        tracing::debug!(stage = %self.name, batch = batch_number, records, "flush started");

        let handle = flushes.tasks.spawn(async move {
            let started = Instant::now();
            let write = writer.write_batch(&target, batch);
            let result = match timeout {
                Some(timeout) => tokio::time::timeout(timeout, write)
                    .await
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("timed out after {timeout:?}"))),
                None => write.await,
            };
            result.map(|()| FlushAck {
                batch: batch_number,
                records,
                elapsed: started.elapsed(),
            })
        });
        flushes.batches.insert(handle.id(), batch_number);
        Ok(())
    }
}

type Joined = std::result::Result<(Id, anyhow::Result<FlushAck>), JoinError>;

/// Flush tasks in flight, keyed back to their batch numbers.
struct Flushes<'a> {
    stage: &'a str,
    tasks: JoinSet<anyhow::Result<FlushAck>>,
    batches: HashMap<Id, u64>,
    started: u64,
}

impl Flushes<'_> {
    fn settle(&mut self, joined: Joined) -> Result<FlushAck> {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result.map_err(|error| format!("{error:#}"))),
            Err(error) if error.is_panic() => (error.id(), Err("flush task panicked".to_owned())),
            Err(error) => (error.id(), Err("flush task cancelled".to_owned())),
        };
        let batch = self.batches.remove(&id).unwrap_or_default();
        match result {
            Ok(ack) => {
                tracing::debug!(stage = %self.stage, batch, elapsed = ?ack.elapsed, "flush done");
                Ok(ack)
            }
            Err(reason) => {
                tracing::error!(stage = %self.stage, batch, %reason, "flush failed");
                Err(PipelineError::FlushFailure {
                    stage: self.stage.to_owned(),
                    batch,
                    reason,
                })
            }
        }
    }

    /// Waits for every in-flight flush; outcomes are only logged since the
    /// run has already failed.
    async fn settle_all(&mut self) {
        while let Some(joined) = self.tasks.join_next_with_id().await {
            let _ = self.settle(joined);
        }
    }
}

impl<W: BatchWriter> Stage for BatchedSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, input: Inlet, output: Outlet) -> BoxFuture<'static, Result<()>> {
        (*self).execute(input, output).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryWriter;
    use crate::testkit::{records, run_stage};
    use rowflow_model::{Record, json};

    fn numbered(count: usize) -> Vec<Record> {
        (0..count).map(|n| Record::new().with("n", n)).collect()
    }

    fn acks(items: &[Item]) -> Vec<&FlushAck> {
        items
            .iter()
            .filter_map(|item| match item {
                Item::Ack(ack) => Some(ack),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let target = Target::new("memory", "t");
        assert!(matches!(
            BatchedSink::new(MemoryWriter::new(), target.clone(), 0, 1),
            Err(PipelineError::InvalidConfig { .. })
        ));
        assert!(matches!(
            BatchedSink::new(MemoryWriter::new(), target, 10, 0),
            Err(PipelineError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn batches_are_fixed_size_except_last() -> anyhow::Result<()> {
        let writer = MemoryWriter::new();
        let sink = BatchedSink::new(writer.clone(), Target::new("memory", "t"), 4, 2)?;
        let outcome = run_stage(sink, numbered(10)).await;
        outcome.result.clone()?;
        assert!(outcome.ended);

        let mut sizes: Vec<_> = writer.batches().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, [2, 4, 4]);

        let mut acked: Vec<_> = acks(&outcome.items).iter().map(|ack| (ack.batch, ack.records)).collect();
        acked.sort_unstable();
        assert_eq!(acked, [(1, 4), (2, 4), (3, 2)]);
        assert_eq!(writer.close_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn collections_are_flattened() -> anyhow::Result<()> {
        let writer = MemoryWriter::new();
        let sink = BatchedSink::new(writer.clone(), Target::new("memory", "t"), 3, 1)?;
        let collection = crate::Collection::sorted(
            rowflow_model::SortKeySpec::parse("n")?,
            records(json!([{"n": 2}, {"n": 1}])),
        );
        let outcome = crate::testkit::run_stage_items(sink, vec![collection.into()]).await;
        outcome.result.clone()?;
        assert_eq!(writer.records(), records(json!([{"n": 1}, {"n": 2}])));
        Ok(())
    }

    #[tokio::test]
    async fn failed_flush_names_the_batch() -> anyhow::Result<()> {
        let writer = MemoryWriter::new().fail_on_batch(2);
        let sink = BatchedSink::new(writer.clone(), Target::new("memory", "t"), 2, 1)?
            .with_name("writer");
        let outcome = run_stage(sink, numbered(8)).await;
        let Err(PipelineError::FlushFailure { stage, batch, .. }) = outcome.result else {
            anyhow::bail!("expected a flush failure, got {:?}", outcome.result);
        };
        assert_eq!((stage.as_str(), batch), ("writer", 2));
        // concurrency 1: nothing starts after the failing batch
        assert_eq!(writer.batches().len(), 1);
        assert_eq!(writer.close_count(), 1);
        assert!(!outcome.ended);
        Ok(())
    }

    #[tokio::test]
    async fn slow_flush_times_out() -> anyhow::Result<()> {
        let writer = MemoryWriter::new().with_delay(Duration::from_secs(5));
        let sink = BatchedSink::new(writer, Target::new("memory", "t"), 10, 1)?
            .with_flush_timeout(Some(Duration::from_millis(20)));
        let outcome = run_stage(sink, numbered(3)).await;
        assert!(matches!(
            outcome.result,
            Err(PipelineError::FlushFailure { batch: 1, .. })
        ));
        Ok(())
    }
}
