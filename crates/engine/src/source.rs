use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, future};
use rowflow_model::Record;
use tokio_util::sync::CancellationToken;

use crate::channel::Outlet;
use crate::error::{PipelineError, Result};
use crate::stage::fail_with;

/// Head of a pipeline: an ordered stream of records that ends once or fails
/// once.
pub struct Source {
    name: String,
    stream: BoxStream<'static, anyhow::Result<Record>>,
}

impl Source {
    const BLOCKING_CAPACITY: usize = 256;

    pub fn from_stream<S>(name: impl Into<String>, stream: S) -> Self
    where
        S: futures_util::Stream<Item = anyhow::Result<Record>> + Send + 'static,
    {
        Source {
            name: name.into(),
            stream: stream.boxed(),
        }
    }

    pub fn from_records<I>(name: impl Into<String>, records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(name, stream::iter(records.into_iter().map(Ok)))
    }

    /// Stops at the first `Err`.
    pub fn from_results<I>(name: impl Into<String>, results: I) -> Self
    where
        I: IntoIterator<Item = anyhow::Result<Record>>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(name, stream::iter(results))
    }

    /// Drives a blocking iterator (file readers and the like) on the
    /// blocking thread pool. `open` runs there too, on first poll.
    pub fn from_blocking<F, I>(name: impl Into<String>, open: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<I> + Send + 'static,
        I: IntoIterator<Item = anyhow::Result<Record>>,
    {
        let records = stream::once(async move {
            let (tx, rx) = tokio::sync::mpsc::channel(Self::BLOCKING_CAPACITY);
            let reader = tokio::task::spawn_blocking(move || match open() {
                Ok(rows) => {
                    for row in rows {
                        let failed = row.is_err();
                        if tx.blocking_send(row).is_err() || failed {
                            break;
                        }
                    }
                }
                Err(error) => {
                    let _ = tx.blocking_send(Err(error));
                }
            });
            let rows = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|row| (row, rx))
            });
            let panicked = stream::once(async move {
                reader
                    .await
                    .err()
                    .map(|error| Err(anyhow::anyhow!("blocking reader failed: {error}")))
            })
            .filter_map(future::ready);
            rows.chain(panicked)
        })
        .flatten();
        Self::from_stream(name, records)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feeds the stream into `output` until it ends, fails, or `cancel`
    /// fires.
    pub(crate) async fn pump(self, output: Outlet, cancel: CancellationToken) -> Result<()> {
        let Source { name, mut stream } = self;
        tracing::debug!(source = %name, "source started");
        let mut emitted = 0u64;
        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(PipelineError::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(record)) => {
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
                        sent = output.send(record) => sent,
                    };
                    if let Err(error) = sent {
                        break Err(error);
                    }
                    emitted += 1;
                }
                Some(Err(error)) => {
                    break Err(PipelineError::SourceFailure {
                        source_name: name.clone(),
                        reason: format!("{error:#}"),
                    });
                }
                None => break Ok(()),
            }
        };
        match result {
            Ok(()) => {
                tracing::debug!(source = %name, emitted, "source finished");
                output.end().await
            }
            Err(error) => fail_with(output, error).await,
        }
    }
}
