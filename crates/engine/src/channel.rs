//! Typed ends of the bounded channels that connect stages.
//!
//! A channel carries items followed by exactly one terminal message: either
//! `End` or `Error`. A sender dropped before sending a terminal message is
//! observed downstream as [`PipelineError::UpstreamClosed`].

use tokio::sync::mpsc;

use crate::error::{PipelineError, Result};
use crate::item::Item;

#[derive(Debug)]
pub enum Message {
    Item(Item),
    End,
    Error(PipelineError),
}

pub fn bounded(capacity: usize) -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
    mpsc::channel(capacity)
}

/// Receiving end, owned by the stage reading from it.
pub struct Inlet {
    rx: mpsc::Receiver<Message>,
    stage: String,
    finished: bool,
}

impl Inlet {
    pub fn new(rx: mpsc::Receiver<Message>, stage: impl Into<String>) -> Self {
        Inlet {
            rx,
            stage: stage.into(),
            finished: false,
        }
    }

    /// Next item, or `None` at end of sequence. An upstream error is
    /// returned as is.
    pub async fn recv(&mut self) -> Result<Option<Item>> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Message::Item(item)) => Ok(Some(item)),
            Some(Message::End) => {
                self.finished = true;
                Ok(None)
            }
            Some(Message::Error(error)) => {
                self.finished = true;
                Err(error)
            }
            None => {
                self.finished = true;
                Err(PipelineError::UpstreamClosed {
                    stage: self.stage.clone(),
                })
            }
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }
}

/// Sending end, owned by the stage writing to it. The terminal methods take
/// `self`, so a stage can end its output at most once.
pub struct Outlet {
    tx: mpsc::Sender<Message>,
    stage: String,
}

impl Outlet {
    pub fn new(tx: mpsc::Sender<Message>, stage: impl Into<String>) -> Self {
        Outlet {
            tx,
            stage: stage.into(),
        }
    }

    /// Waits for room downstream, then sends.
    pub async fn send(&self, item: impl Into<Item>) -> Result<()> {
        self.tx
            .send(Message::Item(item.into()))
            .await
            .map_err(|_| PipelineError::DownstreamClosed {
                stage: self.stage.clone(),
            })
    }

    pub async fn end(self) -> Result<()> {
        self.tx
            .send(Message::End)
            .await
            .map_err(|_| PipelineError::DownstreamClosed { stage: self.stage })
    }

    /// Forwards `error` downstream. Best effort: a closed downstream has
    /// already stopped listening.
    pub async fn fail(self, error: PipelineError) {
        let _ = self.tx.send(Message::Error(error)).await;
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_model::Record;

    #[tokio::test]
    async fn end_is_reported_once() -> anyhow::Result<()> {
        let (tx, rx) = bounded(4);
        let outlet = Outlet::new(tx, "producer");
        let mut inlet = Inlet::new(rx, "consumer");

        outlet.send(Record::new().with("a", 1)).await?;
        outlet.end().await?;

        assert!(inlet.recv().await?.is_some());
        assert!(inlet.recv().await?.is_none());
        assert!(inlet.recv().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_sender_is_upstream_closed() {
        let (tx, rx) = bounded(1);
        drop(tx);
        let mut inlet = Inlet::new(rx, "consumer");
        assert_eq!(
            inlet.recv().await.unwrap_err(),
            PipelineError::UpstreamClosed {
                stage: "consumer".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn closed_receiver_is_downstream_closed() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let outlet = Outlet::new(tx, "producer");
        assert!(matches!(
            outlet.send(Record::new()).await,
            Err(PipelineError::DownstreamClosed { .. })
        ));
    }
}
