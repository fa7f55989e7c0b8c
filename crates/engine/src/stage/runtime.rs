//! Turns user functions into stages.
//!
//! Per-record functions are awaited one record at a time, so a stage never
//! reorders its input and never reads ahead of its function. Materializing
//! functions see the whole input at once, after end of sequence.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rowflow_model::Record;

use crate::channel::{Inlet, Outlet};
use crate::error::{PipelineError, Result};
use crate::item::Item;
use crate::stage::{Stage, fail_with};

pub type MapFn = Box<dyn FnMut(Record) -> BoxFuture<'static, anyhow::Result<Option<Record>>> + Send>;
pub type FilterFn = Box<dyn FnMut(&Record) -> bool + Send>;
pub type MaterializeFn =
    Box<dyn FnOnce(Vec<Record>) -> BoxFuture<'static, anyhow::Result<Vec<Item>>> + Send>;
/// Runs once after the last input record; its records are emitted before
/// end of sequence.
pub type Finalizer = Box<dyn FnOnce() -> anyhow::Result<Vec<Record>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    PerRecord,
    Filter,
    Materialize,
}

pub enum StageFunction {
    Map(MapFn),
    Filter(FilterFn),
    Materialize(MaterializeFn),
}

impl StageFunction {
    /// Async per-record function: `Some` is emitted, `None` drops the record.
    pub fn map<F, Fut>(mut function: F) -> Self
    where
        F: FnMut(Record) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<Record>>> + Send + 'static,
    {
        StageFunction::Map(Box::new(move |record| function(record).boxed()))
    }

    pub fn map_sync<F>(mut function: F) -> Self
    where
        F: FnMut(Record) -> anyhow::Result<Option<Record>> + Send + 'static,
    {
        StageFunction::Map(Box::new(move |record| {
            futures_util::future::ready(function(record)).boxed()
        }))
    }

    pub fn filter<F>(predicate: F) -> Self
    where
        F: FnMut(&Record) -> bool + Send + 'static,
    {
        StageFunction::Filter(Box::new(predicate))
    }

    pub fn materialize<F, Fut>(function: F) -> Self
    where
        F: FnOnce(Vec<Record>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Vec<Item>>> + Send + 'static,
    {
        StageFunction::Materialize(Box::new(move |records| function(records).boxed()))
    }

    pub fn discipline(&self) -> Discipline {
        match self {
            StageFunction::Map(_) => Discipline::PerRecord,
            StageFunction::Filter(_) => Discipline::Filter,
            StageFunction::Materialize(_) => Discipline::Materialize,
        }
    }
}

pub fn finalizer<F>(function: F) -> Option<Finalizer>
where
    F: FnOnce() -> anyhow::Result<Vec<Record>> + Send + 'static,
{
    Some(Box::new(function))
}

/// What to do when a function reports [`crate::MalformedInput`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Log a warning and drop the record.
    #[default]
    Skip,
    /// Fail the run.
    Abort,
}

pub struct RuntimeStage {
    name: String,
    function: StageFunction,
    finalizer: Option<Finalizer>,
    malformed: MalformedPolicy,
}

pub fn build_stage(
    name: impl Into<String>,
    function: StageFunction,
    finalizer: Option<Finalizer>,
) -> RuntimeStage {
    RuntimeStage {
        name: name.into(),
        function,
        finalizer,
        malformed: MalformedPolicy::default(),
    }
}

impl RuntimeStage {
    pub fn abort_on_malformed(mut self) -> Self {
        self.malformed = MalformedPolicy::Abort;
        self
    }

    pub fn discipline(&self) -> Discipline {
        self.function.discipline()
    }

    pub fn malformed_policy(&self) -> MalformedPolicy {
        self.malformed
    }

    async fn execute(self, mut input: Inlet, output: Outlet) -> Result<()> {
        let RuntimeStage {
            name,
            function,
            finalizer,
            malformed,
        } = self;
        tracing::debug!(stage = %name, discipline = ?function.discipline(), "stage started");

        let result = async {
            let mut transducer = Transducer {
                name: &name,
                malformed,
                skipped: 0,
            };
            transducer.consume(function, &mut input, &output).await?;
            if let Some(finalizer) = finalizer {
                let records =
                    finalizer().map_err(|error| PipelineError::from_stage_fn(&name, error))?;
                for record in records {
                    output.send(record).await?;
                }
            }
            if transducer.skipped > 0 {
                tracing::warn!(stage = %name, skipped = transducer.skipped, "malformed records skipped");
            }
            Result::<()>::Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(stage = %name, "stage finished");
                output.end().await
            }
            Err(error) => fail_with(output, error).await,
        }
    }
}

impl Stage for RuntimeStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, input: Inlet, output: Outlet) -> BoxFuture<'static, Result<()>> {
        (*self).execute(input, output).boxed()
    }
}

struct Transducer<'a> {
    name: &'a str,
    malformed: MalformedPolicy,
    skipped: u64,
}

impl Transducer<'_> {
    async fn consume(
        &mut self,
        function: StageFunction,
        input: &mut Inlet,
        output: &Outlet,
    ) -> Result<()> {
        match function {
            StageFunction::Map(mut map) => {
                while let Some(item) = input.recv().await? {
                    let Item::Record(record) = item else {
                        output.send(item).await?;
                        continue;
                    };
                    match map(record).await {
                        Ok(Some(record)) => output.send(record).await?,
                        Ok(None) => {}
                        Err(error) => self.reject(error)?,
                    }
                }
            }
            StageFunction::Filter(mut predicate) => {
                while let Some(item) = input.recv().await? {
                    match item {
                        Item::Record(record) if predicate(&record) => output.send(record).await?,
                        Item::Record(_) => {}
                        other => output.send(other).await?,
                    }
                }
            }
            StageFunction::Materialize(materialize) => {
                let mut records = Vec::new();
                while let Some(item) = input.recv().await? {
                    match item {
                        Item::Record(record) => records.push(record),
                        other => output.send(other).await?,
                    }
                }
                tracing::debug!(stage = %self.name, records = records.len(), "input materialized");
                let items = materialize(records)
                    .await
                    .map_err(|error| PipelineError::from_stage_fn(self.name, error))?;
                for item in items {
                    output.send(item).await?;
                }
            }
        }
        Ok(())
    }

    fn reject(&mut self, error: anyhow::Error) -> Result<()> {
        match PipelineError::from_stage_fn(self.name, error) {
            PipelineError::MalformedInput { reason, .. } if self.malformed == MalformedPolicy::Skip => {
                tracing::warn!(stage = %self.name, %reason, "skipping malformed record");
                self.skipped += 1;
                Ok(())
            }
            error => Err(error),
        }
    }
}
