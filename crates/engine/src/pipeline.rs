//! Wires a source, a chain of stages and a terminal collector into tasks
//! joined by bounded channels.
//!
//! IMPLEMENTATION NOTES:
//! An error travels downstream inside the channels, so every task below the
//! failing one returns the same error. Tasks above it notice a closed
//! downstream, and the source is cancelled through the run's token. The run
//! therefore sees one originating error plus echoes of it; it resolves with
//! the error reported by the task that raised it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::channel::{Inlet, Outlet, bounded};
use crate::counter::{CounterReport, StepCounter, StepDirection};
use crate::error::{PipelineError, Result};
use crate::item::Item;
use crate::sink::FlushAck;
use crate::source::Source;
use crate::stage::sort::Collection;
use crate::stage::{BoxStage, Stage};

/// Something a pipeline holds for the duration of a run: a connection, a
/// temporary file, a lock. Released exactly once, whatever way the run
/// ends.
pub trait Resource: Send {
    fn name(&self) -> &str;

    fn release(&mut self) -> anyhow::Result<()>;
}

struct CleanupGuard {
    resources: Vec<Box<dyn Resource>>,
}

impl CleanupGuard {
    fn new(resources: Vec<Box<dyn Resource>>) -> Self {
        CleanupGuard { resources }
    }

    /// Releases in reverse registration order. Failures are logged, they do
    /// not change the run's outcome.
    fn release(&mut self) {
        while let Some(mut resource) = self.resources.pop() {
            match resource.release() {
                Ok(()) => tracing::debug!(resource = resource.name(), "resource released"),
                Err(error) => {
                    tracing::warn!(resource = resource.name(), error = %format!("{error:#}"), "cannot release resource")
                }
            }
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct PipelineBuilder {
    name: String,
    source: Option<Source>,
    stages: Vec<BoxStage>,
    resources: Vec<Box<dyn Resource>>,
    counter: Option<StepCounter>,
    channel_capacity: usize,
    collect_output: bool,
}

impl PipelineBuilder {
    pub fn source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn stage(self, stage: impl Stage) -> Self {
        self.boxed_stage(Box::new(stage))
    }

    pub fn boxed_stage(mut self, stage: BoxStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Counts records entering and leaving every stage, under the stage's
    /// name.
    pub fn counter(mut self, counter: &StepCounter) -> Self {
        self.counter = Some(counter.clone());
        self
    }

    pub fn resource(mut self, resource: impl Resource + 'static) -> Self {
        self.resources.push(Box::new(resource));
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_config(self, config: &rowflow_config::EngineConfig) -> Self {
        self.channel_capacity(config.channel_capacity)
    }

    /// Drops terminal items instead of returning them in the summary.
    pub fn discard_output(mut self) -> Self {
        self.collect_output = false;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let PipelineBuilder {
            name,
            source,
            stages,
            resources,
            counter,
            channel_capacity,
            collect_output,
        } = self;
        // Released on drop if the pipeline is never built or run.
        let guard = CleanupGuard::new(resources);

        let Some(source) = source else {
            return Err(PipelineError::InvalidConfig {
                stage: name,
                reason: "pipeline has no source".to_owned(),
            });
        };
        if channel_capacity == 0 {
            return Err(PipelineError::InvalidConfig {
                stage: name,
                reason: "channel capacity must be greater than zero".to_owned(),
            });
        }

        let stages = match &counter {
            Some(counter) => {
                let mut seen: HashMap<String, usize> = HashMap::new();
                stages
                    .into_iter()
                    .flat_map(|stage| {
                        // Repeated stage names count as separate steps: `name`, `name#2`, ...
                        let occurrence = seen.entry(stage.name().to_owned()).or_default();
                        *occurrence += 1;
                        let step = match *occurrence {
                            1 => stage.name().to_owned(),
                            n => format!("{}#{n}", stage.name()),
                        };
                        let entered: BoxStage = Box::new(counter.count_stream(&step, StepDirection::In));
                        let left: BoxStage = Box::new(counter.count_stream(&step, StepDirection::Out));
                        [entered, stage, left]
                    })
                    .collect()
            }
            None => stages,
        };

        Ok(Pipeline {
            name,
            source,
            stages,
            guard,
            counter,
            channel_capacity,
            collect_output,
        })
    }
}

enum TaskExit {
    Finished,
    Collected(Vec<Item>),
}

/// A built pipeline, consumed by [`Pipeline::run`] or [`Pipeline::spawn`].
/// Its resources are released when the run ends, or on drop if it never
/// does.
pub struct Pipeline {
    name: String,
    source: Source,
    stages: Vec<BoxStage>,
    guard: CleanupGuard,
    counter: Option<StepCounter>,
    channel_capacity: usize,
    collect_output: bool,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            source: None,
            stages: Vec::new(),
            resources: Vec::new(),
            counter: None,
            channel_capacity: rowflow_config::EngineConfig::default().channel_capacity,
            collect_output: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs to completion. Every task has finished by the time this
    /// resolves, and resources have been released.
    pub async fn run(self) -> Result<RunSummary> {
        let span = tracing::info_span!("pipeline", name = %self.name);
        self.execute(CancellationToken::new()).instrument(span).await
    }

    /// Runs on a separate task. The handle can cancel the run; dropping it
    /// leaves the run going.
    pub fn spawn(self) -> RunHandle {
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let span = tracing::info_span!("pipeline", name = %self.name);
        let name = self.name.clone();
        let run = self.execute(cancel.clone()).instrument(span);
        tokio::spawn(run.map(move |result| {
            let _ = tx.send(result);
        }));
        RunHandle {
            name,
            completion: rx,
            cancel,
        }
    }

    async fn execute(self, cancel: CancellationToken) -> Result<RunSummary> {
        let Pipeline {
            name,
            source,
            stages,
            mut guard,
            counter,
            channel_capacity,
            collect_output,
        } = self;
        let started = Instant::now();
        let internal = cancel.child_token();
        tracing::info!(stages = stages.len(), "pipeline started");

        let mut tasks: JoinSet<Result<TaskExit>> = JoinSet::new();
        let mut names: HashMap<Id, String> = HashMap::new();

        let source_name = source.name().to_owned();
        let (tx, mut rx) = bounded(channel_capacity);
        let pump = source
            .pump(Outlet::new(tx, &source_name), internal.clone())
            .map(|result| result.map(|()| TaskExit::Finished));
        names.insert(tasks.spawn(pump.in_current_span()).id(), source_name);

        for stage in stages {
            let stage_name = stage.name().to_owned();
            let (tx, next_rx) = bounded(channel_capacity);
            let run = stage
                .run(Inlet::new(rx, &stage_name), Outlet::new(tx, &stage_name))
                .map(|result| result.map(|()| TaskExit::Finished));
            names.insert(tasks.spawn(run.in_current_span()).id(), stage_name);
            rx = next_rx;
        }

        let collector = collect(Inlet::new(rx, name.as_str()), collect_output);
        names.insert(tasks.spawn(collector.in_current_span()).id(), name.clone());

        let mut outcome = Outcome::default();
        let mut items = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, error) = match joined {
                Ok((_, Ok(TaskExit::Finished))) => continue,
                Ok((_, Ok(TaskExit::Collected(collected)))) => {
                    items = collected;
                    continue;
                }
                Ok((id, Err(error))) => (id, error),
                Err(join_error) => {
                    let stage = names.get(&join_error.id()).cloned().unwrap_or_default();
                    let error = if join_error.is_panic() {
                        PipelineError::Panicked { stage }
                    } else {
                        PipelineError::Cancelled
                    };
                    (join_error.id(), error)
                }
            };
            let task = names.get(&id).map(String::as_str).unwrap_or_default();
            if outcome.record(task, error) {
                internal.cancel();
            }
        }
        guard.release();

        let steps = match &counter {
            Some(counter) => {
                let report = counter.report();
                counter.reset();
                report
            }
            None => CounterReport::default(),
        };

        match outcome.into_error() {
            Some(error) => {
                tracing::error!(%error, "pipeline failed");
                Err(error)
            }
            None => {
                let elapsed = started.elapsed();
                tracing::info!(items = items.len(), ?elapsed, "pipeline finished");
                Ok(RunSummary {
                    pipeline: name,
                    items,
                    steps,
                    elapsed,
                })
            }
        }
    }
}

async fn collect(mut input: Inlet, keep: bool) -> Result<TaskExit> {
    let mut items = Vec::new();
    while let Some(item) = input.recv().await? {
        if keep {
            items.push(item);
        }
    }
    Ok(TaskExit::Collected(items))
}

/// Errors reported by a run's tasks, ranked.
#[derive(Default)]
struct Outcome {
    originating: Option<PipelineError>,
    forwarded: Option<PipelineError>,
    secondary: Option<PipelineError>,
}

impl Outcome {
    /// Returns true for the first error that is not a side effect of
    /// another one.
    fn record(&mut self, task: &str, error: PipelineError) -> bool {
        let first_primary = self.originating.is_none() && self.forwarded.is_none();
        if error.is_secondary() {
            self.secondary.get_or_insert(error);
            return false;
        }
        if error.stage() == Some(task) {
            self.originating.get_or_insert(error);
        } else {
            self.forwarded.get_or_insert(error);
        }
        first_primary
    }

    fn into_error(self) -> Option<PipelineError> {
        self.originating.or(self.forwarded).or(self.secondary)
    }
}

/// What a successful run hands back.
#[derive(Debug)]
pub struct RunSummary {
    pub pipeline: String,
    /// Items that reached the end of the pipeline, empty with
    /// `discard_output`.
    pub items: Vec<Item>,
    pub steps: CounterReport,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn records(&self) -> impl Iterator<Item = &rowflow_model::Record> {
        self.items.iter().filter_map(Item::as_record)
    }

    pub fn acks(&self) -> impl Iterator<Item = &FlushAck> {
        self.items.iter().filter_map(|item| match item {
            Item::Ack(ack) => Some(ack),
            _ => None,
        })
    }

    /// First collection among the terminal items, as left by a pipeline
    /// ending in `sort_in`.
    pub fn into_collection(self) -> Option<Collection> {
        self.items.into_iter().find_map(|item| match item {
            Item::Collection(collection) => Some(collection),
            _ => None,
        })
    }
}

pub struct RunHandle {
    name: String,
    completion: tokio::sync::oneshot::Receiver<Result<RunSummary>>,
    cancel: CancellationToken,
}

impl RunHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the source; the run then winds down and resolves with
    /// [`PipelineError::Cancelled`] unless it failed first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn completion(self) -> Result<RunSummary> {
        self.completion
            .await
            .unwrap_or(Err(PipelineError::Panicked { stage: self.name }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::records;
    use rowflow_model::{Record, json};

    #[tokio::test]
    async fn empty_pipeline_returns_source_records() -> anyhow::Result<()> {
        let input = records(json!([{"a": 1}, {"a": 2}]));
        let summary = Pipeline::builder("echo")
            .source(Source::from_records("input", input.clone()))
            .build()?
            .run()
            .await?;
        assert_eq!(summary.pipeline, "echo");
        assert_eq!(summary.records().cloned().collect::<Vec<_>>(), input);
        Ok(())
    }

    #[test]
    fn pipeline_needs_a_source() {
        assert!(matches!(
            Pipeline::builder("empty").build(),
            Err(PipelineError::InvalidConfig { .. })
        ));
        assert!(matches!(
            Pipeline::builder("empty")
                .source(Source::from_records("input", Vec::<Record>::new()))
                .channel_capacity(0)
                .build(),
            Err(PipelineError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn forwarded_errors_rank_below_originating_ones() {
        let failure = PipelineError::StageFailure {
            stage: "b".to_owned(),
            reason: "boom".to_owned(),
        };
        let mut outcome = Outcome::default();
        assert!(!outcome.record(
            "a",
            PipelineError::DownstreamClosed {
                stage: "a".to_owned()
            }
        ));
        assert!(outcome.record("c", failure.clone()));
        assert!(!outcome.record("b", failure.clone()));
        assert_eq!(outcome.into_error(), Some(failure));
    }
}
