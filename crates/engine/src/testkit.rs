//! Helpers for driving a single stage without building a pipeline.

use rowflow_model::{Record, Value, records_from_json};

use crate::channel::{Inlet, Message, Outlet, bounded};
use crate::error::{PipelineError, Result};
use crate::item::Item;
use crate::stage::{BoxStage, Stage};

const CAPACITY: usize = 16;

/// Everything a stage produced, plus how it ended.
#[derive(Debug)]
pub struct StageOutcome {
    pub items: Vec<Item>,
    /// The stage sent end of sequence.
    pub ended: bool,
    /// The error the stage sent downstream, if any.
    pub error: Option<PipelineError>,
    /// What the stage task returned.
    pub result: Result<()>,
}

impl StageOutcome {
    pub fn records(&self) -> Vec<Record> {
        self.items.iter().filter_map(Item::as_record).cloned().collect()
    }
}

/// Parses a JSON array literal into records.
///
/// # Panics
///
/// When `value` is not an array of objects.
pub fn records(value: Value) -> Vec<Record> {
    records_from_json(value).expect("a JSON array of objects")
}

pub async fn run_stage(stage: impl Stage, input: Vec<Record>) -> StageOutcome {
    run_boxed_stage(Box::new(stage), input).await
}

pub async fn run_boxed_stage(stage: BoxStage, input: Vec<Record>) -> StageOutcome {
    let items = input.into_iter().map(Item::Record).collect();
    run_boxed_stage_items(stage, items).await
}

pub async fn run_stage_items(stage: impl Stage, input: Vec<Item>) -> StageOutcome {
    run_boxed_stage_items(Box::new(stage), input).await
}

async fn run_boxed_stage_items(stage: BoxStage, input: Vec<Item>) -> StageOutcome {
    let mut messages: Vec<Message> = input.into_iter().map(Message::Item).collect();
    messages.push(Message::End);
    run_boxed_stage_messages(stage, messages).await
}

/// Feeds `messages` verbatim; without a trailing `End` or `Error` the stage
/// sees its upstream close.
pub async fn run_stage_messages(stage: impl Stage, messages: Vec<Message>) -> StageOutcome {
    run_boxed_stage_messages(Box::new(stage), messages).await
}

pub async fn run_boxed_stage_messages(stage: BoxStage, messages: Vec<Message>) -> StageOutcome {
    let name = stage.name().to_owned();
    let (input_tx, input_rx) = bounded(CAPACITY);
    let (output_tx, mut output_rx) = bounded(CAPACITY);

    let task = tokio::spawn(stage.run(Inlet::new(input_rx, &name), Outlet::new(output_tx, &name)));
    let feeder = tokio::spawn(async move {
        for message in messages {
            if input_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut items = Vec::new();
    let mut ended = false;
    let mut error = None;
    while let Some(message) = output_rx.recv().await {
        match message {
            Message::Item(item) => items.push(item),
            Message::End => ended = true,
            Message::Error(sent) => error = Some(sent),
        }
    }

    let result = task
        .await
        .unwrap_or_else(|_| Err(PipelineError::Panicked { stage: name }));
    let _ = feeder.await;
    StageOutcome {
        items,
        ended,
        error,
        result,
    }
}
