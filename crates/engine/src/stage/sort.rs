//! Buffered multi-key sort.
//!
//! `sort_in` materializes its input and emits one [`Collection`]; `sort_out`
//! expands collections back into records. Between the two a collection can
//! also be handed back to the caller and restarted as a new pipeline with
//! [`Collection::into_source`].

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rowflow_model::{Record, SortKeySpec};

use crate::channel::{Inlet, Outlet};
use crate::error::{PipelineError, Result};
use crate::item::Item;
use crate::source::Source;
use crate::stage::runtime::{RuntimeStage, StageFunction, build_stage};
use crate::stage::{Stage, fail_with};

/// Records in the order given by `keys`.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    keys: SortKeySpec,
    records: Vec<Record>,
}

impl Collection {
    /// Sorts `records` stably by `keys`.
    pub fn sorted(keys: SortKeySpec, mut records: Vec<Record>) -> Self {
        // `sort_by` is stable: equal keys keep arrival order.
        records.sort_by(|left, right| keys.compare(left, right));
        Collection { keys, records }
    }

    pub fn keys(&self) -> &SortKeySpec {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Source replaying the collection in order.
    pub fn into_source(self) -> Source {
        Source::from_records(format!("collection[{}]", self.keys), self.records)
    }
}

/// Progress of one sort: records are collected, sorted once, then emitted.
#[derive(Debug)]
pub enum SortRun {
    Collecting(SortKeySpec, Vec<Record>),
    Sorted(Collection),
    Emitting(std::vec::IntoIter<Record>),
}

impl SortRun {
    pub fn collecting(keys: SortKeySpec, records: Vec<Record>) -> Self {
        SortRun::Collecting(keys, records)
    }

    pub fn push(&mut self, record: Record) {
        if let SortRun::Collecting(_, records) = self {
            records.push(record);
        }
    }

    pub fn sort(self) -> Self {
        match self {
            SortRun::Collecting(keys, records) => SortRun::Sorted(Collection::sorted(keys, records)),
            other => other,
        }
    }

    pub fn emit(self) -> Self {
        match self {
            SortRun::Sorted(collection) => SortRun::Emitting(collection.records.into_iter()),
            other => other,
        }
    }

    pub fn next_record(&mut self) -> Option<Record> {
        match self {
            SortRun::Emitting(records) => records.next(),
            _ => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection> {
        match self {
            SortRun::Sorted(collection) => Some(collection),
            _ => None,
        }
    }
}

impl From<Collection> for SortRun {
    fn from(collection: Collection) -> Self {
        SortRun::Sorted(collection)
    }
}

pub fn sort_in(keys: SortKeySpec) -> RuntimeStage {
    build_stage(
        "Sort.sortIn",
        StageFunction::materialize(move |records| async move {
            let collection: Vec<Item> = SortRun::collecting(keys, records)
                .sort()
                .into_collection()
                .into_iter()
                .map(Item::Collection)
                .collect();
            anyhow::Ok(collection)
        }),
        None,
    )
}

pub fn sort_out() -> SortOut {
    SortOut {
        name: "Sort.sortOut".to_owned(),
    }
}

pub struct SortOut {
    name: String,
}

impl SortOut {
    async fn execute(self, mut input: Inlet, output: Outlet) -> Result<()> {
        let result = async {
            while let Some(item) = input.recv().await? {
                match item {
                    Item::Collection(collection) => {
                        let mut run = SortRun::from(collection).emit();
                        while let Some(record) = run.next_record() {
                            output.send(record).await?;
                        }
                    }
                    Item::Record(_) => {
                        return Err(PipelineError::UnexpectedItem {
                            stage: self.name.clone(),
                            item: "record",
                        });
                    }
                    ack @ Item::Ack(_) => output.send(ack).await?,
                }
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

impl Stage for SortOut {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, input: Inlet, output: Outlet) -> BoxFuture<'static, Result<()>> {
        (*self).execute(input, output).boxed()
    }
}
