use rowflow_engine::{Collection, RunSummary};

/// A contract for a service that performs Phase 1:
/// reading the input and sorting it into a single collection.
///
/// The returned summary carries the collection as its only item.
pub trait Sorter {
    fn run(&self) -> impl Future<Output = anyhow::Result<RunSummary>> + Send;
}

/// A contract for a service that performs Phase 2:
/// writing a sorted collection out in batches.
pub trait Loader {
    fn run(&self, sorted: Collection) -> impl Future<Output = anyhow::Result<RunSummary>> + Send;
}
