pub mod runtime;
pub mod sort;

use futures_util::future::BoxFuture;

use crate::channel::{Inlet, Outlet};
use crate::error::Result;

/// Named unidirectional transducer between two channels.
///
/// A stage reads until its inlet reports end of sequence, then ends its
/// outlet exactly once. On failure it forwards the error downstream (unless
/// the downstream is gone) and returns it.
pub trait Stage: Send + 'static {
    fn name(&self) -> &str;

    fn run(self: Box<Self>, input: Inlet, output: Outlet) -> BoxFuture<'static, Result<()>>;
}

pub type BoxStage = Box<dyn Stage>;

/// Shared tail of every stage: forward the error unless it came from the
/// downstream side, then hand it back to the task.
pub(crate) async fn fail_with(output: Outlet, error: crate::PipelineError) -> Result<()> {
    if !matches!(error, crate::PipelineError::DownstreamClosed { .. }) {
        output.fail(error.clone()).await;
    }
    Err(error)
}
