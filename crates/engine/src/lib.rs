//! Linear record pipelines: a source, a chain of stages, a terminal.
//!
//! Every stage runs as its own task and talks to its neighbours over
//! bounded channels, so a slow stage (or a sink at its flush limit) slows
//! its producers down instead of letting buffers grow.

pub mod channel;
pub mod counter;
pub mod error;
pub mod item;
pub mod pipeline;
pub mod plugins;
pub mod registry;
pub mod sink;
pub mod source;
pub mod stage;
pub mod testkit;

pub use counter::{CounterReport, StepCounter, StepDirection, StepRow};
pub use error::{MalformedInput, PipelineError, Result};
pub use item::Item;
pub use pipeline::{Pipeline, PipelineBuilder, Resource, RunHandle, RunSummary};
pub use registry::Registry;
pub use sink::{Batch, BatchWriter, BatchedSink, FlushAck, JsonLinesWriter, MemoryWriter, Target};
pub use source::Source;
pub use stage::runtime::{Discipline, StageFunction, build_stage};
pub use stage::sort::{Collection, SortRun, sort_in, sort_out};
pub use stage::{BoxStage, Stage};
