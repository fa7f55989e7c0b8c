pub mod batched;
pub mod writers;

use rowflow_model::Record;

pub use batched::BatchedSink;
pub use writers::{JsonLinesWriter, MemoryWriter};

pub type Batch = Vec<Record>;

/// Where a writer puts batches. Its meaning belongs to the writer: a
/// directory and file stem, a database and table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub connection: String,
    pub table: String,
}

impl Target {
    pub fn new(connection: impl Into<String>, table: impl Into<String>) -> Self {
        Target {
            connection: connection.into(),
            table: table.into(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.connection, self.table)
    }
}

/// Emitted downstream of a batched sink once a batch is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushAck {
    /// 1-based batch number, in the order batches were started.
    pub batch: u64,
    pub records: usize,
    pub elapsed: std::time::Duration,
}

/// Destination of a [`BatchedSink`]. Several `write_batch` calls may run at
/// the same time; `close` is called once, after the last of them settled.
pub trait BatchWriter: Send + Sync + 'static {
    fn write_batch(
        &self,
        target: &Target,
        batch: Batch,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        async { Ok(()) }
    }
}
