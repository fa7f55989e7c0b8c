/// Failure of a pipeline run. Every variant that originates in a stage
/// carries that stage's name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("stage `{stage}`: malformed input: {reason}")]
    MalformedInput { stage: String, reason: String },

    #[error("stage `{stage}`: flush of batch #{batch} failed: {reason}")]
    FlushFailure {
        stage: String,
        batch: u64,
        reason: String,
    },

    #[error("stage `{stage}` failed: {reason}")]
    StageFailure { stage: String, reason: String },

    #[error("source `{source_name}` failed: {reason}")]
    SourceFailure { source_name: String, reason: String },

    #[error("stage `{stage}`: upstream closed without end of sequence")]
    UpstreamClosed { stage: String },

    #[error("stage `{stage}`: downstream closed")]
    DownstreamClosed { stage: String },

    #[error("stage `{stage}` cannot handle item of kind `{item}`")]
    UnexpectedItem { stage: String, item: &'static str },

    #[error("stage `{stage}`: invalid configuration: {reason}")]
    InvalidConfig { stage: String, reason: String },

    #[error("stage `{stage}` panicked")]
    Panicked { stage: String },

    #[error("pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Name of the stage (or source) the error is attributed to.
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::MalformedInput { stage, .. }
            | PipelineError::FlushFailure { stage, .. }
            | PipelineError::StageFailure { stage, .. }
            | PipelineError::UpstreamClosed { stage }
            | PipelineError::DownstreamClosed { stage }
            | PipelineError::UnexpectedItem { stage, .. }
            | PipelineError::InvalidConfig { stage, .. }
            | PipelineError::Panicked { stage } => Some(stage),
            PipelineError::SourceFailure { source_name, .. } => Some(source_name),
            PipelineError::Cancelled => None,
        }
    }

    /// Errors that are a consequence of another task's failure rather than
    /// the cause of it.
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamClosed { .. }
                | PipelineError::DownstreamClosed { .. }
                | PipelineError::Cancelled
        )
    }

    /// Classifies an error returned by a user function running in `stage`.
    pub fn from_stage_fn(stage: &str, error: anyhow::Error) -> Self {
        match error.downcast::<MalformedInput>() {
            Ok(MalformedInput(reason)) => PipelineError::MalformedInput {
                stage: stage.to_owned(),
                reason,
            },
            Err(error) => PipelineError::StageFailure {
                stage: stage.to_owned(),
                reason: format!("{error:#}"),
            },
        }
    }
}

/// Returned by stage functions (through `anyhow`) when a record cannot be
/// processed. Stages skip such records unless told to abort.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct MalformedInput(pub String);

impl MalformedInput {
    pub fn new(reason: impl Into<String>) -> Self {
        MalformedInput(reason.into())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
