use thiserror::Error;

#[derive(Error, Debug)]
/// Batch error
///
/// Every failure raised while assembling or running a step. Item level
/// failures (`ItemProcessor`, `ItemWriter`) are recoverable and may be skipped
/// by an [`ExceptionHandler`](crate::core::exception::ExceptionHandler);
/// everything else aborts the step attempt.
pub enum BatchError {
    /// Caller misuse, for example a chunk size of zero.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Resource acquisition or release failure in an `ItemStream`.
    #[error("ItemStream from: {0}")]
    Stream(String),

    /// Failure while reading one item.
    #[error("ItemReader from: {0}")]
    ItemReader(String),

    #[error("ItemProcessor from: {0}")]
    ItemProcessor(String),

    #[error("ItemWriter from: {0}")]
    ItemWriter(String),

    /// A typed `ExecutionContext` accessor found another type under the key.
    #[error("Value for key=[{key}] is not of type [{expected}], it is [{found}]")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A value that can not survive a restart, or an illegal state transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Severe environment failure. Never skipped.
    #[error("{0}")]
    Fatal(String),

    /// A failure escalated by an exception handler, original cause attached.
    #[error("{handler} escalated: {source}")]
    Escalated {
        handler: &'static str,
        #[source]
        source: Box<BatchError>,
    },

    #[error("Skip limit of {limit} exceeded: {source}")]
    SkipLimitExceeded {
        limit: usize,
        #[source]
        source: Box<BatchError>,
    },

    #[error("JobRepository from: {0}")]
    Repository(String),

    #[error("Step {name} failed: {source}")]
    Step {
        name: String,
        #[source]
        source: Box<BatchError>,
    },
}

impl BatchError {
    /// Returns `true` for per-item failures that a skip policy may absorb.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BatchError::ItemProcessor(_) | BatchError::ItemWriter(_))
    }

    /// Returns `true` for `Error`-class failures that must always escalate.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BatchError::Fatal(_))
    }

    /// Short category name, used as counter key by exception handlers.
    pub fn kind(&self) -> &'static str {
        match self {
            BatchError::InvalidArgument(_) => "invalid_argument",
            BatchError::Stream(_) => "stream",
            BatchError::ItemReader(_) => "read",
            BatchError::ItemProcessor(_) => "process",
            BatchError::ItemWriter(_) => "write",
            BatchError::TypeMismatch { .. } => "type_mismatch",
            BatchError::InvalidState(_) => "invalid_state",
            BatchError::Fatal(_) => "fatal",
            BatchError::Escalated { .. } => "escalated",
            BatchError::SkipLimitExceeded { .. } => "skip_limit_exceeded",
            BatchError::Repository(_) => "repository",
            BatchError::Step { .. } => "step",
        }
    }
}
