use thiserror::Error;

/// Convenience alias for `Result<T, EchelonError>`.
pub type EchelonResult<T> = Result<T, EchelonError>;

/// Top-level error type for the Echelon dispatch engine.
///
/// Each variant corresponds to a failure class in the orchestration
/// lifecycle. Invocation-level errors are absorbed into metrics by the
/// dispatch layer; only terminal conditions reach callers.
#[derive(Debug, Error)]
pub enum EchelonError {
    /// A malformed submission, rejected synchronously and never enqueued.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No registered tier can serve the required hierarchy level.
    #[error("Tier unavailable: {0}")]
    TierUnavailable(String),

    /// A backend raised an error or timed out during invocation.
    #[error("Tier invocation error: {0}")]
    TierInvocation(String),

    /// Consensus could not gather the minimum number of successful responses.
    #[error("Insufficient quorum: {successes} of {required} required successes")]
    InsufficientQuorum {
        /// Successful responses gathered before the round ended.
        successes: usize,
        /// Quorum size the round needed.
        required: usize,
    },

    /// The task was cancelled while in flight.
    #[error("Task cancelled: {0}")]
    Cancelled(String),

    /// Zero tiers registered at startup. Fatal and not recoverable.
    #[error("Registry misconfigured: {0}")]
    RegistryMisconfigured(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An underlying I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EchelonError {
    /// Stable error code recorded on terminal task reports.
    pub fn code(&self) -> &'static str {
        match self {
            EchelonError::Validation(_) => "VALIDATION_ERROR",
            EchelonError::TierUnavailable(_) => "TIER_UNAVAILABLE",
            EchelonError::TierInvocation(_) => "TIER_INVOCATION_ERROR",
            EchelonError::InsufficientQuorum { .. } => "INSUFFICIENT_QUORUM",
            EchelonError::Cancelled(_) => "CANCELLED",
            EchelonError::RegistryMisconfigured(_) => "REGISTRY_MISCONFIGURED",
            EchelonError::Config(_) => "CONFIG_ERROR",
            EchelonError::Serialization(_) => "SERIALIZATION_ERROR",
            EchelonError::Io(_) => "IO_ERROR",
        }
    }
}
