//! Error types for signing orchestration and amount conversion

use thiserror::Error;

/// Result type for staking core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Staking core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected input (bad amount literal, zero multiplier, excess precision)
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// Poll loop exceeded its deadline before a terminal status was seen
    #[error("Remote signing operation {operation_id} timed out after {waited_ms}ms")]
    RemoteSigningTimeout {
        /// Remote operation ID
        operation_id: String,
        /// Time spent waiting
        waited_ms: u64,
    },

    /// Backend reported a terminal failure status
    #[error("Remote signing operation {operation_id} ended {status}: {reason}")]
    RemoteSigningRejected {
        /// Remote operation ID
        operation_id: String,
        /// Terminal status literal (FAILED, BLOCKED, ...)
        status: String,
        /// Backend substatus or generic description
        reason: String,
    },

    /// Backend violated the signing protocol
    #[error("Remote signing integrity violation: {0}")]
    RemoteSigningIntegrity(String),

    /// Public key in the signing result does not belong to the requested signer
    #[error("Address mismatch: requested {expected}, signature key derives to [{}]", candidates.join(", "))]
    AddressMismatch {
        /// Address that was asked to sign
        expected: String,
        /// Addresses derived from the returned public key
        candidates: Vec<String>,
    },

    /// Failure of a single HTTP/RPC call
    #[error("Transport error: {0}")]
    Transport(String),

    /// Custody API refused the request itself (bad credentials, unknown
    /// operation); asking again gets the same answer
    #[error("Custody API refused the request with {status_code}: {message}")]
    CustodyApi {
        /// HTTP status code
        status_code: u16,
        /// Response body
        message: String,
    },

    /// Invalid lifecycle transition
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        /// Current state
        from: String,
        /// Target state
        to: String,
        /// Reason for rejection
        reason: String,
    },

    /// Worker or channel failure (serializer stopped, task panicked)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Chain adapter failure: the node or builder refused the transaction
    #[error("Chain error: {0}")]
    Chain(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an input validation error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InputValidation(msg.into())
    }

    /// Returns `true` for failures that a bounded loop may silently retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Returns `true` if the signature involved must never be used
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::AddressMismatch { .. } | Error::RemoteSigningIntegrity(_)
        )
    }
}
