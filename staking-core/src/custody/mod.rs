//! Remote custody / MPC signing
//!
//! Custody backends sign asynchronously: an operation is created, then
//! polled until it reaches a terminal status. Human approval steps or
//! hardware quorums can keep an operation pending for a long time.
//!
//! - [`CustodyBackend`]: the backend's create/poll surface
//! - [`RemoteSigningSession`]: drives one operation to a terminal state
//! - [`RemoteSigner`]: [`Signer`] implementation, one session per call

mod session;

pub use session::{RemoteSigningSession, SessionConfig, SessionState};

use crate::signer::{SignData, SignOptions, Signature, Signer, SignerResult, SigningRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Remote operation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Accepted by the backend, not yet processing
    Created,
    /// Awaiting approval or signing
    Pending,
    /// Signed
    Completed,
    /// Signing failed
    Failed,
    /// Blocked by backend policy
    Blocked,
    /// Cancelled
    Cancelled,
    /// Rejected by an approver
    Rejected,
}

impl OperationStatus {
    /// Returns `true` once the operation will not change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Created | OperationStatus::Pending)
    }

    /// Terminal failure statuses
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OperationStatus::Failed
                | OperationStatus::Blocked
                | OperationStatus::Cancelled
                | OperationStatus::Rejected
        )
    }

    /// Wire literal
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Created => "CREATED",
            OperationStatus::Pending => "PENDING",
            OperationStatus::Completed => "COMPLETED",
            OperationStatus::Failed => "FAILED",
            OperationStatus::Blocked => "BLOCKED",
            OperationStatus::Cancelled => "CANCELLED",
            OperationStatus::Rejected => "REJECTED",
        }
    }

    /// Description used when the backend gives no substatus
    pub fn generic_reason(&self) -> &'static str {
        match self {
            OperationStatus::Failed => "signing operation failed",
            OperationStatus::Blocked => "signing operation blocked by backend policy",
            OperationStatus::Cancelled => "signing operation was cancelled",
            OperationStatus::Rejected => "signing operation was rejected",
            _ => "signing operation did not complete",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CREATED" => Ok(OperationStatus::Created),
            "PENDING" => Ok(OperationStatus::Pending),
            "COMPLETED" => Ok(OperationStatus::Completed),
            "FAILED" => Ok(OperationStatus::Failed),
            "BLOCKED" => Ok(OperationStatus::Blocked),
            "CANCELLED" => Ok(OperationStatus::Cancelled),
            "REJECTED" => Ok(OperationStatus::Rejected),
            other => Err(Error::RemoteSigningIntegrity(format!(
                "unknown operation status {other:?}"
            ))),
        }
    }
}

/// Operation as returned on creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOperation {
    /// Backend operation ID
    pub id: String,
    /// Initial status
    pub status: OperationStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Backend detail for the status
    pub substatus: Option<String>,
}

/// One signed message in a completed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    /// Signature
    pub signature: Signature,
    /// Public key used
    pub public_key: Vec<u8>,
}

/// Poll response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    /// Current status
    pub status: OperationStatus,
    /// Backend detail for the status
    pub substatus: Option<String>,
    /// Signed messages; populated on completion
    pub signed_messages: Vec<SignedMessage>,
}

/// Remote custody backend surface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustodyBackend: Send + Sync {
    /// Submit a raw signing operation
    async fn create_operation(&self, request: &SigningRequest) -> Result<RemoteOperation>;

    /// Fetch current operation state
    async fn get_operation(&self, operation_id: &str) -> Result<OperationSnapshot>;

    /// Public key behind an address
    async fn get_public_key(&self, address: &str) -> Result<Vec<u8>>;
}

/// [`Signer`] backed by a remote custody service
#[derive(Clone)]
pub struct RemoteSigner {
    backend: Arc<dyn CustodyBackend>,
    config: SessionConfig,
}

impl RemoteSigner {
    /// Create a remote signer
    pub fn new(backend: Arc<dyn CustodyBackend>, config: SessionConfig) -> Self {
        Self { backend, config }
    }

    /// Session settings
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    async fn sign(
        &self,
        signer_address: &str,
        data: SignData,
        options: SignOptions,
    ) -> Result<SignerResult> {
        let request = SigningRequest::new(signer_address, data, options)?;
        RemoteSigningSession::new(Arc::clone(&self.backend), self.config.clone())
            .run(request)
            .await
    }

    async fn get_public_key(&self, address: &str) -> Result<Vec<u8>> {
        self.backend.get_public_key(address).await
    }
}

impl fmt::Debug for RemoteSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSigner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
