//! Transaction lifecycle coordination
//!
//! ```text
//! BUILT ─► SIGNING ─► SIGNED ─► BROADCASTING ─► BROADCAST ─► SUCCESS | FAILURE | PENDING | UNKNOWN
//! ```
//!
//! A failed step ends [`TransactionLifecycleCoordinator::submit`] with that
//! step's error and no tracked transaction; retrying means submitting again.
//!
//! Chain-specific work (building, attaching signatures, broadcasting,
//! status lookups) is delegated to a [`ChainAdapter`]. The coordinator
//! owns the parts that must be right for every chain: signer verification,
//! ordered submission and status normalization.

use crate::config::NetworkConfig;
use crate::nonce::NonceRegistry;
use crate::serializer::RequestSerializer;
use crate::signer::{SignData, SignOptions, Signer};
use crate::status::{ChainNativeStatus, TxStatus};
use crate::verify::{SignatureVerifier, VerifiedSignature};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Opaque per-chain transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionHandle(String);

impl TransactionHandle {
    /// Wrap a chain identifier (tx hash, extrinsic hash, ...)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Underlying identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-chain collaborator
#[async_trait]
pub trait ChainAdapter: Send + Sync + 'static {
    /// Builder input (e.g. "delegate N to validator X")
    type Params: Send + 'static;
    /// Unsigned transaction
    type Unsigned: Send + Sync + 'static;
    /// Signed transaction
    type Signed: Send + 'static;

    /// Network name, for logs
    fn network(&self) -> &str;

    /// Build an unsigned transaction. `nonce` is set when nonces are
    /// caller-managed.
    async fn build(&self, params: Self::Params, nonce: Option<u64>) -> Result<Self::Unsigned>;

    /// Bytes the signer must sign
    fn signing_payload(&self, unsigned: &Self::Unsigned) -> Result<SignData>;

    /// Approval note shown by custody backends
    fn signing_note(&self, _unsigned: &Self::Unsigned) -> Option<String> {
        None
    }

    /// Attach a verified signature
    fn attach_signature(
        &self,
        unsigned: Self::Unsigned,
        signature: &VerifiedSignature,
    ) -> Result<Self::Signed>;

    /// Submit to the network. Node-side rejections are reported as
    /// [`Error::Chain`], unreachable nodes as [`Error::Transport`].
    async fn broadcast(&self, signed: Self::Signed) -> Result<TransactionHandle>;

    /// Chain-native status
    async fn get_status(&self, handle: &TransactionHandle) -> Result<ChainNativeStatus>;
}

/// Lifecycle state of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Unsigned payload built
    Built,
    /// Waiting on the signer
    Signing,
    /// Verified signature attached
    Signed,
    /// Submission in flight
    Broadcasting,
    /// Accepted by the node
    Broadcast,
    /// Executed successfully
    Success,
    /// Failed on chain
    Failure,
    /// Not yet final
    Pending,
    /// Status not recognized
    Unknown,
}

impl LifecycleState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Built, Signing)
            | (Signing, Signed)
            | (Signed, Broadcasting)
            | (Broadcasting, Broadcast)
            | (Broadcast | Pending | Unknown, Success | Failure | Pending | Unknown)
        )
    }

    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Success | LifecycleState::Failure)
    }
}

impl From<TxStatus> for LifecycleState {
    fn from(status: TxStatus) -> Self {
        match status {
            TxStatus::Success => LifecycleState::Success,
            TxStatus::Failure => LifecycleState::Failure,
            TxStatus::Pending => LifecycleState::Pending,
            TxStatus::Unknown => LifecycleState::Unknown,
        }
    }
}

/// State machine with transition history
#[derive(Debug, Clone)]
pub struct Lifecycle {
    current: LifecycleState,
    history: Vec<(LifecycleState, DateTime<Utc>)>,
}

impl Lifecycle {
    /// Start at [`LifecycleState::Built`]
    pub fn new() -> Self {
        Self {
            current: LifecycleState::Built,
            history: vec![(LifecycleState::Built, Utc::now())],
        }
    }

    /// Current state
    pub fn current(&self) -> LifecycleState {
        self.current
    }

    /// Every state entered, oldest first
    pub fn history(&self) -> &[(LifecycleState, DateTime<Utc>)] {
        &self.history
    }

    /// Transition to next state
    pub fn transition(&mut self, next: LifecycleState) -> Result<()> {
        if self.current.is_terminal() {
            return Err(Error::InvalidStateTransition {
                from: format!("{:?}", self.current),
                to: format!("{:?}", next),
                reason: "current state is terminal".to_string(),
            });
        }

        if !self.current.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: format!("{:?}", self.current),
                to: format!("{:?}", next),
                reason: "transition not allowed by lifecycle".to_string(),
            });
        }

        self.current = next;
        self.history.push((next, Utc::now()));
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// A broadcast transaction and its lifecycle
#[derive(Debug, Clone)]
pub struct TrackedTransaction {
    /// Signer that authorized it
    pub signer_address: String,
    /// Chain handle
    pub handle: TransactionHandle,
    /// Nonce used, when caller-managed
    pub nonce: Option<u64>,
    /// Lifecycle so far
    pub lifecycle: Lifecycle,
}

/// Composes build, sign, verify, broadcast and status for one chain
pub struct TransactionLifecycleCoordinator<A: ChainAdapter> {
    adapter: Arc<A>,
    verifier: SignatureVerifier,
    serializer: Option<RequestSerializer>,
    nonces: Option<Arc<NonceRegistry>>,
}

impl<A: ChainAdapter> TransactionLifecycleCoordinator<A> {
    /// Create a coordinator. With `ordered_broadcast` this spawns the
    /// submission queue, so it must run inside a Tokio runtime.
    pub fn new(adapter: Arc<A>, verifier: SignatureVerifier, network: &NetworkConfig) -> Self {
        let serializer = network
            .ordered_broadcast
            .then(|| RequestSerializer::new(format!("{}-broadcast", network.name)));
        let nonces = network
            .caller_managed_nonce
            .then(|| Arc::new(NonceRegistry::new()));

        Self {
            adapter,
            verifier,
            serializer,
            nonces,
        }
    }

    /// Use a shared nonce registry (implies caller-managed nonces)
    pub fn with_nonce_registry(mut self, registry: Arc<NonceRegistry>) -> Self {
        self.nonces = Some(registry);
        self
    }

    /// Use a shared submission queue (implies ordered broadcast)
    pub fn with_serializer(mut self, serializer: RequestSerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Whether broadcasts go through the ordered queue
    pub fn requires_ordering(&self) -> bool {
        self.serializer.is_some()
    }

    /// Chain adapter
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Build an unsigned transaction, drawing a nonce when caller-managed
    pub async fn build(&self, params: A::Params, signer_address: &str) -> Result<A::Unsigned> {
        let nonce = self.nonces.as_ref().map(|nonces| nonces.next(signer_address));
        if let Some(nonce) = nonce {
            debug!("Issued nonce {} for {}", nonce, signer_address);
        }
        self.adapter.build(params, nonce).await
    }

    /// Sign, verify the signer and attach the signature.
    ///
    /// A signature whose key does not derive to `signer_address` is
    /// discarded before the adapter sees it.
    pub async fn sign(
        &self,
        unsigned: A::Unsigned,
        signer_address: &str,
        signer: &dyn Signer,
    ) -> Result<A::Signed> {
        let data = self.adapter.signing_payload(&unsigned)?;
        let options = SignOptions {
            note: self.adapter.signing_note(&unsigned),
        };

        info!(
            "Requesting signature from {} on {}",
            signer_address,
            self.adapter.network()
        );
        let result = signer.sign(signer_address, data, options).await?;
        let verified = self.verifier.verify(result, signer_address)?;

        self.adapter.attach_signature(unsigned, &verified)
    }

    /// Submit a signed transaction, in order when the network requires it.
    /// Not retried here.
    pub async fn broadcast(&self, signed: A::Signed) -> Result<TransactionHandle> {
        let handle = match &self.serializer {
            Some(queue) => {
                let adapter = Arc::clone(&self.adapter);
                debug!("Queueing broadcast on {} (depth {})", queue.name(), queue.queue_depth());
                queue
                    .enqueue(move || async move { adapter.broadcast(signed).await })
                    .await?
            }
            None => self.adapter.broadcast(signed).await?,
        };

        info!("Broadcast {} on {}", handle, self.adapter.network());
        Ok(handle)
    }

    /// Normalized status of a broadcast transaction
    pub async fn get_status(&self, handle: &TransactionHandle) -> Result<TxStatus> {
        let native = self.adapter.get_status(handle).await?;
        let status = native.normalize();
        if status == TxStatus::Unknown {
            warn!("Unrecognized status for {}: {:?}", handle, native);
        }
        Ok(status)
    }

    /// Build, sign and broadcast, tracking the lifecycle
    pub async fn submit(
        &self,
        params: A::Params,
        signer_address: &str,
        signer: &dyn Signer,
    ) -> Result<TrackedTransaction> {
        let nonce = self.nonces.as_ref().map(|nonces| nonces.next(signer_address));
        let unsigned = self.adapter.build(params, nonce).await?;
        let mut lifecycle = Lifecycle::new();

        lifecycle.transition(LifecycleState::Signing)?;
        let signed = match self.sign(unsigned, signer_address, signer).await {
            Ok(signed) => signed,
            Err(e) => {
                warn!("Signing failed for {}: {}", signer_address, e);
                return Err(e);
            }
        };
        lifecycle.transition(LifecycleState::Signed)?;

        lifecycle.transition(LifecycleState::Broadcasting)?;
        let handle = match self.broadcast(signed).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Broadcast failed for {}: {}", signer_address, e);
                return Err(e);
            }
        };
        lifecycle.transition(LifecycleState::Broadcast)?;

        Ok(TrackedTransaction {
            signer_address: signer_address.to_string(),
            handle,
            nonce,
            lifecycle,
        })
    }

    /// Poll status once and advance the lifecycle
    pub async fn refresh(&self, tracked: &mut TrackedTransaction) -> Result<TxStatus> {
        if tracked.lifecycle.current().is_terminal() {
            return Err(Error::InvalidStateTransition {
                from: format!("{:?}", tracked.lifecycle.current()),
                to: "refresh".to_string(),
                reason: "transaction already final".to_string(),
            });
        }
        let status = self.get_status(&tracked.handle).await?;
        tracked.lifecycle.transition(status.into())?;
        Ok(status)
    }
}

impl<A: ChainAdapter> fmt::Debug for TransactionLifecycleCoordinator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionLifecycleCoordinator")
            .field("network", &self.adapter.network())
            .field("ordered", &self.serializer.is_some())
            .field("caller_managed_nonce", &self.nonces.is_some())
            .finish()
    }
}
