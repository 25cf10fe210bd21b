//! Remote signing session
//!
//! ```text
//! CREATED ──► PENDING ──► COMPLETED
//!    │           │
//!    └───────────┴──────► FAILED | BLOCKED | CANCELLED | REJECTED
//! ```
//!
//! A session creates one operation, then polls it at a fixed interval
//! until the status is terminal or the optional deadline passes. The deadline
//! also bounds a status call that is still in flight. Failed poll calls
//! (transport errors) are logged and retried within the deadline. Giving up
//! does not cancel the remote operation.

use super::{CustodyBackend, OperationSnapshot, OperationStatus, SignedMessage};
use crate::signer::{SignerResult, SigningRequest};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Default interval between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll loop settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between polls
    pub poll_interval: Duration,
    /// Overall deadline; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

/// Local view of the remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing submitted yet
    Idle,
    /// Last status reported by the backend
    Remote(OperationStatus),
    /// Deadline passed; the remote operation may still finish on its own
    Abandoned,
}

impl SessionState {
    /// Check if the backend may report `next` after `self`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use OperationStatus::*;
        use SessionState::*;

        match (*self, next) {
            (Idle, Remote(_)) => true,
            // Re-reading the same status is fine, terminal or not
            (Remote(a), Remote(b)) if a == b => true,
            (Remote(Pending), Remote(Created)) => false,
            (Remote(a), Remote(_)) => !a.is_terminal(),
            (Remote(a), Abandoned) => !a.is_terminal(),
            _ => false,
        }
    }
}

/// Drives one signing operation to a terminal state
pub struct RemoteSigningSession {
    backend: Arc<dyn CustodyBackend>,
    config: SessionConfig,
    state: SessionState,
}

impl RemoteSigningSession {
    /// New idle session
    pub fn new(backend: Arc<dyn CustodyBackend>, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            state: SessionState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Create the operation and wait for its outcome
    pub async fn run(mut self, request: SigningRequest) -> Result<SignerResult> {
        let operation = self.backend.create_operation(&request).await?;
        info!(
            "Created signing operation {} for {} ({})",
            operation.id,
            request.signer_address(),
            operation.status
        );

        self.transition(&operation.id, SessionState::Remote(operation.status))?;
        if operation.status.is_failure() {
            return Err(rejected(&operation.id, operation.status, operation.substatus));
        }

        self.poll(&operation.id).await
    }

    async fn poll(&mut self, operation_id: &str) -> Result<SignerResult> {
        let backend = Arc::clone(&self.backend);
        let started = Instant::now();
        let deadline = self.config.timeout.map(|timeout| started + timeout);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let fetch = backend.get_operation(operation_id);
            let outcome = match deadline {
                Some(deadline) => match timeout_at(deadline, fetch).await {
                    Ok(outcome) => outcome,
                    Err(_) => return Err(self.abandon(operation_id, started)),
                },
                None => fetch.await,
            };

            match outcome {
                Ok(snapshot) => {
                    debug!(
                        "Operation {} poll #{}: {}",
                        operation_id, attempt, snapshot.status
                    );
                    self.transition(operation_id, SessionState::Remote(snapshot.status))?;
                    if snapshot.status.is_terminal() {
                        return conclude(operation_id, snapshot);
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Operation {} poll #{} failed, will retry: {}",
                        operation_id, attempt, e
                    );
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            let wait = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(self.abandon(operation_id, started));
                }
                Some(deadline) => self.config.poll_interval.min(deadline - now),
                None => self.config.poll_interval,
            };
            sleep(wait).await;
        }
    }

    fn abandon(&mut self, operation_id: &str, started: Instant) -> Error {
        self.state = SessionState::Abandoned;
        let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        warn!(
            "Operation {} still not terminal after {}ms, giving up",
            operation_id, waited_ms
        );
        Error::RemoteSigningTimeout {
            operation_id: operation_id.to_string(),
            waited_ms,
        }
    }

    fn transition(&mut self, operation_id: &str, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::RemoteSigningIntegrity(format!(
                "operation {operation_id} moved from {:?} to {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

fn conclude(operation_id: &str, snapshot: OperationSnapshot) -> Result<SignerResult> {
    if snapshot.status != OperationStatus::Completed {
        return Err(rejected(operation_id, snapshot.status, snapshot.substatus));
    }

    let [message]: [SignedMessage; 1] = snapshot.signed_messages.try_into().map_err(
        |messages: Vec<SignedMessage>| {
            Error::RemoteSigningIntegrity(format!(
                "operation {operation_id} completed with {} signed messages, expected exactly 1",
                messages.len()
            ))
        },
    )?;

    info!("Operation {} completed", operation_id);
    Ok(SignerResult {
        signature: message.signature,
        public_key: message.public_key,
    })
}

fn rejected(operation_id: &str, status: OperationStatus, substatus: Option<String>) -> Error {
    let reason = substatus
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| status.generic_reason().to_string());
    warn!("Operation {} ended {}: {}", operation_id, status, reason);

    Error::RemoteSigningRejected {
        operation_id: operation_id.to_string(),
        status: status.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::super::{MockCustodyBackend, RemoteOperation};
    use super::*;
    use async_trait::async_trait;
    use crate::signer::{SignData, SignOptions, Signature};
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    fn request() -> SigningRequest {
        SigningRequest::new(
            "0xsigner",
            SignData::from_bytes(b"delegate"),
            SignOptions {
                note: Some("delegate to validator".into()),
            },
        )
        .unwrap()
    }

    fn signed(tag: &str) -> SignedMessage {
        SignedMessage {
            signature: Signature {
                r: format!("{tag}01"),
                s: format!("{tag}02"),
                v: Some(1),
            },
            public_key: vec![0xab; 33],
        }
    }

    fn snapshot(status: OperationStatus) -> OperationSnapshot {
        OperationSnapshot {
            status,
            substatus: None,
            signed_messages: Vec::new(),
        }
    }

    fn completed(messages: Vec<SignedMessage>) -> OperationSnapshot {
        OperationSnapshot {
            status: OperationStatus::Completed,
            substatus: None,
            signed_messages: messages,
        }
    }

    /// Backend that creates "op-1" and answers polls from a script,
    /// then keeps reporting PENDING
    fn scripted(
        initial: OperationStatus,
        polls: Vec<Result<OperationSnapshot>>,
    ) -> (MockCustodyBackend, Arc<Mutex<usize>>) {
        let mut backend = MockCustodyBackend::new();
        backend.expect_create_operation().times(1).returning(move |req| {
            assert_eq!(req.signer_address(), "0xsigner");
            Ok(RemoteOperation {
                id: "op-1".into(),
                status: initial,
                created_at: Utc::now(),
                substatus: None,
            })
        });

        let script = Arc::new(Mutex::new(VecDeque::from(polls)));
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        backend.expect_get_operation().returning(move |id| {
            assert_eq!(id, "op-1");
            *counter.lock() += 1;
            script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(snapshot(OperationStatus::Pending)))
        });

        (backend, calls)
    }

    fn fast() -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(10),
            timeout: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_completed() {
        let (backend, calls) = scripted(
            OperationStatus::Created,
            vec![
                Ok(snapshot(OperationStatus::Pending)),
                Ok(snapshot(OperationStatus::Pending)),
                Ok(completed(vec![signed("aa")])),
            ],
        );

        let result = RemoteSigningSession::new(Arc::new(backend), fast())
            .run(request())
            .await
            .unwrap();

        assert_eq!(result.signature, signed("aa").signature);
        assert_eq!(result.public_key, vec![0xab; 33]);
        assert_eq!(*calls.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_count_does_not_change_result() {
        for pending_polls in [0usize, 1, 5] {
            let mut polls: Vec<_> = (0..pending_polls)
                .map(|_| Ok(snapshot(OperationStatus::Pending)))
                .collect();
            polls.push(Ok(completed(vec![signed("cc")])));
            let (backend, _) = scripted(OperationStatus::Pending, polls);

            let result = RemoteSigningSession::new(Arc::new(backend), fast())
                .run(request())
                .await
                .unwrap();
            assert_eq!(result.signature, signed("cc").signature);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_carries_substatus() {
        let (backend, _) = scripted(
            OperationStatus::Created,
            vec![
                Ok(snapshot(OperationStatus::Pending)),
                Ok(OperationSnapshot {
                    status: OperationStatus::Blocked,
                    substatus: Some("policy violation".into()),
                    signed_messages: Vec::new(),
                }),
            ],
        );

        let err = RemoteSigningSession::new(Arc::new(backend), fast())
            .run(request())
            .await
            .unwrap_err();

        match err {
            Error::RemoteSigningRejected { operation_id, status, reason } => {
                assert_eq!(operation_id, "op-1");
                assert_eq!(status, "BLOCKED");
                assert_eq!(reason, "policy violation");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_substatus_uses_generic_reason() {
        let (backend, _) = scripted(
            OperationStatus::Pending,
            vec![Ok(snapshot(OperationStatus::Cancelled))],
        );

        let err = RemoteSigningSession::new(Arc::new(backend), fast())
            .run(request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RemoteSigningRejected { ref reason, .. } if reason == "signing operation was cancelled"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_on_creation_skips_polling() {
        let (backend, calls) = scripted(OperationStatus::Rejected, Vec::new());

        let err = RemoteSigningSession::new(Arc::new(backend), fast())
            .run(request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteSigningRejected { .. }));
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_requires_exactly_one_message() {
        for messages in [Vec::new(), vec![signed("aa"), signed("bb")]] {
            let count = messages.len();
            let (backend, _) = scripted(OperationStatus::Pending, vec![Ok(completed(messages))]);

            let err = RemoteSigningSession::new(Arc::new(backend), fast())
                .run(request())
                .await
                .unwrap_err();
            assert!(
                matches!(err, Error::RemoteSigningIntegrity(ref m) if m.contains(&format!("{count} signed messages"))),
                "{err}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_retried() {
        let (backend, calls) = scripted(
            OperationStatus::Created,
            vec![
                Err(Error::Transport("connection reset".into())),
                Err(Error::Transport("502 bad gateway".into())),
                Ok(completed(vec![signed("dd")])),
            ],
        );

        let result = RemoteSigningSession::new(Arc::new(backend), fast())
            .run(request())
            .await
            .unwrap();
        assert_eq!(result.signature, signed("dd").signature);
        assert_eq!(*calls.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transport_poll_error_is_fatal() {
        let (backend, calls) = scripted(
            OperationStatus::Created,
            vec![Err(Error::RemoteSigningIntegrity("unknown operation status".into()))],
        );

        let err = RemoteSigningSession::new(Arc::new(backend), fast())
            .run(request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteSigningIntegrity(_)));
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_error() {
        let (backend, calls) = scripted(OperationStatus::Pending, Vec::new());
        let config = SessionConfig {
            poll_interval: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(5)),
        };

        let err = RemoteSigningSession::new(Arc::new(backend), config)
            .run(request())
            .await
            .unwrap_err();

        match err {
            Error::RemoteSigningTimeout { operation_id, waited_ms } => {
                assert_eq!(operation_id, "op-1");
                assert_eq!(waited_ms, 5_000);
            }
            other => panic!("unexpected error: {other}"),
        }
        // t = 0,1,2,3,4,5
        assert_eq!(*calls.lock(), 6);
    }

    /// Backend whose status calls hang for a minute
    struct StalledBackend;

    #[async_trait]
    impl CustodyBackend for StalledBackend {
        async fn create_operation(&self, _request: &SigningRequest) -> Result<RemoteOperation> {
            Ok(RemoteOperation {
                id: "op-1".into(),
                status: OperationStatus::Pending,
                created_at: Utc::now(),
                substatus: None,
            })
        }

        async fn get_operation(&self, _operation_id: &str) -> Result<OperationSnapshot> {
            sleep(Duration::from_secs(60)).await;
            Ok(completed(vec![signed("ee")]))
        }

        async fn get_public_key(&self, _address: &str) -> Result<Vec<u8>> {
            Ok(vec![0xab; 33])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_in_flight_poll() {
        let config = SessionConfig {
            poll_interval: Duration::from_millis(500),
            timeout: Some(Duration::from_secs(2)),
        };

        let started = Instant::now();
        let err = RemoteSigningSession::new(Arc::new(StalledBackend), config)
            .run(request())
            .await
            .unwrap_err();

        match err {
            Error::RemoteSigningTimeout { operation_id, waited_ms } => {
                assert_eq!(operation_id, "op-1");
                assert_eq!(waited_ms, 2_000);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_transport_failures() {
        let polls = (0..100)
            .map(|_| Err(Error::Transport("unreachable".into())))
            .collect();
        let (backend, _) = scripted(OperationStatus::Created, polls);
        let config = SessionConfig {
            poll_interval: Duration::from_millis(500),
            timeout: Some(Duration::from_secs(2)),
        };

        let err = RemoteSigningSession::new(Arc::new(backend), config)
            .run(request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteSigningTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_regression_is_integrity_error() {
        let (backend, _) = scripted(
            OperationStatus::Created,
            vec![
                Ok(snapshot(OperationStatus::Pending)),
                Ok(snapshot(OperationStatus::Created)),
            ],
        );

        let err = RemoteSigningSession::new(Arc::new(backend), fast())
            .run(request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteSigningIntegrity(_)));
    }

    #[tokio::test]
    async fn test_create_failure_is_not_retried() {
        let mut backend = MockCustodyBackend::new();
        backend
            .expect_create_operation()
            .times(1)
            .returning(|_| Err(Error::Transport("connection refused".into())));
        backend.expect_get_operation().never();

        let err = RemoteSigningSession::new(Arc::new(backend), fast())
            .run(request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_state_transitions() {
        use OperationStatus::*;
        use SessionState::*;

        assert!(Idle.can_transition_to(Remote(Created)));
        assert!(Remote(Created).can_transition_to(Remote(Pending)));
        assert!(Remote(Pending).can_transition_to(Remote(Completed)));
        assert!(Remote(Completed).can_transition_to(Remote(Completed)));
        assert!(!Remote(Completed).can_transition_to(Remote(Pending)));
        assert!(!Remote(Pending).can_transition_to(Remote(Created)));
        assert!(Remote(Pending).can_transition_to(Abandoned));
        assert!(!Abandoned.can_transition_to(Remote(Pending)));
        assert!(!Idle.can_transition_to(Abandoned));
    }
}
