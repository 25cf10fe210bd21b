//! # Staking Core
//!
//! Chain-agnostic signing and submission core for staking transactions:
//! - Exact conversion between human-readable amounts and integer sub-units
//! - Remote (custody/MPC) signing sessions with bounded status polling
//! - Signer address verification before a signature is attached
//! - Monotonic nonces for networks with caller-managed nonces
//! - Strict-order submission for networks that reject out-of-order nonces
//! - Normalized transaction status across chain vocabularies
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────┐
//! │ TransactionLifecycleCoordinator │ ← build → sign → verify → attach → broadcast → status
//! └───────┬───────────────┬─────────┘
//!         │               │
//! ┌───────▼────────┐ ┌────▼──────────────┐
//! │     Signer     │ │ RequestSerializer │ ← ordered broadcast
//! │ (remote/local) │ └───────────────────┘
//! └───────┬────────┘
//!         │
//! ┌───────▼────────────┐
//! │ SignatureVerifier  │ ← public key must derive to the signer
//! └────────────────────┘
//! ```
//!
//! Chain specifics (transaction building, RPC, address derivation) are
//! injected through [`ChainAdapter`] and [`AddressDerivationFn`].

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unused_qualifications,
    clippy::all
)]

pub mod amount;
pub mod config;
pub mod coordinator;
pub mod custody;
pub mod error;
pub mod nonce;
pub mod serializer;
pub mod signer;
pub mod status;
pub mod telemetry;
pub mod verify;

pub use amount::{macro_to_subunits, subunits_to_macro, Amount};
pub use config::Config;
pub use coordinator::{
    ChainAdapter, Lifecycle, LifecycleState, TrackedTransaction, TransactionHandle,
    TransactionLifecycleCoordinator,
};
pub use custody::{CustodyBackend, RemoteSigner, RemoteSigningSession, SessionConfig};
pub use error::{Error, Result};
pub use nonce::{NonceRegistry, NonceSequencer};
pub use serializer::RequestSerializer;
pub use signer::{LocalSigner, SignData, SignOptions, Signer, SignerResult};
pub use status::{ChainNativeStatus, TxStatus};
pub use verify::{AddressDerivationFn, SignatureVerifier, VerifiedSignature};
