//! # Custody Adapters
//!
//! Network implementations of [`staking_core::custody::CustodyBackend`]:
//! - REST operations API over `reqwest` with bearer-token auth
//! - Strict wire parsing (unknown statuses and undecodable keys are
//!   integrity errors, HTTP failures are retryable transport errors)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ RemoteSigningSession (core)  │
//! └──────────────┬───────────────┘
//!                │ CustodyBackend
//! ┌──────────────▼───────────────┐
//! │     HttpCustodyBackend       │ ← POST/GET /v1/operations, /v1/addresses
//! └──────────────┬───────────────┘
//!                │ JSON (camelCase)
//! ┌──────────────▼───────────────┐
//! │    Custody / MPC service     │
//! └──────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod http;
pub mod wire;

pub use error::{Error, Result};
pub use http::HttpCustodyBackend;
