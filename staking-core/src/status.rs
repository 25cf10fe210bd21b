//! Transaction status normalization
//!
//! Each chain reports status in its own vocabulary. [`ChainNativeStatus`]
//! keeps those vocabularies apart as a tagged union, and
//! [`ChainNativeStatus::normalize`] maps each one through an explicit table
//! into [`TxStatus`]. Anything not in a table becomes [`TxStatus::Unknown`],
//! never `Success`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Included and executed successfully
    Success,
    /// Failed, dropped or rejected
    Failure,
    /// Not yet final
    Pending,
    /// Unrecognized or unavailable
    Unknown,
}

impl TxStatus {
    /// Returns `true` for statuses that will not change
    pub fn is_final(&self) -> bool {
        matches!(self, TxStatus::Success | TxStatus::Failure)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxStatus::Success => "success",
            TxStatus::Failure => "failure",
            TxStatus::Pending => "pending",
            TxStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Avalanche X/P/C-chain `getTxStatus` literals
const AVALANCHE_STATUSES: &[(&str, TxStatus)] = &[
    ("Accepted", TxStatus::Success),
    ("Committed", TxStatus::Success),
    ("Processing", TxStatus::Pending),
    ("Dropped", TxStatus::Failure),
    ("Rejected", TxStatus::Failure),
    ("Aborted", TxStatus::Failure),
    ("Unknown", TxStatus::Unknown),
];

/// Substrate extrinsic lifecycle events
const SUBSTRATE_STATUSES: &[(&str, TxStatus)] = &[
    ("Future", TxStatus::Pending),
    ("Ready", TxStatus::Pending),
    ("Broadcast", TxStatus::Pending),
    ("InBlock", TxStatus::Pending),
    ("Retracted", TxStatus::Pending),
    ("Finalized", TxStatus::Success),
    ("FinalityTimeout", TxStatus::Failure),
    ("Usurped", TxStatus::Failure),
    ("Dropped", TxStatus::Failure),
    ("Invalid", TxStatus::Failure),
];

/// Solana signature confirmation levels (only used when `err` is absent)
const SOLANA_CONFIRMATIONS: &[(&str, TxStatus)] = &[
    ("processed", TxStatus::Pending),
    ("confirmed", TxStatus::Pending),
    ("finalized", TxStatus::Success),
];

/// NEAR final execution outcome kinds
const NEAR_OUTCOMES: &[(&str, TxStatus)] = &[
    ("SuccessValue", TxStatus::Success),
    ("SuccessReceiptId", TxStatus::Success),
    ("Failure", TxStatus::Failure),
    ("NotStarted", TxStatus::Pending),
    ("Started", TxStatus::Pending),
];

/// TON transaction phases
const TON_STATUSES: &[(&str, TxStatus)] = &[
    ("success", TxStatus::Success),
    ("failure", TxStatus::Failure),
    ("aborted", TxStatus::Failure),
    ("bounced", TxStatus::Failure),
    ("pending", TxStatus::Pending),
];

/// Status as reported by a chain's RPC or indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "chain", rename_all = "lowercase")]
pub enum ChainNativeStatus {
    /// Avalanche `getTxStatus`
    Avalanche {
        /// Status literal
        status: String,
    },
    /// Substrate extrinsic status
    Substrate {
        /// Event name
        status: String,
    },
    /// Solana `getSignatureStatuses` entry
    Solana {
        /// Confirmation level; `None` if the signature is not found yet
        confirmation: Option<String>,
        /// Execution error
        err: Option<String>,
    },
    /// EVM receipt
    Evm {
        /// Receipt `status` field; `None` if no receipt yet
        receipt_status: Option<u64>,
    },
    /// Cosmos SDK `TxResponse`
    Cosmos {
        /// ABCI result code; `None` if the tx is not indexed yet
        code: Option<u32>,
    },
    /// NEAR execution outcome
    Near {
        /// Outcome kind
        outcome: String,
    },
    /// TON transaction
    Ton {
        /// Status literal
        status: String,
    },
}

impl ChainNativeStatus {
    /// Map into the canonical taxonomy. Never fails.
    pub fn normalize(&self) -> TxStatus {
        match self {
            ChainNativeStatus::Avalanche { status } => lookup(AVALANCHE_STATUSES, status),
            ChainNativeStatus::Substrate { status } => lookup(SUBSTRATE_STATUSES, status),
            ChainNativeStatus::Solana { err: Some(_), .. } => TxStatus::Failure,
            ChainNativeStatus::Solana {
                confirmation: Some(level),
                err: None,
            } => lookup(SOLANA_CONFIRMATIONS, level),
            ChainNativeStatus::Solana {
                confirmation: None,
                err: None,
            } => TxStatus::Pending,
            ChainNativeStatus::Evm { receipt_status } => match receipt_status {
                None => TxStatus::Pending,
                Some(1) => TxStatus::Success,
                Some(0) => TxStatus::Failure,
                Some(_) => TxStatus::Unknown,
            },
            ChainNativeStatus::Cosmos { code } => match code {
                None => TxStatus::Pending,
                Some(0) => TxStatus::Success,
                Some(_) => TxStatus::Failure,
            },
            ChainNativeStatus::Near { outcome } => lookup(NEAR_OUTCOMES, outcome),
            ChainNativeStatus::Ton { status } => lookup(TON_STATUSES, status),
        }
    }
}

fn lookup(table: &[(&str, TxStatus)], literal: &str) -> TxStatus {
    table
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(literal.trim()))
        .map(|(_, status)| *status)
        .unwrap_or(TxStatus::Unknown)
}
