//! Signer contract
//!
//! Every signing backend (remote custody/MPC, local development keys)
//! implements [`Signer`]. The coordinator never trusts a [`SignerResult`]
//! directly; it passes it through [`crate::verify::SignatureVerifier`] first.

mod local;

pub use local::LocalSigner;

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Payload to sign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignData {
    /// Message as hex (with or without `0x`)
    pub message: String,
    /// Backend-specific extra data passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary_data: Option<serde_json::Value>,
}

impl SignData {
    /// Sign data for a raw message
    pub fn from_bytes(message: &[u8]) -> Self {
        Self {
            message: hex::encode(message),
            auxiliary_data: None,
        }
    }
}

/// Per-request signing options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOptions {
    /// Human-readable note shown by custody approval flows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One sign operation's input. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SigningRequest {
    signer_address: String,
    message: Vec<u8>,
    auxiliary_data: Option<serde_json::Value>,
    note: Option<String>,
}

impl SigningRequest {
    /// Build a request, decoding the hex message
    pub fn new(signer_address: &str, data: SignData, options: SignOptions) -> Result<Self> {
        if signer_address.is_empty() {
            return Err(Error::invalid_input("signer address cannot be empty"));
        }
        let message = decode_hex(&data.message)
            .map_err(|e| Error::invalid_input(format!("message is not valid hex: {e}")))?;

        Ok(Self {
            signer_address: signer_address.to_string(),
            message,
            auxiliary_data: data.auxiliary_data,
            note: options.note,
        })
    }

    /// Address asked to sign
    pub fn signer_address(&self) -> &str {
        &self.signer_address
    }

    /// Raw message bytes
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Opaque backend data
    pub fn auxiliary_data(&self) -> Option<&serde_json::Value> {
        self.auxiliary_data.as_ref()
    }

    /// Approval note
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

/// Signature components as returned by backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// `r` component (hex)
    pub r: String,
    /// `s` component (hex)
    pub s: String,
    /// Recovery id, for curves that use one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<u8>,
}

impl Signature {
    /// `r || s` (|| `v` when present) as raw bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = decode_hex(&self.r)
            .map_err(|e| Error::RemoteSigningIntegrity(format!("signature r is not hex: {e}")))?;
        bytes.extend(
            decode_hex(&self.s)
                .map_err(|e| Error::RemoteSigningIntegrity(format!("signature s is not hex: {e}")))?,
        );
        if let Some(v) = self.v {
            bytes.push(v);
        }
        Ok(bytes)
    }
}

/// Successful signing output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerResult {
    /// Signature
    pub signature: Signature,
    /// Public key the backend signed with
    pub public_key: Vec<u8>,
}

/// Pluggable signing backend
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `data` with the key behind `signer_address`
    async fn sign(
        &self,
        signer_address: &str,
        data: SignData,
        options: SignOptions,
    ) -> Result<SignerResult>;

    /// Public key behind `address`
    async fn get_public_key(&self, address: &str) -> Result<Vec<u8>>;
}

pub(crate) fn decode_hex(value: &str) -> std::result::Result<Vec<u8>, hex::FromHexError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_request_decodes_hex() {
        let data = SignData {
            message: "0xdeadbeef".into(),
            auxiliary_data: Some(serde_json::json!({"chain": "near"})),
        };
        let request = SigningRequest::new(
            "alice.near",
            data,
            SignOptions {
                note: Some("delegate 10 NEAR".into()),
            },
        )
        .unwrap();

        assert_eq!(request.message(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(request.note(), Some("delegate 10 NEAR"));
        assert_eq!(request.signer_address(), "alice.near");
    }

    #[test]
    fn test_signing_request_rejects_bad_input() {
        let bad_hex = SignData {
            message: "xyz".into(),
            auxiliary_data: None,
        };
        assert!(matches!(
            SigningRequest::new("addr", bad_hex, SignOptions::default()),
            Err(Error::InputValidation(_))
        ));
        assert!(SigningRequest::new("", SignData::from_bytes(b"m"), SignOptions::default()).is_err());
    }

    #[test]
    fn test_signature_bytes() {
        let sig = Signature {
            r: "0x0102".into(),
            s: "0304".into(),
            v: Some(27),
        };
        assert_eq!(sig.to_bytes().unwrap(), vec![1, 2, 3, 4, 27]);
    }
}
