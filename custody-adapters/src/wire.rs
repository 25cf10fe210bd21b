//! JSON wire format of the custody operations API
//!
//! Field names are camelCase on the wire. Statuses travel as strings and
//! are parsed strictly: an unrecognized literal is a contract violation,
//! not a pending state.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use staking_core::custody::{OperationSnapshot, OperationStatus, RemoteOperation, SignedMessage};
use staking_core::signer::{Signature, SigningRequest};
use uuid::Uuid;

/// `POST /v1/operations` body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperationRequest<'a> {
    /// Idempotency key
    pub external_id: Uuid,
    /// Address asked to sign
    pub signer_address: &'a str,
    /// Raw message, hex
    pub message: String,
    /// Opaque backend data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary_data: Option<&'a serde_json::Value>,
    /// Approval note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'a str>,
}

impl<'a> From<&'a SigningRequest> for CreateOperationRequest<'a> {
    fn from(request: &'a SigningRequest) -> Self {
        Self {
            external_id: Uuid::now_v7(),
            signer_address: request.signer_address(),
            message: hex::encode(request.message()),
            auxiliary_data: request.auxiliary_data(),
            note: request.note(),
        }
    }
}

/// `POST /v1/operations` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    /// Operation ID
    pub id: String,
    /// Status literal
    pub status: String,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Backend detail
    #[serde(default)]
    pub substatus: Option<String>,
}

impl OperationResponse {
    /// Convert, rejecting unknown statuses
    pub fn into_operation(self) -> staking_core::Result<RemoteOperation> {
        if self.id.is_empty() {
            return Err(Error::MalformedResponse("operation id is empty".into()).into());
        }
        Ok(RemoteOperation {
            status: self.status.parse::<OperationStatus>()?,
            id: self.id,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            substatus: self.substatus,
        })
    }
}

/// `GET /v1/operations/{id}` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatusResponse {
    /// Status literal
    pub status: String,
    /// Backend detail
    #[serde(default)]
    pub substatus: Option<String>,
    /// Present once signed
    #[serde(default)]
    pub signed_messages: Vec<SignedMessageDto>,
}

/// One signed message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessageDto {
    /// Signature components
    pub signature: Signature,
    /// Public key, hex
    pub public_key: String,
}

impl OperationStatusResponse {
    /// Convert, rejecting unknown statuses and undecodable keys
    pub fn into_snapshot(self) -> staking_core::Result<OperationSnapshot> {
        let status = self.status.parse::<OperationStatus>()?;
        let signed_messages = self
            .signed_messages
            .into_iter()
            .map(|dto| {
                Ok(SignedMessage {
                    public_key: decode_key(&dto.public_key)?,
                    signature: dto.signature,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OperationSnapshot {
            status,
            substatus: self.substatus,
            signed_messages,
        })
    }
}

/// `GET /v1/addresses/{address}/public-key` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    /// Public key, hex
    pub public_key: String,
}

/// Decode a hex public key (with or without `0x`)
pub fn decode_key(value: &str) -> Result<Vec<u8>> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| Error::MalformedResponse(format!("public key {value:?} is not hex: {e}")))
}
