//! Local Ed25519 signer (software keys, for development and tests)

use super::{decode_hex, SignData, SignOptions, Signer, SignerResult, Signature};
use crate::verify::AddressDerivationFn;
use crate::{Error, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;
use std::collections::HashMap;
use tracing::debug;

/// Software signer holding Ed25519 keys in memory.
///
/// Keys are indexed by every address encoding the derivation function
/// returns, lower-cased.
pub struct LocalSigner {
    derive: AddressDerivationFn,
    keys: HashMap<String, SigningKey>,
}

impl LocalSigner {
    /// Empty signer
    pub fn new(derive: AddressDerivationFn) -> Self {
        Self {
            derive,
            keys: HashMap::new(),
        }
    }

    /// Add a key from a 32-byte seed; returns its addresses
    pub fn add_seed(&mut self, seed: [u8; 32]) -> Result<Vec<String>> {
        self.add_key(SigningKey::from_bytes(&seed))
    }

    /// Add a freshly generated key; returns its addresses
    pub fn add_random_key(&mut self) -> Result<Vec<String>> {
        let mut seed = [0u8; 32];
        rand::RngCore::fill_bytes(&mut OsRng, &mut seed);
        self.add_key(SigningKey::from_bytes(&seed))
    }

    fn add_key(&mut self, key: SigningKey) -> Result<Vec<String>> {
        let addresses = (self.derive)(&key.verifying_key().to_bytes()[..])?;
        if addresses.is_empty() {
            return Err(Error::Config("address derivation returned no addresses".into()));
        }
        for address in &addresses {
            self.keys.insert(address.to_lowercase(), key.clone());
        }
        Ok(addresses)
    }

    fn key_for(&self, address: &str) -> Result<&SigningKey> {
        self.keys
            .get(&address.to_lowercase())
            .ok_or_else(|| Error::invalid_input(format!("no local key for address {address}")))
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn sign(
        &self,
        signer_address: &str,
        data: SignData,
        _options: SignOptions,
    ) -> Result<SignerResult> {
        let key = self.key_for(signer_address)?;
        let message = decode_hex(&data.message)
            .map_err(|e| Error::invalid_input(format!("message is not valid hex: {e}")))?;

        debug!("Signing {} bytes locally for {}", message.len(), signer_address);
        let bytes = key.sign(&message).to_bytes();

        Ok(SignerResult {
            signature: Signature {
                r: hex::encode(&bytes[..32]),
                s: hex::encode(&bytes[32..]),
                v: None,
            },
            public_key: key.verifying_key().to_bytes().to_vec(),
        })
    }

    async fn get_public_key(&self, address: &str) -> Result<Vec<u8>> {
        Ok(self.key_for(address)?.verifying_key().to_bytes().to_vec())
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("addresses", &self.keys.len())
            .finish()
    }
}
