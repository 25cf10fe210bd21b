//! Signer address verification
//!
//! A remote signing response is only trusted if the public key it carries
//! derives to the address that was asked to sign. Chains may expose several
//! address encodings for one key, so derivation yields a set of candidates.

use crate::signer::{Signature, SignerResult};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::warn;

/// Chain address derivation: public key bytes to every valid address encoding
pub type AddressDerivationFn = Arc<dyn Fn(&[u8]) -> Result<Vec<String>> + Send + Sync>;

/// A signing result whose public key matched the requested signer.
///
/// Only [`SignatureVerifier::verify`] can produce one, so chain adapters
/// that accept `&VerifiedSignature` cannot attach an unchecked signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    signer_address: String,
    result: SignerResult,
}

impl VerifiedSignature {
    /// Address that signed
    pub fn signer_address(&self) -> &str {
        &self.signer_address
    }

    /// Signature components
    pub fn signature(&self) -> &Signature {
        &self.result.signature
    }

    /// Public key that produced the signature
    pub fn public_key(&self) -> &[u8] {
        &self.result.public_key
    }

    /// Unwrap the underlying result
    pub fn into_inner(self) -> SignerResult {
        self.result
    }
}

/// Checks signing results against the requested signer
#[derive(Clone)]
pub struct SignatureVerifier {
    derive: AddressDerivationFn,
}

impl SignatureVerifier {
    /// Verifier using an injected derivation function
    pub fn new(derive: AddressDerivationFn) -> Self {
        Self { derive }
    }

    /// Verifier from a plain closure
    pub fn from_fn<F>(derive: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        Self::new(Arc::new(derive))
    }

    /// Every address encoding the key derives to
    pub fn candidates(&self, public_key: &[u8]) -> Result<Vec<String>> {
        (self.derive)(public_key)
    }

    /// Accept `result` only if its key derives to `signer_address`
    /// (case-insensitive). On mismatch the result is dropped.
    pub fn verify(&self, result: SignerResult, signer_address: &str) -> Result<VerifiedSignature> {
        let candidates = match self.candidates(&result.public_key) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(
                    "Address derivation failed for {} byte public key: {}",
                    result.public_key.len(),
                    e
                );
                Vec::new()
            }
        };

        if !candidates
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(signer_address))
        {
            warn!(
                "Discarding signature: requested signer {} not among derived addresses {:?}",
                signer_address, candidates
            );
            return Err(Error::AddressMismatch {
                expected: signer_address.to_string(),
                candidates,
            });
        }

        Ok(VerifiedSignature {
            signer_address: signer_address.to_string(),
            result,
        })
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}
