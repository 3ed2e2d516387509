//! Client-submitted payment proofs.
//!
//! A [`PaymentProof`] is only a *pointer* to an on-chain transaction. It is
//! base64-encoded JSON on the wire and carries no authority of its own: the
//! referenced transaction is always looked up and checked by the verifier.
//!
//! ```json
//! { "txHash": "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW", "timestamp": 1735689600000 }
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Serialize};

/// A payment proof as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    /// Reference (signature) of the paying transaction on the external ledger.
    #[serde(rename = "txHash", alias = "txReference")]
    pub tx_reference: String,
    /// When the client issued the proof, in milliseconds since the Unix epoch.
    #[serde(rename = "timestamp", alias = "issuedAt", default)]
    pub issued_at: u64,
}

/// Errors produced while decoding a [`PaymentProof`].
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    /// The proof is not valid base64.
    #[error("payment proof is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not a JSON proof object.
    #[error("payment proof is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The proof does not name a transaction.
    #[error("Transaction signature is required")]
    MissingReference,
}

impl PaymentProof {
    /// Creates a proof for the given transaction reference, issued now.
    #[must_use]
    pub fn new(tx_reference: impl Into<String>) -> Self {
        let issued_at = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        Self {
            tx_reference: tx_reference.into(),
            issued_at,
        }
    }

    /// Encodes the proof as base64 JSON, the form expected in the
    /// `payment-proof` header.
    ///
    /// # Errors
    ///
    /// Returns [`ProofError::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String, ProofError> {
        let json = serde_json::to_vec(self)?;
        Ok(b64.encode(json))
    }

    /// Decodes a base64 JSON proof.
    ///
    /// Surrounding whitespace is ignored. The transaction reference must be
    /// non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProofError`] if the input is not base64, not a JSON proof, or
    /// has an empty transaction reference.
    pub fn decode(encoded: &str) -> Result<Self, ProofError> {
        let bytes = b64.decode(encoded.trim())?;
        let mut proof: Self = serde_json::from_slice(&bytes)?;
        proof.tx_reference = proof.tx_reference.trim().to_owned();
        if proof.tx_reference.is_empty() {
            return Err(ProofError::MissingReference);
        }
        Ok(proof)
    }
}
