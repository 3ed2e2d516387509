//! Error types for the HTTP transport layer.

use pyre::proof::ProofError;

/// Errors that can occur while reading or writing payment headers.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The proof header does not hold a valid proof.
    #[error(transparent)]
    Proof(#[from] ProofError),

    /// The header value is not visible ASCII.
    #[error("header value is not valid ASCII: {0}")]
    NotAscii(#[from] http::header::ToStrError),

    /// An encoded value cannot be used as a header value.
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
}
