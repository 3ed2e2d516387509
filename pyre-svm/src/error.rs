//! Errors of the Solana RPC ledger client.

use pyre::verifier::LedgerError;
use reqwest::StatusCode;

/// Errors that can occur while talking to a Solana JSON-RPC node.
#[derive(Debug, thiserror::Error)]
pub enum SolanaRpcError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// RPC method.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// RPC method.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// RPC method.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// RPC method.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {context}: {message}")]
    Rpc {
        /// RPC method.
        context: &'static str,
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// The string is not a base58 transaction signature.
    #[error("Invalid transaction signature: {0}")]
    InvalidSignature(String),
    /// The string is not a base58 account address.
    #[error("Invalid account address: {0}")]
    InvalidAddress(String),
    /// A token amount in the response is not a non-negative integer.
    #[error("Invalid token amount in response: {0}")]
    InvalidAmount(String),
}

impl From<SolanaRpcError> for LedgerError {
    fn from(e: SolanaRpcError) -> Self {
        match e {
            SolanaRpcError::InvalidSignature(_) | SolanaRpcError::InvalidAddress(_) => {
                Self::InvalidReference(e.to_string())
            }
            SolanaRpcError::JsonDeserialization { .. } | SolanaRpcError::InvalidAmount(_) => {
                Self::InvalidResponse(e.to_string())
            }
            SolanaRpcError::UrlParse { .. }
            | SolanaRpcError::Http { .. }
            | SolanaRpcError::HttpStatus { .. }
            | SolanaRpcError::ResponseBodyRead { .. }
            | SolanaRpcError::Rpc { .. } => Self::Transport(e.to_string()),
        }
    }
}
