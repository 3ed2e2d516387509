//! Error types shared across the payment pipeline.
//!
//! Verification errors live next to the verifier in
//! [`crate::verifier::VerificationError`]; ledger transport errors in
//! [`crate::verifier::LedgerError`].

/// Failures while turning a USD price into a token amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    /// No live source, cached value, or static fallback produced a price.
    #[error("Token price unavailable from all sources")]
    Unavailable,
    /// A cost was requested against a non-positive token price.
    #[error("Token price not available")]
    NotAvailable,
    /// The required token count does not fit the integer range.
    #[error("Required token amount out of range")]
    Overflow,
}

/// Errors raised by a single market price source.
#[derive(Debug, thiserror::Error)]
pub enum PriceSourceError {
    /// The source could not be reached or answered with an error status.
    #[error("{source_name} request failed: {message}")]
    Transport {
        /// Name of the source.
        source_name: &'static str,
        /// Description of the failure.
        message: String,
    },
    /// The source answered without a usable price.
    #[error("No price from {0}")]
    NoPrice(&'static str),
}

/// The durable store backing the burn ledger could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("persistence error: {0}")]
pub struct PersistenceError(pub String);

impl PersistenceError {
    /// Creates a persistence error from any displayable cause.
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self(cause.to_string())
    }
}

/// Invalid static configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Distribution percentages do not add up to 100.
    #[error("distribution percentages must sum to 100, got {0}")]
    InvalidDistribution(u16),
}
