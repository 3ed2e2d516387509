//! Error types for the PYRE API server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pyre::error::{ConfigError, PersistenceError};
use pyre::ledger::UnknownPeriod;
use pyre_svm::SolanaRpcError;

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML or has invalid values.
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The payment distribution is invalid.
    #[error(transparent)]
    Distribution(#[from] ConfigError),

    /// Any other invalid setting.
    #[error("invalid config: {0}")]
    Config(String),

    /// The burn store could not be opened.
    #[error("failed to open burn store: {0}")]
    Store(#[from] PersistenceError),
}

/// Errors returned by the public and admin API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The admin API is not enabled on this server.
    #[error("Admin API is disabled")]
    AdminDisabled,

    /// Missing or wrong admin bearer token.
    #[error("Unauthorized")]
    Unauthorized,

    /// The reset period is not `daily`, `weekly` or `monthly`.
    #[error("Invalid period. Use: daily, weekly, or monthly")]
    UnknownPeriod(#[from] UnknownPeriod),

    /// The burn store failed.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// The `wallet` query parameter is missing or empty.
    #[error("Wallet address required")]
    WalletRequired,

    /// The `wallet` query parameter is not a valid address.
    #[error("Invalid wallet address")]
    InvalidWallet,

    /// No token mint is configured.
    #[error("Token mint not configured")]
    TokenNotConfigured,

    /// The balance could not be read from the ledger.
    #[error("Failed to fetch balance: {0}")]
    Balance(#[from] SolanaRpcError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::AdminDisabled => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UnknownPeriod(_) | Self::WalletRequired | Self::InvalidWallet => {
                StatusCode::BAD_REQUEST
            }
            Self::TokenNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_) | Self::Balance(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "success": false, "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
