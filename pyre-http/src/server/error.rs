//! Rejections produced by the payment gate.
//!
//! Every rejection renders as a JSON body with `error`, `code` and
//! `message`; a missing payment additionally carries the quote.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;

use super::paygate::PaymentRequired;

/// Reasons the payment gate refuses to forward a request.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    /// The token mint is not configured yet.
    #[error("$PYRE token is not yet launched. API payments will be enabled after token launch.")]
    TokenNotConfigured,
    /// The caller did not identify a wallet.
    #[error("Please connect your wallet to use this API")]
    NoWallet,
    /// The call cannot be priced in tokens right now.
    #[error("Unable to fetch token price. Please try again later.")]
    PriceUnavailable,
    /// No payment proof was sent; the body quotes the price.
    #[error("Payment required to access this endpoint")]
    PaymentRequired(Box<PaymentRequired>),
    /// The payment proof was rejected.
    #[error("{0}")]
    InvalidPayment(String),
    /// The paid handler's response body could not be read.
    #[error("Failed to read handler response: {0}")]
    ResponseBody(String),
}

impl PaygateError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TokenNotConfigured => "TOKEN_NOT_CONFIGURED",
            Self::NoWallet => "NO_WALLET",
            Self::PriceUnavailable => "PRICE_ERROR",
            Self::PaymentRequired(_) => "PAYMENT_REQUIRED",
            Self::InvalidPayment(_) => "INVALID_PAYMENT",
            Self::ResponseBody(_) => "RESPONSE_ERROR",
        }
    }

    /// HTTP status of the rejection.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::TokenNotConfigured | Self::PriceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoWallet => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired(_) | Self::InvalidPayment(_) => StatusCode::PAYMENT_REQUIRED,
            Self::ResponseBody(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human-readable title, sent as `error`.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::TokenNotConfigured => "Service unavailable",
            Self::NoWallet => "Wallet address required",
            Self::PriceUnavailable => "Price unavailable",
            Self::PaymentRequired(_) => "Payment required",
            Self::InvalidPayment(_) => "Payment verification failed",
            Self::ResponseBody(_) => "Internal server error",
        }
    }
}

impl IntoResponse for PaygateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::PaymentRequired(quote) => {
                let mut body = serde_json::to_value(quote).unwrap_or_else(|_| json!({}));
                if let Some(fields) = body.as_object_mut() {
                    fields.insert("error".into(), self.title().into());
                    fields.insert("code".into(), self.code().into());
                    fields.insert("message".into(), self.to_string().into());
                }
                body
            }
            _ => json!({
                "error": self.title(),
                "code": self.code(),
                "message": self.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases = [
            (PaygateError::TokenNotConfigured, 503, "TOKEN_NOT_CONFIGURED"),
            (PaygateError::NoWallet, 401, "NO_WALLET"),
            (PaygateError::PriceUnavailable, 503, "PRICE_ERROR"),
            (PaygateError::InvalidPayment("nope".into()), 402, "INVALID_PAYMENT"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_invalid_payment_message_is_reason() {
        let err = PaygateError::InvalidPayment("Transaction not found".into());
        assert_eq!(err.to_string(), "Transaction not found");
    }
}
