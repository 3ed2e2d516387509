//! Converting USD endpoint prices into token amounts.
//!
//! All arithmetic is decimal: `0.05 / 0.001` is exactly `50` here, where a
//! binary float division would round up to 51 tokens.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::error::PriceError;

/// Returns the number of whole tokens needed to cover `usd_price` at
/// `token_price` USD per token, rounded up so a call is never under-charged.
///
/// A zero or negative USD price costs zero tokens.
///
/// # Errors
///
/// Returns [`PriceError::NotAvailable`] if `token_price` is not positive and
/// [`PriceError::Overflow`] if the result does not fit a `u64`.
pub fn tokens_required(usd_price: Decimal, token_price: Decimal) -> Result<u64, PriceError> {
    if token_price <= Decimal::ZERO {
        return Err(PriceError::NotAvailable);
    }
    if usd_price <= Decimal::ZERO {
        return Ok(0);
    }
    usd_price
        .checked_div(token_price)
        .and_then(|tokens| tokens.ceil().to_u64())
        .ok_or(PriceError::Overflow)
}

/// Like [`tokens_required`], but returns `None` instead of an error.
///
/// Meant for display paths that must not fail.
#[must_use]
pub fn tokens_required_safe(usd_price: Decimal, token_price: Decimal) -> Option<u64> {
    tokens_required(usd_price, token_price).ok()
}

/// Whole tokens burned out of `tokens` at `burn_percent`, truncated.
#[must_use]
pub fn burn_for_tokens(tokens: u64, burn_percent: u8) -> u64 {
    let burned = u128::from(tokens) * u128::from(burn_percent) / 100;
    u64::try_from(burned).unwrap_or(u64::MAX)
}

/// Price of one endpoint expressed in tokens, for price listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointQuote {
    /// Endpoint path.
    pub endpoint: String,
    /// USD price per call.
    pub usd_price: Decimal,
    /// Tokens per call, if a token price is known.
    pub token_amount: Option<u64>,
    /// Tokens burned per call, if a token price is known.
    pub burn_amount: Option<u64>,
    /// Endpoint category, the second path segment (`/api/<category>/...`).
    pub category: String,
    /// Whether the endpoint can currently be paid for.
    pub available: bool,
}

impl EndpointQuote {
    /// Quotes `endpoint` at `usd_price` given the current `token_price`.
    ///
    /// A non-positive token price yields an unavailable quote.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        usd_price: Decimal,
        token_price: Decimal,
        burn_percent: u8,
    ) -> Self {
        let endpoint = endpoint.into();
        let token_amount = tokens_required_safe(usd_price, token_price);
        let category = endpoint
            .split('/')
            .nth(2)
            .filter(|s| !s.is_empty())
            .unwrap_or("other")
            .to_owned();
        Self {
            endpoint,
            usd_price,
            token_amount,
            burn_amount: token_amount.map(|t| burn_for_tokens(t, burn_percent)),
            category,
            available: token_amount.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(cents_thousandths: i64, scale: u32) -> Decimal {
        Decimal::new(cents_thousandths, scale)
    }

    #[test]
    fn test_exact_division_does_not_round_up() {
        // $0.05 at $0.001 per token
        assert_eq!(tokens_required(usd(5, 2), usd(1, 3)), Ok(50));
        // $0.02 at $0.001 per token
        assert_eq!(tokens_required(usd(2, 2), usd(1, 3)), Ok(20));
    }

    #[test]
    fn test_rounds_up() {
        // $0.01 at $0.003 per token = 3.33 tokens
        assert_eq!(tokens_required(usd(1, 2), usd(3, 3)), Ok(4));
    }

    #[test]
    fn test_non_positive_token_price() {
        assert_eq!(
            tokens_required(usd(5, 2), Decimal::ZERO),
            Err(PriceError::NotAvailable)
        );
        assert_eq!(
            tokens_required(usd(5, 2), usd(-1, 3)),
            Err(PriceError::NotAvailable)
        );
        assert_eq!(tokens_required_safe(usd(5, 2), Decimal::ZERO), None);
    }

    #[test]
    fn test_free_price() {
        assert_eq!(tokens_required(Decimal::ZERO, usd(1, 3)), Ok(0));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(
            tokens_required(Decimal::MAX, usd(1, 28)),
            Err(PriceError::Overflow)
        );
    }

    #[test]
    fn test_burn_for_tokens() {
        assert_eq!(burn_for_tokens(50, 30), 15);
        assert_eq!(burn_for_tokens(7, 30), 2);
    }

    #[test]
    fn test_endpoint_quote() {
        let quote = EndpointQuote::new("/api/ai/chat", usd(5, 2), usd(1, 3), 30);
        assert_eq!(quote.category, "ai");
        assert_eq!(quote.token_amount, Some(50));
        assert_eq!(quote.burn_amount, Some(15));
        assert!(quote.available);

        let quote = EndpointQuote::new("/api/ai/chat", usd(5, 2), Decimal::ZERO, 30);
        assert!(!quote.available);
        assert_eq!(quote.burn_amount, None);
    }
}
