//! Reading and writing the payment headers.
//!
//! Every header has a current name and a legacy `x-` name; the current name
//! wins when both are present. Empty values count as absent.

use http::{HeaderMap, HeaderValue};
use pyre::proof::PaymentProof;

use crate::constants::{
    PAYMENT_PROOF_HEADER, WALLET_ADDRESS_HEADER, X_PAYMENT_PROOF_HEADER, X_WALLET_ADDRESS_HEADER,
};
use crate::error::HttpError;

/// Returns the first non-empty value among `names`.
fn first_header<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a HeaderValue> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .find(|value| !value.as_bytes().iter().all(u8::is_ascii_whitespace))
}

/// Returns the caller's wallet address, if the request names one.
#[must_use]
pub fn wallet_address(headers: &HeaderMap) -> Option<&str> {
    first_header(headers, &[WALLET_ADDRESS_HEADER, X_WALLET_ADDRESS_HEADER])
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

/// Returns the raw payment proof header, if present.
#[must_use]
pub fn payment_proof_header(headers: &HeaderMap) -> Option<&HeaderValue> {
    first_header(headers, &[PAYMENT_PROOF_HEADER, X_PAYMENT_PROOF_HEADER])
}

/// Decodes a payment proof header value.
///
/// # Errors
///
/// Returns [`HttpError`] if the value is not ASCII, not base64 JSON, or
/// carries no transaction reference.
pub fn decode_payment_proof(value: &HeaderValue) -> Result<PaymentProof, HttpError> {
    Ok(PaymentProof::decode(value.to_str()?)?)
}

/// Encodes a proof for the `payment-proof` header.
///
/// # Errors
///
/// Returns [`HttpError`] if the proof cannot be serialized.
pub fn encode_payment_proof(proof: &PaymentProof) -> Result<HeaderValue, HttpError> {
    Ok(HeaderValue::try_from(proof.encode()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_prefers_current_header() {
        let mut headers = HeaderMap::new();
        headers.insert(X_WALLET_ADDRESS_HEADER, HeaderValue::from_static("legacy"));
        assert_eq!(wallet_address(&headers), Some("legacy"));
        headers.insert(WALLET_ADDRESS_HEADER, HeaderValue::from_static("current"));
        assert_eq!(wallet_address(&headers), Some("current"));
    }

    #[test]
    fn test_blank_header_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(WALLET_ADDRESS_HEADER, HeaderValue::from_static("  "));
        assert_eq!(wallet_address(&headers), None);
        headers.insert(X_WALLET_ADDRESS_HEADER, HeaderValue::from_static("wallet"));
        assert_eq!(wallet_address(&headers), Some("wallet"));
    }

    #[test]
    fn test_proof_header_roundtrip() {
        let proof = PaymentProof::new("5VERv8NMvzbJMEkV8xnrLkEaWRtSz9");
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_PROOF_HEADER, encode_payment_proof(&proof).unwrap());
        let decoded = decode_payment_proof(payment_proof_header(&headers).unwrap()).unwrap();
        assert_eq!(decoded, proof);
    }

    #[test]
    fn test_malformed_proof() {
        let value = HeaderValue::from_static("definitely not a proof");
        assert!(matches!(
            decode_payment_proof(&value),
            Err(HttpError::Proof(_))
        ));
    }
}
