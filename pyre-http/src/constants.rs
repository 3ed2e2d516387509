//! HTTP header names and canned messages used by the payment gate.

/// Payment proof header (client → server).
pub const PAYMENT_PROOF_HEADER: &str = "payment-proof";

/// Legacy payment proof header, still accepted.
pub const X_PAYMENT_PROOF_HEADER: &str = "x-payment-proof";

/// Caller wallet address header (client → server).
pub const WALLET_ADDRESS_HEADER: &str = "wallet-address";

/// Legacy wallet address header, still accepted.
pub const X_WALLET_ADDRESS_HEADER: &str = "x-wallet-address";

/// Set on requests forwarded after a verified payment.
pub const X_PAYMENT_VERIFIED: &str = "x-payment-verified";

/// Verified amount in whole tokens, set on forwarded requests.
pub const X_PAYMENT_AMOUNT: &str = "x-payment-amount";

/// Burned amount in whole tokens, set on forwarded requests.
pub const X_PAYMENT_BURNED: &str = "x-payment-burned";

/// Key of the receipt merged into paid JSON responses.
pub const RECEIPT_FIELD: &str = "_payment";

/// How to pay, included in every 402 response.
pub const PAYMENT_INSTRUCTIONS: &str =
    "Send required tokens to payment wallet and include tx signature in payment-proof header";
