//! Axum middleware enforcing token payments on protected routes.
//!
//! The middleware prices each call from the route table, answers
//! `402 Payment Required` with a quote when no proof is attached, verifies
//! attached proofs on-chain, records the burn share and merges a receipt
//! into the handler's JSON response.
//!
//! See [`PyreMiddleware`] for configuration.

pub mod error;
pub mod layer;
pub mod paygate;

pub use error::PaygateError;
pub use layer::{PyreMiddleware, PyreMiddlewareService};
pub use paygate::{GateConfig, Paygate, PaymentReceipt, PaymentRequired};
