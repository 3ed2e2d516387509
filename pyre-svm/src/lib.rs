#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana ledger access for token-gated API payments.
//!
//! This crate implements [`pyre::verifier::LedgerClient`] on top of the
//! Solana JSON-RPC API, so that [`pyre::verifier::TransactionVerifier`] can
//! verify SPL token payments.
//!
//! # Modules
//!
//! - [`rpc`] - JSON-RPC client ([`SolanaRpcLedger`])
//! - [`parse`] - Extraction of token transfers and burns from `jsonParsed` transactions
//! - [`networks`] - Well-known clusters and program addresses
//! - [`error`] - Client errors
//!
//! # Usage
//!
//! ```ignore
//! use pyre::verifier::{TransactionVerifier, VerifyRequest};
//! use pyre_svm::SolanaRpcLedger;
//!
//! let ledger = SolanaRpcLedger::try_from("https://api.mainnet-beta.solana.com")?;
//! let verifier = TransactionVerifier::new(ledger);
//! let payment = verifier
//!     .verify_payment(&VerifyRequest::new(signature).mint(mint).recipient(wallet))
//!     .await?;
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod error;
pub mod networks;
pub mod parse;
pub mod rpc;

pub use error::SolanaRpcError;
pub use networks::SolanaCluster;
pub use rpc::{SolanaRpcLedger, TokenHoldings};
