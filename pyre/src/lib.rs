#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for token-gated API payments.
//!
//! This crate is transport- and ledger-agnostic. It prices API calls in a
//! token, verifies on-chain payments through a [`verifier::LedgerClient`],
//! splits verified payments and keeps the burn ledger. HTTP integration lives
//! in `pyre-http`, the Solana ledger client in `pyre-svm`.
//!
//! # Overview
//!
//! A paid call flows through the modules in this order:
//!
//! 1. [`oracle`] resolves the USD price of the token (cached, with fallbacks).
//! 2. [`pricing`] turns the endpoint's USD price into a whole-token amount.
//! 3. [`proof`] decodes the client's pointer to its payment transaction.
//! 4. [`verifier`] checks the transaction on-chain.
//! 5. [`distribution`] splits the verified amount into burn, provider,
//!    holder and treasury shares.
//! 6. [`ledger`] records the burn and serves burn statistics.
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring
//! - `lmdb` - Durable `LmdbBurnStore` on an LMDB environment

pub mod amount;
pub mod config;
pub mod distribution;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod pricing;
pub mod proof;
pub mod verifier;
