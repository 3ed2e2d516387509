#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for token-gated API payments.
//!
//! Provides header names and codecs, route tables and (feature-gated) the
//! HTTP market price sources and the Axum payment gate.
//!
//! # Modules
//!
//! - [`constants`]: header names and canned messages
//! - [`headers`]: reading the wallet and payment proof headers
//! - [`types`]: priced routes and the free allow-list
//! - [`error`]: header codec errors
//! - [`price_source`]: Jupiter, Birdeye and `DexScreener` prices (feature: `client`)
//! - [`server`]: the payment gate middleware (feature: `server`)

pub mod constants;
pub mod error;
pub mod headers;
pub mod types;

#[cfg(feature = "client")]
pub mod price_source;

#[cfg(feature = "server")]
pub mod server;
