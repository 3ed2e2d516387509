//! PYRE API server.
//!
//! Serves token price, endpoint pricing and burn statistics, and meters
//! paid endpoints with the [`pyre_http`] payment gate.
//!
//! # Modules
//!
//! - [`handlers`]: Axum route handlers and router builder
//! - [`error`]: startup and API error types
//! - [`config`]: server configuration with environment variable expansion

pub mod config;
pub mod error;
pub mod handlers;

pub use handlers::{AppState, app_router};
