//! PYRE API server binary.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p pyre-server --release
//!
//! # Run with custom config path
//! pyre-server --config /path/to/config.toml
//!
//! # Configure logging level
//! RUST_LOG=debug pyre-server
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG`: path to TOML configuration file (default: `config.toml`)
//! - `HOST`: override bind address (default: `0.0.0.0`)
//! - `PORT`: override port (default: `3000`)
//! - `RUST_LOG`: log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded first.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use clap::Parser;
use pyre::oracle::{PriceOracle, PriceSource};
use pyre::verifier::TransactionVerifier;
use pyre_http::price_source::{BirdeyePriceSource, DexScreenerPriceSource, JupiterPriceSource};
use pyre_http::server::{GateConfig, PyreMiddleware};
use pyre_svm::networks::SolanaCluster;
use pyre_svm::rpc::SolanaRpcLedger;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pyre_server::config::{PriceSourceKind, PriceSourcesConfig, ServerConfig};
use pyre_server::error::ServerError;
use pyre_server::handlers::{AppState, app_router};

/// Token-gated API server for the PYRE token.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load_from(&args.config)?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        routes = config.pricing.routes.len(),
        "Loaded configuration"
    );

    if !config.token.is_configured() {
        tracing::warn!("Token mint not configured, metered endpoints will answer 503");
    }
    if config.wallets.payment.is_empty() {
        tracing::warn!("Payment wallet not configured, recipients will not be checked");
    }

    let state = build_state(&config)?;
    let app = app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("PYRE API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("PYRE API shut down gracefully");
    Ok(())
}

/// Wires the oracle, verifier and ledger into the payment gate.
fn build_state(config: &ServerConfig) -> Result<AppState, ServerError> {
    let oracle = build_oracle(config);
    let cluster = config
        .solana
        .cluster
        .parse::<SolanaCluster>()
        .map_err(|e| ServerError::Config(e.to_string()))?;

    let rpc_url = config.solana.rpc_url()?;
    tracing::info!(rpc = %rpc_url, commitment = ?config.solana.commitment, "Using Solana RPC");
    let mut ledger_client =
        SolanaRpcLedger::new(rpc_url).with_commitment(config.solana.commitment);
    if let Some(timeout) = config.solana.timeout() {
        ledger_client = ledger_client.with_timeout(timeout);
    }
    let verifier = TransactionVerifier::new(ledger_client.clone());

    let gate_config = GateConfig {
        token: config.token.clone(),
        wallets: config.wallets.clone(),
        distribution: config.distribution,
        routes: config.route_pricing(),
        free_routes: config.free_routes(),
    };
    let ledger = config.store.open_ledger(&config.token)?;
    let gate = PyreMiddleware::new(gate_config, Arc::new(oracle), Arc::new(verifier), ledger)?;

    Ok(AppState {
        gate,
        admin_token: config.admin_token().map(str::to_owned),
        rpc: ledger_client,
        cluster,
    })
}

/// Builds the price oracle from the configured sources, in order.
fn build_oracle(config: &ServerConfig) -> PriceOracle {
    let sources = &config.price_sources;
    let mut oracle = PriceOracle::new(config.token.configured_mint().map(str::to_owned))
        .with_fallback_price(config.token.fallback_price)
        .with_cache_ttl(sources.cache_ttl());
    for kind in &sources.order {
        oracle = oracle.with_source(price_source(*kind, sources));
    }
    tracing::info!(sources = ?sources.order, "Configured price sources");
    oracle
}

fn price_source(kind: PriceSourceKind, config: &PriceSourcesConfig) -> Arc<dyn PriceSource> {
    let timeout = config.timeout();
    match kind {
        PriceSourceKind::Jupiter => {
            let source = config
                .jupiter_url
                .clone()
                .map_or_else(JupiterPriceSource::default, JupiterPriceSource::new);
            Arc::new(source.with_timeout(timeout))
        }
        PriceSourceKind::Birdeye => {
            let mut source = config
                .birdeye_url
                .clone()
                .map_or_else(BirdeyePriceSource::default, BirdeyePriceSource::new)
                .with_timeout(timeout);
            if let Some(key) = config
                .birdeye_api_key
                .as_deref()
                .filter(|key| !key.is_empty() && !key.starts_with('$'))
            {
                source = source.with_api_key(key);
            }
            Arc::new(source)
        }
        PriceSourceKind::DexScreener => {
            let source = config
                .dexscreener_url
                .clone()
                .map_or_else(DexScreenerPriceSource::default, DexScreenerPriceSource::new);
            Arc::new(source.with_timeout(timeout))
        }
    }
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
