//! Axum route handlers for the PYRE API.
//!
//! Public endpoints report token price, endpoint pricing, burn statistics and
//! wallet balances. The admin endpoint resets period counters.
//! `GET /api/data/time` is a metered sample endpoint behind the payment gate.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use pyre::config::BURN_ADDRESS;
use pyre::ledger::Period;
use pyre::pricing::EndpointQuote;
use pyre::verifier::VerifiedPayment;
use pyre_http::server::PyreMiddleware;
use pyre_svm::networks::{SolanaCluster, is_valid_address};
use pyre_svm::rpc::SolanaRpcLedger;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;

/// Days of history returned by the burn statistics endpoint.
pub const BURN_HISTORY_DAYS: u32 = 30;

/// USD price of the metered sample endpoint.
pub const TIME_ENDPOINT_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Shared application state.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // PyreMiddleware holds a dyn verifier
pub struct AppState {
    /// Payment gate, also the source of config, oracle and ledger.
    pub gate: PyreMiddleware,
    /// Bearer token of the admin API. `None` disables it.
    pub admin_token: Option<String>,
    /// Solana RPC client used for balance reads.
    pub rpc: SolanaRpcLedger,
    /// Cluster the payments settle on, for explorer links.
    pub cluster: SolanaCluster,
}

/// Query of `GET /api/token/balance`.
#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// Wallet address to look up.
    pub wallet: Option<String>,
}

/// `GET /api/health`: Liveness check.
pub async fn get_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "PYRE API",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /api/info`: Token, distribution and payment destination.
pub async fn get_info(State(state): State<AppState>) -> Json<Value> {
    let config = state.gate.config();
    Json(json!({
        "success": true,
        "token": {
            "name": config.token.name,
            "symbol": config.token.symbol,
            "mint": config.token.configured_mint(),
            "decimals": config.token.decimals,
            "totalSupply": config.token.total_supply,
            "configured": config.token.is_configured(),
        },
        "distribution": config.distribution.percentages(),
        "paymentWallet": config.wallets.payment,
        "burnAddress": BURN_ADDRESS,
    }))
}

/// `GET /api/token/price`: Current token price and every endpoint's cost.
///
/// Never fails: without a price, endpoints are listed as unavailable.
pub async fn get_token_price(State(state): State<AppState>) -> Json<Value> {
    let config = state.gate.config();
    let price = state.gate.oracle().resolve_price_safe().await;
    let available = price > Decimal::ZERO;
    let endpoints: BTreeMap<String, EndpointQuote> = config
        .routes
        .quotes(price, config.distribution.burn)
        .into_iter()
        .map(|quote| (quote.endpoint.clone(), quote))
        .collect();

    Json(json!({
        "success": true,
        "token": {
            "name": config.token.name,
            "symbol": config.token.symbol,
            "mint": config.token.configured_mint(),
            "price": price.to_f64().unwrap_or_default(),
            "priceFormatted": if available {
                format!("${price:.6}")
            } else {
                "Not available".to_owned()
            },
            "configured": config.token.is_configured(),
            "priceAvailable": available,
        },
        "endpoints": endpoints,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /api/token/burn-stats`: Burn totals, projection and daily history.
pub async fn get_burn_stats(State(state): State<AppState>) -> Json<Value> {
    let ledger = state.gate.ledger();
    let stats = ledger.stats().await;
    let projection = ledger.projection().await;
    let history = ledger.history(BURN_HISTORY_DAYS).await;
    Json(json!({
        "success": true,
        "data": {
            "stats": stats,
            "projection": projection,
            "history": history,
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /api/token/balance?wallet=`: The wallet's token balance.
///
/// # Errors
///
/// Returns 400 on a missing or malformed wallet, 503 without a configured
/// mint, or 500 if the RPC read fails.
pub async fn get_token_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<Value>, ApiError> {
    let wallet = query
        .wallet
        .as_deref()
        .map(str::trim)
        .filter(|wallet| !wallet.is_empty())
        .ok_or(ApiError::WalletRequired)?;
    if !is_valid_address(wallet) {
        return Err(ApiError::InvalidWallet);
    }
    let token = &state.gate.config().token;
    let mint = token.configured_mint().ok_or(ApiError::TokenNotConfigured)?;

    let holdings = state.rpc.token_balance(wallet, mint).await?;
    let balance = holdings.amount.to_decimal(token.decimals);
    Ok(Json(json!({
        "success": true,
        "data": {
            "wallet": wallet,
            "balance": balance,
            "rawBalance": holdings.amount,
            "hasTokens": !holdings.amount.is_zero(),
            "tokenAccount": holdings.primary_account,
        },
    })))
}

/// `POST /api/admin/reset/{period}`: Zeroes the daily, weekly or monthly counter.
///
/// # Errors
///
/// Returns 404 if no admin token is configured, 401 on a wrong bearer token,
/// 400 on an unknown period, or 500 if the store fails.
pub async fn post_reset_counters(
    State(state): State<AppState>,
    Path(period): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let expected = state.admin_token.as_deref().ok_or(ApiError::AdminDisabled)?;
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if !presented.is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes())) {
        return Err(ApiError::Unauthorized);
    }

    let period: Period = period.parse()?;
    state.gate.ledger().reset_counters(period).await?;
    tracing::info!(%period, "Burn counters reset");
    Ok(Json(json!({ "success": true, "period": period })))
}

/// `GET /api/data/time`: Current server time, for paid callers.
pub async fn get_time(
    State(state): State<AppState>,
    Extension(payment): Extension<VerifiedPayment>,
) -> Json<Value> {
    let now = Utc::now();
    let explorer_url = state.cluster.explorer_tx_url(&payment.tx_reference);
    tracing::info!(explorer = %explorer_url, "Served paid call");
    Json(json!({
        "success": true,
        "data": {
            "utc": now.to_rfc3339(),
            "unixMs": now.timestamp_millis(),
        },
        "paidBy": payment.sender,
        "explorerUrl": explorer_url,
    }))
}

/// Byte comparison whose duration depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// Creates the PYRE API [`Router`].
///
/// Endpoints:
/// - `GET /api/health`: liveness check
/// - `GET /api/info`: token and distribution
/// - `GET /api/token/price`: token price and endpoint costs
/// - `GET /api/token/burn-stats`: burn statistics
/// - `GET /api/token/balance`: wallet token balance
/// - `POST /api/admin/reset/{period}`: reset period counters
/// - `GET /api/data/time`: metered sample endpoint
pub fn app_router(state: AppState) -> Router {
    let metered = state.gate.with_price(TIME_ENDPOINT_PRICE);
    Router::new()
        .route("/api/health", get(get_health))
        .route("/api/info", get(get_info))
        .route("/api/token/price", get(get_token_price))
        .route("/api/token/burn-stats", get(get_burn_stats))
        .route("/api/token/balance", get(get_token_balance))
        .route("/api/admin/reset/{period}", post(post_reset_counters))
        .route("/api/data/time", get(get_time).layer(metered))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pyre::config::{PaymentWallets, TokenConfig};
    use pyre::ledger::BurnLedger;
    use pyre::oracle::PriceOracle;
    use pyre::verifier::{PaymentVerifier, VerificationError, VerifyRequest};
    use pyre_http::server::GateConfig;
    use pyre_http::types::{FreeRoutes, RoutePricing};
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const MINT: &str = "Ecqv1vJq8dDHqq7hU5bLFZC42DQSsKgnANFdaFEtBAGS";
    const ADMIN: &str = "let-me-in";

    const TX: &str = "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW";
    const UNUSED_RPC: &str = "http://127.0.0.1:9";

    /// Accepts every payment as exactly what was asked, or rejects them all.
    struct StubVerifier {
        accept: bool,
    }

    #[async_trait]
    impl PaymentVerifier for StubVerifier {
        async fn verify(
            &self,
            request: &VerifyRequest,
        ) -> Result<VerifiedPayment, VerificationError> {
            if !self.accept {
                return Err(VerificationError::NotFound);
            }
            Ok(VerifiedPayment {
                sender: request.expected_sender.clone(),
                amount: request.expected_amount.unwrap_or_default(),
                tx_reference: request.tx_reference.clone(),
                verified_at: 0,
            })
        }
    }

    fn state(mint: Option<&str>, fallback_price: Option<Decimal>) -> AppState {
        state_with(mint, fallback_price, UNUSED_RPC, false)
    }

    fn state_with_rpc(mint: Option<&str>, rpc_url: &str) -> AppState {
        state_with(mint, None, rpc_url, false)
    }

    fn state_with(
        mint: Option<&str>,
        fallback_price: Option<Decimal>,
        rpc_url: &str,
        accept: bool,
    ) -> AppState {
        let token = TokenConfig {
            mint: mint.map(str::to_owned),
            fallback_price,
            ..TokenConfig::default()
        };
        let oracle = PriceOracle::new(token.configured_mint().map(str::to_owned))
            .with_fallback_price(token.fallback_price);
        let ledger = BurnLedger::in_memory(&token);
        let config = GateConfig {
            token,
            wallets: PaymentWallets {
                payment: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_owned(),
                ..PaymentWallets::default()
            },
            routes: RoutePricing::pyre_defaults(),
            free_routes: FreeRoutes::pyre_defaults(),
            ..GateConfig::default()
        };
        let gate = PyreMiddleware::new(
            config,
            Arc::new(oracle),
            Arc::new(StubVerifier { accept }),
            ledger,
        )
        .unwrap();
        AppState {
            gate,
            admin_token: Some(ADMIN.to_owned()),
            rpc: SolanaRpcLedger::try_from(rpc_url).unwrap(),
            cluster: SolanaCluster::Devnet,
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn reset_request(period: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/api/admin/reset/{period}"));
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app_router(state(None, None)), get_request("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_info() {
        let (status, body) = send(app_router(state(Some(MINT), None)), get_request("/api/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token"]["mint"], MINT);
        assert_eq!(body["token"]["configured"], true);
        assert_eq!(body["distribution"]["burn"], "30%");
        assert_eq!(body["burnAddress"], BURN_ADDRESS);
    }

    #[tokio::test]
    async fn test_token_price_without_price() {
        let (status, body) =
            send(app_router(state(None, None)), get_request("/api/token/price")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token"]["configured"], false);
        assert_eq!(body["token"]["priceAvailable"], false);
        assert_eq!(body["token"]["priceFormatted"], "Not available");
        assert_eq!(body["token"]["mint"], Value::Null);
        let chat = &body["endpoints"]["/api/ai/chat"];
        assert_eq!(chat["available"], false);
        assert_eq!(chat["tokenAmount"], Value::Null);
    }

    #[tokio::test]
    async fn test_token_price_with_fallback() {
        let app = app_router(state(Some(MINT), Some(Decimal::new(1, 3))));
        let (status, body) = send(app, get_request("/api/token/price")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token"]["priceAvailable"], true);
        assert_eq!(body["token"]["priceFormatted"], "$0.001000");
        assert_eq!(body["token"]["price"], 0.001);
        let chat = &body["endpoints"]["/api/ai/chat"];
        assert_eq!(chat["tokenAmount"], 50);
        assert_eq!(chat["burnAmount"], 15);
        assert_eq!(chat["category"], "ai");
        assert_eq!(body["endpoints"].as_object().unwrap().len(), 14);
    }

    #[tokio::test]
    async fn test_burn_stats_on_empty_ledger() {
        let (status, body) =
            send(app_router(state(Some(MINT), None)), get_request("/api/token/burn-stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["stats"]["percentBurned"], "0.0000");
        assert_eq!(body["data"]["stats"]["totalSupply"], 1_000_000_000_u64);
        assert!(body["data"]["history"].as_array().unwrap().is_empty());
        assert!(body["data"]["projection"].is_object());
    }

    #[tokio::test]
    async fn test_admin_reset_requires_token() {
        let app = app_router(state(Some(MINT), None));
        let (status, body) = send(app.clone(), reset_request("daily", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(app.clone(), reset_request("daily", Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(app, reset_request("daily", Some(ADMIN))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["period"], "daily");
    }

    #[tokio::test]
    async fn test_admin_reset_rejects_token_prefix_and_extension() {
        let app = app_router(state(Some(MINT), None));
        for token in ["let-me", "let-me-in!", ""] {
            let (status, _) = send(app.clone(), reset_request("daily", Some(token))).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "token {token:?}");
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"let-me-in", b"let-me-in"));
        assert!(!constant_time_eq(b"let-me-in", b"let-me-im"));
        assert!(!constant_time_eq(b"let-me-in", b"let-me"));
        assert!(constant_time_eq(b"", b""));
    }

    #[tokio::test]
    async fn test_token_balance_validates_wallet() {
        let app = app_router(state(Some(MINT), None));
        let (status, body) = send(app.clone(), get_request("/api/token/balance")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Wallet address required");

        let (status, body) = send(app.clone(), get_request("/api/token/balance?wallet=")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Wallet address required");

        let (status, body) =
            send(app, get_request("/api/token/balance?wallet=not-a-wallet")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid wallet address");
    }

    #[tokio::test]
    async fn test_token_balance_needs_mint() {
        let app = app_router(state(None, None));
        let (status, _) =
            send(app, get_request(&format!("/api/token/balance?wallet={WALLET}"))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_token_balance_reads_ledger() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getTokenAccountsByOwner" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "context": { "slot": 1 },
                    "value": [{
                        "pubkey": "ata",
                        "account": { "data": { "parsed": { "info": {
                            "tokenAmount": { "amount": "1500000000", "decimals": 9 }
                        } } } }
                    }]
                }
            })))
            .mount(&server)
            .await;

        let app = app_router(state_with_rpc(Some(MINT), &server.uri()));
        let (status, body) =
            send(app, get_request(&format!("/api/token/balance?wallet={WALLET}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["wallet"], WALLET);
        assert_eq!(body["data"]["balance"], 1.5);
        assert_eq!(body["data"]["rawBalance"], "1500000000");
        assert_eq!(body["data"]["hasTokens"], true);
        assert_eq!(body["data"]["tokenAccount"], "ata");
    }

    #[tokio::test]
    async fn test_token_balance_rpc_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;
        let app = app_router(state_with_rpc(Some(MINT), &server.uri()));
        let (status, body) =
            send(app, get_request(&format!("/api/token/balance?wallet={WALLET}"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_admin_reset_rejects_unknown_period() {
        let app = app_router(state(Some(MINT), None));
        let (status, body) = send(app, reset_request("hourly", Some(ADMIN))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid period. Use: daily, weekly, or monthly");
    }

    #[tokio::test]
    async fn test_admin_disabled_without_token() {
        let mut state = state(Some(MINT), None);
        state.admin_token = None;
        let (status, _) = send(app_router(state), reset_request("weekly", Some(ADMIN))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_time_is_metered() {
        let (status, body) =
            send(app_router(state(None, None)), get_request("/api/data/time")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "TOKEN_NOT_CONFIGURED");

        let app = app_router(state(Some(MINT), Some(Decimal::new(1, 3))));
        let (status, body) = send(app.clone(), get_request("/api/data/time")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "NO_WALLET");

        let request = Request::builder()
            .uri("/api/data/time")
            .header("wallet-address", WALLET)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["pricing"]["priceUSD"], 0.001);
        assert_eq!(body["pricing"]["requiredTokens"], 1);
    }

    #[tokio::test]
    async fn test_paid_time_links_explorer() {
        let app = app_router(state_with(Some(MINT), Some(Decimal::new(1, 3)), UNUSED_RPC, true));
        let proof = pyre::proof::PaymentProof::new(TX).encode().unwrap();
        let request = Request::builder()
            .uri("/api/data/time")
            .header("wallet-address", WALLET)
            .header("payment-proof", proof)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paidBy"], WALLET);
        assert_eq!(
            body["explorerUrl"],
            format!("https://solscan.io/tx/{TX}?cluster=devnet")
        );
    }
}
