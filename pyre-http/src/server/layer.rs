//! Axum middleware enforcing token payments on protected routes.
//!
//! Build one [`PyreMiddleware`] per application and apply it with
//! `Router::layer`. Routes listed in [`GateConfig::free_routes`] pass
//! through; every other route is priced from [`GateConfig::routes`], or
//! from a fixed USD price set with [`PyreMiddleware::with_price`].
//!
//! ```ignore
//! let gate = PyreMiddleware::new(config, oracle, verifier, ledger)?;
//! let app = Router::new()
//!     .route("/api/ai/chat", post(chat))
//!     .layer(gate.clone())
//!     .route("/api/data/time", get(time).layer(gate.with_price(dec!(0.01))));
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::Response;
use pyre::error::ConfigError;
use pyre::ledger::BurnLedger;
use pyre::oracle::PriceOracle;
use pyre::verifier::PaymentVerifier;
use rust_decimal::Decimal;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use super::paygate::{GateConfig, Paygate};

/// The payment middleware. Cheap to clone.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // dyn PaymentVerifier does not implement Debug
pub struct PyreMiddleware {
    gate: Paygate,
}

impl PyreMiddleware {
    /// Creates the middleware.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the distribution does not add up to 100%.
    pub fn new(
        config: GateConfig,
        oracle: Arc<PriceOracle>,
        verifier: Arc<dyn PaymentVerifier>,
        ledger: BurnLedger,
    ) -> Result<Self, ConfigError> {
        config.distribution.validate()?;
        Ok(Self {
            gate: Paygate {
                config: Arc::new(config),
                oracle,
                verifier,
                ledger,
                price_override: None,
            },
        })
    }

    /// Charges `usd_price` per call, ignoring the route table.
    #[must_use]
    pub fn with_price(&self, usd_price: Decimal) -> Self {
        let mut this = self.clone();
        this.gate.price_override = Some(usd_price);
        this
    }

    /// Returns the gate settings.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.gate.config
    }

    /// Returns the price oracle.
    #[must_use]
    pub const fn oracle(&self) -> &Arc<PriceOracle> {
        &self.gate.oracle
    }

    /// Returns the burn ledger.
    #[must_use]
    pub const fn ledger(&self) -> &BurnLedger {
        &self.gate.ledger
    }
}

impl<S> Layer<S> for PyreMiddleware
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = PyreMiddlewareService;

    fn layer(&self, inner: S) -> Self::Service {
        PyreMiddlewareService {
            gate: self.gate.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that enforces payments on incoming requests.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct PyreMiddlewareService {
    /// The payment gate
    gate: Paygate,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl Service<Request> for PyreMiddlewareService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = self.gate.clone();
        let inner = self.inner.clone();
        Box::pin(gate.handle_request(inner, req))
    }
}
