//! Core payment gate logic.
//!
//! The [`Paygate`] struct handles the full payment lifecycle of one request:
//! pricing the call in tokens, answering `402 Payment Required` with a quote,
//! verifying the proof on-chain, rejecting replays, recording the burn and
//! attaching a receipt to the handler's response.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use pyre::amount::TokenAmount;
use pyre::config::{PaymentWallets, TokenConfig};
use pyre::distribution::{Distribution, DistributionConfig, DistributionPercentages};
use pyre::error::{PersistenceError, PriceError};
use pyre::ledger::BurnLedger;
use pyre::oracle::PriceOracle;
use pyre::pricing::{burn_for_tokens, tokens_required};
use pyre::proof::{PaymentProof, ProofError};
use pyre::verifier::{PaymentVerifier, VerifiedPayment, VerifyRequest};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tower::Service;

#[cfg(feature = "telemetry")]
use tracing::Instrument;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::error::PaygateError;
use crate::constants::{
    PAYMENT_INSTRUCTIONS, RECEIPT_FIELD, X_PAYMENT_AMOUNT, X_PAYMENT_BURNED, X_PAYMENT_VERIFIED,
};
use crate::error::HttpError;
use crate::headers;
use crate::types::{FreeRoutes, RoutePricing};

/// Static settings of a payment gate.
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    /// The payment token.
    pub token: TokenConfig,
    /// Wallets receiving payments.
    pub wallets: PaymentWallets,
    /// How verified payments are split.
    pub distribution: DistributionConfig,
    /// USD prices of metered routes.
    pub routes: RoutePricing,
    /// Routes that need no payment.
    pub free_routes: FreeRoutes,
}

/// Price of the requested call, as quoted in 402 responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    /// Requested path.
    pub endpoint: String,
    /// USD price of the call.
    #[serde(rename = "priceUSD", with = "rust_decimal::serde::float")]
    pub price_usd: Decimal,
    /// USD price of one whole token.
    #[serde(with = "rust_decimal::serde::float")]
    pub token_price: Decimal,
    /// Whole tokens to pay.
    pub required_tokens: u64,
}

/// Burn share of a quoted payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnInfo {
    /// Burn percentage.
    pub percentage: u8,
    /// Whole tokens that will be burned.
    pub tokens_to_burn: u64,
}

/// Body of a `402 Payment Required` response, without the common
/// `error`/`code`/`message` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// The price of this call.
    pub pricing: Pricing,
    /// How the payment will be split.
    pub distribution: DistributionPercentages,
    /// How much of it will be burned.
    pub burn_info: BurnInfo,
    /// Where to send the tokens.
    pub payment_wallet: String,
    /// Which token to send.
    pub token_mint: String,
    /// Human-readable payment instructions.
    pub instructions: &'static str,
}

/// Receipt merged into paid JSON responses under `_payment`.
///
/// Amounts are whole-token decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    /// Always `true`; only paid calls carry a receipt.
    pub success: bool,
    /// Amount paid.
    pub amount: String,
    /// Amount burned.
    pub burned: String,
    /// Payment transaction.
    pub tx_hash: String,
}

/// Payment gate for one protected service.
///
/// Cheap to clone: everything but the price override is shared.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // dyn PaymentVerifier does not implement Debug
pub struct Paygate {
    /// Static settings.
    pub config: Arc<GateConfig>,
    /// Token price oracle.
    pub oracle: Arc<PriceOracle>,
    /// On-chain payment verifier.
    pub verifier: Arc<dyn PaymentVerifier>,
    /// Burn accounting and replay protection.
    pub ledger: BurnLedger,
    /// USD price used instead of the route table, if set.
    pub price_override: Option<Decimal>,
}

impl Paygate {
    /// Calls the inner service with proper telemetry instrumentation.
    async fn call_inner<S>(mut inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        #[cfg(feature = "telemetry")]
        {
            inner
                .call(req)
                .instrument(tracing::info_span!("inner"))
                .await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            inner.call(req).await
        }
    }

    /// Handles an incoming request, processing payment if required.
    ///
    /// Rejections are rendered as JSON error responses.
    ///
    /// # Errors
    ///
    /// This method is infallible (`Infallible` error type).
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "pyre.handle_request", skip_all, fields(path = %req.uri().path()))
    )]
    pub async fn handle_request<S>(self, inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(code = err.code(), reason = %err, "Request rejected");
                Ok(err.into_response())
            }
        }
    }

    /// Handles an incoming request, returning rejections as [`PaygateError`].
    ///
    /// # Errors
    ///
    /// Returns [`PaygateError`] if the request may not reach the inner service.
    pub async fn handle_request_fallible<S>(
        &self,
        inner: S,
        mut req: Request,
    ) -> Result<Response, PaygateError>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        let method = req.method().as_str().to_owned();
        let endpoint = req.uri().path().to_owned();

        if self.config.free_routes.matches(&method, &endpoint) {
            let Ok(response) = Self::call_inner(inner, req).await;
            return Ok(response);
        }

        let mint = self
            .config
            .token
            .configured_mint()
            .ok_or(PaygateError::TokenNotConfigured)?
            .to_owned();
        let wallet = headers::wallet_address(req.headers())
            .ok_or(PaygateError::NoWallet)?
            .to_owned();

        let pricing = self.quote(&method, endpoint.clone()).await?;

        let Some(proof_header) = headers::payment_proof_header(req.headers()) else {
            return Err(PaygateError::PaymentRequired(Box::new(
                self.payment_required(pricing, mint),
            )));
        };
        let proof = headers::decode_payment_proof(proof_header).map_err(proof_rejection)?;

        let payment = self.verify(&proof, &pricing, &wallet, &mint).await?;
        self.redeem(&payment).await?;

        let distribution = self.config.distribution.distribute(payment.amount);
        self.record(&distribution, &payment, &endpoint).await;

        let decimals = self.config.token.decimals;
        let receipt = PaymentReceipt {
            success: true,
            amount: payment.amount.to_decimal(decimals).to_string(),
            burned: distribution.burn.to_decimal(decimals).to_string(),
            tx_hash: payment.tx_reference.clone(),
        };

        #[cfg(feature = "telemetry")]
        tracing::info!(
            endpoint = %endpoint,
            wallet = %wallet,
            amount = %receipt.amount,
            burned = %receipt.burned,
            tx_hash = %receipt.tx_hash,
            "Payment accepted"
        );

        mark_paid(req.headers_mut(), &receipt);
        req.extensions_mut().insert(payment);

        let Ok(response) = Self::call_inner(inner, req).await;
        attach_receipt(response, &receipt).await
    }

    /// Prices the call in whole tokens.
    async fn quote(&self, method: &str, endpoint: String) -> Result<Pricing, PaygateError> {
        let price_usd = self
            .price_override
            .or_else(|| self.config.routes.resolve(method, &endpoint))
            .ok_or(PaygateError::PriceUnavailable)?;
        let token_price = self
            .oracle
            .resolve_price()
            .await
            .map_err(|err| price_rejection(&err))?;
        let required_tokens =
            tokens_required(price_usd, token_price).map_err(|err| price_rejection(&err))?;
        Ok(Pricing {
            endpoint,
            price_usd,
            token_price,
            required_tokens,
        })
    }

    fn payment_required(&self, pricing: Pricing, token_mint: String) -> PaymentRequired {
        let distribution = &self.config.distribution;
        PaymentRequired {
            burn_info: BurnInfo {
                percentage: distribution.burn,
                tokens_to_burn: burn_for_tokens(pricing.required_tokens, distribution.burn),
            },
            pricing,
            distribution: distribution.percentages(),
            payment_wallet: self.config.wallets.payment.clone(),
            token_mint,
            instructions: PAYMENT_INSTRUCTIONS,
        }
    }

    /// Checks the referenced transaction pays the quoted amount from the
    /// caller's wallet to the payment wallet in the configured token.
    async fn verify(
        &self,
        proof: &PaymentProof,
        pricing: &Pricing,
        wallet: &str,
        mint: &str,
    ) -> Result<VerifiedPayment, PaygateError> {
        let required =
            TokenAmount::from_whole_tokens(pricing.required_tokens, self.config.token.decimals)
                .ok_or(PaygateError::PriceUnavailable)?;
        let mut request = VerifyRequest::new(proof.tx_reference.as_str())
            .sender(wallet)
            .amount(required)
            .mint(mint);
        if !self.config.wallets.payment.is_empty() {
            request = request.recipient(self.config.wallets.payment.as_str());
        }
        self.verifier
            .verify(&request)
            .await
            .map_err(|err| PaygateError::InvalidPayment(err.to_string()))
    }

    /// Consumes the payment transaction so it cannot pay twice.
    ///
    /// A store failure is logged and the payment is let through.
    async fn redeem(&self, payment: &VerifiedPayment) -> Result<(), PaygateError> {
        match self.ledger.redeem(&payment.tx_reference).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PaygateError::InvalidPayment(
                "Transaction already redeemed".to_owned(),
            )),
            Err(err) => {
                ledger_failure("Failed to mark transaction as redeemed", &err);
                Ok(())
            }
        }
    }

    /// Records the burn share. Failures never fail the request.
    async fn record(&self, distribution: &Distribution, payment: &VerifiedPayment, endpoint: &str) {
        if let Err(err) = self
            .ledger
            .record_burn(
                distribution.burn,
                Some(&payment.tx_reference),
                Some(endpoint),
            )
            .await
        {
            ledger_failure("Failed to record burn", &err);
        }
    }
}

#[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
fn price_rejection(err: &PriceError) -> PaygateError {
    #[cfg(feature = "telemetry")]
    tracing::warn!(error = %err, "Cannot price call");
    PaygateError::PriceUnavailable
}

#[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
fn ledger_failure(action: &'static str, err: &PersistenceError) {
    #[cfg(feature = "telemetry")]
    tracing::error!(error = %err, "{action}");
}

#[allow(clippy::needless_pass_by_value)] // consumed by map_err
fn proof_rejection(err: HttpError) -> PaygateError {
    let message = match err {
        HttpError::Proof(ProofError::MissingReference) => ProofError::MissingReference.to_string(),
        _ => "Invalid payment proof format".to_owned(),
    };
    PaygateError::InvalidPayment(message)
}

/// Tells the handler the request is paid for.
fn mark_paid(headers: &mut HeaderMap, receipt: &PaymentReceipt) {
    let values = [
        (X_PAYMENT_VERIFIED, "true"),
        (X_PAYMENT_AMOUNT, receipt.amount.as_str()),
        (X_PAYMENT_BURNED, receipt.burned.as_str()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

/// Merges the receipt into a successful JSON object response.
///
/// Other responses are returned untouched.
async fn attach_receipt(
    response: Response,
    receipt: &PaymentReceipt,
) -> Result<Response, PaygateError> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("json"));
    if !response.status().is_success() || !is_json {
        return Ok(response);
    }

    let (mut parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|err| PaygateError::ResponseBody(err.to_string()))?;

    let body = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut fields)) => {
            let receipt = serde_json::to_value(receipt)
                .map_err(|err| PaygateError::ResponseBody(err.to_string()))?;
            fields.insert(RECEIPT_FIELD.to_owned(), receipt);
            let merged = serde_json::to_vec(&fields)
                .map_err(|err| PaygateError::ResponseBody(err.to_string()))?;
            parts.headers.remove(CONTENT_LENGTH);
            Body::from(merged)
        }
        _ => Body::from(bytes),
    };
    Ok(Response::from_parts(parts, body))
}
