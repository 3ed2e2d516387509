//! A [`LedgerClient`] backed by a Solana JSON-RPC node.
//!
//! [`SolanaRpcLedger`] issues `getTransaction` (with `jsonParsed` encoding)
//! and `getSignatureStatuses` over plain HTTP. Each call is a single attempt;
//! an optional per-request timeout bounds how long verification can block.
//! [`SolanaRpcLedger::token_balance`] reads a wallet's holdings of one mint
//! through `getTokenAccountsByOwner`.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use pyre::amount::TokenAmount;
use pyre::verifier::{Finality, LedgerClient, LedgerError, LedgerTransaction};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};

use crate::error::SolanaRpcError;
use crate::parse::{EncodedTransaction, UiTokenAmount};

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SignatureStatuses {
    value: Vec<Option<SignatureStatus>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    #[serde(default)]
    confirmation_status: Option<Finality>,
}

#[derive(Debug, Deserialize)]
struct TokenAccounts {
    value: Vec<KeyedTokenAccount>,
}

#[derive(Debug, Deserialize)]
struct KeyedTokenAccount {
    pubkey: String,
    account: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    data: ParsedAccountData,
}

#[derive(Debug, Deserialize)]
struct ParsedAccountData {
    parsed: ParsedTokenAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccount {
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    token_amount: UiTokenAmount,
}

/// A wallet's holdings of one mint, summed over its token accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenHoldings {
    /// Total balance in minor units.
    pub amount: TokenAmount,
    /// Token account holding the largest balance, if the wallet has any.
    pub primary_account: Option<String>,
}

/// Reads Solana transactions through a JSON-RPC node.
#[derive(Clone, Debug)]
pub struct SolanaRpcLedger {
    /// JSON-RPC endpoint.
    rpc_url: Url,
    /// Shared Reqwest HTTP client.
    client: Client,
    /// Optional request timeout.
    timeout: Option<Duration>,
    /// Commitment requested from `getTransaction`.
    commitment: Finality,
}

impl SolanaRpcLedger {
    /// Creates a client for the JSON-RPC endpoint at `rpc_url`.
    #[must_use]
    pub fn new(rpc_url: Url) -> Self {
        Self {
            rpc_url,
            client: Client::new(),
            timeout: None,
            commitment: Finality::Confirmed,
        }
    }

    /// Returns the JSON-RPC endpoint.
    #[must_use]
    pub const fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    /// Returns the configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the commitment used to fetch transactions.
    ///
    /// `getTransaction` does not support `processed`, which is raised to
    /// `confirmed`.
    #[must_use]
    pub const fn with_commitment(mut self, commitment: Finality) -> Self {
        self.commitment = match commitment {
            Finality::Finalized => Finality::Finalized,
            Finality::Processed | Finality::Confirmed => Finality::Confirmed,
        };
        self
    }

    /// Fetches a transaction in `jsonParsed` encoding.
    ///
    /// # Errors
    ///
    /// Returns [`SolanaRpcError`] if the signature is malformed or the
    /// request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "pyre.solana_rpc.get_transaction", skip(self), err)
    )]
    pub async fn fetch_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<EncodedTransaction>, SolanaRpcError> {
        let signature = parse_signature(signature)?;
        let commitment = match self.commitment {
            Finality::Finalized => "finalized",
            Finality::Processed | Finality::Confirmed => "confirmed",
        };
        self.call(
            "getTransaction",
            json!([
                signature.to_string(),
                {
                    "encoding": "jsonParsed",
                    "commitment": commitment,
                    "maxSupportedTransactionVersion": 0
                }
            ]),
        )
        .await
    }

    /// Fetches the confirmation status of a signature, searching the full
    /// transaction history.
    ///
    /// # Errors
    ///
    /// Returns [`SolanaRpcError`] if the signature is malformed or the
    /// request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "pyre.solana_rpc.signature_status", skip(self), err)
    )]
    pub async fn signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<Finality>, SolanaRpcError> {
        let signature = parse_signature(signature)?;
        let statuses: Option<SignatureStatuses> = self
            .call(
                "getSignatureStatuses",
                json!([[signature.to_string()], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(statuses
            .and_then(|s| s.value.into_iter().next().flatten())
            .and_then(|status| status.confirmation_status))
    }

    /// Sums the balances of every token account of `mint` owned by `owner`.
    ///
    /// A wallet without a token account holds zero.
    ///
    /// # Errors
    ///
    /// Returns [`SolanaRpcError`] if either address is malformed, the request
    /// fails, or an account amount does not parse.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "pyre.solana_rpc.token_balance", skip(self), err)
    )]
    pub async fn token_balance(
        &self,
        owner: &str,
        mint: &str,
    ) -> Result<TokenHoldings, SolanaRpcError> {
        let owner = parse_address(owner)?;
        let mint = parse_address(mint)?;
        let accounts: Option<TokenAccounts> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    { "mint": mint.to_string() },
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ]),
            )
            .await?;

        let mut holdings = TokenHoldings::default();
        let mut largest = TokenAmount::ZERO;
        for keyed in accounts.map(|a| a.value).unwrap_or_default() {
            let raw = keyed.account.data.parsed.info.token_amount.amount;
            let amount: TokenAmount = raw
                .parse()
                .map_err(|_| SolanaRpcError::InvalidAmount(raw.clone()))?;
            holdings.amount = holdings.amount.saturating_add(amount);
            if holdings.primary_account.is_none() || amount > largest {
                largest = amount;
                holdings.primary_account = Some(keyed.pubkey);
            }
        }
        Ok(holdings)
    }

    /// Generic JSON-RPC helper that handles the envelope, error mapping,
    /// timeout application, and telemetry integration.
    ///
    /// A `null` result is returned as `Ok(None)`.
    async fn call<R>(&self, method: &'static str, params: Value) -> Result<Option<R>, SolanaRpcError>
    where
        R: DeserializeOwned,
    {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let mut req = self.client.post(self.rpc_url.clone()).json(&payload);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req.send().await.map_err(|e| SolanaRpcError::Http {
            context: method,
            source: e,
        })?;

        let result = if http_response.status() == StatusCode::OK {
            http_response
                .json::<RpcResponse<R>>()
                .await
                .map_err(|e| SolanaRpcError::JsonDeserialization {
                    context: method,
                    source: e,
                })
                .and_then(|response| match response.error {
                    Some(err) => Err(SolanaRpcError::Rpc {
                        context: method,
                        code: err.code,
                        message: err.message,
                    }),
                    None => Ok(response.result),
                })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| SolanaRpcError::ResponseBodyRead {
                    context: method,
                    source: e,
                })?;
            Err(SolanaRpcError::HttpStatus {
                context: method,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }
}

/// Converts a string URL into a [`SolanaRpcLedger`].
impl TryFrom<&str> for SolanaRpcLedger {
    type Error = SolanaRpcError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(value).map_err(|e| SolanaRpcError::UrlParse {
            context: "Failed to parse RPC url",
            source: e,
        })?;
        Ok(Self::new(url))
    }
}

#[async_trait]
impl LedgerClient for SolanaRpcLedger {
    async fn get_transaction(
        &self,
        tx_reference: &str,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        Ok(self
            .fetch_transaction(tx_reference)
            .await?
            .map(EncodedTransaction::into_ledger_transaction))
    }

    async fn confirmation_status(
        &self,
        tx_reference: &str,
    ) -> Result<Option<Finality>, LedgerError> {
        Ok(self.signature_status(tx_reference).await?)
    }
}

fn parse_signature(signature: &str) -> Result<Signature, SolanaRpcError> {
    Signature::from_str(signature.trim())
        .map_err(|_| SolanaRpcError::InvalidSignature(signature.to_owned()))
}

fn parse_address(address: &str) -> Result<Pubkey, SolanaRpcError> {
    Pubkey::from_str(address.trim())
        .map_err(|_| SolanaRpcError::InvalidAddress(address.to_owned()))
}

/// Records the outcome of a request on a tracing span, including status and errors.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            tracing::event!(tracing::Level::WARN, error = %err, "Solana RPC request failed");
        }
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}
