//! Market price sources queried over HTTP.
//!
//! Each source implements [`pyre::oracle::PriceSource`] and can be pointed
//! at a different base URL (a proxy, a paid tier, or a mock server in tests).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pyre::error::PriceSourceError;
use pyre::oracle::PriceSource;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

/// Jupiter price API v2.
pub const JUPITER_PRICE_URL: &str = "https://api.jup.ag/price/v2";

/// Birdeye public API.
pub const BIRDEYE_API_URL: &str = "https://public-api.birdeye.so";

/// DexScreener public API.
pub const DEXSCREENER_API_URL: &str = "https://api.dexscreener.com";

/// Connection settings shared by all HTTP price sources.
#[derive(Debug, Clone)]
struct Endpoint {
    base_url: Url,
    client: Client,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl Endpoint {
    fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: Client::new(),
            api_key: None,
            timeout: None,
        }
    }

    /// Appends `segments` to the base URL path.
    fn join(&self, name: &'static str, segments: &[&str]) -> Result<Url, PriceSourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| PriceSourceError::Transport {
                source_name: name,
                message: format!("base URL cannot carry a path: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        name: &'static str,
        url: Url,
        headers: &[(&'static str, &str)],
    ) -> Result<R, PriceSourceError> {
        let transport = |message: String| PriceSourceError::Transport {
            source_name: name,
            message,
        };

        let mut req = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        for (key, value) in headers {
            req = req.header(*key, *value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req.send().await.map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(transport(format!("unexpected HTTP status {status}")));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| transport(format!("failed to deserialize JSON: {e}")))
    }
}

/// Keeps strictly positive prices.
fn positive(name: &'static str, price: Option<Decimal>) -> Result<Decimal, PriceSourceError> {
    price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or(PriceSourceError::NoPrice(name))
}

macro_rules! endpoint_builders {
    ($ty:ident) => {
        impl $ty {
            /// Returns the configured base URL.
            #[must_use]
            pub const fn base_url(&self) -> &Url {
                &self.endpoint.base_url
            }

            /// Sends `key` as the source's API key header.
            #[must_use]
            pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
                self.endpoint.api_key = Some(key.into());
                self
            }

            /// Sets a per-request timeout.
            #[must_use]
            pub const fn with_timeout(mut self, timeout: Duration) -> Self {
                self.endpoint.timeout = Some(timeout);
                self
            }

            /// Uses a preconfigured HTTP client.
            #[must_use]
            pub fn with_client(mut self, client: Client) -> Self {
                self.endpoint.client = client;
                self
            }
        }
    };
}

/// Jupiter aggregator prices.
#[derive(Debug, Clone)]
pub struct JupiterPriceSource {
    endpoint: Endpoint,
}

#[derive(Deserialize)]
struct JupiterResponse {
    #[serde(default)]
    data: HashMap<String, Option<JupiterPrice>>,
}

#[derive(Deserialize)]
struct JupiterPrice {
    #[serde(default)]
    price: Option<Decimal>,
}

impl JupiterPriceSource {
    /// Creates a source querying `base_url` (the `/price/v2` endpoint).
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            endpoint: Endpoint::new(base_url),
        }
    }
}

endpoint_builders!(JupiterPriceSource);

impl Default for JupiterPriceSource {
    fn default() -> Self {
        Self::new(Url::parse(JUPITER_PRICE_URL).expect("valid constant URL"))
    }
}

#[async_trait]
impl PriceSource for JupiterPriceSource {
    fn name(&self) -> &'static str {
        "Jupiter"
    }

    async fn fetch_price(&self, mint: &str) -> Result<Decimal, PriceSourceError> {
        let mut url = self.endpoint.base_url.clone();
        url.query_pairs_mut().append_pair("ids", mint);
        let headers = self
            .endpoint
            .api_key
            .as_deref()
            .map(|key| ("x-api-key", key))
            .into_iter()
            .collect::<Vec<_>>();
        let mut response: JupiterResponse =
            self.endpoint.get_json(self.name(), url, &headers).await?;
        let price = response
            .data
            .remove(mint)
            .flatten()
            .and_then(|entry| entry.price);
        positive(self.name(), price)
    }
}

/// Birdeye prices.
#[derive(Debug, Clone)]
pub struct BirdeyePriceSource {
    endpoint: Endpoint,
}

#[derive(Deserialize)]
struct BirdeyeResponse {
    #[serde(default)]
    data: Option<BirdeyePrice>,
}

#[derive(Deserialize)]
struct BirdeyePrice {
    #[serde(default)]
    value: Option<Decimal>,
}

impl BirdeyePriceSource {
    /// Creates a source querying the Birdeye API at `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            endpoint: Endpoint::new(base_url),
        }
    }
}

endpoint_builders!(BirdeyePriceSource);

impl Default for BirdeyePriceSource {
    fn default() -> Self {
        Self::new(Url::parse(BIRDEYE_API_URL).expect("valid constant URL"))
    }
}

#[async_trait]
impl PriceSource for BirdeyePriceSource {
    fn name(&self) -> &'static str {
        "Birdeye"
    }

    async fn fetch_price(&self, mint: &str) -> Result<Decimal, PriceSourceError> {
        let mut url = self.endpoint.join(self.name(), &["defi", "price"])?;
        url.query_pairs_mut().append_pair("address", mint);
        let mut headers = vec![("x-chain", "solana")];
        if let Some(key) = self.endpoint.api_key.as_deref() {
            headers.push(("X-API-KEY", key));
        }
        let response: BirdeyeResponse = self.endpoint.get_json(self.name(), url, &headers).await?;
        positive(self.name(), response.data.and_then(|d| d.value))
    }
}

/// DexScreener pair prices. Uses the first listed pair.
#[derive(Debug, Clone)]
pub struct DexScreenerPriceSource {
    endpoint: Endpoint,
}

#[derive(Deserialize)]
struct DexScreenerResponse {
    #[serde(default)]
    pairs: Option<Vec<DexScreenerPair>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexScreenerPair {
    #[serde(default)]
    price_usd: Option<Decimal>,
}

impl DexScreenerPriceSource {
    /// Creates a source querying the DexScreener API at `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            endpoint: Endpoint::new(base_url),
        }
    }
}

endpoint_builders!(DexScreenerPriceSource);

impl Default for DexScreenerPriceSource {
    fn default() -> Self {
        Self::new(Url::parse(DEXSCREENER_API_URL).expect("valid constant URL"))
    }
}

#[async_trait]
impl PriceSource for DexScreenerPriceSource {
    fn name(&self) -> &'static str {
        "DexScreener"
    }

    async fn fetch_price(&self, mint: &str) -> Result<Decimal, PriceSourceError> {
        let url = self
            .endpoint
            .join(self.name(), &["latest", "dex", "tokens", mint])?;
        let response: DexScreenerResponse = self.endpoint.get_json(self.name(), url, &[]).await?;
        let price = response
            .pairs
            .and_then(|pairs| pairs.into_iter().next())
            .and_then(|pair| pair.price_usd);
        positive(self.name(), price)
    }
}
