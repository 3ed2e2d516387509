//! Server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 3000
//! admin_token = "$PYRE_ADMIN_TOKEN"
//!
//! [token]
//! mint = "$PYRE_TOKEN_MINT"
//! fallback_price = "0.001"
//!
//! [wallets]
//! payment = "$PAYMENT_WALLET"
//!
//! [pricing.routes]
//! "/api/ai/chat" = "0.05"
//!
//! [solana]
//! rpc_url = "$HELIUS_RPC_URL"
//! commitment = "confirmed"
//!
//! [store]
//! path = "data/burns"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG`: path to the configuration file (default: `config.toml`)
//! - `HOST`: override server bind address
//! - `PORT`: override server port
//! - anything referenced by `$VAR` in the config file

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pyre::config::{PaymentWallets, TokenConfig};
use pyre::distribution::DistributionConfig;
use pyre::ledger::{BurnLedger, LmdbBurnStore};
use pyre::verifier::Finality;
use pyre_http::types::{FreeRoutes, RoutePricing};
use pyre_svm::networks::SolanaCluster;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `3000`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token for the admin API. The admin API is disabled without it.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// The payment token.
    #[serde(default)]
    pub token: TokenConfig,

    /// Wallets receiving payments.
    #[serde(default)]
    pub wallets: PaymentWallets,

    /// How verified payments are split.
    #[serde(default)]
    pub distribution: DistributionConfig,

    /// USD prices of metered routes.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Routes that need no payment. Defaults to the public PYRE endpoints.
    #[serde(default)]
    pub free_routes: Option<Vec<String>>,

    /// Market price sources.
    #[serde(default)]
    pub price_sources: PriceSourcesConfig,

    /// Solana RPC connection.
    #[serde(default)]
    pub solana: SolanaConfig,

    /// Burn ledger persistence.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Route price table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Start from the launch price list (default: `true`).
    #[serde(default = "default_true")]
    pub use_defaults: bool,

    /// USD price per call keyed by route pattern (`"/path"` or `"GET /path"`).
    #[serde(default)]
    pub routes: BTreeMap<String, Decimal>,

    /// Price of metered routes missing from the table.
    #[serde(default)]
    pub default_price: Option<Decimal>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            use_defaults: true,
            routes: BTreeMap::new(),
            default_price: None,
        }
    }
}

/// A market price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourceKind {
    /// Jupiter price API.
    Jupiter,
    /// Birdeye public API.
    Birdeye,
    /// `DexScreener` API.
    DexScreener,
}

/// Price source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSourcesConfig {
    /// Sources in query order.
    #[serde(default = "default_sources")]
    pub order: Vec<PriceSourceKind>,

    /// Jupiter price endpoint override.
    #[serde(default)]
    pub jupiter_url: Option<url::Url>,

    /// Birdeye API base override.
    #[serde(default)]
    pub birdeye_url: Option<url::Url>,

    /// Birdeye API key.
    #[serde(default)]
    pub birdeye_api_key: Option<String>,

    /// `DexScreener` API base override.
    #[serde(default)]
    pub dexscreener_url: Option<url::Url>,

    /// Per-request timeout in milliseconds (default: 5000).
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,

    /// Seconds a fetched price stays fresh (default: 60).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for PriceSourcesConfig {
    fn default() -> Self {
        Self {
            order: default_sources(),
            jupiter_url: None,
            birdeye_url: None,
            birdeye_api_key: None,
            dexscreener_url: None,
            timeout_ms: default_source_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl PriceSourcesConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Freshness window of a fetched price.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Solana RPC settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    /// Cluster whose public endpoint is used when no RPC URL is set.
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// JSON-RPC endpoint. Unresolved `$VAR` references count as unset.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Commitment a payment must reach (default: `confirmed`).
    #[serde(default = "default_commitment")]
    pub commitment: Finality,

    /// Per-request timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            cluster: default_cluster(),
            rpc_url: None,
            commitment: default_commitment(),
            timeout_ms: None,
        }
    }
}

impl SolanaConfig {
    /// Resolves the RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the cluster is unknown or the URL
    /// does not parse.
    pub fn rpc_url(&self) -> Result<url::Url, ServerError> {
        let explicit = self
            .rpc_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty() && !url.starts_with('$'));
        let url = match explicit {
            Some(url) => url.to_owned(),
            None => self
                .cluster
                .parse::<SolanaCluster>()
                .map_err(|e| ServerError::Config(e.to_string()))?
                .public_rpc_url()
                .to_owned(),
        };
        url::Url::parse(&url).map_err(|e| ServerError::Config(format!("invalid Solana RPC URL: {e}")))
    }

    /// Per-request timeout, if configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Burn ledger persistence settings.
///
/// Without a path the ledger lives in memory and is lost on restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of the LMDB environment. Unresolved `$VAR` references count
    /// as unset.
    #[serde(default)]
    pub path: Option<String>,

    /// LMDB map size in MiB (default: 256).
    #[serde(default)]
    pub map_size_mb: Option<usize>,
}

impl StoreConfig {
    /// Directory of the durable store, if one is configured.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty() && !path.starts_with('$'))
            .map(PathBuf::from)
    }

    /// LMDB map size in bytes.
    #[must_use]
    pub fn map_size(&self) -> usize {
        self.map_size_mb
            .map_or(pyre::ledger::DEFAULT_MAP_SIZE, |mb| mb.saturating_mul(1024 * 1024))
    }

    /// Opens the burn ledger: durable when a path is set, in memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Store`] if the LMDB environment cannot be opened.
    pub fn open_ledger(&self, token: &TokenConfig) -> Result<BurnLedger, ServerError> {
        let Some(path) = self.path() else {
            tracing::warn!("No store path configured, burns and redeemed payments are kept in memory");
            return Ok(BurnLedger::in_memory(token));
        };
        let store = LmdbBurnStore::open_with_map_size(&path, self.map_size())?;
        tracing::info!(path = %path.display(), "Using durable burn store");
        Ok(BurnLedger::new(Arc::new(store), token))
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    3000
}

const fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<PriceSourceKind> {
    vec![
        PriceSourceKind::Jupiter,
        PriceSourceKind::Birdeye,
        PriceSourceKind::DexScreener,
    ]
}

const fn default_source_timeout_ms() -> u64 {
    5_000
}

const fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_cluster() -> String {
    "mainnet".to_owned()
}

const fn default_commitment() -> Finality {
    Finality::Confirmed
}

impl ServerConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults. After loading, `$VAR` / `${VAR}`
    /// references are expanded from the process environment, and the `HOST`
    /// and `PORT` variables override the file values.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ServerError> {
        let content = if path.exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut config = Self::parse(&content)?;

        if let Ok(host) = std::env::var("HOST")
            && let Ok(addr) = host.parse()
        {
            config.host = addr;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        Ok(config)
    }

    /// Parses a TOML document after expanding environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Toml`] if the document is invalid.
    pub fn parse(content: &str) -> Result<Self, ServerError> {
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }

    /// Admin token, if one is set and resolved.
    #[must_use]
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty() && !token.starts_with('$'))
    }

    /// Builds the route price table.
    #[must_use]
    pub fn route_pricing(&self) -> RoutePricing {
        let base = if self.pricing.use_defaults {
            RoutePricing::pyre_defaults()
        } else {
            RoutePricing::new()
        };
        self.pricing
            .routes
            .iter()
            .map(|(pattern, usd)| (pattern, *usd))
            .collect::<RoutePricing>()
            .with_default_price(self.pricing.default_price)
            .merge(base)
    }

    /// Builds the free route allow-list.
    #[must_use]
    pub fn free_routes(&self) -> FreeRoutes {
        self.free_routes
            .as_ref()
            .map_or_else(FreeRoutes::pyre_defaults, |routes| routes.iter().collect())
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        let braced = chars.next_if_eq(&'{').is_some();
        let mut var_name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    closed = true;
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        let value = if var_name.is_empty() {
            None
        } else {
            std::env::var(&var_name).ok()
        };
        if let Some(value) = value {
            result.push_str(&value);
        } else {
            result.push('$');
            if braced {
                result.push('{');
            }
            result.push_str(&var_name);
            if closed {
                result.push('}');
            }
        }
    }

    result
}
