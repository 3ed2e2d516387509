//! Static token and wallet configuration.
//!
//! These values are deserializable so the server binary can load them from
//! its TOML file; every field has a default matching the PYRE launch values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;

/// Placeholder left in deployment templates before the token launches.
pub const MINT_PLACEHOLDER: &str = "PYRE_TOKEN_MINT_ADDRESS_HERE";

/// Solana incinerator address, used as the display destination for burns.
pub const BURN_ADDRESS: &str = "1nc1nerator11111111111111111111111111111111";

/// Configuration of the payment token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Ticker symbol shown to clients.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Number of decimals of the SPL mint.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Fixed total supply, in whole tokens.
    #[serde(default = "default_total_supply")]
    pub total_supply: u64,
    /// Mint address. `None` (or the placeholder) means the token has not launched.
    #[serde(default)]
    pub mint: Option<String>,
    /// Static USD price used when no market price was ever observed.
    ///
    /// Meant for pre-listing testing only.
    #[serde(default)]
    pub fallback_price: Option<Decimal>,
}

fn default_name() -> String {
    "PYRE".to_owned()
}

fn default_symbol() -> String {
    "$PYRE".to_owned()
}

const fn default_decimals() -> u8 {
    9
}

const fn default_total_supply() -> u64 {
    1_000_000_000
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            symbol: default_symbol(),
            decimals: default_decimals(),
            total_supply: default_total_supply(),
            mint: None,
            fallback_price: None,
        }
    }
}

impl TokenConfig {
    /// Returns a copy of this configuration with the given mint address.
    #[must_use]
    pub fn with_mint(mut self, mint: impl Into<String>) -> Self {
        self.mint = Some(mint.into());
        self
    }

    /// Returns the configured mint if the token has launched.
    ///
    /// A mint counts as configured when it is not the template placeholder and
    /// is long enough to be a base58 public key.
    #[must_use]
    pub fn configured_mint(&self) -> Option<&str> {
        self.mint
            .as_deref()
            .map(str::trim)
            .filter(|mint| *mint != MINT_PLACEHOLDER && mint.len() > 30)
    }

    /// Returns `true` if payments can be accepted.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.configured_mint().is_some()
    }

    /// Total supply in minor units.
    #[must_use]
    pub fn total_supply_amount(&self) -> TokenAmount {
        TokenAmount::from_whole_tokens(self.total_supply, self.decimals)
            .unwrap_or(TokenAmount::new(u128::MAX))
    }
}

/// Wallets receiving payments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentWallets {
    /// Main wallet receiving payments (the provider share).
    #[serde(default)]
    pub payment: String,
    /// Treasury wallet.
    #[serde(default)]
    pub treasury: String,
    /// Holder reward pool wallet.
    #[serde(default)]
    pub holder_pool: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINT: &str = "Ecqv1vJq8dDHqq7hU5bLFZC42DQSsKgnANFdaFEtBAGS";

    #[test]
    fn test_unconfigured_by_default() {
        assert!(!TokenConfig::default().is_configured());
    }

    #[test]
    fn test_placeholder_is_not_configured() {
        let config = TokenConfig::default().with_mint(MINT_PLACEHOLDER);
        assert!(!config.is_configured());
        let config = TokenConfig::default().with_mint("short");
        assert!(!config.is_configured());
    }

    #[test]
    fn test_configured_mint() {
        let config = TokenConfig::default().with_mint(MINT);
        assert_eq!(config.configured_mint(), Some(MINT));
    }

    #[test]
    fn test_total_supply_in_minor_units() {
        let config = TokenConfig::default();
        assert_eq!(
            config.total_supply_amount().minor_units(),
            1_000_000_000_000_000_000
        );
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: TokenConfig = serde_json::from_str(r#"{"mint":"abc"}"#).unwrap();
        assert_eq!(config.decimals, 9);
        assert_eq!(config.symbol, "$PYRE");
        assert_eq!(config.mint.as_deref(), Some("abc"));
    }
}
