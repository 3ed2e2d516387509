//! Splitting verified payments into burn, provider, holder and treasury shares.

use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;
use crate::error::ConfigError;

/// Percentage split applied to every verified payment.
///
/// The four shares must add up to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Share permanently burned.
    pub burn: u8,
    /// Share paid to the API provider.
    pub provider: u8,
    /// Share sent to the holder reward pool.
    pub holders: u8,
    /// Share kept by the platform treasury.
    pub treasury: u8,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            burn: 30,
            provider: 50,
            holders: 15,
            treasury: 5,
        }
    }
}

/// Per-bucket amounts of one payment, in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// Amount burned.
    pub burn: TokenAmount,
    /// Amount paid to the provider.
    pub provider: TokenAmount,
    /// Amount sent to the holder pool.
    pub holders: TokenAmount,
    /// Amount kept by the treasury, including the truncation remainder.
    pub treasury: TokenAmount,
}

impl Distribution {
    /// Sum of all buckets.
    #[must_use]
    pub fn total(&self) -> TokenAmount {
        [self.burn, self.provider, self.holders, self.treasury]
            .into_iter()
            .sum()
    }
}

/// Display form of the split (`"30%"`), as sent in 402 responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPercentages {
    /// Burn share.
    pub burn: String,
    /// Provider share.
    pub provider: String,
    /// Holder pool share.
    pub holders: String,
    /// Treasury share.
    pub treasury: String,
}

impl DistributionConfig {
    /// Checks that the four shares add up to 100.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDistribution`] otherwise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = u16::from(self.burn)
            + u16::from(self.provider)
            + u16::from(self.holders)
            + u16::from(self.treasury);
        if sum == 100 {
            Ok(())
        } else {
            Err(ConfigError::InvalidDistribution(sum))
        }
    }

    /// Splits `total` into the four buckets.
    ///
    /// Each bucket is `total * share / 100` truncated. Whatever truncation
    /// leaves over is credited to the treasury, so the buckets always add up to
    /// `total` and the burn is never rounded up.
    #[must_use]
    pub fn distribute(&self, total: TokenAmount) -> Distribution {
        if total.is_zero() {
            return Distribution::default();
        }
        let burn = total.percent(self.burn);
        let provider = total.percent(self.provider);
        let holders = total.percent(self.holders);
        let treasury = total.percent(self.treasury);
        let allotted = burn
            .saturating_add(provider)
            .saturating_add(holders)
            .saturating_add(treasury);
        Distribution {
            burn,
            provider,
            holders,
            treasury: treasury.saturating_add(total.saturating_sub(allotted)),
        }
    }

    /// Burn share of `total`, truncated.
    #[must_use]
    pub const fn burn_amount(&self, total: TokenAmount) -> TokenAmount {
        total.percent(self.burn)
    }

    /// Renders the split as percentage strings.
    #[must_use]
    pub fn percentages(&self) -> DistributionPercentages {
        DistributionPercentages {
            burn: format!("{}%", self.burn),
            provider: format!("{}%", self.provider),
            holders: format!("{}%", self.holders),
            treasury: format!("{}%", self.treasury),
        }
    }
}
