//! Persistence seam of the burn ledger.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;
use crate::error::PersistenceError;

/// One recorded burn. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRecord {
    /// Store-assigned identifier, increasing in insertion order.
    pub id: u64,
    /// Burned minor units.
    pub amount: TokenAmount,
    /// Payment transaction the burn came from.
    pub tx_hash: Option<String>,
    /// Endpoint that was paid for.
    pub endpoint: Option<String>,
    /// When the burn was recorded.
    pub created_at: DateTime<Utc>,
}

/// A burn to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBurn {
    /// Burned minor units.
    pub amount: TokenAmount,
    /// Payment transaction the burn came from.
    pub tx_hash: Option<String>,
    /// Endpoint that was paid for.
    pub endpoint: Option<String>,
    /// When the burn happened.
    pub created_at: DateTime<Utc>,
}

/// Running totals across all burns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    /// All-time burned minor units.
    pub total_burned: TokenAmount,
    /// Burned since the last daily reset.
    pub burned_today: TokenAmount,
    /// Burned since the last weekly reset.
    pub burned_this_week: TokenAmount,
    /// Burned since the last monthly reset.
    pub burned_this_month: TokenAmount,
    /// Number of paid calls.
    pub total_api_calls: u64,
}

/// Per-UTC-day burn totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBurnStats {
    /// The UTC day.
    pub date: NaiveDate,
    /// Burned minor units that day.
    pub total_burned: TokenAmount,
    /// Paid calls that day.
    pub api_calls: u64,
    /// Set to 1 when the row is created and not tracked afterwards.
    pub unique_users: u64,
}

/// Periodic counter of [`GlobalStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// `burned_today`.
    Daily,
    /// `burned_this_week`.
    Weekly,
    /// `burned_this_month`.
    Monthly,
}

impl Period {
    /// Lowercase name of the period.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The string is not `daily`, `weekly` or `monthly`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown period: {0}")]
pub struct UnknownPeriod(pub String);

impl FromStr for Period {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(UnknownPeriod(other.to_owned())),
        }
    }
}

/// Durable storage behind [`BurnLedger`](super::BurnLedger).
///
/// Implementations must apply each write atomically with respect to concurrent
/// writers: two concurrent burns of 30 and 70 must leave totals of exactly 100.
#[async_trait]
pub trait BurnStore: Send + Sync {
    /// Appends a burn record, increments the global counters and the
    /// counters of the burn's UTC day (creating the row if needed).
    async fn append_burn(&self, burn: NewBurn) -> Result<BurnRecord, PersistenceError>;

    /// Marks a transaction reference as consumed.
    ///
    /// Returns `false` if it was already consumed.
    async fn consume_reference(&self, tx_reference: &str) -> Result<bool, PersistenceError>;

    /// Zeroes one periodic counter of the global stats.
    async fn reset_counter(&self, period: Period) -> Result<(), PersistenceError>;

    /// Returns the global counters, all zero if nothing was burned yet.
    async fn global_stats(&self) -> Result<GlobalStats, PersistenceError>;

    /// Returns up to `limit` records created at or after `since`, newest first.
    async fn burns_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<BurnRecord>, PersistenceError>;

    /// Returns the `limit` most recent records, newest first.
    async fn recent_burns(&self, limit: usize) -> Result<Vec<BurnRecord>, PersistenceError>;

    /// Returns the day rows dated on or after `since`, oldest first.
    async fn daily_stats_since(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<DailyBurnStats>, PersistenceError>;
}
