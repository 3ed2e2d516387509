//! Burn accounting.
//!
//! [`BurnLedger`] records the burn share of every verified payment, tracks
//! which payment transactions were already redeemed, and derives the public
//! statistics (totals, burn rate, projections and per-day history).
//!
//! Writes go straight to a [`BurnStore`]. Reads never fail: if the store
//! cannot be read, a zero snapshot is returned instead.

#[cfg(feature = "lmdb")]
mod lmdb;
mod memory;
mod store;

#[cfg(feature = "lmdb")]
pub use lmdb::{DEFAULT_MAP_SIZE, LmdbBurnStore};
pub use memory::MemoryBurnStore;
pub use store::{
    BurnRecord, BurnStore, DailyBurnStats, GlobalStats, NewBurn, Period, UnknownPeriod,
};

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, TimeDelta, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::amount::TokenAmount;
use crate::config::TokenConfig;
use crate::error::PersistenceError;

/// Number of burns listed in [`BurnStats::recent_burns`].
pub const RECENT_BURNS_LIMIT: usize = 10;

/// Days of history averaged by [`BurnLedger::projection`].
pub const PROJECTION_WINDOW_DAYS: u64 = 7;

/// Public burn statistics. Amounts are in whole tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnStats {
    /// All-time burned.
    pub total_burned: Decimal,
    /// Burned since the last daily reset.
    pub burned_today: Decimal,
    /// Burned since the last weekly reset.
    pub burned_this_week: Decimal,
    /// Burned since the last monthly reset.
    pub burned_this_month: Decimal,
    /// Total supply minus everything burned.
    pub supply_remaining: Decimal,
    /// Share of the supply burned, with four decimals (`"0.0006"`).
    pub percent_burned: String,
    /// Tokens burned per hour over the trailing 24 hours.
    pub burn_rate: Decimal,
    /// Total supply.
    pub total_supply: u64,
    /// Latest burns, newest first.
    pub recent_burns: Vec<RecentBurn>,
}

/// A burn as shown in [`BurnStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentBurn {
    /// Burned whole tokens.
    pub amount: Decimal,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Payment transaction.
    pub tx_hash: Option<String>,
}

/// Forecast of future burns from recent activity. Amounts are in whole tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnProjection {
    /// Average burned per day.
    pub daily_burn: Decimal,
    /// `daily_burn * 7`.
    pub weekly_burn: Decimal,
    /// `daily_burn * 30`.
    pub monthly_burn: Decimal,
    /// `daily_burn * 365`.
    pub yearly_burn: Decimal,
    /// Years until half the remaining supply is burned (`"12.34"`), or `"N/A"`.
    pub years_to_half_supply: String,
}

/// One day of burn history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// UTC day, serialized as `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// Burned whole tokens.
    pub burned: Decimal,
    /// Paid calls.
    pub api_calls: u64,
}

/// Burn accounting over a [`BurnStore`].
#[derive(Clone)]
pub struct BurnLedger {
    store: Arc<dyn BurnStore>,
    decimals: u8,
    total_supply: u64,
}

impl std::fmt::Debug for BurnLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurnLedger")
            .field("decimals", &self.decimals)
            .field("total_supply", &self.total_supply)
            .finish_non_exhaustive()
    }
}

impl BurnLedger {
    /// Creates a ledger over `store` for the token described by `token`.
    #[must_use]
    pub fn new(store: Arc<dyn BurnStore>, token: &TokenConfig) -> Self {
        Self {
            store,
            decimals: token.decimals,
            total_supply: token.total_supply,
        }
    }

    /// Creates a ledger backed by a fresh [`MemoryBurnStore`].
    #[must_use]
    pub fn in_memory(token: &TokenConfig) -> Self {
        Self::new(Arc::new(MemoryBurnStore::new()), token)
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BurnStore> {
        &self.store
    }

    /// Records a burn of `amount` minor units now.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the store rejects the write.
    pub async fn record_burn(
        &self,
        amount: TokenAmount,
        tx_hash: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<BurnRecord, PersistenceError> {
        self.record_burn_at(amount, tx_hash, endpoint, Utc::now())
            .await
    }

    /// Records a burn of `amount` minor units at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the store rejects the write.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "pyre.record_burn", skip(self), fields(amount = %amount), err)
    )]
    pub async fn record_burn_at(
        &self,
        amount: TokenAmount,
        tx_hash: Option<&str>,
        endpoint: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<BurnRecord, PersistenceError> {
        self.store
            .append_burn(NewBurn {
                amount,
                tx_hash: tx_hash.map(str::to_owned),
                endpoint: endpoint.map(str::to_owned),
                created_at: at,
            })
            .await
    }

    /// Marks a payment transaction as redeemed.
    ///
    /// Returns `false` if the transaction already paid for a call.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the store cannot be updated.
    pub async fn redeem(&self, tx_reference: &str) -> Result<bool, PersistenceError> {
        self.store.consume_reference(tx_reference).await
    }

    /// Zeroes one periodic counter. Meant to be triggered by a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the store cannot be updated.
    pub async fn reset_counters(&self, period: Period) -> Result<(), PersistenceError> {
        #[cfg(feature = "telemetry")]
        tracing::info!(%period, "Resetting burn counter");
        self.store.reset_counter(period).await
    }

    /// Current burn statistics.
    pub async fn stats(&self) -> BurnStats {
        self.stats_at(Utc::now()).await
    }

    /// Burn statistics as of `now`.
    pub async fn stats_at(&self, now: DateTime<Utc>) -> BurnStats {
        match self.try_stats(now).await {
            Ok(stats) => stats,
            #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %err, "Failed to read burn stats, returning zero snapshot");
                self.zero_stats()
            }
        }
    }

    /// Projected burns from the last seven days of activity.
    pub async fn projection(&self) -> BurnProjection {
        self.projection_at(Utc::now()).await
    }

    /// Projected burns as of `now`.
    pub async fn projection_at(&self, now: DateTime<Utc>) -> BurnProjection {
        match self.try_projection(now).await {
            Ok(projection) => projection,
            #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %err, "Failed to read burn projection");
                BurnProjection {
                    daily_burn: Decimal::ZERO,
                    weekly_burn: Decimal::ZERO,
                    monthly_burn: Decimal::ZERO,
                    yearly_burn: Decimal::ZERO,
                    years_to_half_supply: "N/A".to_owned(),
                }
            }
        }
    }

    /// Per-day history of the last `days` days (today included), oldest first.
    ///
    /// Days without burns are omitted.
    pub async fn history(&self, days: u32) -> Vec<HistoryEntry> {
        self.history_at(days, Utc::now()).await
    }

    /// Per-day history of the `days` days up to `now`.
    pub async fn history_at(&self, days: u32, now: DateTime<Utc>) -> Vec<HistoryEntry> {
        if days == 0 {
            return Vec::new();
        }
        let since = window_start(now, u64::from(days));
        match self.store.daily_stats_since(since).await {
            Ok(rows) => rows
                .into_iter()
                .map(|row| HistoryEntry {
                    date: row.date,
                    burned: self.display(row.total_burned),
                    api_calls: row.api_calls,
                })
                .collect(),
            #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %err, "Failed to read burn history");
                Vec::new()
            }
        }
    }

    async fn try_stats(&self, now: DateTime<Utc>) -> Result<BurnStats, PersistenceError> {
        let global = self.store.global_stats().await?;
        let day_ago = now - TimeDelta::hours(24);
        let last_day: TokenAmount = self
            .store
            .burns_since(day_ago, usize::MAX)
            .await?
            .iter()
            .map(|r| r.amount)
            .sum();
        let recent = self.store.recent_burns(RECENT_BURNS_LIMIT).await?;

        Ok(BurnStats {
            total_burned: self.display(global.total_burned),
            burned_today: self.display(global.burned_today),
            burned_this_week: self.display(global.burned_this_week),
            burned_this_month: self.display(global.burned_this_month),
            supply_remaining: self.display(self.supply_remaining(global.total_burned)),
            percent_burned: self.percent_burned(global.total_burned),
            burn_rate: self.display(last_day.div_floor(24)),
            total_supply: self.total_supply,
            recent_burns: recent
                .into_iter()
                .map(|r| RecentBurn {
                    amount: self.display(r.amount),
                    timestamp: r.created_at.timestamp_millis(),
                    tx_hash: r.tx_hash,
                })
                .collect(),
        })
    }

    async fn try_projection(&self, now: DateTime<Utc>) -> Result<BurnProjection, PersistenceError> {
        let rows = self
            .store
            .daily_stats_since(window_start(now, PROJECTION_WINDOW_DAYS))
            .await?;
        let window_total: TokenAmount = rows.iter().map(|row| row.total_burned).sum();
        let daily = window_total.div_floor(rows.len().max(1) as u128);
        let global = self.store.global_stats().await?;

        let yearly = self.display(times(daily, 365));
        let remaining = self.display(self.supply_remaining(global.total_burned));
        let years_to_half_supply = if yearly.is_zero() {
            "N/A".to_owned()
        } else {
            remaining
                .checked_div(Decimal::TWO)
                .and_then(|half| half.checked_div(yearly))
                .map_or_else(|| "N/A".to_owned(), |years| format_fixed(years, 2))
        };

        Ok(BurnProjection {
            daily_burn: self.display(daily),
            weekly_burn: self.display(times(daily, 7)),
            monthly_burn: self.display(times(daily, 30)),
            yearly_burn: yearly,
            years_to_half_supply,
        })
    }

    fn zero_stats(&self) -> BurnStats {
        BurnStats {
            total_burned: Decimal::ZERO,
            burned_today: Decimal::ZERO,
            burned_this_week: Decimal::ZERO,
            burned_this_month: Decimal::ZERO,
            supply_remaining: Decimal::from(self.total_supply),
            percent_burned: format_fixed(Decimal::ZERO, 4),
            burn_rate: Decimal::ZERO,
            total_supply: self.total_supply,
            recent_burns: Vec::new(),
        }
    }

    fn supply_remaining(&self, burned: TokenAmount) -> TokenAmount {
        TokenAmount::from_whole_tokens(self.total_supply, self.decimals)
            .unwrap_or(TokenAmount::new(u128::MAX))
            .saturating_sub(burned)
    }

    fn percent_burned(&self, burned: TokenAmount) -> String {
        let percent = if self.total_supply == 0 {
            Decimal::ZERO
        } else {
            self.display(burned)
                .checked_div(Decimal::from(self.total_supply))
                .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
                .unwrap_or(Decimal::ZERO)
        };
        format_fixed(percent, 4)
    }

    fn display(&self, amount: TokenAmount) -> Decimal {
        amount.to_decimal(self.decimals)
    }
}

/// First UTC day of a window of `days` days ending today.
fn window_start(now: DateTime<Utc>, days: u64) -> NaiveDate {
    let today = now.date_naive();
    today
        .checked_sub_days(Days::new(days.saturating_sub(1)))
        .unwrap_or(NaiveDate::MIN)
}

fn times(amount: TokenAmount, factor: u128) -> TokenAmount {
    TokenAmount::new(amount.minor_units().saturating_mul(factor))
}

/// Renders `value` with exactly `dp` decimal places, rounding half away from zero.
fn format_fixed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.prec$}", prec = dp as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    const DECIMALS: u8 = 9;

    fn tokens(n: u64) -> TokenAmount {
        TokenAmount::from_whole_tokens(n, DECIMALS).unwrap()
    }

    fn ledger() -> BurnLedger {
        BurnLedger::in_memory(&TokenConfig::default())
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    struct BrokenStore;

    #[async_trait]
    impl BurnStore for BrokenStore {
        async fn append_burn(&self, _burn: NewBurn) -> Result<BurnRecord, PersistenceError> {
            Err(PersistenceError::new("database unreachable"))
        }
        async fn consume_reference(&self, _tx: &str) -> Result<bool, PersistenceError> {
            Err(PersistenceError::new("database unreachable"))
        }
        async fn reset_counter(&self, _period: Period) -> Result<(), PersistenceError> {
            Err(PersistenceError::new("database unreachable"))
        }
        async fn global_stats(&self) -> Result<GlobalStats, PersistenceError> {
            Err(PersistenceError::new("database unreachable"))
        }
        async fn burns_since(
            &self,
            _since: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<BurnRecord>, PersistenceError> {
            Err(PersistenceError::new("database unreachable"))
        }
        async fn recent_burns(&self, _limit: usize) -> Result<Vec<BurnRecord>, PersistenceError> {
            Err(PersistenceError::new("database unreachable"))
        }
        async fn daily_stats_since(
            &self,
            _since: NaiveDate,
        ) -> Result<Vec<DailyBurnStats>, PersistenceError> {
            Err(PersistenceError::new("database unreachable"))
        }
    }

    #[tokio::test]
    async fn test_record_burn_updates_stats() {
        let ledger = ledger();
        ledger
            .record_burn(tokens(6), Some("sig"), Some("/api/data/time"))
            .await
            .unwrap();

        let stats = ledger.stats().await;
        assert_eq!(stats.total_burned, Decimal::from(6));
        assert_eq!(stats.burned_today, Decimal::from(6));
        assert_eq!(stats.supply_remaining, Decimal::from(999_999_994u64));
        assert_eq!(stats.percent_burned, "0.0000");
        assert_eq!(stats.burn_rate, Decimal::new(25, 2));
        assert_eq!(stats.recent_burns.len(), 1);
        assert_eq!(stats.recent_burns[0].tx_hash.as_deref(), Some("sig"));
    }

    #[tokio::test]
    async fn test_concurrent_burns_sum_exactly() {
        let ledger = ledger();
        let a = ledger.clone();
        let b = ledger.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.record_burn(tokens(30), None, None).await }),
            tokio::spawn(async move { b.record_burn(tokens(70), None, None).await }),
        );
        ra.unwrap().unwrap();
        rb.unwrap().unwrap();

        let stats = ledger.stats().await;
        assert_eq!(stats.total_burned, Decimal::from(100));
        let global = ledger.store().global_stats().await.unwrap();
        assert_eq!(global.total_api_calls, 2);
    }

    #[tokio::test]
    async fn test_percent_burned_four_decimals() {
        let ledger = ledger();
        ledger.record_burn(tokens(123_456), None, None).await.unwrap();
        // 123456 / 1e9 * 100 = 0.0123456
        assert_eq!(ledger.stats().await.percent_burned, "0.0123");
    }

    #[tokio::test]
    async fn test_burn_rate_uses_trailing_day_only() {
        let ledger = ledger();
        ledger
            .record_burn_at(tokens(48), None, None, noon(1))
            .await
            .unwrap();
        ledger
            .record_burn_at(tokens(24), None, None, noon(3))
            .await
            .unwrap();
        let stats = ledger.stats_at(noon(3) + TimeDelta::hours(1)).await;
        assert_eq!(stats.burn_rate, Decimal::ONE);
        assert_eq!(stats.total_burned, Decimal::from(72));
    }

    #[tokio::test]
    async fn test_degraded_snapshot_on_store_failure() {
        let ledger = BurnLedger::new(Arc::new(BrokenStore), &TokenConfig::default());
        let stats = ledger.stats().await;
        assert_eq!(stats.total_burned, Decimal::ZERO);
        assert_eq!(stats.supply_remaining, Decimal::from(1_000_000_000u64));
        assert_eq!(stats.percent_burned, "0.0000");
        assert!(stats.recent_burns.is_empty());

        assert_eq!(ledger.projection().await.years_to_half_supply, "N/A");
        assert!(ledger.history(30).await.is_empty());
        assert!(ledger.record_burn(tokens(1), None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_history_ascending_without_padding() {
        let ledger = ledger();
        for (day, amount) in [(5, 3), (1, 1), (3, 2)] {
            ledger
                .record_burn_at(tokens(amount), None, None, noon(day))
                .await
                .unwrap();
        }
        let history = ledger.history_at(30, noon(5)).await;
        let dates: Vec<_> = history.iter().map(|h| h.date.to_string()).collect();
        assert_eq!(dates, vec!["2025-03-01", "2025-03-03", "2025-03-05"]);
        assert_eq!(history[2].burned, Decimal::from(3));

        let history = ledger.history_at(3, noon(5)).await;
        assert_eq!(history.len(), 2);
        assert!(ledger.history_at(0, noon(5)).await.is_empty());
    }

    #[tokio::test]
    async fn test_projection() {
        let ledger = ledger();
        ledger
            .record_burn_at(tokens(10), None, None, noon(4))
            .await
            .unwrap();
        ledger
            .record_burn_at(tokens(30), None, None, noon(5))
            .await
            .unwrap();
        // Outside the seven day window.
        ledger
            .record_burn_at(tokens(1000), None, None, noon(1) - TimeDelta::days(10))
            .await
            .unwrap();

        let projection = ledger.projection_at(noon(5)).await;
        assert_eq!(projection.daily_burn, Decimal::from(20));
        assert_eq!(projection.weekly_burn, Decimal::from(140));
        assert_eq!(projection.monthly_burn, Decimal::from(600));
        assert_eq!(projection.yearly_burn, Decimal::from(7300));
        // (1e9 - 1040) / 2 / 7300
        assert_eq!(projection.years_to_half_supply, "68493.08");
    }

    #[tokio::test]
    async fn test_projection_without_activity() {
        let projection = ledger().projection().await;
        assert_eq!(projection.daily_burn, Decimal::ZERO);
        assert_eq!(projection.years_to_half_supply, "N/A");
    }

    #[tokio::test]
    async fn test_redeem_once() {
        let ledger = ledger();
        assert!(ledger.redeem("sig").await.unwrap());
        assert!(!ledger.redeem("sig").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_counters() {
        let ledger = ledger();
        ledger.record_burn(tokens(5), None, None).await.unwrap();
        ledger.reset_counters(Period::Weekly).await.unwrap();
        let stats = ledger.stats().await;
        assert_eq!(stats.burned_this_week, Decimal::ZERO);
        assert_eq!(stats.burned_today, Decimal::from(5));
    }

    #[test]
    fn test_format_fixed() {
        assert_eq!(format_fixed(Decimal::ZERO, 4), "0.0000");
        assert_eq!(format_fixed(Decimal::new(12345, 5), 2), "0.12");
        assert_eq!(format_fixed(Decimal::new(125, 3), 2), "0.13");
    }
}
