//! In-process [`BurnStore`].

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::{DashMap, DashSet};

use super::store::{BurnRecord, BurnStore, DailyBurnStats, GlobalStats, NewBurn, Period};
use crate::error::PersistenceError;

/// Burn store kept in memory for the lifetime of the process.
///
/// Records and global counters share one mutex, so a burn's record and its
/// counter increments become visible together. Day rows and consumed
/// references live in concurrent maps.
///
/// Nothing is evicted and nothing survives a restart. Use
/// `LmdbBurnStore` (feature `lmdb`) for a long-running server.
#[derive(Debug, Default)]
pub struct MemoryBurnStore {
    journal: Mutex<Journal>,
    daily: DashMap<NaiveDate, DailyBurnStats>,
    consumed: DashSet<String>,
}

#[derive(Debug, Default)]
struct Journal {
    next_id: u64,
    /// Ordered by `created_at`, then by id.
    records: Vec<BurnRecord>,
    global: GlobalStats,
}

impl MemoryBurnStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn journal(&self) -> Result<std::sync::MutexGuard<'_, Journal>, PersistenceError> {
        self.journal
            .lock()
            .map_err(|_| PersistenceError::new("burn journal lock poisoned"))
    }
}

#[async_trait]
impl BurnStore for MemoryBurnStore {
    async fn append_burn(&self, burn: NewBurn) -> Result<BurnRecord, PersistenceError> {
        let record = {
            let mut journal = self.journal()?;
            journal.next_id += 1;
            let record = BurnRecord {
                id: journal.next_id,
                amount: burn.amount,
                tx_hash: burn.tx_hash,
                endpoint: burn.endpoint,
                created_at: burn.created_at,
            };
            let global = &mut journal.global;
            global.total_burned = global.total_burned.saturating_add(burn.amount);
            global.burned_today = global.burned_today.saturating_add(burn.amount);
            global.burned_this_week = global.burned_this_week.saturating_add(burn.amount);
            global.burned_this_month = global.burned_this_month.saturating_add(burn.amount);
            global.total_api_calls = global.total_api_calls.saturating_add(1);
            let at = journal
                .records
                .partition_point(|r| r.created_at <= record.created_at);
            journal.records.insert(at, record.clone());
            record
        };

        let date = record.created_at.date_naive();
        self.daily
            .entry(date)
            .and_modify(|day| {
                day.total_burned = day.total_burned.saturating_add(record.amount);
                day.api_calls = day.api_calls.saturating_add(1);
            })
            .or_insert_with(|| DailyBurnStats {
                date,
                total_burned: record.amount,
                api_calls: 1,
                unique_users: 1,
            });

        Ok(record)
    }

    async fn consume_reference(&self, tx_reference: &str) -> Result<bool, PersistenceError> {
        Ok(self.consumed.insert(tx_reference.to_owned()))
    }

    async fn reset_counter(&self, period: Period) -> Result<(), PersistenceError> {
        let mut journal = self.journal()?;
        let counter = match period {
            Period::Daily => &mut journal.global.burned_today,
            Period::Weekly => &mut journal.global.burned_this_week,
            Period::Monthly => &mut journal.global.burned_this_month,
        };
        *counter = crate::amount::TokenAmount::ZERO;
        Ok(())
    }

    async fn global_stats(&self) -> Result<GlobalStats, PersistenceError> {
        Ok(self.journal()?.global)
    }

    async fn burns_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<BurnRecord>, PersistenceError> {
        let journal = self.journal()?;
        Ok(journal
            .records
            .iter()
            .rev()
            .take_while(|r| r.created_at >= since)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_burns(&self, limit: usize) -> Result<Vec<BurnRecord>, PersistenceError> {
        let journal = self.journal()?;
        Ok(journal.records.iter().rev().take(limit).cloned().collect())
    }

    async fn daily_stats_since(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<DailyBurnStats>, PersistenceError> {
        let mut rows: Vec<DailyBurnStats> = self
            .daily
            .iter()
            .filter(|entry| *entry.key() >= since)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.date);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::TokenAmount;
    use chrono::TimeZone;

    fn burn(amount: u128, at: DateTime<Utc>) -> NewBurn {
        NewBurn {
            amount: TokenAmount::new(amount),
            tx_hash: None,
            endpoint: None,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_append_updates_all_counters() {
        let store = MemoryBurnStore::new();
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let first = store.append_burn(burn(6, at)).await.unwrap();
        let second = store.append_burn(burn(4, at)).await.unwrap();
        assert!(second.id > first.id);

        let global = store.global_stats().await.unwrap();
        assert_eq!(global.total_burned, TokenAmount::new(10));
        assert_eq!(global.burned_this_month, TokenAmount::new(10));
        assert_eq!(global.total_api_calls, 2);

        let rows = store.daily_stats_since(at.date_naive()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_burned, TokenAmount::new(10));
        assert_eq!(rows[0].api_calls, 2);
        assert_eq!(rows[0].unique_users, 1);
    }

    #[tokio::test]
    async fn test_reset_only_touches_one_counter() {
        let store = MemoryBurnStore::new();
        store.append_burn(burn(5, Utc::now())).await.unwrap();
        store.reset_counter(Period::Daily).await.unwrap();

        let global = store.global_stats().await.unwrap();
        assert_eq!(global.burned_today, TokenAmount::ZERO);
        assert_eq!(global.burned_this_week, TokenAmount::new(5));
        assert_eq!(global.total_burned, TokenAmount::new(5));
    }

    #[tokio::test]
    async fn test_consume_reference_once() {
        let store = MemoryBurnStore::new();
        assert!(store.consume_reference("sig").await.unwrap());
        assert!(!store.consume_reference("sig").await.unwrap());
    }

    #[tokio::test]
    async fn test_burns_since_newest_first() {
        let store = MemoryBurnStore::new();
        let old = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
        store.append_burn(burn(1, old)).await.unwrap();
        store.append_burn(burn(2, new)).await.unwrap();
        store.append_burn(burn(3, new)).await.unwrap();

        let since = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        let amounts: Vec<_> = store
            .burns_since(since, 100)
            .await
            .unwrap()
            .iter()
            .map(|r| r.amount.minor_units())
            .collect();
        assert_eq!(amounts, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_backdated_burns_sort_by_creation_time() {
        let store = MemoryBurnStore::new();
        let day = |d| Utc.with_ymd_and_hms(2025, 3, d, 0, 0, 0).unwrap();
        store.append_burn(burn(3, day(3))).await.unwrap();
        store.append_burn(burn(1, day(1))).await.unwrap();
        store.append_burn(burn(2, day(2))).await.unwrap();

        let amounts = |records: Vec<BurnRecord>| -> Vec<u128> {
            records.iter().map(|r| r.amount.minor_units()).collect()
        };
        assert_eq!(amounts(store.recent_burns(10).await.unwrap()), vec![3, 2, 1]);
        assert_eq!(amounts(store.recent_burns(2).await.unwrap()), vec![3, 2]);
        assert_eq!(
            amounts(store.burns_since(day(2), 10).await.unwrap()),
            vec![3, 2]
        );
    }
}
