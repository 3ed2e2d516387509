//! LMDB-backed [`BurnStore`].
//!
//! Four databases share one environment:
//! - `records`: `created_at_be(8) ++ id_be(8)` → JSON [`BurnRecord`].
//!   The key sorts by time, so newest-first reads are reverse range scans.
//! - `daily`: `YYYY-MM-DD` → JSON [`DailyBurnStats`].
//! - `consumed`: transaction reference → empty.
//! - `meta`: `global` → JSON [`GlobalStats`], `next_id` → `u64` big-endian.
//!
//! Each write runs in a single write transaction. LMDB admits one writer at a
//! time, so a burn's record and all of its counter increments commit together.

use std::ops::Bound;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::store::{BurnRecord, BurnStore, DailyBurnStats, GlobalStats, NewBurn, Period};
use crate::amount::TokenAmount;
use crate::error::PersistenceError;

/// Default LMDB map size: 256 MiB.
pub const DEFAULT_MAP_SIZE: usize = 256 * 1024 * 1024;

const GLOBAL_KEY: &[u8] = b"global";
const NEXT_ID_KEY: &[u8] = b"next_id";

impl From<heed::Error> for PersistenceError {
    fn from(err: heed::Error) -> Self {
        Self::new(format_args!("lmdb: {err}"))
    }
}

/// Burn store persisted in an LMDB environment on disk.
///
/// Survives restarts: records, counters, day rows and consumed references are
/// all read back from the environment. Cloning shares the environment.
#[derive(Clone)]
pub struct LmdbBurnStore {
    env: Env,
    records: Database<Bytes, Bytes>,
    daily: Database<Bytes, Bytes>,
    consumed: Database<Bytes, Bytes>,
    meta: Database<Bytes, Bytes>,
}

impl std::fmt::Debug for LmdbBurnStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbBurnStore")
            .field("path", &self.env.path())
            .finish_non_exhaustive()
    }
}

impl LmdbBurnStore {
    /// Opens or creates the store in directory `path` with [`DEFAULT_MAP_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the directory cannot be created or the
    /// environment cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    /// Opens or creates the store with an explicit map size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the directory cannot be created or the
    /// environment cannot be opened.
    pub fn open_with_map_size(
        path: impl AsRef<Path>,
        map_size: usize,
    ) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(PersistenceError::new)?;

        // SAFETY: the environment is opened once per path by this process and
        // the data file is not modified by anything but LMDB.
        #[allow(unsafe_code)]
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(4)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let records = env.create_database(&mut wtxn, Some("records"))?;
        let daily = env.create_database(&mut wtxn, Some("daily"))?;
        let consumed = env.create_database(&mut wtxn, Some("consumed"))?;
        let meta = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        #[cfg(feature = "telemetry")]
        tracing::info!(path = %path.display(), "Opened LMDB burn store");

        Ok(Self {
            env,
            records,
            daily,
            consumed,
            meta,
        })
    }

    /// Runs `op` on the blocking pool so LMDB I/O never stalls the runtime.
    async fn blocking<T, F>(&self, op: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, PersistenceError> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || op(&this))
            .await
            .map_err(PersistenceError::new)?
    }

    fn global(&self, rtxn: &RoTxn<'_>) -> Result<GlobalStats, PersistenceError> {
        self.meta
            .get(rtxn, GLOBAL_KEY)?
            .map_or_else(|| Ok(GlobalStats::default()), decode)
    }

    fn put_global(&self, wtxn: &mut RwTxn<'_>, global: &GlobalStats) -> Result<(), PersistenceError> {
        self.meta.put(wtxn, GLOBAL_KEY, &encode(global)?)?;
        Ok(())
    }

    fn next_id(&self, wtxn: &mut RwTxn<'_>) -> Result<u64, PersistenceError> {
        let current = match self.meta.get(&*wtxn, NEXT_ID_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| PersistenceError::new("next_id has unexpected byte length"))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current.saturating_add(1);
        self.meta.put(wtxn, NEXT_ID_KEY, &next.to_be_bytes())?;
        Ok(next)
    }

    fn append_sync(&self, burn: NewBurn) -> Result<BurnRecord, PersistenceError> {
        let mut wtxn = self.env.write_txn()?;

        let record = BurnRecord {
            id: self.next_id(&mut wtxn)?,
            amount: burn.amount,
            tx_hash: burn.tx_hash,
            endpoint: burn.endpoint,
            created_at: burn.created_at,
        };
        self.records
            .put(&mut wtxn, &record_key(record.created_at, record.id)[..], &encode(&record)?)?;

        let mut global = self.global(&wtxn)?;
        global.total_burned = global.total_burned.saturating_add(record.amount);
        global.burned_today = global.burned_today.saturating_add(record.amount);
        global.burned_this_week = global.burned_this_week.saturating_add(record.amount);
        global.burned_this_month = global.burned_this_month.saturating_add(record.amount);
        global.total_api_calls = global.total_api_calls.saturating_add(1);
        self.put_global(&mut wtxn, &global)?;

        let date = record.created_at.date_naive();
        let key = day_key(date);
        let day = match self.daily.get(&wtxn, key.as_bytes())? {
            Some(bytes) => {
                let mut day: DailyBurnStats = decode(bytes)?;
                day.total_burned = day.total_burned.saturating_add(record.amount);
                day.api_calls = day.api_calls.saturating_add(1);
                day
            }
            None => DailyBurnStats {
                date,
                total_burned: record.amount,
                api_calls: 1,
                unique_users: 1,
            },
        };
        self.daily.put(&mut wtxn, key.as_bytes(), &encode(&day)?)?;

        wtxn.commit()?;
        Ok(record)
    }

    fn consume_sync(&self, tx_reference: &str) -> Result<bool, PersistenceError> {
        let mut wtxn = self.env.write_txn()?;
        if self.consumed.get(&wtxn, tx_reference.as_bytes())?.is_some() {
            return Ok(false);
        }
        self.consumed.put(&mut wtxn, tx_reference.as_bytes(), &[])?;
        wtxn.commit()?;
        Ok(true)
    }

    fn reset_sync(&self, period: Period) -> Result<(), PersistenceError> {
        let mut wtxn = self.env.write_txn()?;
        let mut global = self.global(&wtxn)?;
        let counter = match period {
            Period::Daily => &mut global.burned_today,
            Period::Weekly => &mut global.burned_this_week,
            Period::Monthly => &mut global.burned_this_month,
        };
        *counter = TokenAmount::ZERO;
        self.put_global(&mut wtxn, &global)?;
        wtxn.commit()?;
        Ok(())
    }

    fn newest_first(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<BurnRecord>, PersistenceError> {
        let rtxn = self.env.read_txn()?;
        let lower = since.map(|at| record_key(at, 0));
        let bounds = (
            lower
                .as_ref()
                .map_or(Bound::Unbounded, |key| Bound::Included(key.as_slice())),
            Bound::Unbounded,
        );
        let mut records = Vec::new();
        for entry in self.records.rev_range(&rtxn, &bounds)?.take(limit) {
            let (_, bytes) = entry?;
            records.push(decode(bytes)?);
        }
        Ok(records)
    }

    fn daily_sync(&self, since: NaiveDate) -> Result<Vec<DailyBurnStats>, PersistenceError> {
        let rtxn = self.env.read_txn()?;
        let lower = day_key(since);
        let bounds = (Bound::Included(lower.as_bytes()), Bound::<&[u8]>::Unbounded);
        let mut rows = Vec::new();
        for entry in self.daily.range(&rtxn, &bounds)? {
            let (_, bytes) = entry?;
            rows.push(decode(bytes)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl BurnStore for LmdbBurnStore {
    async fn append_burn(&self, burn: NewBurn) -> Result<BurnRecord, PersistenceError> {
        self.blocking(move |store| store.append_sync(burn)).await
    }

    async fn consume_reference(&self, tx_reference: &str) -> Result<bool, PersistenceError> {
        let tx_reference = tx_reference.to_owned();
        self.blocking(move |store| store.consume_sync(&tx_reference))
            .await
    }

    async fn reset_counter(&self, period: Period) -> Result<(), PersistenceError> {
        self.blocking(move |store| store.reset_sync(period)).await
    }

    async fn global_stats(&self) -> Result<GlobalStats, PersistenceError> {
        self.blocking(|store| {
            let rtxn = store.env.read_txn()?;
            store.global(&rtxn)
        })
        .await
    }

    async fn burns_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<BurnRecord>, PersistenceError> {
        self.blocking(move |store| store.newest_first(Some(since), limit))
            .await
    }

    async fn recent_burns(&self, limit: usize) -> Result<Vec<BurnRecord>, PersistenceError> {
        self.blocking(move |store| store.newest_first(None, limit))
            .await
    }

    async fn daily_stats_since(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<DailyBurnStats>, PersistenceError> {
        self.blocking(move |store| store.daily_sync(since)).await
    }
}

/// `created_at` in milliseconds, sign bit flipped so the big-endian bytes
/// sort chronologically, followed by the record id.
#[allow(clippy::cast_sign_loss)]
fn record_key(created_at: DateTime<Utc>, id: u64) -> [u8; 16] {
    let millis = (created_at.timestamp_millis() as u64) ^ (1 << 63);
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&millis.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(value).map_err(PersistenceError::new)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistenceError> {
    serde_json::from_slice(bytes).map_err(PersistenceError::new)
}
