//! Persistence boundary for ledger partitions and metrics snapshots
//!
//! The engine never talks to a database directly; it hands dirty partitions
//! and snapshots to an `AlertStore` and keeps them dirty when a call fails.

pub mod database;

use crate::error::{Result, VigiaError};
use crate::ledger::AlertRecord;
use crate::metrics::MetricsState;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub use database::{DbPool, SqliteStore, StoreStats};

/// Durable home for alert partitions and the metrics snapshot
pub trait AlertStore: Send + Sync {
    /// Replace the stored contents of one day's partition
    fn save_partition(&self, date: NaiveDate, records: &[AlertRecord]) -> Result<()>;

    /// Records of one partition in insertion order; empty when none were saved
    fn load_partition(&self, date: NaiveDate) -> Result<Vec<AlertRecord>>;

    /// Dates with at least one stored record, oldest first
    fn partition_dates(&self) -> Result<Vec<NaiveDate>>;

    /// Delete every partition older than `date`, returning the records removed
    fn purge_before(&self, date: NaiveDate) -> Result<usize>;

    fn save_metrics(&self, state: &MetricsState) -> Result<()>;

    fn load_metrics(&self) -> Result<Option<MetricsState>>;
}

/// In-process store, serializing through JSON like the SQLite one.
///
/// `set_available(false)` makes every call fail, which is how tests
/// exercise the engine's behaviour when persistence is down.
#[derive(Default)]
pub struct MemoryStore {
    partitions: Mutex<BTreeMap<NaiveDate, String>>,
    metrics: Mutex<Option<String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VigiaError::Storage("store unavailable".to_string()));
        }
        Ok(())
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> Result<std::sync::MutexGuard<'a, T>> {
        mutex
            .lock()
            .map_err(|_| VigiaError::Storage("store lock poisoned".to_string()))
    }
}

impl AlertStore for MemoryStore {
    fn save_partition(&self, date: NaiveDate, records: &[AlertRecord]) -> Result<()> {
        self.ensure_available()?;
        let json = serde_json::to_string(records).map_err(|e| VigiaError::Json {
            source: e,
            context: format!("Failed to serialize partition {}", date),
        })?;
        Self::lock(&self.partitions)?.insert(date, json);
        Ok(())
    }

    fn load_partition(&self, date: NaiveDate) -> Result<Vec<AlertRecord>> {
        self.ensure_available()?;
        let partitions = Self::lock(&self.partitions)?;
        match partitions.get(&date) {
            Some(json) => serde_json::from_str(json).map_err(|e| VigiaError::Json {
                source: e,
                context: format!("Failed to deserialize partition {}", date),
            }),
            None => Ok(Vec::new()),
        }
    }

    fn partition_dates(&self) -> Result<Vec<NaiveDate>> {
        self.ensure_available()?;
        Ok(Self::lock(&self.partitions)?.keys().copied().collect())
    }

    fn purge_before(&self, date: NaiveDate) -> Result<usize> {
        self.ensure_available()?;
        let mut partitions = Self::lock(&self.partitions)?;
        let mut removed = 0;
        for json in partitions.range(..date).map(|(_, json)| json) {
            let records: Vec<AlertRecord> = serde_json::from_str(json).map_err(|e| VigiaError::Json {
                source: e,
                context: "Failed to count purged records".to_string(),
            })?;
            removed += records.len();
        }
        *partitions = partitions.split_off(&date);
        Ok(removed)
    }

    fn save_metrics(&self, state: &MetricsState) -> Result<()> {
        self.ensure_available()?;
        let json = serde_json::to_string(state).map_err(|e| VigiaError::Json {
            source: e,
            context: "Failed to serialize metrics snapshot".to_string(),
        })?;
        *Self::lock(&self.metrics)? = Some(json);
        Ok(())
    }

    fn load_metrics(&self) -> Result<Option<MetricsState>> {
        self.ensure_available()?;
        let metrics = Self::lock(&self.metrics)?;
        metrics
            .as_deref()
            .map(|json| {
                serde_json::from_str(json).map_err(|e| VigiaError::Json {
                    source: e,
                    context: "Failed to deserialize metrics snapshot".to_string(),
                })
            })
            .transpose()
    }
}
