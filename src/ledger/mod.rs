//! Alert ledger
//!
//! Append-only store of processed items, partitioned by local calendar day.
//! Partitions are the unit of persistence and retention: the ledger tracks
//! which ones changed since the last flush, and whole partitions are dropped
//! when they age out.

mod summary;

pub use summary::{week_ending, LedgerSummary};

use crate::error::{Result, VigiaError};
use crate::filtering::{CandidateItem, Classification, Fingerprint, SuppressionResult, Tier};
use ahash::{HashMap, HashMapExt};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Format of partition keys
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One processed candidate item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub item: CandidateItem,
    pub classification: Classification,
    pub fingerprint: Fingerprint,
    pub suppressed: bool,
    pub suppress_reason: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn tier(&self) -> Tier {
        self.classification.tier
    }

    /// Unsuppressed and at least HIGH: what a notifier should forward
    pub fn is_alert_worthy(&self) -> bool {
        !self.suppressed && self.tier().is_alert_worthy()
    }
}

/// Parse a `YYYY-MM-DD` partition key
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| VigiaError::invalid_argument(format!("invalid date '{}': {}", s, e)))
}

/// Day-partitioned alert records
pub struct AlertLedger {
    offset: FixedOffset,
    top_sources: usize,
    top_terms: usize,
    partitions: BTreeMap<NaiveDate, Vec<AlertRecord>>,
    by_id: HashMap<String, (NaiveDate, usize)>,
    /// Most recent record per fingerprint
    by_fingerprint: HashMap<String, (NaiveDate, usize)>,
    dirty: BTreeSet<NaiveDate>,
}

impl AlertLedger {
    /// Create a ledger whose days start at local midnight for the given offset
    pub fn new(utc_offset_minutes: i32, top_sources: usize, top_terms: usize) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            VigiaError::invalid_argument(format!(
                "UTC offset of {} minutes is out of range",
                utc_offset_minutes
            ))
        })?;

        Ok(Self {
            offset,
            top_sources,
            top_terms,
            partitions: BTreeMap::new(),
            by_id: HashMap::new(),
            by_fingerprint: HashMap::new(),
            dirty: BTreeSet::new(),
        })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Partition a timestamp belongs to
    pub fn partition_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset).date_naive()
    }

    /// Append a record stamped with the current time
    pub fn record(
        &mut self,
        item: CandidateItem,
        classification: Classification,
        suppression: &SuppressionResult,
    ) -> AlertRecord {
        self.record_at(item, classification, suppression, Utc::now())
    }

    /// Append a record to the partition of `processed_at`
    pub fn record_at(
        &mut self,
        item: CandidateItem,
        classification: Classification,
        suppression: &SuppressionResult,
        processed_at: DateTime<Utc>,
    ) -> AlertRecord {
        let date = self.partition_date(processed_at);
        let record = AlertRecord {
            id: self.unique_id(processed_at),
            item,
            classification,
            fingerprint: suppression.fingerprint.clone(),
            suppressed: suppression.suppressed,
            suppress_reason: suppression.reason.clone(),
            processed_at,
        };

        let partition = self.partitions.entry(date).or_default();
        let position = (date, partition.len());
        partition.push(record.clone());

        self.by_id.insert(record.id.clone(), position);
        self.by_fingerprint
            .insert(record.fingerprint.as_str().to_string(), position);
        self.dirty.insert(date);

        record
    }

    /// `<unix millis>-<8 hex>`, retried on the rare in-ledger collision
    fn unique_id(&self, ts: DateTime<Utc>) -> String {
        loop {
            let suffix = Uuid::new_v4().simple().to_string();
            let id = format!("{}-{}", ts.timestamp_millis(), &suffix[..8]);
            if !self.by_id.contains_key(&id) {
                return id;
            }
        }
    }

    /// Summary of one day's partition; an absent partition yields zero counts
    pub fn summary(&self, date: NaiveDate) -> LedgerSummary {
        let records = self.partitions.get(&date).map(Vec::as_slice).unwrap_or(&[]);
        LedgerSummary::from_records(date, records, self.top_sources, self.top_terms)
    }

    /// Summaries for several days, one per date, in the order given
    pub fn summary_range<I>(&self, dates: I) -> Vec<LedgerSummary>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        dates.into_iter().map(|d| self.summary(d)).collect()
    }

    /// Look a record up by id, falling back to the latest record with that fingerprint
    pub fn lookup(&self, key: &str) -> Result<&AlertRecord> {
        let key = key.trim();
        self.by_id
            .get(key)
            .or_else(|| self.by_fingerprint.get(key))
            .and_then(|(date, idx)| self.partitions.get(date).and_then(|p| p.get(*idx)))
            .ok_or_else(|| {
                VigiaError::not_found(format!("no alert with id or fingerprint '{}'", key))
            })
    }

    /// Records of one tier on one day
    ///
    /// # Errors
    /// `InvalidArgument` when the tier name is not recognized
    pub fn records_with_tier(&self, date: NaiveDate, tier_name: &str) -> Result<Vec<&AlertRecord>> {
        let tier: Tier = tier_name.parse()?;
        Ok(self
            .partition(date)
            .unwrap_or(&[])
            .iter()
            .filter(|r| r.tier() == tier)
            .collect())
    }

    /// Records processed in `[start, end)`
    pub fn count_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        let first = self.partition_date(start);
        let last = self.partition_date(end);
        self.partitions
            .range(first..=last)
            .flat_map(|(_, records)| records.iter())
            .filter(|r| r.processed_at >= start && r.processed_at < end)
            .count()
    }

    pub fn partition(&self, date: NaiveDate) -> Option<&[AlertRecord]> {
        self.partitions.get(&date).map(Vec::as_slice)
    }

    /// Replace a partition with records restored from persistence
    pub fn load_partition(&mut self, date: NaiveDate, records: Vec<AlertRecord>) {
        self.partitions.insert(date, records);
        self.dirty.remove(&date);
        self.reindex();
    }

    /// Drop every partition before `cutoff`; returns the dropped dates
    pub fn retain_from(&mut self, cutoff: NaiveDate) -> Vec<NaiveDate> {
        let kept = self.partitions.split_off(&cutoff);
        let dropped: Vec<NaiveDate> = std::mem::replace(&mut self.partitions, kept)
            .into_keys()
            .collect();

        if !dropped.is_empty() {
            self.dirty.retain(|d| *d >= cutoff);
            self.reindex();
        }
        dropped
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        self.by_fingerprint.clear();
        for (date, records) in &self.partitions {
            for (idx, record) in records.iter().enumerate() {
                self.by_id.insert(record.id.clone(), (*date, idx));
                self.by_fingerprint
                    .insert(record.fingerprint.as_str().to_string(), (*date, idx));
            }
        }
    }

    /// Partitions changed since they were last marked clean
    pub fn dirty_dates(&self) -> Vec<NaiveDate> {
        self.dirty.iter().copied().collect()
    }

    pub fn mark_clean(&mut self, date: NaiveDate) {
        self.dirty.remove(&date);
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.partitions.keys().copied().collect()
    }

    /// Total records across all partitions
    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.values().all(Vec::is_empty)
    }
}
