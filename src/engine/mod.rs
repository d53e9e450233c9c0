//! Monitoring engine
//!
//! Owns every piece of mutable state (suppression window, ledger, metrics)
//! and runs each item through classify → suppress → record → ingest as one
//! step. Persistence happens separately through `flush`.

pub mod commands;
mod pipeline;

pub use commands::{dispatch, execute, COMMANDS, FAILURE_PREFIX};
pub use pipeline::Pipeline;

use crate::config::Config;
use crate::error::Result;
use crate::filtering::{CandidateItem, Classifier, DuplicateSuppressor};
use crate::ledger::{week_ending, AlertLedger, AlertRecord, LedgerSummary};
use crate::metrics::{AnomalyReport, DailyTotals, MetricsAggregator, MetricsState};
use crate::patterns::PatternRegistry;
use crate::report;
use crate::storage::AlertStore;
use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Whether a processed record has reached the store yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Processed in memory, waiting for the next flush
    Pending,
    Saved,
}

/// Result of processing one item
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub record: AlertRecord,
    /// Unsuppressed and at least HIGH
    pub alert_worthy: bool,
    pub durability: Durability,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub partitions_saved: usize,
    pub metrics_saved: bool,
    /// One entry per failed save; the affected state stays dirty
    pub failures: Vec<String>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub metrics_restored: bool,
    pub partitions_restored: usize,
    pub records_restored: usize,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Oldest date kept
    pub cutoff: NaiveDate,
    pub dropped_partitions: Vec<NaiveDate>,
    pub purged_records: usize,
    pub failure: Option<String>,
}

pub struct MonitorEngine {
    config: Config,
    patterns: Arc<PatternRegistry>,
    classifier: Classifier,
    suppressor: DuplicateSuppressor,
    ledger: AlertLedger,
    metrics: MetricsAggregator,
}

impl MonitorEngine {
    /// Fresh engine with empty state
    pub fn new(config: Config) -> Result<Self> {
        let metrics = MetricsAggregator::new(config.metrics.clone(), Utc::now());
        Self::build(config, metrics)
    }

    /// Engine resuming from a persisted metrics snapshot
    pub fn with_state(config: Config, state: MetricsState) -> Result<Self> {
        let metrics = MetricsAggregator::from_state(config.metrics.clone(), state);
        Self::build(config, metrics)
    }

    fn build(config: Config, metrics: MetricsAggregator) -> Result<Self> {
        let patterns = Arc::new(PatternRegistry::from_config(&config.classifier)?);
        let classifier = Classifier::new(Arc::clone(&patterns));
        let suppressor =
            DuplicateSuppressor::new(config.cooldown(), config.suppression.max_entries);
        let ledger = AlertLedger::new(
            config.ledger.utc_offset_minutes,
            config.report.top_sources,
            config.report.top_terms,
        )?;
        let metrics = metrics.with_offset(ledger.offset());

        Ok(Self {
            config,
            patterns,
            classifier,
            suppressor,
            ledger,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &AlertLedger {
        &self.ledger
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn suppressor(&self) -> &DuplicateSuppressor {
        &self.suppressor
    }

    /// Local calendar day of a timestamp, as used for partitions
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.ledger.partition_date(now)
    }

    pub fn process(
        &mut self,
        item: CandidateItem,
        latency_ms: Option<f64>,
    ) -> Result<ProcessOutcome> {
        self.process_at(item, latency_ms, Utc::now())
    }

    /// Process one item with an explicit processing time.
    ///
    /// Validation and classification happen before any state changes, so an
    /// `InvalidInput` leaves the engine untouched.
    pub fn process_at(
        &mut self,
        item: CandidateItem,
        latency_ms: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome> {
        let classification =
            self.classifier
                .classify_at(&item, &self.patterns.important_sources, now)?;
        let suppression = self.suppressor.check_and_record(&item, classification.tier);
        let record = self.ledger.record_at(item, classification, &suppression, now);
        self.metrics
            .ingest(&record.item, &record.classification, latency_ms);

        let alert_worthy = record.is_alert_worthy();
        tracing::debug!(
            "Processed {} from {}: tier={} suppressed={} ({})",
            record.id,
            record.item.source_handle,
            record.tier(),
            record.suppressed,
            record.classification.reason
        );

        Ok(ProcessOutcome {
            record,
            alert_worthy,
            durability: Durability::Pending,
        })
    }

    /// True when a flush has something to write
    pub fn has_pending(&self) -> bool {
        self.metrics.is_dirty() || !self.ledger.dirty_dates().is_empty()
    }

    /// Write dirty partitions and the metrics snapshot.
    ///
    /// Failures are logged and reported; whatever failed stays dirty for the
    /// next attempt.
    pub fn flush(&mut self, store: &dyn AlertStore) -> FlushReport {
        let mut report = FlushReport::default();

        for date in self.ledger.dirty_dates() {
            let result = match self.ledger.partition(date) {
                Some(records) => store.save_partition(date, records),
                None => Ok(()),
            };
            match result {
                Ok(()) => {
                    self.ledger.mark_clean(date);
                    report.partitions_saved += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to save partition {}: {}", date, e);
                    report.failures.push(format!("partition {}: {}", date, e));
                }
            }
        }

        if self.metrics.is_dirty() {
            let now = Utc::now();
            let mut snapshot = self.metrics.state().clone();
            snapshot.last_saved_at = Some(now);
            match store.save_metrics(&snapshot) {
                Ok(()) => {
                    self.metrics.mark_saved(now);
                    report.metrics_saved = true;
                }
                Err(e) => {
                    tracing::error!("Failed to save metrics snapshot: {}", e);
                    report.failures.push(format!("metrics: {}", e));
                }
            }
        }

        if report.partitions_saved > 0 || report.metrics_saved {
            tracing::debug!(
                "Flushed {} partitions, metrics saved: {}",
                report.partitions_saved,
                report.metrics_saved
            );
        }
        report
    }

    /// Load the metrics snapshot and the given partitions from a store.
    ///
    /// Anything that fails to load is logged and skipped. Restored alerts
    /// that were forwarded when processed are replayed into the suppression
    /// window so duplicates stay suppressed across restarts.
    pub fn restore(&mut self, store: &dyn AlertStore, dates: &[NaiveDate]) -> RestoreReport {
        let mut report = RestoreReport::default();

        match store.load_metrics() {
            Ok(Some(state)) => {
                self.metrics = MetricsAggregator::from_state(self.config.metrics.clone(), state)
                    .with_offset(self.ledger.offset());
                report.metrics_restored = true;
            }
            Ok(None) => tracing::info!("No metrics snapshot found, starting fresh"),
            Err(e) => {
                tracing::error!("Failed to load metrics snapshot, starting fresh: {}", e);
                report.failures.push(format!("metrics: {}", e));
            }
        }

        for &date in dates {
            match store.load_partition(date) {
                Ok(records) if records.is_empty() => {}
                Ok(records) => {
                    for record in records.iter().filter(|r| r.is_alert_worthy()) {
                        self.suppressor.check_and_record(&record.item, record.tier());
                    }
                    report.partitions_restored += 1;
                    report.records_restored += records.len();
                    self.ledger.load_partition(date, records);
                }
                Err(e) => {
                    tracing::error!("Failed to load partition {}: {}", date, e);
                    report.failures.push(format!("partition {}: {}", date, e));
                }
            }
        }

        tracing::info!(
            "Restored {} records from {} partitions",
            report.records_restored,
            report.partitions_restored
        );
        report
    }

    /// Restore every stored partition still inside the retention window
    pub fn restore_recent(&mut self, store: &dyn AlertStore, now: DateTime<Utc>) -> RestoreReport {
        let cutoff = self.retention_cutoff(self.today(now));
        match store.partition_dates() {
            Ok(dates) => {
                let recent: Vec<NaiveDate> = dates.into_iter().filter(|d| *d >= cutoff).collect();
                self.restore(store, &recent)
            }
            Err(e) => {
                tracing::error!("Failed to list stored partitions: {}", e);
                let mut report = self.restore(store, &[]);
                report.failures.push(format!("partition list: {}", e));
                report
            }
        }
    }

    /// Close out a day: push its totals into the metrics windows
    pub fn roll_daily(&mut self, date: NaiveDate) -> DailyTotals {
        let summary = self.ledger.summary(date);
        let totals = DailyTotals {
            date,
            total_items: summary.total as u64,
            total_sources: summary.distinct_sources as u64,
        };
        self.metrics.roll_daily(totals.clone());
        totals
    }

    /// Evict expired suppression entries
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> usize {
        let evicted = self.suppressor.cleanup(now);
        if evicted > 0 {
            tracing::debug!("Evicted {} expired fingerprints", evicted);
        }
        evicted
    }

    fn retention_cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.config.storage.retention_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Drop partitions older than the retention window, in memory and in the store
    pub fn apply_retention(&mut self, today: NaiveDate, store: &dyn AlertStore) -> RetentionReport {
        let cutoff = self.retention_cutoff(today);
        let dropped_partitions = self.ledger.retain_from(cutoff);

        let (purged_records, failure) = match store.purge_before(cutoff) {
            Ok(count) => (count, None),
            Err(e) => {
                tracing::error!("Failed to purge stored alerts before {}: {}", cutoff, e);
                (0, Some(e.to_string()))
            }
        };

        if !dropped_partitions.is_empty() {
            tracing::info!(
                "Retention dropped {} partitions before {}",
                dropped_partitions.len(),
                cutoff
            );
        }

        RetentionReport {
            cutoff,
            dropped_partitions,
            purged_records,
            failure,
        }
    }

    pub fn daily_summary(&self, date: NaiveDate) -> LedgerSummary {
        self.ledger.summary(date)
    }

    pub fn daily_digest(&self, date: NaiveDate, now: DateTime<Utc>) -> String {
        let metrics = self.metrics_summary(now);
        report::render_daily_digest(&self.ledger.summary(date), &metrics)
    }

    pub fn trend_digest(&self, now: DateTime<Utc>) -> String {
        report::render_trend_digest(&self.metrics_summary(now))
    }

    /// Digest for the seven days ending at `end`
    pub fn weekly_digest(&self, end: NaiveDate) -> String {
        report::render_weekly_digest(&self.ledger.summary_range(week_ending(end)))
    }

    fn metrics_summary(&self, now: DateTime<Utc>) -> crate::metrics::MetricsSummary {
        self.metrics.summary(
            now,
            self.config.report.top_sources,
            self.config.report.top_terms,
        )
    }

    pub fn check_activity(&mut self, last_hour_count: u64, now: DateTime<Utc>) -> AnomalyReport {
        self.metrics.detect_anomaly_at(last_hour_count, now)
    }

    /// Activity check using the ledger's count for the hour before `now`
    pub fn check_recent_activity(&mut self, now: DateTime<Utc>) -> AnomalyReport {
        let count = self.ledger.count_between(now - Duration::hours(1), now) as u64;
        self.check_activity(count, now)
    }
}
