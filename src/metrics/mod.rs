//! Running metrics over the processed stream
//!
//! The aggregator keeps totals, per-source counts, latency, daily windows,
//! keyword day buckets and spike history. It never touches storage; callers
//! take a `MetricsState` snapshot when it is dirty and hand it to a store.

mod state;
mod trend;

pub use state::{DailyTotals, KeywordDay, MetricsState, NewSourceEvent, SourceSet, SpikeRecord};
pub use trend::{trend, TrendDirection, TrendReport};

use crate::config::MetricsConfig;
use crate::filtering::{CandidateItem, Classification, CountRanker, RankedCount, Tier};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use state::push_bounded;

/// Outcome of an activity check against the long-run hourly average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub is_anomaly: bool,
    pub tier: Tier,
    pub message: String,
    pub last_hour_count: u64,
    pub average_per_hour: f64,
    pub threshold: f64,
}

/// Point-in-time view used by the trend digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub generated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub days_active: i64,
    pub total_items: u64,
    pub total_sources: usize,
    pub avg_latency_ms: f64,
    pub latency_samples: u64,
    pub top_sources: Vec<RankedCount>,
    pub recent_new_sources: Vec<NewSourceEvent>,
    /// Day-over-day change in items, from the short window
    pub items_trend: TrendReport,
    /// Day-over-day change in active sources, from the short window
    pub sources_trend: TrendReport,
    pub top_keywords: Vec<RankedCount>,
    pub spike_count: usize,
    pub last_spike: Option<SpikeRecord>,
}

pub struct MetricsAggregator {
    config: MetricsConfig,
    state: MetricsState,
    /// Offset whose local midnight separates keyword days
    offset: FixedOffset,
    dirty: bool,
}

/// Earliest day still inside a window of `days` ending at `newest`
fn window_start(newest: NaiveDate, days: usize) -> NaiveDate {
    i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .and_then(|span| newest.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

impl MetricsAggregator {
    pub fn new(config: MetricsConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            config,
            state: MetricsState::new(started_at),
            offset: utc(),
            dirty: false,
        }
    }

    /// Resume from a persisted snapshot
    pub fn from_state(config: MetricsConfig, state: MetricsState) -> Self {
        Self {
            config,
            state,
            offset: utc(),
            dirty: false,
        }
    }

    /// Bucket keywords by local days at `offset` instead of UTC days
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    fn local_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset).date_naive()
    }

    pub fn state(&self) -> &MetricsState {
        &self.state
    }

    /// True when counters changed since the last successful save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self, at: DateTime<Utc>) {
        self.state.last_saved_at = Some(at);
        self.dirty = false;
    }

    /// Fold one processed item into the counters
    pub fn ingest(
        &mut self,
        item: &CandidateItem,
        classification: &Classification,
        latency_ms: Option<f64>,
    ) {
        let state = &mut self.state;
        state.total_items += 1;

        let source = item.source_handle.as_str();
        *state.source_counts.entry(source.to_string()).or_insert(0) += 1;
        if state.sources.insert(source) {
            tracing::debug!("New source seen: {}", source);
            push_bounded(
                &mut state.new_sources,
                NewSourceEvent {
                    source: source.to_string(),
                    first_seen: item.observed_at,
                },
                self.config.max_new_sources,
            );
        }

        if let Some(latency) = latency_ms.filter(|l| l.is_finite() && *l >= 0.0) {
            state.latency_samples += 1;
            state.avg_latency_ms += (latency - state.avg_latency_ms) / state.latency_samples as f64;
        }

        if !classification.matched_terms.is_empty() {
            let day = self.local_date(item.observed_at);
            self.count_keywords(day, classification);
        }

        self.dirty = true;
    }

    fn count_keywords(&mut self, day: NaiveDate, classification: &Classification) {
        let window = self.config.keyword_window_days.max(1);
        let buckets = &mut self.state.keyword_days;

        if let Some(newest) = buckets.back().map(|b| b.date) {
            if day <= window_start(newest, window) {
                // Late arrival outside the window
                return;
            }
        }

        let idx = match buckets.iter().position(|b| b.date >= day) {
            Some(i) if buckets[i].date == day => i,
            Some(i) => {
                buckets.insert(i, KeywordDay::new(day));
                i
            }
            None => {
                buckets.push_back(KeywordDay::new(day));
                buckets.len() - 1
            }
        };
        for term in &classification.matched_terms {
            buckets[idx].add(term);
        }

        if let Some(newest) = buckets.back().map(|b| b.date) {
            let cutoff = window_start(newest, window);
            while buckets.front().is_some_and(|b| b.date <= cutoff) {
                buckets.pop_front();
            }
        }
    }

    /// Push one day's totals into the short and long windows
    pub fn roll_daily(&mut self, totals: DailyTotals) {
        tracing::info!(
            "Daily roll for {}: {} items from {} sources",
            totals.date,
            totals.total_items,
            totals.total_sources
        );
        push_bounded(
            &mut self.state.daily_short,
            totals.clone(),
            self.config.short_window_days,
        );
        push_bounded(&mut self.state.daily_long, totals, self.config.long_window_days);
        self.dirty = true;
    }

    /// Trend of a series with the configured threshold
    pub fn trend(&self, values: &[u64]) -> TrendReport {
        trend(values, self.config.trend_threshold_pct)
    }

    pub fn items_trend(&self) -> TrendReport {
        let values: Vec<u64> = self.state.daily_short.iter().map(|d| d.total_items).collect();
        self.trend(&values)
    }

    pub fn sources_trend(&self) -> TrendReport {
        let values: Vec<u64> = self.state.daily_short.iter().map(|d| d.total_sources).collect();
        self.trend(&values)
    }

    /// Item trend over the long window, comparing its last two days
    pub fn long_items_trend(&self) -> TrendReport {
        let values: Vec<u64> = self.state.daily_long.iter().map(|d| d.total_items).collect();
        self.trend(&values)
    }

    /// Whole days since the aggregator started, never less than one
    pub fn days_active(&self, now: DateTime<Utc>) -> i64 {
        (now - self.state.started_at).num_days().max(1)
    }

    pub fn average_per_hour(&self, now: DateTime<Utc>) -> f64 {
        self.state.total_items as f64 / (self.days_active(now) * 24) as f64
    }

    pub fn detect_anomaly(&mut self, last_hour_count: u64) -> AnomalyReport {
        self.detect_anomaly_at(last_hour_count, Utc::now())
    }

    /// Compare the last hour against the running hourly average.
    ///
    /// A count strictly above `multiplier * average` is an anomaly and is
    /// recorded as a spike. Without any ingested items there is no baseline
    /// and nothing is flagged.
    pub fn detect_anomaly_at(
        &mut self,
        last_hour_count: u64,
        now: DateTime<Utc>,
    ) -> AnomalyReport {
        if self.state.total_items == 0 {
            return AnomalyReport {
                is_anomaly: false,
                tier: Tier::Low,
                message: "no baseline yet".to_string(),
                last_hour_count,
                average_per_hour: 0.0,
                threshold: 0.0,
            };
        }

        let average = self.average_per_hour(now);
        let threshold = self.config.anomaly_multiplier * average;
        let count = last_hour_count as f64;

        if count <= threshold {
            return AnomalyReport {
                is_anomaly: false,
                tier: Tier::Low,
                message: format!(
                    "activity normal: {} items in the last hour (threshold {:.1})",
                    last_hour_count, threshold
                ),
                last_hour_count,
                average_per_hour: average,
                threshold,
            };
        }

        let tier = if count > 2.0 * threshold {
            Tier::Urgent
        } else {
            Tier::High
        };
        let ratio = if average > 0.0 { count / average } else { 0.0 };

        tracing::warn!(
            "Activity spike: {} items in the last hour, {:.1}x the hourly average",
            last_hour_count,
            ratio
        );
        push_bounded(
            &mut self.state.spikes,
            SpikeRecord {
                detected_at: now,
                hour_count: last_hour_count,
                average_per_hour: average,
                ratio,
            },
            self.config.max_spikes,
        );
        self.dirty = true;

        AnomalyReport {
            is_anomaly: true,
            tier,
            message: format!(
                "unusual activity: {} items in the last hour, {:.1}x the average of {:.1}/h",
                last_hour_count, ratio, average
            ),
            last_hour_count,
            average_per_hour: average,
            threshold,
        }
    }

    /// Keyword counts over the trailing `days` (including the day of `now`), ranked
    pub fn keyword_frequencies(&self, days: usize, now: DateTime<Utc>) -> Vec<RankedCount> {
        let today = self.local_date(now);
        let from = window_start(today, days.max(1) - 1);

        let mut ranker = CountRanker::new();
        for bucket in self
            .state
            .keyword_days
            .iter()
            .filter(|b| b.date >= from && b.date <= today)
        {
            for (term, count) in &bucket.counts {
                ranker.add(term, *count);
            }
        }
        ranker.into_ranked(usize::MAX)
    }

    /// Day-over-day trend of one term across the stored buckets
    pub fn keyword_trend(&self, term: &str) -> TrendReport {
        let series: Vec<u64> = self.state.keyword_days.iter().map(|b| b.count(term)).collect();
        self.trend(&series)
    }

    pub fn summary(
        &self,
        now: DateTime<Utc>,
        top_sources: usize,
        top_terms: usize,
    ) -> MetricsSummary {
        let mut ranker = CountRanker::new();
        for source in self.state.sources.iter() {
            let count = self.state.source_counts.get(source).copied().unwrap_or(0);
            ranker.add(source, count);
        }

        let mut top_keywords = self.keyword_frequencies(self.config.keyword_window_days, now);
        top_keywords.truncate(top_terms);

        MetricsSummary {
            generated_at: now,
            started_at: self.state.started_at,
            days_active: self.days_active(now),
            total_items: self.state.total_items,
            total_sources: self.state.sources.len(),
            avg_latency_ms: self.state.avg_latency_ms,
            latency_samples: self.state.latency_samples,
            top_sources: ranker.into_ranked(top_sources),
            recent_new_sources: self
                .state
                .new_sources
                .iter()
                .rev()
                .take(top_sources)
                .cloned()
                .collect(),
            items_trend: self.items_trend(),
            sources_trend: self.sources_trend(),
            top_keywords,
            spike_count: self.state.spikes.len(),
            last_spike: self.state.spikes.back().cloned(),
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}
