//! Persistent aggregate counters
//!
//! Everything here is plain data. `MetricsState` is what crosses the
//! persistence boundary; the aggregator owns all mutation rules.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Insertion-ordered set of source handles, serialized as a plain array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SourceSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the handle was not present before
    pub fn insert(&mut self, handle: &str) -> bool {
        if self.members.contains(handle) {
            return false;
        }
        self.members.insert(handle.to_string());
        self.order.push(handle.to_string());
        true
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.members.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for SourceSet {
    fn from(handles: Vec<String>) -> Self {
        let mut set = SourceSet::new();
        for handle in &handles {
            set.insert(handle);
        }
        set
    }
}

impl From<SourceSet> for Vec<String> {
    fn from(set: SourceSet) -> Self {
        set.order
    }
}

/// Totals for one calendar day, pushed by the daily roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub total_items: u64,
    pub total_sources: u64,
}

/// First sighting of a source handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSourceEvent {
    pub source: String,
    pub first_seen: DateTime<Utc>,
}

/// Detected burst of activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeRecord {
    pub detected_at: DateTime<Utc>,
    pub hour_count: u64,
    pub average_per_hour: f64,
    pub ratio: f64,
}

/// Keyword counts for one day, terms kept in first-seen order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordDay {
    pub date: NaiveDate,
    pub counts: Vec<(String, u64)>,
}

impl KeywordDay {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            counts: Vec::new(),
        }
    }

    pub fn add(&mut self, term: &str) {
        match self.counts.iter_mut().find(|(t, _)| t == term) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((term.to_string(), 1)),
        }
    }

    pub fn count(&self, term: &str) -> u64 {
        self.counts
            .iter()
            .find(|(t, _)| t == term)
            .map_or(0, |(_, c)| *c)
    }
}

/// Snapshot of every running counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsState {
    pub started_at: DateTime<Utc>,
    pub total_items: u64,
    pub sources: SourceSet,
    pub source_counts: BTreeMap<String, u64>,
    pub new_sources: VecDeque<NewSourceEvent>,
    pub avg_latency_ms: f64,
    pub latency_samples: u64,
    pub daily_short: VecDeque<DailyTotals>,
    pub daily_long: VecDeque<DailyTotals>,
    pub keyword_days: VecDeque<KeywordDay>,
    pub spikes: VecDeque<SpikeRecord>,
    #[serde(default)]
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl MetricsState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            total_items: 0,
            sources: SourceSet::new(),
            source_counts: BTreeMap::new(),
            new_sources: VecDeque::new(),
            avg_latency_ms: 0.0,
            latency_samples: 0,
            daily_short: VecDeque::new(),
            daily_long: VecDeque::new(),
            keyword_days: VecDeque::new(),
            spikes: VecDeque::new(),
            last_saved_at: None,
        }
    }
}

/// Push onto a FIFO buffer, dropping from the front past `cap`
pub(crate) fn push_bounded<T>(buffer: &mut VecDeque<T>, value: T, cap: usize) {
    buffer.push_back(value);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}
