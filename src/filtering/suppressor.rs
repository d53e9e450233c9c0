// Duplicate suppressor: fingerprint lookups against a time-windowed cache
//
// Eviction policy: an entry expires `cooldown` after its last refresh and is
// dropped by `cleanup`. Independently, the window never tracks more than
// `max_entries` fingerprints; inserting past that bound evicts the entry that
// was refreshed longest ago.
use ahash::{HashMap, HashMapExt};
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::filtering::types::{CandidateItem, Fingerprint, SuppressionResult, Tier};
use crate::filtering::utils::fingerprint;

/// Reason attached to suppressed items
pub const DUPLICATE_REASON: &str = "duplicate content within cooldown window";

/// Time-windowed near-duplicate detector
pub struct DuplicateSuppressor {
    cooldown: Duration,
    max_entries: usize,

    /// Fingerprint -> last time an alert-worthy item carried it
    last_seen: HashMap<Fingerprint, DateTime<Utc>>,

    /// Refresh order, oldest first. May hold stale pairs for fingerprints that
    /// were refreshed later; those are skipped on eviction.
    order: VecDeque<(DateTime<Utc>, Fingerprint)>,
}

impl DuplicateSuppressor {
    pub fn new(cooldown: Duration, max_entries: usize) -> Self {
        Self {
            cooldown,
            max_entries: max_entries.max(1),
            last_seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Check an item against the window, using its observation time as "now"
    pub fn check_and_record(&mut self, item: &CandidateItem, tier: Tier) -> SuppressionResult {
        self.check_and_record_at(item, tier, item.observed_at)
    }

    /// Check an item against the window at an explicit reference time.
    ///
    /// Every item is checked, but only alert-worthy items that pass insert or
    /// refresh their fingerprint. Repeated low-tier mentions therefore never
    /// suppress each other.
    pub fn check_and_record_at(
        &mut self,
        item: &CandidateItem,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> SuppressionResult {
        let fp = fingerprint(&item.text);

        if self.is_suppressing(&fp, now) {
            tracing::debug!("Suppressing duplicate {} from {}", fp, item.source_handle);
            return SuppressionResult {
                suppressed: true,
                reason: Some(DUPLICATE_REASON.to_string()),
                fingerprint: fp,
            };
        }

        if tier.is_alert_worthy() {
            self.remember(fp.clone(), now);
        }

        SuppressionResult {
            suppressed: false,
            reason: None,
            fingerprint: fp,
        }
    }

    /// True if the fingerprint has a non-expired entry at `now`
    pub fn is_suppressing(&self, fp: &Fingerprint, now: DateTime<Utc>) -> bool {
        self.last_seen
            .get(fp)
            .is_some_and(|&last| now - last < self.cooldown)
    }

    fn remember(&mut self, fp: Fingerprint, now: DateTime<Utc>) {
        self.last_seen.insert(fp.clone(), now);
        self.order.push_back((now, fp));

        while self.last_seen.len() > self.max_entries {
            self.evict_oldest();
        }

        // Keep stale refresh records from piling up
        if self.order.len() > self.max_entries.saturating_mul(2) {
            let last_seen = &self.last_seen;
            self.order
                .retain(|(ts, fp)| last_seen.get(fp).is_some_and(|current| current == ts));
        }
    }

    fn evict_oldest(&mut self) {
        while let Some((ts, fp)) = self.order.pop_front() {
            if self.last_seen.get(&fp) == Some(&ts) {
                self.last_seen.remove(&fp);
                tracing::trace!("Evicted {} from suppression window (capacity)", fp);
                return;
            }
        }
    }

    /// Drop expired entries; returns how many were removed
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.last_seen.len();
        let cooldown = self.cooldown;
        self.last_seen.retain(|_, last| now - *last < cooldown);

        let last_seen = &self.last_seen;
        self.order
            .retain(|(ts, fp)| last_seen.get(fp).is_some_and(|current| current == ts));

        let removed = before - self.last_seen.len();
        if removed > 0 {
            tracing::debug!("Suppression cleanup removed {} expired entries", removed);
        }
        removed
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.last_seen.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Get statistics about current window state
    pub fn stats(&self) -> SuppressionStats {
        SuppressionStats {
            tracked_fingerprints: self.last_seen.len(),
            capacity: self.max_entries,
            cooldown_ms: self.cooldown.num_milliseconds(),
        }
    }
}

/// Statistics from the suppression window
#[derive(Debug, Clone)]
pub struct SuppressionStats {
    pub tracked_fingerprints: usize,
    pub capacity: usize,
    pub cooldown_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn item(text: &str, at: DateTime<Utc>) -> CandidateItem {
        CandidateItem::new(text, "source", at)
    }

    fn suppressor() -> DuplicateSuppressor {
        DuplicateSuppressor::new(Duration::hours(1), 100)
    }

    #[test]
    fn test_duplicate_within_cooldown() {
        let mut s = suppressor();

        let first = s.check_and_record(&item("Balacera en Cuernavaca", t0()), Tier::Urgent);
        assert!(!first.suppressed);

        let later = t0() + Duration::minutes(59);
        let second = s.check_and_record(&item("balacera en cuernavaca!!", later), Tier::Urgent);
        assert!(second.suppressed);
        assert_eq!(second.reason.as_deref(), Some(DUPLICATE_REASON));
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn test_duplicate_after_cooldown() {
        let mut s = suppressor();
        s.check_and_record(&item("Balacera en Cuernavaca", t0()), Tier::Urgent);

        let exactly = t0() + Duration::hours(1);
        let result = s.check_and_record(&item("Balacera en Cuernavaca", exactly), Tier::Urgent);
        assert!(!result.suppressed);
    }

    #[test]
    fn test_low_tier_does_not_populate_window() {
        let mut s = suppressor();

        assert!(!s.check_and_record(&item("hola", t0()), Tier::Low).suppressed);
        assert!(!s
            .check_and_record(&item("hola", t0() + Duration::minutes(1)), Tier::Medium)
            .suppressed);
        assert!(s.is_empty());
    }

    #[test]
    fn test_low_tier_duplicate_of_high_is_suppressed() {
        let mut s = suppressor();
        s.check_and_record(&item("Protesta en el congreso", t0()), Tier::High);

        let result = s.check_and_record(
            &item("protesta en el congreso", t0() + Duration::minutes(5)),
            Tier::Low,
        );
        assert!(result.suppressed);
    }

    #[test]
    fn test_suppressed_items_do_not_refresh() {
        let mut s = suppressor();
        s.check_and_record(&item("alerta", t0()), Tier::Urgent);
        s.check_and_record(&item("alerta", t0() + Duration::minutes(50)), Tier::Urgent);

        // Window still anchored at t0, so 61 minutes later it has expired
        let later = item("alerta", t0() + Duration::minutes(61));
        let result = s.check_and_record(&later, Tier::Urgent);
        assert!(!result.suppressed);
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let mut s = suppressor();
        s.check_and_record(&item("uno", t0()), Tier::High);
        s.check_and_record(&item("dos", t0() + Duration::minutes(30)), Tier::High);

        assert_eq!(s.cleanup(t0() + Duration::minutes(70)), 1);
        assert_eq!(s.len(), 1);
        assert_eq!(s.cleanup(t0() + Duration::minutes(70)), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut s = DuplicateSuppressor::new(Duration::hours(1), 2);
        s.check_and_record(&item("uno", t0()), Tier::High);
        s.check_and_record(&item("dos", t0() + Duration::seconds(1)), Tier::High);
        s.check_and_record(&item("tres", t0() + Duration::seconds(2)), Tier::High);

        assert_eq!(s.len(), 2);
        let now = t0() + Duration::seconds(3);
        assert!(!s.is_suppressing(&fingerprint("uno"), now));
        assert!(s.is_suppressing(&fingerprint("dos"), now));
        assert!(s.is_suppressing(&fingerprint("tres"), now));
    }

    #[test]
    fn test_clear() {
        let mut s = suppressor();
        s.check_and_record(&item("uno", t0()), Tier::High);
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.stats().tracked_fingerprints, 0);
    }
}
