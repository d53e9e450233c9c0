use crate::filtering::{CountRanker, RankedCount, Tier};
use crate::ledger::AlertRecord;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts for one day's partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub date: NaiveDate,
    pub total: usize,
    pub suppressed: usize,
    pub alert_worthy: usize,
    pub distinct_sources: usize,
    /// Every tier is present, zero when unseen
    pub by_tier: BTreeMap<Tier, usize>,
    /// Most active sources, count descending, ties by first appearance
    pub by_source: Vec<RankedCount>,
    /// Most frequent matched terms, same ordering rule
    pub top_matched_terms: Vec<RankedCount>,
}

impl LedgerSummary {
    /// Single pass over a partition
    pub fn from_records(
        date: NaiveDate,
        records: &[AlertRecord],
        top_sources: usize,
        top_terms: usize,
    ) -> Self {
        let mut by_tier: BTreeMap<Tier, usize> = Tier::DESCENDING.iter().map(|t| (*t, 0)).collect();
        let mut sources = CountRanker::new();
        let mut terms = CountRanker::new();
        let mut suppressed = 0;
        let mut alert_worthy = 0;

        for record in records {
            *by_tier.entry(record.tier()).or_insert(0) += 1;
            sources.add(&record.item.source_handle, 1);
            for term in &record.classification.matched_terms {
                terms.add(term, 1);
            }
            if record.suppressed {
                suppressed += 1;
            }
            if record.is_alert_worthy() {
                alert_worthy += 1;
            }
        }

        Self {
            date,
            total: records.len(),
            suppressed,
            alert_worthy,
            distinct_sources: sources.len(),
            by_tier,
            by_source: sources.into_ranked(top_sources),
            top_matched_terms: terms.into_ranked(top_terms),
        }
    }

    pub fn count(&self, tier: Tier) -> usize {
        self.by_tier.get(&tier).copied().unwrap_or(0)
    }
}

/// The seven dates ending at `end`, oldest first
pub fn week_ending(end: NaiveDate) -> Vec<NaiveDate> {
    (0..7).rev().map(|back| end - Duration::days(back)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filtering::{fingerprint, CandidateItem, Classification};
    use chrono::{TimeZone, Utc};

    fn record(source: &str, tier: Tier, terms: &[&str], suppressed: bool) -> AlertRecord {
        let ts = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        AlertRecord {
            id: format!("{}-{}", source, terms.join("-")),
            item: CandidateItem::new("texto", source, ts),
            classification: Classification {
                tier,
                reason: "test".to_string(),
                matched_terms: terms.iter().map(|s| s.to_string()).collect(),
                classified_at: ts,
            },
            fingerprint: fingerprint("texto"),
            suppressed,
            suppress_reason: None,
            processed_at: ts,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[test]
    fn test_counts_by_tier_and_flags() {
        let records = vec![
            record("a", Tier::Urgent, &[], false),
            record("a", Tier::Urgent, &[], true),
            record("b", Tier::High, &[], false),
            record("c", Tier::Low, &[], false),
        ];
        let summary = LedgerSummary::from_records(day(), &records, 5, 10);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.count(Tier::Urgent), 2);
        assert_eq!(summary.count(Tier::High), 1);
        assert_eq!(summary.count(Tier::Medium), 0);
        assert_eq!(summary.by_tier.len(), 4);
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.alert_worthy, 2);
        assert_eq!(summary.distinct_sources, 3);
        assert_eq!(summary.by_source[0].key, "a");
    }

    #[test]
    fn test_term_ranking_ties_by_first_seen() {
        let mut records = Vec::new();
        // "diputado" is seen before "congreso"; both end at 5
        for _ in 0..5 {
            records.push(record("s", Tier::High, &["diputado"], false));
        }
        for _ in 0..5 {
            records.push(record("s", Tier::High, &["congreso"], false));
        }
        for _ in 0..3 {
            records.push(record("s", Tier::Urgent, &["urgente"], false));
        }

        let summary = LedgerSummary::from_records(day(), &records, 5, 10);
        let keys: Vec<_> = summary.top_matched_terms.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["diputado", "congreso", "urgente"]);
    }

    #[test]
    fn test_source_ranking_truncated() {
        let records: Vec<_> = ["a", "b", "b", "c", "d", "e", "f", "g"]
            .iter()
            .map(|s| record(s, Tier::Low, &[], false))
            .collect();
        let summary = LedgerSummary::from_records(day(), &records, 3, 10);

        assert_eq!(summary.by_source.len(), 3);
        assert_eq!(summary.by_source[0].key, "b");
        assert_eq!(summary.by_source[1].key, "a");
        assert_eq!(summary.distinct_sources, 7);
    }

    #[test]
    fn test_week_ending() {
        let week = week_ending(day());
        assert_eq!(week.len(), 7);
        assert_eq!(week[0], NaiveDate::from_ymd_opt(2026, 10, 11).unwrap());
        assert_eq!(week[6], day());
    }
}
