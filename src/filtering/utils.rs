// Text normalization, fingerprinting and ranking helpers
use crate::filtering::types::Fingerprint;
use ahash::HashMap;
use serde::{Deserialize, Serialize};

/// Hex characters kept from the BLAKE3 digest (64 bits)
const FINGERPRINT_LEN: usize = 16;

/// Lowercase and collapse runs of whitespace into single spaces.
/// This is the form vocabulary terms are matched against.
pub fn normalize_for_matching(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase and drop every non-alphanumeric character, whitespace included
pub fn normalize_for_fingerprint(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Stable digest of the normalized text
pub fn fingerprint(text: &str) -> Fingerprint {
    let normalized = normalize_for_fingerprint(text);
    let hash = blake3::hash(normalized.as_bytes());
    Fingerprint::new(&hash.to_hex().as_str()[..FINGERPRINT_LEN])
}

/// A key with its occurrence count, as produced by [`CountRanker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCount {
    pub key: String,
    pub count: u64,
}

/// Counts keys while remembering the order they were first seen, so rankings
/// break ties deterministically by first appearance.
#[derive(Debug, Default)]
pub struct CountRanker {
    entries: Vec<RankedCount>,
    index: HashMap<String, usize>,
}

impl CountRanker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, amount: u64) {
        match self.index.get(key) {
            Some(&idx) => self.entries[idx].count += amount,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push(RankedCount {
                    key: key.to_string(),
                    count: amount,
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count descending, ties in first-seen order, truncated to `limit`
    pub fn into_ranked(mut self, limit: usize) -> Vec<RankedCount> {
        // sort_by is stable
        self.entries.sort_by(|a, b| b.count.cmp(&a.count));
        self.entries.truncate(limit);
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_formatting() {
        assert_eq!(fingerprint("Hello, World!"), fingerprint("hello world"));
        assert_eq!(fingerprint("  hello\n\tWORLD "), fingerprint("hello world"));
        assert_ne!(fingerprint("hello world"), fingerprint("hello there"));
    }

    #[test]
    fn test_fingerprint_keeps_accented_letters() {
        assert_eq!(normalize_for_fingerprint("¡Fiscalía, HOY!"), "fiscalíahoy");
        assert_ne!(fingerprint("fiscalía"), fingerprint("fiscala"));
    }

    #[test]
    fn test_fingerprint_length() {
        assert_eq!(fingerprint("anything").as_str().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_normalize_for_matching() {
        assert_eq!(
            normalize_for_matching("  El PRESIDENTE\n municipal  "),
            "el presidente municipal"
        );
    }

    #[test]
    fn test_ranker_ties_keep_first_seen_order() {
        let mut ranker = CountRanker::new();
        for key in ["urgente", "diputado", "congreso", "urgente"] {
            ranker.add(key, 1);
        }
        ranker.add("congreso", 4);
        ranker.add("diputado", 4);
        ranker.add("urgente", 1);

        let ranked = ranker.into_ranked(10);
        let keys: Vec<_> = ranked.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["diputado", "congreso", "urgente"]);
        assert_eq!(ranked[0].count, 5);
        assert_eq!(ranked[2].count, 3);
    }

    #[test]
    fn test_ranker_truncates() {
        let mut ranker = CountRanker::new();
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            ranker.add(key, i as u64 + 1);
        }
        let ranked = ranker.into_ranked(2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].key, "d");
        assert_eq!(ranked[1].key, "c");
    }
}
