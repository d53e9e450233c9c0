// Shared types for the classification and suppression stages
use crate::error::{Result, VigiaError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Raw input unit produced by an external collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub text: String,
    #[serde(alias = "sourceHandle")]
    pub source_handle: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(alias = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

impl CandidateItem {
    pub fn new(
        text: impl Into<String>,
        source_handle: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            text: text.into(),
            source_handle: source_handle.into(),
            url: None,
            observed_at,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Reject items the classifier cannot meaningfully score
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(VigiaError::invalid_input(format!(
                "item from '{}' has empty text",
                self.source_handle
            )));
        }
        Ok(())
    }
}

/// Urgency tier. Ordering follows priority: `Low < Medium < High < Urgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Low,
    Medium,
    High,
    Urgent,
}

impl Tier {
    /// All tiers, highest priority first
    pub const DESCENDING: [Tier; 4] = [Tier::Urgent, Tier::High, Tier::Medium, Tier::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Urgent => "URGENT",
            Tier::High => "HIGH",
            Tier::Medium => "MEDIUM",
            Tier::Low => "LOW",
        }
    }

    /// Tiers at or above HIGH are worth notifying about
    pub fn is_alert_worthy(&self) -> bool {
        *self >= Tier::High
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = VigiaError;

    /// Accepts the English names and the Spanish ones operators type in chat
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "urgent" | "urgente" => Ok(Tier::Urgent),
            "high" | "alta" | "alto" => Ok(Tier::High),
            "medium" | "media" | "medio" => Ok(Tier::Medium),
            "low" | "baja" | "bajo" => Ok(Tier::Low),
            other => Err(VigiaError::invalid_argument(format!(
                "unknown tier '{}' (expected URGENT, HIGH, MEDIUM or LOW)",
                other
            ))),
        }
    }
}

/// Result of classifying one candidate item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub tier: Tier,
    pub reason: String,
    pub matched_terms: BTreeSet<String>,
    pub classified_at: DateTime<Utc>,
}

/// Digest of normalized text used to spot near-duplicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decision from the duplicate suppressor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionResult {
    pub suppressed: bool,
    pub reason: Option<String>,
    pub fingerprint: Fingerprint,
}

/// Source handles whose mentions are always worth at least MEDIUM.
/// Handles are compared case-insensitively and without a leading '@'.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportantSources {
    handles: HashSet<String>,
}

impl ImportantSources {
    pub fn new<I, S>(handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            handles: handles
                .into_iter()
                .map(|h| normalize_handle(h.as_ref()))
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.handles.contains(&normalize_handle(handle))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

pub(crate) fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Urgent > Tier::High);
        assert!(Tier::High > Tier::Medium);
        assert!(Tier::Medium > Tier::Low);
        assert!(Tier::High.is_alert_worthy());
        assert!(!Tier::Medium.is_alert_worthy());
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("urgent".parse::<Tier>().unwrap(), Tier::Urgent);
        assert_eq!("ALTA".parse::<Tier>().unwrap(), Tier::High);
        assert_eq!(" low ".parse::<Tier>().unwrap(), Tier::Low);

        let err = "critical".parse::<Tier>().unwrap_err();
        assert!(matches!(err, VigiaError::InvalidArgument(_)));
    }

    #[test]
    fn test_tier_serialization() {
        assert_eq!(serde_json::to_string(&Tier::Urgent).unwrap(), "\"URGENT\"");
        let tier: Tier = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(tier, Tier::Medium);
    }

    #[test]
    fn test_item_from_wire_format() {
        let json = r#"{
            "text": "Sesión del congreso",
            "sourceHandle": "congresomorelos",
            "url": null,
            "observedAt": "2026-10-17T15:30:00Z"
        }"#;
        let item: CandidateItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.source_handle, "congresomorelos");
        assert!(item.url.is_none());
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_empty_text_is_invalid() {
        let item = CandidateItem::new("   ", "someone", Utc::now());
        assert!(matches!(item.validate(), Err(VigiaError::InvalidInput(_))));
    }

    #[test]
    fn test_important_sources_normalization() {
        let sources = ImportantSources::new(["@DiarioDeMorelos", "  ", "lajornada"]);
        assert_eq!(sources.len(), 2);
        assert!(sources.contains("diariodemorelos"));
        assert!(sources.contains("@LaJornada"));
        assert!(!sources.contains("otro"));
    }
}
