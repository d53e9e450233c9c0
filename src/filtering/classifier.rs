// Content classifier: vocabulary scan, compound rules, source importance
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::Result;
use crate::filtering::types::{CandidateItem, Classification, ImportantSources, Tier};
use crate::filtering::utils::normalize_for_matching;
use crate::patterns::PatternRegistry;

/// Reason given when nothing in the vocabulary matched
pub const GENERAL_MENTION: &str = "general mention";

/// Assigns an urgency tier to candidate items.
/// Stateless: the same text and source always produce the same tier, reason
/// and matched terms.
#[derive(Clone)]
pub struct Classifier {
    patterns: Arc<PatternRegistry>,
}

impl Classifier {
    pub fn new(patterns: Arc<PatternRegistry>) -> Self {
        Self { patterns }
    }

    /// Classify an item, stamping the result with the current time
    pub fn classify(
        &self,
        item: &CandidateItem,
        important_sources: &ImportantSources,
    ) -> Result<Classification> {
        self.classify_at(item, important_sources, Utc::now())
    }

    /// Classify an item with an explicit classification timestamp
    ///
    /// # Errors
    /// `InvalidInput` when the item text is empty
    pub fn classify_at(
        &self,
        item: &CandidateItem,
        important_sources: &ImportantSources,
        now: DateTime<Utc>,
    ) -> Result<Classification> {
        item.validate()?;

        let text = normalize_for_matching(&item.text);
        let mut matched_terms = BTreeSet::new();
        let mut decided: Option<(Tier, String)> = None;

        // Highest tier first. The first hit fixes the tier; lower tiers still
        // contribute their matched terms.
        for vocabulary in &self.patterns.vocabularies {
            let hits = vocabulary.matches(&text);
            if hits.is_empty() {
                continue;
            }
            if decided.is_none() {
                decided = Some((
                    vocabulary.tier,
                    format!(
                        "matched {} terms: {}",
                        vocabulary.tier.as_str().to_lowercase(),
                        hits.join(", ")
                    ),
                ));
            }
            matched_terms.extend(hits.into_iter().map(str::to_string));
        }

        let (mut tier, mut reason) =
            decided.unwrap_or_else(|| (Tier::Low, GENERAL_MENTION.to_string()));

        // Compound rules only ever raise
        for rule in &self.patterns.compound_rules {
            if let Some(hits) = rule.evaluate(&text) {
                matched_terms.extend(hits.into_iter().map(str::to_string));
                if rule.tier > tier {
                    tier = rule.tier;
                    reason = format!("compound rule: {}", rule.reason);
                }
            }
        }

        if tier < Tier::Medium && important_sources.contains(&item.source_handle) {
            tier = Tier::Medium;
            reason = format!("important source: {}", item.source_handle);
        }

        tracing::trace!(
            "Classified item from {} as {} ({})",
            item.source_handle,
            tier,
            reason
        );

        Ok(Classification {
            tier,
            reason,
            matched_terms,
            classified_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::error::VigiaError;

    fn classifier() -> Classifier {
        let patterns = PatternRegistry::from_config(&ClassifierConfig::default()).unwrap();
        Classifier::new(Arc::new(patterns))
    }

    fn item(text: &str, source: &str) -> CandidateItem {
        CandidateItem::new(text, source, Utc::now())
    }

    fn no_sources() -> ImportantSources {
        ImportantSources::default()
    }

    #[test]
    fn test_urgent_vocabulary() {
        let c = classifier()
            .classify(
                &item("Se reporta un accidente grave en Cuautla", "diariodemorelos"),
                &no_sources(),
            )
            .unwrap();

        assert_eq!(c.tier, Tier::Urgent);
        assert!(c.matched_terms.contains("accidente"));
        assert!(c.matched_terms.contains("grave"));
        assert_eq!(c.reason, "matched urgent terms: accidente, grave");
    }

    #[test]
    fn test_lower_tier_terms_still_collected() {
        let c = classifier()
            .classify(&item("URGENTE: protesta frente al ayuntamiento", "x"), &no_sources())
            .unwrap();

        assert_eq!(c.tier, Tier::Urgent);
        let terms: Vec<_> = c.matched_terms.iter().map(String::as_str).collect();
        assert_eq!(terms, vec!["ayuntamiento", "protesta", "urgente"]);
    }

    #[test]
    fn test_default_is_low() {
        let c = classifier()
            .classify(&item("Buenos días a todos", "x"), &no_sources())
            .unwrap();

        assert_eq!(c.tier, Tier::Low);
        assert_eq!(c.reason, GENERAL_MENTION);
        assert!(c.matched_terms.is_empty());
    }

    #[test]
    fn test_legislative_approval_forces_high() {
        let c = classifier()
            .classify(&item("El pleno aprueba la ley de aguas", "x"), &no_sources())
            .unwrap();

        assert_eq!(c.tier, Tier::High);
        assert_eq!(c.reason, "compound rule: legislature approval");
        assert!(c.matched_terms.contains("pleno"));
        assert!(c.matched_terms.contains("aprueba"));
    }

    #[test]
    fn test_prosecutor_detention_forces_urgent() {
        let c = classifier()
            .classify(
                &item("La fiscalía confirma la detención del exalcalde", "x"),
                &no_sources(),
            )
            .unwrap();

        assert_eq!(c.tier, Tier::Urgent);
        assert_eq!(c.reason, "compound rule: prosecutor detention");
    }

    #[test]
    fn test_compound_rule_never_lowers() {
        // Urgent vocabulary plus a legislative approval stays URGENT
        let c = classifier()
            .classify(
                &item("Urgente: el congreso aprueba estado de emergencia", "x"),
                &no_sources(),
            )
            .unwrap();

        assert_eq!(c.tier, Tier::Urgent);
        assert!(c.reason.starts_with("matched urgent terms"));
        assert!(c.matched_terms.contains("aprueba"));
    }

    #[test]
    fn test_important_source_raises_to_medium_only() {
        let sources = ImportantSources::new(["@GobMorelos"]);

        let low = classifier().classify(&item("Buenos días", "gobmorelos"), &sources).unwrap();
        assert_eq!(low.tier, Tier::Medium);
        assert_eq!(low.reason, "important source: gobmorelos");

        let high = classifier()
            .classify(&item("Nueva iniciativa en el congreso", "gobmorelos"), &sources)
            .unwrap();
        assert_eq!(high.tier, Tier::High);
        assert!(high.reason.starts_with("matched high terms"));
    }

    #[test]
    fn test_important_source_keeps_medium_reason() {
        let sources = ImportantSources::new(["gobmorelos"]);
        let c = classifier()
            .classify(&item("Sesión de cabildo", "gobmorelos"), &sources)
            .unwrap();

        assert_eq!(c.tier, Tier::Medium);
        assert_eq!(c.reason, "matched medium terms: cabildo");
    }

    #[test]
    fn test_empty_text_rejected() {
        let err = classifier().classify(&item("", "x"), &no_sources()).unwrap_err();
        assert!(matches!(err, VigiaError::InvalidInput(_)));
    }

    #[test]
    fn test_deterministic() {
        let classifier = classifier();
        let sources = ImportantSources::new(["diariodemorelos"]);
        let input = item("Diputado denuncia balacera; fiscal anuncia captura", "diariodemorelos");

        let a = classifier.classify(&input, &sources).unwrap();
        let b = classifier.classify(&input, &sources).unwrap();

        assert_eq!(a.tier, b.tier);
        assert_eq!(a.reason, b.reason);
        assert_eq!(a.matched_terms, b.matched_terms);
    }
}
