//! Pattern registry for configuration-driven classification
//!
//! This module provides:
//! - Tier vocabularies compiled once into case-insensitive literal matchers
//! - Compound rules that fire when terms from two lists co-occur
//! - The normalized set of important source handles

use crate::config::ClassifierConfig;
use crate::error::{Result, VigiaError};
use crate::filtering::{ImportantSources, Tier};
use crate::filtering::utils::normalize_for_matching;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A vocabulary term with its compiled matcher
#[derive(Debug, Clone)]
pub struct CompiledTerm {
    pub term: String,
    pub regex: Regex,
}

impl CompiledTerm {
    fn compile(raw: &str, context: &str) -> Result<Self> {
        let term = normalize_for_matching(raw);
        let regex = RegexBuilder::new(&regex::escape(&term))
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                VigiaError::Config(format!("Invalid {} term '{}': {}", context, raw, e))
            })?;
        Ok(Self { term, regex })
    }

    pub fn is_match(&self, normalized_text: &str) -> bool {
        self.regex.is_match(normalized_text)
    }
}

/// Trigger terms for one tier, in configuration order
#[derive(Debug, Clone)]
pub struct TierVocabulary {
    pub tier: Tier,
    pub terms: Vec<CompiledTerm>,
}

impl TierVocabulary {
    /// Terms found in the text, in vocabulary order
    pub fn matches<'a>(&'a self, normalized_text: &str) -> Vec<&'a str> {
        self.terms
            .iter()
            .filter(|t| t.is_match(normalized_text))
            .map(|t| t.term.as_str())
            .collect()
    }
}

/// Raises the tier when one term from each list appears in the same text
#[derive(Debug, Clone)]
pub struct CompoundRule {
    pub name: &'static str,
    pub tier: Tier,
    pub reason: &'static str,
    pub first: Vec<CompiledTerm>,
    pub second: Vec<CompiledTerm>,
}

impl CompoundRule {
    /// Matched terms from both lists, or None when either list has no hit
    pub fn evaluate<'a>(&'a self, normalized_text: &str) -> Option<Vec<&'a str>> {
        let first: Vec<&str> = self
            .first
            .iter()
            .filter(|t| t.is_match(normalized_text))
            .map(|t| t.term.as_str())
            .collect();
        if first.is_empty() {
            return None;
        }

        let second: Vec<&str> = self
            .second
            .iter()
            .filter(|t| t.is_match(normalized_text))
            .map(|t| t.term.as_str())
            .collect();
        if second.is_empty() {
            return None;
        }

        Some(first.into_iter().chain(second).collect())
    }
}

/// Standalone vocabulary file, for teams that keep terms out of the main config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyFile {
    pub classifier: ClassifierConfig,
}

/// Pattern registry with all pre-compiled matchers
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    /// Vocabularies ordered URGENT, HIGH, MEDIUM
    pub vocabularies: Vec<TierVocabulary>,
    /// Rules evaluated after the vocabulary scan
    pub compound_rules: Vec<CompoundRule>,
    /// Sources boosted to at least MEDIUM
    pub important_sources: ImportantSources,
}

impl PatternRegistry {
    /// Load a vocabulary file and compile it
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| VigiaError::Io {
            source: e,
            context: format!("Failed to read vocabulary file: {:?}", path),
        })?;
        let file: VocabularyFile = toml::from_str(&content)?;
        Self::from_config(&file.classifier)
    }

    /// Build pattern registry from the classifier configuration
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let vocabularies = vec![
            TierVocabulary {
                tier: Tier::Urgent,
                terms: compile_list(&config.urgent_terms, "urgent")?,
            },
            TierVocabulary {
                tier: Tier::High,
                terms: compile_list(&config.high_terms, "high")?,
            },
            TierVocabulary {
                tier: Tier::Medium,
                terms: compile_list(&config.medium_terms, "medium")?,
            },
        ];

        let compound_rules = vec![
            CompoundRule {
                name: "legislative_approval",
                tier: Tier::High,
                reason: "legislature approval",
                first: compile_list(&config.legislature_terms, "legislature")?,
                second: compile_list(&config.approval_terms, "approval")?,
            },
            CompoundRule {
                name: "prosecutor_detention",
                tier: Tier::Urgent,
                reason: "prosecutor detention",
                first: compile_list(&config.prosecutor_terms, "prosecutor")?,
                second: compile_list(&config.detention_terms, "detention")?,
            },
        ];

        tracing::debug!(
            "Compiled {} vocabulary terms and {} compound rules",
            vocabularies.iter().map(|v| v.terms.len()).sum::<usize>(),
            compound_rules.len()
        );

        Ok(Self {
            vocabularies,
            compound_rules,
            important_sources: ImportantSources::new(&config.important_sources),
        })
    }

    /// Vocabulary for a tier; LOW has none
    pub fn vocabulary(&self, tier: Tier) -> Option<&TierVocabulary> {
        self.vocabularies.iter().find(|v| v.tier == tier)
    }
}

fn compile_list(terms: &[String], context: &str) -> Result<Vec<CompiledTerm>> {
    terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| CompiledTerm::compile(t, context))
        .collect()
}
