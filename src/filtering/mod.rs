// Two-stage filtering for candidate items
//
// Stage 1: Classification (vocabulary tiers, compound rules, source importance)
// Stage 2: Duplicate suppression (fingerprint + cooldown window)

mod classifier;
mod suppressor;
mod types;
pub mod utils;

pub use classifier::{Classifier, GENERAL_MENTION};
pub use suppressor::{DuplicateSuppressor, SuppressionStats, DUPLICATE_REASON};
pub use types::{
    CandidateItem, Classification, Fingerprint, ImportantSources, SuppressionResult, Tier,
};
pub use utils::{fingerprint, CountRanker, RankedCount};
