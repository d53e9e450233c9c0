//! Vigia - social-media monitoring core
//!
//! Classifies posts from monitored accounts into priority tiers, suppresses
//! repeated content within a cooldown window, keeps a day-partitioned alert
//! ledger with running metrics, and renders digests for notifiers.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod filtering;
pub mod ledger;
pub mod metrics;
pub mod patterns;
pub mod report;
pub mod storage;

pub use error::{Result, VigiaError};
