//! Configuration management for vigia
//!
//! Loads the TOML configuration, applies profile and environment overrides and
//! validates the result before any component is built from it. Every section
//! falls back to its defaults when omitted, so a config file only needs to
//! carry what differs from the built-in regional vocabulary.

use crate::error::{Result, VigiaError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub classifier: ClassifierConfig,
    pub suppression: SuppressionConfig,
    pub metrics: MetricsConfig,
    pub report: ReportConfig,
    pub ledger: LedgerConfig,
    pub pipeline: PipelineConfig,
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Persistence settings for the SQLite store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
    /// Ledger partitions older than this many days are purged
    pub retention_days: u32,
}

/// Tier vocabularies, compound rule terms and important sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub urgent_terms: Vec<String>,
    pub high_terms: Vec<String>,
    pub medium_terms: Vec<String>,
    pub legislature_terms: Vec<String>,
    pub approval_terms: Vec<String>,
    pub prosecutor_terms: Vec<String>,
    pub detention_terms: Vec<String>,
    pub important_sources: Vec<String>,
}

/// Duplicate suppression window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    pub cooldown_ms: u64,
    /// Hard bound on tracked fingerprints; oldest entries are evicted first
    pub max_entries: usize,
}

/// Aggregation windows and anomaly thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub trend_threshold_pct: f64,
    pub anomaly_multiplier: f64,
    pub short_window_days: usize,
    pub long_window_days: usize,
    pub keyword_window_days: usize,
    pub max_new_sources: usize,
    pub max_spikes: usize,
}

/// Digest rendering limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_sources: usize,
    pub top_terms: usize,
}

/// Day partitioning of the alert ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Offset from UTC, in minutes, of the local midnight that starts a partition
    pub utc_offset_minutes: i32,
}

/// Single-writer pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub buffer_size: usize,
    pub flush_interval: String,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub important_sources: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VigiaError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| VigiaError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VigiaError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| VigiaError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self.profiles.get(profile).cloned().ok_or_else(|| {
            VigiaError::Config(format!("Unknown profile '{}'", profile))
        })?;

        if let Some(cooldown) = overrides.cooldown_ms {
            self.suppression.cooldown_ms = cooldown;
        }
        if let Some(multiplier) = overrides.anomaly_multiplier {
            self.metrics.anomaly_multiplier = multiplier;
        }
        if let Some(sources) = overrides.important_sources {
            self.classifier.important_sources = sources;
        }

        ConfigValidator::validate(self)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: VIGIA_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("VIGIA_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let invalid = |kind: &str| VigiaError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}' as {}", value, kind),
        };

        match path {
            "SUPPRESSION__COOLDOWN_MS" => {
                self.suppression.cooldown_ms = value.parse().map_err(|_| invalid("integer"))?;
            }
            "METRICS__ANOMALY_MULTIPLIER" => {
                self.metrics.anomaly_multiplier = value.parse().map_err(|_| invalid("number"))?;
            }
            "LEDGER__UTC_OFFSET_MINUTES" => {
                self.ledger.utc_offset_minutes = value.parse().map_err(|_| invalid("integer"))?;
            }
            "STORAGE__RETENTION_DAYS" => {
                self.storage.retention_days = value.parse().map_err(|_| invalid("integer"))?;
            }
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Suppression cooldown as a chrono duration, saturating at the largest
    /// representable span
    pub fn cooldown(&self) -> chrono::Duration {
        i64::try_from(self.suppression.cooldown_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Pipeline flush interval, parsed from strings like "5s", "10m", "1h"
    pub fn flush_interval(&self) -> Duration {
        parse_duration(&self.pipeline.flush_interval).unwrap_or(Duration::from_secs(5))
    }

    /// Location of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.database_file)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| VigiaError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("vigia").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| VigiaError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".vigia"))
    }
}

/// Parse "30s", "15m", "1h" or a bare number of seconds
pub(crate) fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = digits.parse().ok()?;
    match unit {
        "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig::default(),
            storage: StorageConfig::default(),
            classifier: ClassifierConfig::default(),
            suppression: SuppressionConfig::default(),
            metrics: MetricsConfig::default(),
            report: ReportConfig::default(),
            ledger: LedgerConfig::default(),
            pipeline: PipelineConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            created_at: current_timestamp(),
            last_modified: current_timestamp(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.vigia"),
            database_file: "vigia.sqlite".to_string(),
            retention_days: 30,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            urgent_terms: terms(&[
                "urgente",
                "emergencia",
                "accidente",
                "grave",
                "balacera",
                "homicidio",
                "ataque",
                "explosión",
                "incendio",
                "sismo",
                "evacuación",
            ]),
            high_terms: terms(&[
                "congreso",
                "diputado",
                "diputada",
                "legislatura",
                "iniciativa",
                "reforma",
                "gobernador",
                "gobernadora",
                "elección",
                "denuncia",
                "protesta",
                "manifestación",
            ]),
            medium_terms: terms(&[
                "ayuntamiento",
                "presidente municipal",
                "alcalde",
                "alcaldesa",
                "cabildo",
                "secretaría",
                "presupuesto",
                "obra pública",
                "seguridad",
            ]),
            legislature_terms: terms(&["congreso", "legislatura", "diputados", "pleno", "cabildo"]),
            approval_terms: terms(&["aprueba", "aprobó", "aprobación", "aprobada", "avala"]),
            prosecutor_terms: terms(&["fiscalía", "fiscal", "ministerio público"]),
            detention_terms: terms(&[
                "detención",
                "detenido",
                "detenida",
                "arresto",
                "captura",
                "vinculado a proceso",
            ]),
            important_sources: Vec::new(),
        }
    }
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 3_600_000,
            max_entries: 10_000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            trend_threshold_pct: 10.0,
            anomaly_multiplier: 3.0,
            short_window_days: 7,
            long_window_days: 30,
            keyword_window_days: 30,
            max_new_sources: 50,
            max_spikes: 100,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_sources: 5,
            top_terms: 10,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        // Central Mexico
        Self {
            utc_offset_minutes: -360,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            flush_interval: "30s".to_string(),
        }
    }
}
