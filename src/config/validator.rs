use crate::config::{parse_duration, Config};
use crate::error::{Result, ValidationError, VigiaError};

/// Largest real-world UTC offset, in minutes
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Upper bound for every day-count setting (ten years)
pub const MAX_WINDOW_DAYS: usize = 3650;

/// Longest suppression cooldown accepted (thirty days)
pub const MAX_COOLDOWN_MS: u64 = 30 * 24 * 3600 * 1000;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_classifier(config, &mut errors);
        Self::validate_suppression(config, &mut errors);
        Self::validate_metrics(config, &mut errors);
        Self::validate_report(config, &mut errors);
        Self::validate_ledger(config, &mut errors);
        Self::validate_pipeline(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VigiaError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.database_file.is_empty() {
            errors.push(ValidationError::new(
                "storage.database_file",
                "Database file name cannot be empty",
            ));
        }

        let retention = config.storage.retention_days;
        if retention == 0 {
            errors.push(ValidationError::new(
                "storage.retention_days",
                "Retention must keep at least one day",
            ));
        } else if retention as usize > MAX_WINDOW_DAYS {
            errors.push(ValidationError::new(
                "storage.retention_days",
                format!("Retention cannot exceed {} days, got {}", MAX_WINDOW_DAYS, retention),
            ));
        }
    }

    fn validate_classifier(config: &Config, errors: &mut Vec<ValidationError>) {
        let c = &config.classifier;
        let lists: [(&str, &Vec<String>); 7] = [
            ("classifier.urgent_terms", &c.urgent_terms),
            ("classifier.high_terms", &c.high_terms),
            ("classifier.medium_terms", &c.medium_terms),
            ("classifier.legislature_terms", &c.legislature_terms),
            ("classifier.approval_terms", &c.approval_terms),
            ("classifier.prosecutor_terms", &c.prosecutor_terms),
            ("classifier.detention_terms", &c.detention_terms),
        ];

        for (path, list) in lists {
            if list.is_empty() {
                errors.push(ValidationError::new(path, "Term list cannot be empty"));
            }
            if list.iter().any(|t| t.trim().is_empty()) {
                errors.push(ValidationError::new(path, "Terms cannot be blank"));
            }
        }

        if c.important_sources.iter().any(|s| s.trim().is_empty()) {
            errors.push(ValidationError::new(
                "classifier.important_sources",
                "Source handles cannot be blank",
            ));
        }
    }

    fn validate_suppression(config: &Config, errors: &mut Vec<ValidationError>) {
        let cooldown = config.suppression.cooldown_ms;
        if cooldown == 0 {
            errors.push(ValidationError::new(
                "suppression.cooldown_ms",
                "Cooldown must be greater than 0",
            ));
        } else if cooldown > MAX_COOLDOWN_MS {
            errors.push(ValidationError::new(
                "suppression.cooldown_ms",
                format!("Cooldown cannot exceed {} ms, got {}", MAX_COOLDOWN_MS, cooldown),
            ));
        }

        if config.suppression.max_entries == 0 {
            errors.push(ValidationError::new(
                "suppression.max_entries",
                "Suppression window must hold at least one entry",
            ));
        }
    }

    fn validate_metrics(config: &Config, errors: &mut Vec<ValidationError>) {
        let m = &config.metrics;

        if m.trend_threshold_pct.is_nan() || m.trend_threshold_pct <= 0.0 {
            errors.push(ValidationError::new(
                "metrics.trend_threshold_pct",
                format!("Trend threshold must be positive, got {}", m.trend_threshold_pct),
            ));
        }

        if m.anomaly_multiplier.is_nan() || m.anomaly_multiplier < 1.0 {
            errors.push(ValidationError::new(
                "metrics.anomaly_multiplier",
                format!("Anomaly multiplier must be at least 1.0, got {}", m.anomaly_multiplier),
            ));
        }

        for (path, value) in [
            ("metrics.short_window_days", m.short_window_days),
            ("metrics.long_window_days", m.long_window_days),
            ("metrics.keyword_window_days", m.keyword_window_days),
            ("metrics.max_new_sources", m.max_new_sources),
            ("metrics.max_spikes", m.max_spikes),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }

        for (path, value) in [
            ("metrics.short_window_days", m.short_window_days),
            ("metrics.long_window_days", m.long_window_days),
            ("metrics.keyword_window_days", m.keyword_window_days),
        ] {
            if value > MAX_WINDOW_DAYS {
                errors.push(ValidationError::new(
                    path,
                    format!("Window cannot exceed {} days, got {}", MAX_WINDOW_DAYS, value),
                ));
            }
        }

        if m.short_window_days > m.long_window_days {
            errors.push(ValidationError::new(
                "metrics.short_window_days",
                "Short window cannot be longer than the long window",
            ));
        }
    }

    fn validate_report(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.report.top_sources == 0 {
            errors.push(ValidationError::new("report.top_sources", "Must be greater than 0"));
        }
        if config.report.top_terms == 0 {
            errors.push(ValidationError::new("report.top_terms", "Must be greater than 0"));
        }
    }

    fn validate_ledger(config: &Config, errors: &mut Vec<ValidationError>) {
        let offset = config.ledger.utc_offset_minutes;
        if offset.abs() > MAX_UTC_OFFSET_MINUTES {
            errors.push(ValidationError::new(
                "ledger.utc_offset_minutes",
                format!(
                    "Offset must be within ±{} minutes, got {}",
                    MAX_UTC_OFFSET_MINUTES, offset
                ),
            ));
        }
    }

    fn validate_pipeline(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.pipeline.buffer_size == 0 {
            errors.push(ValidationError::new(
                "pipeline.buffer_size",
                "Buffer size must be greater than 0",
            ));
        }

        let interval = &config.pipeline.flush_interval;
        if parse_duration(interval).map_or(true, |d| d.is_zero()) {
            errors.push(ValidationError::new(
                "pipeline.flush_interval",
                format!("Invalid duration format: {}", interval),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_vocabulary() {
        let mut config = Config::default();
        config.classifier.urgent_terms.clear();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_flush_interval() {
        let mut config = Config::default();
        config.pipeline.flush_interval = "soon".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_day_counts_are_bounded() {
        let mut config = Config::default();
        config.storage.retention_days = 200_000_000;
        config.metrics.keyword_window_days = 100_000_000;
        config.metrics.long_window_days = MAX_WINDOW_DAYS + 1;

        match ConfigValidator::validate(&config) {
            Err(VigiaError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert!(paths.contains(&"storage.retention_days"));
                assert!(paths.contains(&"metrics.keyword_window_days"));
                assert!(paths.contains(&"metrics.long_window_days"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }

        let mut config = Config::default();
        config.storage.retention_days = MAX_WINDOW_DAYS as u32;
        config.metrics.long_window_days = MAX_WINDOW_DAYS;
        config.metrics.keyword_window_days = MAX_WINDOW_DAYS;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_cooldown_upper_bound() {
        let mut config = Config::default();
        config.suppression.cooldown_ms = u64::MAX;
        assert!(ConfigValidator::validate(&config).is_err());

        config.suppression.cooldown_ms = MAX_COOLDOWN_MS;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_overflowing_flush_interval() {
        let mut config = Config::default();
        config.pipeline.flush_interval = "999999999999999999h".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.suppression.cooldown_ms = 0;
        config.metrics.anomaly_multiplier = 0.5;
        config.ledger.utc_offset_minutes = 2000;

        match ConfigValidator::validate(&config) {
            Err(VigiaError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 3);
                assert!(errors.iter().any(|e| e.path == "ledger.utc_offset_minutes"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
