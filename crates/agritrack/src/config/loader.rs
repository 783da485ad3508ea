use std::path::Path;

use crate::config::schema::{Config, CONFIG_VERSION, MAX_WAIT_SECS};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks that cross-field and range constraints hold. Also applied to
/// configs built in code, which never pass through the schema.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.media_root.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "media_root must not be empty".to_string(),
        });
    }

    let threshold = config.detection.acceptance_threshold;
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(ConfigError::Validation {
            message: format!(
                "detection.acceptance_threshold must be in (0, 1), got {}",
                threshold
            ),
        });
    }

    let endpoint = &config.detection.endpoint;
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!("detection.endpoint must be an http(s) URL: {}", endpoint),
        });
    }

    let poll = config.worker.poll_interval_secs;
    if !(poll > 0.0 && poll <= MAX_WAIT_SECS) {
        return Err(ConfigError::Validation {
            message: format!(
                "worker.poll_interval_secs must be in (0, {}], got {}",
                MAX_WAIT_SECS, poll
            ),
        });
    }

    let timeout = config.detection.timeout_secs;
    if !(timeout > 0.0 && timeout <= MAX_WAIT_SECS) {
        return Err(ConfigError::Validation {
            message: format!(
                "detection.timeout_secs must be in (0, {}], got {}",
                MAX_WAIT_SECS, timeout
            ),
        });
    }

    let step = config.progress.step_percent;
    if step == 0 || step > 100 {
        return Err(ConfigError::Validation {
            message: format!("progress.step_percent must be in 1..=100, got {}", step),
        });
    }

    if !(config.tracking.distance_threshold.is_finite() && config.tracking.distance_threshold > 0.0)
    {
        return Err(ConfigError::Validation {
            message: "tracking.distance_threshold must be positive".to_string(),
        });
    }

    if config.tracking.hit_counter_max == 0 {
        return Err(ConfigError::Validation {
            message: "tracking.hit_counter_max must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let config_json = r#"
        {
            "version": "1.0",
            "media_root": "/srv/media"
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.media_root, "/srv/media");
        assert_eq!(config.worker.poll_interval_secs, 2.0);
        assert!(config.worker.recover_interrupted_on_start);
        assert_eq!(config.detection.acceptance_threshold, 0.97);
        assert_eq!(config.detection.label, "Sheep");
        assert_eq!(config.tracking.distance_threshold, 30.0);
        assert_eq!(config.tracking.hit_counter_max, 60);
        assert_eq!(config.tracking.initialization_delay, 3);
        assert_eq!(config.progress.step_percent, 5);
        assert!(config.transcode.enabled);
        assert_eq!(config.transcode.crf, 23);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": "/var/lib/agritrack/jobs.db",
            "media_root": "/srv/media",
            "worker": { "poll_interval_secs": 0.5, "recover_interrupted_on_start": false },
            "detection": {
                "endpoint": "http://inference:9000/v1/detect",
                "acceptance_threshold": 0.95,
                "timeout_secs": 10,
                "label": "Cow"
            },
            "tracking": { "distance_threshold": 45.5, "hit_counter_max": 30, "initialization_delay": 2 },
            "progress": { "step_percent": 10 },
            "transcode": { "enabled": false, "ffmpeg_path": "/opt/ffmpeg/bin/ffmpeg", "crf": 28 },
            "logging": { "level": "debug", "json": true }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(
            config.database_path(),
            Some(std::path::PathBuf::from("/var/lib/agritrack/jobs.db"))
        );
        assert_eq!(config.worker.poll_interval().as_millis(), 500);
        assert_eq!(config.detection.acceptance_threshold, 0.95);
        assert_eq!(config.detection.remote().default_label, "Cow");
        assert_eq!(config.tracking.initialization_delay, 2);
        assert_eq!(config.progress.step_percent, 10);
        assert!(!config.transcode.enabled);
        assert_eq!(config.transcode.settings().crf, 28);
        assert_eq!(config.transcode.settings().preset, "veryfast");
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0", "media_root": "/m" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_missing_media_root() {
        let result = load_config_from_str(r#"{ "version": "1.0" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "media_root": "/m", "workers": 4 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_threshold_out_of_range() {
        for threshold in ["1.0", "0", "1.5", "-0.2"] {
            let json = format!(
                r#"{{ "version": "1.0", "media_root": "/m",
                     "detection": {{ "acceptance_threshold": {} }} }}"#,
                threshold
            );
            assert!(load_config_from_str(&json).is_err(), "{threshold}");
        }
    }

    #[test]
    fn test_semantic_validation_on_built_config() {
        let mut config = Config::with_media_root("/m");
        assert!(validate_config(&config).is_ok());

        config.detection.acceptance_threshold = 1.0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));

        let mut config = Config::with_media_root("/m");
        config.detection.endpoint = "inference:9000".to_string();
        assert!(validate_config(&config).is_err());

        let config = Config::with_media_root("  ");
        assert!(validate_config(&config).is_err());

        let mut config = Config::with_media_root("/m");
        config.progress.step_percent = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_oversized_waits_rejected() {
        let json = r#"{ "version": "1.0", "media_root": "/m", "worker": { "poll_interval_secs": 1e300 } }"#;
        assert!(matches!(
            load_config_from_str(json),
            Err(ConfigError::SchemaValidation { .. })
        ));

        let json = r#"{ "version": "1.0", "media_root": "/m", "detection": { "timeout_secs": 1e300 } }"#;
        assert!(matches!(
            load_config_from_str(json),
            Err(ConfigError::SchemaValidation { .. })
        ));

        let mut config = Config::with_media_root("/m");
        config.worker.poll_interval_secs = 1e300;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));

        let mut config = Config::with_media_root("/m");
        config.detection.timeout_secs = f64::NAN;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_wait_durations_never_panic() {
        let mut config = Config::with_media_root("/m");
        for secs in [1e300, f64::INFINITY, f64::NAN, -5.0, 0.0] {
            config.worker.poll_interval_secs = secs;
            config.detection.timeout_secs = secs;
            let poll = config.worker.poll_interval();
            let timeout = config.detection.remote().timeout;
            assert!(poll >= std::time::Duration::from_millis(1), "{secs}");
            assert!(poll <= std::time::Duration::from_secs(3600), "{secs}");
            assert!(timeout <= std::time::Duration::from_secs(3600), "{secs}");
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            load_config_from_str("{ not json"),
            Err(ConfigError::ParseJson(_))
        ));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/agritrack.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
