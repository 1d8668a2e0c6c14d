use std::path::Path;

use crate::config::schema::CoaConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// Environment variables that override file values.
pub const ENV_BATCH_SIZE: &str = "COA_QUEUE_BATCH_SIZE";
pub const ENV_MAX_ATTEMPTS: &str = "COA_MAX_ATTEMPTS";
pub const ENV_DATABASE_PATH: &str = "COA_DATABASE_PATH";
pub const ENV_STORAGE_ROOT: &str = "COA_STORAGE_ROOT";
pub const ENV_PUBLIC_BASE_URL: &str = "COA_PUBLIC_BASE_URL";
pub const ENV_BIND: &str = "COA_BIND";

/// Loads a config file, applies `COA_*` environment overrides and validates
/// the result.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CoaConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_with_env(&content, |name| std::env::var(name).ok())
}

/// Defaults plus `COA_*` environment overrides, for running without a file.
pub fn load_default_config() -> Result<CoaConfig, ConfigError> {
    let mut config = CoaConfig::default();
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parses and validates a config document without consulting the
/// environment.
pub fn load_config_from_str(content: &str) -> Result<CoaConfig, ConfigError> {
    load_config_with_env(content, |_| None)
}

/// Parses a config document and applies overrides from `lookup`.
pub fn load_config_with_env<F>(content: &str, lookup: F) -> Result<CoaConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: CoaConfig = serde_json::from_value(json_value)?;

    apply_env_overrides(&mut config, lookup)?;

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

/// Applies `COA_*` overrides. Blank values are ignored.
pub fn apply_env_overrides<F>(config: &mut CoaConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(value) = get(ENV_BATCH_SIZE) {
        config.batch_size = parse_positive(ENV_BATCH_SIZE, &value)?;
    }
    if let Some(value) = get(ENV_MAX_ATTEMPTS) {
        config.max_attempts = parse_positive(ENV_MAX_ATTEMPTS, &value)?;
    }
    if let Some(value) = get(ENV_DATABASE_PATH) {
        config.database_path = Some(value);
    }
    if let Some(value) = get(ENV_STORAGE_ROOT) {
        config.storage_root = Some(value);
    }
    if let Some(value) = get(ENV_PUBLIC_BASE_URL) {
        config.public_base_url = value;
    }
    if let Some(value) = get(ENV_BIND) {
        config.bind = value;
    }
    Ok(())
}

fn parse_positive(name: &str, value: &str) -> Result<u32, ConfigError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::InvalidOverride {
            name: name.to_string(),
            reason: "must be at least 1".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidOverride {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn validate_config(config: &CoaConfig) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Validation { message });

    if config.version != "1.0" {
        return invalid(format!("Unsupported config version: {}", config.version));
    }
    if config.batch_size == 0 || config.max_batch_size == 0 || config.max_attempts == 0 {
        return invalid("batchSize, maxBatchSize and maxAttempts must be at least 1".to_string());
    }
    if config.batch_size > config.max_batch_size {
        return invalid(format!(
            "batchSize ({}) exceeds maxBatchSize ({})",
            config.batch_size, config.max_batch_size
        ));
    }
    // A drain must finish before its claims can be taken over.
    if config.budget_secs >= config.lease_secs {
        return invalid(format!(
            "budgetSecs ({}) must be below leaseSecs ({})",
            config.budget_secs, config.lease_secs
        ));
    }
    if !(config.public_base_url.starts_with("http://")
        || config.public_base_url.starts_with("https://"))
    {
        return invalid(format!(
            "publicBaseUrl must be an http(s) URL: {}",
            config.public_base_url
        ));
    }
    if config.bucket.is_empty()
        || !config
            .bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return invalid(format!("Invalid bucket name: {}", config.bucket));
    }
    if !config.worker_secret.has_source() || !config.upload_key.has_source() {
        return invalid("workerSecret and uploadKey need a value, file or env source".to_string());
    }

    Ok(())
}
