//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ServiceConfig, StorageBackend};

/// Smallest modulus accepted for generated keys in production mode.
pub const MIN_PRODUCTION_MODULUS_BITS: usize = 2048;

/// Smallest modulus accepted at all.
pub const MIN_MODULUS_BITS: usize = 1024;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

/// Validate a fully merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &ServiceConfig) -> ConfigResult<()> {
    validate_service(config)?;
    validate_keys(config)?;
    validate_broker(config)?;
    validate_consumer(config)?;
    validate_storage(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_service(config: &ServiceConfig) -> ConfigResult<()> {
    if config.service.bc_name.trim().is_empty() {
        return Err(invalid("service.bc_name", "must not be empty"));
    }
    if config.service.app_name.trim().is_empty() {
        return Err(invalid("service.app_name", "must not be empty"));
    }
    if config.http.port == 0 {
        return Err(invalid("http.port", "must be greater than 0"));
    }
    Ok(())
}

fn validate_keys(config: &ServiceConfig) -> ConfigResult<()> {
    let keys = &config.keys;
    if keys.private_key_path.as_os_str().is_empty() {
        return Err(invalid("keys.private_key_path", "must not be empty"));
    }
    let floor = if config.service.production {
        MIN_PRODUCTION_MODULUS_BITS
    } else {
        MIN_MODULUS_BITS
    };
    if keys.modulus_bits < floor {
        return Err(invalid(
            "keys.modulus_bits",
            format!("{} is below the minimum of {floor}", keys.modulus_bits),
        ));
    }
    Ok(())
}

fn validate_broker(config: &ServiceConfig) -> ConfigResult<()> {
    if let Some(url) = config.broker_url()
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(invalid(
            "broker.url",
            format!("'{url}' is not an http(s) URL"),
        ));
    }
    let logs_topic = config.broker.logs_topic.trim();
    if logs_topic.is_empty() {
        return Err(invalid("broker.logs_topic", "must not be empty"));
    }
    if logs_topic == config.consumer.audits_topic.trim() {
        return Err(invalid(
            "broker.logs_topic",
            "must differ from consumer.audits_topic",
        ));
    }
    Ok(())
}

fn validate_consumer(config: &ServiceConfig) -> ConfigResult<()> {
    let consumer = &config.consumer;
    if consumer.audits_topic.trim().is_empty() {
        return Err(invalid("consumer.audits_topic", "must not be empty"));
    }
    if consumer.batch_size == 0 {
        return Err(invalid("consumer.batch_size", "must be at least 1"));
    }
    if consumer.batch_timeout_ms == 0 {
        return Err(invalid("consumer.batch_timeout_ms", "must be at least 1"));
    }
    Ok(())
}

fn validate_storage(config: &ServiceConfig) -> ConfigResult<()> {
    if config.storage.backend != StorageBackend::Elasticsearch {
        return Ok(());
    }
    let es = &config.storage.elasticsearch;
    if es.url.trim().is_empty() {
        return Err(invalid(
            "storage.elasticsearch.url",
            "required when backend is elasticsearch",
        ));
    }
    if !(es.url.starts_with("http://") || es.url.starts_with("https://")) {
        return Err(invalid(
            "storage.elasticsearch.url",
            format!("'{}' is not an http(s) URL", es.url),
        ));
    }
    if es.index.trim().is_empty() {
        return Err(invalid("storage.elasticsearch.index", "must not be empty"));
    }
    Ok(())
}

fn validate_logging(config: &ServiceConfig) -> ConfigResult<()> {
    let logging = &config.logging;
    if !VALID_LEVELS.contains(&logging.level.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                logging.level,
                VALID_LEVELS.join(", ")
            ),
        ));
    }
    if !VALID_FORMATS.contains(&logging.format.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                logging.format,
                VALID_FORMATS.join(", ")
            ),
        ));
    }
    Ok(())
}
