//! Environment variable overrides.
//!
//! Each supported variable maps to one dotted field path. A set variable
//! replaces whatever the defaults or the config file put there.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming an optional config file.
pub const CONFIG_PATH_VAR: &str = "CUSTODY_CONFIG";

#[derive(Debug, Clone, Copy)]
enum ValueKind {
    Str,
    Int,
    Bool,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: ValueKind,
}

const fn var(var_name: &'static str, field_path: &'static str, kind: ValueKind) -> EnvMapping {
    EnvMapping {
        var_name,
        field_path,
        kind,
    }
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    var("PRODUCTION_MODE", "service.production", ValueKind::Bool),
    var("LOG_LEVEL", "logging.level", ValueKind::Str),
    var("LOG_FORMAT", "logging.format", ValueKind::Str),
    var("SVC_DEFAULT_HTTP_PORT", "http.port", ValueKind::Int),
    var("AUDIT_KEY_FILE_PATH", "keys.private_key_path", ValueKind::Str),
    var("AUDIT_KEY_MODULUS_BITS", "keys.modulus_bits", ValueKind::Int),
    var("KAFKA_URL", "broker.url", ValueKind::Str),
    var("KAFKA_LOGS_TOPIC", "broker.logs_topic", ValueKind::Str),
    var("KAFKA_GROUP_ID", "consumer.group_id", ValueKind::Str),
    var("KAFKA_AUDITS_TOPIC", "consumer.audits_topic", ValueKind::Str),
    var("CONSUMER_BATCH_SIZE", "consumer.batch_size", ValueKind::Int),
    var("CONSUMER_BATCH_TIMEOUT_MS", "consumer.batch_timeout_ms", ValueKind::Int),
    var("AUDIT_STORAGE_BACKEND", "storage.backend", ValueKind::Str),
    var("ELASTICSEARCH_URL", "storage.elasticsearch.url", ValueKind::Str),
    var("ELASTICSEARCH_AUDITS_INDEX", "storage.elasticsearch.index", ValueKind::Str),
    var("ELASTICSEARCH_USERNAME", "storage.elasticsearch.username", ValueKind::Str),
    var("ELASTICSEARCH_PASSWORD", "storage.elasticsearch.password", ValueKind::Str),
    var("ELASTICSEARCH_CA_CERT_PATH", "storage.elasticsearch.ca_cert_path", ValueKind::Str),
];

/// Apply every set environment variable to the merged tree.
///
/// Returns the number of overrides applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] when a numeric or boolean variable does
/// not parse.
pub fn apply_env_overrides<S: BuildHasher>(
    merged: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;
    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let value = coerce(mapping, raw.trim())?;
        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var override"
        );
        set_field(merged, mapping.field_path, value);
        count = count.saturating_add(1);
    }
    Ok(count)
}

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    let invalid = |expected: &str| ConfigError::EnvError {
        var_name: mapping.var_name.to_owned(),
        message: format!("expected {expected}, got '{raw}'"),
    };
    match mapping.kind {
        ValueKind::Str => Ok(toml::Value::String(raw.to_owned())),
        ValueKind::Int => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|_| invalid("an integer")),
        ValueKind::Bool => parse_bool(raw)
            .map(toml::Value::Boolean)
            .ok_or_else(|| invalid("a boolean")),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Set a dotted path, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment)
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }
    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
