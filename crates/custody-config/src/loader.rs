//! Layered configuration loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge the config file (explicit path, else `CUSTODY_CONFIG`), if any
//! 3. Apply environment variable overrides
//! 4. Deserialize the merged tree into [`ServiceConfig`]
//! 5. Validate

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{CONFIG_PATH_VAR, apply_env_overrides};
use crate::error::{ConfigError, ConfigResult};
use crate::types::ServiceConfig;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// A loaded configuration and where its values came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The validated configuration.
    pub config: ServiceConfig,
    /// Config file merged over the defaults, if any.
    pub loaded_file: Option<PathBuf>,
    /// Number of environment variables applied.
    pub env_overrides: usize,
}

/// Load the configuration.
///
/// `config_path` takes precedence over `CUSTODY_CONFIG` in `env_vars`. A
/// named file that does not exist is an error.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, an
/// environment value is malformed, or the result fails validation.
pub fn load<S: BuildHasher>(
    config_path: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let file = config_path
        .map(Path::to_path_buf)
        .or_else(|| env_vars.get(CONFIG_PATH_VAR).map(PathBuf::from));
    if let Some(path) = &file {
        let overlay = read_file(path)?;
        deep_merge(&mut merged, &overlay);
        info!(path = %path.display(), "loaded config file");
    }

    let env_overrides = apply_env_overrides(&mut merged, env_vars)?;
    if env_overrides > 0 {
        debug!(count = env_overrides, "applied environment variable overrides");
    }

    let config: ServiceConfig =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        loaded_file: file,
        env_overrides,
    })
}

/// Load a single file over the defaults, ignoring the environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or validated.
pub fn load_file(path: &Path) -> ConfigResult<ServiceConfig> {
    let env: HashMap<String, String> = HashMap::new();
    load(Some(path), &env).map(|resolved| resolved.config)
}

fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Recursively merge `overlay` into `base`. Tables merge per key; scalars
/// and arrays replace.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::types::StorageBackend;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_match_default_impl() {
        let config: ServiceConfig = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_load_defaults_only() {
        let resolved = load(None, &no_env()).unwrap();
        let config = resolved.config;
        assert!(resolved.loaded_file.is_none());
        assert_eq!(resolved.env_overrides, 0);

        assert_eq!(config.service.bc_name, "auditing-bc");
        assert_eq!(config.service.app_name, "auditing-svc");
        assert_eq!(config.http.port, 3050);
        assert_eq!(config.consumer.audits_topic, "audits");
        assert_eq!(config.consumer_group_id(), "auditing-bc_auditing-svc");
        assert_eq!(config.storage.elasticsearch.index, "ml-auditing");
        assert_eq!(
            config.keys.private_key_path,
            PathBuf::from("/app/data/audit_private_key.pem")
        );
        assert!(!config.service.production);
        assert_eq!(config.broker_url(), None);
        assert_eq!(config.hosted_topics(), vec!["audits", "logs"]);
    }

    #[test]
    fn test_broker_address_from_env() {
        let vars = env(&[
            ("KAFKA_URL", "http://broker.internal:3050"),
            ("KAFKA_LOGS_TOPIC", "app-logs"),
        ]);
        let resolved = load(None, &vars).unwrap();
        assert_eq!(resolved.env_overrides, 2);
        assert_eq!(
            resolved.config.broker_url(),
            Some("http://broker.internal:3050")
        );
        assert_eq!(resolved.config.hosted_topics(), vec!["audits", "app-logs"]);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
            [service]
            app_name = "audit-central"

            [storage]
            backend = "memory"
            "#,
        );
        let resolved = load(Some(file.path()), &no_env()).unwrap();
        assert_eq!(resolved.loaded_file.as_deref(), Some(file.path()));
        assert_eq!(resolved.config.service.app_name, "audit-central");
        assert_eq!(resolved.config.service.bc_name, "auditing-bc");
        assert_eq!(resolved.config.storage.backend, StorageBackend::Memory);
        assert_eq!(resolved.config.consumer_group_id(), "auditing-bc_audit-central");
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config("[http]\nport = 4000\n");
        let vars = env(&[
            ("SVC_DEFAULT_HTTP_PORT", "5000"),
            ("KAFKA_GROUP_ID", "custom-group"),
            ("AUDIT_STORAGE_BACKEND", "memory"),
            ("ELASTICSEARCH_PASSWORD", "s3cret"),
        ]);
        let resolved = load(Some(file.path()), &vars).unwrap();
        assert_eq!(resolved.env_overrides, 4);
        assert_eq!(resolved.config.http.port, 5000);
        assert_eq!(resolved.config.consumer_group_id(), "custom-group");
        assert_eq!(resolved.config.storage.backend, StorageBackend::Memory);
        assert_eq!(
            resolved.config.storage.elasticsearch.password.as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn test_config_path_from_env() {
        let file = write_config("[consumer]\nbatch_size = 7\n");
        let vars = env(&[("CUSTODY_CONFIG", file.path().to_str().unwrap())]);
        let resolved = load(None, &vars).unwrap();
        assert_eq!(resolved.config.consumer.batch_size, 7);
    }

    #[test]
    fn test_missing_named_file_is_read_error() {
        let result = load(Some(Path::new("/nonexistent/custody.toml")), &no_env());
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let file = write_config("[http\nport = ");
        assert!(matches!(
            load_file(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let file = write_config("[http]\nport = \"high\"\n");
        assert!(matches!(
            load_file(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let vars = env(&[("AUDIT_STORAGE_BACKEND", "mongo")]);
        assert!(matches!(load(None, &vars), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_validation_runs_after_overrides() {
        let vars = env(&[("PRODUCTION_MODE", "true"), ("AUDIT_KEY_MODULUS_BITS", "1024")]);
        assert!(matches!(
            load(None, &vars),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "keys.modulus_bits"
        ));
    }

    #[test]
    fn test_deep_merge_keeps_sibling_keys() {
        let mut base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n[b]\nz = true\n").unwrap();
        deep_merge(&mut base, &overlay);
        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
        assert_eq!(base["b"]["z"].as_bool(), Some(true));
    }
}
