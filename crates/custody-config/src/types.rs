//! Configuration types for the auditing service.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header in TOML produces a working
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

/// Root configuration for the auditing service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service identity and mode.
    pub service: ServiceSection,
    /// HTTP query surface.
    pub http: HttpSection,
    /// Signing key material.
    pub keys: KeysSection,
    /// Message broker location and hosted topics.
    pub broker: BrokerSection,
    /// Message consumption.
    pub consumer: ConsumerSection,
    /// Central entry persistence.
    pub storage: StorageSection,
    /// Log level, format and per-crate directives.
    pub logging: LoggingSection,
}

impl ServiceConfig {
    /// Consumer group id, falling back to `"{bc_name}_{app_name}"`.
    #[must_use]
    pub fn consumer_group_id(&self) -> String {
        match &self.consumer.group_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("{}_{}", self.service.bc_name, self.service.app_name),
        }
    }

    /// Remote broker URL, if one is configured.
    #[must_use]
    pub fn broker_url(&self) -> Option<&str> {
        self.broker
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Topics a hosted broker accepts: audits, then logs.
    #[must_use]
    pub fn hosted_topics(&self) -> Vec<String> {
        vec![
            self.consumer.audits_topic.clone(),
            self.broker.logs_topic.clone(),
        ]
    }
}

/// Service identity stamped on every central entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Bounded-context name of the auditing service.
    pub bc_name: String,
    /// Application name of the auditing service.
    pub app_name: String,
    /// Production mode: a missing key file is fatal instead of generated.
    pub production: bool,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            bc_name: "auditing-bc".to_owned(),
            app_name: "auditing-svc".to_owned(),
            production: false,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// TCP port for the query API.
    pub port: u16,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self { port: 3050 }
    }
}

/// Private key location and generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysSection {
    /// PEM PKCS#8 private key file.
    pub private_key_path: PathBuf,
    /// Modulus size used when a key has to be generated.
    pub modulus_bits: usize,
}

impl Default for KeysSection {
    fn default() -> Self {
        Self {
            private_key_path: PathBuf::from("/app/data/audit_private_key.pem"),
            modulus_bits: 2048,
        }
    }
}

/// Message broker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    /// Base URL of a remote broker. Unset means the service hosts one.
    pub url: Option<String>,
    /// Topic carrying source application logs.
    pub logs_topic: String,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: None,
            logs_topic: "logs".to_owned(),
        }
    }
}

/// Message consumer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSection {
    /// Consumer group id. See [`ServiceConfig::consumer_group_id`].
    pub group_id: Option<String>,
    /// Topic carrying signed source entries.
    pub audits_topic: String,
    /// Maximum messages handed to the aggregate at once.
    pub batch_size: usize,
    /// Longest wait for a batch to fill, in milliseconds.
    pub batch_timeout_ms: u64,
}

impl ConsumerSection {
    /// Batch timeout as a [`Duration`].
    #[must_use]
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self {
            group_id: None,
            audits_topic: "audits".to_owned(),
            batch_size: 100,
            batch_timeout_ms: 1000,
        }
    }
}

/// Which repository implementation backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Elasticsearch over its REST API.
    #[default]
    Elasticsearch,
    /// Process memory; entries are lost on restart.
    Memory,
}

/// Persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Selected backend.
    pub backend: StorageBackend,
    /// Elasticsearch connection, used when `backend = "elasticsearch"`.
    pub elasticsearch: ElasticsearchSection,
}

/// Elasticsearch connection settings.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElasticsearchSection {
    /// Base URL.
    pub url: String,
    /// Index holding central entries.
    pub index: String,
    /// Basic-auth user.
    pub username: Option<String>,
    /// Basic-auth password. Never serialized.
    pub password: Option<String>,
    /// Extra PEM CA certificate to trust.
    pub ca_cert_path: Option<PathBuf>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl ElasticsearchSection {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ElasticsearchSection {
    fn default() -> Self {
        Self {
            url: "https://localhost:9200".to_owned(),
            index: "ml-auditing".to_owned(),
            username: Some("elastic".to_owned()),
            password: None,
            ca_cert_path: None,
            request_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for ElasticsearchSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchSection")
            .field("url", &self.url)
            .field("index", &self.index)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("ca_cert_path", &self.ca_cert_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Serialize for ElasticsearchSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ElasticsearchSection", 5)?;
        state.serialize_field("url", &self.url)?;
        state.serialize_field("index", &self.index)?;
        state.serialize_field("username", &self.username)?;
        state.serialize_field("ca_cert_path", &self.ca_cert_path)?;
        state.serialize_field("request_timeout_secs", &self.request_timeout_secs)?;
        state.end()
    }
}

/// Logging settings, mirrored into the telemetry crate at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// Output format: `pretty`, `compact` or `json`.
    pub format: String,
    /// Extra filter directives such as `custody_ingest=debug`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}
