//! Application context: the assembled service components.

use std::sync::Arc;

use custody_config::{ServiceConfig, StorageBackend};
use custody_crypto::{AuditCryptoProvider, LocalCryptoProvider, MissingKeyPolicy};
use custody_ingest::{AuditingAggregate, ServiceIdentity};
use custody_storage::{AuditRepo, ElasticsearchAuditRepo, ElasticsearchConfig, MemoryAuditRepo};
use custody_transport::{
    ConsumerOptions, HttpConsumer, MemoryBroker, MemoryConsumer, MessageConsumer,
};
use tracing::{info, warn};

use crate::api::BrokerIngress;
use crate::auth::{AllowAll, RequestAuthorizer};
use crate::error::ServerResult;

/// Version stamped on central entries as `auditingSvcAppVersion`.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the service runs on, shared by the consume loop and the
/// query routes.
#[derive(Clone)]
pub struct AppContext {
    /// Service signing key.
    pub crypto: Arc<dyn AuditCryptoProvider>,
    /// Central entry repository.
    pub repo: Arc<dyn AuditRepo>,
    /// Consumer feeding the aggregate.
    pub consumer: Arc<dyn MessageConsumer>,
    /// Ingestion pipeline.
    pub aggregate: Arc<AuditingAggregate>,
    /// Query route authorization.
    pub authorizer: Arc<dyn RequestAuthorizer>,
    /// Broker hosted on the HTTP port, if the service hosts one.
    pub ingress: Option<BrokerIngress>,
}

impl AppContext {
    /// Assemble a context from parts. Authorization defaults to [`AllowAll`].
    #[must_use]
    pub fn new(
        identity: ServiceIdentity,
        crypto: Arc<dyn AuditCryptoProvider>,
        repo: Arc<dyn AuditRepo>,
        consumer: Arc<dyn MessageConsumer>,
    ) -> Self {
        let aggregate = Arc::new(AuditingAggregate::new(
            identity,
            Arc::clone(&crypto),
            Arc::clone(&repo),
        ));
        Self {
            crypto,
            repo,
            consumer,
            aggregate,
            authorizer: Arc::new(AllowAll),
            ingress: None,
        }
    }

    /// Replace the query route authorizer.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn RequestAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Host `ingress` on the HTTP port.
    #[must_use]
    pub fn with_ingress(mut self, ingress: BrokerIngress) -> Self {
        self.ingress = Some(ingress);
        self
    }

    /// Assemble the context described by `config`.
    ///
    /// With `broker.url` set the service consumes from that remote broker.
    /// Otherwise it hosts a broker for the audits and logs topics on its
    /// own HTTP port and consumes from that.
    ///
    /// Nothing is connected or loaded yet; that happens in
    /// [`Service::start`](crate::Service::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the repository or broker client cannot be built.
    pub fn from_config(config: &ServiceConfig) -> ServerResult<Self> {
        let policy = MissingKeyPolicy::for_mode(config.service.production, config.keys.modulus_bits);
        let crypto = Arc::new(LocalCryptoProvider::new(
            config.keys.private_key_path.clone(),
            policy,
        ));

        let repo = build_repo(config)?;

        let group_id = config.consumer_group_id();
        let topics = vec![config.consumer.audits_topic.clone()];
        let options = ConsumerOptions {
            batch_size: config.consumer.batch_size,
            batch_timeout: config.consumer.batch_timeout(),
        };
        let (consumer, ingress): (Arc<dyn MessageConsumer>, Option<BrokerIngress>) =
            match config.broker_url() {
                Some(url) => {
                    info!(broker = %url, "Consuming from remote broker");
                    let consumer = HttpConsumer::new(url, group_id.clone(), topics, options)?;
                    (Arc::new(consumer), None)
                },
                None => {
                    let broker = MemoryBroker::new();
                    let hosted = config.hosted_topics();
                    warn!(
                        port = config.http.port,
                        topics = ?hosted,
                        "No broker URL configured, hosting the broker at /topics on the HTTP port"
                    );
                    let consumer =
                        MemoryConsumer::new(broker.clone(), group_id.clone(), topics, options);
                    (Arc::new(consumer), Some(BrokerIngress::new(broker, hosted)))
                },
            };

        info!(
            app_name = %config.service.app_name,
            group_id = %group_id,
            topic = %config.consumer.audits_topic,
            backend = ?config.storage.backend,
            production = config.service.production,
            "Assembled service context"
        );

        let ctx = Self::new(
            ServiceIdentity::new(config.service.app_name.clone(), SERVICE_VERSION),
            crypto,
            repo,
            consumer,
        );
        Ok(match ingress {
            Some(ingress) => ctx.with_ingress(ingress),
            None => ctx,
        })
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("aggregate", &self.aggregate)
            .finish_non_exhaustive()
    }
}

fn build_repo(config: &ServiceConfig) -> ServerResult<Arc<dyn AuditRepo>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryAuditRepo::new())),
        StorageBackend::Elasticsearch => {
            let es = &config.storage.elasticsearch;
            let repo = ElasticsearchAuditRepo::new(ElasticsearchConfig {
                url: es.url.clone(),
                index: es.index.clone(),
                username: es.username.clone(),
                password: es.password.clone(),
                ca_cert_path: es.ca_cert_path.clone(),
                request_timeout: es.request_timeout(),
            })?;
            Ok(Arc::new(repo))
        },
    }
}

#[cfg(test)]
mod tests {
    use custody_storage::StorageError;

    use super::*;
    use crate::error::ServerError;

    fn memory_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config
    }

    #[test]
    fn test_from_config_memory_backend() {
        let ctx = AppContext::from_config(&memory_config()).unwrap();
        // Not initialized yet.
        assert_eq!(ctx.aggregate.key_id(), custody_types::INVALID_SIGNATURE);
    }

    #[test]
    fn test_from_config_elasticsearch_backend() {
        let config = ServiceConfig::default();
        assert!(AppContext::from_config(&config).is_ok());
    }

    #[test]
    fn test_hosts_broker_without_url() {
        let mut config = memory_config();
        config.broker.logs_topic = "app-logs".into();
        let ctx = AppContext::from_config(&config).unwrap();
        let ingress = ctx.ingress.unwrap();
        assert_eq!(ingress.topics(), ["audits", "app-logs"]);
    }

    #[test]
    fn test_remote_broker_url_skips_hosting() {
        let mut config = memory_config();
        config.broker.url = Some("http://broker.internal:3050".into());
        let ctx = AppContext::from_config(&config).unwrap();
        assert!(ctx.ingress.is_none());
    }

    #[test]
    fn test_bad_ca_cert_fails_assembly() {
        let mut config = ServiceConfig::default();
        config.storage.elasticsearch.ca_cert_path = Some("/nonexistent/ca.pem".into());
        assert!(matches!(
            AppContext::from_config(&config),
            Err(ServerError::Storage(StorageError::Config(_)))
        ));
    }
}
