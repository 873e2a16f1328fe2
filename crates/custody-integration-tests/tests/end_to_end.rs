//! End-to-end tests for the audit pipeline.
//!
//! A source client signs entries and publishes them through the broker,
//! either in-process or over the service's hosted broker routes. The
//! central service consumes, verifies, re-signs and stores them, and the
//! stored entries are read back through the repository and the HTTP query
//! API.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use custody_client::{AuditClient, BrokerDispatcher, DEFAULT_AUDITS_TOPIC, SourceIdentity};
use custody_config::{ServiceConfig, StorageBackend};
use custody_crypto::{AuditCryptoProvider, CryptoError, CryptoProvider, LocalCryptoProvider};
use custody_ingest::ServiceIdentity;
use custody_server::{AppContext, BrokerIngress, RunningService, ServerError, Service};
use custody_storage::{AuditRepo, MemoryAuditRepo};
use custody_test::{
    FlakyCryptoProvider, other_keypair, sample_source_entry, sign_source_entry,
    test_crypto_provider, test_keypair, write_test_key,
};
use custody_transport::{
    ConsumerOptions, HttpConsumer, HttpProducer, MemoryBroker, MemoryConsumer, MemoryProducer,
    MessageProducer, OutboundMessage,
};
use custody_types::{
    AuditEntryId, CanonicalForm, NetworkSource, SearchFilter, SecurityContext,
    SignedCentralAuditEntry,
};
use serde_json::Value;

const SERVICE_APP: &str = "auditing-svc";
const LOGS_TOPIC: &str = "logs";

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn source_client(crypto: LocalCryptoProvider, producer: Arc<dyn MessageProducer>) -> AuditClient {
    AuditClient::new(
        SourceIdentity::new("orders-bc", "orders-api", "1.4.0"),
        Arc::new(crypto),
        Arc::new(BrokerDispatcher::new(producer)),
    )
    .with_network_sources(vec![NetworkSource::from_ip(IpAddr::from([10, 0, 0, 5]))])
}

/// Wait until `repo` holds `count` entries.
async fn wait_for_stored(repo: &dyn AuditRepo, count: usize) -> Vec<SignedCentralAuditEntry> {
    let filter = SearchFilter::default();
    for _ in 0..300 {
        let results = repo.search_entries(&filter).await.unwrap();
        if results.items.len() >= count {
            return results.items;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {count} stored entries");
}

/// A running central service plus a handle on its broker and repository.
struct Pipeline {
    broker: MemoryBroker,
    repo: Arc<MemoryAuditRepo>,
    service: RunningService,
}

impl Pipeline {
    async fn start() -> Self {
        Self::start_with_crypto(Arc::new(test_crypto_provider())).await
    }

    async fn start_with_crypto(crypto: Arc<dyn AuditCryptoProvider>) -> Self {
        let broker = MemoryBroker::new();
        let repo = Arc::new(MemoryAuditRepo::new());
        let consumer = Arc::new(MemoryConsumer::new(
            broker.clone(),
            "auditing-bc_auditing-svc",
            vec![DEFAULT_AUDITS_TOPIC.to_string()],
            ConsumerOptions {
                batch_size: 10,
                batch_timeout: Duration::from_millis(20),
            },
        ));
        let ingress = BrokerIngress::new(
            broker.clone(),
            vec![DEFAULT_AUDITS_TOPIC.to_string(), LOGS_TOPIC.to_string()],
        );
        let ctx = AppContext::new(
            ServiceIdentity::new(SERVICE_APP, "0.0.1"),
            crypto,
            repo.clone(),
            consumer,
        )
        .with_ingress(ingress);
        let service = Service::start(ctx, loopback()).await.unwrap();

        Self {
            broker,
            repo,
            service,
        }
    }

    /// A source client publishing into this pipeline's broker.
    async fn client(&self, crypto: LocalCryptoProvider) -> AuditClient {
        let producer = Arc::new(MemoryProducer::new(self.broker.clone()));
        let client = source_client(crypto, producer);
        client.init().await.unwrap();
        client
    }

    /// A source client in another process, publishing over HTTP.
    async fn remote_client(&self, crypto: LocalCryptoProvider) -> AuditClient {
        let producer = Arc::new(HttpProducer::new(&self.url("")).unwrap());
        let client = source_client(crypto, producer);
        client.init().await.unwrap();
        client
    }

    /// Wait until `count` entries are stored.
    async fn wait_for_entries(&self, count: usize) -> Vec<SignedCentralAuditEntry> {
        wait_for_stored(self.repo.as_ref(), count).await
    }

    fn publish_raw(&self, value: Vec<u8>) {
        self.broker
            .publish(OutboundMessage::new(DEFAULT_AUDITS_TOPIC, value));
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.service.local_addr())
    }
}

fn user(id: &str) -> Option<SecurityContext> {
    Some(SecurityContext::for_user(id))
}

#[tokio::test]
async fn test_audited_action_is_stored_and_countersigned() {
    let pipeline = Pipeline::start().await;
    let client = pipeline.client(test_crypto_provider()).await;

    let id: AuditEntryId = client.audit("login", true, user("u1"), None).await.unwrap();
    let stored = pipeline.wait_for_entries(1).await;

    let results = pipeline
        .repo
        .search_entries(&SearchFilter::default().user("u1").action_type("login"))
        .await
        .unwrap();
    assert_eq!(results.items.len(), 1);
    let entry = &results.items[0];
    assert_eq!(entry, &stored[0]);
    assert_eq!(entry.id(), id);
    assert!(!entry.central.invalid_source_signature);
    assert_eq!(entry.central.auditing_svc_app_name, SERVICE_APP);
    assert_eq!(entry.central.auditing_svc_app_version, "0.0.1");

    let keypair = test_keypair();
    assert_eq!(entry.central.auditing_svc_key_id, keypair.fingerprint());
    assert!(BASE64.decode(&entry.auditing_svc_signature).is_ok());

    let canonical = entry.central.canonical_form().unwrap();
    assert!(keypair.verify(canonical.as_bytes(), &entry.auditing_svc_signature));

    let source = entry.source_entry();
    assert_eq!(source.source_bc_name, "orders-bc");
    assert_eq!(source.source_app_name, "orders-api");
    assert_eq!(source.caller_network_sources.len(), 1);
    assert!(entry.central.persistence_timestamp >= source.action_timestamp);

    client.destroy().await.unwrap();
    pipeline.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_message_does_not_block_batch() {
    let pipeline = Pipeline::start().await;

    let source = test_crypto_provider();
    let good = sign_source_entry(&source, sample_source_entry("u7", "export"));
    pipeline.publish_raw(b"{not json".to_vec());
    pipeline.publish_raw(good.to_json_vec().unwrap());

    let stored = pipeline.wait_for_entries(1).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id(), good.id());
    assert!(!stored[0].central.invalid_source_signature);

    pipeline.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tampered_entry_is_flagged_not_dropped() {
    let pipeline = Pipeline::start().await;

    let source = test_crypto_provider();
    let mut tampered = sign_source_entry(&source, sample_source_entry("u2", "login"));
    tampered.entry.action_type = "delete_everything".to_string();
    pipeline.publish_raw(tampered.to_json_vec().unwrap());

    let stored = pipeline.wait_for_entries(1).await;
    assert!(stored[0].central.invalid_source_signature);
    assert_eq!(stored[0].source_entry().action_type, "delete_everything");
    // Still countersigned by the service.
    assert!(!stored[0].has_sentinel_signature());

    pipeline.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_foreign_key_source_is_flagged() {
    let pipeline = Pipeline::start().await;
    let client = pipeline
        .client(LocalCryptoProvider::from_keypair(other_keypair()))
        .await;

    client.audit("login", false, user("u3"), None).await.unwrap();
    let stored = pipeline.wait_for_entries(1).await;
    assert!(stored[0].central.invalid_source_signature);
    assert_eq!(stored[0].source_entry().source_key_id, other_keypair().fingerprint());

    pipeline.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_signing_failure_stores_sentinel() {
    let crypto = Arc::new(FlakyCryptoProvider::new(test_crypto_provider()).failing_sign());
    let pipeline = Pipeline::start_with_crypto(crypto).await;
    let client = pipeline.client(test_crypto_provider()).await;

    client.audit("login", true, user("u4"), None).await.unwrap();
    let stored = pipeline.wait_for_entries(1).await;
    assert!(stored[0].has_sentinel_signature());
    assert!(!stored[0].central.invalid_source_signature);

    pipeline.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_http_query_api() {
    let pipeline = Pipeline::start().await;
    let client = pipeline.client(test_crypto_provider()).await;

    client.audit("login", true, user("u1"), None).await.unwrap();
    client.audit("logout", true, user("u1"), None).await.unwrap();
    client.audit("login", true, user("u2"), None).await.unwrap();
    pipeline.wait_for_entries(3).await;

    let http = reqwest::Client::new();

    let health: Value = http
        .get(pipeline.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "OK");

    let page: Value = http
        .get(pipeline.url("/entries/?userId=u1&pageSize=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["pageSize"], 1);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["items"][0]["securityContext"]["userId"], "u1");
    assert_eq!(page["items"][0]["invalidSourceSignature"], false);

    let keywords: Value = http
        .get(pipeline.url("/searchKeywords"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let apps = keywords
        .as_array()
        .unwrap()
        .iter()
        .find(|k| k["fieldName"] == "sourceAppName")
        .unwrap();
    assert_eq!(apps["distinctTerms"], serde_json::json!(["orders-api"]));

    let bad = http
        .get(pipeline.url("/entries/?endDate=later"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);

    pipeline.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_releases_signing_key() {
    let crypto = Arc::new(test_crypto_provider());
    let pipeline = Pipeline::start_with_crypto(crypto.clone()).await;
    assert!(crypto.pub_key_fingerprint().is_ok());

    pipeline.service.shutdown().await.unwrap();
    assert!(crypto.pub_key_fingerprint().is_err());
}

#[tokio::test]
async fn test_remote_source_publishes_over_http() {
    let pipeline = Pipeline::start().await;
    let client = pipeline.remote_client(test_crypto_provider()).await;

    let id = client.audit("login", true, user("u5"), None).await.unwrap();
    let stored = pipeline.wait_for_entries(1).await;
    assert_eq!(stored[0].id(), id);
    assert!(!stored[0].central.invalid_source_signature);
    assert_eq!(pipeline.broker.topic_len(DEFAULT_AUDITS_TOPIC), 1);

    client.destroy().await.unwrap();
    pipeline.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_logs_topic_is_hosted_but_not_audited() {
    let pipeline = Pipeline::start().await;
    let producer = HttpProducer::new(&pipeline.url("")).unwrap();
    producer.connect().await.unwrap();
    producer
        .send(vec![OutboundMessage::new(LOGS_TOPIC, b"orders-api started".to_vec())])
        .await
        .unwrap();
    assert_eq!(pipeline.broker.topic_len(LOGS_TOPIC), 1);

    let unknown = producer
        .send(vec![OutboundMessage::new("payments", b"{}".to_vec())])
        .await;
    assert!(unknown.is_err());

    pipeline.service.shutdown().await.unwrap();
    assert!(pipeline.repo.is_empty());
}

#[tokio::test]
async fn test_replica_consumes_from_hosted_broker() {
    let primary = Pipeline::start().await;

    let replica_repo = Arc::new(MemoryAuditRepo::new());
    let consumer = HttpConsumer::new(
        &primary.url(""),
        "auditing-bc_audit-replica",
        vec![DEFAULT_AUDITS_TOPIC.to_string()],
        ConsumerOptions {
            batch_size: 10,
            batch_timeout: Duration::from_millis(20),
        },
    )
    .unwrap()
    .with_poll_wait(Duration::from_millis(50));
    let replica = Service::start(
        AppContext::new(
            ServiceIdentity::new("audit-replica", "0.0.1"),
            Arc::new(LocalCryptoProvider::from_keypair(other_keypair())),
            replica_repo.clone(),
            Arc::new(consumer),
        ),
        loopback(),
    )
    .await
    .unwrap();

    let client = primary.client(test_crypto_provider()).await;
    let id = client.audit("export", true, user("u6"), None).await.unwrap();

    let copies = wait_for_stored(replica_repo.as_ref(), 1).await;
    assert_eq!(copies[0].id(), id);
    assert_eq!(copies[0].central.auditing_svc_app_name, "audit-replica");
    assert_eq!(
        copies[0].central.auditing_svc_key_id,
        other_keypair().fingerprint()
    );
    // Each group gets its own copy.
    assert_eq!(primary.wait_for_entries(1).await[0].id(), id);

    replica.shutdown().await.unwrap();
    primary.service.shutdown().await.unwrap();
}

fn production_config(key_path: std::path::PathBuf) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.service.production = true;
    config.keys.private_key_path = key_path;
    config.storage.backend = StorageBackend::Memory;
    config.consumer.batch_timeout_ms = 20;
    config
}

#[tokio::test]
async fn test_production_service_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = production_config(write_test_key(dir.path()));

    let ctx = AppContext::from_config(&config).unwrap();
    let repo = Arc::clone(&ctx.repo);
    let service = Service::start(ctx, loopback()).await.unwrap();
    assert_eq!(
        service.context().crypto.pub_key_fingerprint().unwrap(),
        test_keypair().fingerprint()
    );

    // No broker URL: sources publish to the service's own HTTP port.
    let producer = Arc::new(HttpProducer::new(&format!("http://{}", service.local_addr())).unwrap());
    let client = source_client(test_crypto_provider(), producer);
    client.init().await.unwrap();
    let id = client.audit("login", true, user("u8"), None).await.unwrap();

    let stored = wait_for_stored(repo.as_ref(), 1).await;
    assert_eq!(stored[0].id(), id);
    assert_eq!(stored[0].central.auditing_svc_key_id, test_keypair().fingerprint());
    assert_eq!(stored[0].central.auditing_svc_app_name, config.service.app_name);

    client.destroy().await.unwrap();
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_production_service_refuses_missing_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.pem");
    let ctx = AppContext::from_config(&production_config(path.clone())).unwrap();

    let result = Service::start(ctx, loopback()).await;
    assert!(matches!(
        result,
        Err(ServerError::Crypto(CryptoError::KeyFileMissing { .. }))
    ));
    assert!(!path.exists());
}
