//! Service lifecycle: ordered startup under a deadline, ordered shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use custody_crypto::CryptoProvider;
use custody_transport::BatchHandler;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{self, ApiState};
use crate::context::AppContext;
use crate::error::{ServerError, ServerResult};

/// How long startup may take before it is abandoned.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Entry point for starting the service.
#[derive(Debug, Clone, Copy)]
pub struct Service;

impl Service {
    /// Start the service with the default [`STARTUP_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// See [`Service::start_with_timeout`].
    pub async fn start(ctx: AppContext, addr: SocketAddr) -> ServerResult<RunningService> {
        Self::start_with_timeout(ctx, addr, STARTUP_TIMEOUT).await
    }

    /// Start every component in order: repository, crypto provider,
    /// aggregate, consumer, HTTP listener.
    ///
    /// On failure or timeout the components already started are released
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns the first component error, [`ServerError::Bind`] if the
    /// listener cannot be bound, or [`ServerError::StartupTimeout`].
    pub async fn start_with_timeout(
        ctx: AppContext,
        addr: SocketAddr,
        timeout: Duration,
    ) -> ServerResult<RunningService> {
        let started = tokio::time::timeout(timeout, start_components(&ctx, addr)).await;
        match started {
            Ok(Ok(http)) => {
                info!(addr = %http.local_addr, key_id = %ctx.aggregate.key_id(), "Auditing service started");
                Ok(RunningService { ctx, http })
            },
            Ok(Err(e)) => {
                error!(error = %e, "Auditing service failed to start");
                stop_consumer(&ctx).await;
                release_backends(&ctx).await;
                Err(e)
            },
            Err(_) => {
                error!(timeout = ?timeout, "Auditing service startup timed out");
                stop_consumer(&ctx).await;
                release_backends(&ctx).await;
                Err(ServerError::StartupTimeout(timeout))
            },
        }
    }
}

struct HttpServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

async fn start_components(ctx: &AppContext, addr: SocketAddr) -> ServerResult<HttpServer> {
    ctx.repo.init().await?;
    info!("Repository ready");

    ctx.crypto.init().await?;
    ctx.aggregate.init()?;

    ctx.consumer.connect().await?;
    let handler: Arc<dyn BatchHandler> = ctx.aggregate.clone();
    ctx.consumer.start(handler).await?;
    info!("Consumer started");

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr, source })?;

    let router = api::router(
        ApiState::new(Arc::clone(&ctx.repo), Arc::clone(&ctx.authorizer))
            .with_ingress(ctx.ingress.clone()),
    );
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
    });
    info!(addr = %local_addr, "Query API listening");
    if let Some(ingress) = &ctx.ingress {
        info!(
            url = %format!("http://{local_addr}/topics"),
            topics = ?ingress.topics(),
            "Hosting broker"
        );
    }

    Ok(HttpServer {
        local_addr,
        shutdown,
        task,
    })
}

async fn stop_consumer(ctx: &AppContext) {
    if let Err(e) = ctx.consumer.stop().await {
        warn!(error = %e, "Error stopping consumer");
    }
    if let Err(e) = ctx.consumer.disconnect().await {
        warn!(error = %e, "Error disconnecting consumer");
    }
    if let Err(e) = ctx.consumer.destroy().await {
        warn!(error = %e, "Error destroying consumer");
    }
}

async fn release_backends(ctx: &AppContext) {
    if let Err(e) = ctx.repo.destroy().await {
        warn!(error = %e, "Error closing repository");
    }
    if let Err(e) = ctx.crypto.destroy().await {
        warn!(error = %e, "Error releasing signing key");
    }
}

/// A started service.
pub struct RunningService {
    ctx: AppContext,
    http: HttpServer,
}

impl RunningService {
    /// Address the query API is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.http.local_addr
    }

    /// The running components.
    #[must_use]
    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Stop consuming (letting the in-flight batch finish), stop the query
    /// API, then release the repository and the signing key.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Http`] if the HTTP server task failed. The
    /// remaining components are released regardless.
    pub async fn shutdown(self) -> ServerResult<()> {
        info!("Shutting down auditing service");
        stop_consumer(&self.ctx).await;

        self.http.shutdown.cancel();
        let http_result = match self.http.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServerError::Http(e.to_string())),
            Err(e) => Err(ServerError::Http(e.to_string())),
        };

        release_backends(&self.ctx).await;
        info!("Auditing service stopped");
        http_result
    }
}

impl std::fmt::Debug for RunningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningService")
            .field("local_addr", &self.http.local_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use custody_crypto::CryptoError;
    use custody_ingest::ServiceIdentity;
    use custody_storage::{AuditRepo, MemoryAuditRepo, StorageError, StorageResult};
    use custody_test::{
        FlakyCryptoProvider, RecordingRepo, message_for, sample_source_entry, sign_source_entry,
        test_crypto_provider,
    };
    use custody_transport::{
        ConsumerOptions, MemoryBroker, MemoryConsumer, MessageConsumer, OutboundMessage,
        TransportResult,
    };
    use custody_types::{AuditSearchResults, SearchFilter, SearchKeywords, SignedCentralAuditEntry};

    use super::*;

    type Journal = Arc<Mutex<Vec<&'static str>>>;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    fn memory_consumer(broker: &MemoryBroker) -> Arc<MemoryConsumer> {
        Arc::new(MemoryConsumer::new(
            broker.clone(),
            "auditing-bc_auditing-svc",
            vec!["audits".to_string()],
            ConsumerOptions {
                batch_size: 10,
                batch_timeout: Duration::from_millis(20),
            },
        ))
    }

    /// Repository that records lifecycle calls and can stall `init`.
    struct JournalRepo {
        journal: Journal,
        stall_init: bool,
        inner: MemoryAuditRepo,
    }

    #[async_trait]
    impl AuditRepo for JournalRepo {
        async fn init(&self) -> StorageResult<()> {
            self.journal.lock().unwrap().push("repo.init");
            if self.stall_init {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn destroy(&self) -> StorageResult<()> {
            self.journal.lock().unwrap().push("repo.destroy");
            Ok(())
        }

        async fn store(&self, entries: &[SignedCentralAuditEntry]) -> StorageResult<usize> {
            self.inner.store(entries).await
        }

        async fn search_entries(&self, filter: &SearchFilter) -> StorageResult<AuditSearchResults> {
            self.inner.search_entries(filter).await
        }

        async fn get_search_keywords(&self) -> Vec<SearchKeywords> {
            self.inner.get_search_keywords().await
        }
    }

    /// Consumer wrapper that records lifecycle calls.
    struct JournalConsumer {
        journal: Journal,
        inner: Arc<MemoryConsumer>,
    }

    #[async_trait]
    impl MessageConsumer for JournalConsumer {
        async fn connect(&self) -> TransportResult<()> {
            self.journal.lock().unwrap().push("consumer.connect");
            self.inner.connect().await
        }

        async fn start(&self, handler: Arc<dyn BatchHandler>) -> TransportResult<()> {
            self.journal.lock().unwrap().push("consumer.start");
            self.inner.start(handler).await
        }

        async fn stop(&self) -> TransportResult<()> {
            self.journal.lock().unwrap().push("consumer.stop");
            self.inner.stop().await
        }

        async fn disconnect(&self) -> TransportResult<()> {
            self.journal.lock().unwrap().push("consumer.disconnect");
            self.inner.disconnect().await
        }

        async fn destroy(&self) -> TransportResult<()> {
            self.journal.lock().unwrap().push("consumer.destroy");
            self.inner.destroy().await
        }
    }

    fn journaled_context(journal: &Journal, stall_init: bool) -> AppContext {
        let broker = MemoryBroker::new();
        AppContext::new(
            ServiceIdentity::new("auditing-svc", "0.0.1"),
            Arc::new(test_crypto_provider()),
            Arc::new(JournalRepo {
                journal: Arc::clone(journal),
                stall_init,
                inner: MemoryAuditRepo::new(),
            }),
            Arc::new(JournalConsumer {
                journal: Arc::clone(journal),
                inner: memory_consumer(&broker),
            }),
        )
    }

    #[tokio::test]
    async fn test_start_and_shutdown_order() {
        let journal: Journal = Arc::default();
        let service = Service::start(journaled_context(&journal, false), loopback())
            .await
            .unwrap();
        assert_ne!(service.local_addr().port(), 0);
        assert_ne!(
            service.context().aggregate.key_id(),
            custody_types::INVALID_SIGNATURE
        );

        service.shutdown().await.unwrap();
        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "repo.init",
                "consumer.connect",
                "consumer.start",
                "consumer.stop",
                "consumer.disconnect",
                "consumer.destroy",
                "repo.destroy",
            ]
        );
    }

    #[tokio::test]
    async fn test_startup_timeout_releases_components() {
        let journal: Journal = Arc::default();
        let result = Service::start_with_timeout(
            journaled_context(&journal, true),
            loopback(),
            Duration::from_millis(50),
        )
        .await;

        assert!(matches!(result, Err(ServerError::StartupTimeout(_))));
        let calls = journal.lock().unwrap().clone();
        assert_eq!(calls.first(), Some(&"repo.init"));
        assert!(!calls.contains(&"consumer.start"));
        assert_eq!(calls.last(), Some(&"repo.destroy"));
    }

    #[tokio::test]
    async fn test_identity_failure_is_fatal() {
        let broker = MemoryBroker::new();
        let crypto = FlakyCryptoProvider::new(test_crypto_provider()).failing_fingerprint();
        let ctx = AppContext::new(
            ServiceIdentity::new("auditing-svc", "0.0.1"),
            Arc::new(crypto),
            Arc::new(RecordingRepo::new()),
            memory_consumer(&broker),
        );

        let result = Service::start(ctx, loopback()).await;
        assert!(matches!(
            result,
            Err(ServerError::Ingest(custody_ingest::IngestError::Identity(
                CryptoError::KeyNotLoaded
            )))
        ));
    }

    #[tokio::test]
    async fn test_repository_init_failure_is_fatal() {
        struct DownRepo;

        #[async_trait]
        impl AuditRepo for DownRepo {
            async fn init(&self) -> StorageResult<()> {
                Err(StorageError::Connection("refused".into()))
            }
            async fn destroy(&self) -> StorageResult<()> {
                Ok(())
            }
            async fn store(&self, _entries: &[SignedCentralAuditEntry]) -> StorageResult<usize> {
                Ok(0)
            }
            async fn search_entries(&self, _filter: &SearchFilter) -> StorageResult<AuditSearchResults> {
                Err(StorageError::Connection("refused".into()))
            }
            async fn get_search_keywords(&self) -> Vec<SearchKeywords> {
                Vec::new()
            }
        }

        let broker = MemoryBroker::new();
        let ctx = AppContext::new(
            ServiceIdentity::new("auditing-svc", "0.0.1"),
            Arc::new(test_crypto_provider()),
            Arc::new(DownRepo),
            memory_consumer(&broker),
        );
        assert!(matches!(
            Service::start(ctx, loopback()).await,
            Err(ServerError::Storage(StorageError::Connection(_)))
        ));
    }

    #[tokio::test]
    async fn test_consumes_published_entries() {
        let broker = MemoryBroker::new();
        let repo = Arc::new(RecordingRepo::new());
        let ctx = AppContext::new(
            ServiceIdentity::new("auditing-svc", "0.0.1"),
            Arc::new(test_crypto_provider()),
            repo.clone(),
            memory_consumer(&broker),
        );
        let service = Service::start(ctx, loopback()).await.unwrap();

        let source = test_crypto_provider();
        source.init().await.unwrap();
        let signed = sign_source_entry(&source, sample_source_entry("u1", "login"));
        let message = message_for(&signed, 0);
        broker.publish(OutboundMessage::new("audits", message.value));

        let mut stored = Vec::new();
        for _ in 0..100 {
            stored = repo.stored();
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        service.shutdown().await.unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id(), signed.id());
        assert!(!stored[0].central.invalid_source_signature);
    }
}
