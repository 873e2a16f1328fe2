//! Mock implementations for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use custody_crypto::{
    AuditCryptoProvider, CryptoError, CryptoProvider, CryptoResult, LocalCryptoProvider,
};
use custody_storage::{AuditRepo, MemoryAuditRepo, StorageError, StorageResult};
use custody_types::{AuditSearchResults, SearchFilter, SearchKeywords, SignedCentralAuditEntry};

/// Crypto provider wrapper with switchable failures.
///
/// Failing operations return [`CryptoError::KeyNotLoaded`] (fingerprint),
/// [`CryptoError::Signing`] (sign) and [`CryptoError::KeyNotLoaded`]
/// (verify). Flags can be flipped while the provider is shared.
#[derive(Debug)]
pub struct FlakyCryptoProvider {
    inner: LocalCryptoProvider,
    fail_fingerprint: AtomicBool,
    fail_sign: AtomicBool,
    fail_verify: AtomicBool,
    sign_calls: AtomicUsize,
}

impl FlakyCryptoProvider {
    /// Wrap `inner`; nothing fails until configured.
    #[must_use]
    pub fn new(inner: LocalCryptoProvider) -> Self {
        Self {
            inner,
            fail_fingerprint: AtomicBool::new(false),
            fail_sign: AtomicBool::new(false),
            fail_verify: AtomicBool::new(false),
            sign_calls: AtomicUsize::new(0),
        }
    }

    /// Make `pub_key_fingerprint` fail.
    #[must_use]
    pub fn failing_fingerprint(self) -> Self {
        self.fail_fingerprint.store(true, Ordering::SeqCst);
        self
    }

    /// Make `sign` fail.
    #[must_use]
    pub fn failing_sign(self) -> Self {
        self.fail_sign.store(true, Ordering::SeqCst);
        self
    }

    /// Make `verify_source_signature` fail.
    #[must_use]
    pub fn failing_verify(self) -> Self {
        self.fail_verify.store(true, Ordering::SeqCst);
        self
    }

    /// Toggle signing failures at runtime.
    pub fn set_fail_sign(&self, fail: bool) {
        self.fail_sign.store(fail, Ordering::SeqCst);
    }

    /// Toggle verification failures at runtime.
    pub fn set_fail_verify(&self, fail: bool) {
        self.fail_verify.store(fail, Ordering::SeqCst);
    }

    /// Number of `sign` calls, failed or not.
    #[must_use]
    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CryptoProvider for FlakyCryptoProvider {
    async fn init(&self) -> CryptoResult<()> {
        self.inner.init().await
    }

    async fn destroy(&self) -> CryptoResult<()> {
        self.inner.destroy().await
    }

    fn pub_key_fingerprint(&self) -> CryptoResult<String> {
        if self.fail_fingerprint.load(Ordering::SeqCst) {
            return Err(CryptoError::KeyNotLoaded);
        }
        self.inner.pub_key_fingerprint()
    }

    fn sign(&self, data: &[u8]) -> CryptoResult<String> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign.load(Ordering::SeqCst) {
            return Err(CryptoError::Signing("injected failure".into()));
        }
        self.inner.sign(data)
    }
}

impl AuditCryptoProvider for FlakyCryptoProvider {
    fn verify_source_signature(
        &self,
        data: &[u8],
        claimed_key_id: &str,
        signature: &str,
    ) -> CryptoResult<bool> {
        if self.fail_verify.load(Ordering::SeqCst) {
            return Err(CryptoError::KeyNotLoaded);
        }
        self.inner
            .verify_source_signature(data, claimed_key_id, signature)
    }
}

/// Repository that records every `store` batch.
///
/// Searches are answered by an inner [`MemoryAuditRepo`] holding everything
/// successfully stored.
#[derive(Debug, Clone, Default)]
pub struct RecordingRepo {
    inner: Arc<MemoryAuditRepo>,
    batches: Arc<Mutex<Vec<Vec<SignedCentralAuditEntry>>>>,
    fail_store: Arc<AtomicBool>,
}

impl RecordingRepo {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `store` call fail (after recording the batch).
    #[must_use]
    pub fn failing_store(self) -> Self {
        self.fail_store.store(true, Ordering::SeqCst);
        self
    }

    /// Number of `store` calls.
    #[must_use]
    pub fn store_calls(&self) -> usize {
        self.batches.lock().map_or(0, |b| b.len())
    }

    /// Every batch passed to `store`, in call order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<SignedCentralAuditEntry>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// All entries passed to `store`, flattened.
    #[must_use]
    pub fn stored(&self) -> Vec<SignedCentralAuditEntry> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl AuditRepo for RecordingRepo {
    async fn init(&self) -> StorageResult<()> {
        self.inner.init().await
    }

    async fn destroy(&self) -> StorageResult<()> {
        self.inner.destroy().await
    }

    async fn store(&self, entries: &[SignedCentralAuditEntry]) -> StorageResult<usize> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(entries.to_vec());
        }
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("injected failure".into()));
        }
        self.inner.store(entries).await
    }

    async fn search_entries(&self, filter: &SearchFilter) -> StorageResult<AuditSearchResults> {
        self.inner.search_entries(filter).await
    }

    async fn get_search_keywords(&self) -> Vec<SearchKeywords> {
        self.inner.get_search_keywords().await
    }
}
