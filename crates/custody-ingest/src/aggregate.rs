//! The auditing aggregate.
//!
//! Every inbound message is handled on its own: a malformed payload is
//! skipped, a bad source signature is flagged, a failed central signature
//! becomes the sentinel. None of these stop the rest of the batch. The
//! surviving entries are stored with a single repository call.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use custody_crypto::{AuditCryptoProvider, CryptoProvider};
use custody_storage::AuditRepo;
use custody_transport::{BatchHandler, RawMessage};
use custody_types::{
    CanonicalForm, CentralAuditEntry, INVALID_SIGNATURE, SignedCentralAuditEntry,
    SignedSourceAuditEntry, epoch_millis_now,
};
use tracing::{debug, error, info, warn};

use crate::error::{IngestError, IngestResult};

/// Provenance stamped on every central entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    /// Central service application name.
    pub app_name: String,
    /// Central service application version.
    pub app_version: String,
}

impl ServiceIdentity {
    /// Create an identity.
    #[must_use]
    pub fn new(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

/// What happened to one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Messages received.
    pub received: usize,
    /// Messages skipped because they did not decode.
    pub malformed: usize,
    /// Entries flagged with `invalidSourceSignature`.
    pub invalid_source_signatures: usize,
    /// Entries carrying the sentinel central signature.
    pub sentinel_signed: usize,
    /// Entries the repository accepted.
    pub stored: usize,
    /// Whether the `store` call failed.
    pub storage_failed: bool,
}

/// Verifies, stamps, re-signs and stores inbound source entries.
///
/// Stateless beyond the cached key id; batches may be processed
/// concurrently.
pub struct AuditingAggregate {
    identity: ServiceIdentity,
    crypto: Arc<dyn AuditCryptoProvider>,
    repo: Arc<dyn AuditRepo>,
    key_id: OnceLock<String>,
}

impl AuditingAggregate {
    /// Create an aggregate. Call [`init`](Self::init) before processing.
    #[must_use]
    pub fn new(
        identity: ServiceIdentity,
        crypto: Arc<dyn AuditCryptoProvider>,
        repo: Arc<dyn AuditRepo>,
    ) -> Self {
        Self {
            identity,
            crypto,
            repo,
            key_id: OnceLock::new(),
        }
    }

    /// Cache the service key fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Identity`] if the fingerprint is unavailable.
    pub fn init(&self) -> IngestResult<()> {
        let key_id = self
            .crypto
            .pub_key_fingerprint()
            .map_err(IngestError::Identity)?;
        info!(key_id = %key_id, app_name = %self.identity.app_name, "Auditing aggregate initialized");
        let _ = self.key_id.set(key_id);
        Ok(())
    }

    /// The cached service key id, or the sentinel before `init`.
    #[must_use]
    pub fn key_id(&self) -> &str {
        self.key_id.get().map_or(INVALID_SIGNATURE, String::as_str)
    }

    /// Process one batch of transport messages.
    pub async fn process_messages(&self, messages: Vec<RawMessage>) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            received: messages.len(),
            ..BatchOutcome::default()
        };

        let mut entries = Vec::with_capacity(messages.len());
        for message in &messages {
            let signed = match decode(message) {
                Ok(signed) => signed,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed audit message");
                    outcome.malformed = outcome.malformed.saturating_add(1);
                    continue;
                },
            };

            let entry = self.process_entry(signed);
            if entry.central.invalid_source_signature {
                outcome.invalid_source_signatures =
                    outcome.invalid_source_signatures.saturating_add(1);
            }
            if entry.has_sentinel_signature() {
                outcome.sentinel_signed = outcome.sentinel_signed.saturating_add(1);
            }
            entries.push(entry);
        }

        if !entries.is_empty() {
            match self.repo.store(&entries).await {
                Ok(stored) => outcome.stored = stored,
                Err(e) => {
                    let e = IngestError::from(e);
                    error!(error = %e, count = entries.len(), "Failed to store audit entries");
                    outcome.storage_failed = true;
                },
            }
        }

        debug!(
            received = outcome.received,
            malformed = outcome.malformed,
            invalid_source_signatures = outcome.invalid_source_signatures,
            sentinel_signed = outcome.sentinel_signed,
            stored = outcome.stored,
            storage_failed = outcome.storage_failed,
            "Processed audit batch"
        );
        outcome
    }

    /// Verify, stamp and sign one source entry. Never fails.
    #[must_use]
    pub fn process_entry(&self, signed: SignedSourceAuditEntry) -> SignedCentralAuditEntry {
        let entry_id = signed.id();
        let source_valid = match self.verify_source(&signed) {
            Ok(true) => true,
            Ok(false) => {
                warn!(entry_id = %entry_id, key_id = %signed.entry.source_key_id, "Invalid source signature");
                false
            },
            Err(e) => {
                warn!(entry_id = %entry_id, error = %e, "Could not verify source signature");
                false
            },
        };

        let central = CentralAuditEntry {
            source: signed,
            invalid_source_signature: !source_valid,
            persistence_timestamp: epoch_millis_now(),
            auditing_svc_app_name: self.identity.app_name.clone(),
            auditing_svc_app_version: self.identity.app_version.clone(),
            auditing_svc_key_id: self.key_id().to_string(),
        };

        let signature = self.sign_central(&central).unwrap_or_else(|e| {
            error!(entry_id = %entry_id, error = %e, "Storing entry with sentinel signature");
            INVALID_SIGNATURE.to_string()
        });
        central.into_signed(signature)
    }

    fn verify_source(&self, signed: &SignedSourceAuditEntry) -> IngestResult<bool> {
        let canonical = signed
            .entry
            .canonical_form()
            .map_err(|e| IngestError::Verification(e.to_string()))?;
        self.crypto
            .verify_source_signature(
                canonical.as_bytes(),
                &signed.entry.source_key_id,
                &signed.source_signature,
            )
            .map_err(|e| IngestError::Verification(e.to_string()))
    }

    fn sign_central(&self, central: &CentralAuditEntry) -> IngestResult<String> {
        let canonical = central
            .canonical_form()
            .map_err(|e| IngestError::Signing(e.to_string()))?;
        self.crypto
            .sign(canonical.as_bytes())
            .map_err(|e| IngestError::Signing(e.to_string()))
    }
}

fn decode(message: &RawMessage) -> IngestResult<SignedSourceAuditEntry> {
    SignedSourceAuditEntry::from_json_slice(&message.value).map_err(|e| {
        IngestError::MalformedMessage {
            topic: message.topic.clone(),
            offset: message.offset,
            reason: e.to_string(),
        }
    })
}

impl std::fmt::Debug for AuditingAggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditingAggregate")
            .field("identity", &self.identity)
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BatchHandler for AuditingAggregate {
    async fn handle_batch(&self, messages: Vec<RawMessage>) {
        self.process_messages(messages).await;
    }
}

#[cfg(test)]
mod tests {
    use custody_crypto::LocalCryptoProvider;
    use custody_test::{
        FlakyCryptoProvider, RecordingRepo, message_for, other_keypair, raw_message,
        sample_source_entry, sign_source_entry, test_crypto_provider,
    };
    use custody_types::SearchFilter;

    use super::*;

    /// Swap one base64 character for another valid one.
    fn tamper(signature: &str) -> String {
        let mut chars: Vec<char> = signature.chars().collect();
        chars[5] = if chars[5] == 'A' { 'B' } else { 'A' };
        chars.into_iter().collect()
    }

    fn aggregate(
        crypto: Arc<dyn AuditCryptoProvider>,
        repo: Arc<dyn AuditRepo>,
    ) -> AuditingAggregate {
        let agg = AuditingAggregate::new(ServiceIdentity::new("auditing-svc", "0.1.1"), crypto, repo);
        agg.init().unwrap();
        agg
    }

    #[tokio::test]
    async fn test_valid_entry_is_stamped_and_signed() {
        let crypto = Arc::new(test_crypto_provider());
        let repo = RecordingRepo::new();
        let agg = aggregate(crypto.clone(), Arc::new(repo.clone()));

        let signed = sign_source_entry(crypto.as_ref(), sample_source_entry("u1", "login"));
        let outcome = agg.process_messages(vec![message_for(&signed, 0)]).await;

        assert_eq!(outcome.received, 1);
        assert_eq!(outcome.stored, 1);
        assert_eq!(outcome.invalid_source_signatures, 0);

        let stored = &repo.stored()[0];
        assert!(!stored.central.invalid_source_signature);
        assert_eq!(stored.central.source, signed);
        assert_eq!(stored.central.auditing_svc_app_name, "auditing-svc");
        assert_eq!(stored.central.auditing_svc_key_id, crypto.pub_key_fingerprint().unwrap());

        // The central signature covers everything but itself.
        let canonical = stored.central.canonical_form().unwrap();
        assert!(
            crypto
                .verify_source_signature(
                    canonical.as_bytes(),
                    &stored.central.auditing_svc_key_id,
                    &stored.auditing_svc_signature
                )
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_batch_isolation_malformed_skipped() {
        let crypto = Arc::new(test_crypto_provider());
        let repo = RecordingRepo::new();
        let agg = aggregate(crypto.clone(), Arc::new(repo.clone()));

        let mut messages: Vec<_> = (0..4)
            .map(|i| {
                let signed =
                    sign_source_entry(crypto.as_ref(), sample_source_entry(&format!("u{i}"), "login"));
                message_for(&signed, i)
            })
            .collect();
        messages.insert(2, raw_message(b"{\"not\":\"an entry\"}".to_vec(), 99));

        let outcome = agg.process_messages(messages).await;
        assert_eq!(outcome.received, 5);
        assert_eq!(outcome.malformed, 1);
        assert_eq!(repo.store_calls(), 1);
        assert_eq!(repo.batches()[0].len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_source_signature_still_centrally_signed() {
        let crypto = Arc::new(test_crypto_provider());
        let repo = RecordingRepo::new();
        let agg = aggregate(crypto.clone(), Arc::new(repo.clone()));

        let mut signed = sign_source_entry(crypto.as_ref(), sample_source_entry("u1", "login"));
        signed.source_signature = tamper(&signed.source_signature);

        let outcome = agg.process_messages(vec![message_for(&signed, 0)]).await;
        assert_eq!(outcome.invalid_source_signatures, 1);
        assert_eq!(outcome.sentinel_signed, 0);

        let stored = &repo.stored()[0];
        assert!(stored.central.invalid_source_signature);
        assert_eq!(stored.central.source.source_signature, signed.source_signature);
        assert!(!stored.has_sentinel_signature());
    }

    #[tokio::test]
    async fn test_tampered_field_is_flagged() {
        let crypto = Arc::new(test_crypto_provider());
        let repo = RecordingRepo::new();
        let agg = aggregate(crypto.clone(), Arc::new(repo.clone()));

        let mut signed = sign_source_entry(crypto.as_ref(), sample_source_entry("u1", "login"));
        signed.entry.action_successful = false;

        agg.process_messages(vec![message_for(&signed, 0)]).await;
        assert!(repo.stored()[0].central.invalid_source_signature);
    }

    #[tokio::test]
    async fn test_foreign_key_is_flagged() {
        let foreign = LocalCryptoProvider::from_keypair(other_keypair());
        let repo = RecordingRepo::new();
        let agg = aggregate(Arc::new(test_crypto_provider()), Arc::new(repo.clone()));

        let signed = sign_source_entry(&foreign, sample_source_entry("u1", "login"));
        agg.process_messages(vec![message_for(&signed, 0)]).await;
        assert!(repo.stored()[0].central.invalid_source_signature);
    }

    #[tokio::test]
    async fn test_verification_error_is_flagged_not_fatal() {
        let crypto = Arc::new(FlakyCryptoProvider::new(test_crypto_provider()).failing_verify());
        let repo = RecordingRepo::new();
        let agg = aggregate(crypto.clone(), Arc::new(repo.clone()));

        let signed = sign_source_entry(crypto.as_ref(), sample_source_entry("u1", "login"));
        let outcome = agg.process_messages(vec![message_for(&signed, 0)]).await;

        assert_eq!(outcome.stored, 1);
        assert!(repo.stored()[0].central.invalid_source_signature);
        assert!(!repo.stored()[0].has_sentinel_signature());
    }

    #[tokio::test]
    async fn test_sentinel_on_central_signing_failure() {
        let crypto = Arc::new(FlakyCryptoProvider::new(test_crypto_provider()));
        let repo = RecordingRepo::new();
        let agg = aggregate(crypto.clone(), Arc::new(repo.clone()));

        let signed = sign_source_entry(crypto.as_ref(), sample_source_entry("u1", "login"));
        crypto.set_fail_sign(true);

        let outcome = agg.process_messages(vec![message_for(&signed, 0)]).await;
        assert_eq!(outcome.sentinel_signed, 1);
        assert_eq!(outcome.stored, 1);

        let stored = &repo.stored()[0];
        assert_eq!(stored.auditing_svc_signature, "INVALID");
        assert!(!stored.central.invalid_source_signature);
    }

    #[tokio::test]
    async fn test_storage_failure_is_absorbed() {
        let crypto = Arc::new(test_crypto_provider());
        let repo = RecordingRepo::new().failing_store();
        let agg = aggregate(crypto.clone(), Arc::new(repo.clone()));

        let signed = sign_source_entry(crypto.as_ref(), sample_source_entry("u1", "login"));
        let outcome = agg.process_messages(vec![message_for(&signed, 0)]).await;

        assert!(outcome.storage_failed);
        assert_eq!(outcome.stored, 0);
        assert_eq!(repo.store_calls(), 1);
        let page = repo.search_entries(&SearchFilter::default()).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_all_malformed_skips_store() {
        let repo = RecordingRepo::new();
        let agg = aggregate(Arc::new(test_crypto_provider()), Arc::new(repo.clone()));

        let outcome = agg
            .process_messages(vec![raw_message(b"garbage".to_vec(), 0)])
            .await;
        assert_eq!(outcome.malformed, 1);
        assert_eq!(repo.store_calls(), 0);
    }

    #[tokio::test]
    async fn test_init_fails_without_identity() {
        let crypto = Arc::new(FlakyCryptoProvider::new(test_crypto_provider()).failing_fingerprint());
        let agg = AuditingAggregate::new(
            ServiceIdentity::new("auditing-svc", "0.1.1"),
            crypto,
            Arc::new(RecordingRepo::new()),
        );
        assert!(matches!(agg.init(), Err(IngestError::Identity(_))));
        assert_eq!(agg.key_id(), INVALID_SIGNATURE);
    }

    #[tokio::test]
    async fn test_stored_json_is_flat() {
        let crypto = Arc::new(test_crypto_provider());
        let repo = RecordingRepo::new();
        let agg = aggregate(crypto.clone(), Arc::new(repo.clone()));

        let signed = sign_source_entry(crypto.as_ref(), sample_source_entry("u1", "login"));
        agg.process_messages(vec![message_for(&signed, 0)]).await;

        let json = serde_json::to_value(&repo.stored()[0]).unwrap();
        for field in [
            "id",
            "sourceSignature",
            "invalidSourceSignature",
            "persistenceTimestamp",
            "auditingSvcKeyId",
            "auditingSvcSignature",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }
}
