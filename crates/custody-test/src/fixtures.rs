//! Test fixtures for audit envelopes and transport messages.

use std::collections::BTreeMap;

use custody_crypto::CryptoProvider;
use custody_transport::RawMessage;
use custody_types::{
    AuditEntryLabel, CanonicalForm, CentralAuditEntry, SecurityContext, SignedCentralAuditEntry,
    SignedSourceAuditEntry, SourceAuditEntry,
};

/// Bounded context used by fixtures.
pub const TEST_BC_NAME: &str = "test-bc";

/// Application name used by fixtures.
pub const TEST_APP_NAME: &str = "test-app";

/// An unsigned entry for `user_id` performing `action_type`.
#[must_use]
pub fn sample_source_entry(user_id: &str, action_type: &str) -> SourceAuditEntry {
    SourceAuditEntry::builder(TEST_BC_NAME, TEST_APP_NAME, "0.0.1")
        .action(action_type, true)
        .security_context(SecurityContext::for_user(user_id).with_role("tester"))
        .label(AuditEntryLabel::new("origin", "fixture"))
        .build()
}

/// Stamp the provider's key id on `entry` and sign it.
#[must_use]
pub fn sign_source_entry(
    crypto: &dyn CryptoProvider,
    mut entry: SourceAuditEntry,
) -> SignedSourceAuditEntry {
    entry.source_key_id = crypto.pub_key_fingerprint().expect("fingerprint");
    let canonical = entry.canonical_form().expect("canonical form");
    let signature = crypto.sign(canonical.as_bytes()).expect("sign");
    entry.into_signed(signature)
}

/// A stored central entry for `user_id`, acted and persisted at `timestamp`.
///
/// Signatures are placeholders; use this for repository and query tests.
#[must_use]
pub fn sample_central_entry(
    user_id: &str,
    action_type: &str,
    timestamp: i64,
) -> SignedCentralAuditEntry {
    let mut source = sample_source_entry(user_id, action_type);
    source.action_timestamp = timestamp;
    CentralAuditEntry {
        source: source.into_signed("c291cmNl"),
        invalid_source_signature: false,
        persistence_timestamp: timestamp,
        auditing_svc_app_name: "auditing-svc".to_string(),
        auditing_svc_app_version: "0.0.1".to_string(),
        auditing_svc_key_id: "00".repeat(32),
    }
    .into_signed("Y2VudHJhbA==")
}

/// A transport message carrying `entry`, at `offset` on the `audits` topic.
#[must_use]
pub fn message_for(entry: &SignedSourceAuditEntry, offset: i64) -> RawMessage {
    raw_message(entry.to_json_vec().expect("encode entry"), offset)
}

/// A transport message with an arbitrary payload.
#[must_use]
pub fn raw_message(value: Vec<u8>, offset: i64) -> RawMessage {
    RawMessage {
        topic: "audits".to_string(),
        key: None,
        value,
        timestamp: 0,
        partition: 0,
        offset,
        headers: BTreeMap::new(),
    }
}

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
