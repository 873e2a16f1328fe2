//! The source-side audit client.

use std::sync::Arc;

use custody_crypto::CryptoProvider;
use custody_types::{
    AuditEntryId, AuditEntryLabel, CanonicalForm, NetworkSource, SecurityContext,
    SourceAuditEntry,
};
use tracing::{debug, info};

use crate::dispatcher::AuditDispatcher;
use crate::error::{ClientError, ClientResult};
use crate::network::local_network_sources;

/// Fixed identity stamped on every entry a source emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    /// Bounded context name.
    pub bc_name: String,
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
}

impl SourceIdentity {
    /// Create an identity.
    #[must_use]
    pub fn new(
        bc_name: impl Into<String>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            bc_name: bc_name.into(),
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

/// Builds, signs and dispatches audit entries.
pub struct AuditClient {
    identity: SourceIdentity,
    crypto: Arc<dyn CryptoProvider>,
    dispatcher: Arc<dyn AuditDispatcher>,
    network_sources: Vec<NetworkSource>,
}

impl AuditClient {
    /// Create a client. The host network snapshot is taken once, here.
    #[must_use]
    pub fn new(
        identity: SourceIdentity,
        crypto: Arc<dyn CryptoProvider>,
        dispatcher: Arc<dyn AuditDispatcher>,
    ) -> Self {
        Self {
            identity,
            crypto,
            dispatcher,
            network_sources: local_network_sources(),
        }
    }

    /// Replace the captured network snapshot.
    #[must_use]
    pub fn with_network_sources(mut self, sources: Vec<NetworkSource>) -> Self {
        self.network_sources = sources;
        self
    }

    /// The captured network snapshot.
    #[must_use]
    pub fn network_sources(&self) -> &[NetworkSource] {
        &self.network_sources
    }

    /// Initialize the crypto provider, then the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns the first initialization failure.
    pub async fn init(&self) -> ClientResult<()> {
        self.crypto.init().await?;
        self.dispatcher.init().await?;
        info!(
            bc_name = %self.identity.bc_name,
            app_name = %self.identity.app_name,
            "Audit client initialized"
        );
        Ok(())
    }

    /// Destroy the dispatcher, then the crypto provider.
    ///
    /// # Errors
    ///
    /// Returns the first shutdown failure.
    pub async fn destroy(&self) -> ClientResult<()> {
        self.dispatcher.destroy().await?;
        self.crypto.destroy().await?;
        Ok(())
    }

    /// Record an action.
    ///
    /// A missing security context is sent with every field null and
    /// missing labels as an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SigningUnavailable`] if the fingerprint or the
    /// signature cannot be obtained, and [`ClientError::Dispatch`] if the
    /// transport rejects the entry.
    pub async fn audit(
        &self,
        action_type: &str,
        action_successful: bool,
        security_context: Option<SecurityContext>,
        labels: Option<Vec<AuditEntryLabel>>,
    ) -> ClientResult<AuditEntryId> {
        let key_id = self
            .crypto
            .pub_key_fingerprint()
            .map_err(ClientError::SigningUnavailable)?;

        let entry = SourceAuditEntry::builder(
            &self.identity.bc_name,
            &self.identity.app_name,
            &self.identity.app_version,
        )
        .action(action_type, action_successful)
        .security_context(security_context.unwrap_or_default())
        .network_sources(self.network_sources.clone())
        .labels(labels.unwrap_or_default())
        .source_key_id(key_id)
        .build();

        let canonical = entry.canonical_form()?;
        let signature = self
            .crypto
            .sign(canonical.as_bytes())
            .map_err(ClientError::SigningUnavailable)?;

        let signed = entry.into_signed(signature);
        let id = signed.id();
        self.dispatcher.dispatch(vec![signed]).await?;

        debug!(entry_id = %id, action_type, "Audit entry dispatched");
        Ok(id)
    }
}

impl std::fmt::Debug for AuditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditClient")
            .field("identity", &self.identity)
            .field("network_sources", &self.network_sources.len())
            .finish_non_exhaustive()
    }
}
