//! Source-side audit entries.
//!
//! A source application builds a [`SourceAuditEntry`], fills in the
//! fingerprint of its signing key, signs the canonical form and ships the
//! resulting [`SignedSourceAuditEntry`] to the central service.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TypesError, TypesResult};

/// Current wall-clock time as epoch milliseconds.
#[must_use]
pub fn epoch_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Unique audit entry identifier, generated by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntryId(pub Uuid);

impl AuditEntryId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address family of an observed network source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    /// IPv4 address.
    #[serde(rename = "IPv4")]
    Ipv4,
    /// IPv6 address.
    #[serde(rename = "IPv6")]
    Ipv6,
}

/// A network address observed on the source host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSource {
    /// Address family.
    pub family: AddressFamily,
    /// Textual address.
    pub address: String,
}

impl NetworkSource {
    /// Build a network source from an IP address.
    #[must_use]
    pub fn from_ip(ip: IpAddr) -> Self {
        let family = match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        };
        Self {
            family,
            address: ip.to_string(),
        }
    }
}

/// The principal that triggered an audited action.
///
/// Every field is always serialized, `None` as an explicit `null`, so the
/// canonical form does not depend on which fields happen to be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    /// User principal, when the action was made by a user.
    pub user_id: Option<String>,
    /// Application principal, when the action was made by an app.
    pub app_id: Option<String>,
    /// Role that permitted the action.
    pub role: Option<String>,
}

impl SecurityContext {
    /// Context for an action made by a user.
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Context for an action made by an application.
    #[must_use]
    pub fn for_app(app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            ..Self::default()
        }
    }

    /// Attach the permitting role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// An opaque key/value annotation on an audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryLabel {
    /// Label key.
    pub key: String,
    /// Label value.
    pub value: String,
    /// Key id the value is encrypted with. Carried only, never acted upon.
    pub encryption_key_id: Option<String>,
}

impl AuditEntryLabel {
    /// Create a plain (unencrypted) label.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            encryption_key_id: None,
        }
    }
}

/// The unsigned record a source application creates.
///
/// Field order is part of the wire contract: it is the order of the
/// canonical form that gets signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAuditEntry {
    /// Globally unique identifier.
    pub id: AuditEntryId,
    /// When the action happened (epoch ms, source clock).
    pub action_timestamp: i64,
    /// Originating bounded context.
    pub source_bc_name: String,
    /// Originating application.
    pub source_app_name: String,
    /// Originating application version.
    pub source_app_version: String,
    /// Fingerprint of the key that signs this entry.
    pub source_key_id: String,
    /// Non-loopback addresses of the source host.
    pub caller_network_sources: Vec<NetworkSource>,
    /// Principal that triggered the action.
    pub security_context: SecurityContext,
    /// Action executed, scoped per originating component.
    pub action_type: String,
    /// Whether the audited action succeeded.
    pub action_successful: bool,
    /// Additional annotations.
    pub labels: Vec<AuditEntryLabel>,
}

impl SourceAuditEntry {
    /// Start building an entry for the given source identity.
    #[must_use]
    pub fn builder(
        bc_name: impl Into<String>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> SourceEntryBuilder {
        SourceEntryBuilder::new(bc_name, app_name, app_version)
    }

    /// Attach a source signature.
    #[must_use]
    pub fn into_signed(self, source_signature: impl Into<String>) -> SignedSourceAuditEntry {
        SignedSourceAuditEntry {
            entry: self,
            source_signature: source_signature.into(),
        }
    }
}

/// Builder for [`SourceAuditEntry`].
///
/// Fills in a fresh id and the current timestamp; `source_key_id` starts
/// empty and is set by the signer.
#[derive(Debug, Clone)]
pub struct SourceEntryBuilder {
    entry: SourceAuditEntry,
}

impl SourceEntryBuilder {
    fn new(
        bc_name: impl Into<String>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            entry: SourceAuditEntry {
                id: AuditEntryId::new(),
                action_timestamp: epoch_millis_now(),
                source_bc_name: bc_name.into(),
                source_app_name: app_name.into(),
                source_app_version: app_version.into(),
                source_key_id: String::new(),
                caller_network_sources: Vec::new(),
                security_context: SecurityContext::default(),
                action_type: String::new(),
                action_successful: false,
                labels: Vec::new(),
            },
        }
    }

    /// Set the action type and outcome.
    #[must_use]
    pub fn action(mut self, action_type: impl Into<String>, successful: bool) -> Self {
        self.entry.action_type = action_type.into();
        self.entry.action_successful = successful;
        self
    }

    /// Override the generated id.
    #[must_use]
    pub fn id(mut self, id: AuditEntryId) -> Self {
        self.entry.id = id;
        self
    }

    /// Override the action timestamp.
    #[must_use]
    pub fn action_timestamp(mut self, millis: i64) -> Self {
        self.entry.action_timestamp = millis;
        self
    }

    /// Set the security context.
    #[must_use]
    pub fn security_context(mut self, ctx: SecurityContext) -> Self {
        self.entry.security_context = ctx;
        self
    }

    /// Set the caller network sources.
    #[must_use]
    pub fn network_sources(mut self, sources: Vec<NetworkSource>) -> Self {
        self.entry.caller_network_sources = sources;
        self
    }

    /// Replace the labels.
    #[must_use]
    pub fn labels(mut self, labels: Vec<AuditEntryLabel>) -> Self {
        self.entry.labels = labels;
        self
    }

    /// Append one label.
    #[must_use]
    pub fn label(mut self, label: AuditEntryLabel) -> Self {
        self.entry.labels.push(label);
        self
    }

    /// Set the signing key fingerprint.
    #[must_use]
    pub fn source_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.entry.source_key_id = key_id.into();
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> SourceAuditEntry {
        self.entry
    }
}

/// A source entry plus the source application's signature.
///
/// This is the transport payload: one JSON object per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedSourceAuditEntry {
    /// The signed entry.
    #[serde(flatten)]
    pub entry: SourceAuditEntry,
    /// Base64 signature over the entry's canonical form.
    pub source_signature: String,
}

impl SignedSourceAuditEntry {
    /// Decode a transport payload.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::Malformed`] if the bytes are not a signed
    /// source entry.
    pub fn from_json_slice(bytes: &[u8]) -> TypesResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| TypesError::Malformed(e.to_string()))
    }

    /// Encode as a transport payload.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::Serialization`] if encoding fails.
    pub fn to_json_vec(&self) -> TypesResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| TypesError::Serialization(e.to_string()))
    }

    /// The entry id.
    #[must_use]
    pub fn id(&self) -> AuditEntryId {
        self.entry.id
    }
}
