//! Crypto providers.
//!
//! A provider owns one signing identity for its whole lifetime. Source
//! applications only sign ([`CryptoProvider`]); the central service also
//! verifies what sources sent ([`AuditCryptoProvider`]).

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{CryptoError, CryptoResult};
use crate::keyfile::{create_private_key_file, load_private_key_file};
use crate::keypair::{DEFAULT_MODULUS_BITS, RsaKeyPair};

/// Signing capability shared by sources and the central service.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Establish the signing identity.
    async fn init(&self) -> CryptoResult<()>;

    /// Drop key material. Idempotent.
    async fn destroy(&self) -> CryptoResult<()>;

    /// Fingerprint of the loaded public key.
    fn pub_key_fingerprint(&self) -> CryptoResult<String>;

    /// Sign `data`, returning a base64 signature.
    fn sign(&self, data: &[u8]) -> CryptoResult<String>;
}

/// Verification of source signatures by the central service.
pub trait AuditCryptoProvider: CryptoProvider {
    /// Check a source signature.
    ///
    /// Returns `Ok(false)` when `claimed_key_id` is not this provider's
    /// fingerprint, when the signature does not match, or when it is
    /// malformed. Only an unusable provider is an error.
    fn verify_source_signature(
        &self,
        data: &[u8],
        claimed_key_id: &str,
        signature: &str,
    ) -> CryptoResult<bool>;
}

/// What to do when the key file does not exist at `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingKeyPolicy {
    /// Fail with [`CryptoError::KeyFileMissing`].
    Fail,
    /// Generate a new key file with the given modulus size.
    Generate {
        /// RSA modulus size in bits.
        modulus_bits: usize,
    },
}

impl MissingKeyPolicy {
    /// Production deployments never generate keys.
    #[must_use]
    pub fn for_mode(production: bool, modulus_bits: usize) -> Self {
        if production {
            Self::Fail
        } else {
            Self::Generate { modulus_bits }
        }
    }
}

impl Default for MissingKeyPolicy {
    fn default() -> Self {
        Self::Generate {
            modulus_bits: DEFAULT_MODULUS_BITS,
        }
    }
}

/// File-backed provider used by both sources and the central service.
///
/// Signing takes a cheap `Arc` handle to the key, so `destroy` never
/// pulls the key out from under an in-flight signature.
#[derive(Debug)]
pub struct LocalCryptoProvider {
    key_path: PathBuf,
    policy: MissingKeyPolicy,
    keypair: RwLock<Option<Arc<RsaKeyPair>>>,
}

impl LocalCryptoProvider {
    /// Create a provider for the key at `key_path`.
    #[must_use]
    pub fn new(key_path: impl Into<PathBuf>, policy: MissingKeyPolicy) -> Self {
        Self {
            key_path: key_path.into(),
            policy,
            keypair: RwLock::new(None),
        }
    }

    /// Wrap an already loaded key pair.
    #[must_use]
    pub fn from_keypair(keypair: RsaKeyPair) -> Self {
        Self {
            key_path: PathBuf::new(),
            policy: MissingKeyPolicy::Fail,
            keypair: RwLock::new(Some(Arc::new(keypair))),
        }
    }

    /// The configured key path.
    #[must_use]
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    fn current(&self) -> CryptoResult<Arc<RsaKeyPair>> {
        self.keypair
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CryptoError::KeyNotLoaded)
    }

    fn load_blocking(path: &Path, policy: MissingKeyPolicy) -> CryptoResult<RsaKeyPair> {
        match (load_private_key_file(path), policy) {
            (Err(CryptoError::KeyFileMissing { .. }), MissingKeyPolicy::Generate { modulus_bits }) => {
                tracing::warn!(
                    path = %path.display(),
                    "Private key file not found, generating a new one"
                );
                match create_private_key_file(path, modulus_bits) {
                    Ok(keypair) => Ok(keypair),
                    // Lost a creation race; the other writer's key wins.
                    Err(CryptoError::IoError(_)) if path.exists() => load_private_key_file(path),
                    Err(e) => Err(e),
                }
            },
            (other, _) => other,
        }
    }
}

#[async_trait]
impl CryptoProvider for LocalCryptoProvider {
    async fn init(&self) -> CryptoResult<()> {
        if self.current().is_ok() {
            return Ok(());
        }

        let path = self.key_path.clone();
        let policy = self.policy;
        let keypair = tokio::task::spawn_blocking(move || Self::load_blocking(&path, policy))
            .await
            .map_err(|e| CryptoError::IoError(format!("key loading task failed: {e}")))??;

        tracing::info!(
            path = %self.key_path.display(),
            fingerprint = keypair.fingerprint(),
            "Loaded signing key"
        );
        *self.keypair.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(keypair));
        Ok(())
    }

    async fn destroy(&self) -> CryptoResult<()> {
        let previous = self
            .keypair
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::debug!("Signing key released");
        }
        Ok(())
    }

    fn pub_key_fingerprint(&self) -> CryptoResult<String> {
        Ok(self.current()?.fingerprint().to_string())
    }

    fn sign(&self, data: &[u8]) -> CryptoResult<String> {
        self.current()?.sign(data)
    }
}

impl AuditCryptoProvider for LocalCryptoProvider {
    fn verify_source_signature(
        &self,
        data: &[u8],
        claimed_key_id: &str,
        signature: &str,
    ) -> CryptoResult<bool> {
        let keypair = self.current()?;
        if claimed_key_id != keypair.fingerprint() {
            tracing::debug!(
                claimed_key_id,
                own_key_id = keypair.fingerprint(),
                "Source key id does not match ours"
            );
            return Ok(false);
        }
        Ok(keypair.verify(data, signature))
    }
}
