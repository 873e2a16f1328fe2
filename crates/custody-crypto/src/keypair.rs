//! RSA key pairs with a cached public-key fingerprint.
//!
//! Signatures are RSASSA-PKCS1-v1_5 over SHA-256, base64 encoded with the
//! standard padded alphabet. The fingerprint is the lowercase hex SHA-256
//! digest of the DER `SubjectPublicKeyInfo`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature as RsaSignature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Modulus size used when none is configured.
pub const DEFAULT_MODULUS_BITS: usize = 2048;

/// Smallest modulus [`RsaKeyPair::generate`] accepts.
pub const MIN_MODULUS_BITS: usize = 1024;

/// An RSA signing identity.
///
/// The private key is zeroized on drop by the `rsa` crate.
pub struct RsaKeyPair {
    private_key: RsaPrivateKey,
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
    fingerprint: String,
}

impl RsaKeyPair {
    /// Generate a new random key pair.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyGeneration`] if `modulus_bits` is below
    /// [`MIN_MODULUS_BITS`] or the RNG fails.
    pub fn generate(modulus_bits: usize) -> CryptoResult<Self> {
        if modulus_bits < MIN_MODULUS_BITS {
            return Err(CryptoError::KeyGeneration(format!(
                "modulus of {modulus_bits} bits is below the minimum of {MIN_MODULUS_BITS}"
            )));
        }
        let private_key = RsaPrivateKey::new(&mut OsRng, modulus_bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Self::from_private_key(private_key)
    }

    /// Parse a PEM-encoded PKCS#8 private key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyLoad`] (with an empty path) if the PEM is
    /// not a PKCS#8 RSA private key.
    pub fn from_pkcs8_pem(pem: &str) -> CryptoResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::KeyLoad {
            path: std::path::PathBuf::new(),
            reason: e.to_string(),
        })?;
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: RsaPrivateKey) -> CryptoResult<Self> {
        let public_key = RsaPublicKey::from(&private_key);
        let der = public_key
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let fingerprint = hex::encode(Sha256::digest(der.as_bytes()));

        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(private_key.clone()),
            verifying_key: VerifyingKey::<Sha256>::new(public_key),
            private_key,
            fingerprint,
        })
    }

    /// Encode the private key as PKCS#8 PEM (careful - sensitive!).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyGeneration`] if encoding fails.
    pub fn to_pkcs8_pem(&self) -> CryptoResult<Zeroizing<String>> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))
    }

    /// Lowercase hex SHA-256 of the DER public key.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Sign `data` and return the base64 signature.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Signing`] if the key cannot sign.
    pub fn sign(&self, data: &[u8]) -> CryptoResult<String> {
        let signature = self
            .signing_key
            .try_sign(data)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(STANDARD.encode(signature.to_bytes()))
    }

    /// Check a base64 signature over `data` against this key.
    ///
    /// Undecodable or wrongly sized signatures are reported as `false`.
    #[must_use]
    pub fn verify(&self, data: &[u8], signature_b64: &str) -> bool {
        let Ok(bytes) = STANDARD.decode(signature_b64) else {
            return false;
        };
        let Ok(signature) = RsaSignature::try_from(bytes.as_slice()) else {
            return false;
        };
        self.verifying_key.verify(data, &signature).is_ok()
    }
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}
