//! Cached signing keys.
//!
//! RSA generation is slow, so each test process generates its keys once
//! and hands out fresh parses of the cached PEM.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use custody_crypto::{DEFAULT_MODULUS_BITS, LocalCryptoProvider, RsaKeyPair};

fn cached_pem(cell: &'static OnceLock<String>) -> &'static str {
    cell.get_or_init(|| {
        let keypair = RsaKeyPair::generate(DEFAULT_MODULUS_BITS).expect("generate test key");
        keypair.to_pkcs8_pem().expect("encode test key").to_string()
    })
}

/// PEM of the shared test key.
#[must_use]
pub fn test_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    cached_pem(&PEM)
}

/// PEM of a second key, distinct from [`test_pem`].
#[must_use]
pub fn other_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    cached_pem(&PEM)
}

/// The shared test key pair.
#[must_use]
pub fn test_keypair() -> RsaKeyPair {
    RsaKeyPair::from_pkcs8_pem(test_pem()).expect("parse test key")
}

/// A key pair different from [`test_keypair`].
#[must_use]
pub fn other_keypair() -> RsaKeyPair {
    RsaKeyPair::from_pkcs8_pem(other_pem()).expect("parse other key")
}

/// An initialized provider holding the shared test key.
#[must_use]
pub fn test_crypto_provider() -> LocalCryptoProvider {
    LocalCryptoProvider::from_keypair(test_keypair())
}

/// Write the shared test key to `dir/audit_private_key.pem`.
#[must_use]
pub fn write_test_key(dir: &Path) -> PathBuf {
    let path = dir.join("audit_private_key.pem");
    std::fs::write(&path, test_pem()).expect("write test key");
    path
}
