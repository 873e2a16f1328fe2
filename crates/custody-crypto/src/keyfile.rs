//! Private key files.
//!
//! Key files hold a single PEM-encoded PKCS#8 RSA private key.
//!
//! # Security
//!
//! - On Unix, new files are created with `O_CREAT | O_EXCL` and mode 0o600,
//!   so there is no world-readable window and an existing key is never
//!   overwritten.
//! - Symlinked key paths are refused on read.
//! - Read buffers are wrapped in `Zeroizing` so key material is cleared.

use std::io::Write;
use std::path::Path;

use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::keypair::RsaKeyPair;

/// Generate a key pair and persist it at `path`.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`CryptoError::KeyGeneration`] if generation fails, or
/// [`CryptoError::IoError`] if the file exists or cannot be written.
pub fn create_private_key_file(path: impl AsRef<Path>, modulus_bits: usize) -> CryptoResult<RsaKeyPair> {
    let path = path.as_ref();
    let keypair = RsaKeyPair::generate(modulus_bits)?;
    let pem = keypair.to_pkcs8_pem()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CryptoError::IoError(e.to_string()))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| {
        CryptoError::IoError(format!("cannot create key file {}: {e}", path.display()))
    })?;
    file.write_all(pem.as_bytes())
        .map_err(|e| CryptoError::IoError(e.to_string()))?;
    file.sync_all()
        .map_err(|e| CryptoError::IoError(e.to_string()))?;

    tracing::info!(
        path = %path.display(),
        fingerprint = keypair.fingerprint(),
        modulus_bits,
        "Created private key file"
    );
    Ok(keypair)
}

/// Load a key pair from `path`.
///
/// # Errors
///
/// Returns [`CryptoError::KeyFileMissing`] if nothing exists at `path`, and
/// [`CryptoError::KeyLoad`] if the path is a symlink or does not hold a
/// PKCS#8 RSA private key.
pub fn load_private_key_file(path: impl AsRef<Path>) -> CryptoResult<RsaKeyPair> {
    let path = path.as_ref();
    let load_err = |reason: String| CryptoError::KeyLoad {
        path: path.to_path_buf(),
        reason,
    };

    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CryptoError::KeyFileMissing {
                path: path.to_path_buf(),
            });
        },
        Err(e) => return Err(load_err(e.to_string())),
    };
    if meta.file_type().is_symlink() {
        return Err(load_err("refusing to read key file: path is a symlink".into()));
    }

    let pem = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?);
    RsaKeyPair::from_pkcs8_pem(&pem).map_err(|e| match e {
        CryptoError::KeyLoad { reason, .. } => load_err(reason),
        other => other,
    })
}
