//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custody_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult};

// Keys
pub use crate::RsaKeyPair;

// Providers
pub use crate::{AuditCryptoProvider, CryptoProvider, LocalCryptoProvider, MissingKeyPolicy};
