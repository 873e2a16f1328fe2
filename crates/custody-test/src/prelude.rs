//! Prelude module - commonly used test helpers.
//!
//! Use `use custody_test::prelude::*;` to import all essential helpers.

// Keys
pub use crate::{other_keypair, test_crypto_provider, test_keypair, write_test_key};

// Fixtures
pub use crate::{message_for, sample_source_entry, sign_source_entry};

// Mocks
pub use crate::{FlakyCryptoProvider, RecordingRepo};
