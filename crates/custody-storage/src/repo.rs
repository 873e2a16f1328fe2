//! The audit repository capability.

use async_trait::async_trait;
use custody_types::{AuditSearchResults, SearchFilter, SearchKeywords, SignedCentralAuditEntry};

use crate::error::StorageResult;

/// Persists central audit entries and answers searches.
///
/// Implementations must be thread-safe; the handle is shared between the
/// ingestion path and the query surface without extra locking.
#[async_trait]
pub trait AuditRepo: Send + Sync {
    /// Connect and prepare the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or cannot be prepared.
    async fn init(&self) -> StorageResult<()>;

    /// Release backend resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if shutdown fails.
    async fn destroy(&self) -> StorageResult<()>;

    /// Persist a batch. A single bad document does not fail the others.
    ///
    /// Returns the number of distinct entries kept. Storing an entry whose
    /// id already exists replaces it, so a batch repeating an id counts it
    /// once.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch as a whole could not be written.
    async fn store(&self, entries: &[SignedCentralAuditEntry]) -> StorageResult<usize>;

    /// Filtered, paginated search, newest action first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    async fn search_entries(&self, filter: &SearchFilter) -> StorageResult<AuditSearchResults>;

    /// Distinct values of the faceted fields. Best-effort: empty on failure.
    async fn get_search_keywords(&self) -> Vec<SearchKeywords>;
}

/// Most distinct terms reported per faceted field.
pub const MAX_KEYWORD_TERMS: usize = 100;
