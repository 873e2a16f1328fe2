//! In-memory repository.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use custody_types::{
    AuditEntryId, AuditSearchResults, KeywordField, SearchFilter, SearchKeywords,
    SignedCentralAuditEntry,
};
use tracing::debug;

use crate::error::StorageResult;
use crate::repo::{AuditRepo, MAX_KEYWORD_TERMS};

/// Repository keeping entries in process memory.
///
/// Filters match exactly. Entries are keyed by id, so re-delivery of the
/// same entry overwrites instead of duplicating.
#[derive(Debug, Default)]
pub struct MemoryAuditRepo {
    entries: RwLock<BTreeMap<AuditEntryId, SignedCentralAuditEntry>>,
}

impl MemoryAuditRepo {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Look up one entry.
    #[must_use]
    pub fn get(&self, id: &AuditEntryId) -> Option<SignedCentralAuditEntry> {
        self.read().get(id).cloned()
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<AuditEntryId, SignedCentralAuditEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Distinct terms per field, most frequent first, ties by term.
pub(crate) fn keyword_counts<'a>(
    entries: impl Iterator<Item = &'a SignedCentralAuditEntry> + Clone,
) -> Vec<SearchKeywords> {
    KeywordField::ALL
        .iter()
        .map(|field| {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for entry in entries.clone() {
                let count = counts.entry(field.value_of(entry)).or_insert(0);
                *count = count.saturating_add(1);
            }
            let mut terms: Vec<(&str, usize)> = counts.into_iter().collect();
            terms.sort_by_key(|&(term, count)| (Reverse(count), term));
            SearchKeywords {
                field_name: field.as_str().to_string(),
                distinct_terms: terms
                    .into_iter()
                    .take(MAX_KEYWORD_TERMS)
                    .map(|(term, _)| term.to_string())
                    .collect(),
            }
        })
        .collect()
}

#[async_trait]
impl AuditRepo for MemoryAuditRepo {
    async fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn destroy(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn store(&self, entries: &[SignedCentralAuditEntry]) -> StorageResult<usize> {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut kept = BTreeSet::new();
        for entry in entries {
            map.insert(entry.id(), entry.clone());
            kept.insert(entry.id());
        }
        debug!(
            received = entries.len(),
            kept = kept.len(),
            total = map.len(),
            "Stored audit entries"
        );
        Ok(kept.len())
    }

    async fn search_entries(&self, filter: &SearchFilter) -> StorageResult<AuditSearchResults> {
        let page = filter.page_request();
        let map = self.read();

        let mut matching: Vec<&SignedCentralAuditEntry> =
            map.values().filter(|e| filter.matches(e)).collect();
        matching.sort_by_key(|e| {
            (
                Reverse(e.source_entry().action_timestamp),
                Reverse(e.central.persistence_timestamp),
            )
        });

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset())
            .take(page.size)
            .cloned()
            .collect();

        Ok(AuditSearchResults {
            page_size: page.size,
            page_index: page.index,
            total_pages: page.total_pages(total),
            items,
        })
    }

    async fn get_search_keywords(&self) -> Vec<SearchKeywords> {
        keyword_counts(self.read().values())
    }
}
