//! Search filters, pagination and result shapes.

use serde::{Deserialize, Serialize};

use crate::central::SignedCentralAuditEntry;

/// Largest page a search may return.
pub const MAX_PAGE_SIZE: usize = 100;

/// Filters for an audit entry search.
///
/// Every present filter must match (AND semantics); an absent filter does
/// not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    /// Match `securityContext.userId`.
    pub user_id: Option<String>,
    /// Match `sourceBcName`.
    pub source_bc_name: Option<String>,
    /// Match `sourceAppName`.
    pub source_app_name: Option<String>,
    /// Match `actionType`.
    pub action_type: Option<String>,
    /// Match `actionSuccessful`.
    pub action_successful: Option<bool>,
    /// Inclusive lower bound on `actionTimestamp` (epoch ms).
    pub start_date: Option<i64>,
    /// Inclusive upper bound on `actionTimestamp` (epoch ms).
    pub end_date: Option<i64>,
    /// Requested page index, clamped by [`PageRequest::clamped`].
    pub page_index: Option<i64>,
    /// Requested page size, clamped by [`PageRequest::clamped`].
    pub page_size: Option<i64>,
}

impl SearchFilter {
    /// Filter on user id.
    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Filter on action type.
    #[must_use]
    pub fn action_type(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }

    /// Request a page.
    #[must_use]
    pub fn page(mut self, index: i64, size: i64) -> Self {
        self.page_index = Some(index);
        self.page_size = Some(size);
        self
    }

    /// The clamped page this filter asks for.
    #[must_use]
    pub fn page_request(&self) -> PageRequest {
        PageRequest::clamped(self.page_index, self.page_size)
    }

    /// Whether an entry satisfies every present filter.
    #[must_use]
    pub fn matches(&self, entry: &SignedCentralAuditEntry) -> bool {
        fn eq(filter: Option<&String>, value: &str) -> bool {
            filter.is_none_or(|f| f == value)
        }

        let src = entry.source_entry();
        let user_ok = self.user_id.as_ref().is_none_or(|u| {
            src.security_context.user_id.as_deref() == Some(u.as_str())
        });

        user_ok
            && eq(self.source_bc_name.as_ref(), &src.source_bc_name)
            && eq(self.source_app_name.as_ref(), &src.source_app_name)
            && eq(self.action_type.as_ref(), &src.action_type)
            && self
                .action_successful
                .is_none_or(|s| s == src.action_successful)
            && self.start_date.is_none_or(|s| src.action_timestamp >= s)
            && self.end_date.is_none_or(|e| src.action_timestamp <= e)
    }
}

/// A clamped page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page index.
    pub index: usize,
    /// Page size, between 1 and [`MAX_PAGE_SIZE`].
    pub size: usize,
}

impl PageRequest {
    /// Clamp a raw request.
    ///
    /// A missing index means page 0 and a negative index is raised to 0.
    /// A missing size means [`MAX_PAGE_SIZE`]; sizes are clamped to
    /// `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn clamped(index: Option<i64>, size: Option<i64>) -> Self {
        let index = index.map_or(0, |i| usize::try_from(i).unwrap_or(0));
        let size = match size {
            None => MAX_PAGE_SIZE,
            Some(s) if s < 1 => 1,
            Some(s) => usize::try_from(s).map_or(MAX_PAGE_SIZE, |s| s.min(MAX_PAGE_SIZE)),
        };
        Self { index, size }
    }

    /// Number of items before this page.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.index.saturating_mul(self.size)
    }

    /// Number of pages needed for `total` items.
    #[must_use]
    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::clamped(None, None)
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSearchResults {
    /// Effective (clamped) page size.
    pub page_size: usize,
    /// Effective (clamped) page index.
    pub page_index: usize,
    /// Total number of pages for the filter.
    pub total_pages: usize,
    /// Entries on this page, newest action first.
    pub items: Vec<SignedCentralAuditEntry>,
}

impl AuditSearchResults {
    /// An empty page for a request.
    #[must_use]
    pub fn empty(page: PageRequest) -> Self {
        Self {
            page_size: page.size,
            page_index: page.index,
            total_pages: 0,
            items: Vec::new(),
        }
    }
}

/// Faceted fields exposed through search keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordField {
    /// `actionType`
    ActionType,
    /// `sourceBcName`
    SourceBcName,
    /// `sourceAppName`
    SourceAppName,
}

impl KeywordField {
    /// All faceted fields, in response order.
    pub const ALL: [Self; 3] = [Self::ActionType, Self::SourceBcName, Self::SourceAppName];

    /// The JSON field name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ActionType => "actionType",
            Self::SourceBcName => "sourceBcName",
            Self::SourceAppName => "sourceAppName",
        }
    }

    /// Read this field from an entry.
    #[must_use]
    pub fn value_of<'a>(&self, entry: &'a SignedCentralAuditEntry) -> &'a str {
        let src = entry.source_entry();
        match self {
            Self::ActionType => &src.action_type,
            Self::SourceBcName => &src.source_bc_name,
            Self::SourceAppName => &src.source_app_name,
        }
    }
}

impl std::fmt::Display for KeywordField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distinct values seen for one faceted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchKeywords {
    /// Field name.
    pub field_name: String,
    /// Distinct values.
    pub distinct_terms: Vec<String>,
}
