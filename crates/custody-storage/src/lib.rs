//! Custody Storage - Persistence and search for central audit entries.
//!
//! This crate provides:
//! - The [`AuditRepo`] capability
//! - [`MemoryAuditRepo`] for tests and single-process deployments
//! - [`ElasticsearchAuditRepo`] over the Elasticsearch REST API
//!
//! # Example
//!
//! ```rust
//! use custody_storage::{AuditRepo, MemoryAuditRepo};
//! use custody_types::SearchFilter;
//!
//! # async fn example() {
//! let repo = MemoryAuditRepo::new();
//! repo.init().await.unwrap();
//!
//! let page = repo.search_entries(&SearchFilter::default().user("u1")).await.unwrap();
//! assert!(page.items.is_empty());
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod elasticsearch;
mod error;
mod memory;
mod repo;

pub use elasticsearch::{ElasticsearchAuditRepo, ElasticsearchConfig};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryAuditRepo;
pub use repo::{AuditRepo, MAX_KEYWORD_TERMS};
