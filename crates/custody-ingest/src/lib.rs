//! Custody Ingest - The central ingestion pipeline.
//!
//! This crate provides the [`AuditingAggregate`], which turns transport
//! messages carrying signed source entries into signed central entries:
//!
//! 1. decode the message (malformed messages are skipped)
//! 2. verify the source signature (failures set `invalidSourceSignature`)
//! 3. stamp persistence time and service provenance
//! 4. sign the result (failures store the `"INVALID"` sentinel)
//! 5. store the batch with one repository call
//!
//! Only establishing the service identity can fail; everything else is
//! logged and absorbed so that no event is dropped.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod aggregate;
mod error;

pub use aggregate::{AuditingAggregate, BatchOutcome, ServiceIdentity};
pub use error::{IngestError, IngestResult};
