//! Custody Server - The central auditing service.
//!
//! This crate provides:
//! - [`AppContext`], the assembled components (crypto provider, repository,
//!   consumer, aggregate, request authorizer)
//! - [`Service`], which starts them in order under a deadline, and
//!   [`RunningService`], which stops them in reverse
//! - The HTTP query API in [`api`], and the hosted broker routes used when
//!   no remote broker is configured
//!
//! The `custodyd` binary wires these together from [`custody_config`].
//!
//! # Example
//!
//! ```rust,no_run
//! use custody_config::ServiceConfig;
//! use custody_server::{AppContext, Service};
//!
//! # async fn example() -> Result<(), custody_server::ServerError> {
//! let config = ServiceConfig::load(None)?.config;
//! let ctx = AppContext::from_config(&config)?;
//!
//! let service = Service::start(ctx, ([0, 0, 0, 0], config.http.port).into()).await?;
//! // ... run until a shutdown signal ...
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod api;
pub mod prelude;

mod auth;
mod context;
mod error;
mod service;

pub use api::{ApiError, ApiState, BrokerIngress, router};
pub use auth::{AllowAll, AuthDenied, BearerTokenAuthorizer, RequestAuthorizer};
pub use context::{AppContext, SERVICE_VERSION};
pub use error::{ServerError, ServerResult};
pub use service::{RunningService, STARTUP_TIMEOUT, Service};
