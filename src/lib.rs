//! relay - a single-upstream HTTP forwarding relay.
//!
//! The relay accepts a request, rewrites a constrained set of headers, forwards it to one
//! allow-listed upstream host and answers with a uniform JSON envelope.
//!
//! # Features
//! - Hostname allow-list holding exactly one upstream domain (optionally its subdomains)
//! - Control headers mapped onto the outbound `Cookie`, `Host`, `Origin` and `Referer`
//! - Request and response header deny-lists
//! - One outbound call per request, bounded by a timeout that covers the full body read
//! - Session value harvested from the upstream `Set-Cookie` headers
//! - Health endpoint and a static HTML fallback
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use relay::{
//!     FileSystemAdapter, HttpClientAdapter, HttpHandler, RelayService, adapters::build_router,
//!     config::ServerConfig,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: ServerConfig = relay::config::loader::load_config("relay.toml").await?;
//! let relay = Arc::new(RelayService::from_config(&cfg, Arc::new(HttpClientAdapter::new()?))?);
//! let handler = Arc::new(HttpHandler::new(relay, Arc::new(FileSystemAdapter::new()), &cfg));
//! let app = build_router(handler);
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the request/response transformation inside `core`. `core` never performs I/O itself;
//! the outbound call goes through the [`HttpClient`] port.
//!
//! # Error Handling
//! Relay failures are [`core::RelayError`] values, each with a stable code and HTTP status.
//! Bootstrap and plumbing return `eyre::Result<T>` with `WrapErr` context.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{FileSystemAdapter, HttpClientAdapter, HttpHandler},
    core::{RelayError, RelayService},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
