//! folio-gateway - the API gateway in front of the portfolio backend.
//!
//! The gateway is the single public entry point of the system. Every inbound
//! request runs through a fixed, ordered pipeline:
//!
//! 1. CORS handling, as the outermost router layer (preflight requests are
//!    answered here and go no further)
//! 2. request logging
//! 3. per-client fixed-window rate limiting
//! 4. route resolution against an immutable route table
//! 5. bearer token validation for protected routes
//! 6. reverse proxying to the identity, portfolio or analysis service
//!
//! The crate follows a **hexagonal layout**: `core` holds the request-handling
//! logic and owns no sockets, `ports` declares the traits the core talks
//! through, and `adapters` provides the hyper/axum implementations.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use folio_gateway::{GatewayService, HttpClientAdapter, HttpHandler, config::GatewayConfig};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = Arc::new(GatewayConfig::default());
//! let client = Arc::new(HttpClientAdapter::from_config(&config.upstream)?);
//! let gateway = Arc::new(GatewayService::new(config, client)?);
//! gateway.start_background_tasks();
//!
//! let app = HttpHandler::new(gateway)?.into_router();
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Request-path failures are modelled as [`GatewayError`] and rendered as
//! `{"error": "<message>"}` bodies. Startup and configuration code returns
//! `eyre::Result<T>` with context attached through `WrapErr`.
//!
//! # Concurrency
//! The rate limiter's counter table is the only shared mutable state. It is an
//! `scc::HashMap`, so each check holds exclusive access to one client's entry
//! for the duration of a read-modify-write and never blocks other clients.
pub mod config;
pub mod error;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler},
    core::GatewayService,
    error::GatewayError,
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
