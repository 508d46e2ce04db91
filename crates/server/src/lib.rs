//! HTTP surface for promhub.
//!
//! This crate provides:
//! - Target and selector management endpoints over the registry
//! - Prometheus HTTP service discovery
//! - A scrape proxy that keeps target credentials out of Prometheus config

pub mod auth;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod proxy;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
