//! HTTP and WebSocket surface for Narravo.
//!
//! Endpoints enqueue scheduler tasks and read catalog state; all pipeline
//! work happens in the worker. Errors use the canonical envelope
//! `{error, code, message, details?, timestamp}`.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
