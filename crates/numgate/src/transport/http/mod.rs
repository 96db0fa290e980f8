//! HTTP transport via axum.

pub mod routes;
pub mod server;

pub use routes::{ApiError, GatewayHealthResponse, ValidationError, routes, validate_numbers};
pub use server::{bind, serve, wait_for_shutdown_signal};
