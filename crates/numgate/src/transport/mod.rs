//! Transport layer for numgate.
//!
//! Currently provides the client-facing HTTP surface via axum.

pub mod http;

pub use http::{routes, wait_for_shutdown_signal};
