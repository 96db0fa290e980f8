//! Number helper HTTP surface: wire types and client.

pub mod client;
pub mod protocol;

pub use client::{HelperClient, HelperError};
pub use protocol::{AggregateRequest, AggregateResponse, HealthResponse};
