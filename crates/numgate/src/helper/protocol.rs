//! Wire types exchanged with the number helper.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /aggregate`.
///
/// Values stay as JSON numbers so the helper receives exactly what the
/// client sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub numbers: Vec<serde_json::Number>,
}

/// Statistics object returned by the helper.
///
/// Kept as the helper's JSON object so fields and number forms reach the
/// gateway's client unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateResponse(pub Map<String, Value>);

/// Health object returned by the helper, passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthResponse(pub Map<String, Value>);

impl HealthResponse {
    /// The helper's `status` field when it is a string.
    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }
}
