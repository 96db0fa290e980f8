//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::helper::{
    AggregateRequest, AggregateResponse, HealthResponse, HelperClient, HelperError,
};

#[derive(Debug, Serialize)]
pub struct GatewayHealthResponse {
    pub status: &'static str,
    pub helper: HealthResponse,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

/// Client-caused input problems on `/numbers/aggregate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("numbers array is required")]
    NumbersRequired,
    #[error("numbers array must contain only numbers")]
    NumbersMustBeNumeric,
}

/// Error boundary for route handlers.
///
/// Validation failures carry their message to the client. Everything else is
/// logged in full and answered with an opaque 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Helper(#[from] HelperError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                Json(MessageResponse {
                    message: e.to_string(),
                }),
            )
                .into_response(),
            Self::Helper(e) => {
                tracing::error!(error = %e, "Unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(MessageResponse {
                        message: "Internal Server Error".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

/// Pull a non-empty, all-numeric `numbers` array out of a request body.
///
/// A body that is not JSON, or lacks a `numbers` array, counts as missing.
pub fn validate_numbers(body: &[u8]) -> Result<AggregateRequest, ValidationError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| ValidationError::NumbersRequired)?;

    let items = match value.get("numbers").and_then(|n| n.as_array()) {
        Some(items) if !items.is_empty() => items,
        _ => return Err(ValidationError::NumbersRequired),
    };

    let numbers = items
        .iter()
        .map(|item| match item {
            serde_json::Value::Number(n) => Ok(n.clone()),
            _ => Err(ValidationError::NumbersMustBeNumeric),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AggregateRequest { numbers })
}

async fn health(
    State(helper): State<Arc<HelperClient>>,
) -> Result<Json<GatewayHealthResponse>, ApiError> {
    let helper = helper.health().await?;
    Ok(Json(GatewayHealthResponse {
        status: "ok",
        helper,
    }))
}

async fn helper_health(
    State(helper): State<Arc<HelperClient>>,
) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(helper.health().await?))
}

/// `application/json` or any `+json` media type, parameters ignored.
fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

async fn aggregate(
    State(helper): State<Arc<HelperClient>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AggregateResponse>, ApiError> {
    // Bodies not declared as JSON are never parsed.
    if !is_json_content_type(&headers) {
        return Err(ValidationError::NumbersRequired.into());
    }
    let request = validate_numbers(&body)?;
    tracing::debug!(count = request.numbers.len(), "Forwarding aggregate request");
    Ok(Json(helper.aggregate(&request).await?))
}

pub fn routes(helper: Arc<HelperClient>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/numbers/health", get(helper_health))
        .route("/numbers/aggregate", post(aggregate))
        .with_state(helper)
}
