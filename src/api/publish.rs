use super::AppState;
use crate::bridge::{CommandEnvelope, RelayError};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::Serialize;
use tracing::{error, info};

/// Success response for a relayed command
#[derive(Serialize)]
struct PublishResponse {
    success: bool,
    message: String,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

pub fn create_publish_router(state: AppState) -> Router {
    Router::new()
        .route("/api/mqtt/publish", post(publish_command))
        .with_state(state)
}

/// POST /api/mqtt/publish - relay {topic, message} to the broker
async fn publish_command(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PublishResponse>, AppError> {
    let envelope: CommandEnvelope =
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidBody(e.to_string()))?;

    state.bridge.publish_command(&envelope)?;

    info!(topic = %envelope.topic, "Command published via API");

    Ok(Json(PublishResponse {
        success: true,
        message: "Command published successfully".to_string(),
    }))
}

/// Application error types
#[derive(Debug)]
enum AppError {
    InvalidBody(String),
    MissingFields,
    NotConnected,
    Internal(String),
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::MissingFields => AppError::MissingFields,
            RelayError::BrokerNotConnected => AppError::NotConnected,
            RelayError::Internal(reason) => AppError::Internal(reason),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidBody(msg) => (StatusCode::BAD_REQUEST, format!("invalid request body: {}", msg)),
            AppError::MissingFields => (
                StatusCode::BAD_REQUEST,
                RelayError::MissingFields.to_string(),
            ),
            AppError::NotConnected => (
                StatusCode::SERVICE_UNAVAILABLE,
                RelayError::BrokerNotConnected.to_string(),
            ),
            AppError::Internal(msg) => {
                error!(error = %msg, "Command publish failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };
        let body = Json(ErrorResponse {
            success: false,
            error: error_message,
        });
        (status, body).into_response()
    }
}
