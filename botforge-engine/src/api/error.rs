//! API error handling
//!
//! Unified error type and JSON conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::build_service::BuildServiceError;
use crate::service::log_service::LogServiceError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Request valid but rejected by the job's current state
    Conflict(String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<BuildServiceError> for ApiError {
    fn from(err: BuildServiceError) -> Self {
        match err {
            BuildServiceError::NotFound(id) => {
                ApiError::NotFound(format!("Build job {} not found", id))
            }
            BuildServiceError::TemplateNotFound(name) => {
                ApiError::BadRequest(format!("Unknown build template '{}'", name))
            }
            BuildServiceError::MissingFields(fields) => ApiError::BadRequest(format!(
                "Missing required configuration fields: {}",
                fields.join(", ")
            )),
            BuildServiceError::DuplicateInFlight(chatbot_id) => ApiError::Conflict(format!(
                "Chatbot {} already has a build in flight",
                chatbot_id
            )),
            BuildServiceError::AlreadyTerminal(id) => {
                ApiError::Conflict(format!("Build job {} is already terminal", id))
            }
            BuildServiceError::NotDeployed(id) => {
                ApiError::Conflict(format!("Build job {} is not deployed", id))
            }
            BuildServiceError::NotTerminal(id) => {
                ApiError::Conflict(format!("Build job {} is still in flight", id))
            }
            BuildServiceError::QueueFull => {
                ApiError::InternalError("Build queue is full".to_string())
            }
            BuildServiceError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<LogServiceError> for ApiError {
    fn from(err: LogServiceError) -> Self {
        match err {
            LogServiceError::JobNotFound(id) => {
                ApiError::NotFound(format!("Build job {} not found", id))
            }
            LogServiceError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
