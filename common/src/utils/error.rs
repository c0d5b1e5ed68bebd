use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tokio_postgres::error::SqlState;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Input validation failed: {field}")]
    Validation { field: String, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("External API request failed: {0}")]
    ExternalApi(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resource not found: {resource}")]
    NotFound { resource: String, id: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit { retry_after: u64, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    const DB_ERROR: &'static str = "DB_ERROR";
    const VALIDATION_ERROR: &'static str = "VALIDATION_ERROR";
    const UNAUTHORIZED: &'static str = "UNAUTHORIZED";
    const EXTERNAL_API_ERROR: &'static str = "EXTERNAL_API_ERROR";
    const EMBEDDING_ERROR: &'static str = "EMBEDDING_ERROR";
    const CONFIG_ERROR: &'static str = "CONFIG_ERROR";
    const NOT_FOUND: &'static str = "NOT_FOUND";
    const RATE_LIMITED: &'static str = "RATE_LIMITED";
    const INTERNAL_ERROR: &'static str = "INTERNAL_ERROR";

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.to_owned(),
            id: id.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match &self {
            Self::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                    Self::DB_ERROR,
                )
            }
            Self::Validation { message, .. } => (
                StatusCode::BAD_REQUEST,
                message.clone(),
                Self::VALIDATION_ERROR,
            ),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), Self::UNAUTHORIZED),
            Self::ExternalApi(msg) => {
                tracing::warn!("External API error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    msg.clone(),
                    Self::EXTERNAL_API_ERROR,
                )
            }
            Self::Embedding(msg) => {
                tracing::error!("Embedding error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Embedding generation failed".into(),
                    Self::EMBEDDING_ERROR,
                )
            }
            Self::Config(msg) => {
                tracing::error!("Configuration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error".into(),
                    Self::CONFIG_ERROR,
                )
            }
            Self::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                    Self::INTERNAL_ERROR,
                )
            }
            Self::NotFound { resource, id } => {
                tracing::debug!(resource = %resource, id = %id, "Lookup missed");
                (
                    StatusCode::NOT_FOUND,
                    format!("{resource} not found"),
                    Self::NOT_FOUND,
                )
            }
            Self::RateLimit {
                retry_after,
                message,
            } => {
                let body = json!({
                    "error": message,
                    "error_code": Self::RATE_LIMITED,
                    "status": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    "retry_after": retry_after
                });

                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(*retry_after));
                return response;
            }
        };

        let body = json!({
            "error": message,
            "error_code": code,
            "status": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            let constraint = err
                .as_db_error()
                .and_then(|db| db.constraint())
                .unwrap_or_default();
            if constraint.contains("email") {
                return Self::validation("email", "Email already registered");
            }
            return Self::validation("id", "Resource already exists");
        }
        Self::Database(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::ExternalApi(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::ExternalApi(format!("Malformed JSON payload: {err}"))
    }
}

impl From<chrono::ParseError> for ApiError {
    fn from(err: chrono::ParseError) -> Self {
        Self::Validation {
            field: "date".to_string(),
            message: format!("Invalid date format: {err}"),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::ExternalApi(format!("IO error: {err}"))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Background task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_renders_as_bad_request() {
        let response = ApiError::validation("email", "Email already registered").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Email already registered");
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn database_details_are_not_leaked() {
        let response = ApiError::Database("relation \"users\" does not exist".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Internal server error");
    }

    #[tokio::test]
    async fn rate_limit_sets_retry_after_header() {
        let response = ApiError::RateLimit {
            retry_after: 12,
            message: "slow down".into(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "12");
        assert_eq!(body_json(response).await["retry_after"], 12);
    }

    #[tokio::test]
    async fn not_found_names_the_resource() {
        let response = ApiError::not_found("Artisan", "abc").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Artisan not found");
    }
}
