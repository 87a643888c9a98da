use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// A required external credential or identifier is not configured
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// Local state was written but a dependent write failed
    #[error("Partial failure: {message}")]
    PartialFailure {
        message: String,
        details: String,
        /// The resource that did get written
        token: Option<serde_json::Value>,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A remote service answered with a non-success status
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge("Request body too large".to_string())
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<serde_json::Value>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::PartialFailure { .. } => StatusCode::MULTI_STATUS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream { .. } | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_)
            | AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Bcrypt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut token = None;
        let (message, error) = match self {
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Conflict(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::ServiceUnavailable(msg) => (msg, None),
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (msg, None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (msg, None)
            }
            AppError::PartialFailure {
                message,
                details,
                token: written,
            } => {
                tracing::error!(details = %details, "Partial failure: {}", message);
                token = written;
                (message, Some(serde_json::Value::String(details)))
            }
            AppError::Upstream { message, details } => (message, details),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ("Database error".to_string(), None)
            }
            AppError::Json(e) => (format!("JSON error: {}", e), None),
            AppError::Bcrypt(e) => {
                tracing::error!("Bcrypt error: {}", e);
                ("Authentication error".to_string(), None)
            }
            AppError::HttpClient(e) => {
                tracing::error!("HTTP client error: {}", e);
                (format!("Upstream service error: {}", e), None)
            }
        };

        (
            status,
            Json(ErrorResponse {
                message,
                error,
                token,
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn get_response_body(response: Response) -> (StatusCode, serde_json::Value) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_conflict_error() {
        let error = AppError::Conflict("Active token exists".to_string());
        let (status, body) = get_response_body(error.into_response()).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Active token exists");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_is_multi_status_with_details() {
        let error = AppError::PartialFailure {
            message: "Token created but user record not updated".to_string(),
            details: "connection reset".to_string(),
            token: Some(serde_json::json!({"id": 7})),
        };
        let (status, body) = get_response_body(error.into_response()).await;

        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert_eq!(body["error"], "connection reset");
        assert_eq!(body["token"]["id"], 7);
    }

    #[tokio::test]
    async fn test_database_error_hides_driver_text() {
        let error = AppError::Database(sea_orm::DbErr::Custom("relation users missing".to_string()));
        let (status, body) = get_response_body(error.into_response()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Database error");
    }

    #[tokio::test]
    async fn test_upstream_error_carries_remote_body() {
        let error = AppError::Upstream {
            message: "Tunnel service returned 500".to_string(),
            details: Some(serde_json::json!({"reason": "boom"})),
        };
        let (status, body) = get_response_body(error.into_response()).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["reason"], "boom");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::PayloadTooLarge("x".into()).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::Configuration("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::ServiceUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_error_display_impl() {
        assert_eq!(
            AppError::NotFound("test".to_string()).to_string(),
            "Not found: test"
        );
        assert_eq!(
            AppError::Conflict("test".to_string()).to_string(),
            "Conflict: test"
        );
    }
}
