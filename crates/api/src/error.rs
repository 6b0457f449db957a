use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::services::StoreError;
use domain::DomainError;
use serde::Serialize;
use shared::jwt::JwtError;
use thiserror::Error;

/// Status used when the client went away before the response was ready.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Cancelled => {
                tracing::info!("Request cancelled by client");
                (
                    StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                        .unwrap_or(StatusCode::BAD_REQUEST),
                    "cancelled",
                    "Request cancelled".into(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::MissingDateComponent(_)
            | DomainError::InvalidDate(_)
            | DomainError::Validation(_) => ApiError::Validation(err.to_string()),
            DomainError::NotFound(msg) => ApiError::NotFound(msg),
            DomainError::Forbidden(msg) => ApiError::Forbidden(msg),
            DomainError::DuplicateInvitation | DomainError::AlreadyMember => {
                ApiError::Conflict(err.to_string())
            }
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
            DomainError::Cancelled => ApiError::Cancelled,
            DomainError::Store(store) => store.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => ApiError::Conflict("Resource already exists".into()),
            StoreError::NotFound(_) => ApiError::NotFound("Resource not found".into()),
            StoreError::Backend(msg) => ApiError::Internal(format!("Store error: {}", msg)),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::TokenExpired => ApiError::Unauthorized("Token has expired".into()),
            JwtError::InvalidToken | JwtError::DecodingError(_) => {
                ApiError::Unauthorized("Invalid or expired token".into())
            }
            JwtError::EncodingError(msg) | JwtError::InvalidKey(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();

        let message = match details.as_slice() {
            [single] => format!("{}: {}", single.field, single.message),
            _ => format!("{} validation errors", details.len()),
        };

        ApiError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: impl Into<ApiError>) -> StatusCode {
        error.into().into_response().status()
    }

    #[test]
    fn test_api_error_statuses() {
        assert_eq!(
            status_of(ApiError::Unauthorized("no token".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(ApiError::Forbidden("no".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(ApiError::NotFound("gone".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ApiError::Conflict("dup".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ApiError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(ApiError::Cancelled).as_u16(), CLIENT_CLOSED_REQUEST);
    }

    #[test]
    fn test_domain_errors_map_to_http() {
        assert_eq!(
            status_of(DomainError::MissingDateComponent("month")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::InvalidDate("2024-02-30".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(DomainError::DuplicateInvitation), StatusCode::CONFLICT);
        assert_eq!(status_of(DomainError::AlreadyMember), StatusCode::CONFLICT);
        assert_eq!(
            status_of(DomainError::Forbidden("not a member".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(DomainError::Store(StoreError::Backend("pool timed out".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_backend_message_is_not_leaked() {
        let error: ApiError = StoreError::Backend("password=hunter2".into()).into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_jwt_errors_are_unauthorized() {
        assert_eq!(status_of(JwtError::TokenExpired), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(JwtError::InvalidToken), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            format!("{}", ApiError::Unauthorized("test".to_string())),
            "Unauthorized: test"
        );
        assert_eq!(format!("{}", ApiError::Cancelled), "Request cancelled");
    }
}
