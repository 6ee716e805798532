use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repositories::StoreError;
use crate::services::lifecycle::LifecycleError;

const RETRY_AFTER_SECONDS: &str = "60";
const TUTOR_UNAVAILABLE: &str = "Tutor is temporarily unavailable. Please try again.";

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(&'static str),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(message) => ApiError::NotFound(message.to_string()),
            LifecycleError::Forbidden(message) => ApiError::Forbidden(message),
            LifecycleError::Conflict(message) => ApiError::Conflict(message.to_string()),
            LifecycleError::InvalidReference => ApiError::BadRequest(
                "Conversation does not belong to this question".to_string(),
            ),
            LifecycleError::ContentMismatch => ApiError::BadRequest(
                "Message not found in conversation or not from the student".to_string(),
            ),
            LifecycleError::InvalidInput(message) => ApiError::BadRequest(message),
            LifecycleError::Service(err) => {
                tracing::error!(error = %err, "Completion service failed");
                ApiError::ServiceUnavailable(TUTOR_UNAVAILABLE.to_string())
            }
            LifecycleError::Store(err) => ApiError::internal(err, "Storage operation failed"),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal(err, "Storage operation failed")
    }
}

fn error_body(status: StatusCode, detail: String) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let mut response = error_body(StatusCode::UNAUTHORIZED, message.to_string());
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => error_body(StatusCode::FORBIDDEN, message.to_string()),
            ApiError::BadRequest(message) => error_body(StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => error_body(StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => error_body(StatusCode::CONFLICT, message),
            ApiError::TooManyRequests(message) => {
                let mut response =
                    error_body(StatusCode::TOO_MANY_REQUESTS, message.to_string());
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECONDS));
                response
            }
            ApiError::ServiceUnavailable(message) => error_body(StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::completion::CompletionError;

    #[test]
    fn lifecycle_errors_map_to_client_statuses() {
        let cases = [
            (LifecycleError::NotFound("Assignment not found"), StatusCode::NOT_FOUND),
            (LifecycleError::Forbidden("no"), StatusCode::FORBIDDEN),
            (LifecycleError::Conflict("again"), StatusCode::CONFLICT),
            (LifecycleError::InvalidReference, StatusCode::BAD_REQUEST),
            (LifecycleError::ContentMismatch, StatusCode::BAD_REQUEST),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn rate_limit_response_carries_retry_after() {
        let response = ApiError::TooManyRequests("slow down").into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    }

    #[tokio::test]
    async fn upstream_body_stays_out_of_the_response() {
        let err = LifecycleError::Service(CompletionError::Upstream {
            status: 500,
            body: "internal key sk-secret leaked".to_string(),
        });

        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = crate::test_support::read_json(response).await;
        assert_eq!(body["detail"], TUTOR_UNAVAILABLE);
    }
}
