//! API error types and response handling.
//!
//! Every handler returns [`ApiResult`]; core errors convert into [`ApiError`]
//! and render as a JSON [`ErrorResponse`] with a matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use turnstile_core::TurnstileError;
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - invalid input, or nothing to close on exit.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 403 Forbidden - the entitlement does not admit here.
    Forbidden {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Why the entitlement was refused.
        reason: Option<String>,
    },

    /// 404 Not Found - resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - the holder is already inside.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 410 Gone - the code existed but has expired.
    Gone {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 422 Unprocessable Entity - semantically invalid configuration.
    Unprocessable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details, logged server-side.
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "ALREADY_INSIDE",
    "message": "Access refused: already inside this facility",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "ALREADY_INSIDE")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Access refused: already inside this facility")]
    pub message: String,

    /// Optional additional details.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// A 400 for a malformed request parameter.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            error_code: "INVALID_INPUT".to_string(),
            message: message.into(),
        }
    }

    /// HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Gone { .. } => StatusCode::GONE,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest { error_code, message }
            | Self::NotFound { error_code, message }
            | Self::Conflict { error_code, message }
            | Self::Gone { error_code, message }
            | Self::Unprocessable { error_code, message } => ErrorResponse {
                error: error_code,
                message,
                details: None,
            },

            Self::Forbidden {
                error_code,
                message,
                reason,
            } => ErrorResponse {
                error: error_code,
                message,
                details: reason.map(|reason| serde_json::json!({ "reason": reason })),
            },

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );
                // Details stay in the log.
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::Forbidden { message, .. } => write!(f, "Forbidden: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::Gone { message, .. } => write!(f, "Gone: {message}"),
            Self::Unprocessable { message, .. } => write!(f, "Unprocessable: {message}"),
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from turnstile_core errors.
impl From<TurnstileError> for ApiError {
    fn from(err: TurnstileError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.to_string();

        match err.http_status_code() {
            400 => Self::BadRequest {
                error_code,
                message,
            },
            403 => Self::Forbidden {
                error_code,
                message,
                reason: match err {
                    TurnstileError::EntitlementInvalid { reason } => Some(reason),
                    _ => None,
                },
            },
            404 => Self::NotFound {
                error_code,
                message,
            },
            409 => Self::Conflict {
                error_code,
                message,
            },
            410 => Self::Gone {
                error_code,
                message,
            },
            422 => Self::Unprocessable {
                error_code,
                message,
            },
            _ => Self::InternalError {
                error_code,
                message: "An internal error occurred".to_string(),
                details: Some(message),
            },
        }
    }
}

impl From<turnstile_core::ConfigError> for ApiError {
    fn from(err: turnstile_core::ConfigError) -> Self {
        Self::from(TurnstileError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TurnstileError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (TurnstileError::NoActiveEntry, StatusCode::BAD_REQUEST),
            (
                TurnstileError::EntitlementInvalid {
                    reason: "entitlement suspended".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (TurnstileError::CodeNotFound, StatusCode::NOT_FOUND),
            (TurnstileError::ExitCredentialInvalid, StatusCode::NOT_FOUND),
            (TurnstileError::AlreadyInside, StatusCode::CONFLICT),
            (TurnstileError::CodeExpired, StatusCode::GONE),
            (
                TurnstileError::PersistenceError("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_forbidden_carries_reason() {
        let err = ApiError::from(TurnstileError::EntitlementInvalid {
            reason: "entitlement expired, renewal required".into(),
        });
        match err {
            ApiError::Forbidden { reason, error_code, .. } => {
                assert_eq!(error_code, "ENTITLEMENT_INVALID");
                assert_eq!(reason.as_deref(), Some("entitlement expired, renewal required"));
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = ApiError::from(TurnstileError::PersistenceError("/var/lib secret".into()));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "CODE_NOT_FOUND".to_string(),
            message: "Access code not found".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("CODE_NOT_FOUND"));
    }
}
