use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Any other 4xx: the server understood the request and refused it.
    #[error("Request rejected with {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited(truncated),
            400..=499 => ApiError::Rejected {
                status,
                body: truncated,
            },
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// The HTTP status behind this error, when it came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::AccessDenied(_) => Some(StatusCode::FORBIDDEN),
            ApiError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            ApiError::NotFound(_) => Some(StatusCode::NOT_FOUND),
            ApiError::RateLimited(_) => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::NetworkError(e) => e.status(),
            ApiError::ServerError(_) | ApiError::InvalidResponse(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, "nope"),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, "x"),
            ApiError::AccessDenied(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "x"),
            ApiError::ServerError(_)
        ));
        match ApiError::from_status(StatusCode::SEE_OTHER, "moved") {
            ApiError::InvalidResponse(msg) => assert!(msg.contains("moved")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn test_other_client_errors_keep_their_status() {
        let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, r#"{"field":"email"}"#);
        match &err {
            ApiError::Rejected { status, body } => {
                assert_eq!(*status, StatusCode::UNPROCESSABLE_ENTITY);
                assert!(body.contains("email"));
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
        assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
        assert_eq!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "").status(),
            Some(StatusCode::TOO_MANY_REQUESTS)
        );
        assert_eq!(ApiError::ServerError("x".to_string()).status(), None);
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));

        assert_eq!(ApiError::truncate_body("tiny"), "tiny");
    }
}
