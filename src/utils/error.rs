use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    ConfigError(String),
    ConnectionError(String),
    DatabaseError(String),
    ValidationError(String),
    NotFound(String),
    Unauthorized(String),
    RateLimitExceeded { retry_after_secs: u64 },
    SignatureMismatch(String),
    GatewayError(String),
    Timeout(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "{}", msg),
            AppError::NotFound(msg) => write!(f, "{} not found", msg),
            AppError::Unauthorized(msg) => write!(f, "{}", msg),
            AppError::RateLimitExceeded { retry_after_secs } => write!(
                f,
                "Rate limit exceeded. Please try again in {} seconds.",
                retry_after_secs
            ),
            AppError::SignatureMismatch(msg) => write!(f, "Invalid signature: {}", msg),
            AppError::GatewayError(msg) => write!(f, "Gateway error: {}", msg),
            AppError::Timeout(msg) => write!(f, "Request timeout: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConnectionError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::SignatureMismatch(_) => StatusCode::BAD_REQUEST,
            AppError::GatewayError(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        if let AppError::RateLimitExceeded { retry_after_secs } = self {
            builder.insert_header(("Retry-After", retry_after_secs.to_string()));
            return builder.json(serde_json::json!({
                "success": false,
                "error": "Too many requests",
                "message": self.to_string(),
                "retryAfter": retry_after_secs,
            }));
        }

        builder.json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::ConnectionError("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::NotFound("Tool".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::RateLimitExceeded {
                retry_after_secs: 10
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::SignatureMismatch("payment".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_rate_limit_response_has_retry_after() {
        let err = AppError::RateLimitExceeded {
            retry_after_secs: 42,
        };
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            resp.headers().get("Retry-After").unwrap().to_str().unwrap(),
            "42"
        );
    }
}
