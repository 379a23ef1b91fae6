#[cfg(feature = "server")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
#[cfg(feature = "server")]
use serde_json::json;
use thiserror::Error;

/// Message returned to callers when the origin reports the domain as free
/// or its page could not be recognized.
pub const NOT_OCCUPIED_MESSAGE: &str = "Domain Name is not occupied";

#[derive(Error, Debug)]
pub enum WhoisError {
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// Carries the origin's own banner text verbatim.
    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("{0}")]
    NotOccupied(String),

    #[error("Malformed origin page: {0}")]
    MalformedOrigin(String),

    #[error("Network timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Response too large")]
    ResponseTooLarge,

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Store error: {0}")]
    StoreError(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl WhoisError {
    pub fn not_occupied() -> Self {
        WhoisError::NotOccupied(NOT_OCCUPIED_MESSAGE.to_string())
    }

    /// Short label used for error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WhoisError::InvalidDomain(_) => "invalid_domain",
            WhoisError::UpstreamUnavailable(_) => "upstream_unavailable",
            WhoisError::NotOccupied(_) => "not_occupied",
            WhoisError::MalformedOrigin(_) => "malformed_origin",
            WhoisError::Timeout => "timeout",
            WhoisError::HttpError(_) => "http_error",
            WhoisError::ResponseTooLarge => "response_too_large",
            WhoisError::ConfigError(_) => "config_error",
            WhoisError::StoreError(_) => "store_error",
            WhoisError::Internal(_) => "internal",
        }
    }
}

impl From<tokio::time::error::Elapsed> for WhoisError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        WhoisError::Timeout
    }
}

#[cfg(feature = "server")]
impl IntoResponse for WhoisError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            WhoisError::InvalidDomain(_) => (StatusCode::BAD_REQUEST, "Incorrect domain name".to_string()),
            WhoisError::UpstreamUnavailable(banner) => (StatusCode::SERVICE_UNAVAILABLE, banner),
            WhoisError::NotOccupied(message) => (StatusCode::NOT_FOUND, message),
            WhoisError::MalformedOrigin(_)
            | WhoisError::HttpError(_)
            | WhoisError::ResponseTooLarge => (StatusCode::BAD_GATEWAY, self.to_string()),
            WhoisError::Timeout => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string()),
        };

        let body = Json(json!({
            "detail": detail,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(all(test, feature = "server"))]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (WhoisError::InvalidDomain("nodot".into()), StatusCode::BAD_REQUEST),
            (WhoisError::UpstreamUnavailable("banner".into()), StatusCode::SERVICE_UNAVAILABLE),
            (WhoisError::not_occupied(), StatusCode::NOT_FOUND),
            (WhoisError::MalformedOrigin("status".into()), StatusCode::BAD_GATEWAY),
            (WhoisError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (WhoisError::Internal("store offline".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_banner_is_preserved() {
        let banner = "Возникли непредвиденные проблемы. Попробуйте еще раз через несколько минут.";
        assert_eq!(WhoisError::UpstreamUnavailable(banner.to_string()).to_string(), banner);
    }
}
