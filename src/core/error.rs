use std::time::Duration;

use hyper::StatusCode;
use thiserror::Error;

/// Errors produced while relaying a single request.
///
/// Every variant maps to a stable machine-readable [`code`](RelayError::code)
/// and an HTTP status, both surfaced in the JSON envelope.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("No target URL: set the '{0}' header or the 'url' query parameter")]
    MissingTarget(String),

    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),

    #[error("Host '{0}' is not allowed")]
    HostNotAllowed(String),

    #[error("Invalid value for header '{0}'")]
    InvalidHeader(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream response body exceeds {0} bytes")]
    ResponseTooLarge(usize),

    #[error("Method {0} is not allowed here")]
    MethodNotAllowed(String),

    #[error("No resource at {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Stable snake_case code used in the envelope `error.code` field.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::MissingTarget(_) => "missing_target",
            RelayError::InvalidTarget(_) => "invalid_target",
            RelayError::HostNotAllowed(_) => "host_not_allowed",
            RelayError::InvalidHeader(_) => "invalid_header",
            RelayError::PayloadTooLarge(_) => "payload_too_large",
            RelayError::UpstreamTimeout(_) => "upstream_timeout",
            RelayError::UpstreamUnreachable(_) => "upstream_unreachable",
            RelayError::ResponseTooLarge(_) => "response_too_large",
            RelayError::MethodNotAllowed(_) => "method_not_allowed",
            RelayError::NotFound(_) => "not_found",
            RelayError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingTarget(_)
            | RelayError::InvalidTarget(_)
            | RelayError::InvalidHeader(_) => StatusCode::BAD_REQUEST,
            RelayError::HostNotAllowed(_) => StatusCode::FORBIDDEN,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::UpstreamUnreachable(_) | RelayError::ResponseTooLarge(_) => {
                StatusCode::BAD_GATEWAY
            }
            RelayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
