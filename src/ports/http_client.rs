use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the upstream fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for the single outbound call.
///
/// Implementations must not follow redirects or retry; the caller owns the
/// timeout and reads the body itself.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to the upstream
    ///
    /// # Arguments
    /// * `req` - The fully prepared outbound request
    ///
    /// # Returns
    /// A future that resolves to the upstream response (body still streaming) or an error
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
