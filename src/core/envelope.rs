//! Uniform JSON envelope returned by the forward and health endpoints.
use std::time::Instant;

use axum::body::Body as AxumBody;
use eyre::{Result, WrapErr};
use hyper::{
    Response, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::RelayError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request bookkeeping shared by the router and the responder.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub path: String,
    started: Instant,
}

impl RequestContext {
    /// Reuse a sane inbound `x-request-id`, otherwise mint a UUID v4.
    pub fn from_headers(headers: &HeaderMap, method: &str, path: &str) -> Self {
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| {
                !id.is_empty()
                    && id.len() <= 128
                    && id
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
            })
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            method: method.to_string(),
            path: path.to_string(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    pub success: bool,
    pub status: u16,
    pub data: Option<T>,
    pub error: Option<EnvelopeError>,
    pub elapsed_ms: u64,
    pub request_id: String,
    pub timestamp: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(status: StatusCode, data: T, ctx: &RequestContext) -> Self {
        Self {
            success: status.as_u16() < 400,
            status: status.as_u16(),
            data: Some(data),
            error: None,
            elapsed_ms: ctx.elapsed_ms(),
            request_id: ctx.request_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Serialize into an HTTP response with the given relay status.
    pub fn into_response(self, http_status: StatusCode) -> Result<Response<AxumBody>> {
        let body = serde_json::to_vec(&self).wrap_err("Failed to serialize envelope")?;
        let request_id = HeaderValue::from_str(&self.request_id)
            .wrap_err("Request id is not a valid header value")?;

        Response::builder()
            .status(http_status)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CACHE_CONTROL, "no-store")
            .header(REQUEST_ID_HEADER, request_id)
            .body(AxumBody::from(body))
            .wrap_err("Failed to build envelope response")
    }
}

impl Envelope {
    pub fn failure(err: &RelayError, ctx: &RequestContext) -> Self {
        Self {
            success: false,
            status: err.status().as_u16(),
            data: None,
            error: Some(EnvelopeError {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
            elapsed_ms: ctx.elapsed_ms(),
            request_id: ctx.request_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Log the outcome of a relayed request and build its envelope response.
///
/// Completed exchanges are answered with HTTP 200 whatever the upstream status;
/// relay failures use the error's own status.
pub fn respond<T: Serialize>(
    ctx: &RequestContext,
    target: Option<&str>,
    outcome: Result<(StatusCode, T), RelayError>,
) -> Result<Response<AxumBody>> {
    match outcome {
        Ok((upstream_status, data)) => {
            let envelope = Envelope::success(upstream_status, data, ctx);
            tracing::info!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                target = target.unwrap_or("-"),
                status = envelope.status,
                elapsed_ms = envelope.elapsed_ms,
                "Relayed request"
            );
            envelope.into_response(StatusCode::OK)
        }
        Err(err) => respond_error(ctx, target, &err),
    }
}

pub fn respond_error(
    ctx: &RequestContext,
    target: Option<&str>,
    err: &RelayError,
) -> Result<Response<AxumBody>> {
    let envelope = Envelope::failure(err, ctx);
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            target = target.unwrap_or("-"),
            code = err.code(),
            status = status.as_u16(),
            elapsed_ms = envelope.elapsed_ms,
            "Relay failed: {err}"
        );
    } else {
        tracing::warn!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            target = target.unwrap_or("-"),
            code = err.code(),
            status = status.as_u16(),
            elapsed_ms = envelope.elapsed_ms,
            "Relay rejected: {err}"
        );
    }
    envelope.into_response(status)
}
