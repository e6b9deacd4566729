//! Timeout-guarded forwarding to the single allow-listed upstream.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::body::Body as AxumBody;
use bytes::Bytes;
use eyre::{Result, WrapErr};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{
    Method, Request, StatusCode, Uri,
    header::{self, HeaderMap, HeaderValue},
};
use tokio::time::timeout;
use url::Url;

use crate::{
    config::models::ServerConfig,
    core::error::RelayError,
    ports::http_client::{HttpClient, HttpClientError},
};

/// Hostname allow-list holding exactly one upstream domain.
#[derive(Debug, Clone)]
pub struct HostAllowList {
    host: String,
    allow_subdomains: bool,
}

impl HostAllowList {
    pub fn new(host: &str, allow_subdomains: bool) -> Self {
        Self {
            host: normalize_host(host),
            allow_subdomains,
        }
    }

    pub fn allowed_host(&self) -> &str {
        &self.host
    }

    /// Case-insensitive hostname check, ignoring a trailing dot.
    pub fn is_allowed(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host == self.host {
            return true;
        }
        self.allow_subdomains
            && host
                .strip_suffix(self.host.as_str())
                .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.'))
    }

    /// Parse `raw` and make sure it is an http(s) URL pointing at the allowed host.
    pub fn validate_url(&self, raw: &str) -> Result<Url, RelayError> {
        let url = Url::parse(raw).map_err(|e| RelayError::InvalidTarget(format!("{raw}: {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RelayError::InvalidTarget(format!(
                "scheme must be 'http' or 'https', got '{}'",
                url.scheme()
            )));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(RelayError::InvalidTarget(
                "credentials in the URL are not accepted".to_string(),
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| RelayError::InvalidTarget(format!("{raw}: URL has no host")))?;

        if !self.is_allowed(host) {
            return Err(RelayError::HostNotAllowed(host.to_string()));
        }

        Ok(url)
    }

    /// Validate a `Host` override, which may carry a port.
    pub fn validate_authority(&self, authority: &str) -> Result<(), RelayError> {
        let parsed: http::uri::Authority = authority
            .parse()
            .map_err(|_| RelayError::InvalidHeader("host".to_string()))?;
        if !self.is_allowed(parsed.host()) {
            return Err(RelayError::HostNotAllowed(parsed.host().to_string()));
        }
        Ok(())
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// A fully prepared outbound request.
#[derive(Debug)]
pub struct ForwardRequest {
    pub method: Method,
    pub target: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What came back from the upstream, body fully read.
#[derive(Debug)]
pub struct UpstreamExchange {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub elapsed: Duration,
}

/// Issues the single outbound call under a timeout and captures timing.
pub struct Forwarder {
    client: Arc<dyn HttpClient>,
    allow_list: HostAllowList,
    timeout: Duration,
    max_response_body: usize,
    user_agent: Option<HeaderValue>,
}

impl Forwarder {
    pub fn new(
        client: Arc<dyn HttpClient>,
        allow_list: HostAllowList,
        timeout: Duration,
        max_response_body: usize,
    ) -> Self {
        Self {
            client,
            allow_list,
            timeout,
            max_response_body,
            user_agent: None,
        }
    }

    pub fn from_config(client: Arc<dyn HttpClient>, config: &ServerConfig) -> Result<Self> {
        let upstream = &config.upstream;
        let timeout = upstream
            .timeout_duration()
            .wrap_err_with(|| format!("Invalid upstream timeout '{}'", upstream.timeout))?;

        let mut forwarder = Self::new(
            client,
            HostAllowList::new(&upstream.allowed_host, upstream.allow_subdomains),
            timeout,
            config.limits.max_response_body_bytes,
        );
        if let Some(user_agent) = &upstream.user_agent {
            forwarder.user_agent = Some(
                HeaderValue::from_str(user_agent).wrap_err("Invalid upstream.user_agent")?,
            );
        }
        Ok(forwarder)
    }

    pub fn allow_list(&self) -> &HostAllowList {
        &self.allow_list
    }

    /// Send the request and read the whole response body, all within the timeout.
    pub async fn forward(&self, req: ForwardRequest) -> Result<UpstreamExchange, RelayError> {
        // Re-checked here so no caller can skip the allow-list.
        let url = self.allow_list.validate_url(req.target.as_str())?;
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e| RelayError::InvalidTarget(format!("{url}: {e}")))?;

        let mut outgoing = Request::builder()
            .method(req.method)
            .uri(uri)
            .body(AxumBody::from(req.body))
            .map_err(|e| RelayError::Internal(e.to_string()))?;
        *outgoing.headers_mut() = req.headers;

        if let Some(user_agent) = &self.user_agent {
            if !outgoing.headers().contains_key(header::USER_AGENT) {
                outgoing
                    .headers_mut()
                    .insert(header::USER_AGENT, user_agent.clone());
            }
        }

        let started = Instant::now();
        let exchange = async {
            let response = self.client.send_request(outgoing).await.map_err(|e| match e {
                HttpClientError::InvalidRequest(msg) => RelayError::InvalidTarget(msg),
                other => RelayError::UpstreamUnreachable(other.to_string()),
            })?;

            let (parts, body) = response.into_parts();
            let body = Limited::new(body, self.max_response_body)
                .collect()
                .await
                .map_err(|e| {
                    if e.downcast_ref::<LengthLimitError>().is_some() {
                        RelayError::ResponseTooLarge(self.max_response_body)
                    } else {
                        RelayError::UpstreamUnreachable(format!("reading response body: {e}"))
                    }
                })?
                .to_bytes();

            Ok::<_, RelayError>((parts.status, parts.headers, body))
        };

        let result = match timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::UpstreamTimeout(self.timeout)),
        };
        let elapsed = started.elapsed();

        match result {
            Ok((status, headers, body)) => {
                tracing::debug!(
                    target_url = %url,
                    status = status.as_u16(),
                    bytes = body.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Upstream exchange completed"
                );
                Ok(UpstreamExchange {
                    url,
                    status,
                    headers,
                    body,
                    elapsed,
                })
            }
            Err(e) => {
                tracing::warn!(
                    target_url = %url,
                    error = %e,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Upstream exchange failed"
                );
                Err(e)
            }
        }
    }
}
