//! Core relay orchestration.
//!
//! `RelayService` ties the three pure stages together for one inbound request:
//! * header transformation (control headers in, deny-list out)
//! * target resolution and the timeout‑guarded forward call
//! * response repackaging (session harvest, header stripping, body encoding)
//!
//! It owns no connection state; the only I/O happens behind the
//! [`HttpClient`] port held by the [`Forwarder`].
use std::sync::Arc;

use axum::body::Body as AxumBody;
use eyre::Result;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{Method, Request, StatusCode};

use crate::{
    config::models::ServerConfig,
    core::{
        error::RelayError,
        forwarder::{ForwardRequest, Forwarder, HostAllowList},
        headers::{HeaderPolicy, OutboundHeaders},
        repackager::{RelayPayload, repackage},
    },
    ports::http_client::HttpClient,
};

/// Query parameter consulted when the target control header is absent.
pub const TARGET_QUERY_PARAM: &str = "url";

pub struct RelayService {
    policy: HeaderPolicy,
    forwarder: Forwarder,
    max_request_body: usize,
}

/// Outcome of [`RelayService::relay`]: the resolved target (when known) and the result.
pub struct RelayOutcome {
    pub target: Option<String>,
    pub result: Result<(StatusCode, RelayPayload), RelayError>,
}

impl RelayService {
    pub fn new(policy: HeaderPolicy, forwarder: Forwarder, max_request_body: usize) -> Self {
        Self {
            policy,
            forwarder,
            max_request_body,
        }
    }

    /// Build the service from configuration and an HTTP client implementation.
    pub fn from_config(config: &ServerConfig, client: Arc<dyn HttpClient>) -> Result<Self> {
        Ok(Self::new(
            HeaderPolicy::from_config(config)?,
            Forwarder::from_config(client, config)?,
            config.limits.max_request_body_bytes,
        ))
    }

    pub fn allow_list(&self) -> &HostAllowList {
        self.forwarder.allow_list()
    }

    /// Relay one inbound request to the allow-listed upstream.
    pub async fn relay(&self, req: Request<AxumBody>) -> RelayOutcome {
        let (parts, body) = req.into_parts();

        let outbound = match self.policy.transform_request(&parts.headers) {
            Ok(outbound) => outbound,
            Err(e) => return RelayOutcome::failed(None, e),
        };

        let raw_target = outbound
            .target
            .clone()
            .or_else(|| target_from_query(parts.uri.query()));
        let Some(raw_target) = raw_target else {
            let err = RelayError::MissingTarget(self.policy.control.target.to_string());
            return RelayOutcome::failed(None, err);
        };

        let result = self
            .relay_to(raw_target.as_str(), parts.method, outbound, body)
            .await;
        RelayOutcome {
            target: Some(raw_target),
            result,
        }
    }

    async fn relay_to(
        &self,
        raw_target: &str,
        method: Method,
        outbound: OutboundHeaders,
        body: AxumBody,
    ) -> Result<(StatusCode, RelayPayload), RelayError> {
        let target = self.allow_list().validate_url(raw_target)?;
        if let Some(host) = &outbound.host_override {
            self.allow_list().validate_authority(host)?;
        }

        let body = Limited::new(body, self.max_request_body)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    RelayError::PayloadTooLarge(self.max_request_body)
                } else {
                    RelayError::Internal(format!("reading request body: {e}"))
                }
            })?
            .to_bytes();

        let exchange = self
            .forwarder
            .forward(ForwardRequest {
                method,
                target,
                headers: outbound.headers,
                body,
            })
            .await?;

        let status = exchange.status;
        Ok((status, repackage(exchange, &self.policy)))
    }
}

impl RelayOutcome {
    fn failed(target: Option<String>, err: RelayError) -> Self {
        Self {
            target,
            result: Err(err),
        }
    }
}

fn target_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == TARGET_QUERY_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
