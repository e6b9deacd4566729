//! Header transformation between the caller, the relay and the upstream.
//!
//! Inbound *control headers* are consumed by the relay and mapped onto the
//! outbound `Cookie`, `Host`, `Origin` and `Referer` headers. Everything on the
//! request deny-list is dropped before the mapped values are applied, so the
//! control headers are the only way to set those four headers upstream.
use std::collections::HashSet;

use eyre::{Result, WrapErr};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::{config::models::ServerConfig, core::error::RelayError};

/// Inbound headers never forwarded upstream.
pub const DEFAULT_REQUEST_DENY_LIST: &[&str] = &[
    // hop-by-hop, managed by the HTTP client
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    // only settable through control headers
    "cookie",
    "origin",
    "referer",
    // forced to identity
    "accept-encoding",
    // caller network identity
    "forwarded",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-forwarded-port",
    "x-real-ip",
    "cf-connecting-ip",
    "cf-ipcountry",
    "cf-ray",
    "cf-visitor",
    "true-client-ip",
];

/// Upstream response headers never relayed back in the envelope.
pub const DEFAULT_RESPONSE_DENY_LIST: &[&str] = &[
    "set-cookie",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "content-encoding",
    "upgrade",
    "trailer",
    "strict-transport-security",
    "alt-svc",
];

/// Resolved control header names.
#[derive(Debug, Clone)]
pub struct ControlHeaders {
    pub session: HeaderName,
    pub host: HeaderName,
    pub origin: HeaderName,
    pub referer: HeaderName,
    pub target: HeaderName,
}

impl ControlHeaders {
    fn contains(&self, name: &HeaderName) -> bool {
        [
            &self.session,
            &self.host,
            &self.origin,
            &self.referer,
            &self.target,
        ]
        .contains(&name)
    }
}

/// Everything the transformer needs: control names, deny-lists and the session cookie name.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    pub control: ControlHeaders,
    pub deny_request: HashSet<HeaderName>,
    pub deny_response: HashSet<HeaderName>,
    pub session_cookie: String,
}

/// Result of transforming inbound headers.
#[derive(Debug)]
pub struct OutboundHeaders {
    /// Headers to send upstream
    pub headers: HeaderMap,
    /// Raw target URL taken from the target control header
    pub target: Option<String>,
    /// Host override, already applied to `headers`
    pub host_override: Option<String>,
}

impl HeaderPolicy {
    /// Build the policy from configuration, merging configured deny-list
    /// extensions into the defaults.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let mapping = &config.headers.mapping;
        let control = ControlHeaders {
            session: parse_name(&mapping.session)?,
            host: parse_name(&mapping.host)?,
            origin: parse_name(&mapping.origin)?,
            referer: parse_name(&mapping.referer)?,
            target: parse_name(&mapping.target)?,
        };

        let deny_request = DEFAULT_REQUEST_DENY_LIST
            .iter()
            .copied()
            .chain(config.headers.deny_request.iter().map(String::as_str))
            .map(parse_name)
            .collect::<Result<HashSet<_>>>()?;

        let deny_response = DEFAULT_RESPONSE_DENY_LIST
            .iter()
            .copied()
            .chain(config.headers.deny_response.iter().map(String::as_str))
            .map(parse_name)
            .collect::<Result<HashSet<_>>>()?;

        Ok(Self {
            control,
            deny_request,
            deny_response,
            session_cookie: config.session.cookie_name.clone(),
        })
    }

    pub fn is_request_denied(&self, name: &HeaderName) -> bool {
        self.deny_request.contains(name)
    }

    pub fn is_response_denied(&self, name: &HeaderName) -> bool {
        self.deny_response.contains(name)
    }

    /// Map inbound control headers to outbound headers and drop everything denied.
    pub fn transform_request(&self, inbound: &HeaderMap) -> Result<OutboundHeaders, RelayError> {
        let mut headers = HeaderMap::with_capacity(inbound.len());

        for (name, value) in inbound {
            if self.control.contains(name) || self.is_request_denied(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        if let Some(session) = control_value(inbound, &self.control.session)? {
            if !session.bytes().all(is_cookie_octet) {
                return Err(RelayError::InvalidHeader(self.control.session.to_string()));
            }
            let cookie = format!("{}={session}", self.session_cookie);
            let value = HeaderValue::from_str(&cookie)
                .map_err(|_| RelayError::InvalidHeader(self.control.session.to_string()))?;
            headers.insert(header::COOKIE, value);
        }

        let host_override = control_value(inbound, &self.control.host)?;
        if let Some(host) = &host_override {
            headers.insert(header::HOST, to_header_value(host, &self.control.host)?);
        }

        if let Some(origin) = control_value(inbound, &self.control.origin)? {
            headers.insert(header::ORIGIN, to_header_value(&origin, &self.control.origin)?);
        }

        if let Some(referer) = control_value(inbound, &self.control.referer)? {
            headers.insert(
                header::REFERER,
                to_header_value(&referer, &self.control.referer)?,
            );
        }

        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );

        Ok(OutboundHeaders {
            headers,
            target: control_value(inbound, &self.control.target)?,
            host_override,
        })
    }
}

fn parse_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.trim().as_bytes())
        .wrap_err_with(|| format!("Invalid header name '{name}'"))
}

/// Read a control header as trimmed text; empty values count as absent.
fn control_value(headers: &HeaderMap, name: &HeaderName) -> Result<Option<String>, RelayError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let text = value
                .to_str()
                .map_err(|_| RelayError::InvalidHeader(name.to_string()))?
                .trim();
            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(text.to_string()))
            }
        }
    }
}

/// RFC 6265 `cookie-octet`: printable ASCII minus whitespace, `"`, `,`, `;` and `\`.
fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2b | 0x2d..=0x3a | 0x3c..=0x5b | 0x5d..=0x7e)
}

fn to_header_value(value: &str, source: &HeaderName) -> Result<HeaderValue, RelayError> {
    HeaderValue::from_str(value).map_err(|_| RelayError::InvalidHeader(source.to_string()))
}
