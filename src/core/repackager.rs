//! Turns an [`UpstreamExchange`] into the payload carried by the envelope.
use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::core::{forwarder::UpstreamExchange, headers::HeaderPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    Utf8,
    Base64,
}

/// Upstream result as relayed to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayPayload {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub body_encoding: BodyEncoding,
    /// `None`: upstream did not touch the session. `Some("")`: session cleared.
    pub session: Option<String>,
}

pub fn repackage(exchange: UpstreamExchange, policy: &HeaderPolicy) -> RelayPayload {
    let session = extract_session(&exchange.headers, &policy.session_cookie);
    let headers = relayed_headers(&exchange.headers, policy);
    let (body, body_encoding) = match String::from_utf8(exchange.body.to_vec()) {
        Ok(text) => (text, BodyEncoding::Utf8),
        Err(_) => (STANDARD.encode(&exchange.body), BodyEncoding::Base64),
    };

    RelayPayload {
        url: exchange.url.to_string(),
        status: exchange.status.as_u16(),
        headers,
        body,
        body_encoding,
        session,
    }
}

/// Find the updated session value in the upstream `Set-Cookie` headers.
///
/// The last matching cookie wins. An expiring cookie (`Max-Age<=0`) or an empty
/// value yields `Some("")`.
pub fn extract_session(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| parse_set_cookie(raw, cookie_name))
        .last()
}

fn parse_set_cookie(raw: &str, cookie_name: &str) -> Option<String> {
    let mut segments = raw.split(';');
    let (name, value) = segments.next()?.split_once('=')?;
    if name.trim() != cookie_name {
        return None;
    }

    let expired = segments.any(|attr| {
        attr.split_once('=').is_some_and(|(key, val)| {
            key.trim().eq_ignore_ascii_case("max-age")
                && val.trim().parse::<i64>().is_ok_and(|age| age <= 0)
        })
    });
    if expired {
        return Some(String::new());
    }

    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Some(value.to_string())
}

fn relayed_headers(headers: &HeaderMap, policy: &HeaderPolicy) -> BTreeMap<String, String> {
    let mut relayed: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        if policy.is_response_denied(name) && !is_body_encoding(name, value) {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes());
        relayed
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    relayed
}

/// A non-identity `Content-Encoding` describes the body we relay as-is, so it must survive.
fn is_body_encoding(name: &HeaderName, value: &HeaderValue) -> bool {
    *name == header::CONTENT_ENCODING
        && !value
            .to_str()
            .is_ok_and(|v| v.trim().eq_ignore_ascii_case("identity"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use hyper::StatusCode;
    use url::Url;

    use super::*;
    use crate::config::models::ServerConfig;

    fn policy() -> HeaderPolicy {
        let config = ServerConfig::builder()
            .allowed_host("api.example.com")
            .cookie_name("sid")
            .build()
            .unwrap();
        HeaderPolicy::from_config(&config).unwrap()
    }

    fn set_cookies(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append(header::SET_COOKIE, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    fn exchange(headers: HeaderMap, body: &'static [u8]) -> UpstreamExchange {
        UpstreamExchange {
            url: Url::parse("https://api.example.com/v1/me").unwrap(),
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(body),
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn test_extract_session_last_match_wins() {
        let headers = set_cookies(&[
            "sid=first; Path=/",
            "other=1; Path=/",
            "sid=\"second\"; HttpOnly; Secure",
        ]);
        assert_eq!(extract_session(&headers, "sid").as_deref(), Some("second"));
    }

    #[test]
    fn test_extract_session_absent_and_cleared() {
        let headers = set_cookies(&["other=1"]);
        assert_eq!(extract_session(&headers, "sid"), None);

        let headers = set_cookies(&["sid=gone; Max-Age=0; Path=/"]);
        assert_eq!(extract_session(&headers, "sid").as_deref(), Some(""));

        let headers = set_cookies(&["sid=; Path=/"]);
        assert_eq!(extract_session(&headers, "sid").as_deref(), Some(""));
    }

    #[test]
    fn test_extract_session_name_must_match_exactly() {
        let headers = set_cookies(&["sid2=nope", "xsid=nope"]);
        assert_eq!(extract_session(&headers, "sid"), None);
    }

    #[test]
    fn test_repackage_strips_denied_and_joins_values() {
        let mut headers = set_cookies(&["sid=new-session; Path=/"]);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        headers.append("x-trace", HeaderValue::from_static("a"));
        headers.append("x-trace", HeaderValue::from_static("b"));

        let payload = repackage(exchange(headers, b"hello"), &policy());

        assert_eq!(payload.session.as_deref(), Some("new-session"));
        assert_eq!(payload.status, 200);
        assert_eq!(payload.url, "https://api.example.com/v1/me");
        assert_eq!(payload.body, "hello");
        assert_eq!(payload.body_encoding, BodyEncoding::Utf8);
        assert_eq!(payload.headers["content-type"], "text/plain");
        assert_eq!(payload.headers["x-trace"], "a, b");
        assert!(!payload.headers.contains_key("set-cookie"));
        assert!(!payload.headers.contains_key("content-length"));
    }

    #[test]
    fn test_content_encoding_kept_for_undecoded_body() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let payload = repackage(exchange(headers, &[0x1f, 0x8b, 0x08, 0x00]), &policy());
        assert_eq!(payload.body_encoding, BodyEncoding::Base64);
        assert_eq!(payload.headers["content-encoding"], "gzip");

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("identity"));
        let payload = repackage(exchange(headers, b"plain"), &policy());
        assert!(!payload.headers.contains_key("content-encoding"));
    }

    #[test]
    fn test_binary_body_is_base64() {
        let payload = repackage(exchange(HeaderMap::new(), &[0xff, 0x00, 0xfe]), &policy());
        assert_eq!(payload.body_encoding, BodyEncoding::Base64);
        assert_eq!(payload.body, "/wD+");
        assert_eq!(payload.session, None);
    }
}
