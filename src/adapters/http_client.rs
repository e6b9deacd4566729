use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tracing::Instrument;

use crate::{
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup::create_backend_span,
};

const DEFAULT_USER_AGENT: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

/// HTTP client adapter using Hyper with Rustls.
///
/// Responsibilities:
/// * Fills in `User-Agent`, `Accept` and `Host` when the caller left them out
/// * Forces request version to HTTP/1.1
/// * Converts between Hyper body and Axum body types
///
/// No retries and no redirect following; one request in, one response out.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::info!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::debug!("Created upstream HTTP client");
        Ok(Self { client })
    }

    /// Inject `User-Agent` and `Accept` if absent.
    fn add_common_headers(req: &mut Request<AxumBody>) {
        let headers = req.headers_mut();
        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(
                header::USER_AGENT,
                HeaderValue::from_static(DEFAULT_USER_AGENT),
            );
        }
        if !headers.contains_key(header::ACCEPT) {
            headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        }
    }

    /// Derive `Host` from the URI unless an override is already present.
    fn ensure_host(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let Some(host) = req.uri().host() else {
            return Err(HttpClientError::InvalidRequest(format!(
                "Outgoing URI has no host: {}",
                req.uri()
            )));
        };
        if req.headers().contains_key(header::HOST) {
            return Ok(());
        }

        let authority = match req.uri().port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let value = HeaderValue::from_str(&authority)
            .map_err(|e| HttpClientError::InvalidRequest(format!("Invalid host header: {e}")))?;
        req.headers_mut().insert(header::HOST, value);
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::add_common_headers(&mut req);
        Self::ensure_host(&mut req)?;

        let upstream = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );
        let span = create_backend_span(&upstream, req.method().as_str(), req.uri().path());

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let outgoing = Request::from_parts(parts, body);

        let method = outgoing.method().clone();
        let uri = outgoing.uri().clone();
        let client = self.client.clone();

        async move {
            tracing::debug!("Outgoing request headers: {:?}", outgoing.headers());

            match client.request(outgoing).await {
                Ok(response) => {
                    tracing::Span::current().record("http.status_code", response.status().as_u16());

                    let (mut parts, hyper_body) = response.into_parts();
                    // The body is fully buffered by the caller; framing is ours to decide.
                    parts.headers.remove(header::TRANSFER_ENCODING);

                    Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
                }
                Err(e) => {
                    tracing::Span::current().record("http.status_code", 599u16);
                    tracing::error!("Error sending {} {}: {}", method, uri, e);

                    Err(HttpClientError::ConnectionError(format!(
                        "Request to {method} {uri} failed: {e}"
                    )))
                }
            }
        }
        .instrument(span)
        .await
    }
}
