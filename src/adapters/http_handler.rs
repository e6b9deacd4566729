use std::{convert::Infallible, net::SocketAddr, path::Path, sync::Arc, time::Instant};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
    http::{Method, StatusCode, header},
    routing::any,
};
use eyre::{Result, WrapErr};
use hyper::Response;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::{
    adapters::{FileSystemAdapter, file_system::check_path},
    config::models::{ServerConfig, StaticFilesConfig},
    core::{
        RelayService,
        envelope::{Envelope, RequestContext, respond, respond_error},
        error::RelayError,
    },
    ports::file_system::{FileSystem, FileSystemError},
    tracing_setup::create_request_span,
};

const BUILTIN_PAGE: &str = include_str!("../../assets/index.html");

/// Routes each inbound request to the forward flow, the health check or the static fallback.
pub struct HttpHandler {
    relay: Arc<RelayService>,
    file_system: Arc<FileSystemAdapter>,
    forward_path: String,
    health_path: String,
    static_files: Option<StaticFilesConfig>,
    started: Instant,
}

impl HttpHandler {
    pub fn new(
        relay: Arc<RelayService>,
        file_system: Arc<FileSystemAdapter>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            relay,
            file_system,
            forward_path: config.forward_path.clone(),
            health_path: config.health_path.clone(),
            static_files: config.static_files.clone(),
            started: Instant::now(),
        }
    }

    /// Main request handler that routes requests appropriately
    pub async fn handle_request(
        &self,
        req: Request,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>> {
        let ctx =
            RequestContext::from_headers(req.headers(), req.method().as_str(), req.uri().path());
        let span = create_request_span(&ctx.method, &ctx.path, &ctx.request_id);

        async move {
            tracing::debug!(
                client = ?client_addr,
                "Handling {} request to {}",
                ctx.method,
                ctx.path
            );

            let response = if ctx.path == self.health_path {
                self.handle_health_check(req.method(), &ctx)?
            } else if ctx.path == self.forward_path {
                let outcome = self.relay.relay(req).await;
                respond(&ctx, outcome.target.as_deref(), outcome.result)?
            } else {
                self.handle_static(req, &ctx).await?
            };

            tracing::Span::current().record("http.status_code", response.status().as_u16());
            Ok(response)
        }
        .instrument(span)
        .await
    }

    fn handle_health_check(
        &self,
        method: &Method,
        ctx: &RequestContext,
    ) -> Result<Response<AxumBody>> {
        if *method != Method::GET && *method != Method::HEAD {
            let mut response =
                respond_error(ctx, None, &RelayError::MethodNotAllowed(method.to_string()))?;
            response
                .headers_mut()
                .insert(header::ALLOW, header::HeaderValue::from_static("GET, HEAD"));
            return Ok(response);
        }

        let data = serde_json::json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "upstream": self.relay.allow_list().allowed_host(),
            "uptime_secs": self.started.elapsed().as_secs(),
        });

        Envelope::success(StatusCode::OK, data, ctx).into_response(StatusCode::OK)
    }

    async fn handle_static(
        &self,
        req: Request,
        ctx: &RequestContext,
    ) -> Result<Response<AxumBody>> {
        if check_path(&ctx.path).is_err() {
            return plain_response(StatusCode::BAD_REQUEST, "Bad Request");
        }

        let root = self
            .static_files
            .as_ref()
            .filter(|cfg| Path::new(&cfg.root).is_dir());

        let Some(static_files) = root else {
            return self.builtin_page(req.method(), ctx);
        };

        match self
            .file_system
            .serve_file(&static_files.root, &static_files.index_file, &ctx.path, req)
            .await
        {
            Ok(response) => Ok(response),
            Err(FileSystemError::InvalidPath(reason)) => {
                tracing::warn!(path = %ctx.path, "Rejected static path: {reason}");
                plain_response(StatusCode::BAD_REQUEST, "Bad Request")
            }
            Err(e) => {
                tracing::error!(path = %ctx.path, "Failed to serve static file: {e}");
                plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    fn builtin_page(&self, method: &Method, ctx: &RequestContext) -> Result<Response<AxumBody>> {
        if *method != Method::GET && *method != Method::HEAD {
            return respond_error(ctx, None, &RelayError::NotFound(ctx.path.clone()));
        }

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(AxumBody::from(BUILTIN_PAGE))
            .wrap_err("Failed to build built-in page response")
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> Result<Response<AxumBody>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(AxumBody::from(body))
        .wrap_err("Failed to build plain response")
}

/// Build the axum router serving every path through `handler`.
///
/// The peer address is read from [`ConnectInfo`] when the server provides it.
pub fn build_router(handler: Arc<HttpHandler>) -> Router {
    let make_request_route = |handler: Arc<HttpHandler>| {
        any(move |req: Request| {
            let handler = handler.clone();
            async move {
                let client_addr = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| *addr);

                match handler.handle_request(req, client_addr).await {
                    Ok(response) => Ok::<Response<AxumBody>, Infallible>(response),
                    Err(e) => {
                        tracing::error!("Request handling error: {:?}", e);
                        let error_response = Response::builder()
                            .status(StatusCode::INTERNAL_SERVER_ERROR)
                            .body(AxumBody::from("Internal Server Error"))
                            .unwrap_or_else(|_| {
                                Response::new(AxumBody::from("Internal Server Error"))
                            });
                        Ok(error_response)
                    }
                }
            }
        })
    };

    // Layers go after the routes so they wrap them.
    Router::new()
        .route("/{*path}", make_request_route(handler.clone()))
        .route("/", make_request_route(handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
