// End-to-end tests: the relay router talking to a local axum upstream
#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};

    use axum::{
        Router,
        body::{Body, Bytes},
        http::{HeaderMap, Method, Request, Response, StatusCode, Uri, header},
        response::IntoResponse,
        routing::{any, get},
    };
    use http_body_util::BodyExt;
    use relay::{
        FileSystemAdapter, HttpClientAdapter, HttpHandler, RelayService,
        adapters::build_router, config::models::ServerConfig, ports::http_client::HttpClient,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response<Body> {
        let seen: BTreeMap<String, String> = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let payload = serde_json::json!({
            "method": method.as_str(),
            "path": uri.path(),
            "headers": seen,
            "body": String::from_utf8_lossy(&body),
        });

        Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::SET_COOKIE, "tracking=1; Path=/")
            .header(header::SET_COOKIE, "session=rotated-value; Path=/; HttpOnly")
            .header(header::STRICT_TRANSPORT_SECURITY, "max-age=63072000")
            .header("x-upstream-marker", "echo")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    async fn slow() -> &'static str {
        tokio::time::sleep(Duration::from_secs(3)).await;
        "too late"
    }

    async fn logout() -> impl IntoResponse {
        (
            [(header::SET_COOKIE, "session=; Max-Age=0; Path=/")],
            "bye",
        )
    }

    async fn binary() -> impl IntoResponse {
        (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            vec![0xffu8, 0x00, 0xfe],
        )
    }

    // Ignores `accept-encoding: identity` and compresses anyway.
    async fn gzipped() -> impl IntoResponse {
        (
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CONTENT_ENCODING, "gzip"),
            ],
            vec![0x1fu8, 0x8b, 0x08, 0x00, 0xff],
        )
    }

    async fn start_upstream() -> SocketAddr {
        let app = Router::new()
            .route("/echo", any(echo))
            .route("/slow", get(slow))
            .route("/logout", get(logout))
            .route("/binary", get(binary))
            .route("/gzipped", get(gzipped));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn relay_router(timeout: &str) -> Router {
        let config = ServerConfig::builder()
            .allowed_host("127.0.0.1")
            .timeout(timeout)
            .build()
            .unwrap();

        let http_client = Arc::new(HttpClientAdapter::new().unwrap()) as Arc<dyn HttpClient>;
        let relay = Arc::new(RelayService::from_config(&config, http_client).unwrap());
        let handler = Arc::new(HttpHandler::new(
            relay,
            Arc::new(FileSystemAdapter::new()),
            &config,
        ));
        build_router(handler)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_forward_rewrites_headers_and_harvests_session() {
        let upstream = start_upstream().await;
        let app = relay_router("5s");

        let req = Request::builder()
            .method("POST")
            .uri("/relay")
            .header("x-relay-target", format!("http://{upstream}/echo"))
            .header("x-relay-session", "abc123")
            .header("x-relay-origin", format!("http://{upstream}"))
            .header("x-relay-referer", format!("http://{upstream}/login"))
            .header("x-request-id", "test-req-1")
            .header(header::COOKIE, "caller-cookie=1")
            .header("x-forwarded-for", "10.1.2.3")
            .header(header::CONTENT_TYPE, "text/plain")
            .header("x-custom", "kept")
            .body(Body::from("hello upstream"))
            .unwrap();

        let (status, headers, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-request-id"], "test-req-1");
        assert_eq!(json["success"], true);
        assert_eq!(json["status"], 200);
        assert_eq!(json["request_id"], "test-req-1");

        let data = &json["data"];
        assert_eq!(data["session"], "rotated-value");
        assert_eq!(data["body_encoding"], "utf8");
        assert_eq!(data["headers"]["x-upstream-marker"], "echo");
        assert!(data["headers"].get("set-cookie").is_none());
        assert!(data["headers"].get("strict-transport-security").is_none());
        assert!(data["headers"].get("content-length").is_none());

        let echoed: Value = serde_json::from_str(data["body"].as_str().unwrap()).unwrap();
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["body"], "hello upstream");

        let seen = &echoed["headers"];
        assert_eq!(seen["cookie"], "session=abc123");
        assert_eq!(seen["origin"], format!("http://{upstream}"));
        assert_eq!(seen["referer"], format!("http://{upstream}/login"));
        assert_eq!(seen["host"], upstream.to_string());
        assert_eq!(seen["accept-encoding"], "identity");
        assert_eq!(seen["content-type"], "text/plain");
        assert_eq!(seen["x-custom"], "kept");
        assert!(seen.get("x-forwarded-for").is_none());
        for control in [
            "x-relay-target",
            "x-relay-session",
            "x-relay-origin",
            "x-relay-referer",
        ] {
            assert!(seen.get(control).is_none(), "{control} leaked upstream");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_target_from_query_and_host_override() {
        let upstream = start_upstream().await;
        let app = relay_router("5s");

        let target: String =
            url::form_urlencoded::byte_serialize(format!("http://{upstream}/echo").as_bytes())
                .collect();
        let req = Request::builder()
            .uri(format!("/relay?url={target}"))
            .header("x-relay-host", format!("127.0.0.1:{}", upstream.port()))
            .body(Body::empty())
            .unwrap();

        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        let echoed: Value = serde_json::from_str(json["data"]["body"].as_str().unwrap()).unwrap();
        assert_eq!(echoed["method"], "GET");
        assert_eq!(
            echoed["headers"]["host"],
            format!("127.0.0.1:{}", upstream.port())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upstream_error_status_is_enveloped() {
        let upstream = start_upstream().await;
        let app = relay_router("5s");

        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", format!("http://{upstream}/does-not-exist"))
            .body(Body::empty())
            .unwrap();

        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert_eq!(json["status"], 404);
        assert_eq!(json["data"]["status"], 404);
        assert!(json["error"].is_null());
        assert!(json["data"]["session"].is_null());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_cleared_and_binary_body() {
        let upstream = start_upstream().await;
        let app = relay_router("5s");

        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", format!("http://{upstream}/logout"))
            .body(Body::empty())
            .unwrap();
        let (_, _, json) = send(&app, req).await;
        assert_eq!(json["data"]["session"], "");

        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", format!("http://{upstream}/binary"))
            .body(Body::empty())
            .unwrap();
        let (_, _, json) = send(&app, req).await;
        assert_eq!(json["data"]["body_encoding"], "base64");
        assert_eq!(json["data"]["body"], "/wD+");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_compressed_upstream_body_keeps_its_encoding() {
        let upstream = start_upstream().await;
        let app = relay_router("5s");

        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", format!("http://{upstream}/gzipped"))
            .body(Body::empty())
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);

        let data = &json["data"];
        assert_eq!(data["body_encoding"], "base64");
        assert_eq!(data["body"], "H4sIAP8=");
        assert_eq!(data["headers"]["content-encoding"], "gzip");
        assert_eq!(data["headers"]["content-type"], "application/json");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_control_value_cannot_smuggle_cookies() {
        let upstream = start_upstream().await;
        let app = relay_router("5s");

        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", format!("http://{upstream}/echo"))
            .header("x-relay-session", "abc; admin=1")
            .body(Body::empty())
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_header");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upstream_timeout() {
        let upstream = start_upstream().await;
        let app = relay_router("300ms");

        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", format!("http://{upstream}/slow"))
            .body(Body::empty())
            .unwrap();

        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["success"], false);
        assert_eq!(json["status"], 504);
        assert_eq!(json["error"]["code"], "upstream_timeout");
        assert!(json["data"].is_null());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejections() {
        let app = relay_router("5s");

        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", "https://evil.example.net/steal")
            .body(Body::empty())
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "host_not_allowed");

        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", "http://127.0.0.1/")
            .header("x-relay-host", "evil.example.net")
            .body(Body::empty())
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "host_not_allowed");

        let req = Request::builder()
            .uri("/relay")
            .body(Body::empty())
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "missing_target");

        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", "ftp://127.0.0.1/file")
            .body(Body::empty())
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_target");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_upstream() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let app = relay_router("5s");
        let req = Request::builder()
            .uri("/relay")
            .header("x-relay-target", format!("http://{addr}/"))
            .body(Body::empty())
            .unwrap();

        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "upstream_unreachable");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_and_fallback_routes() {
        let app = relay_router("5s");

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "healthy");
        assert_eq!(json["data"]["upstream"], "127.0.0.1");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ACCEPT_ENCODING, "gzip")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
    }
}
