//! Tests of the network upstream client against a local mock upstream.
//!
//! The mock is a small Axum app bound to `127.0.0.1:0`, so these tests need
//! no external services.
//!
//! Run with: `cargo test --test http_upstream_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use posts_proxy::proxy::{ProxyRequest, UpstreamClient};
use posts_proxy::{
    AppState, Config, HttpUpstream, ProxyServer, ShutdownOutcome, TransportError, build_router,
};

const LARGE_BODY_LEN: usize = 4 * 1024 * 1024;

// =============================================================================
// Mock upstream
// =============================================================================

async fn list_posts() -> Response {
    (
        [
            (header::SET_COOKIE, "a=1"),
            (header::SET_COOKIE, "b=2"),
        ],
        Json(json!([{ "id": 1, "title": "first" }, { "id": 2, "title": "second" }])),
    )
        .into_response()
}

async fn create_post(headers: HeaderMap, body: Bytes) -> Response {
    let tags: Vec<&str> = headers
        .get_all("x-tag")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    (
        StatusCode::CREATED,
        Json(json!({
            "received_len": body.len(),
            "received": String::from_utf8_lossy(&body),
            "tags": tags,
            "host": host,
        })),
    )
        .into_response()
}

async fn get_post(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "404" => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
        "large" => vec![b'x'; LARGE_BODY_LEN].into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "too late".into_response()
        }
        _ => Json(json!({ "id": id })).into_response(),
    }
}

async fn delete_post() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Start the mock upstream and return its base URL.
async fn spawn_upstream() -> (String, SocketAddr) {
    let app = Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post).delete(delete_post))
        .layer(DefaultBodyLimit::disable());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), addr)
}

fn client() -> HttpUpstream {
    HttpUpstream::new(Duration::from_secs(10), Duration::from_secs(5)).unwrap()
}

fn proxy_request(method: Method, url: String, headers: HeaderMap, body: Body) -> ProxyRequest {
    ProxyRequest {
        method,
        url,
        headers,
        body,
    }
}

async fn read_body(body: Body) -> Bytes {
    axum::body::to_bytes(body, usize::MAX).await.unwrap()
}

// =============================================================================
// HttpUpstream
// =============================================================================

mod http_upstream {
    use super::*;

    #[tokio::test]
    async fn test_get_collection() {
        let (base, _) = spawn_upstream().await;

        let response = client()
            .forward(proxy_request(
                Method::GET,
                format!("{base}/posts"),
                HeaderMap::new(),
                Body::empty(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        let cookies: Vec<_> = response.headers.get_all("set-cookie").iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);

        let posts: Value = serde_json::from_slice(&read_body(response.body).await).unwrap();
        assert_eq!(posts.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_post_forwards_body_and_headers_and_rewrites_host() {
        let (base, addr) = spawn_upstream().await;

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "proxy.example".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers.append("x-tag", "one".parse().unwrap());
        headers.append("x-tag", "two".parse().unwrap());

        let response = client()
            .forward(proxy_request(
                Method::POST,
                format!("{base}/posts"),
                headers,
                Body::from(r#"{"title":"foo"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        let echo: Value = serde_json::from_slice(&read_body(response.body).await).unwrap();
        assert_eq!(echo["received"], r#"{"title":"foo"}"#);
        assert_eq!(echo["tags"], json!(["one", "two"]));
        assert_eq!(echo["host"], addr.to_string());
    }

    #[tokio::test]
    async fn test_error_status_is_a_response_not_an_error() {
        let (base, _) = spawn_upstream().await;

        let response = client()
            .forward(proxy_request(
                Method::GET,
                format!("{base}/posts/404"),
                HeaderMap::new(),
                Body::empty(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.status_text(), "404 Not Found");
    }

    #[tokio::test]
    async fn test_large_body_is_streamed_back() {
        let (base, _) = spawn_upstream().await;

        let response = client()
            .forward(proxy_request(
                Method::GET,
                format!("{base}/posts/large"),
                HeaderMap::new(),
                Body::empty(),
            ))
            .await
            .unwrap();

        assert_eq!(read_body(response.body).await.len(), LARGE_BODY_LEN);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_timeout() {
        let (base, _) = spawn_upstream().await;
        let client =
            HttpUpstream::new(Duration::from_millis(200), Duration::from_millis(200)).unwrap();

        let result = client
            .forward(proxy_request(
                Method::GET,
                format!("{base}/posts/slow"),
                HeaderMap::new(),
                Body::empty(),
            ))
            .await;

        assert!(matches!(result, Err(TransportError::Timeout(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client()
            .forward(proxy_request(
                Method::GET,
                format!("http://{addr}/posts"),
                HeaderMap::new(),
                Body::empty(),
            ))
            .await;

        assert!(result.is_err());
    }
}

// =============================================================================
// Full server over TCP
// =============================================================================

mod end_to_end {
    use super::*;

    /// Start the proxy in front of `upstream_base` and return its address
    /// plus a trigger that stops it.
    async fn spawn_proxy(
        upstream_base: String,
    ) -> (
        SocketAddr,
        tokio::sync::oneshot::Sender<()>,
        tokio::task::JoinHandle<std::io::Result<ShutdownOutcome>>,
    ) {
        let config = Config {
            upstream_base_url: upstream_base,
            ..Config::default()
        };
        let state = AppState::new(Arc::new(client()), config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = ProxyServer::from_listener(listener, build_router(state));
        let addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run_until(
                    async move {
                        let _ = stop_rx.await;
                    },
                    Duration::from_secs(5),
                )
                .await
        });

        (addr, stop_tx, handle)
    }

    #[tokio::test]
    async fn test_proxy_round_trip_over_tcp() {
        let (upstream, _) = spawn_upstream().await;
        let (addr, stop, handle) = spawn_proxy(upstream).await;
        let http = reqwest::Client::new();

        let list = http
            .get(format!("http://{addr}/api/posts"))
            .send()
            .await
            .unwrap();
        assert_eq!(list.status(), reqwest::StatusCode::OK);
        let cookies: Vec<_> = list.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);
        let posts: Value = serde_json::from_str(&list.text().await.unwrap()).unwrap();
        assert_eq!(posts[0]["title"], "first");

        let created = http
            .post(format!("http://{addr}/api/posts"))
            .header("content-type", "application/json")
            .body(r#"{"title":"new"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), reqwest::StatusCode::CREATED);

        let deleted = http
            .delete(format!("http://{addr}/api/posts/7"))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), reqwest::StatusCode::NO_CONTENT);

        let missing = http
            .get(format!("http://{addr}/api/posts/404"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        stop.send(()).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), ShutdownOutcome::Drained);
    }

    #[tokio::test]
    async fn test_rejections_over_tcp() {
        let (upstream, _) = spawn_upstream().await;
        let (addr, stop, handle) = spawn_proxy(upstream).await;
        let http = reqwest::Client::new();

        let bad_id = http
            .get(format!("http://{addr}/api/posts/abc"))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_id.status(), reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(bad_id.text().await.unwrap(), "Invalid post ID\n");

        let wrong_method = http
            .patch(format!("http://{addr}/api/posts"))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong_method.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(wrong_method.headers()["allow"], "GET, POST");

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_server_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let (addr, stop, handle) = spawn_proxy(dead).await;

        let response = reqwest::get(format!("http://{addr}/api/posts/1"))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            reqwest::StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(response.text().await.unwrap(), "Server Error\n");

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
