/* Portalgate (AGPL-3.0)

Copyright (C) 2026 - Portalgate Contributors

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

*/

//! Router-level tests for the gateway's HTTP surface. Guard rejections,
//! control routes, and canonicalization are answered before anything goes on
//! the wire; the worker-negotiation branches are exercised against a
//! loopback upstream that records which requests actually reached it.

use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{header::LOCATION, Request, StatusCode},
    Router,
};
use portalgate::{
    config::{OriginMap, PassthroughConfig, ServerConfig, TelemetryConfig},
    gateway::{
        context::WORKER_VERSION_HEADER, pipe::Pipe, router, stages::RewritePipeline, GatewayState,
    },
    telemetry::TelemetrySink,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::util::ServiceExt;

fn test_router() -> Router {
    let origins = OriginMap::derive(&ServerConfig {
        bind_address: "127.0.0.1".into(),
        bind_port: 8000,
        public_origin: "https://portal.example.com".into(),
    })
    .expect("origin map");

    let state = Arc::new(GatewayState {
        origins,
        passthrough: PassthroughConfig::default(),
        pipe: Pipe::new().expect("pipe"),
        rewrites: RewritePipeline::build(),
        telemetry: TelemetrySink::new(TelemetryConfig::default()),
    });
    router(state)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8")
}

#[tokio::test]
async fn scheme_less_urls_redirect_to_a_corrected_absolute_url() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/example.com/hello?x=1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
        Some("https://portal.example.com/https://example.com/hello?x=1")
    );
}

#[tokio::test]
async fn unsupported_schemes_are_rejected_by_name() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/ftp://example.com/file")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_text(response).await;
    assert!(body.contains("ftp"), "body should name the scheme: {body}");
}

#[tokio::test]
async fn non_canonical_urls_redirect_to_the_canonical_form() {
    // An empty path normalizes to "/", so the spelled-out form differs from
    // what was requested and the router canonicalizes first.
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/https://example.com")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
        Some("https://portal.example.com/https://example.com/")
    );
}

#[tokio::test]
async fn worker_script_requires_a_service_worker_fetch() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/service-worker.js")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn worker_script_is_served_to_registering_browsers() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/service-worker.js")
                .header("service-worker", "script")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/javascript")
    );
    assert_eq!(
        response
            .headers()
            .get("service-worker-allowed")
            .and_then(|v| v.to_str().ok()),
        Some("/")
    );

    let body = body_text(response).await;
    assert!(body.contains("\"version\":2"));
    assert!(body.contains("portal.example.com"));
    assert!(body.contains("fonts.googleapis.com"));
}

#[tokio::test]
async fn home_page_describes_the_gateway() {
    let response = test_router()
        .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("portalgate"));
    assert!(body.contains("https://portal.example.com"));
}

/// Minimal loopback upstream: answers every request with an empty 200 of the
/// given content type and records the method of each request it saw.
async fn spawn_upstream(content_type: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("addr");
    let methods = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&methods);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            let method = head.split_whitespace().next().unwrap_or("").to_string();
            seen.lock().expect("lock").push(method);
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: {content_type}\r\n\
                 content-length: 0\r\nconnection: close\r\n\r\n"
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    (format!("127.0.0.1:{}", addr.port()), methods)
}

#[tokio::test]
async fn stale_workers_get_the_upgrade_page_without_upstream_contact() {
    let (addr, methods) = spawn_upstream("text/html").await;
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri(format!("/http://{addr}/page"))
                .header(WORKER_VERSION_HEADER, "1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("serviceWorker.register"));
    assert!(methods.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn current_workers_forward_directly_without_a_probe() {
    let (addr, methods) = spawn_upstream("application/octet-stream").await;
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri(format!("/http://{addr}/asset.bin"))
                .header(WORKER_VERSION_HEADER, "2")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*methods.lock().expect("lock"), vec!["GET".to_string()]);
}

#[tokio::test]
async fn first_contact_html_navigations_get_the_install_page() {
    let (addr, methods) = spawn_upstream("text/html; charset=utf-8").await;
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri(format!("/http://{addr}/article"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("serviceWorker.register"));
    // Only the content probe reached the upstream, never the real fetch.
    assert_eq!(*methods.lock().expect("lock"), vec!["HEAD".to_string()]);
}

#[tokio::test]
async fn first_contact_assets_forward_after_the_probe() {
    let (addr, methods) = spawn_upstream("image/png").await;
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri(format!("/http://{addr}/logo.png"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        *methods.lock().expect("lock"),
        vec!["HEAD".to_string(), "GET".to_string()]
    );
}

#[tokio::test]
async fn reinstall_page_unregisters_workers() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/service-worker-reinstall")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("getRegistrations"));
}
