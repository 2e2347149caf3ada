//! HTTP image fetcher tests against a loopback server

mod common;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use common::{sample_png, service_with, StubBackend, StubMask};
use imgly_segment_api::{
    error::SegmentError,
    services::{validate_image_url, HttpImageFetcher, ImageFetcher, MemorySink},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const MAX_BYTES: u64 = 64 * 1024;

async fn png_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], sample_png(24, 12))
}

async fn html_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html")],
        "<!doctype html><title>Not found</title>",
    )
}

async fn huge_handler() -> impl IntoResponse {
    vec![0u8; MAX_BYTES as usize + 1]
}

async fn slow_handler() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(5)).await;
    sample_png(4, 4)
}

async fn error_handler() -> impl IntoResponse {
    (StatusCode::SERVICE_UNAVAILABLE, "try later")
}

async fn spawn_source_server() -> SocketAddr {
    let app = Router::new()
        .route("/cat.png", get(png_handler))
        .route("/page.html", get(html_handler))
        .route("/huge.bin", get(huge_handler))
        .route("/slow.png", get(slow_handler))
        .route("/error.png", get(error_handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    address
}

fn fetcher() -> HttpImageFetcher {
    HttpImageFetcher::new(Duration::from_secs(5), MAX_BYTES).unwrap()
}

fn url(address: SocketAddr, path: &str) -> reqwest::Url {
    validate_image_url(&format!("http://{address}{path}")).unwrap()
}

#[tokio::test]
async fn test_fetches_image_bytes() {
    let address = spawn_source_server().await;

    let bytes = fetcher().fetch(&url(address, "/cat.png")).await.unwrap();

    assert_eq!(bytes, sample_png(24, 12));
}

#[tokio::test]
async fn test_error_statuses_are_network_errors() {
    let address = spawn_source_server().await;

    let err = fetcher().fetch(&url(address, "/missing.png")).await.unwrap_err();
    assert!(matches!(err, SegmentError::Network(_)), "{err:?}");
    assert!(err.to_string().contains("404"));

    let err = fetcher().fetch(&url(address, "/error.png")).await.unwrap_err();
    assert!(err.to_string().contains("503"));
    assert!(err.is_upstream_error());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let address = spawn_source_server().await;

    let err = fetcher().fetch(&url(address, "/huge.bin")).await.unwrap_err();

    assert!(matches!(err, SegmentError::Network(_)), "{err:?}");
    assert!(err.to_string().contains("byte limit"));
}

#[tokio::test]
async fn test_slow_source_times_out() {
    let address = spawn_source_server().await;
    let fetcher = HttpImageFetcher::new(Duration::from_millis(200), MAX_BYTES).unwrap();

    let err = fetcher.fetch(&url(address, "/slow.png")).await.unwrap_err();

    assert!(matches!(err, SegmentError::Network(_)), "{err:?}");
}

#[tokio::test]
async fn test_closed_port_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let err = fetcher().fetch(&url(address, "/cat.png")).await.unwrap_err();

    assert!(matches!(err, SegmentError::Network(_)), "{err:?}");
}

#[tokio::test]
async fn test_service_with_http_fetcher() {
    let address = spawn_source_server().await;
    let sink = Arc::new(MemorySink::new());
    let service = service_with(
        StubBackend::new(StubMask::Ramp),
        Arc::new(fetcher()),
        sink.clone(),
    );

    let outcome = service
        .segment_url(&format!("http://{address}/cat.png"))
        .await
        .unwrap();
    assert_eq!(outcome.dimensions, (24, 12));
    assert_eq!(sink.len(), 1);

    let err = service
        .segment_url(&format!("http://{address}/page.html"))
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentError::Decode(_)), "{err:?}");
    assert_eq!(sink.len(), 1);
}
