#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use roadscan_api::config::ServerConfig;
use roadscan_api::router::build_app_router;
use roadscan_api::state::AppState;
use roadscan_api::ws::WsManager;
use roadscan_core::demo::DemoRegistry;
use roadscan_events::NotificationBus;
use roadscan_ingest::media::{MediaError, MediaTools};
use roadscan_ingest::{IngestConfig, IngestManager};
use roadscan_remote::InMemoryBackend;

pub const BOUNDARY: &str = "roadscan-test-boundary";

/// Media toolkit that never shells out to ffmpeg.
pub struct FakeMedia;

#[async_trait]
impl MediaTools for FakeMedia {
    async fn probe_duration(&self, _path: &Path) -> Result<f64, MediaError> {
        Ok(30.0)
    }

    async fn capture_frame(&self, _path: &Path, _offset_secs: f64) -> Result<Vec<u8>, MediaError> {
        Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
    }
}

pub struct TestApp {
    pub router: Router,
    pub ingest: Arc<IngestManager>,
    pub backend: Arc<InMemoryBackend>,
    pub spool: TempDir,
}

/// Build a test `ServerConfig` spooling into `spool_dir`.
pub fn test_config(spool_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        spool_dir: spool_dir.to_path_buf(),
        max_upload_mb: 16,
        ws_heartbeat_secs: 30,
        backend_url: None,
    }
}

/// Build the full application router over an in-memory backend.
///
/// Uses the same router builder as `main.rs`, so every middleware layer is
/// exercised. The poller is not started; tests drive it with `poll_once`.
pub fn build_test_app() -> TestApp {
    let spool = tempfile::tempdir().expect("create spool dir");
    let config = test_config(spool.path());

    let backend = Arc::new(InMemoryBackend::new());
    let ingest_config = IngestConfig {
        poll_interval: Duration::from_secs(3600),
        demo_step_delay: Duration::ZERO,
        ..IngestConfig::default()
    };
    let ingest = IngestManager::new(
        backend.clone(),
        Arc::new(FakeMedia),
        DemoRegistry::builtin(),
        Arc::new(NotificationBus::default()),
        &ingest_config,
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        ingest: ingest.clone(),
        ws_manager: Arc::new(WsManager::new()),
    };

    TestApp {
        router: build_app_router(state, &config),
        ingest,
        backend,
        spool,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn post_empty(app: &TestApp, uri: &str) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

/// One part of a `multipart/form-data` body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        file_name: &'a str,
        bytes: &'a [u8],
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                field,
                file_name,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: &TestApp, uri: &str, parts: &[Part<'_>]) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap(),
    )
    .await
}

/// Standard survey text fields.
pub fn survey_parts() -> Vec<Part<'static>> {
    vec![
        Part::Text("route_id", "R5"),
        Part::Text("survey_date", "2025-03-14"),
        Part::Text("surveyor_name", "Asha"),
    ]
}

/// Entries currently left in the spool directory.
pub fn spooled_entries(app: &TestApp) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(app.spool.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Upload `names` through the API and wait for the transfers to finish.
/// Returns the local ids in batch order.
pub async fn upload_and_settle(app: &TestApp, names: &[&str]) -> Vec<String> {
    let mut parts: Vec<Part<'_>> = survey_parts();
    for name in names {
        parts.push(Part::File {
            field: "files",
            file_name: *name,
            bytes: b"not really a video",
        });
    }
    let response = post_multipart(app, "/api/v1/videos/upload", &parts).await;
    assert_eq!(response.status(), 202);
    let json = body_json(response).await;
    app.ingest.wait_idle().await;
    json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["localId"].as_str().unwrap().to_string())
        .collect()
}
