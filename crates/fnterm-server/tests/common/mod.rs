//! Shared helpers for the fnterm-server integration tests.
//!
//! Each test builds a router over a fresh temp root and drives it with
//! `tower::ServiceExt::oneshot`, without a network listener.

#![allow(dead_code)]

use std::path::Path;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;

use fnterm_server::config::ServerConfig;
use fnterm_server::router::build_router;
use fnterm_server::state::AppState;

pub const MATH: &str = r#"
/// Adds two numbers together.
fn add(a: int, b: int) -> int {
    a + b
}

/// Subtracts two numbers.
fn subtract(a: int, b: int) -> int {
    a - b
}

/// Divides two numbers.
fn divide(a: int, b: int) -> float {
    a / b
}
"#;

pub const BOUNDARY: &str = "fnterm-test-boundary";

/// A temp root that lives as long as the router under test.
pub struct TestApp {
    pub root: TempDir,
    pub router: Router,
}

impl TestApp {
    pub fn functions_dir(&self) -> std::path::PathBuf {
        self.root.path().join("functions")
    }
}

/// Router over a temp root with `math.fn` installed.
pub fn test_app() -> TestApp {
    test_app_with(|root| {
        std::fs::create_dir_all(root.join("functions")).unwrap();
        std::fs::write(root.join("functions").join("math.fn"), MATH).unwrap();
    })
}

/// Router over a temp root prepared by `setup` before the state is built.
pub fn test_app_with(setup: impl FnOnce(&Path)) -> TestApp {
    test_app_configured(setup, |_| {})
}

pub fn test_app_configured(
    setup: impl FnOnce(&Path),
    configure: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    setup(root.path());
    let mut config = ServerConfig::rooted(root.path());
    configure(&mut config);
    let state = AppState::new(config).unwrap();
    TestApp {
        root,
        router: build_router(state),
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn into_json(response: Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, json)
}

/// Sends a GET request and returns (status, json).
pub async fn get_json(app: &TestApp, path: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    into_json(send(app, request).await).await
}

/// Sends a POST request with a JSON body and returns (status, json).
pub async fn post_json(
    app: &TestApp,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    into_json(send(app, request).await).await
}

/// One multipart part: (field name, optional file name, content).
pub type Part<'a> = (&'a str, Option<&'a str>, &'a str);

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = String::new();
    for (name, file_name, content) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match file_name {
            Some(file_name) => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
                ));
                body.push_str("Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                ));
            }
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body.into_bytes()
}

/// Sends a multipart POST and returns (status, json).
pub async fn post_multipart(
    app: &TestApp,
    path: &str,
    parts: &[Part<'_>],
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    into_json(send(app, request).await).await
}
