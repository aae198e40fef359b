//! End-to-end tests of the session gate and the `/auth` routes.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;

use fnterm_server::credentials::hash_password;

use common::*;

fn app_with_credentials(env: &str) -> TestApp {
    app_with_credentials_and_ttl(env, Duration::from_secs(3600))
}

fn app_with_credentials_and_ttl(env: &str, ttl: Duration) -> TestApp {
    let env = env.to_string();
    test_app_configured(
        move |root| {
            std::fs::create_dir_all(root.join("functions")).unwrap();
            std::fs::write(root.join("functions").join("math.fn"), MATH).unwrap();
            std::fs::write(root.join(".env"), env).unwrap();
        },
        |config| config.session_ttl = ttl,
    )
}

fn admin_env() -> String {
    let hash = hash_password("pass123").unwrap();
    format!("# operator account\nAPP_USER=admin\nAPP_PASSWORD='{hash}'\n")
}

fn secured_app() -> TestApp {
    app_with_credentials(&admin_env())
}

async fn login(app: &TestApp, body: serde_json::Value) -> (StatusCode, Option<String>, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = send(app, request).await;
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let (status, json) = into_json(response).await;
    (status, cookie, json)
}

async fn get_with_cookie(app: &TestApp, path: &str, cookie: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .uri(path)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    into_json(send(app, request).await).await
}

#[tokio::test]
async fn without_credentials_everything_is_open() {
    let app = test_app();

    let (status, body) = get_json(&app, "/auth/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "auth_enabled": false }));

    let (status, _) = get_json(&app, "/api/list").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = login(&app, json!({ "username": "a", "password": "b" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "success": false, "error": "Authorization is not enabled on this server." })
    );
}

#[tokio::test]
async fn gate_rejects_requests_without_a_session() {
    let app = secured_app();

    let (_, body) = get_json(&app, "/auth/status").await;
    assert_eq!(body, json!({ "auth_enabled": true }));

    let (status, body) = get_json(&app, "/api/list").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Authentication required." }));

    let (status, _) = post_json(&app, "/database", json!({ "command": "list-db" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_with_cookie(&app, "/api/list", "fnterm_session=forged").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_session_and_logout() {
    let app = secured_app();

    let (status, cookie, body) =
        login(&app, json!({ "username": "admin", "password": "pass123" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    let cookie = cookie.expect("session cookie");
    assert!(cookie.starts_with("fnterm_session="));

    let (status, body) = get_with_cookie(&app, "/api/add?p0=1&p1=2", &cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(3));

    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, body) = into_json(send(&app, request).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, _) = get_with_cookie(&app, "/api/list", &cookie).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_failures() {
    let app = secured_app();

    let (status, cookie, body) =
        login(&app, json!({ "username": "admin", "password": "wrong" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(cookie.is_none());
    assert_eq!(body["error"], "Invalid credentials.");

    let (status, _, body) = login(&app, json!({ "username": "admin" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username and password are required.");
}

#[tokio::test]
async fn master_account_can_log_in() {
    let app_hash = hash_password("pass123").unwrap();
    let master_hash = hash_password("root-secret").unwrap();
    let app = app_with_credentials(&format!(
        "APP_USER=admin\nAPP_PASSWORD={app_hash}\nMASTER_USER=root\nMASTER_PASSWORD={master_hash}\n"
    ));

    let (status, cookie, _) =
        login(&app, json!({ "username": "root", "password": "root-secret" })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_some());
}

#[tokio::test]
async fn incomplete_credential_file_is_a_server_error() {
    let app = app_with_credentials("MASTER_USER=root\n");

    let (status, _, body) = login(&app, json!({ "username": "root", "password": "x" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "Server is not configured correctly. APP_USER or APP_PASSWORD missing."
    );
}

#[tokio::test]
async fn expired_session_is_rejected() {
    let app = app_with_credentials_and_ttl(&admin_env(), Duration::ZERO);

    let (status, cookie, _) =
        login(&app, json!({ "username": "admin", "password": "pass123" })).await;
    assert_eq!(status, StatusCode::OK);
    let cookie = cookie.expect("session cookie");

    let (status, body) = get_with_cookie(&app, "/api/list", &cookie).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Authentication required." }));
}
