//! End-to-end tests of the database API (`POST /database`).

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use common::*;

async fn db(app: &TestApp, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    post_json(app, "/database", body).await
}

async fn query(app: &TestApp, database: &str, sql: &str) -> (StatusCode, serde_json::Value) {
    db(app, json!({ "database": database, "query": sql })).await
}

#[tokio::test]
async fn start_creates_the_database() {
    let app = test_app();

    let (status, body) = db(&app, json!({ "command": "start", "database": "app.sqlite" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        "Database session started with 'app.sqlite'. File created if it did not exist."
    );
    assert!(app.root.path().join("database").join("app.sqlite").is_file());

    let (status, body) = db(&app, json!({ "command": "list-db" })).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["dbname"], "app.sqlite");
    assert!(entries[0]["size"].is_u64());
}

#[tokio::test]
async fn queries_return_rows_or_change_counts() {
    let app = test_app();
    db(&app, json!({ "command": "start", "database": "app.sqlite" })).await;

    let (status, body) = query(&app, "app.sqlite", "CREATE TABLE t (id INTEGER, name TEXT)").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "Success. 0 row(s) affected.");

    let (status, body) = query(&app, "app.sqlite", "SELECT * FROM t").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": [] }));

    let (_, body) = query(&app, "app.sqlite", "INSERT INTO t VALUES (1, 'Kofi'), (2, 'Ama')").await;
    assert_eq!(body["data"], "Success. 2 row(s) affected.");

    let (status, body) = query(&app, "app.sqlite", "SELECT name, id FROM t ORDER BY id").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([{ "name": "Kofi", "id": 1 }, { "name": "Ama", "id": 2 }])
    );
    let first = body["data"][0].as_object().unwrap();
    assert_eq!(first.keys().collect::<Vec<_>>(), vec!["name", "id"]);
}

#[tokio::test]
async fn engine_errors_carry_sqlstate() {
    let app = test_app();
    db(&app, json!({ "command": "start", "database": "app.sqlite" })).await;

    let (status, body) = query(&app, "app.sqlite", "SELECT * FROM missing").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("no such table"));
    assert!(body["sqlstate"].is_string());
}

#[tokio::test]
async fn failing_script_rolls_back_and_returns_partial_log() {
    let app = test_app();
    db(&app, json!({ "command": "start", "database": "app.sqlite" })).await;

    let script = "CREATE TABLE t (x INTEGER);\nINSERT INTO t VALUES (1);\nINSERT INTO nowhere VALUES (2);\n";
    let (status, body) = post_multipart(
        &app,
        "/database",
        &[
            ("command", None, "upload-sql"),
            ("database", None, "app.sqlite"),
            ("sqlFile", Some("seed.sql"), script),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let log = body["data"].as_array().unwrap();
    let statuses: Vec<_> = log.iter().map(|e| e["status"].clone()).collect();
    assert_eq!(statuses, vec![json!("success"), json!("success"), json!("error")]);
    assert_eq!(log[0]["sql"], "CREATE TABLE t (x INTEGER)");
    assert_eq!(log[1]["message"], "1 row(s) affected.");

    let (status, body) = db(&app, json!({ "command": "list-tbl", "database": "app.sqlite" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": [] }));
}

#[tokio::test]
async fn successful_script_commits() {
    let app = test_app();
    db(&app, json!({ "command": "start", "database": "app.sqlite" })).await;

    let script = "CREATE TABLE users (id INTEGER);\nCREATE VIEW active AS SELECT * FROM users;\nINSERT INTO users VALUES (1);";
    let (status, body) = post_multipart(
        &app,
        "/database",
        &[
            ("command", None, "upload-sql"),
            ("database", None, "app.sqlite"),
            ("sqlFile", Some("schema.sql"), script),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (_, body) = db(&app, json!({ "command": "list-tbl", "database": "app.sqlite" })).await;
    assert_eq!(body["data"], json!([{ "table_name": "users" }]));
    let (_, body) = db(&app, json!({ "command": "list-views", "database": "app.sqlite" })).await;
    assert_eq!(body["data"], json!([{ "view_name": "active" }]));
}

#[tokio::test]
async fn upload_sql_requires_a_sql_file() {
    let app = test_app();
    db(&app, json!({ "command": "start", "database": "app.sqlite" })).await;

    let (status, body) = post_multipart(
        &app,
        "/database",
        &[("command", None, "upload-sql"), ("database", None, "app.sqlite")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "File upload error. No .sql file received or upload failed."
    );

    let (status, body) = post_multipart(
        &app,
        "/database",
        &[
            ("command", None, "upload-sql"),
            ("database", None, "app.sqlite"),
            ("sqlFile", Some("seed.txt"), "SELECT 1"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid file type. Only .sql files are allowed.");
}

#[tokio::test]
async fn backup_rules() {
    let app = test_app();
    db(&app, json!({ "command": "start", "database": "a.sqlite" })).await;

    let (status, body) = db(
        &app,
        json!({ "command": "backup-db", "source_db": "a.sqlite", "dest_db": "a.sqlite" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict: Destination file 'a.sqlite' already exists.");

    let (status, body) = db(
        &app,
        json!({ "command": "backup-db", "source_db": "a.sqlite", "dest_db": "b.sqlite" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "Successfully backed up 'a.sqlite' to 'b.sqlite'.");

    let (status, _) = db(
        &app,
        json!({ "command": "backup-db", "source_db": "zz.sqlite", "dest_db": "c.sqlite" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = db(
        &app,
        json!({ "command": "backup-db", "source_db": "a.sqlite", "dest_db": "c.db" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = db(&app, json!({ "command": "backup-db", "source_db": "a.sqlite" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_the_active_database_succeeds() {
    let app = test_app();
    db(&app, json!({ "command": "start", "database": "active.sqlite" })).await;
    query(&app, "active.sqlite", "CREATE TABLE t (x)").await;

    let (status, body) = db(&app, json!({ "command": "delete-db", "database": "active.sqlite" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "Successfully deleted database 'active.sqlite'.");

    let (status, _) = query(&app, "active.sqlite", "SELECT * FROM t").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!app.root.path().join("database").join("active.sqlite").exists());
}

#[tokio::test]
async fn database_name_is_required_and_checked() {
    let app = test_app();

    let (status, body) = db(&app, json!({ "query": "SELECT 1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request. A \"database\" filename is required.");

    let (status, body) = db(&app, json!({ "database": "app.db", "query": "SELECT 1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid database file. Only .sqlite files are permitted.");

    db(&app, json!({ "command": "start", "database": "app.sqlite" })).await;
    let (status, body) = db(&app, json!({ "database": "app.sqlite" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request. A \"query\" is required.");
}

#[tokio::test]
async fn database_route_is_post_only() {
    let app = test_app();
    let request = Request::builder()
        .uri("/database")
        .body(Body::empty())
        .unwrap();
    let (status, body) = into_json(send(&app, request).await).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "Method Not Allowed.");
}
