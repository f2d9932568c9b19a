//! Request-level tests for the dashboard router.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use tabledash::config::parse_config;
use tabledash::core::db::{ConnectionParams, DatabaseHandler};
use tabledash::dashboard::routes::SESSION_COOKIE;
use tabledash::payload::{Payload, Value};
use tabledash::dashboard::{AppState, Dashboard};

const BOUNDARY: &str = "tabledash-boundary";

fn db_path(dir: &TempDir) -> String {
    dir.path().join("dash.db").to_string_lossy().into_owned()
}

fn test_state(dir: &TempDir, dashboard: &str) -> Arc<AppState> {
    let config = parse_config(&format!(
        "[database]\npath = {:?}\n\n[dashboard]\non_error = \"report\"\npage_size = 10\n{}",
        db_path(dir),
        dashboard
    ))
    .unwrap();
    Arc::new(AppState::new(&config))
}

fn test_router(dir: &TempDir) -> Router {
    Dashboard::build_router(test_state(dir, ""))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Loads the page once and returns the `name=value` part of the session cookie.
async fn open_session(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_string()
}

async fn get(router: &Router, uri: &str, cookie: &str) -> axum::response::Response {
    router
        .clone()
        .oneshot(
            Request::get(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn post_form(router: &Router, uri: &str, cookie: &str, form: &str) -> StatusCode {
    router
        .clone()
        .oneshot(
            Request::post(uri)
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

async fn post_csv(router: &Router, cookie: &str, file_name: &str, csv: &str) -> StatusCode {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = file_name,
        csv = csv
    );
    router
        .clone()
        .oneshot(
            Request::post("/upload")
                .header(header::COOKIE, cookie)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_first_visit_sets_session_cookie() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);

    let cookie = open_session(&router).await;
    assert!(cookie.starts_with(&format!("{}=", SESSION_COOKIE)));

    let html = body_text(get(&router, "/", &cookie).await).await;
    assert!(html.contains("No tables yet."));
}

#[tokio::test]
async fn test_save_without_name_shows_message() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);
    let cookie = open_session(&router).await;

    let status = post_form(&router, "/save", &cookie, "table_name=&mode=create").await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let html = body_text(get(&router, "/", &cookie).await).await;
    assert!(html.contains("Enter a name for the table"));
}

#[tokio::test]
async fn test_upload_save_and_delete() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);
    let cookie = open_session(&router).await;

    let csv = ",temp,label\n0,20.5,a\n1,21.0,b\n";
    assert_eq!(post_csv(&router, &cookie, "cnc.csv", csv).await, StatusCode::SEE_OTHER);
    let html = body_text(get(&router, "/", &cookie).await).await;
    assert!(html.contains("Uploaded cnc.csv (2 rows, 2 columns)"));
    assert!(html.contains("Preview of cnc.csv"));

    let status = post_form(&router, "/save", &cookie, "table_name=cnc&mode=create").await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let response = get(&router, "/api/tables", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["tables"], serde_json::json!(["cnc"]));

    let response = get(&router, "/api/tables/cnc/last", &cookie).await;
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["row"]["label"], "b");

    let html = body_text(get(&router, "/?table=cnc&plot=temp", &cookie).await).await;
    assert!(html.contains("Saved 2 rows to cnc"));
    assert!(html.contains("<dt>label</dt><dd>b</dd>"));
    assert!(html.contains("<polyline"));

    post_form(&router, "/delete", &cookie, "table=cnc").await;
    let response = get(&router, "/api/tables/cnc", &cookie).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ragged_csv_is_reported_inline() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);
    let cookie = open_session(&router).await;

    post_csv(&router, &cookie, "bad.csv", ",a,b\n0,1\n").await;
    let html = body_text(get(&router, "/", &cookie).await).await;
    assert!(html.contains("CSV error"));
}

#[tokio::test]
async fn test_column_subset_api() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);
    let cookie = open_session(&router).await;

    post_csv(&router, &cookie, "m.csv", ",a,b,c\n0,1,2,3\n").await;
    post_form(&router, "/save", &cookie, "table_name=m").await;

    let response = get(&router, "/api/tables/m?columns=c,a", &cookie).await;
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["columns"], serde_json::json!(["c", "a"]));
    assert_eq!(json["rows"], serde_json::json!([[3, 1]]));

    let response = get(&router, "/api/tables/m/columns", &cookie).await;
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["columns"], serde_json::json!(["a", "b", "c"]));
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let response = test_router(&dir)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_table_list_refreshes_only_on_request() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir);
    let cookie = open_session(&router).await;

    // Another writer adds a table behind the session's back.
    let mut other = DatabaseHandler::connect(ConnectionParams {
        path: db_path(&dir),
        ..Default::default()
    })
    .unwrap();
    let payload = Payload::new(vec!["v".to_string()], vec![vec![Value::Int(1)]]).unwrap();
    other.write_table("late", &payload).unwrap();

    let html = body_text(get(&router, "/", &cookie).await).await;
    assert!(html.contains("No tables yet."));
    assert!(!html.contains("value=\"late\""));

    assert_eq!(post_form(&router, "/refresh", &cookie, "").await, StatusCode::SEE_OTHER);
    let html = body_text(get(&router, "/", &cookie).await).await;
    assert!(html.contains("Found 1 tables"));
    assert!(html.contains("<option value=\"late\" selected>late</option>"));
}

#[tokio::test]
async fn test_idle_sessions_do_not_accumulate() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, "session_ttl_secs = 0\n");
    let router = Dashboard::build_router(Arc::clone(&state));

    for _ in 0..20 {
        open_session(&router).await;
    }
    assert_eq!(state.sessions.len(), 1);

    let state = test_state(&dir, "");
    let router = Dashboard::build_router(Arc::clone(&state));
    let cookie = open_session(&router).await;
    get(&router, "/", &cookie).await;
    assert_eq!(state.sessions.len(), 1);
}
