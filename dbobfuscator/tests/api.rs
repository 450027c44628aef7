//! HTTP API tests driven through the axum router.
//!
//! These tests run the full router in-process against the in-memory store,
//! covering authentication, request validation and the run lifecycle.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use dbobfuscator::server::{AdminCredentials, AppState, router};
use dbobfuscator_core::adapters::memory::primary_key_column;
use dbobfuscator_core::adapters::{MemoryConnector, MemoryDatabase};
use dbobfuscator_core::models::{CellValue, RawColumn};
use dbobfuscator_core::{ObfuscationService, ObfuscatorConfig};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const PASSWORD: &str = "test-password";

struct TestApp {
    router: Router,
    destination: MemoryDatabase,
}

fn app() -> TestApp {
    let origin = MemoryDatabase::new();
    origin.add_table(
        "customers",
        vec![
            primary_key_column("id", "int"),
            RawColumn::new("email", "varchar(32)"),
        ],
        &[],
    );
    origin
        .push_row("customers", vec![CellValue::Int(1), CellValue::from("a@example.com")])
        .unwrap();
    let destination = MemoryDatabase::new();

    let connector = MemoryConnector::new();
    connector.register("prod", origin);
    connector.register("staging", destination.clone());

    let service =
        ObfuscationService::new(Arc::new(connector), &ObfuscatorConfig::default()).unwrap();
    let state = AppState::new(service, AdminCredentials::new("admin", PASSWORD));

    TestApp {
        router: router(state),
        destination,
    }
}

fn connection(schema: &str) -> Value {
    json!({
        "User": "app",
        "Password": "secret",
        "Host": "localhost:3306",
        "Schema": schema
    })
}

fn auth_header() -> String {
    format!("Basic {}", STANDARD.encode(format!("admin:{}", PASSWORD)))
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, auth_header());
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

async fn wait_for_completion(router: &Router, process_id: &str) -> Value {
    for _ in 0..100 {
        let (status, body) = send(
            router,
            request(Method::GET, &format!("/status/{}", process_id), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        if body["Error"] != "" || body["FinishedCount"] == body["TotalCount"] {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not finish", process_id);
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_requests_without_credentials_are_rejected() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/empty-progress-ctx")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let wrong = Request::post("/empty-progress-ctx")
        .header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("admin:wrong")),
        )
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_schema_info_returns_plan_template() {
    let app = app();
    let (status, body) = send(
        &app.router,
        request(Method::POST, "/schema-info", Some(connection("prod"))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "customers": [
                {"Name": "id", "Type": "int", "NeedToObfuscate": false, "IsPrimaryKey": true},
                {"Name": "email", "Type": "varchar(32)", "NeedToObfuscate": true, "IsPrimaryKey": false}
            ]
        })
    );
}

#[tokio::test]
async fn test_schema_info_unknown_database() {
    let app = app();
    let (status, body) = send(
        &app.router,
        request(Method::POST, "/schema-info", Some(connection("nope"))),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["Error"].as_str().unwrap().contains("nope"));
    let error = body["Error"].as_str().unwrap();
    assert!(error.contains("Unknown database 'nope'"), "{}", error);
    assert!(!error.contains("secret"));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = app();
    let (status, body) = send(
        &app.router,
        request(Method::POST, "/obfuscate", Some(json!({"Model": 42}))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["Error"].is_string());
}

#[tokio::test]
async fn test_obfuscate_and_poll_status() {
    let app = app();
    let (_, plan) = send(
        &app.router,
        request(Method::POST, "/schema-info", Some(connection("prod"))),
    )
    .await;

    let (status, started) = send(
        &app.router,
        request(
            Method::POST,
            "/obfuscate",
            Some(json!({
                "Model": plan,
                "Origin": connection("prod"),
                "Destination": connection("staging")
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["Status"], "Obfuscation was started.");

    let process_id = started["ProcessId"].as_str().unwrap().to_string();
    let progress = wait_for_completion(&app.router, &process_id).await;
    assert_eq!(
        progress,
        json!({
            "ProcessId": process_id,
            "FinishedCount": 1,
            "TotalCount": 1,
            "Error": ""
        })
    );

    let emails = app.destination.column_values("customers", "email").unwrap();
    assert_eq!(emails.len(), 1);
    assert_ne!(emails[0], CellValue::from("a@example.com"));
}

#[tokio::test]
async fn test_obfuscate_rejects_invalid_plan() {
    let app = app();
    let plan = json!({
        "customers": [
            {"Name": "id", "Type": "int", "NeedToObfuscate": true, "IsPrimaryKey": true},
            {"Name": "email", "Type": "varchar(32)", "NeedToObfuscate": true, "IsPrimaryKey": false}
        ]
    });

    let (status, body) = send(
        &app.router,
        request(
            Method::POST,
            "/obfuscate",
            Some(json!({
                "Model": plan,
                "Origin": connection("prod"),
                "Destination": connection("staging")
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["Error"].as_str().unwrap().contains("cannot be obfuscated"));
}

#[tokio::test]
async fn test_unknown_process_id() {
    let app = app();
    let (status, body) = send(&app.router, request(Method::GET, "/status/missing", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"Error": "Entry with this process id doesn't exist"}));
}

#[tokio::test]
async fn test_empty_progress_ctx() {
    let app = app();
    let (_, plan) = send(
        &app.router,
        request(Method::POST, "/schema-info", Some(connection("prod"))),
    )
    .await;
    let (_, started) = send(
        &app.router,
        request(
            Method::POST,
            "/obfuscate",
            Some(json!({
                "Model": plan,
                "Origin": connection("prod"),
                "Destination": connection("staging")
            })),
        ),
    )
    .await;
    let process_id = started["ProcessId"].as_str().unwrap().to_string();
    wait_for_completion(&app.router, &process_id).await;

    let (status, body) = send(&app.router, request(Method::POST, "/empty-progress-ctx", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"Status": "OK"}));

    let (status, _) = send(
        &app.router,
        request(Method::GET, &format!("/status/{}", process_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
