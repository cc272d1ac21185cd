//! Request executor integration tests
//!
//! Single-attempt calls against mock HTTP servers: decoding, status
//! classification, server messages, timeouts, and transport faults.

mod common;

use common::ScriptedHttpServer;
use jobwire_client::{RequestExecutor, RequestSpec};
use jobwire_core::ErrorKind;
use mockito::Server;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

async fn status_error(status: usize, body: &str) -> jobwire_core::ClientError {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/download/jobs/1")
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;

    let executor = RequestExecutor::new(server.url(), "key").unwrap();
    executor
        .execute::<Value>(&RequestSpec::get("/api/download/jobs/1"))
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_success_sends_auth_and_decodes() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/services")
        .match_header("authorization", "Bearer key")
        .match_header("content-type", "application/json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"services":[{"name":"svc"}]}"#)
        .create_async()
        .await;

    let executor = RequestExecutor::new(server.url(), "key").unwrap();
    let value: Value = executor
        .execute(&RequestSpec::get("/api/services"))
        .await
        .unwrap();

    assert_eq!(value, json!({"services": [{"name": "svc"}]}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_post_body_is_sent_as_json() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/list-titles")
        .match_body(mockito::Matcher::Json(json!({"service": "svc", "title_id": "tt1"})))
        .with_status(200)
        .with_body(r#"{"titles":[]}"#)
        .create_async()
        .await;

    let executor = RequestExecutor::new(server.url(), "key").unwrap();
    let spec = RequestSpec::post("/api/list-titles")
        .with_body(json!({"service": "svc", "title_id": "tt1"}));
    let _: Value = executor.execute(&spec).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_header_override() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/services")
        .match_header("authorization", "Bearer other")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let executor = RequestExecutor::new(server.url(), "key").unwrap();
    let spec = RequestSpec::get("/api/services").with_header("Authorization", "Bearer other");
    let _: Value = executor.execute(&spec).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_body_decodes_as_null() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("DELETE", "/api/download/jobs/1")
        .with_status(204)
        .create_async()
        .await;

    let executor = RequestExecutor::new(server.url(), "key").unwrap();
    let value: Value = executor
        .execute(&RequestSpec::delete("/api/download/jobs/1"))
        .await
        .unwrap();

    assert!(value.is_null());
}

#[tokio::test]
async fn test_status_classification() {
    let cases = [
        (401, ErrorKind::Auth),
        (403, ErrorKind::Auth),
        (404, ErrorKind::NotFound),
        (500, ErrorKind::Server),
        (503, ErrorKind::Server),
        (400, ErrorKind::Unknown),
        (422, ErrorKind::Unknown),
    ];

    for (status, kind) in cases {
        let err = status_error(status, "").await;
        assert_eq!(err.kind(), kind, "status {}", status);
        assert_eq!(err.status(), Some(status as u16));
    }
}

#[tokio::test]
async fn test_server_message_is_surfaced() {
    let err = status_error(500, r#"{"status":"error","error":{"message":"disk full"}}"#).await;
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.message(), "disk full");

    let err = status_error(404, r#"{"detail":"Job not found"}"#).await;
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.message(), "Job not found");
}

#[tokio::test]
async fn test_unparseable_error_body_falls_back() {
    let err = status_error(502, "<html>Bad Gateway</html>").await;
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.message(), "Server error (HTTP 502)");
}

#[tokio::test]
async fn test_malformed_success_body_is_unknown() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/services")
        .with_status(200)
        .with_body("{not json")
        .create_async()
        .await;

    let executor = RequestExecutor::new(server.url(), "key").unwrap();
    let err = executor
        .execute::<Value>(&RequestSpec::get("/api/services"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unknown);
    assert!(err.message().starts_with("Failed to decode response"));
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn test_timeout_cancels_the_call() {
    let server = ScriptedHttpServer::start(vec![None]).await;
    let executor = RequestExecutor::new(server.base_url(), "key").unwrap();

    let started = Instant::now();
    let err = executor
        .execute::<Value>(&RequestSpec::get("/api/services").with_timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.message(), "Request timed out after 200 ms");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_refused_connection_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let executor = RequestExecutor::new(format!("http://{}", addr), "key").unwrap();
    let err = executor
        .execute::<Value>(&RequestSpec::get("/api/services"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.is_retryable());
}
