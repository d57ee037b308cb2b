mod common;

use assert_json_diff::assert_json_eq;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use basket::health::VERSION;
use common::*;

#[tokio::test]
async fn health_endpoints() {
    let app = app();

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_json_eq!(
        body,
        json!({"status": "ok", "version": VERSION, "timestamp": "2023-11-14T22:13:20Z"})
    );

    let (status, body) = app.get("/health/detailed").await;
    assert_eq!(status, StatusCode::OK);
    assert_json_eq!(
        body["services"],
        json!({"storage": "ok", "cache": "ok", "events": ["error", "track", "web_vitals"]})
    );
}

#[tokio::test]
async fn detailed_health_degrades() {
    let app = app();
    app.storage.set_failing(true);

    let (status, body) = app.get("/health/detailed").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["storage"], "unhealthy");
    assert_eq!(body["services"]["cache"], "ok");
}

#[tokio::test]
async fn index_and_liveness() {
    let app = app();
    for uri in ["/", "/_liveness"] {
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"basket");
    }
}

#[tokio::test]
async fn cors_mirrors_the_caller() {
    let app = app();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/batch?client_id=site-1")
        .header(header::ORIGIN, "https://www.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,databuddy-client-id")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert!(response.status().is_success());

    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://www.example.com"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "content-type,databuddy-client-id"
    );
    assert!(app.storage.is_empty());
}
