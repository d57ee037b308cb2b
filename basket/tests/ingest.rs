mod common;

use assert_json_diff::{assert_json_eq, assert_json_include};
use serde_json::json;

use basket::records::{CanonicalRecord, ERRORS_TABLE, EVENTS_TABLE, WEB_VITALS_TABLE};
use common::*;

fn single_uri() -> String {
    format!("/?client_id={CLIENT_ID}")
}

fn batch_uri() -> String {
    format!("/batch?client_id={CLIENT_ID}")
}

#[tokio::test]
async fn repeated_event_is_stored_once() {
    let app = app();
    let body = r#"{"type": "track", "name": "screen_view", "path": "/pricing", "eventId": "e1"}"#;

    let first = app.post(&single_uri(), body).await;
    let second = app.post(&single_uri(), body).await;

    assert_json_eq!(first, json!({"status": "success", "type": "track"}));
    assert_json_eq!(second, json!({"status": "success", "type": "track"}));
    assert_eq!(app.storage.rows_for(EVENTS_TABLE).len(), 1);
}

#[tokio::test]
async fn parallel_deliveries_write_once() {
    let app = app();
    let body = r#"{"name": "screen_view", "eventId": "exit_42"}"#;

    let uri = single_uri();
    let deliveries = (0..16).map(|_| app.post(&uri, body));
    let responses = futures::future::join_all(deliveries).await;

    assert!(responses.iter().all(|r| r["status"] == "success"));
    assert_eq!(app.storage.len(), 1);
}

#[tokio::test]
async fn batch_failures_are_isolated() {
    let app = app();
    let body = json!([
        {"type": "track", "name": "a", "eventId": "b1"},
        {"type": "track", "name": "b", "clientId": ""},
        {"type": "track", "name": "c", "eventId": "b3"},
    ])
    .to_string();

    let response = app.post(&batch_uri(), &body).await;
    assert_json_eq!(
        response,
        json!({
            "status": "success",
            "batch": true,
            "processed": 3,
            "results": [
                {"success": true, "type": "track", "eventId": "b1"},
                {"success": false, "type": "track", "error": "Invalid event data"},
                {"success": true, "type": "track", "eventId": "b3"},
            ]
        })
    );
    assert_eq!(app.storage.len(), 2);
}

#[tokio::test]
async fn mixed_batches_reach_their_tables() {
    let app = app();
    let body = json!([
        {"type": "track", "name": "screen_view"},
        {"type": "error", "payload": {"message": "boom", "eventId": "err_1"}},
        {"type": "web_vitals", "payload": {"lcp": 1200, "cls": 0.02}},
        {"type": "pageleave"},
    ])
    .to_string();

    let response = app.post(&batch_uri(), &body).await;
    assert_json_include!(
        actual: response,
        expected: json!({
            "results": [
                {"success": true, "type": "track"},
                {"success": true, "type": "error", "eventId": "err_1"},
                {"success": true, "type": "web_vitals"},
                {"success": false, "type": "pageleave", "error": "Unknown event type"},
            ]
        })
    );

    assert_eq!(app.storage.rows_for(EVENTS_TABLE).len(), 1);
    assert_eq!(app.storage.rows_for(ERRORS_TABLE).len(), 1);
    let vitals = app.storage.rows_for(WEB_VITALS_TABLE);
    let [CanonicalRecord::WebVitals(row)] = vitals.as_slice() else {
        panic!("expected one web vitals record");
    };
    assert_eq!(row.client_id, CLIENT_ID);
    assert_eq!(row.lcp, Some(1200.0));
}

#[tokio::test]
async fn foreign_origins_are_refused() {
    let app = app();
    let body = r#"{"name": "screen_view"}"#;

    let response = app
        .post_with(&single_uri(), body, &[("origin", "https://evil.com")])
        .await;
    assert_json_eq!(
        response,
        json!({"status": "error", "message": "Origin not authorized"})
    );

    let response = app
        .post_with(&single_uri(), body, &[("origin", "https://shop.example.com")])
        .await;
    assert_json_eq!(response, json!({"status": "success", "type": "track"}));
    assert_eq!(app.storage.len(), 1);
}

#[tokio::test]
async fn bots_are_ignored() {
    let app = app();
    let response = app
        .post_with(
            &single_uri(),
            r#"{"name": "screen_view"}"#,
            &[("user-agent", GOOGLEBOT)],
        )
        .await;

    assert_json_eq!(response, json!({"status": "ignored", "message": "Bot detected"}));
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn request_level_rejections() {
    let app = app();
    assert_json_eq!(
        app.post("/", r#"{"name": "screen_view"}"#).await,
        json!({"status": "error", "message": "Missing client ID"})
    );
    assert_json_eq!(
        app.post("/?client_id=nope", r#"{"name": "screen_view"}"#).await,
        json!({"status": "error", "message": "Invalid or inactive client ID"})
    );
    assert_json_eq!(
        app.post(&single_uri(), "{").await,
        json!({"status": "error", "message": "Invalid JSON body"})
    );

    let oversized = json!({"name": "x".repeat(70 * 1024)}).to_string();
    assert_json_eq!(
        app.post(&single_uri(), &oversized).await,
        json!({"status": "error", "message": "Payload too large"})
    );
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn batch_shape_is_checked() {
    let app = app();
    assert_json_eq!(
        app.post(&batch_uri(), r#"{"name": "screen_view"}"#).await,
        json!({
            "status": "error",
            "message": "Batch endpoint expects array of events",
            "batch": true
        })
    );

    let too_many = json!(vec![json!({"name": "screen_view"}); BATCH_MAX_SIZE + 1]).to_string();
    assert_json_eq!(
        app.post(&batch_uri(), &too_many).await,
        json!({"status": "error", "message": "Batch too large"})
    );
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn storage_outage_fails_the_event_and_allows_a_retry() {
    let app = app();
    let body = r#"{"name": "screen_view", "eventId": "retry-me"}"#;

    app.storage.set_failing(true);
    assert_json_eq!(
        app.post(&single_uri(), body).await,
        json!({"status": "error", "message": "Failed to store event"})
    );

    app.storage.set_failing(false);
    assert_json_eq!(
        app.post(&single_uri(), body).await,
        json!({"status": "success", "type": "track"})
    );
    assert_eq!(app.storage.len(), 1);
}

#[tokio::test]
async fn anonymous_ids_rotate_with_the_day() {
    let app = app();
    let body = r#"{"name": "screen_view", "anonymousId": "visitor-1"}"#;

    app.post(&single_uri(), body).await;
    app.post(&single_uri(), body).await;
    app.clock.advance(24 * 60 * 60 * 1000);
    app.post(&single_uri(), body).await;

    let ids: Vec<String> = app
        .storage
        .rows_for(EVENTS_TABLE)
        .into_iter()
        .filter_map(|record| match record {
            CanonicalRecord::Track(row) => row.anonymous_id,
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert!(ids.iter().all(|id| id != "visitor-1"));
}
