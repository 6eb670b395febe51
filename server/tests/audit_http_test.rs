//! HTTP tests for audit endpoints.

mod helpers;

use axum::http::{Method, StatusCode};
use helpers::{body_to_json, TestApp};
use serde_json::json;
use tierward_common::{Actor, PermissionLevel};
use uuid::Uuid;

async fn seed(app: &TestApp) -> (Uuid, Uuid) {
    let alice_target = Uuid::new_v4();
    let bob_target = Uuid::new_v4();
    for (actor, user, level) in [
        ("alice", alice_target, PermissionLevel::Op),
        ("bob", bob_target, PermissionLevel::Lowop),
        ("alice", bob_target, PermissionLevel::Player),
    ] {
        assert!(
            app.engine
                .apply_level(user, level, &Actor::from_name(actor))
                .await
        );
    }
    (alice_target, bob_target)
}

#[tokio::test]
async fn test_recent_entries_oldest_first() {
    let app = TestApp::new().await;
    seed(&app).await;

    let body = body_to_json(app.get("/api/audit?limit=2").await).await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["actor"], "bob");
    assert_eq!(entries[1]["actor"], "alice");
    assert_eq!(entries[1]["category"], "state_change");
}

#[tokio::test]
async fn test_search_filters() {
    let app = TestApp::new().await;
    let (_, bob_target) = seed(&app).await;

    let body = body_to_json(app.get("/api/audit?actor=ALICE").await).await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 2);

    let body = body_to_json(app.get(&format!("/api/audit?user={bob_target}")).await).await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e["subject"] == bob_target.to_string()));

    let body = body_to_json(app.get("/api/audit?q=lowop").await).await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_query_is_rejected() {
    let app = TestApp::new().await;

    assert_eq!(
        app.get("/api/audit?limit=0").await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.get("/api/audit?limit=1000").await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.get("/api/audit?user=nobody").await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_stats() {
    let app = TestApp::new().await;
    seed(&app).await;

    let body = body_to_json(app.get("/api/audit/stats").await).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["actors"]["alice"], 2);
    assert_eq!(body["actors"]["bob"], 1);
    assert_eq!(body["categories"]["state_change"], 3);
    assert!(body["oldest"].is_string());
}

#[tokio::test]
async fn test_cap_applies_to_retained_window() {
    let app = TestApp::with_config(|config| config.audit_max_entries = 2).await;
    seed(&app).await;

    let body = body_to_json(app.get("/api/audit?limit=10").await).await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["actor"], "bob");
}

#[tokio::test]
async fn test_prune_keeps_recent_entries() {
    let app = TestApp::new().await;
    seed(&app).await;

    let response = app
        .send_json(Method::POST, "/api/audit/prune", json!({ "days": 30 }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_json(response).await["removed"], 0);

    let response = app
        .send_json(Method::POST, "/api/audit/prune", json!({ "days": 0 }))
        .await;
    assert_eq!(body_to_json(response).await["removed"], 0);

    // Three state changes plus one command entry per prune.
    assert_eq!(app.audit_entries().await.len(), 5);
}

#[tokio::test]
async fn test_prune_rejects_out_of_range_days() {
    let app = TestApp::new().await;
    seed(&app).await;

    for days in [-1_i64, 1_000_000_000] {
        let response = app
            .send_json(Method::POST, "/api/audit/prune", json!({ "days": days }))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_to_json(response).await["code"], "VALIDATION_ERROR");
    }

    // Rejected requests leave no command entry behind.
    assert_eq!(app.audit_entries().await.len(), 3);
}
