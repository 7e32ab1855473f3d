//! Export, bulk assignment, import and statistics over HTTP.

mod common;

use annotator_core::store::RecordStore;
use axum::http::StatusCode;
use common::{body_json, build_test_app, get_auth, login, post_json_auth, SAMPLE};
use serde_json::json;

#[tokio::test]
async fn export_writes_a_new_file_each_time() {
    let app = build_test_app(SAMPLE).await;
    let token = login(&app.router, "lead").await;

    let response = post_json_auth(&app.router, "/api/v1/export", &token, json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let first = body_json(response).await["data"]["path"].as_str().unwrap().to_string();

    let response = post_json_auth(&app.router, "/api/v1/export", &token, json!({})).await;
    let second = body_json(response).await["data"]["path"].as_str().unwrap().to_string();

    assert_ne!(first, second);
    assert!(first.starts_with(app.config.export_dir.to_str().unwrap()));
    let text = std::fs::read_to_string(&first).unwrap();
    assert_eq!(text.lines().count(), 4);
}

#[tokio::test]
async fn assignments_split_unowned_records() {
    let app = build_test_app(SAMPLE).await;
    let token = login(&app.router, "lead").await;

    let response = post_json_auth(
        &app.router,
        "/api/v1/admin/assignments",
        &token,
        json!({ "annotators": ["alice", "carol"], "only_unassigned": true }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["updated"], 3);
    assert_eq!(data["per_annotator"], json!({ "alice": 2, "carol": 1 }));

    let owners: Vec<_> = app
        .store
        .load_all()
        .await
        .unwrap()
        .records
        .iter()
        .map(|r| r.owner.clone())
        .collect();
    assert_eq!(owners, vec!["alice", "bob", "alice", "carol"]);
}

#[tokio::test]
async fn assignments_need_annotators() {
    let app = build_test_app(SAMPLE).await;
    let token = login(&app.router, "lead").await;
    let response = post_json_auth(
        &app.router,
        "/api/v1/admin/assignments",
        &token,
        json!({ "annotators": [] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn import_adds_records_incrementally() {
    let app = build_test_app(SAMPLE).await;
    let token = login(&app.router, "lead").await;

    let source = app.dir.path().join("incoming.jsonl");
    std::fs::write(
        &source,
        "{\"b\": {\"category\": \"floor lamp\"}}\n{\"e\": {\"category\": \"sofa\"}}\nbroken\n",
    )
    .unwrap();

    let response = post_json_auth(
        &app.router,
        "/api/v1/admin/import",
        &token,
        json!({ "path": source }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["imported"], 1);
    assert_eq!(data["updated"], 1);
    assert_eq!(data["skipped"], 1);

    let b = app.store.get_by_id("b").await.unwrap().unwrap();
    assert_eq!(b.owner, "bob");
    assert_eq!(b.fields["category"], json!("floor lamp"));
}

#[tokio::test]
async fn stats_follow_saves() {
    let app = build_test_app(SAMPLE).await;
    let alice = login(&app.router, "alice").await;

    let view = body_json(get_auth(&app.router, "/api/v1/session", &alice).await).await["data"].clone();
    post_json_auth(
        &app.router,
        "/api/v1/session/save",
        &alice,
        json!({ "fields": view["display"], "flags": { "category": true } }),
    )
    .await;

    let response = get_auth(&app.router, "/api/v1/stats", &alice).await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await["data"].clone();
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["annotated"], 1);
    assert_eq!(stats["pending"], 3);
    assert_eq!(stats["flagged"], 1);
    assert_eq!(stats["by_owner"], json!({ "alice": 1, "bob": 1 }));
}
