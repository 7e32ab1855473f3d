#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use annotator_api::auth::jwt::JwtConfig;
use annotator_api::auth::password::hash_password;
use annotator_api::config::{ServerConfig, StoreBackend};
use annotator_api::router::build_app_router;
use annotator_api::state::AppState;
use annotator_api::users::{UserDirectory, UserEntry, ROLE_ADMIN, ROLE_ANNOTATOR};
use annotator_core::assets::{DEFAULT_ASSET_TEMPLATE, NoAssets};
use annotator_core::navigation::BoundaryPolicy;
use annotator_core::schema::FieldSchema;
use annotator_core::session::{SessionContext, SessionRegistry};
use annotator_db::JsonlStore;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "test-password-123";

/// `a`, `c` and `d` are free; `b` belongs to bob.
pub const SAMPLE: &str = concat!(
    r#"{"a": {"category": "chair", "material": "wood", "placement": ["floor"]}}"#,
    "\n",
    r#"{"b": {"uid": "bob", "category": "lamp"}}"#,
    "\n",
    r#"{"c": {"category": "", "material": ""}}"#,
    "\n",
    r#"{"d": {"category": "table"}}"#,
    "\n",
);

pub struct TestApp {
    pub router: Router,
    pub store: Arc<JsonlStore>,
    pub config: ServerConfig,
    /// Keeps the data directory alive for the duration of the test.
    pub dir: TempDir,
}

impl TestApp {
    pub fn data_path(&self) -> PathBuf {
        self.dir.path().join("annotations.jsonl")
    }
}

pub fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        store: StoreBackend::Jsonl {
            path: dir.path().join("annotations.jsonl"),
        },
        schema_path: None,
        asset_base_path: None,
        asset_template: DEFAULT_ASSET_TEMPLATE.to_string(),
        boundary: BoundaryPolicy::Clamp,
        users_path: dir.path().join("users.json"),
        export_dir: dir.path().join("exports"),
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

fn test_users() -> UserDirectory {
    let hash = hash_password(PASSWORD).unwrap();
    let entry = |username: &str, role: &str| UserEntry {
        username: username.to_string(),
        password_hash: hash.clone(),
        role: role.to_string(),
    };
    UserDirectory::new(vec![
        entry("alice", ROLE_ANNOTATOR),
        entry("bob", ROLE_ANNOTATOR),
        entry("lead", ROLE_ADMIN),
    ])
    .unwrap()
}

/// Build the full application router over a JSONL store seeded with
/// `contents`, using the same middleware stack as production.
pub async fn build_test_app(contents: &str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let path = dir.path().join("annotations.jsonl");
    std::fs::write(&path, contents).unwrap();
    let store = Arc::new(JsonlStore::open(&path).await.unwrap());

    let registry = SessionRegistry::new(SessionContext {
        store: store.clone(),
        schema: Arc::new(FieldSchema::object_attributes()),
        assets: Arc::new(NoAssets),
        boundary: config.boundary,
    });
    let state = AppState {
        registry: Arc::new(registry),
        users: Arc::new(test_users()),
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        config,
        dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: &Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(app: &Router, uri: &str, token: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Log in through the API and return the access token.
pub async fn login(app: &Router, username: &str) -> String {
    let body = serde_json::json!({ "username": username, "password": PASSWORD });
    let response = post_json(app, "/api/v1/auth/login", body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    json["access_token"].as_str().unwrap().to_string()
}
