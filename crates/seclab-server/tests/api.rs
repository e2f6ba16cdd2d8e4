//! Router-level tests driven through `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use seclab_core::password::CredentialHasher;
use seclab_server::app::build_router;
use seclab_server::config::ServerConfig;
use seclab_server::state::AppState;
use seclab_storage::{MemoryBackend, StorageBackend, StorageError};

const ADMIN_PASSWORD: &str = "admin-password-123";

fn config(extra: &[(&str, &str)]) -> ServerConfig {
    let mut vars: HashMap<String, String> = [
        ("SECLAB_SIGNING_SECRET", "an-hs256-test-secret-of-adequate-length"),
        ("SECLAB_USERS_TABLE", "seclab-users"),
        ("SECLAB_CONTENT_TABLE", "seclab-content"),
        ("SECLAB_ASSET_BUCKET", "seclab-assets"),
        ("SECLAB_REGION", "eu-west-2"),
        ("SECLAB_ADMIN_USERNAME", "root"),
        ("SECLAB_ADMIN_PASSWORD", ADMIN_PASSWORD),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
    .collect();
    for (k, v) in extra {
        vars.insert((*k).to_owned(), (*v).to_owned());
    }
    ServerConfig::from_lookup(|var| vars.get(var).cloned()).unwrap()
}

async fn app_over(storage: Arc<dyn StorageBackend>, config: &ServerConfig) -> Router {
    let state = AppState::new(storage, config, CredentialHasher::insecure_fast().unwrap()).unwrap();
    state.ensure_admin(config.admin.as_ref().unwrap()).await.unwrap();
    build_router(Arc::new(state))
}

async fn app() -> Router {
    app_over(Arc::new(MemoryBackend::new()), &config(&[])).await
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply { status, headers, body }
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let reply = send(
        app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
    reply.body["access_token"].as_str().unwrap().to_owned()
}

async fn register(app: &Router, username: &str, password: &str) -> Reply {
    send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": password,
        })),
    )
    .await
}

async fn learner(app: &Router) -> String {
    assert_eq!(register(app, "alice", "learner-password").await.status, StatusCode::CREATED);
    login(app, "alice", "learner-password").await
}

async fn create(app: &Router, token: &str, node: Value) {
    let reply = send(app, Method::POST, "/admin/content", Some(token), Some(node)).await;
    assert_eq!(reply.status, StatusCode::CREATED, "create failed: {}", reply.body);
}

/// Exercise `sqli` with a public step `s1` and a hidden step `s2`.
async fn seed(app: &Router, admin: &str) {
    create(
        app,
        admin,
        json!({ "kind": "exercise", "slug": "sqli", "title": "SQL injection", "body": "<p>Intro</p>" }),
    )
    .await;
    create(
        app,
        admin,
        json!({
            "kind": "step", "slug": "s1", "title": "Find the input",
            "parent": { "kind": "exercise", "slug": "sqli" }, "order": 1,
        }),
    )
    .await;
    create(
        app,
        admin,
        json!({
            "kind": "step", "slug": "s2", "title": "Solution",
            "parent": { "kind": "exercise", "slug": "sqli" }, "order": 2, "visibility": "hidden",
        }),
    )
    .await;
}

fn slugs(nodes: &Value) -> Vec<&str> {
    nodes
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["slug"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn health_reports_region_with_hardening_headers() {
    let app = app().await;
    let reply = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "ok");
    assert_eq!(reply.body["region"], "eu-west-2");
    assert_eq!(reply.headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    assert_eq!(reply.headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    assert_eq!(reply.headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
}

#[tokio::test]
async fn register_login_and_verify() {
    let app = app().await;
    let reply = register(&app, "alice", "learner-password").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["username"], "alice");
    assert_eq!(reply.body["role"], "standard");
    assert!(reply.body.get("password_hash").is_none());

    let reply = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "learner-password" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["token_type"], "bearer");
    assert_eq!(reply.body["user"]["role"], "standard");
    assert_eq!(reply.body["user"]["email"], "alice@example.com");
    let token = reply.body["access_token"].as_str().unwrap();

    let reply = send(&app, Method::GET, "/auth/verify", Some(token), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["username"], "alice");

    let reply = send(&app, Method::GET, "/auth/verify", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app().await;
    assert_eq!(register(&app, "alice", "learner-password").await.status, StatusCode::CREATED);
    let reply = register(&app, "alice", "other-password").await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["error"], "conflict");
}

#[tokio::test]
async fn failed_logins_are_indistinguishable() {
    let app = app().await;
    register(&app, "alice", "learner-password").await;

    let wrong = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "not-the-password" })),
    )
    .await;
    let unknown = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "mallory", "password": "not-the-password" })),
    )
    .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status, unknown.status);
    assert_eq!(wrong.body, unknown.body);
}

#[tokio::test]
async fn hidden_step_is_invisible_to_learners() {
    let app = app().await;
    let admin = login(&app, "root", ADMIN_PASSWORD).await;
    seed(&app, &admin).await;
    let alice = learner(&app).await;

    let anon = send(&app, Method::GET, "/exercises/sqli/steps", None, None).await;
    assert_eq!(anon.status, StatusCode::OK);
    assert_eq!(slugs(&anon.body), vec!["s1"]);

    let learner_view = send(&app, Method::GET, "/exercises/sqli", Some(&alice), None).await;
    assert_eq!(learner_view.status, StatusCode::OK);
    assert_eq!(learner_view.body["node"]["slug"], "sqli");
    assert_eq!(slugs(&learner_view.body["children"]), vec!["s1"]);

    let admin_view = send(&app, Method::GET, "/exercises/sqli/steps", Some(&admin), None).await;
    assert_eq!(slugs(&admin_view.body), vec!["s1", "s2"]);

    for token in [None, Some(alice.as_str())] {
        let reply = send(&app, Method::GET, "/content/step/s2", token, None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }
    let reply = send(&app, Method::GET, "/content/step/s2", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["node"]["visibility"], "hidden");
}

#[tokio::test]
async fn hiding_an_exercise_masks_its_subtree() {
    let app = app().await;
    let admin = login(&app, "root", ADMIN_PASSWORD).await;
    seed(&app, &admin).await;

    let reply = send(
        &app,
        Method::PUT,
        "/admin/content/exercise/sqli",
        Some(&admin),
        Some(json!({ "visibility": "hidden" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["updated_by"], "root");

    let list = send(&app, Method::GET, "/exercises", None, None).await;
    assert_eq!(list.status, StatusCode::OK);
    assert!(list.body.as_array().unwrap().is_empty());

    let step = send(&app, Method::GET, "/content/step/s1", None, None).await;
    assert_eq!(step.status, StatusCode::NOT_FOUND);
    let steps = send(&app, Method::GET, "/exercises/sqli/steps", None, None).await;
    assert_eq!(steps.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unusable_credentials_are_rejected_on_read_paths() {
    let app = app().await;
    let reply = send(&app, Method::GET, "/exercises", Some("not.a.token"), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "unauthorized");

    let req = Request::builder()
        .uri("/exercises")
        .header(header::AUTHORIZATION, "Basic cm9vdDpyb290")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_need_an_admin() {
    let app = app().await;
    let alice = learner(&app).await;
    let draft = json!({ "kind": "page", "slug": "about", "title": "About" });

    let anon = send(&app, Method::POST, "/admin/content", None, Some(draft.clone())).await;
    assert_eq!(anon.status, StatusCode::UNAUTHORIZED);

    let forbidden = send(&app, Method::POST, "/admin/content", Some(&alice), Some(draft)).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    assert_eq!(forbidden.body["error"], "forbidden");

    for uri in ["/admin/content", "/admin/export", "/admin/users", "/admin/users/alice"] {
        let reply = send(&app, Method::GET, uri, Some(&alice), None).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn invalid_drafts_are_bad_requests() {
    let app = app().await;
    let admin = login(&app, "root", ADMIN_PASSWORD).await;

    let script = send(
        &app,
        Method::POST,
        "/admin/content",
        Some(&admin),
        Some(json!({ "kind": "page", "slug": "x", "title": "X", "body": "<script>alert(1)</script>" })),
    )
    .await;
    assert_eq!(script.status, StatusCode::BAD_REQUEST);

    let orphan = send(
        &app,
        Method::POST,
        "/admin/content",
        Some(&admin),
        Some(json!({ "kind": "step", "slug": "lost", "title": "Lost" })),
    )
    .await;
    assert_eq!(orphan.status, StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/admin/content")
        .header(header::AUTHORIZATION, format!("Bearer {admin}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let kind = send(&app, Method::GET, "/content/chapter/one", None, None).await;
    assert_eq!(kind.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_refuses_children_unless_cascading() {
    let app = app().await;
    let admin = login(&app, "root", ADMIN_PASSWORD).await;
    seed(&app, &admin).await;

    let refused = send(&app, Method::DELETE, "/admin/content/exercise/sqli", Some(&admin), None).await;
    assert_eq!(refused.status, StatusCode::CONFLICT);

    let done = send(
        &app,
        Method::DELETE,
        "/admin/content/exercise/sqli?cascade=true",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(done.status, StatusCode::OK);
    let deleted = done.body["deleted"].as_array().unwrap();
    assert_eq!(deleted.len(), 3);
    assert_eq!(deleted.last().unwrap()["slug"], "sqli");

    let gone = send(&app, Method::GET, "/exercises/sqli", Some(&admin), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    let again = send(&app, Method::DELETE, "/admin/content/exercise/sqli", Some(&admin), None).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_then_import_into_a_fresh_deployment() {
    let source = app().await;
    let admin = login(&source, "root", ADMIN_PASSWORD).await;
    seed(&source, &admin).await;

    let export = send(&source, Method::GET, "/admin/export", Some(&admin), None).await;
    assert_eq!(export.status, StatusCode::OK);
    let disposition = export.headers.get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"seclab-export-"));
    assert!(disposition.ends_with(".json\""));
    assert_eq!(export.body["content_items"].as_array().unwrap().len(), 3);

    let target = app().await;
    let admin = login(&target, "root", ADMIN_PASSWORD).await;
    let first = send(&target, Method::POST, "/admin/import", Some(&admin), Some(export.body.clone())).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["created"].as_array().unwrap().len(), 3);
    assert!(first.body["failed"].as_array().unwrap().is_empty());

    let second = send(&target, Method::POST, "/admin/import", Some(&admin), Some(export.body)).await;
    assert_eq!(second.status, StatusCode::OK);
    assert!(second.body["created"].as_array().unwrap().is_empty());
    assert_eq!(second.body["skipped"].as_array().unwrap().len(), 3);

    let steps = send(&target, Method::GET, "/exercises/sqli/steps", None, None).await;
    assert_eq!(slugs(&steps.body), vec!["s1"]);
}

#[tokio::test]
async fn role_changes_apply_at_next_login() {
    let app = app().await;
    let admin = login(&app, "root", ADMIN_PASSWORD).await;
    let alice = learner(&app).await;

    let reply = send(
        &app,
        Method::PUT,
        "/admin/users/alice",
        Some(&admin),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["role"], "admin");

    // The old token still carries the old role.
    let old = send(&app, Method::GET, "/admin/users", Some(&alice), None).await;
    assert_eq!(old.status, StatusCode::FORBIDDEN);

    let fresh = login(&app, "alice", "learner-password").await;
    let users = send(&app, Method::GET, "/admin/users", Some(&fresh), None).await;
    assert_eq!(users.status, StatusCode::OK);
    assert_eq!(users.body.as_array().unwrap().len(), 2);

    let root = send(&app, Method::GET, "/admin/users/root", Some(&fresh), None).await;
    assert_eq!(root.status, StatusCode::OK);
    assert_eq!(root.body["role"], "admin");
    let missing = send(&app, Method::GET, "/admin/users/nobody", Some(&fresh), None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivated_accounts_cannot_log_in() {
    let app = app().await;
    let admin = login(&app, "root", ADMIN_PASSWORD).await;
    let alice = learner(&app).await;

    let reply = send(
        &app,
        Method::PUT,
        "/admin/users/alice",
        Some(&admin),
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);

    let login = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "learner-password" })),
    )
    .await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);
    let verify = send(&app, Method::GET, "/auth/verify", Some(&alice), None).await;
    assert_eq!(verify.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_change_replaces_the_old_password() {
    let app = app().await;
    let alice = learner(&app).await;

    let wrong = send(
        &app,
        Method::POST,
        "/auth/password",
        Some(&alice),
        Some(json!({ "current_password": "guess-guess", "new_password": "brand-new-password" })),
    )
    .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let ok = send(
        &app,
        Method::POST,
        "/auth/password",
        Some(&alice),
        Some(json!({ "current_password": "learner-password", "new_password": "brand-new-password" })),
    )
    .await;
    assert_eq!(ok.status, StatusCode::NO_CONTENT);

    let old = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "learner-password" })),
    )
    .await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);
    login(&app, "alice", "brand-new-password").await;
}

/// A backend that never answers.
struct StalledBackend;

#[async_trait::async_trait]
impl StorageBackend for StalledBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        std::future::pending().await
    }
    async fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StorageError> {
        std::future::pending().await
    }
    async fn put_if_absent(&self, _key: &str, _value: &[u8]) -> Result<bool, StorageError> {
        std::future::pending().await
    }
    async fn delete(&self, _key: &str) -> Result<(), StorageError> {
        std::future::pending().await
    }
    async fn list(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn stalled_store_is_a_retryable_503() {
    let config = config(&[("SECLAB_STORE_TIMEOUT_MS", "50")]);
    let state = AppState::new(Arc::new(StalledBackend), &config, CredentialHasher::insecure_fast().unwrap()).unwrap();
    let app = build_router(Arc::new(state));

    let reply = send(&app, Method::GET, "/exercises", None, None).await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.headers.get(header::RETRY_AFTER).unwrap(), "1");
    assert_eq!(reply.body["error"], "unavailable");
    assert!(!reply.body["message"].as_str().unwrap().contains("seclab-content"));

    let health = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(health.status, StatusCode::OK);
}
