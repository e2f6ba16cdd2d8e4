//! Admin routes: `/admin/*`
//!
//! Every handler passes the caller's principal to the core services, which
//! apply the admin guard themselves.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use seclab_core::auth::AccountUpdate;
use seclab_core::content::{DeleteReport, ImportReport, NewNode, NodePatch, Snapshot};
use seclab_core::{ContentNode, Principal, Role, User};

use super::node_key;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

/// Upper bound on an import body.
const IMPORT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Build the `/admin` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/content", get(list_content).post(create_content))
        .route("/content/{kind}/{slug}", put(update_content).delete(delete_content))
        .route("/export", get(export_content))
        .route(
            "/import",
            post(import_content).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
        .route("/users", get(list_users))
        .route("/users/{username}", get(get_user).put(update_user))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserUpdateRequest {
    pub role: Option<Role>,
    pub active: Option<bool>,
}

// ── Content handlers ─────────────────────────────────────────────────

/// Every node, hidden ones included.
async fn list_content(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<ContentNode>>, AppError> {
    let nodes = state.content.list_all(&principal).await?;
    Ok(Json(nodes))
}

async fn create_content(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(draft): ApiJson<NewNode>,
) -> Result<(StatusCode, Json<ContentNode>), AppError> {
    let node = state.content.create(draft, &principal).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn update_content(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path((kind, slug)): Path<(String, String)>,
    ApiJson(patch): ApiJson<NodePatch>,
) -> Result<Json<ContentNode>, AppError> {
    let key = node_key(&kind, &slug)?;
    let node = state.content.update(&key, patch, &principal).await?;
    Ok(Json(node))
}

/// Delete a node; `?cascade=true` takes its subtree with it.
async fn delete_content(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path((kind, slug)): Path<(String, String)>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> Result<Json<DeleteReport>, AppError> {
    let key = node_key(&kind, &slug)?;
    let report = state.content.delete(&key, params.cascade, &principal).await?;
    Ok(Json(report))
}

/// Download the whole tree as an attachment.
async fn export_content(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, AppError> {
    let snapshot = state.content.export(&principal).await?;
    let filename = format!(
        "attachment; filename=\"seclab-export-{}.json\"",
        snapshot.export_date.format("%Y%m%d")
    );
    let disposition = HeaderValue::from_str(&filename).map_err(|_| AppError::Internal)?;
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(snapshot)).into_response())
}

async fn import_content(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(snapshot): ApiJson<Snapshot>,
) -> Result<Json<ImportReport>, AppError> {
    let report = state.content.import(snapshot, &principal).await?;
    Ok(Json(report))
}

// ── User handlers ────────────────────────────────────────────────────

async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<User>>, AppError> {
    let users = state.auth.list_users(&principal).await?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(username): Path<String>,
) -> Result<Json<User>, AppError> {
    let user = state.auth.get_user(&principal, &username).await?;
    Ok(Json(user))
}

/// Change a user's role and/or active flag. Takes effect at next login.
async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(username): Path<String>,
    ApiJson(body): ApiJson<UserUpdateRequest>,
) -> Result<Json<User>, AppError> {
    let update = AccountUpdate {
        role: body.role,
        active: body.active,
    };
    let user = state.auth.update_account(&principal, &username, update).await?;
    Ok(Json(user))
}
