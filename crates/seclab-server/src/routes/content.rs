//! Public read routes: `/exercises/*` and `/content/*`
//!
//! Anonymous callers see only visible nodes; admins see everything. A node
//! hidden directly or through an ancestor answers 404, never 403.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;

use seclab_core::{ContentKind, ContentNode, NodeKey, Principal};

use super::node_key;
use crate::error::AppError;
use crate::state::AppState;

/// Build the public content router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/exercises", get(list_exercises))
        .route("/exercises/{slug}", get(get_exercise))
        .route("/exercises/{slug}/steps", get(list_steps))
        .route("/content/{kind}/{slug}", get(get_node))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NodeWithChildren {
    pub node: ContentNode,
    pub children: Vec<ContentNode>,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Top-level exercises.
async fn list_exercises(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<ContentNode>>, AppError> {
    let nodes = state
        .content
        .list_children(None, Some(ContentKind::Exercise), &principal)
        .await?;
    Ok(Json(nodes))
}

/// One exercise and its children.
async fn get_exercise(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(slug): Path<String>,
) -> Result<Json<NodeWithChildren>, AppError> {
    let key = node_key(ContentKind::Exercise.as_str(), &slug)?;
    with_children(&state, key, &principal).await.map(Json)
}

/// The steps of one exercise.
async fn list_steps(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<ContentNode>>, AppError> {
    let key = node_key(ContentKind::Exercise.as_str(), &slug)?;
    let steps = state
        .content
        .list_children(Some(&key), Some(ContentKind::Step), &principal)
        .await?;
    Ok(Json(steps))
}

/// Any node by kind and slug, with its children.
async fn get_node(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path((kind, slug)): Path<(String, String)>,
) -> Result<Json<NodeWithChildren>, AppError> {
    let key = node_key(&kind, &slug)?;
    with_children(&state, key, &principal).await.map(Json)
}

async fn with_children(
    state: &AppState,
    key: NodeKey,
    principal: &Principal,
) -> Result<NodeWithChildren, AppError> {
    let node = state.content.get(&key, principal).await?;
    let children = state.content.list_children(Some(&key), None, principal).await?;
    Ok(NodeWithChildren { node, children })
}
