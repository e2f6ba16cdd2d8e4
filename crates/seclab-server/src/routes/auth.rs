//! Account routes: `/auth/*`
//!
//! Registration, login, token verification and self-service password
//! change. Request types carrying passwords do not derive `Debug`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seclab_core::{Principal, Role, User};

use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;

/// Build the unauthenticated `/auth` router (registration and login).
pub fn login_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Build the `/auth` routes that act on the caller's own session.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/verify", get(verify))
        .route("/password", post(change_password))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub user: UserSummary,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Create a standard account.
async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state.auth.register(&body.username, &body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Exchange a username and password for a session token.
async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let login = state.auth.authenticate(&body.username, &body.password).await?;
    Ok(Json(LoginResponse {
        access_token: login.token.token,
        token_type: "bearer",
        expires_at: login.token.expires_at,
        user: UserSummary {
            username: login.user.username,
            email: login.user.email,
            role: login.user.role,
        },
    }))
}

/// Resolve the presented token to its account.
async fn verify(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<User>, AppError> {
    let user = state.auth.current_user(&principal).await?;
    Ok(Json(user))
}

/// Change the caller's own password.
async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(body): ApiJson<PasswordChangeRequest>,
) -> Result<StatusCode, AppError> {
    state
        .auth
        .change_password(&principal, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
