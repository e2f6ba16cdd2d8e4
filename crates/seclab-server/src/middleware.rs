//! Principal resolution middleware.
//!
//! Reads `Authorization: Bearer <token>`, validates it, and inserts the
//! resulting [`Principal`] into the request extensions for downstream
//! handlers. No header means [`Principal::Anonymous`]; a header that is
//! present but unusable is rejected with 401 even on public read paths.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use seclab_core::Principal;

use crate::error::AppError;
use crate::state::AppState;

/// Pull the token out of an `Authorization` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Middleware that resolves the caller into a [`Principal`].
pub async fn principal_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let principal = match req.headers().get(header::AUTHORIZATION) {
        None => Principal::Anonymous,
        Some(value) => {
            let Some(token) = value.to_str().ok().and_then(bearer_token) else {
                return AppError::Unauthorized("expected a bearer token").into_response();
            };
            match state.auth.validate_token(token) {
                Ok(principal) => principal,
                Err(e) => return AppError::from(e).into_response(),
            }
        }
    };

    req.extensions_mut().insert(principal);
    next.run(req).await
}
