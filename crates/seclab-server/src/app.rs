//! Router assembly.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware as axum_mw;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::principal_middleware;
use crate::routes;
use crate::state::AppState;

/// Concurrent password-hashing requests (register, login) allowed at once.
const LOGIN_CONCURRENCY: usize = 16;

/// Build the full application router over `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Everything here sees a Principal, anonymous or not.
    let principal_routes = Router::new()
        .nest("/auth", routes::auth::router())
        .merge(routes::content::router())
        .nest("/admin", routes::admin::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            principal_middleware,
        ));

    // Argon2 is CPU-bound; cap how many hashes run at once.
    let login_routes = Router::new()
        .nest("/auth", routes::auth::login_router())
        .layer(tower::limit::ConcurrencyLimitLayer::new(LOGIN_CONCURRENCY));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_DISPOSITION, header::RETRY_AFTER]);

    Router::new()
        .merge(routes::sys::router())
        .merge(login_routes)
        .merge(principal_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
