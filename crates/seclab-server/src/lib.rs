//! `SecLab` HTTP server.
//!
//! Wires the core services, a storage backend and the HTTP routes into an
//! Axum application. [`app::build_router`] is the whole surface; `main`
//! only adds configuration, logging and the listener.

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;
