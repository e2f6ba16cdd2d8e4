//! `SecLab` server entry point.
//!
//! Loads configuration, opens the storage backend, provisions the bootstrap
//! admin if one is configured, then serves the Axum router until SIGINT or
//! SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use seclab_core::password::CredentialHasher;
use seclab_storage::{MemoryBackend, StorageBackend};

use seclab_server::app::build_router;
use seclab_server::config::{ServerConfig, StorageBackendType};
use seclab_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(
        storage = ?config.storage_backend,
        region = %config.region,
        users_table = %config.users_table,
        content_table = %config.content_table,
        "SecLab starting"
    );

    let storage = open_storage(&config).await?;
    let state = AppState::new(storage, &config, CredentialHasher::default())
        .context("failed to initialise auth service")?;

    if let Some(admin) = &config.admin {
        state
            .ensure_admin(admin)
            .await
            .context("failed to provision bootstrap admin")?;
    }

    let app = build_router(Arc::new(state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "SecLab server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("SecLab server stopped");
    Ok(())
}

/// Open the configured storage backend.
async fn open_storage(config: &ServerConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match &config.storage_backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            Arc::new(MemoryBackend::new())
        }
        #[cfg(feature = "redb-backend")]
        StorageBackendType::Redb { path } => {
            info!(path = %path, "using redb storage");
            if let Some(dir) = std::path::Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create storage directory {}", dir.display()))?;
            }
            Arc::new(seclab_storage::RedbBackend::open(path).context("failed to open redb storage")?)
        }
        #[cfg(not(feature = "redb-backend"))]
        StorageBackendType::Redb { .. } => {
            anyhow::bail!("redb backend requested but feature 'redb-backend' is not enabled");
        }
        #[cfg(feature = "postgres-backend")]
        StorageBackendType::Postgres { url } => {
            info!(url = %"[redacted]", "using PostgreSQL storage");
            Arc::new(
                seclab_storage::PostgresBackend::connect(url)
                    .await
                    .context("failed to connect to PostgreSQL")?,
            )
        }
        #[cfg(not(feature = "postgres-backend"))]
        StorageBackendType::Postgres { .. } => {
            anyhow::bail!("postgres backend requested but feature 'postgres-backend' is not enabled");
        }
    };
    Ok(storage)
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
