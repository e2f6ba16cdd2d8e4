//! Shared application state for the `SecLab` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. It holds the auth and content services, both
//! built over the same storage backend with their own tables.

use std::sync::Arc;

use chrono::Duration;
use tracing::info;

use seclab_core::auth::AuthConfig;
use seclab_core::error::AuthError;
use seclab_core::markup::MarkupPolicy;
use seclab_core::password::CredentialHasher;
use seclab_core::table::Table;
use seclab_core::{AuthService, ContentService, Role};
use seclab_storage::StorageBackend;

use crate::config::{AdminBootstrap, ServerConfig};

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Accounts, login and token validation.
    pub auth: Arc<AuthService>,
    /// The content tree.
    pub content: Arc<ContentService>,
    /// Deployment region, reported by `/health`.
    pub region: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Build both services over `storage`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the auth service cannot initialise its
    /// hasher.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        config: &ServerConfig,
        hasher: CredentialHasher,
    ) -> Result<Self, AuthError> {
        let users = Table::new(Arc::clone(&storage), &config.users_table, config.store_timeout);
        let content = Table::new(storage, &config.content_table, config.store_timeout);
        info!(users = users.name(), content = content.name(), "tables opened");

        let auth = AuthService::new(
            AuthConfig {
                signing_key: config.signing_key.clone(),
                token_ttl: Duration::try_minutes(config.token_ttl_minutes).ok_or_else(|| AuthError::Internal {
                    reason: format!("token lifetime of {} minutes is out of range", config.token_ttl_minutes),
                })?,
                hasher,
            },
            users,
        )?;

        Ok(Self {
            auth: Arc::new(auth),
            content: Arc::new(ContentService::new(
                content,
                MarkupPolicy::with_asset_base(&config.asset_base_url),
            )),
            region: config.region.clone(),
        })
    }

    /// Provision the configured admin unless the username already exists.
    ///
    /// # Errors
    ///
    /// Any [`AuthError`] other than the username being taken.
    pub async fn ensure_admin(&self, admin: &AdminBootstrap) -> Result<(), AuthError> {
        match self
            .auth
            .provision(&admin.username, &admin.email, &admin.password, Role::Admin)
            .await
        {
            Ok(_) => {
                info!(username = %admin.username, "bootstrap admin provisioned");
                Ok(())
            }
            Err(AuthError::UsernameTaken { .. }) => {
                info!(username = %admin.username, "bootstrap admin already present");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
