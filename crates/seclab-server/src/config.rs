//! Server configuration for `SecLab`.
//!
//! Loaded from `SECLAB_*` environment variables at startup. The signing
//! secret, both table names, the asset bucket and the region are required;
//! a missing one stops the process before it binds.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use seclab_core::token::{DEFAULT_TTL_MINUTES, MAX_TTL_MINUTES, MIN_KEY_LEN, SigningKey};

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required environment variable {var}")]
    Missing { var: &'static str },

    /// A variable is set but unusable.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// Redb persistent storage.
    Redb { path: String },
    /// PostgreSQL persistent storage.
    Postgres { url: String },
}

/// Credentials for the admin account provisioned at startup.
#[derive(Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// HMAC key for session tokens.
    pub signing_key: SigningKey,
    /// Key namespace for user records.
    pub users_table: String,
    /// Key namespace for content records.
    pub content_table: String,
    /// Object-store bucket holding uploaded assets.
    pub asset_bucket: String,
    /// Deployment region.
    pub region: String,
    /// URL prefix body images must live under.
    pub asset_base_url: String,
    /// Session token lifetime.
    pub token_ttl_minutes: i64,
    /// Bound on each storage call.
    pub store_timeout: Duration,
    /// Admin account to ensure at startup.
    pub admin: Option<AdminBootstrap>,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `SECLAB_SIGNING_SECRET`: token signing secret, at least 32 bytes (required)
    /// - `SECLAB_USERS_TABLE`: users table name (required)
    /// - `SECLAB_CONTENT_TABLE`: content table name (required)
    /// - `SECLAB_ASSET_BUCKET`: asset bucket name (required)
    /// - `SECLAB_REGION`: deployment region (required)
    /// - `PORT`: port to bind on, all interfaces
    /// - `SECLAB_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:8080`)
    /// - `SECLAB_STORAGE`: `memory`, `redb`, or `postgres` (default: `memory`)
    /// - `SECLAB_STORAGE_PATH`: path for redb (default: `./data/seclab.redb`)
    /// - `DATABASE_URL`: PostgreSQL connection string (required when `SECLAB_STORAGE=postgres`)
    /// - `SECLAB_LOG_LEVEL`: log filter (default: `info`)
    /// - `SECLAB_ASSET_BASE_URL`: overrides the bucket-derived asset URL prefix
    /// - `SECLAB_TOKEN_TTL_MINUTES`: token lifetime (default: `30`, at most 7 days)
    /// - `SECLAB_STORE_TIMEOUT_MS`: per-call storage bound (default: `5000`)
    /// - `SECLAB_ADMIN_USERNAME` / `SECLAB_ADMIN_PASSWORD` / `SECLAB_ADMIN_EMAIL`: bootstrap admin
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for a missing required variable or an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing { var });

        let secret = required("SECLAB_SIGNING_SECRET")?;
        if secret.len() < MIN_KEY_LEN {
            return Err(ConfigError::Invalid {
                var: "SECLAB_SIGNING_SECRET",
                reason: format!("must be at least {MIN_KEY_LEN} bytes"),
            });
        }
        let signing_key = SigningKey::new(secret.into_bytes()).map_err(|e| ConfigError::Invalid {
            var: "SECLAB_SIGNING_SECRET",
            reason: e.to_string(),
        })?;

        let users_table = required("SECLAB_USERS_TABLE")?;
        let content_table = required("SECLAB_CONTENT_TABLE")?;
        for (var, name) in [("SECLAB_USERS_TABLE", &users_table), ("SECLAB_CONTENT_TABLE", &content_table)] {
            if name.contains('/') {
                return Err(ConfigError::Invalid {
                    var,
                    reason: "table names may not contain '/'".to_owned(),
                });
            }
        }
        if users_table == content_table {
            return Err(ConfigError::Invalid {
                var: "SECLAB_CONTENT_TABLE",
                reason: "must differ from SECLAB_USERS_TABLE".to_owned(),
            });
        }
        let asset_bucket = required("SECLAB_ASSET_BUCKET")?;
        let region = required("SECLAB_REGION")?;

        // Priority: SECLAB_BIND_ADDR > PORT > default 127.0.0.1:8080
        let bind_addr = if let Some(addr) = get("SECLAB_BIND_ADDR") {
            addr.parse().map_err(|e| ConfigError::Invalid {
                var: "SECLAB_BIND_ADDR",
                reason: format!("{e}"),
            })?
        } else if let Some(port) = get("PORT") {
            let port: u16 = port.parse().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: format!("{e}"),
            })?;
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8080))
        };

        let storage_path = get("SECLAB_STORAGE_PATH").unwrap_or_else(|| "./data/seclab.redb".to_owned());
        let storage_backend = match get("SECLAB_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackendType::Memory,
            "redb" => StorageBackendType::Redb { path: storage_path },
            "postgres" | "postgresql" => StorageBackendType::Postgres {
                url: get("DATABASE_URL").ok_or(ConfigError::Missing { var: "DATABASE_URL" })?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "SECLAB_STORAGE",
                    reason: format!("unknown backend '{other}'"),
                });
            }
        };

        let token_ttl_minutes = parse_positive(
            &get,
            "SECLAB_TOKEN_TTL_MINUTES",
            DEFAULT_TTL_MINUTES,
            MAX_TTL_MINUTES,
        )?;
        let store_timeout_ms = parse_positive(&get, "SECLAB_STORE_TIMEOUT_MS", 5000, MAX_STORE_TIMEOUT_MS)?;

        let asset_base_url = get("SECLAB_ASSET_BASE_URL")
            .unwrap_or_else(|| format!("https://{asset_bucket}.s3.{region}.amazonaws.com/"));

        let admin = match (get("SECLAB_ADMIN_USERNAME"), get("SECLAB_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminBootstrap {
                email: get("SECLAB_ADMIN_EMAIL").unwrap_or_else(|| format!("{username}@localhost.localdomain")),
                username,
                password,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing { var: "SECLAB_ADMIN_PASSWORD" }),
            (None, Some(_)) => return Err(ConfigError::Missing { var: "SECLAB_ADMIN_USERNAME" }),
        };

        Ok(Self {
            bind_addr,
            storage_backend,
            log_level: get("SECLAB_LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            signing_key,
            users_table,
            content_table,
            asset_bucket,
            region,
            asset_base_url,
            token_ttl_minutes,
            store_timeout: Duration::from_millis(store_timeout_ms.unsigned_abs()),
            admin,
        })
    }
}

const MAX_STORE_TIMEOUT_MS: i64 = 10 * 60 * 1000;

fn parse_positive(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: i64,
    max: i64,
) -> Result<i64, ConfigError> {
    let Some(raw) = get(var) else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(n) if n > 0 && n <= max => Ok(n),
        Ok(n) if n > max => Err(ConfigError::Invalid {
            var,
            reason: format!("{n} exceeds the maximum of {max}"),
        }),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a positive integer, got '{raw}'"),
        }),
    }
}
