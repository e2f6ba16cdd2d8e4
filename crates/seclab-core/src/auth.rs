//! Authentication and account management.
//!
//! [`AuthService`] owns the credential store, the Argon2id hasher, and the
//! [`TokenSigner`]. It turns credentials into session tokens and session
//! tokens back into a [`Principal`]. Authorization is the free function
//! [`require_role`], composed into every privileged operation.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::error::AuthError;
use crate::password::{CredentialHasher, MAX_PASSWORD_LEN, check_password_policy};
use crate::table::Table;
use crate::token::{DEFAULT_TTL_MINUTES, SessionToken, SigningKey, TokenSigner};
use crate::user::{Role, User, UserRecord, UserStore, validate_email, validate_username};

/// Construction-time settings for [`AuthService`].
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub signing_key: SigningKey,
    pub token_ttl: Duration,
    pub hasher: CredentialHasher,
}

impl AuthConfig {
    /// Default TTL and Argon2 parameters with the given key.
    #[must_use]
    pub fn new(signing_key: SigningKey) -> Self {
        Self {
            signing_key,
            token_ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
            hasher: CredentialHasher::default(),
        }
    }
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// No credential was presented.
    Anonymous,
    /// A validated token.
    Authenticated { username: String, role: Role },
}

impl Principal {
    /// Username, if authenticated.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { username, .. } => Some(username),
        }
    }

    /// Role, if authenticated.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { role, .. } => Some(*role),
        }
    }

    /// Whether this principal bypasses visibility masking.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }
}

/// Fail unless `principal` holds a role satisfying `required`.
///
/// # Errors
///
/// - [`AuthError::MissingCredentials`] for an anonymous principal.
/// - [`AuthError::Forbidden`] when the role is insufficient.
pub fn require_role(principal: &Principal, required: Role) -> Result<(), AuthError> {
    match principal {
        Principal::Anonymous => Err(AuthError::MissingCredentials),
        Principal::Authenticated { role, .. } if role.satisfies(required) => Ok(()),
        Principal::Authenticated { username, role } => {
            warn!(%username, %role, %required, "role check failed");
            Err(AuthError::Forbidden { required })
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct Login {
    pub user: User,
    pub token: SessionToken,
}

/// Administrative account changes. Absent fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub role: Option<Role>,
    pub active: Option<bool>,
}

/// Credential checks, token issue and validation, account changes.
#[derive(Debug, Clone)]
pub struct AuthService {
    users: UserStore,
    signer: TokenSigner,
    hasher: CredentialHasher,
    dummy_hash: String,
}

impl AuthService {
    /// Build the service over the users table.
    ///
    /// Hashes a throwaway password once so unknown-username logins cost
    /// the same as wrong-password logins.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the dummy hash cannot be computed.
    pub fn new(config: AuthConfig, users: Table) -> Result<Self, AuthError> {
        let dummy_hash = config.hasher.hash_blocking(&uuid::Uuid::new_v4().to_string())?;
        Ok(Self {
            users: UserStore::new(users),
            signer: TokenSigner::new(config.signing_key, config.token_ttl),
            hasher: config.hasher,
            dummy_hash,
        })
    }

    /// The token signer, for callers that verify at a fixed instant.
    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Self-registration. Always creates a `standard` account.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Invalid`] for a malformed username, email or password.
    /// - [`AuthError::UsernameTaken`] if the username exists.
    /// - [`AuthError::Store`] on storage failure.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User, AuthError> {
        self.create_account(username, email, password, Role::Standard).await
    }

    /// Administrative creation with an explicit role.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub async fn provision(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        self.create_account(username, email, password, role).await
    }

    async fn create_account(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        validate_username(username)?;
        validate_email(email)?;
        check_password_policy(password)?;

        let record = UserRecord {
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash: self.hasher.hash(password).await?,
            role,
            active: true,
            created_at: Utc::now(),
        };

        if !self.users.insert(&record).await? {
            return Err(AuthError::UsernameTaken {
                username: username.to_owned(),
            });
        }

        info!(%username, %role, "account created");
        Ok(record.to_user())
    }

    /// Check a username and password and issue a session token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] for an unknown user, a wrong
    ///   password, or an inactive account.
    /// - [`AuthError::Store`] on storage failure.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Login, AuthError> {
        if password.len() > MAX_PASSWORD_LEN {
            return Err(AuthError::InvalidCredentials);
        }

        let record = if validate_username(username).is_ok() {
            self.users.get(username).await?
        } else {
            None
        };

        let Some(record) = record else {
            // Equalize timing with the known-user path.
            let _ = self.hasher.verify(password, &self.dummy_hash).await?;
            warn!(%username, "login failed");
            return Err(AuthError::InvalidCredentials);
        };

        let matches = self.hasher.verify(password, &record.password_hash).await?;
        if !matches || !record.active {
            warn!(%username, active = record.active, "login failed");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_token(&record.to_user())?;
        info!(%username, role = %record.role, "login succeeded");
        Ok(Login {
            user: record.to_user(),
            token,
        })
    }

    /// Sign a token for `user`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if signing fails.
    pub fn issue_token(&self, user: &User) -> Result<SessionToken, AuthError> {
        self.signer.issue(&user.username, user.role)
    }

    /// Resolve a bearer token into a principal.
    ///
    /// # Errors
    ///
    /// An `Unauthorized`-kind [`AuthError`] for malformed, forged or
    /// expired tokens.
    pub fn validate_token(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.signer.verify(token)?;
        Ok(Principal::Authenticated {
            username: claims.sub,
            role: claims.role,
        })
    }

    /// The caller's own account.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingCredentials`] for an anonymous principal.
    /// - [`AuthError::InvalidCredentials`] if the account vanished or was
    ///   deactivated after the token was issued.
    pub async fn current_user(&self, principal: &Principal) -> Result<User, AuthError> {
        let username = principal.username().ok_or(AuthError::MissingCredentials)?;
        match self.users.get(username).await? {
            Some(record) if record.active => Ok(record.to_user()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Look up one account. Admin only; users read themselves through
    /// [`Self::current_user`].
    ///
    /// # Errors
    ///
    /// - Guard errors from [`require_role`].
    /// - [`AuthError::UserNotFound`] if absent.
    pub async fn get_user(&self, principal: &Principal, username: &str) -> Result<User, AuthError> {
        require_role(principal, Role::Admin)?;
        self.users
            .get(username)
            .await?
            .map(|r| r.to_user())
            .ok_or_else(|| AuthError::UserNotFound {
                username: username.to_owned(),
            })
    }

    /// Every account. Admin only.
    ///
    /// # Errors
    ///
    /// Guard errors, or [`AuthError::Store`].
    pub async fn list_users(&self, principal: &Principal) -> Result<Vec<User>, AuthError> {
        require_role(principal, Role::Admin)?;
        Ok(self.users.list().await?)
    }

    /// Change the caller's own password after re-checking the current one.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingCredentials`] for an anonymous principal.
    /// - [`AuthError::InvalidCredentials`] if `current` is wrong.
    /// - [`AuthError::Invalid`] if `new` violates the password policy.
    pub async fn change_password(
        &self,
        principal: &Principal,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let username = principal.username().ok_or(AuthError::MissingCredentials)?;
        check_password_policy(new)?;

        let mut record = self
            .users
            .get(username)
            .await?
            .filter(|r| r.active)
            .ok_or(AuthError::InvalidCredentials)?;
        if !self.hasher.verify(current, &record.password_hash).await? {
            warn!(%username, "password change rejected");
            return Err(AuthError::InvalidCredentials);
        }

        record.password_hash = self.hasher.hash(new).await?;
        self.users.save(&record).await?;
        info!(%username, "password changed");
        Ok(())
    }

    /// Apply an administrative account change.
    ///
    /// Takes effect at the account's next login; tokens already issued
    /// keep their embedded role until they expire.
    ///
    /// # Errors
    ///
    /// - Guard errors from [`require_role`].
    /// - [`AuthError::UserNotFound`] if absent.
    /// - [`AuthError::Invalid`] if the update is empty.
    pub async fn update_account(
        &self,
        principal: &Principal,
        username: &str,
        update: AccountUpdate,
    ) -> Result<User, AuthError> {
        require_role(principal, Role::Admin)?;
        if update.role.is_none() && update.active.is_none() {
            return Err(AuthError::Invalid {
                reason: "nothing to update".to_owned(),
            });
        }

        let mut record = self.users.get(username).await?.ok_or_else(|| AuthError::UserNotFound {
            username: username.to_owned(),
        })?;
        if let Some(role) = update.role {
            record.role = role;
        }
        if let Some(active) = update.active {
            record.active = active;
        }
        self.users.save(&record).await?;

        info!(
            %username,
            role = %record.role,
            active = record.active,
            by = principal.username().unwrap_or_default(),
            "account updated"
        );
        Ok(record.to_user())
    }

    /// Change an account's role. Admin only.
    ///
    /// # Errors
    ///
    /// See [`update_account`](Self::update_account).
    pub async fn set_role(&self, principal: &Principal, username: &str, role: Role) -> Result<User, AuthError> {
        let update = AccountUpdate {
            role: Some(role),
            active: None,
        };
        self.update_account(principal, username, update).await
    }

    /// Activate or deactivate an account. Admin only.
    ///
    /// # Errors
    ///
    /// See [`update_account`](Self::update_account).
    pub async fn set_active(&self, principal: &Principal, username: &str, active: bool) -> Result<User, AuthError> {
        let update = AccountUpdate {
            role: None,
            active: Some(active),
        };
        self.update_account(principal, username, update).await
    }
}
