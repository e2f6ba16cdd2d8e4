//! User accounts and the credential store.
//!
//! [`UserRecord`] is the persisted form and is the only type that carries
//! the password hash. Everything that leaves this crate is a [`User`],
//! which has no hash field at all.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, StoreError};
use crate::table::Table;

/// Authorization role attached to an account and to its tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A learner.
    Standard,
    /// A content administrator.
    Admin,
}

impl Role {
    /// Whether holding `self` is enough for an operation that requires
    /// `required`. Admin satisfies everything.
    #[must_use]
    pub fn satisfies(self, required: Role) -> bool {
        self == Role::Admin || required == Role::Standard
    }

    /// Lowercase name, as used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "admin" => Ok(Self::Admin),
            other => Err(AuthError::Invalid {
                reason: format!("unknown role '{other}'"),
            }),
        }
    }
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Persisted account, including the password hash.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    pub(crate) password_hash: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("role", &self.role)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl UserRecord {
    /// The outward view of this record.
    #[must_use]
    pub fn to_user(&self) -> User {
        User {
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            active: self.active,
            created_at: self.created_at,
        }
    }
}

/// Validate a username: 3–64 chars of ASCII alphanumerics, `_`, `-`, `.`.
///
/// # Errors
///
/// [`AuthError::Invalid`] describing the rule that failed.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !(3..=64).contains(&len) {
        return Err(AuthError::Invalid {
            reason: "username must be 3-64 characters".to_owned(),
        });
    }
    if !username
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
    {
        return Err(AuthError::Invalid {
            reason: "username may only contain letters, digits, '_', '-', '.'".to_owned(),
        });
    }
    Ok(())
}

/// Minimal shape check: exactly one `@`, non-empty local part, a dot in
/// the domain, no whitespace.
///
/// # Errors
///
/// [`AuthError::Invalid`] if the address is malformed.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let invalid = || AuthError::Invalid {
        reason: "email address is malformed".to_owned(),
    };
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.split_once('.') {
        Some((head, tail)) if !head.is_empty() && !tail.is_empty() && !tail.ends_with('.') => Ok(()),
        _ => Err(invalid()),
    }
}

/// Credential store: one [`UserRecord`] per username.
#[derive(Debug, Clone)]
pub struct UserStore {
    table: Table,
}

impl UserStore {
    /// A store over the given users table.
    #[must_use]
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    /// Fetch a record by username.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn get(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        self.table.get_json(username).await
    }

    /// Insert a record only if the username is free. Returns `false` when
    /// it was taken.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn insert(&self, record: &UserRecord) -> Result<bool, StoreError> {
        self.table.insert_json(&record.username, record).await
    }

    /// Overwrite an existing record.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn save(&self, record: &UserRecord) -> Result<(), StoreError> {
        self.table.put_json(&record.username, record).await
    }

    /// Every account, in username order.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on storage failure.
    pub async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users = Vec::new();
        for username in self.table.list("").await? {
            if let Some(record) = self.get(&username).await? {
                users.push(record.to_user());
            }
        }
        Ok(users)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn admin_satisfies_everything_standard_only_itself() {
        assert!(Role::Admin.satisfies(Role::Admin));
        assert!(Role::Admin.satisfies(Role::Standard));
        assert!(Role::Standard.satisfies(Role::Standard));
        assert!(!Role::Standard.satisfies(Role::Admin));
    }

    #[test]
    fn role_round_trips_through_its_name() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Standard).unwrap(), "\"standard\"");
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.b-c_d").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("slash/name").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("alice@example.org").is_ok());
        assert!(validate_email("alice@localhost").is_err());
        assert!(validate_email("@example.org").is_err());
        assert!(validate_email("a@b@example.org").is_err());
        assert!(validate_email("alice example@x.org").is_err());
    }

    #[test]
    fn record_debug_hides_hash() {
        let record = UserRecord {
            username: "alice".to_owned(),
            email: "alice@example.org".to_owned(),
            password_hash: "$argon2id$secret".to_owned(),
            role: Role::Standard,
            active: true,
            created_at: Utc::now(),
        };
        let rendered = format!("{record:?}");
        assert!(!rendered.contains("argon2id"));
        assert!(!serde_json::to_string(&record.to_user()).unwrap().contains("argon2id"));
    }
}
