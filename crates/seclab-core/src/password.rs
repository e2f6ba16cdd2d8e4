//! Password hashing and verification with Argon2id.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`)
//! so the salt and cost parameters travel with the hash and verification
//! needs nothing else. Both operations are CPU-bound by design and run on
//! the Tokio blocking pool so request handlers stay responsive.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::AuthError;

/// Shortest accepted password, in bytes.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Longest accepted password, in bytes. Bounds hashing work per request.
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Argon2id hasher with fixed cost parameters.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl CredentialHasher {
    /// A hasher producing hashes with the given cost parameters.
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// The cheapest parameters argon2 accepts. Tests only.
    ///
    /// # Errors
    ///
    /// Never in practice; the constants are within argon2's bounds.
    pub fn insecure_fast() -> Result<Self, AuthError> {
        let params = Params::new(Params::MIN_M_COST, Params::MIN_T_COST, Params::MIN_P_COST, None)
            .map_err(|e| AuthError::Internal {
                reason: format!("argon2 params: {e}"),
            })?;
        Ok(Self::new(params))
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `password` with a fresh random salt, synchronously.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if argon2 rejects the input.
    pub fn hash_blocking(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Internal {
                reason: format!("password hashing failed: {e}"),
            })
    }

    /// Hash `password` on the blocking pool.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if hashing fails or the task is lost.
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash_blocking(&password))
            .await
            .map_err(|e| AuthError::Internal {
                reason: format!("hashing task failed: {e}"),
            })?
    }

    /// Check `password` against a stored PHC string on the blocking pool.
    ///
    /// Returns `Ok(false)` on mismatch. The comparison inside argon2 is
    /// constant-time.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the stored hash cannot be parsed.
    pub async fn verify(&self, password: &str, phc: &str) -> Result<bool, AuthError> {
        let password = password.to_owned();
        let phc = phc.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&phc).map_err(|e| AuthError::Internal {
                reason: format!("stored hash unreadable: {e}"),
            })?;
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| AuthError::Internal {
            reason: format!("verification task failed: {e}"),
        })?
    }
}

/// Reject passwords outside the accepted length range.
///
/// # Errors
///
/// [`AuthError::Invalid`] naming the violated bound.
pub fn check_password_policy(password: &str) -> Result<(), AuthError> {
    let len = password.len();
    if len < MIN_PASSWORD_LEN {
        return Err(AuthError::Invalid {
            reason: format!("password must be at least {MIN_PASSWORD_LEN} bytes"),
        });
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AuthError::Invalid {
            reason: format!("password must be at most {MAX_PASSWORD_LEN} bytes"),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hasher = CredentialHasher::insecure_fast().unwrap();
        let phc = hasher.hash("correct horse battery").await.unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(!phc.contains("correct horse"));
        assert!(hasher.verify("correct horse battery", &phc).await.unwrap());
        assert!(!hasher.verify("wrong horse battery", &phc).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let hasher = CredentialHasher::insecure_fast().unwrap();
        let a = hasher.hash("repeated-password").await.unwrap();
        let b = hasher.hash("repeated-password").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn garbage_hash_is_an_internal_error() {
        let hasher = CredentialHasher::insecure_fast().unwrap();
        let err = hasher.verify("whatever1", "not-a-phc").await.unwrap_err();
        assert!(matches!(err, AuthError::Internal { .. }));
    }

    #[test]
    fn policy_bounds() {
        assert!(check_password_policy("short").is_err());
        assert!(check_password_policy("eight888").is_ok());
        assert!(check_password_policy(&"x".repeat(MAX_PASSWORD_LEN + 1)).is_err());
    }
}
