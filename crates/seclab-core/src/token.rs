//! Stateless session tokens (compact JWS, HS256).
//!
//! A token is `base64url(header).base64url(claims).base64url(hmac)` with
//! the HMAC-SHA256 taken over the first two segments. The server keeps no
//! session table: whoever holds an unexpired, correctly signed token is
//! the principal named inside it.
//!
//! # Validation order
//!
//! 1. Exactly three segments, each valid base64url.
//! 2. Header `alg` must be `HS256` (no algorithm negotiation).
//! 3. Signature verified in constant time before the claims are parsed.
//! 4. `now >= exp` is expired.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::AuthError;
use crate::user::Role;

type HmacSha256 = Hmac<Sha256>;

/// Minimum signing secret length, in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// Default token lifetime.
pub const DEFAULT_TTL_MINUTES: i64 = 30;

/// Longest token lifetime a deployment may configure (seven days).
pub const MAX_TTL_MINUTES: i64 = 7 * 24 * 60;

const ALGORITHM: &str = "HS256";

/// The HMAC signing secret. Zeroized on drop, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl SigningKey {
    /// Wrap a secret.
    ///
    /// # Errors
    ///
    /// [`AuthError::Invalid`] if the secret is shorter than [`MIN_KEY_LEN`].
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, AuthError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_KEY_LEN {
            return Err(AuthError::Invalid {
                reason: format!("signing key must be at least {MIN_KEY_LEN} bytes"),
            });
        }
        Ok(Self { bytes })
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey([redacted])")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    /// Role at the time of issue.
    pub role: Role,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

/// A freshly issued token and its absolute expiry.
#[derive(Clone, Serialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Issues and verifies session tokens with one process-wide key.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    key: SigningKey,
    ttl: Duration,
}

impl TokenSigner {
    /// A signer with the given key and token lifetime.
    #[must_use]
    pub fn new(key: SigningKey, ttl: Duration) -> Self {
        Self { key, ttl }
    }

    /// Token lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.key.bytes).map_err(|e| AuthError::Internal {
            reason: format!("hmac init: {e}"),
        })
    }

    /// Issue a token for `username` with `role`, expiring `ttl` from now.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if encoding or signing fails.
    pub fn issue(&self, username: &str, role: Role) -> Result<SessionToken, AuthError> {
        self.issue_at(username, role, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if encoding or signing fails.
    pub fn issue_at(
        &self,
        username: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, AuthError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AuthError::Internal {
                reason: format!("token lifetime {} overflows the clock", self.ttl),
            })?;
        let claims = Claims {
            sub: username.to_owned(),
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let header = Header {
            alg: ALGORITHM.to_owned(),
            typ: "JWT".to_owned(),
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(SessionToken {
            token: format!("{signing_input}.{signature}"),
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or(expires_at),
        })
    }

    /// Verify a token against the current time.
    ///
    /// # Errors
    ///
    /// An `Unauthorized`-kind [`AuthError`] if the token is malformed,
    /// wrongly signed, or expired.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let malformed = |reason: &str| AuthError::TokenMalformed {
            reason: reason.to_owned(),
        };

        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed("expected three segments"));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| malformed("header is not base64url"))?;
        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| malformed("header is not JSON"))?;
        if header.alg != ALGORITHM {
            return Err(malformed("unsupported algorithm"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| malformed("signature is not base64url"))?;
        let signed_len = header_b64.len().saturating_add(1).saturating_add(claims_b64.len());
        let signing_input = token.get(..signed_len).ok_or_else(|| malformed("truncated"))?;

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::TokenSignature)?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| malformed("claims are not base64url"))?;
        let claims: Claims =
            serde_json::from_slice(&claims_bytes).map_err(|_| malformed("claims are not valid"))?;

        if now.timestamp() >= claims.exp {
            return Err(AuthError::TokenExpired {
                expired_at: claims.exp,
            });
        }

        Ok(claims)
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let bytes = serde_json::to_vec(value).map_err(|e| AuthError::Internal {
        reason: format!("token encoding: {e}"),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(
            SigningKey::new(b"0123456789abcdef0123456789abcdef".to_vec()).unwrap(),
            Duration::minutes(DEFAULT_TTL_MINUTES),
        )
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(SigningKey::new(b"too-short".to_vec()).is_err());
        assert_eq!(
            format!("{:?}", SigningKey::new(vec![7u8; 32]).unwrap()),
            "SigningKey([redacted])"
        );
    }

    #[test]
    fn issued_token_verifies_with_matching_claims() {
        let s = signer();
        let now = Utc::now();
        let issued = s.issue_at("alice", Role::Admin, now).unwrap();
        let claims = s.verify_at(&issued.token, now).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, DEFAULT_TTL_MINUTES * 60);
        assert_eq!(issued.expires_at.timestamp(), claims.exp);
    }

    #[test]
    fn token_expires_exactly_at_exp() {
        let s = signer();
        let now = Utc::now();
        let issued = s.issue_at("alice", Role::Standard, now).unwrap();

        let just_before = now + s.ttl() - Duration::seconds(1);
        assert!(s.verify_at(&issued.token, just_before).is_ok());

        let at_expiry = now + s.ttl();
        let err = s.verify_at(&issued.token, at_expiry).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired { .. }));
    }

    #[test]
    fn oversized_lifetime_is_an_error_not_a_panic() {
        let s = TokenSigner::new(
            SigningKey::new(vec![b'k'; 32]).unwrap(),
            Duration::try_days(100_000_000).unwrap(),
        );
        assert!(matches!(
            s.issue("alice", Role::Standard),
            Err(AuthError::Internal { .. })
        ));
    }

    #[test]
    fn other_key_fails_signature() {
        let issued = signer().issue("alice", Role::Standard).unwrap();
        let other = TokenSigner::new(SigningKey::new(vec![b'z'; 32]).unwrap(), Duration::minutes(5));
        assert!(matches!(other.verify(&issued.token), Err(AuthError::TokenSignature)));
    }

    #[test]
    fn tampered_claims_fail_signature() {
        let s = signer();
        let issued = s.issue("alice", Role::Standard).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&serde_json::json!({
                "sub": "alice", "role": "admin", "iat": 0, "exp": i64::MAX, "jti": "x"
            }))
            .unwrap(),
        );
        let forged = format!("{}.{forged_claims}.{}", parts[0], parts[2]);
        assert!(matches!(s.verify(&forged), Err(AuthError::TokenSignature)));
    }

    #[test]
    fn alg_none_is_malformed() {
        let s = signer();
        let issued = s.issue("alice", Role::Standard).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();
        let none_header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let forged = format!("{none_header}.{}.", parts[1]);
        assert!(matches!(s.verify(&forged), Err(AuthError::TokenMalformed { .. })));
    }

    #[test]
    fn garbage_is_malformed() {
        let s = signer();
        for token in ["", "a.b", "a.b.c.d", "!!!.???.***"] {
            assert!(
                matches!(s.verify(token), Err(AuthError::TokenMalformed { .. })),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn each_token_gets_a_fresh_jti() {
        let s = signer();
        let a = s.verify(&s.issue("alice", Role::Standard).unwrap().token).unwrap();
        let b = s.verify(&s.issue("alice", Role::Standard).unwrap().token).unwrap();
        assert_ne!(a.jti, b.jti);
    }
}
