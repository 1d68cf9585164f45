/// JWT Claims structure
///
/// Payload shared by access and refresh tokens. The `token_kind` claim keeps a
/// refresh token from being accepted where an access token is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

/// Discriminates access tokens from refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    AccessToken,
    RefreshToken,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::AccessToken => write!(f, "access_token"),
            TokenKind::RefreshToken => write!(f, "refresh_token"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub token_kind: TokenKind,
    /// Unique token ID, the revocation key for refresh tokens
    pub jti: String,
    /// Issuer
    pub iss: String,
}

impl Claims {
    pub fn new(subject: Uuid, kind: TokenKind, now: i64, lifetime_seconds: i64, issuer: &str) -> Self {
        Self {
            sub: subject.to_string(),
            iat: now,
            exp: now + lifetime_seconds,
            token_kind: kind,
            jti: Uuid::new_v4().to_string(),
            iss: issuer.to_string(),
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }

    /// A token is expired from the second `exp` is reached
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}
