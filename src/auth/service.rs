/// Authentication Service
///
/// Orchestrates the session lifecycle:
/// `Anonymous -> Authenticated -> (Refreshing) -> Authenticated | LoggedOut`.
///
/// Generic over its stores so the flows can be exercised without a database.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::credentials::{CredentialStore, PgCredentialStore};
use crate::auth::jwt::{TokenIssuer, TokenValidator};
use crate::auth::password::PasswordHasher;
use crate::auth::refresh_token::{PgRefreshTokenStore, RefreshTokenStore};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

pub type PgAuthService = AuthService<PgCredentialStore, PgRefreshTokenStore>;

/// Access + refresh token pair returned by login and refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub struct AuthService<C, R> {
    credentials: C,
    refresh_tokens: R,
    issuer: TokenIssuer,
    validator: TokenValidator,
    hasher: PasswordHasher,
    // verified against when the identifier is unknown, so both paths cost one bcrypt run
    dummy_hash: String,
}

impl<C, R> AuthService<C, R>
where
    C: CredentialStore,
    R: RefreshTokenStore,
{
    pub fn new(
        credentials: C,
        refresh_tokens: R,
        jwt: &JwtSettings,
        hasher: PasswordHasher,
    ) -> Result<Self, AppError> {
        Ok(Self {
            credentials,
            refresh_tokens,
            issuer: TokenIssuer::new(jwt)?,
            validator: TokenValidator::new(jwt)?,
            dummy_hash: hasher.hash(&Uuid::new_v4().to_string())?,
            hasher,
        })
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Verify credentials and issue a token pair.
    ///
    /// Unknown identifier and wrong secret produce the same
    /// `InvalidCredentials` error.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<TokenPair, AppError> {
        let identifier = identifier.trim().to_lowercase();
        let user = self.credentials.find_by_identifier(&identifier).await?;

        let digest = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let matches = self
            .hasher
            .verify_blocking(secret.to_string(), digest)
            .await;

        let user = match user {
            Some(user) if matches => user,
            Some(user) => {
                tracing::warn!(user_id = %user.id, "Login rejected: wrong password");
                return Err(AuthError::InvalidCredentials.into());
            }
            None => {
                tracing::warn!("Login rejected: unknown identifier");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login rejected: account inactive");
            return Err(AuthError::AccountInactive.into());
        }

        let pair = self.issue_pair(user.id).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Exchange a refresh token for a rotated pair. The presented token is
    /// revoked; presenting it again revokes every refresh token of the user.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.validate_refresh(refresh_token)?;
        let user_id = claims.user_id().map_err(|_| AuthError::Unauthorized)?;

        let stored = self
            .refresh_tokens
            .find(&claims.jti)
            .await?
            .filter(|stored| stored.user_id == user_id)
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, "Refresh token not found in ledger");
                AuthError::Unauthorized
            })?;

        if stored.is_revoked {
            tracing::warn!(user_id = %user_id, "Revoked refresh token reused, revoking all sessions");
            self.refresh_tokens.revoke_all_for_user(user_id).await?;
            return Err(AuthError::Unauthorized.into());
        }

        if stored.expires_at <= Utc::now() {
            tracing::info!(user_id = %user_id, "Refresh token expired in ledger");
            return Err(AuthError::Unauthorized.into());
        }

        let user = self
            .credentials
            .find_by_id(user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, "Refresh for missing or inactive user");
                AuthError::Unauthorized
            })?;

        // a concurrent refresh may have consumed the token in the meantime
        if !self.refresh_tokens.revoke(&claims.jti).await? {
            tracing::warn!(user_id = %user_id, "Refresh token consumed concurrently");
            return Err(AuthError::Unauthorized.into());
        }

        let pair = self.issue_pair(user.id).await?;
        tracing::info!(user_id = %user.id, "Token refreshed");
        Ok(pair)
    }

    /// Revoke a refresh token. Revoking an already revoked token is a no-op.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        let claims = self.validate_refresh(refresh_token)?;

        if self.refresh_tokens.revoke(&claims.jti).await? {
            tracing::info!(user_id = %claims.sub, "User logged out");
        } else {
            tracing::debug!(user_id = %claims.sub, "Logout for already revoked token");
        }
        Ok(())
    }

    /// Revoke every refresh token of a user
    pub async fn logout_everywhere(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.refresh_tokens.revoke_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "All refresh tokens revoked");
        Ok(revoked)
    }

    /// Validate a bearer access token
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        self.validator
            .validate(access_token, TokenKind::AccessToken)
            .map_err(AuthError::Token)
    }

    fn validate_refresh(&self, refresh_token: &str) -> Result<Claims, AuthError> {
        self.validator
            .validate(refresh_token, TokenKind::RefreshToken)
            .map_err(|e| {
                tracing::warn!(error = %e, "Refresh token rejected");
                AuthError::Unauthorized
            })
    }

    async fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let now = Utc::now();
        let access = self.issuer.issue_access_token(user_id, now)?;
        let refresh = self.issuer.issue_refresh_token(user_id, now)?;

        let expires_at = DateTime::<Utc>::from_timestamp(refresh.claims.exp, 0)
            .ok_or_else(|| AppError::Internal("Refresh token expiry out of range".to_string()))?;
        self.refresh_tokens
            .save(user_id, &refresh.claims.jti, expires_at)
            .await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "bearer".to_string(),
            expires_in: self.issuer.access_lifetime(),
        })
    }
}
