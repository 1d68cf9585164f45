/// Refresh Token Ledger
///
/// Refresh tokens are JWTs, but every one that is handed out is also recorded
/// here so it can be revoked:
/// - keyed by the SHA-256 hex digest of the token's `jti` (never the token)
/// - revoked on rotation, logout, password change and deactivation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// Ledger entry for one issued refresh token
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRefreshToken {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn save(
        &self,
        user_id: Uuid,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn find(&self, jti: &str) -> Result<Option<StoredRefreshToken>, AppError>;

    /// Returns true if a live token was revoked by this call
    async fn revoke(&self, jti: &str) -> Result<bool, AppError>;

    /// Returns the number of tokens revoked
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;
}

/// Hash a token id using SHA-256
pub fn hash_token(jti: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(jti.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn save(
        &self,
        user_id: Uuid,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(hash_token(jti))
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, jti: &str) -> Result<Option<StoredRefreshToken>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, bool)>(
            r#"
            SELECT user_id, expires_at, is_revoked
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(jti))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, expires_at, is_revoked)| StoredRefreshToken {
            user_id,
            expires_at,
            is_revoked,
        }))
    }

    async fn revoke(&self, jti: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE token_hash = $2 AND is_revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(hash_token(jti))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE user_id = $2 AND is_revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
