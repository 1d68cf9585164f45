/// Password Hashing and Verification
///
/// bcrypt is CPU-bound on purpose, so the async wrappers move the work onto
/// tokio's blocking pool instead of stalling an actix worker.

use bcrypt::{hash, verify};

use crate::error::AppError;
use crate::validators::MAX_PASSWORD_BYTES;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a plaintext secret with a fresh salt
    ///
    /// # Errors
    /// Returns error if the secret is longer than bcrypt can tell apart, or
    /// if bcrypt rejects the configured cost
    pub fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(AppError::Internal(
                "Password exceeds the bcrypt input limit".to_string(),
            ));
        }
        hash(plaintext, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a plaintext secret against a stored digest.
    ///
    /// Fails closed: a malformed digest, any bcrypt error or a secret longer
    /// than 72 bytes counts as a mismatch. bcrypt would silently truncate the
    /// latter and accept any secret sharing its first 72 bytes.
    pub fn verify(&self, plaintext: &str, digest: &str) -> bool {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            tracing::warn!("Password longer than the bcrypt input limit, treating as mismatch");
            return false;
        }
        match verify(plaintext, digest) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "Password verification errored, treating as mismatch");
                false
            }
        }
    }

    pub async fn hash_blocking(&self, plaintext: String) -> Result<String, AppError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await?
    }

    pub async fn verify_blocking(&self, plaintext: String, digest: String) -> bool {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &digest))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Password verification task failed");
                false
            })
    }
}
