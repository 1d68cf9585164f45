/// JWT Token Issuing and Validation
///
/// Both token kinds are HMAC-signed JWTs carrying the same claim set; they
/// differ only in lifetime and `token_kind`.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::{AppError, ConfigError, TokenError};

/// A freshly signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Mints access and refresh tokens
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    algorithm: Algorithm,
    issuer: String,
    access_lifetime: i64,
    refresh_lifetime: i64,
}

impl TokenIssuer {
    pub fn new(settings: &JwtSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            key: EncodingKey::from_secret(settings.secret_key.as_bytes()),
            algorithm: settings.algorithm()?,
            issuer: settings.issuer.clone(),
            access_lifetime: settings.access_token_expiry_seconds(),
            refresh_lifetime: settings.refresh_token_expiry_seconds(),
        })
    }

    /// Lifetime of access tokens in seconds
    pub fn access_lifetime(&self) -> i64 {
        self.access_lifetime
    }

    pub fn issue_access_token(
        &self,
        subject: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AppError> {
        self.issue(subject, TokenKind::AccessToken, now, self.access_lifetime)
    }

    pub fn issue_refresh_token(
        &self,
        subject: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AppError> {
        self.issue(subject, TokenKind::RefreshToken, now, self.refresh_lifetime)
    }

    fn issue(
        &self,
        subject: Uuid,
        kind: TokenKind,
        now: DateTime<Utc>,
        lifetime: i64,
    ) -> Result<IssuedToken, AppError> {
        let claims = Claims::new(subject, kind, now.timestamp(), lifetime, &self.issuer);

        let token = encode(&Header::new(self.algorithm), &claims, &self.key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(IssuedToken { token, claims })
    }
}

/// Verifies signature, expiry and kind of presented tokens
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(settings: &JwtSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let mut validation = Validation::new(settings.algorithm()?);
        validation.set_issuer(&[&settings.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
        // expiry is checked against the caller's clock in `validate_at`
        validation.validate_exp = false;

        Ok(Self {
            key: DecodingKey::from_secret(settings.secret_key.as_bytes()),
            validation,
        })
    }

    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        self.validate_at(token, expected, Utc::now())
    }

    /// Checks, in order: signature, expiry (`now < exp`), token kind
    pub fn validate_at(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::from)?;

        if claims.is_expired_at(now.timestamp()) {
            return Err(TokenError::Expired);
        }

        if claims.token_kind != expected {
            return Err(TokenError::WrongType);
        }

        Ok(claims)
    }
}
