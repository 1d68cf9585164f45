//! Login, refresh and logout flows of `AuthService` against in-memory stores

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crudauth::auth::{
    hash_token, AuthService, CredentialStore, PasswordHasher, RefreshTokenStore,
    StoredRefreshToken, TokenIssuer, TokenKind,
};
use crudauth::configuration::{JwtSettings, MAX_TOKEN_EXPIRE_MINUTES};
use crudauth::error::{AppError, AuthError, TokenError};
use crudauth::models::User;

#[derive(Clone, Default)]
struct InMemoryUsers {
    users: Arc<Mutex<Vec<User>>>,
}

impl InMemoryUsers {
    fn insert(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    fn deactivate(&self, user_id: Uuid) {
        for user in self.users.lock().unwrap().iter_mut() {
            if user.id == user_id {
                user.is_active = false;
            }
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryUsers {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == identifier)
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }
}

#[derive(Clone, Default)]
struct InMemoryRefreshTokens {
    tokens: Arc<Mutex<HashMap<String, StoredRefreshToken>>>,
    // when set, the next revoke behaves as if another request revoked the token first
    lose_next_revoke: Arc<AtomicBool>,
}

impl InMemoryRefreshTokens {
    fn expire_all(&self) {
        for token in self.tokens.lock().unwrap().values_mut() {
            token.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    fn total(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    fn live_count(&self, user_id: Uuid) -> usize {
        self.tokens
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.user_id == user_id && !t.is_revoked)
            .count()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokens {
    async fn save(
        &self,
        user_id: Uuid,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.tokens.lock().unwrap().insert(
            hash_token(jti),
            StoredRefreshToken {
                user_id,
                expires_at,
                is_revoked: false,
            },
        );
        Ok(())
    }

    async fn find(&self, jti: &str) -> Result<Option<StoredRefreshToken>, AppError> {
        Ok(self.tokens.lock().unwrap().get(&hash_token(jti)).cloned())
    }

    async fn revoke(&self, jti: &str) -> Result<bool, AppError> {
        let lost_race = self.lose_next_revoke.swap(false, Ordering::SeqCst);
        match self.tokens.lock().unwrap().get_mut(&hash_token(jti)) {
            Some(token) if lost_race => {
                token.is_revoked = true;
                Ok(false)
            }
            Some(token) if !token.is_revoked => {
                token.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut revoked = 0;
        for token in self.tokens.lock().unwrap().values_mut() {
            if token.user_id == user_id && !token.is_revoked {
                token.is_revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

const SECRET: &str = "integration-test-secret-key-0123456789";

fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret_key: SECRET.to_string(),
        algorithm: "HS256".to_string(),
        access_token_expire_minutes: 30,
        refresh_token_expire_minutes: 60 * 24 * 7,
        issuer: "crudauth-test".to_string(),
    }
}

struct TestService {
    service: AuthService<InMemoryUsers, InMemoryRefreshTokens>,
    users: InMemoryUsers,
    tokens: InMemoryRefreshTokens,
}

/// Builds a service with one active user `a@b.com` / `correct`
fn spawn_service() -> (TestService, Uuid) {
    spawn_service_with(jwt_settings(), "correct")
}

fn spawn_service_with(settings: JwtSettings, password: &str) -> (TestService, Uuid) {
    let hasher = PasswordHasher::new(4);
    let users = InMemoryUsers::default();
    let tokens = InMemoryRefreshTokens::default();

    let user_id = Uuid::new_v4();
    users.insert(User {
        id: user_id,
        name: "alice".to_string(),
        email: "a@b.com".to_string(),
        password_hash: hasher.hash(password).unwrap(),
        is_active: true,
        role: "user".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    });

    let service =
        AuthService::new(users.clone(), tokens.clone(), &settings, hasher).unwrap();

    (
        TestService {
            service,
            users,
            tokens,
        },
        user_id,
    )
}

fn is_unauthorized(result: Result<impl std::fmt::Debug, AppError>) -> bool {
    matches!(result, Err(AppError::Auth(AuthError::Unauthorized)))
}

#[tokio::test]
async fn login_issues_pair_with_thirty_minute_access_token() {
    let (app, user_id) = spawn_service();

    let before = Utc::now().timestamp();
    let pair = app.service.login("a@b.com", "correct").await.unwrap();

    assert_eq!(pair.token_type, "bearer");
    assert_eq!(pair.expires_in, 30 * 60);
    assert_ne!(pair.access_token, pair.refresh_token);

    let claims = app.service.authenticate(&pair.access_token).unwrap();
    assert_eq!(claims.user_id().unwrap(), user_id);
    assert_eq!(claims.token_kind, TokenKind::AccessToken);
    assert!((claims.exp - (before + 30 * 60)).abs() <= 5);

    assert_eq!(app.tokens.live_count(user_id), 1);
}

#[tokio::test]
async fn login_normalises_identifier() {
    let (app, _) = spawn_service();

    assert!(app.service.login("  A@B.com ", "correct").await.is_ok());
}

#[tokio::test]
async fn unknown_identifier_and_wrong_secret_fail_identically() {
    let (app, _) = spawn_service();

    let unknown = app.service.login("nobody@b.com", "correct").await;
    let wrong = app.service.login("a@b.com", "incorrect").await;

    assert!(matches!(unknown, Err(AppError::Auth(AuthError::InvalidCredentials))));
    assert!(matches!(wrong, Err(AppError::Auth(AuthError::InvalidCredentials))));
    assert_eq!(
        unknown.unwrap_err().to_string(),
        wrong.unwrap_err().to_string()
    );
}

#[tokio::test]
async fn inactive_user_cannot_log_in() {
    let (app, user_id) = spawn_service();
    app.users.deactivate(user_id);

    let result = app.service.login("a@b.com", "correct").await;

    assert!(matches!(result, Err(AppError::Auth(AuthError::AccountInactive))));
    assert_eq!(app.tokens.live_count(user_id), 0);
}

#[tokio::test]
async fn refresh_token_is_rejected_as_access_token() {
    let (app, _) = spawn_service();
    let pair = app.service.login("a@b.com", "correct").await.unwrap();

    let result = app.service.authenticate(&pair.refresh_token);

    assert_eq!(result.unwrap_err(), AuthError::Token(TokenError::WrongType));
}

#[tokio::test]
async fn access_token_cannot_be_used_to_refresh() {
    let (app, _) = spawn_service();
    let pair = app.service.login("a@b.com", "correct").await.unwrap();

    assert!(is_unauthorized(app.service.refresh(&pair.access_token).await));
}

#[tokio::test]
async fn refresh_rotates_the_pair() {
    let (app, user_id) = spawn_service();
    let first = app.service.login("a@b.com", "correct").await.unwrap();

    let second = app.service.refresh(&first.refresh_token).await.unwrap();

    assert_ne!(first.refresh_token, second.refresh_token);
    assert!(app.service.authenticate(&second.access_token).is_ok());
    assert_eq!(app.tokens.live_count(user_id), 1);
}

#[tokio::test]
async fn rotated_refresh_token_cannot_be_reused() {
    let (app, user_id) = spawn_service();
    let first = app.service.login("a@b.com", "correct").await.unwrap();
    let second = app.service.refresh(&first.refresh_token).await.unwrap();

    assert!(is_unauthorized(app.service.refresh(&first.refresh_token).await));

    // reuse of a rotated token burns the whole family
    assert_eq!(app.tokens.live_count(user_id), 0);
    assert!(is_unauthorized(app.service.refresh(&second.refresh_token).await));
}

#[tokio::test]
async fn logout_makes_refresh_token_unusable() {
    let (app, _) = spawn_service();
    let pair = app.service.login("a@b.com", "correct").await.unwrap();

    app.service.logout(&pair.refresh_token).await.unwrap();
    // a second logout is a no-op
    app.service.logout(&pair.refresh_token).await.unwrap();

    assert!(is_unauthorized(app.service.refresh(&pair.refresh_token).await));
}

#[tokio::test]
async fn logout_rejects_garbage() {
    let (app, _) = spawn_service();

    assert!(is_unauthorized(app.service.logout("not-a-token").await));
}

#[tokio::test]
async fn logout_everywhere_revokes_every_session() {
    let (app, user_id) = spawn_service();
    let first = app.service.login("a@b.com", "correct").await.unwrap();
    let second = app.service.login("a@b.com", "correct").await.unwrap();

    let revoked = app.service.logout_everywhere(user_id).await.unwrap();

    assert_eq!(revoked, 2);
    assert!(is_unauthorized(app.service.refresh(&first.refresh_token).await));
    assert!(is_unauthorized(app.service.refresh(&second.refresh_token).await));
}

#[tokio::test]
async fn refresh_fails_once_user_is_deactivated() {
    let (app, user_id) = spawn_service();
    let pair = app.service.login("a@b.com", "correct").await.unwrap();

    app.users.deactivate(user_id);

    assert!(is_unauthorized(app.service.refresh(&pair.refresh_token).await));
}

#[tokio::test]
async fn refresh_token_missing_from_ledger_is_rejected() {
    let (app, user_id) = spawn_service();
    let pair = app.service.login("a@b.com", "correct").await.unwrap();

    app.tokens.tokens.lock().unwrap().clear();

    assert!(is_unauthorized(app.service.refresh(&pair.refresh_token).await));
    assert_eq!(app.tokens.live_count(user_id), 0);
}

#[tokio::test]
async fn tokens_from_another_secret_are_rejected() {
    let (app, _) = spawn_service();

    let mut other = jwt_settings();
    other.secret_key = "a-completely-different-secret-key-0000".to_string();
    let hasher = PasswordHasher::new(4);
    let users = InMemoryUsers::default();
    users.insert(User {
        id: Uuid::new_v4(),
        name: "mallory".to_string(),
        email: "m@b.com".to_string(),
        password_hash: hasher.hash("correct").unwrap(),
        is_active: true,
        role: "admin".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    });
    let foreign_service =
        AuthService::new(users, InMemoryRefreshTokens::default(), &other, hasher).unwrap();
    let foreign = foreign_service.login("m@b.com", "correct").await.unwrap();

    assert_eq!(
        app.service.authenticate(&foreign.access_token).unwrap_err(),
        AuthError::Token(TokenError::InvalidSignature)
    );
    assert!(is_unauthorized(app.service.refresh(&foreign.refresh_token).await));
}

#[tokio::test]
async fn garbage_access_token_is_malformed() {
    let (app, _) = spawn_service();

    assert_eq!(
        app.service.authenticate("definitely.not.a-jwt").unwrap_err(),
        AuthError::Token(TokenError::Malformed)
    );
}

#[tokio::test]
async fn expired_refresh_token_is_rejected() {
    let mut settings = jwt_settings();
    settings.refresh_token_expire_minutes = 1;
    let (app, user_id) = spawn_service_with(settings.clone(), "correct");

    let issuer = TokenIssuer::new(&settings).unwrap();
    let stale = issuer
        .issue_refresh_token(user_id, Utc::now() - Duration::minutes(2))
        .unwrap();
    app.tokens
        .save(user_id, &stale.claims.jti, Utc::now() + Duration::days(1))
        .await
        .unwrap();

    assert!(is_unauthorized(app.service.refresh(&stale.token).await));
    assert!(is_unauthorized(app.service.logout(&stale.token).await));
    // rejected before the ledger is touched
    assert_eq!(app.tokens.live_count(user_id), 1);
}

#[tokio::test]
async fn refresh_token_expired_in_ledger_is_rejected() {
    let (app, user_id) = spawn_service();
    let pair = app.service.login("a@b.com", "correct").await.unwrap();

    app.tokens.expire_all();

    assert!(is_unauthorized(app.service.refresh(&pair.refresh_token).await));
    assert_eq!(app.tokens.total(), 1);
    assert_eq!(app.tokens.live_count(user_id), 1);
}

#[tokio::test]
async fn refresh_losing_a_concurrent_race_issues_nothing() {
    let (app, user_id) = spawn_service();
    let pair = app.service.login("a@b.com", "correct").await.unwrap();

    app.tokens.lose_next_revoke.store(true, Ordering::SeqCst);

    assert!(is_unauthorized(app.service.refresh(&pair.refresh_token).await));
    assert_eq!(app.tokens.total(), 1);
    assert_eq!(app.tokens.live_count(user_id), 0);
}

#[tokio::test]
async fn secret_past_the_bcrypt_limit_does_not_log_in() {
    let stored = "Aa1".repeat(24);
    let (app, _) = spawn_service_with(jwt_settings(), &stored);

    assert!(app.service.login("a@b.com", &stored).await.is_ok());

    let longer = stored.clone() + "XXXX";
    assert!(matches!(
        app.service.login("a@b.com", &longer).await,
        Err(AppError::Auth(AuthError::InvalidCredentials))
    ));
}

#[tokio::test]
async fn longest_allowed_refresh_window_still_issues_tokens() {
    let mut settings = jwt_settings();
    settings.refresh_token_expire_minutes = MAX_TOKEN_EXPIRE_MINUTES;
    let (app, user_id) = spawn_service_with(settings, "correct");

    assert!(app.service.login("a@b.com", "correct").await.is_ok());
    assert_eq!(app.tokens.live_count(user_id), 1);
}
