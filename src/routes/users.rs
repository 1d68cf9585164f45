/// User Routes
///
/// Signup is public. Everything else runs behind `JwtMiddleware` and works on
/// the user named by the access token.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{Claims, PgAuthService};
use crate::error::{AppError, AuthError, ErrorContext};
use crate::models::{Role, User};
use crate::routes::{conflict_as, current_user, require_admin, Pagination};
use crate::validators::{is_valid_email, is_valid_password, is_valid_user_name, page_bounds};

const DUPLICATE_EMAIL: &str = "User with this email already exists.";

#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Public view of a user. The password hash is never serialized.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            role: user.role(),
            id: user.id,
            name: user.name,
            email: user.email,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// POST /users/signup
///
/// # Errors
/// - 400: Invalid name, email or weak password
/// - 409: Email already registered
pub async fn signup(
    form: web::Json<SignupRequest>,
    pool: web::Data<PgPool>,
    auth: web::Data<PgAuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_signup");

    let name = is_valid_user_name(&form.name)?;
    let email = is_valid_email(&form.email)?;
    is_valid_password(&form.password)?;

    let password_hash = auth.hasher().hash_blocking(form.password.clone()).await?;

    let user_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, is_active, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, TRUE, $5, $6, $6)
        "#,
    )
    .bind(user_id)
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::User.as_str())
    .bind(now)
    .execute(pool.get_ref())
    .await
    .map_err(conflict_as(DUPLICATE_EMAIL))?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = %user_id,
        "User registered"
    );

    Ok(HttpResponse::Created().json(serde_json::json!({
        "detail": "User created successfully."
    })))
}

/// GET /users/me
pub async fn me(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// PATCH /users/me
///
/// Omitted fields keep their current value.
pub async fn update_me(
    claims: web::ReqData<Claims>,
    form: web::Json<UpdateMeRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    let context = ErrorContext::new("user_update").with_user_id(user.id);

    let name = match &form.name {
        Some(name) => is_valid_user_name(name)?,
        None => user.name.clone(),
    };
    let email = match &form.email {
        Some(email) => is_valid_email(email)?,
        None => user.email.clone(),
    };

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET name = $1, email = $2, updated_at = $3
        WHERE id = $4
        RETURNING id, name, email, password_hash, is_active, role, created_at, updated_at
        "#,
    )
    .bind(&name)
    .bind(&email)
    .bind(Utc::now())
    .bind(user.id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(conflict_as(DUPLICATE_EMAIL))?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = ?context.user_id,
        "User profile updated"
    );

    Ok(HttpResponse::Ok().json(UserResponse::from(updated)))
}

/// POST /users/me/password
///
/// Every refresh token of the user is revoked before the new hash is stored,
/// so other sessions end once their access token runs out.
///
/// # Errors
/// - 401: Current password does not match
/// - 400: New password too weak
pub async fn change_password(
    claims: web::ReqData<Claims>,
    form: web::Json<ChangePasswordRequest>,
    pool: web::Data<PgPool>,
    auth: web::Data<PgAuthService>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    let context = ErrorContext::new("password_change").with_user_id(user.id);

    let matches = auth
        .hasher()
        .verify_blocking(form.current_password.clone(), user.password_hash.clone())
        .await;
    if !matches {
        return Err(AuthError::InvalidCredentials.into());
    }

    is_valid_password(&form.new_password)?;
    let password_hash = auth.hasher().hash_blocking(form.new_password.clone()).await?;

    // revoke before the update so a failed revoke leaves the old password in place
    let revoked = auth.logout_everywhere(user.id).await?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
        .bind(&password_hash)
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = ?context.user_id,
        revoked_sessions = revoked,
        "Password changed"
    );

    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /users/me
///
/// Soft-disables the account. The row stays so items keep their owner.
pub async fn deactivate_me(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
    auth: web::Data<PgAuthService>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    let context = ErrorContext::new("user_deactivate").with_user_id(user.id);

    auth.logout_everywhere(user.id).await?;

    sqlx::query("UPDATE users SET is_active = FALSE, updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = ?context.user_id,
        "User deactivated"
    );

    Ok(HttpResponse::NoContent().finish())
}

/// GET /users?skip=&limit=
///
/// Admin only.
pub async fn list_users(
    claims: web::ReqData<Claims>,
    query: web::Query<Pagination>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    require_admin(&user)?;

    let (skip, limit) = page_bounds(query.skip, query.limit)?;

    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password_hash, is_active, role, created_at, updated_at
        FROM users
        ORDER BY created_at
        OFFSET $1
        LIMIT $2
        "#,
    )
    .bind(skip)
    .bind(limit)
    .fetch_all(pool.get_ref())
    .await?;

    if users.is_empty() {
        return Err(AppError::not_found("No users found"));
    }

    let body: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}
