/// Authentication Routes
///
/// Login, token refresh and logout. All three are public; the refresh token
/// in the body is the credential.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::PgAuthService;
use crate::error::AppError;

/// Login request. `email`/`username` and `password` are accepted as aliases.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    #[serde(alias = "password")]
    pub secret: String,
}

/// Body of refresh and logout requests
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /auth/login
///
/// # Errors
/// - 401: Invalid credentials (unknown identifier and wrong secret are indistinguishable)
/// - 403: Account is inactive
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<PgAuthService>,
) -> Result<HttpResponse, AppError> {
    let pair = auth.login(&form.identifier, &form.secret).await?;

    Ok(HttpResponse::Ok().json(pair))
}

/// POST /auth/refresh
///
/// Rotates the refresh token: the presented one is revoked and a new pair is
/// returned.
///
/// # Errors
/// - 401: Invalid, expired, revoked or reused refresh token
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<PgAuthService>,
) -> Result<HttpResponse, AppError> {
    let pair = auth.refresh(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /auth/logout
pub async fn logout(
    form: web::Json<RefreshRequest>,
    auth: web::Data<PgAuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(&form.refresh_token).await?;
    Ok(HttpResponse::NoContent().finish())
}
