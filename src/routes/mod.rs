mod auth;
mod categories;
mod health_check;
mod items;
mod users;

pub use auth::{login, logout, refresh};
pub use categories::{
    create_category, delete_category, list_categories, read_category, update_category,
};
pub use health_check::{heartbeat, root};
pub use items::{create_item, delete_item, list_items, read_item, update_item};
pub use users::{change_password, deactivate_me, list_users, me, signup, update_me};

use serde::Deserialize;
use sqlx::PgPool;

use crate::auth::Claims;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::models::User;

/// `?skip=&limit=` query parameters
#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Load the user behind an access token. A vanished user is treated like a
/// bad token; a deactivated one is forbidden.
pub(crate) async fn current_user(pool: &PgPool, claims: &Claims) -> Result<User, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password_hash, is_active, role, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AuthError::Unauthorized)?;

    if !user.is_active {
        tracing::warn!(user_id = %user.id, "Inactive user attempted access");
        return Err(AuthError::AccountInactive.into());
    }

    Ok(user)
}

pub(crate) fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        tracing::warn!(user_id = %user.id, "Admin-only action attempted without permissions");
        Err(AuthError::Forbidden.into())
    }
}

/// Turns a unique-constraint violation into a 409 with a resource-specific message
pub(crate) fn conflict_as(message: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| match AppError::from(e) {
        AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
            AppError::conflict(message)
        }
        other => other,
    }
}
