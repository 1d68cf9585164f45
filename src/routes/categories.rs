/// Category Routes
///
/// Any active user can browse categories; only admins can change them.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use sqlx::PgPool;

use crate::auth::Claims;
use crate::error::{AppError, ErrorContext};
use crate::models::Category;
use crate::routes::{conflict_as, current_user, require_admin, Pagination};
use crate::validators::{is_valid_label, page_bounds};

const DUPLICATE_CATEGORY: &str = "Category with this name already exists.";

#[derive(Deserialize)]
pub struct CategoryRequest {
    pub name: String,
}

/// POST /categories
///
/// # Errors
/// - 403: Caller is not an admin
/// - 409: Name already taken
pub async fn create_category(
    claims: web::ReqData<Claims>,
    form: web::Json<CategoryRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    require_admin(&user)?;
    let context = ErrorContext::new("category_create").with_user_id(user.id);

    let name = is_valid_label("name", &form.name)?;

    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name) VALUES ($1) RETURNING id, name",
    )
    .bind(&name)
    .fetch_one(pool.get_ref())
    .await
    .map_err(conflict_as(DUPLICATE_CATEGORY))?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = ?context.user_id,
        category_id = category.id,
        "Category created"
    );

    Ok(HttpResponse::Created().json(category))
}

/// GET /categories/{id}
pub async fn read_category(
    claims: web::ReqData<Claims>,
    path: web::Path<i32>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    current_user(&pool, &claims).await?;
    let category = find_category(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(category))
}

/// GET /categories?skip=&limit=
pub async fn list_categories(
    claims: web::ReqData<Claims>,
    query: web::Query<Pagination>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    current_user(&pool, &claims).await?;
    let (skip, limit) = page_bounds(query.skip, query.limit)?;

    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, name FROM categories ORDER BY id OFFSET $1 LIMIT $2",
    )
    .bind(skip)
    .bind(limit)
    .fetch_all(pool.get_ref())
    .await?;

    if categories.is_empty() {
        return Err(AppError::not_found("No categories found"));
    }

    Ok(HttpResponse::Ok().json(categories))
}

/// PUT /categories/{id}
pub async fn update_category(
    claims: web::ReqData<Claims>,
    path: web::Path<i32>,
    form: web::Json<CategoryRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    require_admin(&user)?;
    let context = ErrorContext::new("category_update").with_user_id(user.id);

    let name = is_valid_label("name", &form.name)?;

    let category = sqlx::query_as::<_, Category>(
        "UPDATE categories SET name = $1 WHERE id = $2 RETURNING id, name",
    )
    .bind(&name)
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await
    .map_err(conflict_as(DUPLICATE_CATEGORY))?
    .ok_or_else(|| AppError::not_found("Category not found"))?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = ?context.user_id,
        category_id = category.id,
        "Category updated"
    );

    Ok(HttpResponse::Ok().json(category))
}

/// DELETE /categories/{id}
///
/// Items keep existing; they just lose this category.
pub async fn delete_category(
    claims: web::ReqData<Claims>,
    path: web::Path<i32>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    require_admin(&user)?;
    let context = ErrorContext::new("category_delete").with_user_id(user.id);

    let category = find_category(pool.get_ref(), path.into_inner()).await?;

    let mut transaction = pool.begin().await?;
    sqlx::query("DELETE FROM category_item_association WHERE category_id = $1")
        .bind(category.id)
        .execute(&mut transaction)
        .await?;
    sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(category.id)
        .execute(&mut transaction)
        .await?;
    transaction.commit().await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = ?context.user_id,
        category_id = category.id,
        "Category deleted"
    );

    Ok(HttpResponse::Ok().json(category))
}

async fn find_category(pool: &PgPool, category_id: i32) -> Result<Category, AppError> {
    sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = $1")
        .bind(category_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Category not found"))
}
