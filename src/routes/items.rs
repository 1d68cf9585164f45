/// Item Routes
///
/// Items belong to the user who created them. Only the owner can read,
/// change or delete an item; other users get a 404 so item ids don't leak.
/// Admins additionally see every item in the list view.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::{AppError, ErrorContext};
use crate::models::{Category, ItemRow};
use crate::routes::{current_user, Pagination};
use crate::validators::{is_valid_label, page_bounds};

#[derive(Deserialize)]
pub struct ItemRequest {
    pub name: String,
    #[serde(default)]
    pub category_ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id: i32,
    pub name: String,
    pub user_id: Uuid,
    pub categories: Vec<Category>,
}

/// POST /items
///
/// # Errors
/// - 404: One or more category ids do not exist
pub async fn create_item(
    claims: web::ReqData<Claims>,
    form: web::Json<ItemRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    let context = ErrorContext::new("item_create").with_user_id(user.id);

    let name = is_valid_label("name", &form.name)?;
    let category_ids = dedup(&form.category_ids);

    let mut transaction = pool.begin().await?;
    let categories = load_categories(&mut transaction, &category_ids).await?;

    let item = sqlx::query_as::<_, ItemRow>(
        "INSERT INTO items (user_id, name) VALUES ($1, $2) RETURNING id, user_id, name",
    )
    .bind(user.id)
    .bind(&name)
    .fetch_one(&mut transaction)
    .await?;

    link_categories(&mut transaction, item.id, &category_ids).await?;
    transaction.commit().await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = ?context.user_id,
        item_id = item.id,
        "Item created"
    );

    Ok(HttpResponse::Created().json(ItemResponse {
        id: item.id,
        name: item.name,
        user_id: item.user_id,
        categories,
    }))
}

/// GET /items/{id}
pub async fn read_item(
    claims: web::ReqData<Claims>,
    path: web::Path<i32>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    let item = owned_item(pool.get_ref(), path.into_inner(), user.id).await?;
    let categories = categories_of(pool.get_ref(), item.id).await?;

    Ok(HttpResponse::Ok().json(ItemResponse {
        id: item.id,
        name: item.name,
        user_id: item.user_id,
        categories,
    }))
}

/// GET /items?skip=&limit=
pub async fn list_items(
    claims: web::ReqData<Claims>,
    query: web::Query<Pagination>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    let (skip, limit) = page_bounds(query.skip, query.limit)?;

    // NULL owner filter means "all items"
    let owner = if user.is_admin() { None } else { Some(user.id) };

    let items = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT id, user_id, name
        FROM items
        WHERE $1::uuid IS NULL OR user_id = $1
        ORDER BY id
        OFFSET $2
        LIMIT $3
        "#,
    )
    .bind(owner)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool.get_ref())
    .await?;

    if items.is_empty() {
        return Err(AppError::not_found("No items found"));
    }

    let mut body = Vec::with_capacity(items.len());
    for item in items {
        let categories = categories_of(pool.get_ref(), item.id).await?;
        body.push(ItemResponse {
            id: item.id,
            name: item.name,
            user_id: item.user_id,
            categories,
        });
    }

    Ok(HttpResponse::Ok().json(body))
}

/// PUT /items/{id}
///
/// Replaces the name and the whole category set.
pub async fn update_item(
    claims: web::ReqData<Claims>,
    path: web::Path<i32>,
    form: web::Json<ItemRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    let context = ErrorContext::new("item_update").with_user_id(user.id);

    let item = owned_item(pool.get_ref(), path.into_inner(), user.id).await?;
    let name = is_valid_label("name", &form.name)?;
    let category_ids = dedup(&form.category_ids);

    let mut transaction = pool.begin().await?;
    let categories = load_categories(&mut transaction, &category_ids).await?;

    let item = sqlx::query_as::<_, ItemRow>(
        "UPDATE items SET name = $1 WHERE id = $2 RETURNING id, user_id, name",
    )
    .bind(&name)
    .bind(item.id)
    .fetch_one(&mut transaction)
    .await?;

    sqlx::query("DELETE FROM category_item_association WHERE item_id = $1")
        .bind(item.id)
        .execute(&mut transaction)
        .await?;
    link_categories(&mut transaction, item.id, &category_ids).await?;
    transaction.commit().await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = ?context.user_id,
        item_id = item.id,
        "Item updated"
    );

    Ok(HttpResponse::Ok().json(ItemResponse {
        id: item.id,
        name: item.name,
        user_id: item.user_id,
        categories,
    }))
}

/// DELETE /items/{id}
pub async fn delete_item(
    claims: web::ReqData<Claims>,
    path: web::Path<i32>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&pool, &claims).await?;
    let context = ErrorContext::new("item_delete").with_user_id(user.id);

    let item = owned_item(pool.get_ref(), path.into_inner(), user.id).await?;

    let mut transaction = pool.begin().await?;
    sqlx::query("DELETE FROM category_item_association WHERE item_id = $1")
        .bind(item.id)
        .execute(&mut transaction)
        .await?;
    sqlx::query("DELETE FROM items WHERE id = $1")
        .bind(item.id)
        .execute(&mut transaction)
        .await?;
    transaction.commit().await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = ?context.user_id,
        item_id = item.id,
        "Item deleted"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": item.id })))
}

/// Looks up an item owned by `user_id`. Someone else's item is reported as missing.
async fn owned_item(pool: &PgPool, item_id: i32, user_id: Uuid) -> Result<ItemRow, AppError> {
    sqlx::query_as::<_, ItemRow>(
        "SELECT id, user_id, name FROM items WHERE id = $1 AND user_id = $2",
    )
    .bind(item_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Item not found"))
}

async fn categories_of(pool: &PgPool, item_id: i32) -> Result<Vec<Category>, AppError> {
    let categories = sqlx::query_as::<_, Category>(
        r#"
        SELECT c.id, c.name
        FROM categories c
        JOIN category_item_association a ON a.category_id = c.id
        WHERE a.item_id = $1
        ORDER BY c.id
        "#,
    )
    .bind(item_id)
    .fetch_all(pool)
    .await?;

    Ok(categories)
}

/// Fetches the requested categories, failing if any id is unknown
async fn load_categories(
    transaction: &mut Transaction<'_, Postgres>,
    ids: &[i32],
) -> Result<Vec<Category>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, name FROM categories WHERE id = ANY($1) ORDER BY id",
    )
    .bind(ids)
    .fetch_all(&mut *transaction)
    .await?;

    if categories.len() != ids.len() {
        return Err(AppError::not_found("One or more categories not found"));
    }

    Ok(categories)
}

async fn link_categories(
    transaction: &mut Transaction<'_, Postgres>,
    item_id: i32,
    category_ids: &[i32],
) -> Result<(), AppError> {
    for category_id in category_ids {
        sqlx::query(
            "INSERT INTO category_item_association (item_id, category_id) VALUES ($1, $2)",
        )
        .bind(item_id)
        .bind(category_id)
        .execute(&mut *transaction)
        .await?;
    }

    Ok(())
}

fn dedup(ids: &[i32]) -> Vec<i32> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_category_ids_collapse() {
        assert_eq!(dedup(&[3, 1, 3, 2, 1]), vec![1, 2, 3]);
        assert!(dedup(&[]).is_empty());
    }

    #[test]
    fn category_ids_default_to_empty() {
        let form: ItemRequest = serde_json::from_str(r#"{"name":"lamp"}"#).unwrap();
        assert!(form.category_ids.is_empty());
    }
}
