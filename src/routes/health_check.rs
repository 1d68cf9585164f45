use actix_web::{web, HttpResponse};
use sqlx::PgPool;

pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Visit /docs for server documentation"
    }))
}

/// Reports whether the database answers a trivial query
pub async fn heartbeat(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Database connection is healthy."
        })),
        Err(e) => {
            tracing::error!(error = %e, "Heartbeat database check failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "message": "Database connection error"
            }))
        }
    }
}
