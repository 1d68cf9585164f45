use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;

use crate::auth::{AuthService, PasswordHasher, PgAuthService, PgCredentialStore, PgRefreshTokenStore};
use crate::configuration::{CorsSettings, Settings};
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    change_password, create_category, create_item, deactivate_me, delete_category, delete_item,
    heartbeat, list_categories, list_items, list_users, login, logout, me, read_category,
    read_item, refresh, root, signup, update_category, update_item, update_me,
};

/// Wires the Postgres-backed stores into an `AuthService`
pub fn build_auth_service(pool: &PgPool, settings: &Settings) -> Result<PgAuthService, AppError> {
    AuthService::new(
        PgCredentialStore::new(pool.clone()),
        PgRefreshTokenStore::new(pool.clone()),
        &settings.jwt,
        PasswordHasher::new(settings.application.password_hash_cost),
    )
}

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    auth_service: PgAuthService,
    cors_settings: CorsSettings,
) -> Result<Server, std::io::Error> {
    let validator = auth_service.validator().clone();
    let connection = web::Data::new(connection);
    let auth_service = web::Data::new(auth_service);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())      // Standard logging
            .wrap(LoggerMiddleware)       // Custom logging
            .wrap(cors(&cors_settings))

            // Shared state
            .app_data(connection.clone())
            .app_data(auth_service.clone())

            // Public routes (no authentication required)
            .route("/", web::get().to(root))
            .route("/heartbeat", web::get().to(heartbeat))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .route("/logout", web::post().to(logout))
            // must come before the guarded /users scope
            .route("/users/signup", web::post().to(signup))

            // Protected routes (require a bearer access token)
            .service(
                web::scope("/users")
                    .wrap(JwtMiddleware::new(validator.clone()))
                    .route("", web::get().to(list_users))
                    .route("/me", web::get().to(me))
                    .route("/me", web::patch().to(update_me))
                    .route("/me", web::delete().to(deactivate_me))
                    .route("/me/password", web::post().to(change_password)),
            )
            .service(
                web::scope("/items")
                    .wrap(JwtMiddleware::new(validator.clone()))
                    .route("", web::post().to(create_item))
                    .route("", web::get().to(list_items))
                    .route("/{id}", web::get().to(read_item))
                    .route("/{id}", web::put().to(update_item))
                    .route("/{id}", web::delete().to(delete_item)),
            )
            .service(
                web::scope("/categories")
                    .wrap(JwtMiddleware::new(validator.clone()))
                    .route("", web::post().to(create_category))
                    .route("", web::get().to(list_categories))
                    .route("/{id}", web::get().to(read_category))
                    .route("/{id}", web::put().to(update_category))
                    .route("/{id}", web::delete().to(delete_category)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Only the configured frontend origin may call the API from a browser.
/// Without one, cross-origin requests are refused.
fn cors(settings: &CorsSettings) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(3600);

    match settings.frontend_url.as_deref() {
        Some(origin) => cors.allowed_origin(origin.trim_end_matches('/')),
        None => cors,
    }
}
