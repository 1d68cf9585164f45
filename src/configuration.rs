use std::str::FromStr;

use config::ConfigError;
use jsonwebtoken::Algorithm;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub cors: CorsSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// bcrypt work factor used for new password hashes
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    /// Full connection URL. When set it wins over the individual fields.
    #[serde(default)]
    pub url: Option<String>,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.database_name
            ),
        }
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT signing settings shared by the token issuer and validator
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret_key: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_access_token_expire_minutes")]
    pub access_token_expire_minutes: i64,
    #[serde(default = "default_refresh_token_expire_minutes")]
    pub refresh_token_expire_minutes: i64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

impl JwtSettings {
    /// Parse the configured algorithm. Only the HMAC family is accepted since
    /// tokens are signed with a shared secret.
    pub fn algorithm(&self) -> Result<Algorithm, crate::error::ConfigError> {
        let algorithm = Algorithm::from_str(self.algorithm.trim()).map_err(|_| {
            crate::error::ConfigError::InvalidValue(format!(
                "unknown JWT algorithm '{}'",
                self.algorithm
            ))
        })?;

        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
            other => Err(crate::error::ConfigError::InvalidValue(format!(
                "JWT algorithm {:?} needs a key pair, only HS256/HS384/HS512 are supported",
                other
            ))),
        }
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expire_minutes.saturating_mul(60)
    }

    pub fn refresh_token_expiry_seconds(&self) -> i64 {
        self.refresh_token_expire_minutes.saturating_mul(60)
    }

    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(crate::error::ConfigError::MissingRequired(
                "JWT_SECRET_KEY".to_string(),
            ));
        }
        if self.secret_key.len() < 32 {
            tracing::warn!("JWT secret key is shorter than 32 bytes");
        }
        check_window(
            "JWT_ACCESS_TOKEN_EXPIRE_MINUTES",
            self.access_token_expire_minutes,
        )?;
        check_window(
            "JWT_REFRESH_TOKEN_EXPIRE_MINUTES",
            self.refresh_token_expire_minutes,
        )?;
        self.algorithm()?;
        Ok(())
    }
}

/// Upper bound for token windows: ten years
pub const MAX_TOKEN_EXPIRE_MINUTES: i64 = 60 * 24 * 366 * 10;

fn check_window(name: &str, minutes: i64) -> Result<(), crate::error::ConfigError> {
    if minutes <= 0 {
        return Err(crate::error::ConfigError::InvalidValue(format!(
            "{} must be positive",
            name
        )));
    }
    if minutes > MAX_TOKEN_EXPIRE_MINUTES {
        return Err(crate::error::ConfigError::InvalidValue(format!(
            "{} must be at most {} (ten years)",
            name, MAX_TOKEN_EXPIRE_MINUTES
        )));
    }
    Ok(())
}

#[derive(serde::Deserialize, Clone, Default)]
pub struct CorsSettings {
    /// Origin of the browser frontend allowed to call the API
    #[serde(default)]
    pub frontend_url: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_password_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_access_token_expire_minutes() -> i64 {
    30
}

fn default_refresh_token_expire_minutes() -> i64 {
    60 * 24 * 7
}

fn default_issuer() -> String {
    "crudauth".to_string()
}

/// Load settings from `configuration.yaml` (optional), `APP_*` variables and
/// the flat `JWT_*` / `DATABASE_URL` / `FRONTEND_URL` variables.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let env = |key: &str| std::env::var(key).ok();

    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("jwt.secret_key", env("JWT_SECRET_KEY"))?
        .set_override_option("jwt.algorithm", env("JWT_ALGORITHM"))?
        .set_override_option(
            "jwt.access_token_expire_minutes",
            env("JWT_ACCESS_TOKEN_EXPIRE_MINUTES"),
        )?
        .set_override_option(
            "jwt.refresh_token_expire_minutes",
            env("JWT_REFRESH_TOKEN_EXPIRE_MINUTES"),
        )?
        .set_override_option("jwt.issuer", env("JWT_ISSUER"))?
        .set_override_option("database.url", env("DATABASE_URL"))?
        .set_override_option("cors.frontend_url", env("FRONTEND_URL"))?
        .build()?;

    let settings = settings.try_deserialize::<Settings>()?;
    settings
        .jwt
        .validate()
        .map_err(|e| ConfigError::Message(e.to_string()))?;
    Ok(settings)
}
