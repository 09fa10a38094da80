use std::{env, sync::Arc};

use color_eyre::eyre::{eyre, WrapErr};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    image_host::{CloudinaryClient, CloudinaryConfig, ImageHost},
    token::TokenConfig,
};

/// HTTP-level settings that are not secrets
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub allowed_origin: String,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> color_eyre::Result<Self> {
        Ok(Self {
            port: parse_var("PORT", 5000)?,
            allowed_origin: env::var("ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            allowed_origin: "http://localhost:5173".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> color_eyre::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .wrap_err_with(|| format!("Invalid value for {name}: {value}")),
        Err(_) => Ok(default),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub tokens: TokenConfig,
    pub image_host: Arc<dyn ImageHost>,
    pub config: ServerConfig,
    /// Mark cookies `Secure`; on when served over https
    pub secure_cookies: bool,
}

impl AppState {
    pub async fn from_env() -> color_eyre::Result<Self> {
        let pool = setup_db_pool().await?;

        let tokens = TokenConfig::from_env()?;
        let image_host = CloudinaryClient::new(CloudinaryConfig::from_env()?)?;
        let config = ServerConfig::from_env()?;
        let secure_cookies = env::var("PROTO").ok() == Some("https".to_owned());

        tracing::info!(
            port = config.port,
            allowed_origin = %config.allowed_origin,
            secure_cookies,
            "Loaded configuration"
        );

        Ok(Self::new(
            pool,
            tokens,
            Arc::new(image_host),
            config,
            secure_cookies,
        ))
    }

    pub fn new(
        db: PgPool,
        tokens: TokenConfig,
        image_host: Arc<dyn ImageHost>,
        config: ServerConfig,
        secure_cookies: bool,
    ) -> Self {
        Self {
            db,
            tokens,
            image_host,
            config,
            secure_cookies,
        }
    }

    pub fn version(&self) -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }
}

#[tracing::instrument(err)]
pub async fn setup_db_pool() -> color_eyre::Result<PgPool> {
    const MIGRATION_LOCK_ID: i64 = 0xDB_DB_DB_DB_DB_DB_DB;

    let database_url =
        env::var("DATABASE_URL").map_err(|_| eyre!("DATABASE_URL must be set"))?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(&pool)
        .await?;

    sqlx::migrate!("../migrations").run(&pool).await?;

    let unlocked: Option<bool> = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_ID)
        .fetch_one(&pool)
        .await?;

    match unlocked {
        Some(true) => tracing::info!("Migration lock unlocked"),
        Some(false) => tracing::info!("Failed to unlock migration lock"),
        None => return Err(eyre!("Failed to unlock migration lock")),
    }

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_defaults_when_unset() {
        env::remove_var("PINBOARD_TEST_UNSET_PORT");
        let port: u16 = parse_var("PINBOARD_TEST_UNSET_PORT", 5000).unwrap();
        assert_eq!(port, 5000);
    }

    #[test]
    fn test_parse_var_reads_value() {
        env::set_var("PINBOARD_TEST_SET_PORT", "8080");
        let port: u16 = parse_var("PINBOARD_TEST_SET_PORT", 5000).unwrap();
        assert_eq!(port, 8080);
        env::remove_var("PINBOARD_TEST_SET_PORT");
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("PINBOARD_TEST_BAD_PORT", "eighty");
        let result: color_eyre::Result<u16> = parse_var("PINBOARD_TEST_BAD_PORT", 5000);
        assert!(result.is_err());
        env::remove_var("PINBOARD_TEST_BAD_PORT");
    }
}
