//! Centralized configuration management.
//!
//! All runtime knobs come from the environment (optionally seeded from a
//! `.env` file by the binary). Defaults favor local development; the only
//! hard requirement in production is `JWT_SECRET_KEY` and `DATABASE_URL`.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context};

/// Runtime configuration for one replica.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment ("development" | "production").
    pub env: String,
    /// HTTP/WebSocket listen port.
    pub port: u16,
    /// Secret used to validate bearer tokens issued by the auth service.
    pub jwt_secret: String,
    /// Redis connection URL (L2 cache + Pub/Sub).
    pub redis_url: String,
    /// Durable store (Postgres) connection URL.
    pub database_url: String,
    /// Allowed CORS origins, comma separated; "*" allows any.
    pub cors_origins: String,
    /// Capacity of the write-behind queue.
    pub writer_queue_size: usize,
    /// WebSocket keepalive ping interval.
    pub ping_interval: Duration,
    /// Idle cutoff after which an unresponsive socket is dropped.
    pub ping_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let env_name = env::var("ENV").unwrap_or_else(|_| "development".to_string());
        let production = env_name == "production";

        let jwt_secret = match env::var("JWT_SECRET_KEY") {
            Ok(secret) => secret,
            Err(_) if production => bail!("JWT_SECRET_KEY must be set in production"),
            Err(_) => "dev-secret".to_string(),
        };

        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) if production => bail!("DATABASE_URL must be set in production"),
            Err(_) => "postgres://localhost/collab".to_string(),
        };

        Ok(Self {
            env: env_name,
            port: parse_env("PORT", 7788)?,
            jwt_secret,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            database_url,
            cors_origins: env::var("SOCKETIO_CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()),
            writer_queue_size: parse_env("WRITER_QUEUE_SIZE", 1000)?,
            ping_interval: Duration::from_secs(15),
            ping_timeout: Duration::from_secs(60),
        })
    }

}

fn parse_env<T>(var: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {var}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
