use anyhow::{Context, Result};
use std::net::SocketAddr;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://users.db?mode=rwc";
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 30 * 60;
const INSECURE_JWT_SECRET: &str = "default-jwt-secret-CHANGE-IN-PRODUCTION";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: i64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("AUTH_SERVICE_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8083".to_string())
            .parse()
            .context("invalid AUTH_SERVICE_ADDR")?;

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .unwrap_or_else(|| {
                tracing::warn!("JWT_SECRET not set, using default (INSECURE for production!)");
                INSECURE_JWT_SECRET.to_string()
            });

        let jwt_expiration_secs = match std::env::var("JWT_EXPIRATION_SECS") {
            Ok(value) => value
                .parse::<i64>()
                .ok()
                .filter(|secs| *secs > 0)
                .with_context(|| format!("invalid JWT_EXPIRATION_SECS: {value}"))?,
            Err(_) => DEFAULT_JWT_EXPIRATION_SECS,
        };

        Ok(Self {
            bind_addr,
            database_url,
            jwt_secret,
            jwt_expiration_secs,
        })
    }

    /// Configuration with defaults and the given signing secret.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8083)),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            jwt_secret: jwt_secret.into(),
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
        }
    }
}
