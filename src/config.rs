use std::{env, str::FromStr};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    /// Upper bound on how long checkout waits for product row locks.
    pub checkout_lock_timeout_ms: u64,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub low_stock_threshold: i32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        Ok(Self {
            database_url,
            host,
            port: parse_var("APP_PORT", 3000)?,
            jwt_secret,
            jwt_ttl_hours: parse_var("JWT_TTL_HOURS", 2)?,
            checkout_lock_timeout_ms: parse_var("CHECKOUT_LOCK_TIMEOUT_MS", 5000)?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 10)?,
            db_acquire_timeout_secs: parse_var("DB_ACQUIRE_TIMEOUT_SECS", 5)?,
            low_stock_threshold: parse_var("LOW_STOCK_THRESHOLD", 10)?,
        })
    }

    /// Defaults for everything except the connection string and signing key.
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            jwt_secret: jwt_secret.into(),
            jwt_ttl_hours: 2,
            checkout_lock_timeout_ms: 5000,
            db_max_connections: 10,
            db_acquire_timeout_secs: 5,
            low_stock_threshold: 10,
        }
    }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has invalid value {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_values() {
        let port: u16 = parse_value("APP_PORT", " 8080 ").unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn rejects_garbage_instead_of_defaulting() {
        let err = parse_value::<u64>("CHECKOUT_LOCK_TIMEOUT_MS", "soon").unwrap_err();
        assert!(err.to_string().contains("CHECKOUT_LOCK_TIMEOUT_MS"));
    }

    #[test]
    fn new_fills_defaults() {
        let config = AppConfig::new("postgres://localhost/test", "secret");
        assert_eq!(config.port, 3000);
        assert_eq!(config.checkout_lock_timeout_ms, 5000);
        assert_eq!(config.low_stock_threshold, 10);
    }
}
