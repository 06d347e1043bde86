//! # Configuration Module
//!
//! This module handles loading and validation of environment variables
//! for the wallet pool backend.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default | Required |
//! |----------|-------------|---------|----------|
//! | `DATABASE_URL` | PostgreSQL connection string | - | Yes |
//! | `HOST` | Server bind address | `0.0.0.0` | No |
//! | `PORT` | Server port | `3000` | No |
//! | `MAX_DB_CONNECTIONS` | Database connection pool size | `50` | No |
//! | `RESERVATION_TTL_SECONDS` | How long a wallet stays reserved for an unpaid order | `1800` | No |
//! | `HASH_REVIEW_TTL_SECONDS` | Deadline granted once a payment hash is submitted | `86400` | No |
//! | `SWEEP_INTERVAL_SECONDS` | Expiry sweeper interval | `15` | No |
//! | `RESERVE_MAX_RETRIES` | Attempts when a reservation loses a race | `5` | No |
//! | `MONITORING_INTERVAL_SECONDS` | Pool monitor interval | `60` | No |
//! | `RESOLVED_RETENTION_SECONDS` | How long resolved tokens are remembered | `86400` | No |
//! | `ORDER_RATE_LIMIT_PER_MINUTE` | Orders a single user may create per minute | `10` | No |
//! | `PERSIST_MAX_ATTEMPTS` | Write attempts before a persistence op is requeued | `5` | No |
//! | `RETRY_AFTER_SECONDS` | Hint returned when the pool is exhausted | `10` | No |

use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind the HTTP server to
    pub host: String,
    /// Port number for the HTTP server
    pub port: u16,
    /// PostgreSQL database connection URL
    pub database_url: String,
    /// Maximum number of database connections in the pool
    pub max_db_connections: u32,
    pub reservation_ttl_seconds: u64,
    pub hash_review_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub reserve_max_retries: u32,
    /// Interval between monitoring checks in seconds
    pub monitoring_interval_seconds: u64,
    pub resolved_retention_seconds: u64,
    pub order_rate_limit_per_minute: u32,
    pub persist_max_attempts: u32,
    pub retry_after_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Fails if `DATABASE_URL` is missing or any numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL"))?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let config = Config {
            host,
            port,
            database_url,
            max_db_connections: env_number("MAX_DB_CONNECTIONS", 50)?,
            reservation_ttl_seconds: env_number("RESERVATION_TTL_SECONDS", 1800)?,
            hash_review_ttl_seconds: env_number("HASH_REVIEW_TTL_SECONDS", 86_400)?,
            sweep_interval_seconds: env_number("SWEEP_INTERVAL_SECONDS", 15)?,
            reserve_max_retries: env_number("RESERVE_MAX_RETRIES", 5)?,
            monitoring_interval_seconds: env_number("MONITORING_INTERVAL_SECONDS", 60)?,
            resolved_retention_seconds: env_number("RESOLVED_RETENTION_SECONDS", 86_400)?,
            order_rate_limit_per_minute: env_number("ORDER_RATE_LIMIT_PER_MINUTE", 10)?,
            persist_max_attempts: env_number("PERSIST_MAX_ATTEMPTS", 5)?,
            retry_after_seconds: env_number("RETRY_AFTER_SECONDS", 10)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reservation_ttl_seconds == 0 {
            return Err(ConfigError::MustBePositive("RESERVATION_TTL_SECONDS"));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(ConfigError::MustBePositive("SWEEP_INTERVAL_SECONDS"));
        }
        if self.monitoring_interval_seconds == 0 {
            return Err(ConfigError::MustBePositive("MONITORING_INTERVAL_SECONDS"));
        }
        if self.order_rate_limit_per_minute == 0 {
            return Err(ConfigError::MustBePositive("ORDER_RATE_LIMIT_PER_MINUTE"));
        }
        if self.persist_max_attempts == 0 {
            return Err(ConfigError::MustBePositive("PERSIST_MAX_ATTEMPTS"));
        }
        Ok(())
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_seconds)
    }

    pub fn resolved_retention(&self) -> Duration {
        Duration::from_secs(self.resolved_retention_seconds)
    }

    /// Defaults without touching the environment; used by tests.
    pub fn for_tests() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "postgres://localhost/wallet_pool_test".to_string(),
            max_db_connections: 1,
            reservation_ttl_seconds: 1800,
            hash_review_ttl_seconds: 86_400,
            sweep_interval_seconds: 15,
            reserve_max_retries: 5,
            monitoring_interval_seconds: 60,
            resolved_retention_seconds: 86_400,
            order_rate_limit_per_minute: 10,
            persist_max_attempts: 5,
            retry_after_seconds: 10,
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors that can occur during loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// The port number is not valid
    #[error("Invalid port number")]
    InvalidPort,

    /// A numeric environment variable has an invalid value
    #[error("Invalid number for {0}")]
    InvalidNumber(&'static str),

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_is_rejected() {
        let mut config = Config::for_tests();
        config.reservation_ttl_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MustBePositive("RESERVATION_TTL_SECONDS"))
        ));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::for_tests();
        assert!(config.validate().is_ok());
        assert_eq!(config.reservation_ttl(), Duration::from_secs(1800));
    }
}
