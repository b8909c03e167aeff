//! API server configuration

use std::env;

use anyhow::{bail, Result};
use inflo_shared_config::{parse_env, CommonConfig, Environment, RedisConfig};

use crate::repositories::SessionTtl;

/// Default lifetime of a session snapshot (24 hours)
const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Default lifetime of a host secret (12 hours)
const DEFAULT_SECRET_TTL_SECS: u64 = 12 * 60 * 60;

/// Default cap on token generation attempts
const DEFAULT_TOKEN_MAX_ATTEMPTS: u32 = 16;

/// API server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Server port (default: 8080)
    pub port: u16,

    /// Session snapshot TTL in seconds, refreshed on viewer connect
    pub session_ttl_secs: u64,

    /// Host secret TTL in seconds, never refreshed
    pub secret_ttl_secs: u64,

    /// Attempts at finding an unused token before giving up (0 = unbounded)
    pub token_max_attempts: u32,

    /// Progress deltas at or below this are not reported as seeks (0 = exact)
    pub seek_tolerance_secs: f64,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        let config = Self {
            common,

            port: parse_env("PORT", 8080)?,

            session_ttl_secs: parse_env("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?,

            secret_ttl_secs: parse_env("SECRET_TTL_SECS", DEFAULT_SECRET_TTL_SECS)?,

            token_max_attempts: parse_env("TOKEN_MAX_ATTEMPTS", DEFAULT_TOKEN_MAX_ATTEMPTS)?,

            seek_tolerance_secs: parse_env("SEEK_TOLERANCE_SECS", 0.0)?,

            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would break session lifecycle guarantees
    ///
    /// A secret must never outlive its session: an update arriving after the
    /// session hash expired would recreate it without an expiry.
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_secs == 0 || self.secret_ttl_secs == 0 {
            bail!("SESSION_TTL_SECS and SECRET_TTL_SECS must be positive");
        }
        if self.secret_ttl_secs > self.session_ttl_secs {
            bail!(
                "SECRET_TTL_SECS ({}) must not exceed SESSION_TTL_SECS ({})",
                self.secret_ttl_secs,
                self.session_ttl_secs
            );
        }
        if !self.seek_tolerance_secs.is_finite() || self.seek_tolerance_secs < 0.0 {
            bail!(
                "SEEK_TOLERANCE_SECS must be a non-negative number (got {})",
                self.seek_tolerance_secs
            );
        }
        Ok(())
    }

    /// Expiry windows for the session repository
    pub fn session_ttl(&self) -> SessionTtl {
        SessionTtl {
            session_secs: self.session_ttl_secs,
            secret_secs: self.secret_ttl_secs,
        }
    }

    /// Get Redis configuration
    pub fn redis(&self) -> &RedisConfig {
        &self.common.redis
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            common: CommonConfig {
                redis: RedisConfig::default(),
                environment: Environment::Development,
            },
            port: 8080,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            secret_ttl_secs: DEFAULT_SECRET_TTL_SECS,
            token_max_attempts: DEFAULT_TOKEN_MAX_ATTEMPTS,
            seek_tolerance_secs: 0.0,
            cors_allowed_origins: None,
        }
    }
}
