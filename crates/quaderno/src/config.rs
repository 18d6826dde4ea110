//! Configuration loading from environment variables.

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use std::path::PathBuf;

/// Runtime settings loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub migrations_dir: PathBuf,
    /// Account used when a request carries no `x-user-id` header
    pub default_user: Option<String>,
    /// Zone in which reminder times of day are applied
    pub utc_offset: FixedOffset,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("quaderno.db"),
            migrations_dir: PathBuf::from("db/migrations"),
            default_user: None,
            utc_offset: Utc.fix(),
            bind: "127.0.0.1".to_string(),
        }
    }
}

impl Config {
    /// Load settings from environment variables.
    ///
    /// Reads `QUADERNO_DB`, `QUADERNO_MIGRATIONS`, `QUADERNO_DEFAULT_USER`,
    /// `QUADERNO_UTC_OFFSET_MINUTES` and `QUADERNO_BIND`, either from the
    /// environment or from a `.env` file. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("QUADERNO_DB") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("QUADERNO_MIGRATIONS") {
            config.migrations_dir = PathBuf::from(dir);
        }
        config.default_user = lookup("QUADERNO_DEFAULT_USER").filter(|u| !u.trim().is_empty());
        if let Some(minutes) = lookup("QUADERNO_UTC_OFFSET_MINUTES") {
            config.utc_offset = parse_offset_minutes(&minutes)?;
        }
        if let Some(bind) = lookup("QUADERNO_BIND") {
            config.bind = bind;
        }

        Ok(config)
    }
}

fn parse_offset_minutes(value: &str) -> Result<FixedOffset> {
    let minutes: i32 = value
        .trim()
        .parse()
        .with_context(|| format!("QUADERNO_UTC_OFFSET_MINUTES is not a number: {value:?}"))?;
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("QUADERNO_UTC_OFFSET_MINUTES out of range: {minutes}"))
}
