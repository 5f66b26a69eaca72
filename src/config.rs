//! Configuration loader for the `climate-warehouse` backend service.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). By consolidating configuration logic
//! here, we avoid scattering `env::var` calls throughout the codebase.

use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional float environment variable with a default value.
macro_rules! parse_env_f64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

const DEFAULT_POWER_URL: &str = "https://power.larc.nasa.gov/api/temporal/hourly/point";

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// NASA POWER hourly point endpoint base URL.
    pub power_api_url: String,

    /// Default site identifier for ingest and query endpoints.
    pub site_name: String,

    /// Default site coordinates for ingest requests.
    pub site_lat: f64,
    pub site_lon: f64,

    /// Number of days per provider request window.
    pub chunk_days: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `POWER_API_URL` – provider base URL (default: NASA POWER hourly point)
/// - `SITE_NAME` – default site identifier (default: `chicago_il`)
/// - `SITE_LAT` / `SITE_LON` – default coordinates (default: Chicago)
/// - `CHUNK_DAYS` – days per provider request (default: 7)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let power_api_url = env::var("POWER_API_URL").unwrap_or_else(|_| DEFAULT_POWER_URL.to_string());
    let site_name = env::var("SITE_NAME").unwrap_or_else(|_| "chicago_il".to_string());
    let site_lat = parse_env_f64!("SITE_LAT", 41.8781);
    let site_lon = parse_env_f64!("SITE_LON", -87.6298);
    let chunk_days = parse_env_u32!("CHUNK_DAYS", 7);

    Ok(Config {
        db_url,
        db_pool_max,
        power_api_url,
        site_name,
        site_lat,
        site_lon,
        chunk_days,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        // Mask the password in the database URL for security
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL  : {}", masked_db_url);
        tracing::info!("  POWER_API_URL : {}", self.power_api_url);
        tracing::info!("  DB_POOL_MAX   : {}", self.db_pool_max);
        tracing::info!("  SITE_NAME     : {}", self.site_name);
        tracing::info!("  SITE_LAT/LON  : {}, {}", self.site_lat, self.site_lon);
        tracing::info!("  CHUNK_DAYS    : {}", self.chunk_days);
    }
}
