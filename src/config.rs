use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::{debug, error, info};

use crate::error::{ApiError, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BUCKET: &str = "travelplacesbucketjapan";
pub const DEFAULT_REGION: &str = "ap-northeast-1";
/// Ten years, in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u64 = 315_360_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores. Path-style addressing is used when set.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub s3: S3Config,
    /// Directory holding per-request dataset snapshots.
    pub data_dir: PathBuf,
    /// Keep snapshot files on disk after a request instead of deleting them.
    pub retain_snapshots: bool,
    /// `max-age` of the `Cache-Control` header; 0 disables the header.
    pub cache_max_age: u64,
    pub enable_county_regions: bool,
    pub enable_accounts: bool,
    pub users_db: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            s3: S3Config {
                bucket: DEFAULT_BUCKET.to_string(),
                region: DEFAULT_REGION.to_string(),
                endpoint: None,
            },
            data_dir: env::temp_dir().join("travelplaces"),
            retain_snapshots: false,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_county_regions: true,
            enable_accounts: false,
            users_db: PathBuf::from("users.db"),
        }
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env`, if present).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] when a variable is set to a value that does not parse.
    pub fn from_env() -> Result<Self> {
        debug!("Loading configuration from environment");
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            port: parse_var("PORT", defaults.port)?,
            s3: S3Config {
                bucket: text_var("S3_BUCKET").unwrap_or(defaults.s3.bucket),
                region: text_var("AWS_REGION").unwrap_or(defaults.s3.region),
                endpoint: text_var("S3_ENDPOINT"),
            },
            data_dir: text_var("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            retain_snapshots: flag_var("RETAIN_SNAPSHOTS", defaults.retain_snapshots)?,
            cache_max_age: parse_var("CACHE_MAX_AGE", defaults.cache_max_age)?,
            enable_county_regions: flag_var(
                "ENABLE_COUNTY_REGIONS",
                defaults.enable_county_regions,
            )?,
            enable_accounts: flag_var("ENABLE_ACCOUNTS", defaults.enable_accounts)?,
            users_db: text_var("USERS_DB").map_or(defaults.users_db, PathBuf::from),
        };

        info!("Configuration loaded successfully");
        debug!("Port: {}", config.port);
        debug!(
            "Bucket: s3://{} ({})",
            config.s3.bucket, config.s3.region
        );
        debug!("Snapshot directory: {}", config.data_dir.display());
        debug!(
            "County regions route: {}, accounts: {}",
            config.enable_county_regions, config.enable_accounts
        );

        Ok(config)
    }
}

fn text_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(raw) = text_var(key) else {
        debug!("{key} not set, using default");
        return Ok(default);
    };

    raw.parse().map_err(|e| {
        error!("Invalid {key} value '{raw}': {e}");
        ApiError::Config(format!("invalid {key} value '{raw}': {e}"))
    })
}

fn flag_var(key: &str, default: bool) -> Result<bool> {
    let Some(raw) = text_var(key) else {
        return Ok(default);
    };

    parse_flag(&raw).ok_or_else(|| {
        error!("Invalid {key} value '{raw}', expected a boolean");
        ApiError::Config(format!("invalid {key} value '{raw}', expected a boolean"))
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
