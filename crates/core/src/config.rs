//! Runtime configuration for the reconciliation layer.
//!
//! Values come from `ROLLCALL_*` environment variables; anything unset or blank falls
//! back to the defaults below.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Field names treated as creation/update timestamps by the grouping index.
pub const DEFAULT_DATE_FIELDS: [&str; 4] = ["createdAt", "updatedAt", "created_at", "updated_at"];

/// Maximum number of queued mutations replayed per drain.
pub const DEFAULT_DRAIN_BATCH_SIZE: i64 = 200;

/// Default timeout for query and mutation requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// File name of the local queue database inside the data directory.
pub const DEFAULT_DATABASE_FILE: &str = "rollcall.db";

const ENV_API_URL: &str = "ROLLCALL_API_URL";
const ENV_DB_DIR: &str = "ROLLCALL_DB_DIR";
const ENV_DRAIN_BATCH_SIZE: &str = "ROLLCALL_DRAIN_BATCH_SIZE";
const ENV_BUCKET_OFFSET: &str = "ROLLCALL_BUCKET_UTC_OFFSET_MINUTES";
const ENV_DATE_FIELDS: &str = "ROLLCALL_DATE_FIELDS";
const ENV_REQUEST_TIMEOUT: &str = "ROLLCALL_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RollcallConfig {
    /// Base URL of the REST backend; `None` disables the bundled HTTP adapter.
    pub api_base_url: Option<String>,
    /// Directory holding the local queue database.
    pub data_dir: String,
    pub drain_batch_size: i64,
    /// Offset in minutes east of UTC used to decide calendar-day buckets.
    pub bucket_utc_offset_minutes: i32,
    pub date_fields: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for RollcallConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            data_dir: ".".to_string(),
            drain_batch_size: DEFAULT_DRAIN_BATCH_SIZE,
            bucket_utc_offset_minutes: 0,
            date_fields: DEFAULT_DATE_FIELDS.iter().map(|f| f.to_string()).collect(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| Error::config(format!("{} has an invalid value '{}'", name, raw)))
}

impl RollcallConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_value)
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            config.api_base_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Some(dir) = lookup(ENV_DB_DIR) {
            config.data_dir = dir;
        }
        if let Some(raw) = lookup(ENV_DRAIN_BATCH_SIZE) {
            let size: i64 = parse_env(ENV_DRAIN_BATCH_SIZE, &raw)?;
            if size < 1 {
                return Err(Error::config(format!(
                    "{} must be at least 1, got {}",
                    ENV_DRAIN_BATCH_SIZE, size
                )));
            }
            config.drain_batch_size = size;
        }
        if let Some(raw) = lookup(ENV_BUCKET_OFFSET) {
            let minutes: i32 = parse_env(ENV_BUCKET_OFFSET, &raw)?;
            if FixedOffset::east_opt(minutes.saturating_mul(60)).is_none() {
                return Err(Error::config(format!(
                    "{} is out of range: {}",
                    ENV_BUCKET_OFFSET, minutes
                )));
            }
            config.bucket_utc_offset_minutes = minutes;
        }
        if let Some(raw) = lookup(ENV_DATE_FIELDS) {
            let fields = raw
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>();
            if !fields.is_empty() {
                config.date_fields = fields;
            }
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            config.request_timeout_secs = parse_env(ENV_REQUEST_TIMEOUT, &raw)?;
        }

        Ok(config)
    }

    /// Offset used for calendar-day bucketing; out-of-range values fall back to UTC.
    pub fn day_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.bucket_utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn database_path(&self) -> String {
        std::path::Path::new(&self.data_dir)
            .join(DEFAULT_DATABASE_FILE)
            .to_string_lossy()
            .to_string()
    }
}
