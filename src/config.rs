// File: ./src/config.rs
// Handles configuration loading, saving, and defaults.
use crate::context::AppContext;
use crate::model::item::DEFAULT_DEADLINE_OFFSET_DAYS;
use crate::model::parser::{ParseOptions, parse_tzid};
use crate::model::projector::{
    DEFAULT_HORIZON_DAYS, DISPLAY_HOUR, ProjectOptions, TimezonePolicy,
};
use crate::model::recurrence::ResolveOptions;
use crate::storage::LocalStorage;
use anyhow::{Error, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;

// Ten years; anything longer is effectively "never expire".
const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 3600;
pub const MAX_HORIZON_DAYS: u32 = 3660;

fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_offset_days() -> u32 {
    DEFAULT_DEADLINE_OFFSET_DAYS
}
fn default_display_hour() -> u32 {
    DISPLAY_HOUR
}
fn default_horizon_days() -> u32 {
    DEFAULT_HORIZON_DAYS
}
fn default_cache_ttl_secs() -> u64 {
    900
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_count() -> usize {
    4
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// IANA zone for timestamps that carry neither TZID nor `Z`.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default = "default_offset_days")]
    pub default_offset_days: u32,
    #[serde(default = "default_display_hour")]
    pub display_hour: u32,
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub timezone_policy: TimezonePolicy,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_count")]
    pub default_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            default_offset_days: DEFAULT_DEADLINE_OFFSET_DAYS,
            display_hour: DISPLAY_HOUR,
            horizon_days: DEFAULT_HORIZON_DAYS,
            cache_ttl_secs: 900,
            timezone_policy: TimezonePolicy::Strict,
            log_level: default_log_level(),
            default_count: 4,
        }
    }
}

impl Config {
    /// Load the configuration from disk using an explicit context.
    /// Returns a contextualized error if reading or parsing fails.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_config_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(config) => Ok(config),
            Err(e) if Self::is_missing_config_error(&e) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Detects the "missing config" case, either by our explicit message or by an
    /// io NotFound anywhere in the error chain.
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    pub fn validate(&self) -> Result<()> {
        if parse_tzid(&self.default_timezone).is_none() {
            return Err(anyhow::anyhow!(
                "Unknown default_timezone '{}'",
                self.default_timezone
            ));
        }
        if self.display_hour > 23 {
            return Err(anyhow::anyhow!(
                "display_hour must be between 0 and 23, got {}",
                self.display_hour
            ));
        }
        if self.horizon_days == 0 || self.horizon_days > MAX_HORIZON_DAYS {
            return Err(anyhow::anyhow!(
                "horizon_days must be between 1 and {}, got {}",
                MAX_HORIZON_DAYS,
                self.horizon_days
            ));
        }
        Ok(())
    }

    /// Save configuration using an explicit context.
    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_config_file_path()?;
        LocalStorage::with_lock(&path, || {
            let toml_str = toml::to_string_pretty(self)?;
            LocalStorage::atomic_write(&path, toml_str)?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn timezone(&self) -> Tz {
        parse_tzid(&self.default_timezone).unwrap_or(Tz::UTC)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Warn)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs.min(MAX_CACHE_TTL_SECS) as i64)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            default_tz: self.timezone(),
        }
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            default_offset_days: self.default_offset_days,
        }
    }

    pub fn project_options(&self) -> ProjectOptions {
        ProjectOptions {
            display_hour: self.display_hour,
            horizon_days: self.horizon_days,
            timezone_policy: self.timezone_policy,
        }
    }
}
