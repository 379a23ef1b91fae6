use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_ORIGIN_URL: &str = "https://www.ps.kz/domains/whois/result";
pub const DEFAULT_TRANSIENT_BANNER: &str =
    "Возникли непредвиденные проблемы. Попробуйте еще раз через несколько минут.";
pub const DEFAULT_OCCUPANCY_MARKER: &str = "доступен для регистрации.";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:whois_lookups.db?mode=rwc";

/// What the presence of the occupancy marker in an origin page means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerPolarity {
    /// Marker present => the domain is free ("доступен для регистрации.").
    Available,
    /// Marker present => the domain is registered (e.g. an "about to be deleted" notice).
    Occupied,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub origin_url: String,
    pub origin_timeout_seconds: u64,
    pub max_response_size: usize,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: u64,
    pub database_url: String,
    pub database_max_connections: u32,
    pub durable_tier_enabled: bool,
    pub coalesce_lookups: bool,
    pub transient_banner: String,
    pub occupancy_marker: String,
    pub marker_polarity: MarkerPolarity,
    pub start_time: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigData {
    pub port: u16,
    pub origin_url: String,
    pub origin_timeout_seconds: u64,
    pub max_response_size: usize,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: u64,
    pub database_url: String,
    pub database_max_connections: u32,
    pub durable_tier_enabled: bool,
    pub coalesce_lookups: bool,
    pub transient_banner: String,
    pub occupancy_marker: String,
    pub marker_polarity: MarkerPolarity,
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            port: 3000,
            origin_url: DEFAULT_ORIGIN_URL.to_string(),
            origin_timeout_seconds: 15,
            max_response_size: 2 * 1024 * 1024,
            cache_ttl_seconds: 3600,
            cache_max_entries: 10_000,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: 5,
            durable_tier_enabled: true,
            coalesce_lookups: true,
            transient_banner: DEFAULT_TRANSIENT_BANNER.to_string(),
            occupancy_marker: DEFAULT_OCCUPANCY_MARKER.to_string(),
            marker_polarity: MarkerPolarity::Available,
        }
    }
}

impl From<ConfigData> for Config {
    fn from(data: ConfigData) -> Self {
        Config {
            port: data.port,
            origin_url: data.origin_url,
            origin_timeout_seconds: data.origin_timeout_seconds,
            max_response_size: data.max_response_size,
            cache_ttl_seconds: data.cache_ttl_seconds,
            cache_max_entries: data.cache_max_entries,
            database_url: data.database_url,
            database_max_connections: data.database_max_connections,
            durable_tier_enabled: data.durable_tier_enabled,
            coalesce_lookups: data.coalesce_lookups,
            transient_banner: data.transient_banner,
            occupancy_marker: data.occupancy_marker,
            marker_polarity: data.marker_polarity,
            start_time: Instant::now(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigData::default().into()
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = ConfigData::default();

        let mut settings = config::Config::builder()
            .set_default("port", defaults.port as i64)?
            .set_default("origin_url", defaults.origin_url)?
            .set_default("origin_timeout_seconds", defaults.origin_timeout_seconds)?
            .set_default("max_response_size", defaults.max_response_size as i64)?
            .set_default("cache_ttl_seconds", defaults.cache_ttl_seconds)?
            .set_default("cache_max_entries", defaults.cache_max_entries)?
            .set_default("database_url", defaults.database_url)?
            .set_default("database_max_connections", defaults.database_max_connections as i64)?
            .set_default("durable_tier_enabled", defaults.durable_tier_enabled)?
            .set_default("coalesce_lookups", defaults.coalesce_lookups)?
            .set_default("transient_banner", defaults.transient_banner)?
            .set_default("occupancy_marker", defaults.occupancy_marker)?
            .set_default("marker_polarity", "available")?;

        // Override with environment variables if present
        settings = Self::apply_env_overrides(settings)?;

        let config_data: ConfigData = settings.build()?.try_deserialize()?;

        Ok(config_data.into())
    }

    fn apply_env_overrides(
        mut settings: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let env_mappings = [
            ("PORT", "port"),
            ("HTTP_PORT", "port"),
            ("ORIGIN_URL", "origin_url"),
            ("WHOIS_ORIGIN_URL", "origin_url"),
            ("ORIGIN_TIMEOUT_SECONDS", "origin_timeout_seconds"),
            ("ORIGIN_TIMEOUT", "origin_timeout_seconds"),
            ("MAX_RESPONSE_SIZE", "max_response_size"),
            ("CACHE_TTL_SECONDS", "cache_ttl_seconds"),
            ("CACHE_TTL", "cache_ttl_seconds"),
            ("CACHE_MAX_ENTRIES", "cache_max_entries"),
            ("CACHE_SIZE", "cache_max_entries"),
            ("DATABASE_URL", "database_url"),
            ("DATABASE_MAX_CONNECTIONS", "database_max_connections"),
            ("DURABLE_TIER_ENABLED", "durable_tier_enabled"),
            ("COALESCE_LOOKUPS", "coalesce_lookups"),
            ("TRANSIENT_BANNER", "transient_banner"),
            ("OCCUPANCY_MARKER", "occupancy_marker"),
            ("MARKER_POLARITY", "marker_polarity"),
        ];

        for (env_var, config_key) in env_mappings {
            if let Ok(value) = std::env::var(env_var) {
                settings = settings.set_override(config_key, value)?;
            }
        }

        Ok(settings)
    }
}
