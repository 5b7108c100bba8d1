//! Application settings and configuration

use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use gecko_common::error::ConfigurationError;

use crate::provider::coingecko::{DEFAULT_BASE_URL, MAX_PER_PAGE};

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Database connection settings
///
/// `url` wins over the individual connection fields when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default = "default_db_password")]
    pub password: String,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_sslmode")]
    pub sslmode: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_password() -> String {
    "password".to_string()
}

fn default_db_name() -> String {
    "cgoffline".to_string()
}

fn default_db_sslmode() -> String {
    "disable".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: default_db_password(),
            name: default_db_name(),
            sslmode: default_db_sslmode(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl DatabaseSettings {
    /// Connection options from `url`, or from the individual fields.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        if let Some(url) = self.url.as_deref().filter(|url| !url.is_empty()) {
            return url.parse();
        }

        let ssl_mode: PgSslMode = self.sslmode.parse()?;
        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(ssl_mode))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// CoinGecko API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sent as `x-cg-demo-api-key` when present
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra attempts after the first failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Page size for `/coins/markets` and `/exchanges`
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_per_page() -> u32 {
    MAX_PER_PAGE
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            per_page: default_per_page(),
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Sync pacing, deadlines and filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Pause between pages of `/coins/markets` and `/exchanges`
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// Pause between pages of `/coins/{id}/tickers`
    #[serde(default = "default_ticker_page_delay_ms")]
    pub ticker_page_delay_ms: u64,
    /// Coins below this 24h volume are skipped by the detail sync
    #[serde(default = "default_min_total_volume")]
    pub min_total_volume: f64,
    /// Resync period in serve mode; 0 runs the initial sync only
    #[serde(default)]
    pub interval_secs: u64,
    #[serde(default = "default_reference_timeout_secs")]
    pub reference_timeout_secs: u64,
    #[serde(default = "default_coins_timeout_secs")]
    pub coins_timeout_secs: u64,
    #[serde(default = "default_details_timeout_secs")]
    pub details_timeout_secs: u64,
    #[serde(default = "default_reference_timeout_secs")]
    pub market_data_timeout_secs: u64,
}

fn default_page_delay_ms() -> u64 {
    1_000
}

fn default_ticker_page_delay_ms() -> u64 {
    500
}

fn default_min_total_volume() -> f64 {
    1_000_000.0
}

fn default_reference_timeout_secs() -> u64 {
    60
}

fn default_coins_timeout_secs() -> u64 {
    300
}

fn default_details_timeout_secs() -> u64 {
    600
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_delay_ms: default_page_delay_ms(),
            ticker_page_delay_ms: default_ticker_page_delay_ms(),
            min_total_volume: default_min_total_volume(),
            interval_secs: 0,
            reference_timeout_secs: default_reference_timeout_secs(),
            coins_timeout_secs: default_coins_timeout_secs(),
            details_timeout_secs: default_details_timeout_secs(),
            market_data_timeout_secs: default_reference_timeout_secs(),
        }
    }
}

/// Flat variables understood for compatibility with existing deployments.
///
/// Each entry is (variable, settings path, value kind).
const FLAT_ENV_VARS: &[(&str, &str, FlatKind)] = &[
    ("DATABASE_URL", "database.url", FlatKind::Text),
    ("DB_HOST", "database.host", FlatKind::Text),
    ("DB_PORT", "database.port", FlatKind::Text),
    ("DB_USER", "database.user", FlatKind::Text),
    ("DB_PASSWORD", "database.password", FlatKind::Text),
    ("DB_NAME", "database.name", FlatKind::Text),
    ("DB_SSLMODE", "database.sslmode", FlatKind::Text),
    ("COINGECKO_BASE_URL", "api.base_url", FlatKind::Text),
    ("COINGECKO_API_KEY", "api.api_key", FlatKind::Text),
    ("API_TIMEOUT", "api.timeout_ms", FlatKind::Millis),
    ("API_RETRY_ATTEMPTS", "api.retry_attempts", FlatKind::Text),
    ("API_RETRY_DELAY", "api.retry_delay_ms", FlatKind::Millis),
    ("MIN_TOTAL_VOLUME", "sync.min_total_volume", FlatKind::Text),
    ("SYNC_INTERVAL", "sync.interval_secs", FlatKind::Secs),
];

#[derive(Debug, Clone, Copy)]
enum FlatKind {
    Text,
    Millis,
    Secs,
}

impl Settings {
    /// Load settings from configuration files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix("GECKO_SYNC")
    }

    /// Load settings with a custom environment variable prefix
    pub fn load_with_prefix(env_prefix: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = Self::config_dir();

        let builder = Config::builder()
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Local overrides (not checked into git)
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            // e.g. GECKO_SYNC__DATABASE__MAX_CONNECTIONS
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            );

        let builder = apply_flat_env(builder, |key| std::env::var(key).ok())?;
        let settings: Settings = builder.build()?.try_deserialize()?;

        settings
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(settings)
    }

    fn config_dir() -> String {
        std::env::var("GECKO_SYNC_CONFIG_DIR").unwrap_or_else(|_| "config".into())
    }

    /// Create default settings (useful for testing)
    pub fn default_settings() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigurationError::MissingField("api.base_url".into()));
        }
        if self.api.per_page == 0 || self.api.per_page > MAX_PER_PAGE {
            return Err(ConfigurationError::invalid(
                "api.per_page",
                format!("must be between 1 and {}", MAX_PER_PAGE),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigurationError::invalid(
                "database.min_connections",
                "must not exceed max_connections",
            ));
        }
        if !self.sync.min_total_volume.is_finite() || self.sync.min_total_volume < 0.0 {
            return Err(ConfigurationError::invalid(
                "sync.min_total_volume",
                "must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// Layer the flat variables over everything else. Empty values count as unset.
fn apply_flat_env(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    for (var, path, kind) in FLAT_ENV_VARS {
        let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };

        builder = match kind {
            FlatKind::Text => builder.set_override(*path, value)?,
            FlatKind::Millis | FlatKind::Secs => {
                let duration = parse_duration(&value).ok_or_else(|| {
                    ConfigError::Message(format!("{}: invalid duration '{}'", var, value))
                })?;
                let amount = match kind {
                    FlatKind::Millis => duration.as_millis(),
                    _ => u128::from(duration.as_secs()),
                };
                builder.set_override(*path, amount.to_string())?
            }
        };
    }
    Ok(builder)
}

/// Parse `500ms`, `30s`, `5m`, `1h` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    let (amount, unit) = input.split_at(split);
    let amount: f64 = amount.parse().ok()?;
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }

    let seconds = match unit.trim() {
        "" | "s" => amount,
        "ms" => amount / 1_000.0,
        "m" => amount * 60.0,
        "h" => amount * 3_600.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(seconds).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_from(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let builder = apply_flat_env(Config::builder(), |key| vars.get(key).cloned())?;
        builder.build()?.try_deserialize()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default_settings();
        assert_eq!(settings.database.port, 5432);
        assert_eq!(settings.database.name, "cgoffline");
        assert_eq!(settings.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.api.retry_attempts, 3);
        assert_eq!(settings.api.timeout(), Duration::from_secs(30));
        assert_eq!(settings.api.per_page, 250);
        assert_eq!(settings.sync.page_delay_ms, 1_000);
        assert_eq!(settings.sync.ticker_page_delay_ms, 500);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_sources_use_defaults() {
        let settings = load_from(&[]).unwrap();
        assert_eq!(settings.database.host, "localhost");
        assert_eq!(settings.sync.coins_timeout_secs, 300);
        assert_eq!(settings.sync.details_timeout_secs, 600);
    }

    #[test]
    fn test_flat_env_overrides() {
        let settings = load_from(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("API_TIMEOUT", "45s"),
            ("API_RETRY_ATTEMPTS", "5"),
            ("API_RETRY_DELAY", "250ms"),
            ("MIN_TOTAL_VOLUME", "2500000"),
            ("SYNC_INTERVAL", "1h"),
            ("COINGECKO_API_KEY", ""),
        ])
        .unwrap();

        assert_eq!(settings.database.host, "db.internal");
        assert_eq!(settings.database.port, 6543);
        assert_eq!(settings.api.timeout_ms, 45_000);
        assert_eq!(settings.api.retry_attempts, 5);
        assert_eq!(settings.api.retry_delay(), Duration::from_millis(250));
        assert_eq!(settings.sync.min_total_volume, 2_500_000.0);
        assert_eq!(settings.sync.interval_secs, 3_600);
        assert!(settings.api.api_key.is_none());
    }

    #[test]
    fn test_flat_env_rejects_bad_duration() {
        assert!(load_from(&[("API_TIMEOUT", "soon")]).is_err());
        assert!(load_from(&[("SYNC_INTERVAL", "99999999999999999999999")]).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1_500)));
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("10 parsecs"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("99999999999999999999999"), None);
        assert_eq!(parse_duration("99999999999999999h"), None);
    }

    #[test]
    fn test_validate_rejects_oversized_pages() {
        let mut settings = Settings::default_settings();
        settings.api.per_page = 500;
        assert!(settings.validate().is_err());

        settings.api.per_page = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_volume() {
        let mut settings = Settings::default_settings();
        settings.sync.min_total_volume = -1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_connect_options_from_fields() {
        let settings = DatabaseSettings {
            sslmode: "not-a-mode".into(),
            ..Default::default()
        };
        assert!(settings.connect_options().is_err());
        assert!(DatabaseSettings::default().connect_options().is_ok());
    }
}
