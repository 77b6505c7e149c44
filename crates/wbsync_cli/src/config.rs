//! Configuration file support for wbsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (`WBSYNC_` prefix, `__` between section and key,
//!    e.g. `WBSYNC_MARKETPLACE__TOKEN`, `WBSYNC_SYNC__WORKERS`)
//! 3. Local config file (`./wbsync.toml`)
//! 4. XDG config file (`~/.config/wbsync/config.toml`)
//! 5. Built-in defaults
//!
//! The legacy `WB_API_KEY` variable is used when no marketplace token is
//! configured anywhere else.
//!
//! Example config file:
//! ```toml
//! [marketplace]
//! token = "eyJhbGciOi..."  # or WBSYNC_MARKETPLACE__TOKEN / WB_API_KEY
//! base_url = "https://content-api.wildberries.ru"
//! locale = "ru"
//!
//! [catalog]
//! base_url = "http://localhost:8081"
//! timeout_secs = 30
//! censored = false
//! image_size = 1200
//!
//! [package]
//! length = 100
//! width = 100
//! height = 50
//!
//! [brands]
//! banned = ["Nike", "Adidas"]
//!
//! [sync]
//! limit = 100000
//! workers = 5
//! listing_per_minute = 70
//! upload_per_minute = 10
//! media_per_minute = 60
//! identity_code = 7
//! subject_id = 3091
//! dry_run = false
//!
//! [metrics]
//! listen = "127.0.0.1:9184"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use wbsync::catalog::DEFAULT_CATALOG_TIMEOUT;
use wbsync::marketplace::DEFAULT_BASE_URL;
use wbsync::sync::{DEFAULT_LIMIT, DEFAULT_WORKERS};
use wbsync::{Dimensions, MediaOptions, RateLimit, SyncOptions, rate_limits};

/// Environment variable prefix for layered configuration.
const ENV_PREFIX: &str = "WBSYNC";

/// Token variable honoured when `marketplace.token` is unset.
const LEGACY_TOKEN_VAR: &str = "WB_API_KEY";

/// Local config file looked up in the working directory.
const LOCAL_CONFIG_FILE: &str = "wbsync.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub marketplace: MarketplaceConfig,
    pub catalog: CatalogConfig,
    /// Package dimensions used where a card has none.
    pub package: PackageConfig,
    pub brands: BrandsConfig,
    pub sync: SyncConfig,
    pub metrics: MetricsConfig,
}

/// Wildberries content API.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// API token. Falls back to `WB_API_KEY`.
    pub token: Option<String>,
    pub base_url: String,
    /// Listing `locale` query parameter.
    pub locale: Option<String>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            locale: None,
        }
    }
}

/// Internal product catalog.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Request censored media URLs.
    pub censored: bool,
    /// Preferred media size in pixels.
    pub image_size: Option<u32>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout_secs: DEFAULT_CATALOG_TIMEOUT.as_secs(),
            censored: false,
            image_size: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    pub length: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BrandsConfig {
    /// Brands never pushed to the marketplace.
    pub banned: Vec<String>,
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Item budget for discovery.
    pub limit: usize,
    /// Discovery and process worker count.
    pub workers: usize,
    pub listing_per_minute: u32,
    pub upload_per_minute: u32,
    pub media_per_minute: u32,
    /// Supplier identity embedded in created vendor codes.
    pub identity_code: i64,
    /// Marketplace category for created cards.
    pub subject_id: i64,
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            workers: DEFAULT_WORKERS,
            listing_per_minute: rate_limits::LISTING_PER_MINUTE,
            upload_per_minute: rate_limits::UPLOAD_PER_MINUTE,
            media_per_minute: rate_limits::MEDIA_PER_MINUTE,
            identity_code: 0,
            subject_id: 0,
            dry_run: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address for the Prometheus endpoint. Disabled when unset.
    pub listen: Option<SocketAddr>,
}

impl Config {
    /// Load configuration from every layer.
    ///
    /// Sources are added in order, later sources override earlier ones:
    /// 1. XDG config file (~/.config/wbsync/config.toml)
    /// 2. Local config file (./wbsync.toml)
    /// 3. Environment variables with the WBSYNC_ prefix
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!(path = %xdg_config.display(), "Loading config");
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            tracing::debug!("Loading config from ./{LOCAL_CONFIG_FILE}");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder
            .add_source(environment())
            .build()?
            .try_deserialize::<Config>()
    }

    /// Marketplace token, falling back to `WB_API_KEY`.
    pub fn token(&self) -> Option<String> {
        self.marketplace
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var(LEGACY_TOKEN_VAR).ok())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog.timeout_secs)
    }

    pub fn media_options(&self) -> MediaOptions {
        MediaOptions {
            censored: self.catalog.censored,
            image_size: self.catalog.image_size,
        }
    }

    /// Engine options for one run.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            limit: self.sync.limit,
            workers: self.sync.workers,
            listing_rate: RateLimit::per_minute(self.sync.listing_per_minute),
            upload_rate: RateLimit::per_minute(self.sync.upload_per_minute),
            media_rate: RateLimit::per_minute(self.sync.media_per_minute),
            package_defaults: Dimensions::new(
                self.package.length,
                self.package.width,
                self.package.height,
            ),
            banned_brands: self.brands.banned.iter().cloned().collect(),
            identity_code: self.sync.identity_code,
            subject_id: self.sync.subject_id,
            locale: self.marketplace.locale.clone(),
            dry_run: self.sync.dry_run,
            ..SyncOptions::default()
        }
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "wbsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// `WBSYNC_SECTION__KEY` variables. `brands.banned` is comma separated.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("brands.banned")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    fn from_env(vars: &[(&str, &str)]) -> Config {
        let source: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigBuilder::builder()
            .add_source(environment().source(Some(source)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.marketplace.base_url, DEFAULT_BASE_URL);
        assert!(config.marketplace.token.is_none());
        assert_eq!(config.catalog.base_url, "http://localhost:8081");
        assert_eq!(config.catalog.timeout_secs, 30);
        assert_eq!(config.sync.limit, 100_000);
        assert_eq!(config.sync.workers, 5);
        assert_eq!(config.sync.listing_per_minute, 70);
        assert_eq!(config.sync.upload_per_minute, 10);
        assert_eq!(config.sync.media_per_minute, 60);
        assert!(!config.sync.dry_run);
        assert!(config.brands.banned.is_empty());
        assert!(config.metrics.listen.is_none());
    }

    #[test]
    fn test_empty_builder_gives_defaults() {
        let config: Config = ConfigBuilder::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap_or_default();
        assert_eq!(config.sync.workers, DEFAULT_WORKERS);
        assert_eq!(config.marketplace.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_full_config_parsing() {
        let config = from_toml(
            r#"
            [marketplace]
            token = "wb-token"
            base_url = "https://wb.example"
            locale = "ru"

            [catalog]
            base_url = "http://catalog:8081"
            timeout_secs = 5
            censored = true
            image_size = 1200

            [package]
            length = 100
            width = 80
            height = 50

            [brands]
            banned = ["Nike", "Adidas"]

            [sync]
            limit = 500
            workers = 3
            listing_per_minute = 30
            identity_code = 7
            subject_id = 3091
            dry_run = true

            [metrics]
            listen = "127.0.0.1:9184"
        "#,
        );

        assert_eq!(config.marketplace.token.as_deref(), Some("wb-token"));
        assert_eq!(config.marketplace.locale.as_deref(), Some("ru"));
        assert_eq!(config.catalog_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.media_options(),
            MediaOptions {
                censored: true,
                image_size: Some(1200),
            }
        );
        assert_eq!(config.brands.banned, vec!["Nike", "Adidas"]);
        assert_eq!(
            config.metrics.listen,
            Some("127.0.0.1:9184".parse().unwrap())
        );

        let options = config.sync_options();
        assert_eq!(options.limit, 500);
        assert_eq!(options.workers, 3);
        assert_eq!(options.listing_rate, RateLimit::per_minute(30));
        assert_eq!(options.upload_rate, RateLimit::UPLOAD);
        assert_eq!(options.package_defaults, Dimensions::new(100, 80, 50));
        assert!(options.is_banned_brand("nike"));
        assert_eq!(options.identity_code, 7);
        assert_eq!(options.subject_id, 3091);
        assert_eq!(options.locale.as_deref(), Some("ru"));
        assert!(options.dry_run);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = from_toml(
            r#"
            [sync]
            workers = 2
        "#,
        );
        assert_eq!(config.sync.workers, 2);
        assert_eq!(config.sync.limit, DEFAULT_LIMIT);
        assert_eq!(config.catalog.base_url, "http://localhost:8081");
    }

    #[test]
    fn test_environment_nested_keys() {
        let config = from_env(&[
            ("WBSYNC_MARKETPLACE__TOKEN", "env-token"),
            ("WBSYNC_CATALOG__BASE_URL", "http://catalog.env"),
            ("WBSYNC_SYNC__WORKERS", "8"),
            ("WBSYNC_SYNC__DRY_RUN", "true"),
            ("WBSYNC_BRANDS__BANNED", "Nike,Puma"),
        ]);

        assert_eq!(config.marketplace.token.as_deref(), Some("env-token"));
        assert_eq!(config.catalog.base_url, "http://catalog.env");
        assert_eq!(config.sync.workers, 8);
        assert!(config.sync.dry_run);
        assert_eq!(config.brands.banned, vec!["Nike", "Puma"]);
    }

    #[test]
    fn test_environment_overrides_file() {
        let source: config::Map<String, String> =
            [("WBSYNC_SYNC__LIMIT".to_string(), "10".to_string())]
                .into_iter()
                .collect();
        let config: Config = ConfigBuilder::builder()
            .add_source(File::from_str(
                "[sync]\nlimit = 500\nworkers = 4\n",
                FileFormat::Toml,
            ))
            .add_source(environment().source(Some(source)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.sync.limit, 10);
        assert_eq!(config.sync.workers, 4);
    }

    #[test]
    fn test_configured_token_wins() {
        let mut config = Config::default();
        config.marketplace.token = Some("from-config".to_string());
        assert_eq!(config.token().as_deref(), Some("from-config"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let result = ConfigBuilder::builder()
            .add_source(File::from_str("[sync\nworkers = ", FileFormat::Toml))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config = from_toml(
            r#"
            [sync]
            workers = 6
            star = true

            [database]
            url = "sqlite://ignored"
        "#,
        );
        assert_eq!(config.sync.workers, 6);
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = Config::default_config_path() {
            assert!(path.to_string_lossy().contains("wbsync"));
            assert!(path.ends_with("config.toml"));
        }
    }
}
