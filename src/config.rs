//! Configuration management for Artifact Fetcher
//!
//! Settings come from a TOML file with `[cache]`, `[fetch]`, `[progress]`
//! and `[logging]` sections. Every field has a default, so a partial file (or
//! no file at all) is valid. Command-line flags are applied on top by the
//! CLI layer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::progress::{parse_time_zone, DisplayLocale};
use crate::app::{
    CacheBackend, CacheConfig, FetchConfig, HttpClientConfig, ProgressConfig, SummaryVerbosity,
};
use crate::constants::{fetch, files, http, logging, progress};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Artifact cache backend and HTTP client settings
    pub cache: CacheConfigToml,
    /// Fetch orchestration settings
    pub fetch: FetchConfigToml,
    /// Live progress settings
    pub progress: ProgressConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Local directory cache root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Remote HTTP cache base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_url: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Duration,
    pub pool_max_per_host: usize,
    /// Requests per second against the HTTP cache
    pub rate_limit_rps: u32,
    pub tcp_nodelay: bool,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        let client = HttpClientConfig::default();
        Self {
            dir: None,
            http_url: None,
            request_timeout: client.request_timeout,
            connect_timeout: client.connect_timeout,
            pool_idle_timeout: client.pool_idle_timeout,
            pool_max_per_host: client.pool_max_per_host,
            rate_limit_rps: client.rate_limit_rps,
            tcp_nodelay: client.tcp_nodelay,
        }
    }
}

/// TOML-friendly fetch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfigToml {
    /// Maximum number of fetches in flight at once
    pub max_concurrent_fetches: usize,
    /// Abort the run after this long, e.g. "5m"
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Output directory (temporary directory if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for FetchConfigToml {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: fetch::DEFAULT_MAX_CONCURRENT_FETCHES,
            timeout: None,
            output_dir: None,
        }
    }
}

/// TOML-friendly progress configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfigToml {
    /// Show the live progress display
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// Locale tag for number formatting
    pub locale: String,
    /// UTC offset for printed times, e.g. "+02:00"
    pub time_zone: String,
    /// Append the final snapshot to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub slow_threshold: Duration,
    #[serde(with = "humantime_serde")]
    pub very_slow_threshold: Duration,
    pub show_failures: bool,
    pub show_details: bool,
    pub quiet: bool,
    pub hide_empty_download: bool,
}

impl Default for ProgressConfigToml {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval: Duration::from_millis(progress::DEFAULT_REFRESH_INTERVAL_MS),
            locale: progress::DEFAULT_LOCALE.to_string(),
            time_zone: progress::DEFAULT_TIME_ZONE.to_string(),
            log_path: None,
            slow_threshold: Duration::from_millis(progress::DEFAULT_SLOW_FETCH_MS),
            very_slow_threshold: Duration::from_millis(progress::DEFAULT_VERY_SLOW_FETCH_MS),
            show_failures: true,
            show_details: false,
            quiet: false,
            hide_empty_download: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one the standard locations are
    /// searched and defaults are used if none has a file.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the commented default configuration
    ///
    /// Writes to `path`, or to the user config directory when `path` is
    /// `None`. An existing file is only replaced when `force` is set.
    /// Returns the path and whether a file was written.
    pub async fn initialize(path: Option<PathBuf>, force: bool) -> ConfigResult<(PathBuf, bool)> {
        let config_path = match path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };

        if config_path.exists() && !force {
            debug!("Config file already exists: {}", config_path.display());
            return Ok((config_path, false));
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&config_path, Self::generate_default_config_content())
            .await
            .map_err(|source| ConfigError::Io {
                path: config_path.clone(),
                source,
            })?;

        info!("Created default configuration file: {}", config_path.display());
        Ok((config_path, true))
    }

    /// Serialize the effective configuration as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(".").join(files::LOCAL_CONFIG_FILE)];
        if let Ok(path) = Self::default_config_path() {
            search_paths.push(path);
        }

        let found = search_paths.into_iter().find(|path| path.exists());
        if let Some(path) = &found {
            debug!("Found config file: {}", path.display());
        }
        found
    }

    /// Default config file path for the current user
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDirectory)?;
        Ok(config_dir.join(files::APP_DIR_NAME).join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# Artifact Fetcher Configuration
# Every setting is optional; the values below are the defaults.

[cache]
# Exactly one backend may be configured here, or passed on the command line
# dir = "/var/cache/artifacts"
# http_url = "http://cache.example.com:8080"
request_timeout = "{}s"
connect_timeout = "{}s"
pool_idle_timeout = "{}s"
pool_max_per_host = {}
rate_limit_rps = {}
tcp_nodelay = true

[fetch]
max_concurrent_fetches = {}
# timeout = "5m"
# output_dir = "./artifacts"  # Unset = fresh temporary directory

[progress]
enabled = true
refresh_interval = "{}ms"
locale = "{}"
time_zone = "{}"
# log_path = "./fetch-progress.log"
slow_threshold = "{}ms"
very_slow_threshold = "{}ms"
show_failures = true
show_details = false
quiet = false
hide_empty_download = false

[logging]
level = "{}"  # error, warn, info, debug, trace
"#,
            http::DEFAULT_TIMEOUT.as_secs(),
            http::CONNECT_TIMEOUT.as_secs(),
            http::POOL_IDLE_TIMEOUT.as_secs(),
            http::POOL_MAX_PER_HOST,
            http::DEFAULT_RATE_LIMIT_RPS,
            fetch::DEFAULT_MAX_CONCURRENT_FETCHES,
            progress::DEFAULT_REFRESH_INTERVAL_MS,
            progress::DEFAULT_LOCALE,
            progress::DEFAULT_TIME_ZONE,
            progress::DEFAULT_SLOW_FETCH_MS,
            progress::DEFAULT_VERY_SLOW_FETCH_MS,
            logging::DEFAULT_LOG_LEVEL,
        )
    }
}

impl CacheConfigToml {
    /// Convert to runtime CacheConfig
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if both `dir` and `http_url` are set.
    pub fn to_runtime_config(&self) -> ConfigResult<CacheConfig> {
        let backend = match (&self.dir, &self.http_url) {
            (Some(_), Some(url)) => {
                return Err(ConfigError::InvalidValue {
                    field: "cache.http_url".to_string(),
                    value: url.clone(),
                    reason: "Only one of cache.dir and cache.http_url may be set".to_string(),
                })
            }
            (Some(root), None) => Some(CacheBackend::Dir { root: root.clone() }),
            (None, Some(url)) => Some(CacheBackend::Http {
                base_url: url.clone(),
            }),
            (None, None) => None,
        };

        Ok(CacheConfig {
            backend,
            http: HttpClientConfig {
                request_timeout: self.request_timeout,
                connect_timeout: self.connect_timeout,
                pool_idle_timeout: self.pool_idle_timeout,
                pool_max_per_host: self.pool_max_per_host,
                rate_limit_rps: self.rate_limit_rps,
                tcp_nodelay: self.tcp_nodelay,
            },
        })
    }
}

impl FetchConfigToml {
    /// Convert to runtime FetchConfig
    pub fn to_runtime_config(&self) -> FetchConfig {
        FetchConfig {
            max_concurrent_fetches: self.max_concurrent_fetches,
            fetch_timeout: self.timeout,
            output_dir: self.output_dir.clone(),
        }
    }
}

impl ProgressConfigToml {
    /// Convert to runtime ProgressConfig
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unparsable locale or time zone.
    pub fn to_runtime_config(&self) -> ConfigResult<ProgressConfig> {
        Ok(ProgressConfig {
            verbosity: SummaryVerbosity {
                include_failures: self.show_failures,
                include_details: self.show_details,
            },
            refresh_interval: self.refresh_interval,
            locale: DisplayLocale::parse(&self.locale)?,
            time_zone: parse_time_zone(&self.time_zone)?,
            log_path: self.log_path.clone(),
            slow_fetch_threshold: self.slow_threshold,
            very_slow_fetch_threshold: self.very_slow_threshold,
            quiet: self.quiet,
            hide_empty_download: self.hide_empty_download,
        })
    }
}
