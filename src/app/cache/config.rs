//! Cache backend configuration
//!
//! Selects which bundled backend the factory opens and carries the tuning
//! knobs for the HTTP client.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::http;
use crate::errors::{ArtifactCacheResult, CacheError};

/// Which backend to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheBackend {
    /// Directory laid out as `<root>/<k[0..2]>/<k[2..4]>/<key>`
    Dir { root: PathBuf },
    /// Server answering `GET <base_url>/artifacts/key/<key>`
    Http { base_url: String },
}

/// Configuration for the artifact cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backend to open, `None` when nothing has been configured
    pub backend: Option<CacheBackend>,
    /// HTTP client settings, used by the HTTP backend only
    pub http: HttpClientConfig,
}

impl CacheConfig {
    /// Configuration for a directory cache
    pub fn dir(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: Some(CacheBackend::Dir { root: root.into() }),
            ..Default::default()
        }
    }

    /// Configuration for an HTTP cache
    pub fn http(base_url: impl Into<String>) -> Self {
        Self {
            backend: Some(CacheBackend::Http {
                base_url: base_url.into(),
            }),
            ..Default::default()
        }
    }

    /// Replace the HTTP client settings
    pub fn with_http_client(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }
}

/// HTTP client settings for the remote cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Whole-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connection establishment timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Idle connection lifetime in the pool
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections kept per host
    pub pool_max_per_host: usize,
    /// Requests per second allowed against the server
    pub rate_limit_rps: u32,
    /// Disable Nagle's algorithm
    pub tcp_nodelay: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            pool_idle_timeout: http::POOL_IDLE_TIMEOUT,
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            rate_limit_rps: http::DEFAULT_RATE_LIMIT_RPS,
            tcp_nodelay: true,
        }
    }
}

impl HttpClientConfig {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the rate limit
    pub fn with_rate_limit(mut self, rps: u32) -> Self {
        self.rate_limit_rps = rps;
        self
    }

    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> ArtifactCacheResult<Client> {
        Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .tcp_nodelay(self.tcp_nodelay)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_per_host)
            .build()
            .map_err(CacheError::Http)
    }
}
