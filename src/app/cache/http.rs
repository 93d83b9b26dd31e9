//! Remote HTTP artifact cache
//!
//! Artifacts are served at `GET <base_url>/artifacts/key/<key>`. A 200
//! response is a hit and its body is streamed to a temp file next to the
//! destination, then renamed into place. A 404 is a miss. Anything else is
//! reported as a server error for that key.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Jitter, Quota};
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use super::{temp_file_for, ArtifactCache, HttpClientConfig};
use crate::app::lazy_path::LazyPath;
use crate::app::models::{CacheMode, CacheResult};
use crate::app::rule_key::RuleKey;
use crate::constants::http;
use crate::errors::{ArtifactCacheResult, CacheError};

type DirectRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Artifact cache reached over HTTP
#[derive(Debug)]
pub struct HttpArtifactCache {
    client: Client,
    rate_limiter: DirectRateLimiter,
    base_url: Url,
    closed: AtomicBool,
}

impl HttpArtifactCache {
    /// Open an HTTP cache client
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidUrl` for an unparsable base URL,
    /// `CacheError::RateLimiterSetup` for a zero rate limit and
    /// `CacheError::Http` if the client cannot be built.
    pub fn open(base_url: &str, config: &HttpClientConfig) -> ArtifactCacheResult<Self> {
        let base_url = parse_base_url(base_url)?;
        let rate_limiter = build_rate_limiter(config.rate_limit_rps)?;
        let client = config.build_http_client()?;

        debug!("Opened HTTP cache at {}", base_url);
        Ok(Self {
            client,
            rate_limiter,
            base_url,
            closed: AtomicBool::new(false),
        })
    }

    /// URL the artifact for `key` is served from
    pub fn artifact_url(&self, key: &RuleKey) -> ArtifactCacheResult<Url> {
        let relative = format!("{}/{}", http::ARTIFACT_PATH, key.to_hex());
        self.base_url
            .join(&relative)
            .map_err(|e| CacheError::InvalidUrl {
                url: relative,
                error: e.to_string(),
            })
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn write_body(
        &self,
        response: reqwest::Response,
        destination: &LazyPath,
    ) -> ArtifactCacheResult<()> {
        let target = destination.get()?;
        let temp = temp_file_for(&target)?;

        let mut file = File::from_std(temp.as_file().try_clone()?);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);

        temp.persist(&target).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}

// Ensure the base path ends in '/' so joining keeps any path prefix
fn parse_base_url(base_url: &str) -> ArtifactCacheResult<Url> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };

    let url = Url::parse(&normalized).map_err(|e| CacheError::InvalidUrl {
        url: base_url.to_string(),
        error: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CacheError::InvalidUrl {
            url: base_url.to_string(),
            error: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

fn build_rate_limiter(rate_limit_rps: u32) -> ArtifactCacheResult<DirectRateLimiter> {
    let rps = NonZeroU32::new(rate_limit_rps).ok_or_else(|| CacheError::RateLimiterSetup {
        reason: "Rate limit must be non-zero".to_string(),
    })?;
    Ok(governor::RateLimiter::direct(Quota::per_second(rps)))
}

#[async_trait]
impl ArtifactCache for HttpArtifactCache {
    async fn fetch(
        &self,
        key: &RuleKey,
        destination: &LazyPath,
    ) -> ArtifactCacheResult<CacheResult> {
        let url = self.artifact_url(key)?;

        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(20)))
            .await;

        let response = self.client.get(url.clone()).send().await?;
        match response.status() {
            StatusCode::OK => {
                self.write_body(response, destination).await?;
                debug!("HTTP cache hit for {}", key);
                Ok(CacheResult::hit(CacheMode::Http.as_str(), CacheMode::Http))
            }
            StatusCode::NOT_FOUND => {
                debug!("HTTP cache miss for {}", key);
                Ok(CacheResult::miss())
            }
            status => {
                warn!("HTTP cache returned {} for {}", status, url);
                Err(CacheError::ServerError {
                    status: status.as_u16(),
                })
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("HTTP cache at {} closed twice", self.base_url);
        }
    }

    fn mode(&self) -> CacheMode {
        CacheMode::Http
    }
}
