//! Release asset fetcher.
//!
//! Wraps a [`Transport`] with the policy the release host needs:
//! - a fixed `User-Agent` on every request
//! - manual redirect following (GitHub answers asset requests with a 302)
//! - exponential backoff, but only for rate limiting and dropped connections
//! - streaming the body to disk, never leaving a partial file behind
//!
//! # Examples
//!
//! ```no_run
//! use skiapkg_fetch::http::{Fetcher, FetcherConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetcherConfig::new()
//!     .with_max_retries(3)
//!     .with_retry_delay(Duration::from_millis(500));
//!
//! let fetcher = Fetcher::with_config(config)?;
//! fetcher
//!     .fetch(
//!         "https://github.com/owner/repo/releases/download/skia-m144/skia-linux-x64-skia-m144.tar.gz",
//!         "/tmp/skia.tar.gz".as_ref(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::transport::{BodyStream, ReqwestTransport, Transport};

pub const DEFAULT_USER_AGENT: &str = concat!("skiapkg-fetch/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;
const MAX_ERROR_DETAIL: usize = 512;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {url}{}", format_detail(.detail))]
    Status { status: u16, url: String, detail: String },

    #[error("HTTP {status} redirect without a Location header: {url}")]
    MissingLocation { status: u16, url: String },

    #[error("Too many redirects (more than {}) starting at {url}", MAX_REDIRECTS)]
    TooManyRedirects { url: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Connection reset: {url}")]
    ConnectionReset { url: String },

    #[error("Connection timed out: {url}")]
    TimedOut { url: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_detail(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(" ({})", detail)
    }
}

impl FetchError {
    /// Whether the failure is worth retrying.
    ///
    /// The release host signals rate limiting with a 403, and busy CI runners
    /// see dropped connections; everything else (404, broken redirects, disk
    /// errors) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status: 403, .. } => true,
            FetchError::ConnectionReset { .. } | FetchError::TimedOut { .. } => true,
            FetchError::MissingLocation { .. } | FetchError::TooManyRedirects { .. } => false,
            other => {
                let mut message = other.to_string();
                let mut source = std::error::Error::source(other);
                while let Some(cause) = source {
                    message.push_str(": ");
                    message.push_str(&cause.to_string());
                    source = cause.source();
                }
                message.to_lowercase().contains("rate limit")
            }
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } | FetchError::MissingLocation { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Option<Duration>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    max_retries: u32,
    retry_delay: Duration,
}

impl Fetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(FetcherConfig::default())
    }

    pub fn with_config(config: FetcherConfig) -> Result<Self, reqwest::Error> {
        let transport = ReqwestTransport::new(&config.user_agent, config.connect_timeout)?;
        Ok(Self::with_transport(Arc::new(transport), &config))
    }

    /// Build a fetcher over an arbitrary transport. The transport is
    /// responsible for the user agent and timeouts in `config`.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &FetcherConfig) -> Self {
        Self {
            transport,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt + 1`: `retry_delay * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// Download `url` to `dest`.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        self.fetch_with_progress(url, dest, None::<fn(u64, u64)>).await
    }

    /// Download `url` to `dest`, reporting `(downloaded, total)` per chunk.
    ///
    /// Up to `max_retries + 1` attempts are made for transient failures.
    pub async fn fetch_with_progress<F>(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<F>,
    ) -> Result<(), FetchError>
    where
        F: Fn(u64, u64),
    {
        let mut attempt: u32 = 0;

        loop {
            match self.fetch_once(url, dest, progress.as_ref()).await {
                Ok(bytes) => {
                    log::debug!("Fetched {} ({} bytes, attempt {})", url, bytes, attempt + 1);
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    log::warn!(
                        "{} (attempt {}/{}), retrying in {:?}",
                        e,
                        attempt + 1,
                        self.max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt: follow redirects from `url`, then stream a 200 body.
    async fn fetch_once<F>(&self, url: &str, dest: &Path, progress: Option<&F>) -> Result<u64, FetchError>
    where
        F: Fn(u64, u64),
    {
        let mut current = url.to_string();

        for _ in 0..=MAX_REDIRECTS {
            let response = self.transport.get(&current).await?;

            match response.status {
                200 => {
                    let total = response.content_length.unwrap_or(0);
                    return write_body(response.body, dest, total, progress).await;
                }
                301 | 302 | 303 | 307 | 308 => {
                    let location = response.location.ok_or_else(|| FetchError::MissingLocation {
                        status: response.status,
                        url: current.clone(),
                    })?;
                    let next = resolve_location(&current, &location)?;
                    log::debug!("Redirect {} -> {}", current, next);
                    current = next;
                }
                status => {
                    let detail = read_detail(response.body).await;
                    return Err(FetchError::Status { status, url: current, detail });
                }
            }
        }

        Err(FetchError::TooManyRedirects { url: url.to_string() })
    }
}

/// Resolve a `Location` header against the URL that produced it.
fn resolve_location(base: &str, location: &str) -> Result<String, FetchError> {
    let base_url = Url::parse(base).map_err(|e| FetchError::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })?;

    base_url
        .join(location)
        .map(String::from)
        .map_err(|e| FetchError::InvalidUrl {
            url: location.to_string(),
            reason: e.to_string(),
        })
}

/// First few hundred bytes of an error body, for diagnostics.
async fn read_detail(mut body: BodyStream) -> String {
    let mut buf = Vec::new();
    while let Some(Ok(chunk)) = body.next().await {
        buf.extend_from_slice(&chunk);
        if buf.len() >= MAX_ERROR_DETAIL {
            break;
        }
    }
    buf.truncate(MAX_ERROR_DETAIL);
    String::from_utf8_lossy(&buf).trim().to_string()
}

/// Stream `body` into `dest`. On any failure the file is removed.
async fn write_body<F>(mut body: BodyStream, dest: &Path, total: u64, progress: Option<&F>) -> Result<u64, FetchError>
where
    F: Fn(u64, u64),
{
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(dest).await?;
    let mut downloaded: u64 = 0;

    let result: Result<(), FetchError> = async {
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(callback) = progress {
                callback(downloaded, total);
            }
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    drop(file);

    if let Err(e) = result {
        if let Err(remove_err) = tokio::fs::remove_file(dest).await {
            log::debug!("Could not remove partial download {}: {}", dest.display(), remove_err);
        }
        return Err(e);
    }

    Ok(downloaded)
}
