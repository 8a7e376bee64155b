//! `skiapkg.toml` configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::http::{FetcherConfig, DEFAULT_MAX_RETRIES, DEFAULT_USER_AGENT};
use crate::release::{Flavor, ReleaseSource, ReleaseTag, DEFAULT_HOST};
use crate::target::{Target, TargetTable};
use crate::version::Milestone;

pub const CONFIG_FILE_NAME: &str = "skiapkg.toml";
pub const DEFAULT_MILESTONE: &str = "m144";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The skiapkg configuration file structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SkiapkgConfig {
    /// Which release to fetch and where it lives
    pub release: ReleaseSettings,

    /// Download behaviour
    pub http: HttpSettings,

    /// Platform table; empty means the built-in table
    pub targets: Vec<Target>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReleaseSettings {
    pub host: String,
    /// Repository publishing the releases; required unless `base_url` is set
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub milestone: String,
    pub flavor: Flavor,
    /// Overrides host/owner/repo, e.g. for a mirror
    pub base_url: Option<String>,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            owner: None,
            repo: None,
            milestone: DEFAULT_MILESTONE.to_string(),
            flavor: Flavor::default(),
            base_url: None,
        }
    }
}

impl ReleaseSettings {
    pub fn release_tag(&self) -> crate::Result<ReleaseTag> {
        let milestone = Milestone::parse(&self.milestone)?;
        Ok(ReleaseTag::new(self.flavor, milestone))
    }

    pub fn source(&self) -> crate::Result<ReleaseSource> {
        match (&self.base_url, &self.owner, &self.repo) {
            (Some(base), _, _) => ReleaseSource::from_base_url(base),
            (None, Some(owner), Some(repo)) => ReleaseSource::github(&self.host, owner, repo),
            _ => Err(ConfigError::Invalid(
                "release.owner and release.repo must be set (or release.base_url)".to_string(),
            )
            .into()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: Option<String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout_secs: Option<u64>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: 1000,
            connect_timeout_secs: Some(30),
        }
    }
}

impl HttpSettings {
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::new()
            .with_user_agent(self.user_agent.clone().unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()))
            .with_max_retries(self.max_retries)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
            .with_connect_timeout(self.connect_timeout_secs.map(Duration::from_secs))
    }
}

impl SkiapkgConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: SkiapkgConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a specific configuration file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Load configuration from skiapkg.toml, searching upward from the given directory
    pub fn load(start_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                log::debug!("Using configuration {}", config_path.display());
                return Self::load_file(&config_path).map(Some);
            }

            // Move to parent directory
            if !current.pop() {
                return Ok(None);
            }
        }
    }

    /// Target table from the file, or the built-in one.
    pub fn target_table(&self) -> TargetTable {
        if self.targets.is_empty() {
            TargetTable::builtin()
        } else {
            TargetTable::new(self.targets.clone())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for target in &self.targets {
            if target.artifacts.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target '{}' has no artifacts",
                    target.platform
                )));
            }
            for artifact in &target.artifacts {
                if artifact.dest.is_empty() || Path::new(&artifact.dest).is_absolute() || artifact.dest.contains("..") {
                    return Err(ConfigError::Invalid(format!(
                        "artifact '{}' of target '{}' has an invalid dest '{}'",
                        artifact.name, target.platform, artifact.dest
                    )));
                }
            }
        }
        Ok(())
    }
}
