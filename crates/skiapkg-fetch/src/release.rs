//! Release tags and asset URLs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;
use crate::version::{Milestone, VersionError};
use crate::{Error, Result};

pub const DEFAULT_HOST: &str = "github.com";

/// Binary flavor; each is published under its own tag prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[default]
    Standard,
    Graphite,
}

impl Flavor {
    pub fn tag_prefix(&self) -> &'static str {
        match self {
            Flavor::Standard => "skia",
            Flavor::Graphite => "skia-graphite",
        }
    }
}

impl FromStr for Flavor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Flavor::Standard),
            "graphite" => Ok(Flavor::Graphite),
            other => Err(format!("unknown flavor '{}' (expected 'standard' or 'graphite')", other)),
        }
    }
}

/// `<prefix>-<milestone>`, e.g. `skia-graphite-m144a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReleaseTag {
    pub flavor: Flavor,
    pub milestone: Milestone,
}

impl ReleaseTag {
    pub fn new(flavor: Flavor, milestone: Milestone) -> Self {
        Self { flavor, milestone }
    }

    pub fn parse(tag: &str) -> std::result::Result<Self, VersionError> {
        // Longest prefix first so "skia-graphite-" is not read as "skia-" + "graphite-m.."
        for flavor in [Flavor::Graphite, Flavor::Standard] {
            if let Some(rest) = tag
                .strip_prefix(flavor.tag_prefix())
                .and_then(|r| r.strip_prefix('-'))
            {
                if let Ok(milestone) = Milestone::parse(rest) {
                    return Ok(Self { flavor, milestone });
                }
            }
        }
        Err(VersionError::InvalidTag(tag.to_string()))
    }

    /// Package version derived from the milestone.
    pub fn semver(&self) -> String {
        self.milestone.to_semver()
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.flavor.tag_prefix(), self.milestone)
    }
}

impl FromStr for ReleaseTag {
    type Err = VersionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Where release assets are downloaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    base: Url,
}

impl ReleaseSource {
    /// `https://<host>/<owner>/<repo>/releases/download/`
    pub fn github(host: &str, owner: &str, repo: &str) -> Result<Self> {
        let raw = format!("https://{}/{}/{}/releases/download/", host, owner, repo);
        Self::from_base_url(&raw)
    }

    /// Use an arbitrary base URL; tags are resolved relative to it.
    pub fn from_base_url(base: &str) -> Result<Self> {
        let mut base = Url::parse(base).map_err(|e| {
            Error::Config(ConfigError::Invalid(format!("invalid release base URL {}: {}", base, e)))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `<base>/<tag>/<artifact>-<tag>.tar.gz`
    pub fn asset_url(&self, artifact: &str, tag: &str) -> Result<Url> {
        let relative = format!("{}/{}-{}.tar.gz", tag, artifact, tag);
        self.base.join(&relative).map_err(|e| {
            Error::Config(ConfigError::Invalid(format!(
                "cannot build asset URL for {} at {}: {}",
                artifact, tag, e
            )))
        })
    }
}
