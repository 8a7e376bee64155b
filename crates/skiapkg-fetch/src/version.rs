//! Skia milestone identifiers and their semantic versions.
//!
//! Milestones look like `m144` or `m144a`. The letter marks a re-release of
//! the same milestone and becomes the minor version:
//!
//! ```
//! use skiapkg_fetch::version::milestone_to_semver;
//!
//! assert_eq!(milestone_to_semver("m144").unwrap(), "144.0.0");
//! assert_eq!(milestone_to_semver("m144b").unwrap(), "144.2.0");
//! assert!(milestone_to_semver("144").is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref MILESTONE_RE: Regex = Regex::new(r"^m(\d{1,6})([a-z])?$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid milestone \"{0}\": expected m<number> with an optional lowercase letter, e.g. m144 or m144a")]
    InvalidMilestone(String),

    #[error("Invalid release tag \"{0}\": expected <prefix>-<milestone>")]
    InvalidTag(String),
}

/// A parsed milestone such as `m144a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Milestone {
    pub major: u32,
    pub revision: Option<char>,
}

impl Milestone {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidMilestone(input.to_string());
        let caps = MILESTONE_RE.captures(input).ok_or_else(invalid)?;

        let major = caps[1].parse::<u32>().map_err(|_| invalid())?;
        let revision = caps.get(2).and_then(|m| m.as_str().chars().next());

        Ok(Self { major, revision })
    }

    /// `a` → 1 … `z` → 26, no letter → 0.
    pub fn minor(&self) -> u32 {
        self.revision.map(|c| c as u32 - 'a' as u32 + 1).unwrap_or(0)
    }

    pub fn to_semver(&self) -> String {
        format!("{}.{}.0", self.major, self.minor())
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.major)?;
        if let Some(c) = self.revision {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl FromStr for Milestone {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Derive the package version for a milestone string.
pub fn milestone_to_semver(milestone: &str) -> Result<String, VersionError> {
    Milestone::parse(milestone).map(|m| m.to_semver())
}
