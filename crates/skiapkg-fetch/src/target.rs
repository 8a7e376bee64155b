//! Which artifacts make up each platform package.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One archive to fetch for a target, and where its payload goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Asset name without the tag suffix, e.g. `skia-macos`.
    pub name: String,
    /// Directory inside the archive to install from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_subdir: Option<String>,
    /// Directory under the target root that receives the payload.
    pub dest: String,
}

impl ArtifactSpec {
    fn new(name: &str, source_subdir: Option<&str>, dest: &str) -> Self {
        Self {
            name: name.to_string(),
            source_subdir: source_subdir.map(str::to_string),
            dest: dest.to_string(),
        }
    }
}

/// A platform package and the artifacts it is assembled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub platform: String,
    pub package: String,
    #[serde(default)]
    pub os: Vec<String>,
    #[serde(default)]
    pub cpu: Vec<String>,
    pub artifacts: Vec<ArtifactSpec>,
}

/// Immutable platform → artifacts table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    targets: Vec<Target>,
}

impl Default for TargetTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TargetTable {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }

    /// The platforms published upstream.
    pub fn builtin() -> Self {
        let target = |platform: &str, os: &[&str], cpu: &[&str], artifacts: Vec<ArtifactSpec>| Target {
            platform: platform.to_string(),
            package: format!("@skiapkg/{}", platform),
            os: os.iter().map(|s| s.to_string()).collect(),
            cpu: cpu.iter().map(|s| s.to_string()).collect(),
            artifacts,
        };

        Self::new(vec![
            target(
                "darwin",
                &["darwin"],
                &["arm64", "x64"],
                vec![
                    ArtifactSpec::new("skia-macos", Some("arm64"), "arm64"),
                    ArtifactSpec::new("skia-macos", Some("x64"), "x64"),
                ],
            ),
            target(
                "linux-x64",
                &["linux"],
                &["x64"],
                vec![ArtifactSpec::new("skia-linux-x64", None, "x64")],
            ),
            target(
                "linux-arm64",
                &["linux"],
                &["arm64"],
                vec![ArtifactSpec::new("skia-linux-arm64", None, "arm64")],
            ),
            target(
                "win32-x64",
                &["win32"],
                &["x64"],
                vec![ArtifactSpec::new("skia-windows-x64", None, "x64")],
            ),
            target(
                "ios",
                &[],
                &[],
                vec![
                    ArtifactSpec::new("skia-apple-xcframeworks", Some("ios"), "ios"),
                    ArtifactSpec::new("skia-apple-xcframeworks", Some("ios-simulator"), "ios-simulator"),
                ],
            ),
            target(
                "android",
                &[],
                &[],
                ["arm64-v8a", "armeabi-v7a", "x86", "x86_64"]
                    .into_iter()
                    .map(|abi| ArtifactSpec::new("skia-android", Some(abi), abi))
                    .collect(),
            ),
        ])
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.platform.as_str())
    }

    pub fn get(&self, platform: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.platform == platform)
    }

    /// Like [`get`](Self::get), but an unknown platform is an error.
    pub fn require(&self, platform: &str) -> Result<&Target> {
        self.get(platform)
            .ok_or_else(|| Error::UnknownPlatform(platform.to_string()))
    }

    /// Select targets by platform name; an empty selection means all.
    pub fn select(&self, platforms: &[String]) -> Result<Vec<&Target>> {
        if platforms.is_empty() {
            return Ok(self.targets.iter().collect());
        }
        platforms.iter().map(|p| self.require(p)).collect()
    }
}

/// Platform name of the running host, in the table's naming.
pub fn host_platform() -> String {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;

    let arch = match arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    };

    match os {
        "macos" => "darwin".to_string(),
        "windows" => format!("win32-{}", arch),
        other => format!("{}-{}", other, arch),
    }
}
