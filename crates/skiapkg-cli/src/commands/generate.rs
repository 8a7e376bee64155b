//! Generate command - build one npm-style package per platform.
//!
//! Each package gets a `package.json` and its binaries under `bin/<dest>`.
//! Failures leave the partially generated tree in place for inspection.

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use skiapkg_fetch::{PipelineOptions, ReleaseTag, Target};

use crate::context::Context;
use crate::output::Output;

const BIN_DIR: &str = "bin";

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory that receives one package directory per platform
    #[arg(short, long, default_value = "packages")]
    pub out: PathBuf,

    /// Platform to generate (repeatable; default: all)
    #[arg(short, long = "platform", value_name = "PLATFORM")]
    pub platforms: Vec<String>,
}

/// The `package.json` written for each platform.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cpu: Vec<String>,
    pub files: Vec<String>,
}

impl PackageManifest {
    pub fn for_target(target: &Target, tag: &ReleaseTag) -> Self {
        Self {
            name: target.package.clone(),
            version: tag.semver(),
            description: format!("Prebuilt Skia binaries ({}) for {}", tag, target.platform),
            os: target.os.clone(),
            cpu: target.cpu.clone(),
            files: vec![BIN_DIR.to_string()],
        }
    }

    pub fn write(&self, package_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(package_dir)
            .with_context(|| format!("Failed to create {}", package_dir.display()))?;

        let path = package_dir.join("package.json");
        let mut json = serde_json::to_string_pretty(self).context("Failed to serialize package.json")?;
        json.push('\n');
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

pub async fn execute(args: GenerateArgs, ctx: &Context, output: &Output) -> Result<i32> {
    let targets = ctx.table.select(&args.platforms)?;
    let options = PipelineOptions::bulk();

    output.info(&format!(
        "Generating {} package(s) for {} ({})",
        targets.len(),
        ctx.tag,
        ctx.tag.semver()
    ));

    for target in targets {
        output.section(&target.package);

        let package_dir = args.out.join(&target.platform);
        let manifest = PackageManifest::for_target(target, &ctx.tag);
        let path = manifest.write(&package_dir)?;
        output.verbose(&format!("Wrote {}", path.display()));

        for artifact in &target.artifacts {
            let dest = package_dir.join(BIN_DIR).join(&artifact.dest);
            ctx.stage(artifact, &dest, &options, output).await?;
        }
    }

    output.success(&format!("Packages written to {}", args.out.display()));
    Ok(0)
}
