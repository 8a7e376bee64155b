//! Install command - post-install hook for a single platform package.

use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};

use skiapkg_fetch::{host_platform, PipelineOptions, PipelineOutcome};

use crate::context::{runtime, Context};
use crate::output::Output;

/// Set to `1` or `true` to make `install` a no-op (offline and CI builds).
pub const SKIP_DOWNLOAD_ENV: &str = "SKIAPKG_SKIP_DOWNLOAD";

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Platform to install (default: the host platform)
    #[arg(short, long)]
    pub platform: Option<String>,

    /// Directory that receives the binaries, one subdirectory per artifact
    #[arg(short, long, default_value = "bin")]
    pub dest: PathBuf,
}

/// Whether the skip variable's value asks for downloads to be skipped.
pub fn skip_requested(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        Some(v) => v == "1" || v.eq_ignore_ascii_case("true"),
        None => false,
    }
}

/// Entry point from the command line. When skipping, nothing is loaded,
/// resolved or touched, so offline installs succeed on any host.
pub fn run(
    args: InstallArgs,
    config: Option<&Path>,
    milestone: Option<&str>,
    output: &Output,
    skip: bool,
) -> Result<i32> {
    if skip {
        output.info(&format!("{} is set, skipping download of Skia binaries", SKIP_DOWNLOAD_ENV));
        return Ok(0);
    }

    let ctx = Context::load(config, milestone)?;
    runtime()?.block_on(execute(args, &ctx, output))
}

pub async fn execute(args: InstallArgs, ctx: &Context, output: &Output) -> Result<i32> {
    let platform = args.platform.unwrap_or_else(host_platform);
    let target = ctx.table.require(&platform)?;
    let options = PipelineOptions::post_install(false);

    let mut installed = Vec::new();

    for artifact in &target.artifacts {
        let dest = args.dest.join(&artifact.dest);

        match ctx.stage(artifact, &dest, &options, output).await {
            Ok(PipelineOutcome::Staged(_)) => installed.push(dest),
            Ok(PipelineOutcome::Skipped) => {}
            Err(e) => {
                // Earlier artifacts of this platform would be a half install
                for dir in &installed {
                    if let Err(err) = std::fs::remove_dir_all(dir) {
                        log::warn!("Could not remove {}: {}", dir.display(), err);
                    }
                }
                return Err(e.into());
            }
        }
    }

    output.success(&format!("Installed {} for {}", ctx.tag, target.platform));
    Ok(0)
}
