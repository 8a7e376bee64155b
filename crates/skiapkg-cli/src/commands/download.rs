//! Download command - fetch release artifacts into `<out>/<platform>/<dest>`.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use skiapkg_fetch::PipelineOptions;

use crate::context::{artifact_label, Context};
use crate::output::Output;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Platform to download (repeatable; default: all)
    #[arg(short, long = "platform", value_name = "PLATFORM")]
    pub platforms: Vec<String>,

    /// Output directory
    #[arg(short, long, default_value = "skia-binaries")]
    pub out: PathBuf,

    /// Continue with the remaining artifacts after a failure
    #[arg(long)]
    pub keep_going: bool,
}

pub async fn execute(args: DownloadArgs, ctx: &Context, output: &Output) -> Result<i32> {
    let targets = ctx.table.select(&args.platforms)?;
    let options = PipelineOptions::bulk();

    output.info(&format!(
        "Downloading {} for {} platform(s) into {}",
        ctx.tag,
        targets.len(),
        args.out.display()
    ));

    let mut failures = Vec::new();

    for target in targets {
        output.section(&target.platform);

        for artifact in &target.artifacts {
            let dest = args.out.join(&target.platform).join(&artifact.dest);

            if let Err(e) = ctx.stage(artifact, &dest, &options, output).await {
                if !args.keep_going {
                    return Err(e.into());
                }
                output.warning(&format!("{:#}", anyhow::Error::from(e)));
                failures.push(format!("{}/{}", target.platform, artifact_label(artifact)));
            }
        }
    }

    if !failures.is_empty() {
        output.warning(&format!("{} artifact(s) failed: {}", failures.len(), failures.join(", ")));
        return Ok(1);
    }

    output.success(&format!("Downloaded {} into {}", ctx.tag, args.out.display()));
    Ok(0)
}
