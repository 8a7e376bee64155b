mod commands;
mod context;
mod output;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::{download, generate, install, version};
use context::{runtime, Context};
use output::{Output, Verbosity};

#[derive(Parser, Debug)]
#[command(name = "skiapkg")]
#[command(about = "Download and package prebuilt Skia binaries")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to skiapkg.toml (default: search upward from the current directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Release milestone to fetch, e.g. m144 or m144a (overrides the config file)
    #[arg(short, long, global = true)]
    milestone: Option<String>,

    /// Do not output any message
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download release artifacts into a directory tree
    Download(download::DownloadArgs),

    /// Generate per-platform packages with their binaries
    Generate(generate::GenerateArgs),

    /// Install binaries for one platform (post-install hook)
    Install(install::InstallArgs),

    /// Print the package version for a milestone
    Version(version::VersionArgs),
}

fn init_logging(verbosity: Verbosity) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(verbosity.log_filter()))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(args: Args, output: &Output) -> Result<i32> {
    let config = args.config.as_deref();
    let milestone = args.milestone.as_deref();

    match args.command {
        Commands::Download(download_args) => {
            let ctx = Context::load(config, milestone)?;
            runtime()?.block_on(download::execute(download_args, &ctx, output))
        }
        Commands::Generate(generate_args) => {
            let ctx = Context::load(config, milestone)?;
            runtime()?.block_on(generate::execute(generate_args, &ctx, output))
        }
        Commands::Install(install_args) => {
            let skip = install::skip_requested(std::env::var(install::SKIP_DOWNLOAD_ENV).ok().as_deref());
            install::run(install_args, config, milestone, output, skip)
        }
        // Needs neither config nor network
        Commands::Version(version_args) => version::execute(version_args),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);
    init_logging(verbosity);

    let output = Output::new(verbosity);
    match run(args, &output) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            output.error(&e);
            ExitCode::FAILURE
        }
    }
}
