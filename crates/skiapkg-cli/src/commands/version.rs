//! Version command - print the package version for a milestone.

use anyhow::Result;
use clap::Args;

use skiapkg_fetch::milestone_to_semver;

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Milestone such as m144 or m144a
    pub milestone: String,
}

pub fn execute(args: VersionArgs) -> Result<i32> {
    let version = milestone_to_semver(&args.milestone)?;
    println!("{}", version);
    Ok(0)
}
