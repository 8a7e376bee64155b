//! Configuration and pipeline shared by the network commands.

use anyhow::{Context as _, Result};
use std::path::Path;

use skiapkg_fetch::{
    ArtifactRequest, ArtifactSpec, Fetcher, Pipeline, PipelineOptions, PipelineOutcome, ReleaseTag, SkiapkgConfig,
    Stage, Stager, TargetTable,
};

use crate::output::Output;

pub struct Context {
    pub tag: ReleaseTag,
    pub table: TargetTable,
    pipeline: Pipeline,
}

impl Context {
    /// Load `skiapkg.toml` (explicit path, or searched upward from the
    /// current directory) and build the pipeline it describes.
    pub fn load(config_path: Option<&Path>, milestone: Option<&str>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => SkiapkgConfig::load_file(path)?,
            None => {
                let cwd = std::env::current_dir().context("Failed to determine current directory")?;
                SkiapkgConfig::load(&cwd)?.unwrap_or_default()
            }
        };

        if let Some(milestone) = milestone {
            config.release.milestone = milestone.to_string();
        }

        let tag = config.release.release_tag()?;
        let source = config.release.source()?;
        let fetcher = Fetcher::with_config(config.http.fetcher_config()).context("Failed to create HTTP client")?;

        log::debug!("Release {} from {}", tag, source.base_url());

        Ok(Self {
            tag,
            table: config.target_table(),
            pipeline: Pipeline::new(fetcher, Stager::default(), source),
        })
    }

    /// Run one artifact through the pipeline with a spinner.
    pub async fn stage(
        &self,
        artifact: &ArtifactSpec,
        dest: &Path,
        options: &PipelineOptions,
        output: &Output,
    ) -> skiapkg_fetch::Result<PipelineOutcome> {
        let request = ArtifactRequest::new(&artifact.name, self.tag.to_string(), dest)
            .with_source_subdir(artifact.source_subdir.as_deref());
        let label = artifact_label(artifact);

        let spinner = output.spinner(&format!("Fetching {}", label));
        let result = self
            .pipeline
            .fetch_and_stage_with_progress(&request, options, |stage| {
                if let Some(message) = stage_message(stage, &label) {
                    // Printed as well as shown on the spinner, which is hidden without a terminal
                    spinner.suspend(|| output.info(&message));
                    spinner.set_message(message);
                }
            })
            .await;
        spinner.finish_and_clear();

        match &result {
            Ok(PipelineOutcome::Staged(report)) => {
                output.list_item("+", &format!("{} -> {}", label, report.destination.display()));
                output.verbose(&format!(
                    "    {} files, {} directories, {} symlinks, {} skipped",
                    report.stats.files, report.stats.dirs, report.stats.symlinks, report.stats.skipped
                ));
            }
            Ok(PipelineOutcome::Skipped) => output.verbose(&format!("Skipped {}", label)),
            Err(_) => {}
        }

        result
    }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| anyhow::anyhow!("Failed to create async runtime: {}", e))
}

/// The line announced when an artifact enters `stage`, if any.
pub fn stage_message(stage: Stage, label: &str) -> Option<String> {
    match stage {
        Stage::Downloading => Some(format!("Downloading {}", label)),
        Stage::Extracting => Some(format!("Extracting {}", label)),
        _ => None,
    }
}

/// `skia-macos (arm64)`, or just the name without a subdirectory.
pub fn artifact_label(artifact: &ArtifactSpec) -> String {
    match &artifact.source_subdir {
        Some(subdir) => format!("{} ({})", artifact.name, subdir),
        None => artifact.name.clone(),
    }
}
