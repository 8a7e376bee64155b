//! Fetch-and-stage pipeline.
//!
//! One [`Pipeline::fetch_and_stage`] call moves a single artifact through
//! `Pending → Downloading → Extracting → LocatingPayload → Copying → Done`.
//! All intermediate files live in a scratch directory owned by the call,
//! which is removed whether the call succeeds or fails.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::http::Fetcher;
use crate::release::ReleaseSource;
use crate::stage::{DestinationPolicy, StageReport, Stager};
use crate::{Error, Result};

const SCRATCH_PREFIX: &str = "skiapkg-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Downloading,
    Extracting,
    LocatingPayload,
    Copying,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
            Stage::LocatingPayload => "locating payload",
            Stage::Copying => "copying",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A single downloadable unit and where it should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    artifact_name: String,
    release_tag: String,
    destination: PathBuf,
    source_subdir: Option<String>,
}

impl ArtifactRequest {
    pub fn new(artifact_name: impl Into<String>, release_tag: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            release_tag: release_tag.into(),
            destination: destination.into(),
            source_subdir: None,
        }
    }

    pub fn with_source_subdir(mut self, subdir: Option<impl Into<String>>) -> Self {
        self.source_subdir = subdir.map(Into::into);
        self
    }

    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    pub fn release_tag(&self) -> &str {
        &self.release_tag
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn source_subdir(&self) -> Option<&str> {
        self.source_subdir.as_deref()
    }
}

/// Per-call behaviour, chosen by the caller.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Do nothing at all (offline and test workflows).
    pub skip_download: bool,
    /// How an existing destination is treated.
    pub policy: DestinationPolicy,
    /// Remove the destination if the run fails.
    pub remove_destination_on_failure: bool,
    /// Parent directory for scratch directories; system temp dir if unset.
    pub scratch_root: Option<PathBuf>,
}

impl PipelineOptions {
    /// Post-install: start from an empty destination and leave nothing
    /// half-installed behind.
    pub fn post_install(skip_download: bool) -> Self {
        Self {
            skip_download,
            policy: DestinationPolicy::Replace,
            remove_destination_on_failure: true,
            scratch_root: None,
        }
    }

    /// Bulk generation: copy into whatever is there and keep partial state
    /// for inspection.
    pub fn bulk() -> Self {
        Self {
            skip_download: false,
            policy: DestinationPolicy::Merge,
            remove_destination_on_failure: false,
            scratch_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Staged(StageReport),
    Skipped,
}

pub struct Pipeline {
    fetcher: Fetcher,
    stager: Stager,
    source: ReleaseSource,
}

impl Pipeline {
    pub fn new(fetcher: Fetcher, stager: Stager, source: ReleaseSource) -> Self {
        Self { fetcher, stager, source }
    }

    pub fn source(&self) -> &ReleaseSource {
        &self.source
    }

    /// Download, extract and place one artifact.
    pub async fn fetch_and_stage(&self, request: &ArtifactRequest, options: &PipelineOptions) -> Result<PipelineOutcome> {
        self.fetch_and_stage_with_progress(request, options, |_| {}).await
    }

    /// Like [`fetch_and_stage`](Self::fetch_and_stage), calling `on_stage`
    /// each time the run enters a new stage (including `Done` or `Failed`).
    pub async fn fetch_and_stage_with_progress<F>(
        &self,
        request: &ArtifactRequest,
        options: &PipelineOptions,
        on_stage: F,
    ) -> Result<PipelineOutcome>
    where
        F: Fn(Stage),
    {
        if options.skip_download {
            log::info!("Skipping download of {} (downloads disabled)", request.artifact_name);
            return Ok(PipelineOutcome::Skipped);
        }

        let mut stage = Stage::Pending;
        match self.run(request, options, &mut stage, &on_stage).await {
            Ok(report) => {
                advance(&mut stage, Stage::Done, request, &on_stage);
                Ok(PipelineOutcome::Staged(report))
            }
            Err(e) => {
                let failed_at = stage;
                advance(&mut stage, Stage::Failed, request, &on_stage);
                log::error!("{} failed while {}: {}", request.artifact_name, failed_at, e);

                if options.remove_destination_on_failure {
                    remove_partial(&request.destination).await;
                }

                Err(Error::Pipeline {
                    artifact: request.artifact_name.clone(),
                    stage: failed_at,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn run<F>(
        &self,
        request: &ArtifactRequest,
        options: &PipelineOptions,
        stage: &mut Stage,
        on_stage: &F,
    ) -> Result<StageReport>
    where
        F: Fn(Stage),
    {
        let url = self.source.asset_url(&request.artifact_name, &request.release_tag)?;

        // Dropping the TempDir removes the archive and extraction tree on every exit path
        let scratch = match &options.scratch_root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?,
        };
        let archive = scratch
            .path()
            .join(format!("{}-{}.tar.gz", request.artifact_name, request.release_tag));
        let extract_dir = scratch.path().join("extract");

        advance(stage, Stage::Downloading, request, on_stage);
        log::info!("Downloading {}", url);
        self.fetcher.fetch(url.as_str(), &archive).await?;

        advance(stage, Stage::Extracting, request, on_stage);
        log::info!("Extracting {}", request.artifact_name);
        self.stager.extractor().extract(&archive, &extract_dir).await?;

        advance(stage, Stage::LocatingPayload, request, on_stage);
        let root = self.stager.locate(&extract_dir, request.source_subdir()).await?;

        advance(stage, Stage::Copying, request, on_stage);
        let report = self
            .stager
            .place(&extract_dir, &root, &request.destination, options.policy)
            .await?;

        log::info!(
            "Staged {} into {} ({} files, {} directories)",
            request.artifact_name,
            report.destination.display(),
            report.stats.files,
            report.stats.dirs
        );

        Ok(report)
    }
}

fn advance<F: Fn(Stage)>(stage: &mut Stage, next: Stage, request: &ArtifactRequest, on_stage: &F) {
    log::debug!("{}: {} -> {}", request.artifact_name, stage, next);
    *stage = next;
    on_stage(next);
}

async fn remove_partial(destination: &Path) {
    match tokio::fs::remove_dir_all(destination).await {
        Ok(()) => log::warn!("Removed incomplete {}", destination.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove incomplete {}: {}", destination.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{FetchError, FetcherConfig, Transport, TransportResponse};
    use crate::stage::{Extractor, StageError};
    use async_trait::async_trait;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const TAG: &str = "skia-m144";

    /// Serves the same response body (or status) for every request.
    struct FixedTransport {
        status: u16,
        body: Vec<u8>,
        hits: AtomicUsize,
    }

    impl FixedTransport {
        fn new(status: u16, body: Vec<u8>) -> Arc<Self> {
            Arc::new(Self { status, body, hits: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn get(&self, _url: &str) -> std::result::Result<TransportResponse, FetchError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(TransportResponse::from_bytes(self.status, self.body.clone()))
        }
    }

    fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn pipeline(transport: Arc<FixedTransport>) -> Pipeline {
        let fetcher = Fetcher::with_transport(transport, &FetcherConfig::default());
        let source = ReleaseSource::github("github.com", "acme", "skia-builds").unwrap();
        Pipeline::new(fetcher, Stager::new(Extractor::builtin()), source)
    }

    fn options(scratch: &Path, policy: DestinationPolicy) -> PipelineOptions {
        PipelineOptions {
            policy,
            scratch_root: Some(scratch.to_path_buf()),
            ..Default::default()
        }
    }

    fn scratch_is_empty(scratch: &Path) -> bool {
        std::fs::read_dir(scratch).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_stages_subdir_of_wrapper() {
        let archive = tar_gz(&[
            ("wrapper/ios/Skia.framework/Skia", "ios-bin"),
            ("wrapper/ios/SkiaGPU.framework/SkiaGPU", "ios-gpu"),
            ("wrapper/macos/Skia.framework/Skia", "mac-bin"),
        ]);
        let pipeline = pipeline(FixedTransport::new(200, archive));
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("scratch");
        let dest = temp.path().join("out/ios");

        let request = ArtifactRequest::new("skia-apple-xcframeworks", TAG, &dest).with_source_subdir(Some("ios"));
        let outcome = pipeline
            .fetch_and_stage(&request, &options(&scratch, DestinationPolicy::Merge))
            .await
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Skia.framework", "SkiaGPU.framework"]);
        assert_eq!(std::fs::read_to_string(dest.join("Skia.framework/Skia")).unwrap(), "ios-bin");

        match outcome {
            PipelineOutcome::Staged(report) => {
                assert_eq!(report.payload_root, PathBuf::from("wrapper/ios"));
                assert_eq!(report.stats.files, 2);
            }
            PipelineOutcome::Skipped => panic!("Expected a staged outcome"),
        }
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_skip_download_does_nothing() {
        let transport = FixedTransport::new(200, Vec::new());
        let pipeline = pipeline(transport.clone());
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out");

        let mut opts = options(&temp.path().join("scratch"), DestinationPolicy::Replace);
        opts.skip_download = true;
        let outcome = pipeline
            .fetch_and_stage(&ArtifactRequest::new("skia-linux-x64", TAG, &dest), &opts)
            .await
            .unwrap();

        assert_eq!(outcome, PipelineOutcome::Skipped);
        assert_eq!(transport.hits.load(Ordering::SeqCst), 0);
        assert!(!dest.exists());
        assert!(!temp.path().join("scratch").exists());
    }

    #[tokio::test]
    async fn test_empty_archive_fails_while_locating_payload() {
        let pipeline = pipeline(FixedTransport::new(200, tar_gz(&[])));
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("scratch");

        let err = pipeline
            .fetch_and_stage(
                &ArtifactRequest::new("skia-linux-x64", TAG, temp.path().join("out")),
                &options(&scratch, DestinationPolicy::Merge),
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::LocatingPayload));
        assert!(matches!(err.root(), Error::Stage(StageError::EmptyArchive { .. })));
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_not_found_fails_while_downloading() {
        let transport = FixedTransport::new(404, b"Not Found".to_vec());
        let pipeline = pipeline(transport.clone());
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("scratch");

        let err = pipeline
            .fetch_and_stage(
                &ArtifactRequest::new("skia-linux-x64", TAG, temp.path().join("out")),
                &options(&scratch, DestinationPolicy::Merge),
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Downloading));
        assert!(matches!(err.root(), Error::Fetch(FetchError::Status { status: 404, .. })));
        assert_eq!(transport.hits.load(Ordering::SeqCst), 1);
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_post_install_removes_partial_destination() {
        let pipeline = pipeline(FixedTransport::new(200, b"not an archive".to_vec()));
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.a"), "old").unwrap();

        let mut opts = PipelineOptions::post_install(false);
        opts.scratch_root = Some(temp.path().join("scratch"));
        let err = pipeline
            .fetch_and_stage(&ArtifactRequest::new("skia-linux-x64", TAG, &dest), &opts)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Extracting));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_bulk_leaves_partial_destination() {
        let pipeline = pipeline(FixedTransport::new(200, b"not an archive".to_vec()));
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("earlier.a"), "keep").unwrap();

        let mut opts = PipelineOptions::bulk();
        opts.scratch_root = Some(temp.path().join("scratch"));
        pipeline
            .fetch_and_stage(&ArtifactRequest::new("skia-linux-x64", TAG, &dest), &opts)
            .await
            .unwrap_err();

        assert!(dest.join("earlier.a").exists());
    }

    #[tokio::test]
    async fn test_replace_discards_previous_contents_and_is_idempotent() {
        let archive = tar_gz(&[("skia/lib/libskia.a", "lib"), ("skia/include/core.h", "h")]);
        let pipeline = pipeline(FixedTransport::new(200, archive));
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.a"), "old").unwrap();

        let opts = options(&temp.path().join("scratch"), DestinationPolicy::Replace);
        let request = ArtifactRequest::new("skia-linux-x64", TAG, &dest);

        let first = pipeline.fetch_and_stage(&request, &opts).await.unwrap();
        let second = pipeline.fetch_and_stage(&request, &opts).await.unwrap();

        assert_eq!(first, second);
        assert!(!dest.join("stale.a").exists());
        assert_eq!(std::fs::read_to_string(dest.join("lib/libskia.a")).unwrap(), "lib");
        assert!(dest.join("include/core.h").is_file());
    }

    #[tokio::test]
    async fn test_progress_reports_every_stage() {
        let archive = tar_gz(&[("skia/lib/libskia.a", "lib")]);
        let pipeline = pipeline(FixedTransport::new(200, archive));
        let temp = TempDir::new().unwrap();
        let seen = std::sync::Mutex::new(Vec::new());

        pipeline
            .fetch_and_stage_with_progress(
                &ArtifactRequest::new("skia-linux-x64", TAG, temp.path().join("out")),
                &options(&temp.path().join("scratch"), DestinationPolicy::Merge),
                |stage| seen.lock().unwrap().push(stage),
            )
            .await
            .unwrap();

        assert_eq!(
            seen.into_inner().unwrap(),
            vec![Stage::Downloading, Stage::Extracting, Stage::LocatingPayload, Stage::Copying, Stage::Done]
        );
    }

    #[tokio::test]
    async fn test_progress_reports_failure() {
        let pipeline = pipeline(FixedTransport::new(404, Vec::new()));
        let temp = TempDir::new().unwrap();
        let seen = std::sync::Mutex::new(Vec::new());

        pipeline
            .fetch_and_stage_with_progress(
                &ArtifactRequest::new("skia-linux-x64", TAG, temp.path().join("out")),
                &options(&temp.path().join("scratch"), DestinationPolicy::Merge),
                |stage| seen.lock().unwrap().push(stage),
            )
            .await
            .unwrap_err();

        assert_eq!(seen.into_inner().unwrap(), vec![Stage::Downloading, Stage::Failed]);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::LocatingPayload.to_string(), "locating payload");
        assert_eq!(Stage::Downloading.to_string(), "downloading");
    }

    #[test]
    fn test_request_accessors() {
        let request = ArtifactRequest::new("skia-android", TAG, "/tmp/out").with_source_subdir(Some("x86"));
        assert_eq!(request.artifact_name(), "skia-android");
        assert_eq!(request.release_tag(), TAG);
        assert_eq!(request.destination(), Path::new("/tmp/out"));
        assert_eq!(request.source_subdir(), Some("x86"));

        let request = request.with_source_subdir(None::<String>);
        assert_eq!(request.source_subdir(), None);
    }
}
