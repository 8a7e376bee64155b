//! Archive staging: extraction, payload discovery and copying.

mod copy;
mod extract;
mod payload;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use copy::{copy_tree, plan_copy, CopyOp, CopyStats, EntryKind};
pub use extract::{ExtractStrategy, Extractor};
pub use payload::locate_payload_root;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("Failed to extract archive: {last_error}")]
    Extraction { last_error: String },

    #[error("Archive extracted but no contents found in {}", path.display())]
    EmptyArchive { path: PathBuf },

    #[error("Unsafe path in archive: {0}")]
    UnsafePath(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Staging task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StageError::Io { path: path.to_path_buf(), source }
    }
}

/// What happens to an existing destination before the payload is copied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationPolicy {
    /// Remove the destination first, so it holds only the new payload.
    Replace,
    /// Copy item by item on top of whatever is already there.
    #[default]
    Merge,
}

/// Summary of a completed staging run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub destination: PathBuf,
    /// Payload root relative to the extraction directory (empty if the
    /// extraction directory itself was used).
    pub payload_root: PathBuf,
    pub stats: CopyStats,
}

/// Extracts archives and places their payload.
#[derive(Debug, Clone, Default)]
pub struct Stager {
    extractor: Extractor,
}

impl Stager {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Extract `archive` into `extract_dir`, locate the payload root and copy
    /// it into `dest`.
    ///
    /// Convenience entry point for callers that already have the archive on
    /// disk. [`Pipeline`](crate::Pipeline) runs [`Extractor::extract`],
    /// [`locate`](Self::locate) and [`place`](Self::place) one at a time so it
    /// can report the stage it is in.
    pub async fn extract_and_place(
        &self,
        archive: &Path,
        extract_dir: &Path,
        dest: &Path,
        source_subdir: Option<&str>,
        policy: DestinationPolicy,
    ) -> Result<StageReport, StageError> {
        self.extractor.extract(archive, extract_dir).await?;
        let root = self.locate(extract_dir, source_subdir).await?;
        self.place(extract_dir, &root, dest, policy).await
    }

    /// Blocking payload discovery, run off the async executor.
    pub async fn locate(&self, extract_dir: &Path, source_subdir: Option<&str>) -> Result<PathBuf, StageError> {
        let extract_dir = extract_dir.to_path_buf();
        let source_subdir = source_subdir.map(str::to_string);
        tokio::task::spawn_blocking(move || locate_payload_root(&extract_dir, source_subdir.as_deref())).await?
    }

    /// Copy the payload at `root` into `dest` according to `policy`.
    pub async fn place(
        &self,
        extract_dir: &Path,
        root: &Path,
        dest: &Path,
        policy: DestinationPolicy,
    ) -> Result<StageReport, StageError> {
        let root = root.to_path_buf();
        let dest = dest.to_path_buf();
        let payload_root = root.strip_prefix(extract_dir).unwrap_or(&root).to_path_buf();

        tokio::task::spawn_blocking(move || {
            if policy == DestinationPolicy::Replace && dest.exists() {
                std::fs::remove_dir_all(&dest).map_err(|e| StageError::io(&dest, e))?;
            }
            let stats = copy_tree(&root, &dest)?;
            Ok(StageReport { destination: dest, payload_root, stats })
        })
        .await?
    }
}
