//! Gzip tar extraction.
//!
//! Extraction normally shells out to the system `tar`, trying a list of
//! candidate executables in order. An in-process extractor (`tar` + `flate2`)
//! can be put in the list for environments without a usable binary.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use flate2::read::GzDecoder;

use super::StageError;

/// One way of extracting a `.tar.gz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractStrategy {
    /// Run `<program> -xzf <archive> -C <dir>`.
    Command(PathBuf),
    /// Extract in-process.
    Builtin,
}

impl ExtractStrategy {
    /// Candidate executables for the current platform, in the order tried.
    pub fn platform_defaults() -> Vec<Self> {
        let mut candidates = Vec::new();

        if cfg!(windows) {
            // Ships with Windows 10+, and wins over a GNU tar from Git Bash on PATH
            candidates.push(ExtractStrategy::Command(PathBuf::from(r"C:\Windows\System32\tar.exe")));
        }
        candidates.push(ExtractStrategy::Command(PathBuf::from("tar")));
        if cfg!(target_os = "macos") {
            candidates.push(ExtractStrategy::Command(PathBuf::from("bsdtar")));
        }

        candidates
    }

    fn describe(&self) -> String {
        match self {
            ExtractStrategy::Command(program) => program.display().to_string(),
            ExtractStrategy::Builtin => "builtin extractor".to_string(),
        }
    }

    async fn run(&self, archive: &Path, dest: &Path) -> Result<(), String> {
        match self {
            ExtractStrategy::Command(program) => {
                let status = tokio::process::Command::new(program)
                    .arg("-xzf")
                    .arg(archive)
                    .arg("-C")
                    .arg(dest)
                    .stdin(Stdio::null())
                    .status()
                    .await
                    .map_err(|e| format!("{}: {}", program.display(), e))?;

                if status.success() {
                    Ok(())
                } else {
                    Err(format!("{} exited with {}", program.display(), status))
                }
            }
            ExtractStrategy::Builtin => {
                let archive = archive.to_path_buf();
                let dest = dest.to_path_buf();
                tokio::task::spawn_blocking(move || extract_tar_gz(&archive, &dest))
                    .await
                    .map_err(|e| e.to_string())?
                    .map_err(|e| e.to_string())
            }
        }
    }
}

/// Tries each strategy in turn; the first success wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extractor {
    strategies: Vec<ExtractStrategy>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractStrategy::platform_defaults())
    }
}

impl Extractor {
    pub fn new(strategies: Vec<ExtractStrategy>) -> Self {
        Self { strategies }
    }

    /// In-process extraction only.
    pub fn builtin() -> Self {
        Self::new(vec![ExtractStrategy::Builtin])
    }

    pub fn strategies(&self) -> &[ExtractStrategy] {
        &self.strategies
    }

    /// Extract `archive` into `dest`, creating `dest` if needed.
    ///
    /// If every strategy fails, the error carries the last failure seen.
    pub async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), StageError> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| StageError::io(dest, e))?;

        let mut last_error = None;

        for strategy in &self.strategies {
            log::debug!("Extracting {} with {}", archive.display(), strategy.describe());
            match strategy.run(archive, dest).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::debug!("Extraction with {} failed: {}", strategy.describe(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(StageError::Extraction {
            last_error: last_error.unwrap_or_else(|| "no extraction strategy configured".to_string()),
        })
    }
}

/// Extract a gzipped tar archive into `dest_dir` without stripping anything.
pub(crate) fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), StageError> {
    let file = File::open(archive_path).map_err(|e| StageError::io(archive_path, e))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);

    let entries = archive
        .entries()
        .map_err(|e| StageError::io(archive_path, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| StageError::io(archive_path, e))?;

        let path = entry
            .path()
            .map_err(|e| StageError::io(archive_path, e))?
            .into_owned();

        // Reject absolute paths and parent traversal outright
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(StageError::UnsafePath(path.display().to_string()));
        }

        let unpacked = entry
            .unpack_in(dest_dir)
            .map_err(|e| StageError::io(&dest_dir.join(&path), e))?;

        if !unpacked {
            return Err(StageError::UnsafePath(path.display().to_string()));
        }
    }

    Ok(())
}
