//! Payload root discovery inside an extracted archive.

use std::fs;
use std::path::{Path, PathBuf};

use super::StageError;

/// Find the directory whose contents should be installed.
///
/// A single top-level directory is treated as a wrapper and descended into.
/// If `source_subdir` then names a directory directly below, that is used
/// instead. An extraction directory with no entries at all is an error.
pub fn locate_payload_root(extract_dir: &Path, source_subdir: Option<&str>) -> Result<PathBuf, StageError> {
    let entries = fs::read_dir(extract_dir)
        .map_err(|e| StageError::io(extract_dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StageError::io(extract_dir, e))?;

    if entries.is_empty() {
        return Err(StageError::EmptyArchive { path: extract_dir.to_path_buf() });
    }

    let mut root = extract_dir.to_path_buf();

    if let [only] = entries.as_slice() {
        let is_dir = only
            .file_type()
            .map_err(|e| StageError::io(&only.path(), e))?
            .is_dir();
        if is_dir {
            root = only.path();
        }
    }

    if let Some(subdir) = source_subdir {
        let candidate = root.join(subdir);
        if candidate.is_dir() {
            root = candidate;
        } else {
            log::debug!(
                "Subdirectory {} not found under {}, using it as payload root",
                subdir,
                root.display()
            );
        }
    }

    Ok(root)
}
