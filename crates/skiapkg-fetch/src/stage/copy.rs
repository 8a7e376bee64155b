//! Recursive copy of a payload tree.
//!
//! The walk is split in two: [`plan_copy`] turns a list of classified entries
//! into copy operations, and [`copy_tree`] feeds it a `walkdir` traversal and
//! applies the result.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::StageError;

/// Kind of filesystem entry, as far as copying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
    /// Sockets, FIFOs, block and character devices.
    Special,
}

impl EntryKind {
    /// Classify without following symlinks.
    pub fn from_file_type(file_type: fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Special
        }
    }
}

/// A single step of a copy, with a path relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOp {
    CreateDir(PathBuf),
    CopyFile(PathBuf),
    Symlink(PathBuf),
    Skip(PathBuf),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub dirs: usize,
    pub symlinks: usize,
    pub skipped: usize,
}

/// Map walked entries (parents before children) to copy operations.
pub fn plan_copy<I>(entries: I) -> Vec<CopyOp>
where
    I: IntoIterator<Item = (PathBuf, EntryKind)>,
{
    entries
        .into_iter()
        .map(|(relative, kind)| match kind {
            EntryKind::Dir => CopyOp::CreateDir(relative),
            EntryKind::File => CopyOp::CopyFile(relative),
            EntryKind::Symlink => CopyOp::Symlink(relative),
            EntryKind::Special => CopyOp::Skip(relative),
        })
        .collect()
}

/// Copy the contents of `src` into `dest`, creating `dest` if needed.
///
/// Existing files in `dest` are overwritten; anything else already there is
/// left alone. Special files are skipped.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<CopyStats, StageError> {
    fs::create_dir_all(dest).map_err(|e| StageError::io(dest, e))?;

    let mut entries = Vec::new();
    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            StageError::io(&path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .unwrap_or(entry.path())
            .to_path_buf();
        entries.push((relative, EntryKind::from_file_type(entry.file_type())));
    }

    let mut stats = CopyStats::default();

    for op in plan_copy(entries) {
        match op {
            CopyOp::CreateDir(relative) => {
                let target = dest.join(&relative);
                fs::create_dir_all(&target).map_err(|e| StageError::io(&target, e))?;
                stats.dirs += 1;
            }
            CopyOp::CopyFile(relative) => {
                let target = dest.join(&relative);
                remove_if_read_only(&target)?;
                fs::copy(src.join(&relative), &target).map_err(|e| StageError::io(&target, e))?;
                stats.files += 1;
            }
            CopyOp::Symlink(relative) => {
                copy_symlink(&src.join(&relative), &dest.join(&relative))?;
                stats.symlinks += 1;
            }
            CopyOp::Skip(relative) => {
                log::debug!("Skipping special file {}", src.join(&relative).display());
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}

/// `fs::copy` carries the source mode over, so a read-only payload file
/// (headers are often 0444) cannot be opened for writing on the next merge.
fn remove_if_read_only(target: &Path) -> Result<(), StageError> {
    match fs::symlink_metadata(target) {
        Ok(metadata) if metadata.is_file() && metadata.permissions().readonly() => {
            fs::remove_file(target).map_err(|e| StageError::io(target, e))
        }
        _ => Ok(()),
    }
}

/// Recreate a symlink (framework bundles rely on `Versions/Current`).
#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> Result<(), StageError> {
    let link = fs::read_link(source).map_err(|e| StageError::io(source, e))?;

    if fs::symlink_metadata(target).is_ok() {
        fs::remove_file(target).map_err(|e| StageError::io(target, e))?;
    }

    std::os::unix::fs::symlink(&link, target).map_err(|e| StageError::io(target, e))
}

/// Without reliable symlink support, copy whatever the link points at.
#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> Result<(), StageError> {
    let metadata = fs::metadata(source).map_err(|e| StageError::io(source, e))?;
    if metadata.is_dir() {
        copy_tree(source, target).map(|_| ())
    } else {
        fs::copy(source, target).map(|_| ()).map_err(|e| StageError::io(target, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn listing(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| {
                e.unwrap()
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_plan_skips_special_entries() {
        let plan = plan_copy(vec![
            (PathBuf::from("lib"), EntryKind::Dir),
            (PathBuf::from("lib/libskia.a"), EntryKind::File),
            (PathBuf::from("lib/pipe"), EntryKind::Special),
            (PathBuf::from("Current"), EntryKind::Symlink),
        ]);

        assert_eq!(
            plan,
            vec![
                CopyOp::CreateDir(PathBuf::from("lib")),
                CopyOp::CopyFile(PathBuf::from("lib/libskia.a")),
                CopyOp::Skip(PathBuf::from("lib/pipe")),
                CopyOp::Symlink(PathBuf::from("Current")),
            ]
        );
    }

    #[test]
    fn test_copies_nested_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("lib/libskia.a"), "lib");
        touch(&src.join("include/core/SkCanvas.h"), "header");
        touch(&src.join("LICENSE"), "bsd");

        let dest = temp.path().join("dest");
        let stats = copy_tree(&src, &dest).unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.dirs, 3);
        assert_eq!(stats.skipped, 0);
        assert_eq!(listing(&src), listing(&dest));
        assert_eq!(fs::read_to_string(dest.join("include/core/SkCanvas.h")).unwrap(), "header");
    }

    #[test]
    fn test_merge_overwrites_files_and_keeps_others() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("libskia.a"), "new");

        let dest = temp.path().join("dest");
        touch(&dest.join("libskia.a"), "old");
        touch(&dest.join("README.md"), "keep me");

        copy_tree(&src, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("libskia.a")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dest.join("README.md")).unwrap(), "keep me");
    }

    #[test]
    fn test_copy_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("a/b/c.txt"), "c");

        let dest = temp.path().join("dest");
        copy_tree(&src, &dest).unwrap();
        let first = listing(&dest);
        copy_tree(&src, &dest).unwrap();

        assert_eq!(first, listing(&dest));
    }

    #[cfg(unix)]
    #[test]
    fn test_merge_twice_over_read_only_files() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let header = src.join("include/SkTypes.h");
        touch(&header, "v1");
        fs::set_permissions(&header, fs::Permissions::from_mode(0o444)).unwrap();

        let dest = temp.path().join("dest");
        copy_tree(&src, &dest).unwrap();
        let copied = dest.join("include/SkTypes.h");
        assert!(fs::metadata(&copied).unwrap().permissions().readonly());

        fs::set_permissions(&header, fs::Permissions::from_mode(0o644)).unwrap();
        fs::write(&header, "v2").unwrap();
        fs::set_permissions(&header, fs::Permissions::from_mode(0o444)).unwrap();

        let stats = copy_tree(&src, &dest).unwrap();

        assert_eq!(stats.files, 1);
        assert_eq!(fs::read_to_string(&copied).unwrap(), "v2");
        assert_eq!(fs::metadata(&copied).unwrap().permissions().mode() & 0o777, 0o444);
    }

    #[test]
    fn test_remove_if_read_only_leaves_writable_files() {
        let temp = TempDir::new().unwrap();
        let writable = temp.path().join("libskia.a");
        touch(&writable, "lib");

        remove_if_read_only(&writable).unwrap();
        remove_if_read_only(&temp.path().join("missing")).unwrap();

        assert!(writable.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_socket_is_skipped() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("libskia.a"), "lib");
        let _listener = std::os::unix::net::UnixListener::bind(src.join("agent.sock")).unwrap();

        let dest = temp.path().join("dest");
        let stats = copy_tree(&src, &dest).unwrap();

        assert_eq!(stats.files, 1);
        assert_eq!(stats.skipped, 1);
        assert!(dest.join("libskia.a").is_file());
        assert!(fs::symlink_metadata(dest.join("agent.sock")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_named_pipe_is_skipped() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("lib/libskia.a"), "lib");

        let made_fifo = std::process::Command::new("mkfifo")
            .arg(src.join("lib/pipe"))
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !made_fifo {
            return;
        }

        let dest = temp.path().join("dest");
        let stats = copy_tree(&src, &dest).unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(listing(&dest), vec!["lib", "lib/libskia.a"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_recreated() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("Skia.framework/Versions/A/Skia"), "bin");
        std::os::unix::fs::symlink("A", src.join("Skia.framework/Versions/Current")).unwrap();

        let dest = temp.path().join("dest");
        let stats = copy_tree(&src, &dest).unwrap();
        // Second run must replace the existing link rather than fail
        copy_tree(&src, &dest).unwrap();

        assert_eq!(stats.symlinks, 1);
        let link = dest.join("Skia.framework/Versions/Current");
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("A"));
        assert_eq!(fs::read_to_string(link.join("Skia")).unwrap(), "bin");
    }
}
