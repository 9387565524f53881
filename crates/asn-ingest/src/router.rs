//! File lifecycle router
//!
//! Moves a manifest out of the inbox once its outcome is known: into the
//! archive folder after a commit, into the failed folder after an error.
//! Existing files are never overwritten; a clashing name gets a sortable
//! timestamp suffix between stem and extension.

use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::FolderConfig;
use crate::error::IngestError;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct FileRouter {
    archive_dir: PathBuf,
    failed_dir: PathBuf,
}

impl FileRouter {
    pub fn new(archive_dir: impl Into<PathBuf>, failed_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            failed_dir: failed_dir.into(),
        }
    }

    pub fn from_folders(folders: &FolderConfig) -> Self {
        Self::new(folders.archive_path(), folders.failed_path())
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn failed_dir(&self) -> &Path {
        &self.failed_dir
    }

    /// Archive a committed file, returning where it landed
    pub async fn on_success(&self, path: &Path) -> io::Result<PathBuf> {
        let destination = relocate(path, &self.archive_dir).await?;
        info!(
            from = %path.display(),
            to = %destination.display(),
            "Archived manifest"
        );
        Ok(destination)
    }

    /// Move a failed file aside and hand back the error to propagate.
    ///
    /// That is `cause` itself when the move succeeds, or
    /// [`IngestError::FailureRouting`] wrapping both errors when it does not.
    pub async fn on_failure(&self, path: &Path, cause: IngestError) -> IngestError {
        match relocate(path, &self.failed_dir).await {
            Ok(destination) => {
                error!(
                    from = %path.display(),
                    to = %destination.display(),
                    error = %cause,
                    "Manifest ingestion failed, moved to failed folder"
                );
                cause
            }
            Err(source) => {
                error!(
                    path = %path.display(),
                    error = %cause,
                    move_error = %source,
                    "Manifest ingestion failed and could not be moved"
                );
                IngestError::FailureRouting {
                    path: path.to_path_buf(),
                    source,
                    cause: Box::new(cause),
                }
            }
        }
    }
}

/// Create `dir` if needed and rename `path` into it exactly once
async fn relocate(path: &Path, dir: &Path) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' has no file name", path.display()),
        )
    })?;

    let destination = available_destination(dir, Path::new(file_name), Local::now()).await?;
    tokio::fs::rename(path, &destination).await?;
    Ok(destination)
}

/// `dir/name` when free, otherwise `dir/stem_<timestamp>.ext`, then
/// `dir/stem_<timestamp>_<n>.ext` if several collide within one second
async fn available_destination(
    dir: &Path,
    file_name: &Path,
    now: DateTime<Local>,
) -> io::Result<PathBuf> {
    let plain = dir.join(file_name);
    if !tokio::fs::try_exists(&plain).await? {
        return Ok(plain);
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = now.format(TIMESTAMP_FORMAT);

    let stamped = dir.join(format!("{stem}_{stamp}{extension}"));
    if !tokio::fs::try_exists(&stamped).await? {
        return Ok(stamped);
    }

    let mut counter: u32 = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{stamp}_{counter}{extension}"));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn router(root: &TempDir) -> FileRouter {
        FileRouter::new(root.path().join("archive"), root.path().join("failed"))
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_success_creates_archive_and_moves() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("asn.txt");
        std::fs::write(&source, b"HDR A 1\n").unwrap();

        let destination = router(&root).on_success(&source).await.unwrap();

        assert!(!source.exists());
        assert_eq!(destination, root.path().join("archive").join("asn.txt"));
        assert_eq!(std::fs::read(&destination).unwrap(), b"HDR A 1\n");
    }

    #[tokio::test]
    async fn test_collision_gets_timestamp_suffix() {
        let root = TempDir::new().unwrap();
        let router = router(&root);
        let inbox = root.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();

        let source = inbox.join("asn.txt");
        std::fs::write(&source, b"first").unwrap();
        router.on_success(&source).await.unwrap();
        std::fs::write(&source, b"second").unwrap();
        let second = router.on_success(&source).await.unwrap();

        let names = files_in(router.archive_dir());
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"asn.txt".to_string()));
        let stamped = second.file_name().unwrap().to_string_lossy().into_owned();
        assert!(stamped.starts_with("asn_") && stamped.ends_with(".txt"), "{stamped}");
        assert_eq!(std::fs::read(router.archive_dir().join("asn.txt")).unwrap(), b"first");
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_repeated_collisions_within_one_second_get_counter() {
        let dir = TempDir::new().unwrap();
        let now = Local.with_ymd_and_hms(2025, 9, 17, 17, 5, 15).unwrap();
        std::fs::write(dir.path().join("asn.txt"), b"").unwrap();
        std::fs::write(dir.path().join("asn_20250917_170515.txt"), b"").unwrap();

        let next = available_destination(dir.path(), Path::new("asn.txt"), now)
            .await
            .unwrap();
        assert_eq!(next, dir.path().join("asn_20250917_170515_1.txt"));
    }

    #[tokio::test]
    async fn test_name_without_extension() {
        let dir = TempDir::new().unwrap();
        let now = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        std::fs::write(dir.path().join("MANIFEST"), b"").unwrap();

        let next = available_destination(dir.path(), Path::new("MANIFEST"), now)
            .await
            .unwrap();
        assert_eq!(next, dir.path().join("MANIFEST_20250102_030405"));
    }

    #[tokio::test]
    async fn test_failure_moves_file_and_returns_cause() {
        let root = TempDir::new().unwrap();
        let router = router(&root);
        let source = root.path().join("bad.txt");
        std::fs::write(&source, b"HDR A 1\n").unwrap();

        let err = router
            .on_failure(&source, IngestError::PersistenceConflict("boxes".into()))
            .await;

        assert!(err.is_conflict());
        assert!(!source.exists());
        assert_eq!(files_in(router.failed_dir()), vec!["bad.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_move_wraps_both_errors() {
        let root = TempDir::new().unwrap();
        let router = router(&root);
        let missing = root.path().join("gone.txt");

        let err = router.on_failure(&missing, IngestError::Cancelled).await;

        match err {
            IngestError::FailureRouting { path, cause, .. } => {
                assert_eq!(path, missing);
                assert!(matches!(*cause, IngestError::Cancelled));
            }
            other => panic!("expected FailureRouting, got {other:?}"),
        }
    }
}
