//! Startup discovery of the log files under each configured root.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::events::{self, FsEvents};
use crate::offsets::OffsetStore;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to resolve root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error walking directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("error initializing file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Watch(#[from] events::Error),
}

/// Result of seeding a single root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScanSummary {
    /// The canonical form of the scanned root.
    pub root: PathBuf,
    /// Number of log files whose offsets were seeded.
    pub files: usize,
}

/// Seeds the [`OffsetStore`] with the current end of every log file under a
/// root, so only lines written afterwards are ever streamed.
///
/// Any failure is fatal to the scan; a partially seeded root is never
/// reported as success.
#[derive(Clone, Debug)]
pub struct DirectoryScanner {
    offsets: Arc<OffsetStore>,
}

impl DirectoryScanner {
    pub fn new(offsets: Arc<OffsetStore>) -> Self {
        DirectoryScanner { offsets }
    }

    /// Seeds every log file under `root` and registers `root` with `events`.
    pub fn scan_root(
        &self,
        root: impl AsRef<Path>,
        events: &mut FsEvents,
    ) -> Result<ScanSummary, ScanError> {
        let summary = self.seed(root)?;
        events.watch_root(&summary.root)?;

        info!(
            root = %summary.root.display(),
            files = summary.files,
            "watching log directory"
        );

        Ok(summary)
    }

    /// Recursively seeds every log file under `root` at its current size.
    ///
    /// Symlinked directories are followed.
    pub fn seed(&self, root: impl AsRef<Path>) -> Result<ScanSummary, ScanError> {
        let root = root.as_ref();
        let root = events::absolutify(root).map_err(|source| ScanError::Root {
            path: root.to_path_buf(),
            source,
        })?;

        let mut files = 0;
        for entry in WalkDir::new(&root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() || !events::is_log_file(entry.path()) {
                continue;
            }

            let path = entry.path();
            let size = file_size(path).map_err(|source| ScanError::Open {
                path: path.to_path_buf(),
                source,
            })?;

            self.offsets.set(path, size);
            files += 1;
            debug!(path = %path.display(), offset = size, "seeded log file");
        }

        Ok(ScanSummary { root, files })
    }
}

fn file_size(path: &Path) -> io::Result<u64> {
    let file = File::open(path)?;
    Ok(file.metadata()?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_seed_at_end_of_file() {
        let tmp_dir = tempdir().unwrap();
        let nested = tmp_dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp_dir.path().join("top.log"), b"0123456789").unwrap();
        std::fs::write(nested.join("deep.log"), b"abc\n").unwrap();
        std::fs::write(nested.join("notes.txt"), b"ignored").unwrap();
        std::fs::write(nested.join("old.log.1"), b"ignored").unwrap();

        let offsets = Arc::new(OffsetStore::new());
        let summary = DirectoryScanner::new(Arc::clone(&offsets))
            .seed(tmp_dir.path())
            .unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets.get(summary.root.join("top.log")), 10);
        assert_eq!(offsets.get(summary.root.join("a/b/deep.log")), 4);
        assert!(!offsets.contains(summary.root.join("a/b/notes.txt")));
    }

    #[test]
    fn test_directory_named_log_skipped() {
        let tmp_dir = tempdir().unwrap();
        std::fs::create_dir(tmp_dir.path().join("archive.log")).unwrap();

        let offsets = Arc::new(OffsetStore::new());
        let summary = DirectoryScanner::new(Arc::clone(&offsets))
            .seed(tmp_dir.path())
            .unwrap();

        assert_eq!(summary.files, 0);
        assert!(offsets.is_empty());
    }

    #[test]
    fn test_missing_root_fails() {
        let tmp_dir = tempdir().unwrap();
        let missing = tmp_dir.path().join("missing");

        let scanner = DirectoryScanner::new(Arc::new(OffsetStore::new()));
        assert!(matches!(
            scanner.seed(&missing),
            Err(ScanError::Root { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_follows_symlinked_dirs() {
        let tmp_dir = tempdir().unwrap();
        let target = tempdir().unwrap();
        std::fs::write(target.path().join("linked.log"), b"12345").unwrap();
        std::os::unix::fs::symlink(target.path(), tmp_dir.path().join("link")).unwrap();

        let offsets = Arc::new(OffsetStore::new());
        let summary = DirectoryScanner::new(Arc::clone(&offsets))
            .seed(tmp_dir.path())
            .unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(offsets.get(summary.root.join("link/linked.log")), 5);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_log_fails() {
        let tmp_dir = tempdir().unwrap();
        std::fs::write(tmp_dir.path().join("ok.log"), b"").unwrap();
        std::os::unix::fs::symlink(
            tmp_dir.path().join("gone.log"),
            tmp_dir.path().join("broken.log"),
        )
        .unwrap();

        let offsets = Arc::new(OffsetStore::new());
        let result = DirectoryScanner::new(offsets).seed(tmp_dir.path());

        assert!(matches!(
            result,
            Err(ScanError::Walk(_)) | Err(ScanError::Open { .. })
        ));
    }

    #[test]
    fn test_scan_root_registers_watch() {
        let tmp_dir = tempdir().unwrap();
        std::fs::write(tmp_dir.path().join("a.log"), b"").unwrap();

        let mut events = FsEvents::new().unwrap();
        let scanner = DirectoryScanner::new(Arc::new(OffsetStore::new()));
        let summary = scanner.scan_root(tmp_dir.path(), &mut events).unwrap();

        assert!(events.is_watching(&summary.root));
    }
}
