//! Everything related to watching log directories for modifications.

use std::collections::HashSet;
use std::fmt::{self, Debug, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task;

use futures_util::stream::Stream as FuturesStream;
use notify::event::{EventKind, ModifyKind};
use thiserror::Error;
use tokio::sync::mpsc;

/// File name suffix of every file that gets tailed.
pub const LOG_SUFFIX: &str = ".log";

/// Manages filesystem event watches for a set of root directories, and can be
/// polled to receive new events.
///
/// Internally, `FsEvents` contains a [`notify::Watcher`] from where
/// filesystem events are proxied into a tokio channel.
///
/// [`notify::Watcher`]: ../notify/trait.Watcher.html
pub struct FsEvents {
    inner: notify::RecommendedWatcher,
    /// Roots that are successfully being watched (recursively)
    watched_roots: HashSet<PathBuf>,
    event_stream: mpsc::UnboundedReceiver<Result<notify::Event, notify::Error>>,
}

impl Debug for FsEvents {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("FsEvents")
            .field("watched_roots", &self.watched_roots)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to start watcher: {0}")]
    Start(#[source] notify::Error),
    #[error("Failed to add {path} to watch: {source}")]
    AddFailure {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("Failed to resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error receiving event: {0}")]
    Event(#[from] io::Error),
}

impl FsEvents {
    /// Constructs a new `FsEvents` instance.
    pub fn new() -> Result<Self, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // The only way `send` can fail is if the receiver is dropped,
            // and `FsEvents` controls both.
            let _ = tx.send(res);
        })
        .map_err(Error::Start)?;

        Ok(FsEvents {
            inner,
            watched_roots: HashSet::new(),
            event_stream: rx,
        })
    }

    /// Returns `true` if `root` is already registered.
    pub fn is_watching(&self, root: impl AsRef<Path>) -> bool {
        self.watched_roots.contains(root.as_ref())
    }

    /// Recursively watches the given directory.
    ///
    /// Returns the canonicalized version of the path originally supplied, to
    /// match against the paths contained in each `notify::Event` received.
    /// Registering the same root twice is a no-op.
    pub fn watch_root(&mut self, root: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let root = root.as_ref();
        let root = absolutify(root).map_err(|source| Error::Resolve {
            path: root.to_path_buf(),
            source,
        })?;

        if !root.is_dir() {
            return Err(Error::NotADirectory(root));
        }

        if self.is_watching(&root) {
            return Ok(root);
        }

        notify::Watcher::watch(&mut self.inner, &root, notify::RecursiveMode::Recursive)
            .map_err(|source| Error::AddFailure {
                path: root.clone(),
                source,
            })?;

        self.watched_roots.insert(root.clone());

        Ok(root)
    }

    /// Wraps an existing event channel, with a watcher that never reports.
    #[cfg(test)]
    pub(crate) fn from_receiver(
        event_stream: mpsc::UnboundedReceiver<Result<notify::Event, notify::Error>>,
    ) -> Result<Self, Error> {
        let inner = notify::recommended_watcher(|_: notify::Result<notify::Event>| {})
            .map_err(Error::Start)?;

        Ok(FsEvents {
            inner,
            watched_roots: HashSet::new(),
            event_stream,
        })
    }

    /// Waits for the next filesystem event.
    ///
    /// Returns `None` once the underlying event channel has closed.
    pub async fn next_event(&mut self) -> Option<Result<notify::Event, Error>> {
        self.event_stream
            .recv()
            .await
            .map(|res| res.map_err(into_io_error).map_err(Error::from))
    }
}

impl FuturesStream for FsEvents {
    type Item = notify::Event;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        loop {
            match futures_util::ready!(self.event_stream.poll_recv(cx)) {
                Some(Ok(event)) => return task::Poll::Ready(Some(event)),
                // Errors are surfaced through `next_event` only
                Some(Err(_)) => continue,
                None => return task::Poll::Ready(None),
            }
        }
    }
}

fn into_io_error(e: notify::Error) -> io::Error {
    match e.kind {
        notify::ErrorKind::Io(io_err) => io_err,
        // Runtime event errors should only be std::io, but need to handle
        // this case anyway.
        kind => io::Error::new(io::ErrorKind::Other, format!("Event error: {:?}", kind)),
    }
}

/// Returns `true` if the file name of `path` ends with [`LOG_SUFFIX`].
pub fn is_log_file(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().ends_with(LOG_SUFFIX))
        .unwrap_or(false)
}

/// Returns `true` if the event kind signals that file contents were written.
///
/// Creation, rename, metadata and removal events don't qualify; a new file is
/// picked up with its first write.
pub fn is_write(kind: &EventKind) -> bool {
    // Some backends (Windows, polling) only report `Any` for modifications
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

/// Returns the log file paths of `event` that should be read, if any.
pub fn log_writes(event: &notify::Event) -> impl Iterator<Item = &PathBuf> {
    let qualifies = is_write(&event.kind);
    event
        .paths
        .iter()
        .filter(move |path| qualifies && is_log_file(path))
}

// Symlinks are resolved so that event paths match the ones seeded by the
// scanner.
pub(crate) fn absolutify(path: &Path) -> io::Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    path.canonicalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use std::time::Duration;
    use tempfile::tempdir;

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_is_log_file() {
        assert!(is_log_file("/logs/a.log"));
        assert!(is_log_file("nested/dir/.log"));
        assert!(!is_log_file("/logs/a.log.1"));
        assert!(!is_log_file("/logs/a.txt"));
        assert!(!is_log_file("/"));
    }

    #[test]
    fn test_only_writes_qualify() {
        let write = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/logs/a.log",
        );
        assert_eq!(log_writes(&write).count(), 1);

        let any = event(EventKind::Modify(ModifyKind::Any), "/logs/a.log");
        assert_eq!(log_writes(&any).count(), 1);

        for kind in [
            EventKind::Create(CreateKind::File),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            EventKind::Remove(RemoveKind::File),
        ] {
            assert_eq!(log_writes(&event(kind, "/logs/a.log")).count(), 0);
        }
    }

    #[test]
    fn test_non_log_paths_filtered() {
        let write = notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(PathBuf::from("/logs/a.log"))
            .add_path(PathBuf::from("/logs/b.txt"));

        let paths: Vec<_> = log_writes(&write).collect();
        assert_eq!(paths, vec![&PathBuf::from("/logs/a.log")]);
    }

    #[test]
    fn test_watch_file_is_err() {
        let tmp_dir = tempdir().expect("Failed to create tempdir");
        let file_path = tmp_dir.path().join("justa.log");
        std::fs::write(&file_path, b"").unwrap();

        let mut events = FsEvents::new().unwrap();
        assert!(matches!(
            events.watch_root(&file_path),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn test_watch_missing_dir_is_err() {
        let tmp_dir = tempdir().expect("Failed to create tempdir");

        let mut events = FsEvents::new().unwrap();
        assert!(events.watch_root(tmp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_watch_root_twice() {
        let tmp_dir = tempdir().expect("Failed to create tempdir");

        let mut events = FsEvents::new().unwrap();
        let first = events.watch_root(tmp_dir.path()).unwrap();
        let second = events.watch_root(tmp_dir.path()).unwrap();

        assert_eq!(first, second);
        assert!(first.is_absolute());
        assert!(events.is_watching(&first));
    }

    #[tokio::test]
    async fn test_nested_write_event() {
        use tokio::time::timeout;

        let tmp_dir = tempdir().expect("Failed to create tempdir");
        let nested = tmp_dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let file_path = nested.join("app.log");
        std::fs::write(&file_path, b"").unwrap();

        let mut events = FsEvents::new().unwrap();
        let root = events.watch_root(tmp_dir.path()).unwrap();
        let expected = root.join("nested").join("app.log");

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&file_path, b"hello\n").unwrap();

        let found = timeout(Duration::from_secs(5), async {
            while let Some(res) = events.next_event().await {
                let event = res.unwrap();
                if log_writes(&event).any(|path| path == &expected) {
                    return true;
                }
            }
            false
        })
        .await
        .expect("Timed out waiting for write event");

        assert!(found);
    }

    #[tokio::test]
    async fn test_stream_skips_errors() {
        use futures_util::StreamExt;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = FsEvents::from_receiver(rx).unwrap();

        let write = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/logs/a.log",
        );
        tx.send(Err(notify::Error::generic("watch failed"))).unwrap();
        tx.send(Ok(write.clone())).unwrap();
        drop(tx);

        assert_eq!(events.next().await, Some(write));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_next_event_surfaces_errors() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = FsEvents::from_receiver(rx).unwrap();

        tx.send(Err(notify::Error::generic("watch failed"))).unwrap();
        drop(tx);

        assert!(matches!(events.next_event().await, Some(Err(Error::Event(_)))));
        assert!(events.next_event().await.is_none());
    }
}
