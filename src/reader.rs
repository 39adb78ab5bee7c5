//! Everything related to reading newly appended lines for a given event.

use std::io;
use std::iter::IntoIterator;
use std::path::{Path, PathBuf};
use std::slice::Iter;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::offsets::OffsetStore;

/// Batch of complete lines appended to a given source path since its last
/// read.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct LogDelta {
    /// The path from where the lines were read.
    source: PathBuf,
    /// The batched list of lines, without their delimiters.
    lines: Vec<String>,
}

impl LogDelta {
    pub fn new(source: impl Into<PathBuf>, lines: Vec<String>) -> Self {
        LogDelta {
            source: source.into(),
            lines,
        }
    }

    fn empty(source: impl Into<PathBuf>) -> Self {
        Self::new(source, Vec::new())
    }

    /// Returns a reference to the file from where the lines were read.
    pub fn source(&self) -> &Path {
        self.source.as_path()
    }

    /// Returns a slice to the vec of lines.
    pub fn lines(&self) -> &[String] {
        self.lines.as_slice()
    }

    /// Returns an iterator over the slice of lines.
    pub fn iter(&self) -> Iter<'_, String> {
        self.lines().iter()
    }

    /// Returns the number of lines in the delta.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if no complete line was appended.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the internal components that make up a `LogDelta`.
    pub fn into_inner(self) -> (PathBuf, Vec<String>) {
        let LogDelta { source, lines } = self;

        (source, lines)
    }
}

impl IntoIterator for LogDelta {
    type Item = String;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.into_iter()
    }
}

/// Reads the lines appended to a file past its stored tail offset.
///
/// Only complete (`\n`-terminated) lines are returned. The offset is advanced
/// to just past the last complete line, so a line still being written is
/// picked up in full by a later read.
///
/// Truncation is detected only by the file being shorter than its offset. A
/// file truncated and then regrown past the old offset before its event is
/// handled is read from the old offset, so its new prefix is skipped.
#[derive(Clone, Debug)]
pub struct IncrementalReader {
    offsets: Arc<OffsetStore>,
}

impl IncrementalReader {
    pub fn new(offsets: Arc<OffsetStore>) -> Self {
        IncrementalReader { offsets }
    }

    pub fn offsets(&self) -> &OffsetStore {
        &self.offsets
    }

    /// Reads new complete lines from `path`.
    ///
    /// I/O failures are logged and yield an empty delta; the stored offset is
    /// left untouched so the next write event retries.
    pub async fn read(&self, path: impl AsRef<Path>) -> LogDelta {
        let path = path.as_ref();

        match self.try_read(path).await {
            Ok(delta) => delta,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read log file");
                LogDelta::empty(path)
            }
        }
    }

    async fn try_read(&self, path: &Path) -> io::Result<LogDelta> {
        let mut file = File::open(path).await?;
        let size = file.metadata().await?.len();

        let mut offset = self.offsets.get(path);
        if size < offset {
            // truncated or rotated in place
            tracing::debug!(path = %path.display(), size, offset, "file shrank, reading from start");
            offset = 0;
        }

        file.seek(io::SeekFrom::Start(offset)).await?;
        let mut reader = BufReader::new(file);

        let mut lines = Vec::new();
        let mut buf = Vec::new();
        let mut pos = offset;

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).await?;
            if read == 0 || buf.last() != Some(&b'\n') {
                // EOF, possibly after an unterminated tail
                break;
            }
            pos += read as u64;
            lines.push(decode_line(&buf));
        }

        self.offsets.set(path, pos);

        Ok(LogDelta::new(path, lines))
    }
}

fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    String::from_utf8_lossy(line).into_owned()
}
