//! The event loop tying filesystem events to the broadcast hub.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::events::{self, FsEvents};
use crate::hub::{format_delta, Hub};
use crate::reader::{IncrementalReader, LogDelta};

/// Drains filesystem events one at a time, reads the lines appended to each
/// written log file, and broadcasts them.
///
/// Events are handled strictly in order on a single task; the reader's
/// offset updates are never concurrent with each other.
#[derive(Debug)]
pub struct Tailer {
    events: FsEvents,
    reader: IncrementalReader,
    hub: Arc<Hub>,
}

impl Tailer {
    pub fn new(events: FsEvents, reader: IncrementalReader, hub: Arc<Hub>) -> Self {
        Tailer {
            events,
            reader,
            hub,
        }
    }

    /// Runs until the event channel closes.
    ///
    /// Watcher errors are logged and don't stop the loop.
    pub async fn run(mut self) {
        info!("tailing started");

        while let Some(res) = self.events.next_event().await {
            match res {
                Ok(event) => {
                    handle_event(&self.reader, &self.hub, &event).await;
                }
                Err(e) => warn!(error = %e, "watcher error"),
            }
        }

        info!("event stream closed, tailing stopped");
    }
}

/// Reads every log file written in `event` and broadcasts one message per
/// file that produced new lines.
///
/// Returns the deltas that were broadcast.
pub async fn handle_event(
    reader: &IncrementalReader,
    hub: &Hub,
    event: &notify::Event,
) -> Vec<LogDelta> {
    let mut sent = Vec::new();

    for path in events::log_writes(event) {
        let delta = reader.read(path).await;
        if delta.is_empty() {
            continue;
        }

        let delivered = hub.broadcast(format_delta(&delta));
        debug!(
            path = %delta.source().display(),
            lines = delta.len(),
            subscribers = delivered,
            "broadcast delta"
        );
        sent.push(delta);
    }

    sent
}
