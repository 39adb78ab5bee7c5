//! Tails a set of log directories and streams newly appended lines to
//! connected WebSocket viewers.
//!
//! Every `.log` file found under the configured roots at startup is tracked
//! from its current end, so only lines written afterwards are streamed. Each
//! filesystem write event yields one text message per file:
//!
//! ```text
//! File: /var/log/app/server.log
//! first new line
//! second new line
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use logcast::{DirectoryScanner, FsEvents, Hub, IncrementalReader, OffsetStore, Tailer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let offsets = Arc::new(OffsetStore::new());
//!     let hub = Arc::new(Hub::default());
//!     let mut events = FsEvents::new()?;
//!
//!     DirectoryScanner::new(Arc::clone(&offsets)).scan_root("/var/log/app", &mut events)?;
//!
//!     let mut viewer = hub.register();
//!     let reader = IncrementalReader::new(offsets);
//!     tokio::spawn(Tailer::new(events, reader, Arc::clone(&hub)).run());
//!
//!     while let Some(message) = viewer.recv().await {
//!         println!("{}", message);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Caveats
//!
//! A file created after startup is picked up with its first write and read
//! from its beginning. Lines written while the process is down are never
//! delivered, since a restart seeds every file at its end again.

pub mod auth;
pub mod config;
pub mod events;
pub mod gateway;
pub mod hub;
pub mod offsets;
pub mod reader;
pub mod scanner;
pub mod server;
pub mod tail;

pub use auth::Credentials;
pub use config::Config;
pub use events::FsEvents;
pub use hub::{Hub, Subscription};
pub use notify::event;
pub use offsets::OffsetStore;
pub use reader::{IncrementalReader, LogDelta};
pub use scanner::DirectoryScanner;
pub use server::Server;
pub use tail::Tailer;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
