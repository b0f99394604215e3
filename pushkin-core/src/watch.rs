//! Live filesystem watch over the cache directory.
//!
//! A thin wrapper around `notify` that converts raw OS notifications into
//! [`PathEvent`]s and pushes the accepted paths onto the [`PendingQueue`].
//! The pump consumes a plain channel of `PathEvent`s, so tests can drive it
//! with a synthetic event source instead of a real watcher.

use std::path::PathBuf;
use std::sync::Arc;

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::error::Result;
use crate::queue::PendingQueue;

/// Why a path event was surfaced. Only these two reasons mean a file is
/// fully written and ready to upload; every other notification is noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReason {
    /// The file was closed after being opened for writing.
    ClosedAfterWrite,
    /// The file was moved into the watched tree.
    MovedIn,
}

/// One accepted filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEvent {
    pub path: PathBuf,
    pub reason: EventReason,
}

/// Map a raw notify event to an upload-worthy reason, or `None` for kinds
/// the relay ignores (creation, data writes, deletion, metadata churn).
pub fn classify_reason(event: &Event) -> Option<EventReason> {
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            Some(EventReason::ClosedAfterWrite)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(EventReason::MovedIn),
        _ => None,
    }
}

/// Convert a raw notify event into zero or more accepted [`PathEvent`]s.
///
/// Filtering order: reason, then per path a directory check, then the
/// extension filter from the config. Discarded events are not errors.
pub fn convert_event(event: Event, config: &RelayConfig) -> Vec<PathEvent> {
    let Some(reason) = classify_reason(&event) else {
        return Vec::new();
    };

    event
        .paths
        .into_iter()
        .filter(|path| !path.is_dir())
        .filter(|path| config.classify(path).is_some())
        .map(|path| PathEvent { path, reason })
        .collect()
}

/// Drain a stream of accepted events into the pending queue. Runs until the
/// sender side is dropped.
pub fn spawn_pump(
    mut rx: mpsc::UnboundedReceiver<PathEvent>,
    queue: Arc<PendingQueue>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!(path = %event.path.display(), reason = ?event.reason, "got new file");
            queue.push(event.path);
        }
    })
}

/// Recursive `notify` watcher over the cache directory, feeding the pending
/// queue for the lifetime of the process.
pub struct CacheWatcher {
    // Dropping the watcher stops the notify stream.
    _watcher: RecommendedWatcher,
    pump: JoinHandle<()>,
}

impl std::fmt::Debug for CacheWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWatcher")
            .field("pump_finished", &self.pump.is_finished())
            .finish()
    }
}

impl CacheWatcher {
    /// Attach a recursive watcher to `root` and start the pump. Watcher
    /// setup failure is fatal; runtime watch errors are logged and the
    /// stream continues.
    pub fn spawn(
        root: &std::path::Path,
        config: Arc<RelayConfig>,
        queue: Arc<PendingQueue>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<PathEvent>();

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for path_event in convert_event(event, &config) {
                        // The pump owns the receiver for as long as the
                        // watcher lives, so a failed send only happens
                        // during shutdown.
                        let _ = tx.send(path_event);
                    }
                }
                Err(err) => warn!(error = %err, "filesystem watch error"),
            },
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let pump = spawn_pump(rx, queue);

        Ok(Self {
            _watcher: watcher,
            pump,
        })
    }

    /// Stop watching and drop any undelivered events.
    pub fn shutdown(self) {
        self.pump.abort();
    }
}
