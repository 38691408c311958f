//! Space Watcher
//!
//! Filesystem change notifications for a space root. Events arrive on the
//! watcher's own thread and are handed over through a channel; the caller
//! decides when to wait and when to reload.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::common::{SpaceError, SpaceResult};

pub struct SpaceWatcher {
    root: PathBuf,
    debounce: Duration,
    events: Receiver<notify::Result<Event>>,
    // Dropping the watcher stops notifications
    _watcher: RecommendedWatcher,
}

impl SpaceWatcher {
    /// Watch `root` recursively. Bursts of events within `debounce` of each
    /// other are reported as one change.
    pub fn new(root: &Path, debounce: Duration) -> SpaceResult<Self> {
        let (tx, rx) = mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|source| SpaceError::Watch {
            path: root.to_path_buf(),
            source,
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| SpaceError::Watch {
                path: root.to_path_buf(),
                source,
            })?;

        info!("Watching space {:?}", root);
        Ok(Self {
            root: root.to_path_buf(),
            debounce,
            events: rx,
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Block until the space changes, or until `timeout` elapses
    ///
    /// Returns `true` when a change was seen. Access-only events are ignored.
    /// `None` waits indefinitely.
    pub fn wait_for_change(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    self.events.recv_timeout(remaining)
                }
                None => self.events.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Ok(event)) if is_relevant(&event) => {
                    debug!("Space filesystem event: {:?}", event);
                    break;
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    warn!("Space watcher error: {}", e);
                    continue;
                }
                Err(_) => return false,
            }
        }

        // Drain the rest of the burst
        std::thread::sleep(self.debounce);
        while self.events.try_recv().is_ok() {}

        true
    }
}

fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}

impl std::fmt::Debug for SpaceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceWatcher")
            .field("root", &self.root)
            .field("debounce", &self.debounce)
            .finish()
    }
}
