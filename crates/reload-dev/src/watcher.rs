//! Rebuild signals.
//!
//! A [`ReloadTrigger`] is the sending side of a payload-free channel; every
//! `fire` means "assets were rebuilt". [`SiteWatcher`] fires it for file
//! changes under the watched paths, and [`next_rebuild`] coalesces bursts of
//! signals into one.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, trace, warn};

use crate::error::DevError;

/// Handle for announcing a completed rebuild.
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    tx: Sender<()>,
}

impl ReloadTrigger {
    /// Signal a rebuild. Returns `false` once the server side is gone.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Create a trigger and the receiver the broadcast loop listens on.
pub fn rebuild_channel() -> (ReloadTrigger, Receiver<()>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ReloadTrigger { tx }, rx)
}

/// Block until the next rebuild, then swallow further signals until
/// `debounce` passes without one. Returns `false` when every trigger has
/// been dropped.
pub fn next_rebuild(rx: &Receiver<()>, debounce: Duration) -> bool {
    if rx.recv().is_err() {
        return false;
    }
    loop {
        match rx.recv_timeout(debounce) {
            Ok(()) => continue,
            Err(RecvTimeoutError::Timeout) => return true,
            // A signal was already received; deliver it before stopping.
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Fires a [`ReloadTrigger`] whenever something under the watched paths
/// changes. Watching stops when this value is dropped.
pub struct SiteWatcher {
    _watcher: RecommendedWatcher,
    paths: Vec<PathBuf>,
}

impl std::fmt::Debug for SiteWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteWatcher")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl SiteWatcher {
    pub fn start(paths: Vec<PathBuf>, trigger: ReloadTrigger) -> Result<Self, DevError> {
        let first = paths.first().cloned().unwrap_or_default();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_content_change(&event.kind) => {
                trace!(paths = ?event.paths, "file change");
                trigger.fire();
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "file watcher error"),
        })
        .map_err(|source| DevError::Watch { path: first, source })?;

        for path in &paths {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|source| DevError::Watch {
                    path: path.clone(),
                    source,
                })?;
            info!(path = %path.display(), "watching for changes");
        }

        Ok(SiteWatcher {
            _watcher: watcher,
            paths,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}
