//! Watch session manager: one OS watcher, many roots.
//!
//! Raw notify events are matched against every subscribed root, filtered
//! by that root's ignore rules, and turned into a coalescer notification.
//! Event details are dropped on purpose; the coalescer only learns that
//! something under its root changed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};

use super::coalescer::CoalescerHandle;
use super::filter::IgnoreFilter;
use super::stats::WatchStats;
use crate::error::WatcherError;
use crate::observability::WATCHED_ROOTS;
use crate::Result;

/// Runtime routing entry for one watched root.
#[derive(Debug, Clone)]
struct Subscription {
    filter: Arc<IgnoreFilter>,
    trigger: CoalescerHandle,
}

type Routes = Arc<RwLock<HashMap<PathBuf, Subscription>>>;

/// Owns the OS watch and routes its events to per-root coalescers.
pub struct WatchManager {
    watcher: Mutex<Option<RecommendedWatcher>>,
    routes: Routes,
    stats: Arc<WatchStats>,
}

impl WatchManager {
    #[must_use]
    pub fn new(stats: Arc<WatchStats>) -> Self {
        Self {
            watcher: Mutex::new(None),
            routes: Arc::new(RwLock::new(HashMap::new())),
            stats,
        }
    }

    /// Start watching `root` recursively, routing its events to `trigger`.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::WatchFailed` if the root is already
    /// subscribed or the OS watch cannot be established.
    pub fn subscribe(
        &self,
        root: &Path,
        filter: Arc<IgnoreFilter>,
        trigger: CoalescerHandle,
    ) -> Result<()> {
        {
            let mut routes = self.routes.write();
            if routes.contains_key(root) {
                return Err(WatcherError::WatchFailed {
                    path: root.display().to_string(),
                    reason: "already watched".to_string(),
                }
                .into());
            }
            routes.insert(root.to_path_buf(), Subscription { filter, trigger });
        }

        let mut guard = self.watcher.lock();
        if guard.is_none() {
            match self.create_watcher() {
                Ok(watcher) => *guard = Some(watcher),
                Err(e) => {
                    self.routes.write().remove(root);
                    return Err(e);
                }
            }
        }

        let result = guard
            .as_mut()
            .map_or(Ok(()), |w| w.watch(root, RecursiveMode::Recursive));
        if let Err(e) = result {
            self.routes.write().remove(root);
            if self.routes.read().is_empty() {
                *guard = None;
            }
            return Err(WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: e.to_string(),
            }
            .into());
        }

        WATCHED_ROOTS.set(i64::try_from(self.routes.read().len()).unwrap_or(i64::MAX));
        tracing::info!(root = %root.display(), "Watching directory");
        Ok(())
    }

    /// Stop watching `root`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, root: &Path) -> bool {
        if self.routes.write().remove(root).is_none() {
            return false;
        }

        let mut guard = self.watcher.lock();
        if let Some(watcher) = guard.as_mut() {
            if let Err(e) = watcher.unwatch(root) {
                // the directory may already be gone
                tracing::debug!(root = %root.display(), error = %e, "Unwatch failed");
            }
        }
        let remaining = self.routes.read().len();
        if remaining == 0 {
            *guard = None;
        }

        WATCHED_ROOTS.set(i64::try_from(remaining).unwrap_or(i64::MAX));
        tracing::info!(root = %root.display(), "Stopped watching directory");
        true
    }

    #[must_use]
    pub fn is_watching(&self, root: &Path) -> bool {
        self.routes.read().contains_key(root)
    }

    /// Currently subscribed roots, sorted.
    #[must_use]
    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.routes.read().keys().cloned().collect();
        roots.sort();
        roots
    }

    /// Route one raw event as if it came from the OS.
    pub fn dispatch(&self, event: &Event) {
        dispatch_event(&self.routes, &self.stats, event);
    }

    fn create_watcher(&self) -> Result<RecommendedWatcher> {
        let routes = Arc::clone(&self.routes);
        let stats = Arc::clone(&self.stats);

        notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => dispatch_event(&routes, &stats, &event),
            Err(e) => tracing::error!(error = %e, paths = ?e.paths, "Watch error"),
        })
        .map_err(|e| {
            WatcherError::WatchFailed {
                path: "init".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

impl std::fmt::Debug for WatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchManager")
            .field("roots", &self.roots())
            .finish_non_exhaustive()
    }
}

fn dispatch_event(routes: &Routes, stats: &WatchStats, event: &Event) {
    // reads and opens never change what a snapshot would see
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }

    let routes = routes.read();

    if event.need_rescan() {
        tracing::debug!("Watcher requested rescan");
        for sub in routes.values() {
            sub.trigger.notify();
        }
        return;
    }

    for path in &event.paths {
        for (root, sub) in routes.iter() {
            if !path.starts_with(root) {
                continue;
            }
            let ignored = sub.filter.is_ignored(path);
            stats.record_event(ignored);
            if ignored {
                tracing::trace!(path = %path.display(), "Ignored event");
            } else {
                sub.trigger.notify();
            }
        }
    }
}
