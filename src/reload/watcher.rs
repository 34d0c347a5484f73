//! Change notifications
//!
//! Turns schema store notifications and file system events in the models
//! directory into coordinator invalidations. Our own artifacts are ignored,
//! otherwise every rebuild would trigger the next one.

use super::coordinator::ReloadCoordinator;
use crate::error::ModelsError;
use crate::generation::is_artifact;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub struct ChangeWatcher {
    coordinator: Weak<ReloadCoordinator>,
    fs_watcher: Mutex<Option<RecommendedWatcher>>,
}

impl ChangeWatcher {
    pub fn new(coordinator: &Arc<ReloadCoordinator>) -> Arc<Self> {
        Arc::new(Self {
            coordinator: Arc::downgrade(coordinator),
            fs_watcher: Mutex::new(None),
        })
    }

    fn invalidate(&self, reason: &str) {
        match self.coordinator.upgrade() {
            Some(coordinator) => {
                debug!("Invalidating models: {}", reason);
                coordinator.invalidate();
            }
            None => debug!("Ignoring {}: coordinator is gone", reason),
        }
    }

    pub fn on_schema_changed(&self) {
        self.invalidate("content types changed");
    }

    pub fn on_data_type_changed(&self) {
        self.invalidate("data types changed");
    }

    /// Returns whether the change invalidated the models
    pub fn on_file_changed(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if is_artifact(&name) {
            return false;
        }
        self.invalidate(&format!("{} changed", path.display()));
        true
    }

    /// Start watching `dir` (not recursively)
    pub fn watch_directory(self: &Arc<Self>, dir: &Path) -> Result<(), ModelsError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| ModelsError::io(format!("Failed to create {}", dir.display()), e))?;

        let handler = Arc::downgrade(self);
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let Some(handler) = handler.upgrade() else {
                return;
            };
            match result {
                Ok(event) => handler.on_event(event),
                Err(e) => warn!("Models directory watch error: {}", e),
            }
        })
        .map_err(|e| ModelsError::Watch(e.to_string()))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| ModelsError::Watch(e.to_string()))?;

        info!("Watching {} for model source changes", dir.display());
        *self.fs_watcher.lock() = Some(watcher);
        Ok(())
    }

    fn on_event(&self, event: Event) {
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        for path in &event.paths {
            if self.on_file_changed(path) {
                break;
            }
        }
    }

    pub fn is_watching(&self) -> bool {
        self.fs_watcher.lock().is_some()
    }

    /// Stop watching the file system. Notifications still work.
    pub fn stop(&self) {
        if self.fs_watcher.lock().take().is_some() {
            info!("Stopped watching models directory");
        }
    }
}
