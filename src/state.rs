//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::Settings;
use crate::reload::{ChangeWatcher, ReloadCoordinator};
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Owns the published models
    pub coordinator: Arc<ReloadCoordinator>,

    /// Schema and file change notifications
    pub watcher: Arc<ChangeWatcher>,

    pub settings: Settings,
}

impl AppState {
    pub fn new(coordinator: Arc<ReloadCoordinator>, settings: Settings) -> Self {
        let watcher = ChangeWatcher::new(&coordinator);
        Self {
            coordinator,
            watcher,
            settings,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
