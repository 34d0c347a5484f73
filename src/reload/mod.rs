//! Reload Module
//!
//! Keeps the published models in step with the schema:
//! - Reload coordinator (build state machine and query surface)
//! - Lock ordering (host compiler lock before coordinator state)
//! - Change watcher (notifications and file events -> invalidation)

pub mod coordinator;
pub mod generation;
pub mod lock_order;
pub mod watcher;

pub use coordinator::{BuildStatus, CoordinatorOptions, ModelsStatus, ReloadCoordinator};
pub use generation::Generation;
pub use watcher::ChangeWatcher;
