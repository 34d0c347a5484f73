//! One published generation of models

use crate::backend::CompiledModule;
use crate::registry::ModelRegistry;
use crate::snapshot::SchemaSnapshot;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// An immutable, fully built set of models.
///
/// Everything here is constructed before the generation is published and
/// never changes afterwards.
#[derive(Debug)]
pub struct Generation {
    /// Unique and increasing within a coordinator
    pub version: u64,
    pub fingerprint: Option<String>,
    pub snapshot: Option<Arc<SchemaSnapshot>>,
    /// Bundle text the module was compiled from
    pub source: Arc<str>,
    pub module: Option<Arc<dyn CompiledModule>>,
    pub registry: ModelRegistry,
    pub created_at: DateTime<Utc>,
    /// Set on degraded generations published after a failed first build
    pub error: Option<String>,
}

impl Generation {
    /// A generation with no models, for when nothing better exists
    pub fn empty(version: u64, error: impl Into<String>) -> Self {
        Self {
            version,
            fingerprint: None,
            snapshot: None,
            source: Arc::from(""),
            module: None,
            registry: ModelRegistry::empty(),
            created_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}
