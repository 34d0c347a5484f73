//! Generation Module
//!
//! Everything a generation leaves on disk:
//! - Source bundle (generated code plus user files, with a fingerprint header)
//! - Generation cache (marker, bundle, compiled module pointer, flags)
//! - Directory lock (cross-process exclusion on the models directory)

pub mod cache;
pub mod dir_lock;
pub mod source;

pub use cache::{is_artifact, CacheLookup, CachedGeneration, GenerationCache};
pub use dir_lock::DirectoryLock;
pub use source::SourceBundle;
