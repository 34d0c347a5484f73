//! Schema Snapshot Module
//!
//! Turning the live schema into something models can be generated from:
//! - Schema snapshots (type descriptors with base and mixin links resolved)
//! - Snapshot builder (reads the schema store)
//! - Change fingerprint (the generation cache key)

pub mod builder;
pub mod fingerprint;
pub mod types;

pub use builder::{BindingNamePolicy, SchemaSnapshotBuilder};
pub use fingerprint::{ChangeFingerprint, HashCombiner};
pub use types::{PropertyDescriptor, SchemaSnapshot, TypeDescriptor};
