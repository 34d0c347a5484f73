//! SchemaBind - typed models for a live content schema
//!
//! Reads the content type schema, generates and compiles a typed binding
//! layer for it, and hot-swaps that layer whenever the schema or the
//! user-authored model files change.
//!
//! - `schema`: the schema store seam and runtime types
//! - `snapshot`: snapshots of the schema and their fingerprints
//! - `backend`: code emitter and host compiler collaborators
//! - `generation`: on-disk cache of generated and compiled models
//! - `registry`: alias -> typed model constructors
//! - `reload`: the coordinator that ties it all together

pub mod backend;
pub mod config;
pub mod error;
pub mod generation;
pub mod registry;
pub mod reload;
pub mod routes;
pub mod schema;
pub mod snapshot;
pub mod state;
