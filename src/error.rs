//! Error handling module
//!
//! Provides the model-generation error taxonomy and the HTTP error type
//! used by the operator surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Schema could not be turned into a consistent snapshot.
///
/// Always fatal to the current build attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Duplicate content type alias (aliases are case-insensitive): {}", .colliding.join(", "))]
    DuplicateAlias { colliding: Vec<String> },

    #[error("Content types share a binding name: {}", .colliding.join(", "))]
    DuplicateBindingName { colliding: Vec<String> },

    #[error("Duplicate property on content type {type_alias:?}: {}", .colliding.join(", "))]
    DuplicateProperty {
        type_alias: String,
        colliding: Vec<String>,
    },

    #[error("Cannot resolve runtime type of property {property_alias:?} on content type {type_alias:?}: {reason}")]
    UnresolvedPropertyType {
        type_alias: String,
        property_alias: String,
        reason: String,
    },

    #[error("Unsupported item kind {kind} for content type {alias:?}")]
    UnsupportedItemKind { alias: String, kind: String },

    #[error("Content type {type_alias:?} is composed of unknown content type id {composition_id}")]
    UnknownComposition { type_alias: String, composition_id: i32 },

    #[error("Schema store error: {0}")]
    Store(String),
}

/// The host compiler rejected the emitted source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to compile module {module:?}: {message}")]
pub struct CompileError {
    pub module: String,
    pub message: String,
}

impl CompileError {
    pub fn new(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// A compiled module does not expose the constructors the registry needs.
///
/// Aborts the whole registry build.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructorShapeError {
    #[error("Type {type_name} is missing a public constructor with one argument accepting an element facade")]
    Missing { type_name: String },

    #[error("Type {type_name} has {count} public constructors with one argument accepting an element facade, expected exactly one")]
    Ambiguous { type_name: String, count: usize },

    #[error("Both types {first} and {second} want to be the model for content type alias {alias:?}")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
}

/// Everything that can go wrong while producing a generation.
#[derive(Error, Debug)]
pub enum ModelsError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    ConstructorShape(#[from] ConstructorShapeError),

    #[error("Timed out after {waited:?} waiting for models directory lock {path:?}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("Code emission failed: {0}")]
    Emit(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File watcher error: {0}")]
    Watch(String),
}

impl ModelsError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Short machine-readable category, used by the status surface.
    pub fn code(&self) -> &'static str {
        match self {
            ModelsError::Schema(_) => "SCHEMA_ERROR",
            ModelsError::Compile(_) => "COMPILE_ERROR",
            ModelsError::ConstructorShape(_) => "CONSTRUCTOR_SHAPE_ERROR",
            ModelsError::LockTimeout { .. } => "LOCK_TIMEOUT",
            ModelsError::Emit(_) => "EMIT_ERROR",
            ModelsError::Io { .. } => "IO_ERROR",
            ModelsError::Watch(_) => "WATCH_ERROR",
        }
    }
}

/// Application-wide HTTP error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;
