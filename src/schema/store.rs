//! Schema store implementations
//!
//! `SchemaDocument` is the serialized shape of a whole schema. It backs both
//! the file store used by the service and the in-memory store used when the
//! schema is owned by the embedding application.

use super::{ContentTypeRecord, ItemKind, PropertyTypeRecord, RuntimeType, SchemaStore};
use crate::error::SchemaError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A complete schema: types per kind plus the editor → runtime type table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    #[serde(default)]
    pub content_types: Vec<ContentTypeRecord>,
    #[serde(default)]
    pub media_types: Vec<ContentTypeRecord>,
    #[serde(default)]
    pub member_types: Vec<ContentTypeRecord>,
    /// Property editor alias -> runtime type
    #[serde(default)]
    pub editors: BTreeMap<String, RuntimeType>,
}

impl SchemaDocument {
    fn records(&self, kind: ItemKind) -> Result<Vec<ContentTypeRecord>, SchemaError> {
        match kind {
            ItemKind::Content => Ok(self.content_types.clone()),
            ItemKind::Media => Ok(self.media_types.clone()),
            ItemKind::Member => Ok(self.member_types.clone()),
            ItemKind::Element => Err(SchemaError::UnsupportedItemKind {
                alias: "*".to_string(),
                kind: kind.to_string(),
            }),
        }
    }

    fn editor_type(&self, property: &PropertyTypeRecord) -> Option<RuntimeType> {
        self.editors.get(&property.editor_alias).cloned()
    }
}

impl SchemaStore for SchemaDocument {
    fn content_types(&self, kind: ItemKind) -> Result<Vec<ContentTypeRecord>, SchemaError> {
        self.records(kind)
    }

    fn property_type(
        &self,
        _kind: ItemKind,
        _owner: &ContentTypeRecord,
        property: &PropertyTypeRecord,
    ) -> Result<Option<RuntimeType>, SchemaError> {
        Ok(self.editor_type(property))
    }
}

/// Schema store reading a JSON document from disk.
///
/// Nothing is cached, so edits are picked up without restart. Snapshot
/// builds read the file once through `capture`.
pub struct JsonSchemaStore {
    path: PathBuf,
}

impl JsonSchemaStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<SchemaDocument, SchemaError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            SchemaError::Store(format!("Failed to read schema file {:?}: {}", self.path, e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SchemaError::Store(format!("Failed to parse schema file {:?}: {}", self.path, e))
        })
    }
}

impl SchemaStore for JsonSchemaStore {
    fn content_types(&self, kind: ItemKind) -> Result<Vec<ContentTypeRecord>, SchemaError> {
        self.load()?.records(kind)
    }

    fn property_type(
        &self,
        _kind: ItemKind,
        _owner: &ContentTypeRecord,
        property: &PropertyTypeRecord,
    ) -> Result<Option<RuntimeType>, SchemaError> {
        Ok(self.load()?.editor_type(property))
    }

    fn capture(&self) -> Result<Option<SchemaDocument>, SchemaError> {
        self.load().map(Some)
    }
}

/// Schema store held in memory and mutable at runtime
#[derive(Default)]
pub struct MemorySchemaStore {
    document: RwLock<SchemaDocument>,
}

impl MemorySchemaStore {
    pub fn new(document: SchemaDocument) -> Self {
        Self {
            document: RwLock::new(document),
        }
    }

    /// Replace the whole schema
    pub fn replace(&self, document: SchemaDocument) {
        *self.document.write() = document;
    }

}

impl SchemaStore for MemorySchemaStore {
    fn content_types(&self, kind: ItemKind) -> Result<Vec<ContentTypeRecord>, SchemaError> {
        self.document.read().records(kind)
    }

    fn property_type(
        &self,
        _kind: ItemKind,
        _owner: &ContentTypeRecord,
        property: &PropertyTypeRecord,
    ) -> Result<Option<RuntimeType>, SchemaError> {
        Ok(self.document.read().editor_type(property))
    }

    fn capture(&self) -> Result<Option<SchemaDocument>, SchemaError> {
        Ok(Some(self.document.read().clone()))
    }
}
