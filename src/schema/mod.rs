//! Schema Store Module
//!
//! The seam to the external schema store: raw content type records as the
//! store keeps them, and the runtime types their properties materialize as.

pub mod runtime_type;
pub mod store;

pub use runtime_type::RuntimeType;
pub use store::{JsonSchemaStore, MemorySchemaStore, SchemaDocument};

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of schema item a content type describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Content,
    Media,
    Member,
    /// Content types flagged as elements (no standalone existence)
    Element,
}

impl ItemKind {
    /// Kinds the store is queried for; elements come back as flagged content.
    pub const STORED: [ItemKind; 3] = [ItemKind::Content, ItemKind::Media, ItemKind::Member];
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemKind::Content => "Content",
            ItemKind::Media => "Media",
            ItemKind::Member => "Member",
            ItemKind::Element => "Element",
        };
        f.write_str(name)
    }
}

/// A content type as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeRecord {
    pub id: i32,
    pub alias: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parent node id; -1 for the root. The parent may be a non-type container.
    #[serde(default = "root_parent_id")]
    pub parent_id: i32,
    #[serde(default)]
    pub is_element: bool,
    /// Ids of every type this one is composed of, possibly including its parent
    #[serde(default)]
    pub composition_ids: Vec<i32>,
    #[serde(default)]
    pub properties: Vec<PropertyTypeRecord>,
}

fn root_parent_id() -> i32 {
    -1
}

/// A property type as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyTypeRecord {
    pub alias: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Alias of the property editor / data type backing this property
    pub editor_alias: String,
}

/// The external schema store
pub trait SchemaStore: Send + Sync {
    /// All content types of one stored kind.
    fn content_types(&self, kind: ItemKind) -> Result<Vec<ContentTypeRecord>, SchemaError>;

    /// The materialized runtime type of a property, `None` when the store
    /// cannot tell.
    fn property_type(
        &self,
        kind: ItemKind,
        owner: &ContentTypeRecord,
        property: &PropertyTypeRecord,
    ) -> Result<Option<RuntimeType>, SchemaError>;

    /// The whole schema read at once, so a build never mixes two versions of
    /// it. `None` means the store is already consistent across calls.
    fn capture(&self) -> Result<Option<SchemaDocument>, SchemaError> {
        Ok(None)
    }
}
