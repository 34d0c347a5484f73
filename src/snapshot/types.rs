//! Schema snapshot types
//!
//! The in-memory graph of type descriptors a generation is built from.
//! Relationships between types are held by id, never by ownership.

use crate::schema::{ItemKind, RuntimeType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A content type, ready for code generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub id: i32,
    /// Unique across the snapshot, case-insensitively
    pub alias: String,
    /// Language-safe identifier used in generated code
    pub binding_name: String,
    pub parent_id: i32,
    pub display_name: String,
    pub description: Option<String>,
    pub item_kind: ItemKind,
    /// Id of the typed parent, if the parent node is itself a type
    pub base_type: Option<i32>,
    /// Ids of the types composed into this one (excluding the base type)
    pub mixin_types: BTreeSet<i32>,
    pub is_mixin: bool,
    pub properties: Vec<PropertyDescriptor>,
}

/// A property of a content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    /// Unique within the owning type
    pub alias: String,
    pub binding_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub runtime_type: RuntimeType,
}

/// Point-in-time capture of the whole schema
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    pub types: Vec<TypeDescriptor>,
    by_id: HashMap<i32, usize>,
}

impl SchemaSnapshot {
    pub fn new(types: Vec<TypeDescriptor>) -> Self {
        let by_id = types
            .iter()
            .enumerate()
            .map(|(index, t)| (t.id, index))
            .collect();
        Self { types, by_id }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: i32) -> Option<&TypeDescriptor> {
        self.by_id.get(&id).map(|&index| &self.types[index])
    }

    /// Case-insensitive alias lookup
    pub fn find_alias(&self, alias: &str) -> Option<&TypeDescriptor> {
        self.types
            .iter()
            .find(|t| t.alias.eq_ignore_ascii_case(alias))
    }

    pub fn base_of(&self, descriptor: &TypeDescriptor) -> Option<&TypeDescriptor> {
        descriptor.base_type.and_then(|id| self.get(id))
    }

    /// The base chain of a type, nearest first. Stops on cycles.
    pub fn ancestors(&self, id: i32) -> Vec<&TypeDescriptor> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.get(id).and_then(|t| t.base_type);
        while let Some(base_id) = current {
            if !seen.insert(base_id) {
                break;
            }
            match self.get(base_id) {
                Some(base) => {
                    chain.push(base);
                    current = base.base_type;
                }
                None => break,
            }
        }
        chain
    }

    pub fn mixins_of(&self, descriptor: &TypeDescriptor) -> Vec<&TypeDescriptor> {
        descriptor
            .mixin_types
            .iter()
            .filter_map(|id| self.get(*id))
            .collect()
    }

    /// Alias -> binding name, for rendering model references in generated code
    pub fn binding_names(&self) -> HashMap<String, String> {
        self.types
            .iter()
            .map(|t| (t.alias.to_lowercase(), t.binding_name.clone()))
            .collect()
    }
}
