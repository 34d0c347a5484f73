//! Schema snapshot builder
//!
//! Reads every content, media and member type from the schema store and
//! resolves them into a `SchemaSnapshot`: unique aliases, typed base links,
//! mixin (composition) links and materialized property types.

use super::types::{PropertyDescriptor, SchemaSnapshot, TypeDescriptor};
use crate::error::SchemaError;
use crate::schema::{ContentTypeRecord, ItemKind, SchemaStore};
use heck::ToUpperCamelCase;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// How binding names are derived for types and properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingNamePolicy {
    /// The alias as-is
    RawAlias,
    /// The alias, pascal-cased
    #[default]
    PascalAlias,
    /// The display name, pascal-cased
    PascalName,
}

impl BindingNamePolicy {
    pub fn binding_name(&self, alias: &str, display_name: &str) -> String {
        let raw = match self {
            BindingNamePolicy::RawAlias => alias.to_string(),
            BindingNamePolicy::PascalAlias => alias.to_upper_camel_case(),
            BindingNamePolicy::PascalName => {
                let name = display_name.to_upper_camel_case();
                if name.is_empty() {
                    alias.to_upper_camel_case()
                } else {
                    name
                }
            }
        };
        sanitize_identifier(&raw)
    }
}

impl FromStr for BindingNamePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw-alias" | "raw" => Ok(BindingNamePolicy::RawAlias),
            "pascal-alias" => Ok(BindingNamePolicy::PascalAlias),
            "pascal-name" => Ok(BindingNamePolicy::PascalName),
            other => Err(format!(
                "unknown binding name policy '{}' (expected raw-alias, pascal-alias or pascal-name)",
                other
            )),
        }
    }
}

const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while",
];

/// Turns arbitrary text into a valid identifier
pub fn sanitize_identifier(raw: &str) -> String {
    let mut ident: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if ident.is_empty() {
        return "_".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if RESERVED.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

/// Builds snapshots from the schema store
pub struct SchemaSnapshotBuilder {
    store: Arc<dyn SchemaStore>,
    policy: BindingNamePolicy,
}

impl SchemaSnapshotBuilder {
    pub fn new(store: Arc<dyn SchemaStore>, policy: BindingNamePolicy) -> Self {
        Self { store, policy }
    }

    /// Capture the current schema
    pub fn build(&self) -> Result<SchemaSnapshot, SchemaError> {
        // every read of this build goes to one consistent view
        let captured = self.store.capture()?;
        let store: &dyn SchemaStore = match &captured {
            Some(document) => document,
            None => self.store.as_ref(),
        };

        let mut records = Vec::new();
        for stored_kind in ItemKind::STORED {
            for record in store.content_types(stored_kind)? {
                let item_kind = Self::item_kind(stored_kind, &record)?;
                records.push((stored_kind, item_kind, record));
            }
        }

        let mut types: Vec<TypeDescriptor> = records
            .iter()
            .map(|(_, item_kind, record)| self.describe(*item_kind, record))
            .collect();

        Self::ensure_unique_aliases(&types)?;
        Self::ensure_unique_binding_names(&types)?;

        let by_id: HashMap<i32, usize> = types
            .iter()
            .enumerate()
            .map(|(index, t)| (t.id, index))
            .collect();

        // A parent that is not a type (a container) leaves the type without a base
        for descriptor in types.iter_mut() {
            if descriptor.parent_id != descriptor.id && by_id.contains_key(&descriptor.parent_id) {
                descriptor.base_type = Some(descriptor.parent_id);
            }
        }

        let mut composed = Vec::new();
        for (index, (_, _, record)) in records.iter().enumerate() {
            for &composition_id in &record.composition_ids {
                if composition_id == record.parent_id || composition_id == record.id {
                    continue;
                }
                if !by_id.contains_key(&composition_id) {
                    return Err(SchemaError::UnknownComposition {
                        type_alias: record.alias.clone(),
                        composition_id,
                    });
                }
                types[index].mixin_types.insert(composition_id);
                composed.push(composition_id);
            }
        }
        Self::propagate_mixins(&mut types, &by_id, composed);

        for (index, (stored_kind, _, record)) in records.iter().enumerate() {
            types[index].properties = self.describe_properties(store, *stored_kind, record)?;
            Self::ensure_unique_properties(&types[index])?;
        }

        debug!(
            "Built schema snapshot: {} types, {} mixins",
            types.len(),
            types.iter().filter(|t| t.is_mixin).count()
        );

        Ok(SchemaSnapshot::new(types))
    }

    fn item_kind(stored: ItemKind, record: &ContentTypeRecord) -> Result<ItemKind, SchemaError> {
        match (stored, record.is_element) {
            (ItemKind::Content, true) => Ok(ItemKind::Element),
            (kind, false) if kind != ItemKind::Element => Ok(kind),
            (kind, _) => Err(SchemaError::UnsupportedItemKind {
                alias: record.alias.clone(),
                kind: if record.is_element {
                    format!("{} element", kind)
                } else {
                    kind.to_string()
                },
            }),
        }
    }

    fn describe(&self, item_kind: ItemKind, record: &ContentTypeRecord) -> TypeDescriptor {
        TypeDescriptor {
            id: record.id,
            alias: record.alias.clone(),
            binding_name: self.policy.binding_name(&record.alias, &record.name),
            parent_id: record.parent_id,
            display_name: record.name.clone(),
            description: record.description.clone(),
            item_kind,
            base_type: None,
            mixin_types: BTreeSet::new(),
            is_mixin: false,
            properties: Vec::new(),
        }
    }

    fn describe_properties(
        &self,
        store: &dyn SchemaStore,
        stored_kind: ItemKind,
        record: &ContentTypeRecord,
    ) -> Result<Vec<PropertyDescriptor>, SchemaError> {
        record
            .properties
            .iter()
            .map(|property| {
                let runtime_type = match store.property_type(stored_kind, record, property) {
                    Ok(Some(runtime_type)) => runtime_type,
                    Ok(None) => {
                        return Err(SchemaError::UnresolvedPropertyType {
                            type_alias: record.alias.clone(),
                            property_alias: property.alias.clone(),
                            reason: format!("no runtime type for editor '{}'", property.editor_alias),
                        })
                    }
                    Err(e) => {
                        return Err(SchemaError::UnresolvedPropertyType {
                            type_alias: record.alias.clone(),
                            property_alias: property.alias.clone(),
                            reason: e.to_string(),
                        })
                    }
                };
                Ok(PropertyDescriptor {
                    alias: property.alias.clone(),
                    binding_name: self.policy.binding_name(&property.alias, &property.name),
                    display_name: property.name.clone(),
                    description: property.description.clone(),
                    runtime_type,
                })
            })
            .collect()
    }

    fn ensure_unique_aliases(types: &[TypeDescriptor]) -> Result<(), SchemaError> {
        let mut groups: HashMap<String, Vec<&TypeDescriptor>> = HashMap::new();
        for descriptor in types {
            groups
                .entry(descriptor.alias.to_lowercase())
                .or_default()
                .push(descriptor);
        }

        let mut colliding: Vec<String> = groups
            .values()
            .filter(|group| group.len() > 1)
            .flatten()
            .map(|t| format!("{} (id {}, {})", t.alias, t.id, t.item_kind))
            .collect();
        if colliding.is_empty() {
            return Ok(());
        }
        colliding.sort_by_key(|s| s.to_lowercase());
        Err(SchemaError::DuplicateAlias { colliding })
    }

    /// Generated code declares one item per binding name
    fn ensure_unique_binding_names(types: &[TypeDescriptor]) -> Result<(), SchemaError> {
        let colliding = collisions(types.iter().map(|t| {
            (t.binding_name.clone(), format!("{} -> {} (id {})", t.alias, t.binding_name, t.id))
        }));
        if colliding.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::DuplicateBindingName { colliding })
        }
    }

    fn ensure_unique_properties(descriptor: &TypeDescriptor) -> Result<(), SchemaError> {
        let mut colliding = collisions(
            descriptor
                .properties
                .iter()
                .map(|p| (p.alias.to_lowercase(), format!("alias {}", p.alias))),
        );
        colliding.extend(collisions(descriptor.properties.iter().map(|p| {
            (p.binding_name.clone(), format!("{} -> {}", p.alias, p.binding_name))
        })));
        if colliding.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::DuplicateProperty {
                type_alias: descriptor.alias.clone(),
                colliding,
            })
        }
    }

    // A base of a mixin is a mixin too.
    fn propagate_mixins(types: &mut [TypeDescriptor], by_id: &HashMap<i32, usize>, composed: Vec<i32>) {
        let mut marked = HashSet::new();
        for id in composed {
            let mut current = Some(id);
            while let Some(type_id) = current {
                if !marked.insert(type_id) {
                    break;
                }
                let Some(&index) = by_id.get(&type_id) else {
                    break;
                };
                types[index].is_mixin = true;
                current = types[index].base_type;
            }
        }
    }
}

/// Labels of every entry whose key is shared with another entry, sorted
fn collisions(entries: impl Iterator<Item = (String, String)>) -> Vec<String> {
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for (key, label) in entries {
        groups.entry(key).or_default().push(label);
    }
    let mut colliding: Vec<String> = groups
        .into_values()
        .filter(|group| group.len() > 1)
        .flatten()
        .collect();
    colliding.sort();
    colliding
}
