//! Element facades
//!
//! What the rendering layer hands in (an untyped property bag) and what it
//! gets back (a typed model wrapping it, or the same bag).

use crate::schema::RuntimeType;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Base element facade capability
pub trait PublishedElement: Send + Sync + fmt::Debug {
    fn key(&self) -> Uuid;

    /// Alias of the content type this element is an instance of
    fn content_type_alias(&self) -> &str;

    fn value(&self, property_alias: &str) -> Option<&Value>;

    /// Name of the typed model, `None` for generic facades
    fn model_type(&self) -> Option<&str> {
        None
    }
}

/// The untyped property bag
#[derive(Debug, Clone)]
pub struct PropertyBag {
    key: Uuid,
    content_type_alias: String,
    values: HashMap<String, Value>,
}

impl PropertyBag {
    pub fn new(content_type_alias: impl Into<String>) -> Self {
        Self {
            key: Uuid::new_v4(),
            content_type_alias: content_type_alias.into(),
            values: HashMap::new(),
        }
    }

    pub fn with_values(mut self, values: HashMap<String, Value>) -> Self {
        self.values.extend(values);
        self
    }
}

impl PublishedElement for PropertyBag {
    fn key(&self) -> Uuid {
        self.key
    }

    fn content_type_alias(&self) -> &str {
        &self.content_type_alias
    }

    fn value(&self, property_alias: &str) -> Option<&Value> {
        self.values.get(property_alias)
    }
}

/// A typed model over an element
#[derive(Debug, Clone)]
pub struct TypedModel {
    type_name: String,
    inner: Arc<dyn PublishedElement>,
}

impl TypedModel {
    pub fn new(type_name: impl Into<String>, inner: Arc<dyn PublishedElement>) -> Self {
        Self {
            type_name: type_name.into(),
            inner,
        }
    }
}

impl PublishedElement for TypedModel {
    fn key(&self) -> Uuid {
        self.inner.key()
    }

    fn content_type_alias(&self) -> &str {
        self.inner.content_type_alias()
    }

    fn value(&self, property_alias: &str) -> Option<&Value> {
        self.inner.value(property_alias)
    }

    fn model_type(&self) -> Option<&str> {
        Some(&self.type_name)
    }
}

/// A list of models of one runtime type
#[derive(Debug, Clone)]
pub struct ModelList {
    element_type: RuntimeType,
    items: Vec<Arc<dyn PublishedElement>>,
}

impl ModelList {
    /// An empty list of generic elements
    pub fn generic() -> Self {
        Self::typed(RuntimeType::Element)
    }

    pub fn typed(element_type: RuntimeType) -> Self {
        Self {
            element_type,
            items: Vec::new(),
        }
    }

    pub fn element_type(&self) -> &RuntimeType {
        &self.element_type
    }

    pub fn push(&mut self, item: Arc<dyn PublishedElement>) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PublishedElement>> {
        self.items.iter()
    }
}
