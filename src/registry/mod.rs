//! Model Registry Module
//!
//! Maps content type aliases to the constructors of a compiled module, so
//! that binding an element to its typed model is one map lookup and one call.

pub mod facade;

pub use facade::{ModelList, PropertyBag, PublishedElement, TypedModel};

use crate::backend::{CompiledModule, ModelCtor};
use crate::error::ConstructorShapeError;
use crate::schema::RuntimeType;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Builds an empty list of one model type
pub type ListCtor = Arc<dyn Fn() -> ModelList + Send + Sync>;

/// One registered model type
pub struct RegistryEntry {
    alias: String,
    type_name: String,
    runtime_type: RuntimeType,
    trampoline: ModelCtor,
    list_ctor: OnceLock<ListCtor>,
}

impl RegistryEntry {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn runtime_type(&self) -> &RuntimeType {
        &self.runtime_type
    }

    /// The memoized list constructor, built on first use
    pub fn list_ctor(&self) -> &ListCtor {
        self.list_ctor.get_or_init(|| {
            let element_type = self.runtime_type.clone();
            let ctor: ListCtor = Arc::new(move || ModelList::typed(element_type.clone()));
            ctor
        })
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("alias", &self.alias)
            .field("type_name", &self.type_name)
            .field("runtime_type", &self.runtime_type)
            .finish_non_exhaustive()
    }
}

/// Alias -> constructor lookup for one compiled module
#[derive(Debug, Default)]
pub struct ModelRegistry {
    /// Keyed by lowercased alias
    entries: HashMap<String, RegistryEntry>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register every model type a module exports.
    ///
    /// Fails as a whole on the first shape problem: a registry silently
    /// missing types is worse than none.
    pub fn build(module: &dyn CompiledModule) -> Result<Self, ConstructorShapeError> {
        let mut entries: HashMap<String, RegistryEntry> = HashMap::new();

        for exported in module.exported_types().into_iter().filter(|t| t.is_model) {
            let mut matching = exported
                .constructors
                .iter()
                .filter(|c| c.is_public && c.parameters.len() == 1 && c.parameters[0].accepts_element());

            let constructor = match (matching.next(), matching.count()) {
                (Some(constructor), 0) => constructor,
                (None, _) => {
                    return Err(ConstructorShapeError::Missing {
                        type_name: exported.type_name,
                    })
                }
                (Some(_), others) => {
                    return Err(ConstructorShapeError::Ambiguous {
                        type_name: exported.type_name,
                        count: others + 1,
                    })
                }
            };

            let alias = exported
                .alias_annotation
                .clone()
                .unwrap_or_else(|| exported.type_name.clone());
            let key = alias.to_lowercase();
            if let Some(existing) = entries.get(&key) {
                return Err(ConstructorShapeError::DuplicateAlias {
                    alias,
                    first: existing.type_name.clone(),
                    second: exported.type_name,
                });
            }

            entries.insert(
                key,
                RegistryEntry {
                    alias,
                    type_name: exported.type_name.clone(),
                    runtime_type: exported.runtime_type.clone(),
                    // resolved once here; the hot path is a single indirect call
                    trampoline: Arc::clone(&constructor.invoke),
                    list_ctor: OnceLock::new(),
                },
            );
        }

        debug!("Registered {} models from module {}", entries.len(), module.name());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive alias lookup
    pub fn get(&self, alias: &str) -> Option<&RegistryEntry> {
        self.entries.get(&alias.to_lowercase())
    }

    /// Registered aliases, sorted
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.entries.values().map(|e| e.alias.as_str()).collect();
        aliases.sort_unstable();
        aliases
    }

    /// Bind an element to its typed model; unknown aliases get the element back
    pub fn create_model(&self, element: Arc<dyn PublishedElement>) -> Arc<dyn PublishedElement> {
        match self.get(element.content_type_alias()) {
            Some(entry) => (entry.trampoline)(element),
            None => element,
        }
    }

    /// An empty list typed for `alias`, or a generic one for unknown aliases
    pub fn create_model_list(&self, alias: &str) -> ModelList {
        match self.get(alias) {
            Some(entry) => (entry.list_ctor())(),
            None => ModelList::generic(),
        }
    }

    /// Resolve model references to registered runtime types; unknown
    /// aliases resolve to the generic element
    pub fn map_runtime_type(&self, runtime_type: &RuntimeType) -> RuntimeType {
        runtime_type.map_models(&|alias| {
            self.get(alias)
                .map(|entry| entry.runtime_type.clone())
                .unwrap_or(RuntimeType::Element)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ConstructorHandle, ExportedType, ParameterKind};
    use std::path::{Path, PathBuf};

    #[derive(Debug)]
    struct FakeModule {
        location: PathBuf,
        types: Vec<ExportedType>,
    }

    impl CompiledModule for FakeModule {
        fn name(&self) -> &str {
            "Fake.Models"
        }

        fn location(&self) -> &Path {
            &self.location
        }

        fn source_fingerprint(&self) -> Option<&str> {
            None
        }

        fn revision(&self) -> u64 {
            1
        }

        fn exported_types(&self) -> Vec<ExportedType> {
            self.types.clone()
        }
    }

    fn module(types: Vec<ExportedType>) -> FakeModule {
        FakeModule {
            location: PathBuf::from("fake.module"),
            types,
        }
    }

    fn ctor(type_name: &str, parameter: ParameterKind) -> ConstructorHandle {
        let type_name = type_name.to_string();
        ConstructorHandle {
            is_public: true,
            parameters: vec![parameter],
            invoke: Arc::new(move |element: Arc<dyn PublishedElement>| -> Arc<dyn PublishedElement> {
                Arc::new(TypedModel::new(type_name.clone(), element))
            }),
        }
    }

    fn model_type(type_name: &str, alias: Option<&str>, constructors: Vec<ConstructorHandle>) -> ExportedType {
        ExportedType {
            type_name: type_name.to_string(),
            alias_annotation: alias.map(str::to_string),
            is_model: true,
            runtime_type: RuntimeType::named(type_name),
            constructors,
        }
    }

    fn blog_registry() -> ModelRegistry {
        ModelRegistry::build(&module(vec![
            model_type("BlogPost", Some("blogPost"), vec![ctor("BlogPost", ParameterKind::Content)]),
            model_type("Author", None, vec![ctor("Author", ParameterKind::Element)]),
        ]))
        .unwrap()
    }

    #[test]
    fn test_create_model_binds_known_alias() {
        let registry = blog_registry();
        let element: Arc<dyn PublishedElement> = Arc::new(PropertyBag::new("BLOGPOST"));
        let model = registry.create_model(element);
        assert_eq!(model.model_type(), Some("BlogPost"));
    }

    #[test]
    fn test_create_model_returns_unknown_element_unchanged() {
        let registry = blog_registry();
        let element: Arc<dyn PublishedElement> = Arc::new(PropertyBag::new("newsItem"));
        let model = registry.create_model(Arc::clone(&element));
        assert!(Arc::ptr_eq(&model, &element));
        assert_eq!(model.model_type(), None);
    }

    #[test]
    fn test_alias_falls_back_to_type_name() {
        let registry = blog_registry();
        assert_eq!(registry.aliases(), vec!["Author", "blogPost"]);
        assert!(registry.get("author").is_some());
    }

    #[test]
    fn test_missing_constructor_is_fatal() {
        let mut private = ctor("Page", ParameterKind::Element);
        private.is_public = false;
        let wrong_param = ctor("Page", ParameterKind::Other("String".to_string()));
        let result = ModelRegistry::build(&module(vec![
            model_type("Author", None, vec![ctor("Author", ParameterKind::Element)]),
            model_type("Page", None, vec![private, wrong_param]),
        ]));
        assert_eq!(
            result.unwrap_err(),
            ConstructorShapeError::Missing {
                type_name: "Page".to_string()
            }
        );
    }

    #[test]
    fn test_multiple_constructors_are_fatal() {
        let result = ModelRegistry::build(&module(vec![model_type(
            "Page",
            None,
            vec![ctor("Page", ParameterKind::Element), ctor("Page", ParameterKind::Content)],
        )]));
        assert_eq!(
            result.unwrap_err(),
            ConstructorShapeError::Ambiguous {
                type_name: "Page".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn test_duplicate_alias_is_fatal() {
        let result = ModelRegistry::build(&module(vec![
            model_type("BlogPost", Some("blogPost"), vec![ctor("BlogPost", ParameterKind::Element)]),
            model_type("LegacyPost", Some("BlogPost"), vec![ctor("LegacyPost", ParameterKind::Element)]),
        ]));
        assert!(matches!(
            result,
            Err(ConstructorShapeError::DuplicateAlias { ref first, ref second, .. })
                if first == "BlogPost" && second == "LegacyPost"
        ));
    }

    #[test]
    fn test_non_model_types_are_ignored() {
        let mut helper = model_type("Helpers", None, vec![]);
        helper.is_model = false;
        let registry = ModelRegistry::build(&module(vec![helper])).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_model_list_constructor_is_memoized() {
        let registry = blog_registry();
        let entry = registry.get("blogPost").unwrap();
        let first = Arc::clone(entry.list_ctor());
        let second = Arc::clone(entry.list_ctor());
        assert!(Arc::ptr_eq(&first, &second));

        let list = registry.create_model_list("blogPost");
        assert!(list.is_empty());
        assert_eq!(list.element_type(), &RuntimeType::named("BlogPost"));
        assert_eq!(registry.create_model_list("unknown").element_type(), &RuntimeType::Element);
    }

    #[test]
    fn test_map_runtime_type_resolves_model_references() {
        let registry = blog_registry();
        let declared: RuntimeType = "List<@blogPost>".parse().unwrap();
        assert_eq!(registry.map_runtime_type(&declared).to_string(), "List<BlogPost>");
        let unknown: RuntimeType = "@missing".parse().unwrap();
        assert_eq!(registry.map_runtime_type(&unknown), RuntimeType::Element);
        let plain = RuntimeType::named("String");
        assert_eq!(registry.map_runtime_type(&plain), plain);
    }
}
