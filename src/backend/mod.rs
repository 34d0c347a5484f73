//! Code generation backend
//!
//! The two external collaborators a rebuild drives, the code emitter and the
//! host compiler, and the shape of what the compiler hands back.

pub mod manifest;

pub use manifest::{ManifestCompiler, ManifestEmitter};

use crate::error::{CompileError, ModelsError};
use crate::registry::PublishedElement;
use crate::schema::RuntimeType;
use crate::snapshot::SchemaSnapshot;
use parking_lot::ReentrantMutex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};

/// Constructs a typed facade from an element facade
pub type ModelCtor = Arc<dyn Fn(Arc<dyn PublishedElement>) -> Arc<dyn PublishedElement> + Send + Sync>;

/// Turns a snapshot (plus user files) into generated source text
pub trait CodeEmitter: Send + Sync {
    fn emit(
        &self,
        snapshot: &SchemaSnapshot,
        user_files: &BTreeMap<String, String>,
    ) -> Result<String, ModelsError>;
}

/// Notified by the host compiler when it compiles something that may depend
/// on the current models module
pub trait CompilationObserver: Send + Sync {
    fn models_for_compilation(&self) -> Option<Arc<dyn CompiledModule>>;
}

/// The host's compiler
///
/// The host serializes every compilation behind `compilation_lock`, which is
/// reentrant: code already holding it may compile.
pub trait HostCompiler: Send + Sync {
    fn compilation_lock(&self) -> &ReentrantMutex<()>;

    fn set_observer(&self, observer: Weak<dyn CompilationObserver>);

    /// Compile a source bundle into a module written at `output`
    fn compile(
        &self,
        module_name: &str,
        source: &str,
        output: &Path,
    ) -> Result<Arc<dyn CompiledModule>, CompileError>;

    /// Load a previously compiled module
    fn load(&self, location: &Path) -> Result<Arc<dyn CompiledModule>, CompileError>;
}

/// A loaded compiled module
pub trait CompiledModule: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn location(&self) -> &Path;

    /// Fingerprint of the source the module was compiled from
    fn source_fingerprint(&self) -> Option<&str>;

    /// Revision stamped into the source at compile time
    fn revision(&self) -> u64;

    fn exported_types(&self) -> Vec<ExportedType>;
}

/// How a constructor parameter relates to the element facade capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// The base element facade
    Element,
    /// A facade extending the element facade
    Content,
    /// Anything else
    Other(String),
}

impl ParameterKind {
    pub fn accepts_element(&self) -> bool {
        matches!(self, ParameterKind::Element | ParameterKind::Content)
    }
}

/// A constructor exported by a module type
#[derive(Clone)]
pub struct ConstructorHandle {
    pub is_public: bool,
    pub parameters: Vec<ParameterKind>,
    pub invoke: ModelCtor,
}

impl fmt::Debug for ConstructorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorHandle")
            .field("is_public", &self.is_public)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// A type exported by a compiled module
#[derive(Debug, Clone)]
pub struct ExportedType {
    pub type_name: String,
    /// Explicit content type alias annotation
    pub alias_annotation: Option<String>,
    /// Whether the type implements the binding facade capability
    pub is_model: bool,
    pub runtime_type: RuntimeType,
    pub constructors: Vec<ConstructorHandle>,
}
