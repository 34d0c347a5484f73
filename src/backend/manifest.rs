//! Manifest backend
//!
//! A self-contained emitter/compiler pair. The emitter writes one annotated
//! declaration per content type; the compiler "compiles" a source bundle by
//! collecting those declarations into a JSON manifest, which it can load back
//! as a module whose constructors build `TypedModel` facades.

use super::{
    CodeEmitter, CompilationObserver, CompiledModule, ConstructorHandle, ExportedType,
    HostCompiler, ParameterKind,
};
use crate::error::{CompileError, ModelsError};
use crate::generation::SourceBundle;
use crate::registry::{PublishedElement, TypedModel};
use crate::schema::RuntimeType;
use crate::snapshot::SchemaSnapshot;
use once_cell::sync::Lazy;
use parking_lot::{ReentrantMutex, RwLock};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

static MODEL_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"#\[model(?:\(\s*alias\s*=\s*"((?:[^"\\]|\\.)+)"\s*\))?\]\s*pub\s+struct\s+(\w+)"#)
        .expect("model declaration pattern is valid")
});

static COMPILE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"compile_error!\(\s*"([^"]*)"\s*\)"#).expect("compile_error pattern is valid")
});

/// A `#[model]` declaration found in source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredModel {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl DeclaredModel {
    /// The alias this declaration binds, explicit or by type name
    pub fn effective_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.type_name)
    }
}

/// Every `#[model]` declaration in `source`, in order of appearance
pub fn declared_models(source: &str) -> Vec<DeclaredModel> {
    MODEL_DECLARATION
        .captures_iter(source)
        .map(|caps| DeclaredModel {
            type_name: caps[2].to_string(),
            alias: caps.get(1).map(|m| unescape(m.as_str())),
        })
        .collect()
}

/// Undo the escapes `{:?}` writes into a string literal
fn unescape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('u') => {
                // \u{hex}
                let code: String = chars.by_ref().skip(1).take_while(|c| *c != '}').collect();
                if let Some(ch) = u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Emits model declarations for a snapshot
#[derive(Debug, Default, Clone)]
pub struct ManifestEmitter;

impl ManifestEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl CodeEmitter for ManifestEmitter {
    fn emit(
        &self,
        snapshot: &SchemaSnapshot,
        user_files: &BTreeMap<String, String>,
    ) -> Result<String, ModelsError> {
        let user_declared: HashSet<String> = user_files
            .values()
            .flat_map(|text| declared_models(text))
            .map(|model| model.effective_alias().to_lowercase())
            .collect();
        let binding_names = snapshot.binding_names();
        let render = |runtime_type: &RuntimeType| {
            runtime_type
                .map_models(&|alias| {
                    binding_names
                        .get(&alias.to_lowercase())
                        .map(RuntimeType::named)
                        .unwrap_or(RuntimeType::Element)
                })
                .to_string()
        };

        let mut types: Vec<_> = snapshot.types.iter().collect();
        types.sort_by(|a, b| a.alias.cmp(&b.alias));

        let mut out = String::new();
        writeln!(out, "use crate::models::prelude::*;").map_err(emit_error)?;

        for descriptor in types {
            if user_declared.contains(&descriptor.alias.to_lowercase()) {
                debug!("Skipping {}: declared by a user file", descriptor.alias);
                continue;
            }

            writeln!(out).map_err(emit_error)?;
            for line in descriptor.display_name.lines() {
                writeln!(out, "/// {}", line).map_err(emit_error)?;
            }
            if let Some(description) = descriptor.description.as_deref().filter(|d| !d.is_empty()) {
                writeln!(out, "///").map_err(emit_error)?;
                for line in description.lines() {
                    writeln!(out, "/// {}", line).map_err(emit_error)?;
                }
            }
            writeln!(out, "#[model(alias = {:?})]", descriptor.alias).map_err(emit_error)?;
            writeln!(out, "pub struct {};", descriptor.binding_name).map_err(emit_error)?;
            writeln!(out, "// kind: {}", descriptor.item_kind).map_err(emit_error)?;

            if let Some(base) = snapshot.base_of(descriptor) {
                writeln!(out, "// extends: {}", base.binding_name).map_err(emit_error)?;
            }
            let mixins = snapshot.mixins_of(descriptor);
            if !mixins.is_empty() {
                let names: Vec<&str> = mixins.iter().map(|m| m.binding_name.as_str()).collect();
                writeln!(out, "// mixes: {}", names.join(", ")).map_err(emit_error)?;
            }
            for property in &descriptor.properties {
                writeln!(
                    out,
                    "// property {}: {}",
                    property.binding_name,
                    render(&property.runtime_type)
                )
                .map_err(emit_error)?;
            }
        }

        Ok(out)
    }
}

fn emit_error(err: std::fmt::Error) -> ModelsError {
    ModelsError::Emit(err.to_string())
}

/// On-disk form of a compiled module
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    name: String,
    fingerprint: String,
    revision: u64,
    types: Vec<DeclaredModel>,
}

/// A module loaded from a manifest
#[derive(Debug)]
pub struct ManifestModule {
    location: PathBuf,
    manifest: Manifest,
}

impl CompiledModule for ManifestModule {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn location(&self) -> &Path {
        &self.location
    }

    fn source_fingerprint(&self) -> Option<&str> {
        Some(&self.manifest.fingerprint)
    }

    fn revision(&self) -> u64 {
        self.manifest.revision
    }

    fn exported_types(&self) -> Vec<ExportedType> {
        self.manifest
            .types
            .iter()
            .map(|declared| {
                let type_name = declared.type_name.clone();
                let constructor = ConstructorHandle {
                    is_public: true,
                    parameters: vec![ParameterKind::Element],
                    invoke: Arc::new(
                        move |element: Arc<dyn PublishedElement>| -> Arc<dyn PublishedElement> {
                            Arc::new(TypedModel::new(type_name.clone(), element))
                        },
                    ),
                };
                ExportedType {
                    type_name: declared.type_name.clone(),
                    alias_annotation: declared.alias.clone(),
                    is_model: true,
                    runtime_type: RuntimeType::named(declared.type_name.clone()),
                    constructors: vec![constructor],
                }
            })
            .collect()
    }
}

/// Host compiler producing manifest modules
#[derive(Default)]
pub struct ManifestCompiler {
    lock: ReentrantMutex<()>,
    observer: RwLock<Option<Weak<dyn CompilationObserver>>>,
}

impl ManifestCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile some unrelated host artifact that may reference the models.
    ///
    /// Runs under the compilation lock and asks the observer for the module
    /// to depend on. Returns that module's name.
    pub fn compile_dependent(&self, artifact: &str) -> Option<String> {
        let _guard = self.lock.lock();
        let observer = self.observer.read().as_ref().and_then(Weak::upgrade)?;
        let module = observer.models_for_compilation()?;
        debug!("Compiling {} against models module {}", artifact, module.name());
        Some(module.name().to_string())
    }
}

impl HostCompiler for ManifestCompiler {
    fn compilation_lock(&self) -> &ReentrantMutex<()> {
        &self.lock
    }

    fn set_observer(&self, observer: Weak<dyn CompilationObserver>) {
        *self.observer.write() = Some(observer);
    }

    fn compile(
        &self,
        module_name: &str,
        source: &str,
        output: &Path,
    ) -> Result<Arc<dyn CompiledModule>, CompileError> {
        let _guard = self.lock.lock();

        if let Some(caps) = COMPILE_ERROR.captures(source) {
            return Err(CompileError::new(module_name, &caps[1]));
        }

        let (fingerprint, revision) = SourceBundle::header(source)
            .ok_or_else(|| CompileError::new(module_name, "source bundle has no header"))?;

        let manifest = Manifest {
            name: module_name.to_string(),
            fingerprint,
            revision,
            types: declared_models(source),
        };

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CompileError::new(module_name, format!("{}: {}", parent.display(), e)))?;
        }
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| CompileError::new(module_name, e.to_string()))?;
        fs::write(output, bytes)
            .map_err(|e| CompileError::new(module_name, format!("{}: {}", output.display(), e)))?;

        info!(
            "Compiled {} revision {} ({} models)",
            module_name,
            manifest.revision,
            manifest.types.len()
        );

        Ok(Arc::new(ManifestModule {
            location: output.to_path_buf(),
            manifest,
        }))
    }

    fn load(&self, location: &Path) -> Result<Arc<dyn CompiledModule>, CompileError> {
        let text = fs::read_to_string(location)
            .map_err(|e| CompileError::new(location.display().to_string(), e.to_string()))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| CompileError::new(location.display().to_string(), e.to_string()))?;
        Ok(Arc::new(ManifestModule {
            location: location.to_path_buf(),
            manifest,
        }))
    }
}
