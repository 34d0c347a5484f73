//! Generation cache
//!
//! Persists generated source, the compiled module pointer and the fingerprint
//! marker under the models directory, so a restart with an unchanged schema
//! reuses the previous build instead of regenerating it.
//!
//! Write order on store is generated source, bundle, compiled module, pointer,
//! and the marker last: a crash part-way leaves a marker that does not match
//! the new fingerprint, which reads as a miss.

use super::source::SourceBundle;
use crate::backend::{CompiledModule, HostCompiler};
use crate::error::ModelsError;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const HASH_FILE: &str = "models.hash";
pub const GENERATED_FILE: &str = "models.generated.rs";
pub const BUNDLE_FILE: &str = "all.generated.rs";
pub const MODULE_POINTER_FILE: &str = "all.module.path";
pub const ERROR_FILE: &str = "models.err";
pub const OUT_OF_DATE_FILE: &str = "ood.flag";
pub const COMPILED_DIR: &str = "Compiled";
pub const LOCK_FILE: &str = "models.lock";

const ARTIFACTS: &[&str] = &[
    HASH_FILE,
    GENERATED_FILE,
    BUNDLE_FILE,
    MODULE_POINTER_FILE,
    ERROR_FILE,
    OUT_OF_DATE_FILE,
    COMPILED_DIR,
    LOCK_FILE,
];

/// Whether a file name in the models directory is one this cache writes
pub fn is_artifact(name: &str) -> bool {
    ARTIFACTS.contains(&name) || name.starts_with(".tmp") || name.ends_with(".generated.rs")
}

/// A reusable compiled generation
#[derive(Debug)]
pub struct CachedGeneration {
    pub module: Arc<dyn CompiledModule>,
    /// The bundle text the module was compiled from, empty if lost
    pub source: String,
}

/// Outcome of a cache lookup
#[derive(Debug)]
pub enum CacheLookup {
    /// Compiled module reusable as-is
    Module(CachedGeneration),
    /// Only the bundle text is reusable; it must be recompiled
    Source(String),
    Miss,
}

#[derive(Debug, Clone)]
pub struct GenerationCache {
    dir: PathBuf,
}

impl GenerationCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// User-authored source files: every `*.rs` directly in the directory
    /// that is not generated, keyed by file name.
    pub fn user_files(&self) -> Result<BTreeMap<String, String>, ModelsError> {
        let mut files = BTreeMap::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => {
                return Err(ModelsError::io(format!("Failed to list {}", self.dir.display()), e));
            }
        };

        for entry in entries {
            let entry = entry.map_err(|e| ModelsError::io("Failed to read directory entry", e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".rs") || is_artifact(&name) {
                continue;
            }
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let text = fs::read_to_string(entry.path())
                .map_err(|e| ModelsError::io(format!("Failed to read {}", entry.path().display()), e))?;
            files.insert(name, text);
        }

        Ok(files)
    }

    /// Look for a reusable generation for `fingerprint`.
    ///
    /// Never fails: anything unreadable or inconsistent is a miss.
    pub fn try_load(&self, fingerprint: &str, compiler: &dyn HostCompiler) -> CacheLookup {
        let marker = self.read_optional(HASH_FILE);
        if marker.as_deref().map(str::trim) != Some(fingerprint) {
            debug!("Models cache miss: marker {:?} != {}", marker, fingerprint);
            return CacheLookup::Miss;
        }

        // a failed compile may have left a newer bundle behind
        let bundle = self.read_optional(BUNDLE_FILE).filter(|text| {
            SourceBundle::header(text).map(|(fp, _)| fp).as_deref() == Some(fingerprint)
        });

        if let Some(module) = self.load_module(fingerprint, compiler) {
            info!("Reusing compiled models module {}", module.location().display());
            return CacheLookup::Module(CachedGeneration {
                module,
                source: bundle.unwrap_or_default(),
            });
        }

        match bundle {
            Some(text) => {
                info!("Reusing cached models source for {}", fingerprint);
                CacheLookup::Source(text)
            }
            None => CacheLookup::Miss,
        }
    }

    fn load_module(
        &self,
        fingerprint: &str,
        compiler: &dyn HostCompiler,
    ) -> Option<Arc<dyn CompiledModule>> {
        let pointer = self.read_optional(MODULE_POINTER_FILE)?;
        let location = self.dir.join(pointer.trim());
        if !location.is_file() {
            return None;
        }
        if delete_marker(&location).exists() {
            debug!("Not loading {}: marked for deletion", location.display());
            return None;
        }

        let module = match compiler.load(&location) {
            Ok(module) => module,
            Err(e) => {
                warn!("Failed to load cached models module: {}", e);
                return None;
            }
        };
        if module.source_fingerprint() != Some(fingerprint) {
            warn!(
                "Cached models module {} was built from {:?}, expected {}",
                location.display(),
                module.source_fingerprint(),
                fingerprint
            );
            return None;
        }
        Some(module)
    }

    /// Persist a freshly emitted generation and compile it.
    pub fn store(
        &self,
        bundle: &SourceBundle,
        compiler: &dyn HostCompiler,
        module_name: &str,
    ) -> Result<Arc<dyn CompiledModule>, ModelsError> {
        self.write_atomic(GENERATED_FILE, bundle.generated())?;
        self.compile_bundle(bundle.fingerprint(), bundle.revision(), &bundle.render(), compiler, module_name)
    }

    /// Recompile previously cached bundle text (already restamped).
    pub fn store_source(
        &self,
        fingerprint: &str,
        text: &str,
        compiler: &dyn HostCompiler,
        module_name: &str,
    ) -> Result<Arc<dyn CompiledModule>, ModelsError> {
        let revision = SourceBundle::header(text)
            .map(|(_, revision)| revision)
            .ok_or_else(|| ModelsError::Emit("cached source bundle has no header".to_string()))?;
        self.compile_bundle(fingerprint, revision, text, compiler, module_name)
    }

    fn compile_bundle(
        &self,
        fingerprint: &str,
        revision: u64,
        text: &str,
        compiler: &dyn HostCompiler,
        module_name: &str,
    ) -> Result<Arc<dyn CompiledModule>, ModelsError> {
        self.write_atomic(BUNDLE_FILE, text)?;

        let relative = Path::new(COMPILED_DIR).join(format!("generated.{}.{}.module", fingerprint, revision));
        let output = self.dir.join(&relative);
        let module = compiler.compile(module_name, text, &output)?;

        self.write_atomic(MODULE_POINTER_FILE, &relative.to_string_lossy())?;
        self.write_atomic(HASH_FILE, fingerprint)?;
        self.prune(&output);

        Ok(module)
    }

    /// Best-effort removal of compiled modules other than `keep`. Modules
    /// that cannot be removed are marked for deletion instead.
    fn prune(&self, keep: &Path) {
        let compiled = self.path(COMPILED_DIR);
        let Ok(entries) = fs::read_dir(&compiled) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path == keep {
                continue;
            }
            let is_marker = path.extension().is_some_and(|ext| ext == "delete");
            if is_marker {
                let module = path.with_extension("");
                if !module.exists() {
                    let _ = fs::remove_file(&path);
                }
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => debug!("Pruned {}", path.display()),
                Err(e) => {
                    debug!("Could not prune {} ({}), marking it", path.display(), e);
                    let _ = fs::write(delete_marker(&path), "");
                }
            }
        }
    }

    /// Note that the schema changed since the last publication
    pub fn flag_out_of_date(&self) -> Result<(), ModelsError> {
        self.write_atomic(OUT_OF_DATE_FILE, &chrono::Utc::now().to_rfc3339())
    }

    pub fn is_out_of_date(&self) -> bool {
        self.path(OUT_OF_DATE_FILE).exists()
    }

    /// Clear the out-of-date flag after a publication
    pub fn invalidate(&self) -> Result<(), ModelsError> {
        self.remove_optional(OUT_OF_DATE_FILE)
    }

    pub fn record_error(&self, message: &str) -> Result<(), ModelsError> {
        self.write_atomic(ERROR_FILE, message)
    }

    pub fn clear_error(&self) -> Result<(), ModelsError> {
        self.remove_optional(ERROR_FILE)
    }

    /// The last recorded error, possibly from another process
    pub fn last_error(&self) -> Option<String> {
        self.read_optional(ERROR_FILE)
    }

    fn read_optional(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.path(name)).ok()
    }

    fn remove_optional(&self, name: &str) -> Result<(), ModelsError> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ModelsError::io(format!("Failed to remove {}", path.display()), e)),
        }
    }

    fn write_atomic(&self, name: &str, contents: &str) -> Result<(), ModelsError> {
        let target = self.path(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ModelsError::io(format!("Failed to create {}", parent.display()), e))?;
        }

        let mut file = NamedTempFile::new_in(&self.dir)
            .map_err(|e| ModelsError::io(format!("Failed to write {}", target.display()), e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| ModelsError::io(format!("Failed to write {}", target.display()), e))?;
        file.persist(&target)
            .map_err(|e| ModelsError::io(format!("Failed to replace {}", target.display()), e.error))?;
        Ok(())
    }
}

fn delete_marker(module: &Path) -> PathBuf {
    let mut name = OsString::from(module.as_os_str());
    name.push(".delete");
    PathBuf::from(name)
}
