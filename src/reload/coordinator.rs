//! Reload coordinator
//!
//! Owns the current generation of models and decides when to rebuild it.
//! Readers go through `ensure_ready`, which is a read lock and a pointer load
//! while nothing changed. After an invalidation the first reader rebuilds
//! while the rest wait, and the new generation is published with one
//! atomic pointer swap.

use super::generation::Generation;
use super::lock_order::LockOrder;
use crate::backend::{CodeEmitter, CompilationObserver, CompiledModule, HostCompiler};
use crate::error::ModelsError;
use crate::generation::{CacheLookup, DirectoryLock, GenerationCache, SourceBundle};
use crate::registry::{ModelList, ModelRegistry, PublishedElement};
use crate::schema::RuntimeType;
use crate::snapshot::{ChangeFingerprint, SchemaSnapshotBuilder};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Where the coordinator is in its build cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Stale,
    Building,
    Ready,
}

#[derive(Debug)]
struct ReloadState {
    status: BuildStatus,
}

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Name given to compiled modules
    pub module_name: String,
    /// How long to wait for the models directory lock
    pub lock_timeout: Duration,
    /// Write the out-of-date flag on invalidation
    pub flag_out_of_date: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            module_name: "Generated.Models".to_string(),
            lock_timeout: Duration::from_secs(120),
            flag_out_of_date: true,
        }
    }
}

/// Snapshot of the coordinator for status surfaces
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsStatus {
    pub state: BuildStatus,
    pub version: Option<u64>,
    pub fingerprint: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub aliases: Vec<String>,
    pub out_of_date: bool,
    pub last_error: Option<String>,
}

pub struct ReloadCoordinator {
    builder: SchemaSnapshotBuilder,
    emitter: Arc<dyn CodeEmitter>,
    compiler: Arc<dyn HostCompiler>,
    cache: GenerationCache,
    options: CoordinatorOptions,
    state: RwLock<ReloadState>,
    /// Set by `invalidate`, cleared when a build picks the change up
    stale: AtomicBool,
    /// Serializes writes and removals of the out-of-date flag
    flag_lock: Mutex<()>,
    current: ArcSwapOption<Generation>,
    last_error: Mutex<Option<String>>,
    next_version: AtomicU64,
    changes: broadcast::Sender<u64>,
}

impl ReloadCoordinator {
    /// Create a coordinator and register it with the host compiler.
    ///
    /// Nothing is built until the first `ensure_ready`.
    pub fn new(
        builder: SchemaSnapshotBuilder,
        emitter: Arc<dyn CodeEmitter>,
        compiler: Arc<dyn HostCompiler>,
        cache: GenerationCache,
        options: CoordinatorOptions,
    ) -> Arc<Self> {
        let (changes, _) = broadcast::channel(16);
        let coordinator = Arc::new(Self {
            builder,
            emitter,
            compiler,
            cache,
            options,
            state: RwLock::new(ReloadState {
                status: BuildStatus::Stale,
            }),
            stale: AtomicBool::new(true),
            flag_lock: Mutex::new(()),
            current: ArcSwapOption::empty(),
            last_error: Mutex::new(None),
            next_version: AtomicU64::new(1),
            changes,
        });

        let observer: Weak<ReloadCoordinator> = Arc::downgrade(&coordinator);
        coordinator.compiler.set_observer(observer);
        coordinator
    }

    fn lock_order(&self) -> LockOrder<'_, ReloadState> {
        LockOrder::new(self.compiler.compilation_lock(), &self.state)
    }

    /// The current generation, building it first if stale.
    ///
    /// Always returns a generation: failed builds yield the previous one, or
    /// an empty one when there is no previous one.
    pub fn ensure_ready(&self) -> Arc<Generation> {
        {
            let state = self.state.read();
            if let Some(current) = self.fresh(&state) {
                return current;
            }
        }

        self.lock_order().exclusive(|state| {
            // another thread may have rebuilt while we waited
            if let Some(current) = self.fresh(&state) {
                return current;
            }

            let mut state = RwLockUpgradableReadGuard::upgrade(state);
            state.status = BuildStatus::Building;
            // invalidations from here on need another build
            self.stale.store(false, Ordering::SeqCst);
            let generation = self.build_generation();
            state.status = BuildStatus::Ready;
            generation
        })
    }

    fn fresh(&self, state: &ReloadState) -> Option<Arc<Generation>> {
        if state.status == BuildStatus::Ready && !self.stale.load(Ordering::SeqCst) {
            self.current.load_full()
        } else {
            None
        }
    }

    /// Mark the models stale. Never waits for a running build; the rebuild
    /// happens on the next `ensure_ready`.
    pub fn invalidate(&self) {
        let _flag = self.flag_lock.lock();
        if self.stale.swap(true, Ordering::SeqCst) {
            debug!("Models already stale");
            return;
        }

        info!("Models invalidated");
        if self.options.flag_out_of_date {
            if let Err(e) = self.cache.flag_out_of_date() {
                warn!("Failed to flag models out of date: {}", e);
            }
        }
    }

    /// Clear the out-of-date flag unless the models went stale again mid-build
    fn clear_out_of_date(&self) {
        let _flag = self.flag_lock.lock();
        if self.stale.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.cache.invalidate() {
            warn!("Failed to clear out-of-date flag: {}", e);
        }
    }

    /// Runs with the exclusive permit held
    fn build_generation(&self) -> Arc<Generation> {
        match self.rebuild() {
            Ok(generation) => {
                let generation = Arc::new(generation);
                self.current.store(Some(Arc::clone(&generation)));
                self.clear_error();
                self.clear_out_of_date();
                info!(
                    "Published models version {} ({} models)",
                    generation.version,
                    generation.registry.len()
                );
                let _ = self.changes.send(generation.version);
                generation
            }
            Err(e) => {
                error!("Failed to build models: {}", e);
                self.record_error(&e);
                match self.current.load_full() {
                    Some(previous) => {
                        warn!("Keeping models version {}", previous.version);
                        previous
                    }
                    None => {
                        let generation = Arc::new(Generation::empty(self.reserve_version(), e.to_string()));
                        self.current.store(Some(Arc::clone(&generation)));
                        warn!("Running with no models (version {})", generation.version);
                        let _ = self.changes.send(generation.version);
                        generation
                    }
                }
            }
        }
    }

    fn rebuild(&self) -> Result<Generation, ModelsError> {
        let _dir_lock = DirectoryLock::acquire(self.cache.directory(), self.options.lock_timeout)?;

        let snapshot = self.builder.build()?;
        let user_files = self.cache.user_files()?;
        let fingerprint = ChangeFingerprint::compute(&user_files, &snapshot.types);
        debug!("Models fingerprint {} ({} types, {} user files)", fingerprint, snapshot.len(), user_files.len());

        let compiler = self.compiler.as_ref();
        let module_name = self.options.module_name.as_str();
        let (module, source, version) = match self.cache.try_load(&fingerprint, compiler) {
            CacheLookup::Module(cached) => {
                self.skip_version(cached.module.revision());
                (cached.module, cached.source, self.reserve_version())
            }
            CacheLookup::Source(text) => {
                let version = self.reserve_version();
                let text = SourceBundle::restamp(&text, version);
                let module = self.cache.store_source(&fingerprint, &text, compiler, module_name)?;
                (module, text, version)
            }
            CacheLookup::Miss => {
                let version = self.reserve_version();
                let generated = self.emitter.emit(&snapshot, &user_files)?;
                let bundle = SourceBundle::new(&fingerprint, version, &user_files, generated);
                let module = self.cache.store(&bundle, compiler, module_name)?;
                (module, bundle.render(), version)
            }
        };

        let registry = ModelRegistry::build(module.as_ref())?;

        Ok(Generation {
            version,
            fingerprint: Some(fingerprint),
            snapshot: Some(Arc::new(snapshot)),
            source: Arc::from(source),
            module: Some(module),
            registry,
            created_at: Utc::now(),
            error: None,
        })
    }

    fn reserve_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Make sure no later compile reuses the revision of a loaded module
    fn skip_version(&self, revision: u64) {
        self.next_version.fetch_max(revision.saturating_add(1), Ordering::SeqCst);
    }

    fn record_error(&self, err: &ModelsError) {
        let message = format!("[{}] {}", err.code(), err);
        if let Err(e) = self.cache.record_error(&message) {
            warn!("Failed to persist models error: {}", e);
        }
        *self.last_error.lock() = Some(message);
    }

    fn clear_error(&self) {
        *self.last_error.lock() = None;
        if let Err(e) = self.cache.clear_error() {
            warn!("Failed to clear models error: {}", e);
        }
    }

    /// Bind an element to its typed model, or return it unchanged
    pub fn create_model(&self, element: Arc<dyn PublishedElement>) -> Arc<dyn PublishedElement> {
        self.ensure_ready().registry.create_model(element)
    }

    pub fn map_runtime_type(&self, runtime_type: &RuntimeType) -> RuntimeType {
        self.ensure_ready().registry.map_runtime_type(runtime_type)
    }

    pub fn create_model_list(&self, alias: &str) -> ModelList {
        self.ensure_ready().registry.create_model_list(alias)
    }

    /// The last build error, if the last build failed
    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.lock().clone().or_else(|| self.cache.last_error())
    }

    /// The published generation, without building
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.current.load_full()
    }

    /// Versions of published generations
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn cache(&self) -> &GenerationCache {
        &self.cache
    }

    /// Never blocks: a rebuild in progress reports as building
    pub fn status(&self) -> ModelsStatus {
        let state = match self.state.try_read().map(|state| state.status) {
            None | Some(BuildStatus::Building) => BuildStatus::Building,
            Some(_) if self.stale.load(Ordering::SeqCst) => BuildStatus::Stale,
            Some(status) => status,
        };
        let current = self.current.load_full();

        ModelsStatus {
            state,
            version: current.as_ref().map(|g| g.version),
            fingerprint: current.as_ref().and_then(|g| g.fingerprint.clone()),
            created_at: current.as_ref().map(|g| g.created_at),
            aliases: current
                .as_ref()
                .map(|g| g.registry.aliases().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
            out_of_date: self.cache.is_out_of_date(),
            last_error: self.get_last_error(),
        }
    }
}

impl CompilationObserver for ReloadCoordinator {
    /// Called by the host with its compilation lock held
    fn models_for_compilation(&self) -> Option<Arc<dyn CompiledModule>> {
        self.lock_order()
            .shared(|_| self.current.load_full().and_then(|g| g.module.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ManifestCompiler, ManifestEmitter};
    use crate::error::CompileError;
    use crate::generation::cache::{ERROR_FILE, OUT_OF_DATE_FILE};
    use crate::registry::PropertyBag;
    use crate::schema::{ContentTypeRecord, MemorySchemaStore, PropertyTypeRecord, SchemaDocument};
    use crate::snapshot::BindingNamePolicy;
    use parking_lot::ReentrantMutex;
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    /// Counts compiles; delegates everything to the manifest compiler
    #[derive(Default)]
    struct CountingCompiler {
        inner: ManifestCompiler,
        compiles: AtomicUsize,
    }

    impl CountingCompiler {
        fn compiles(&self) -> usize {
            self.compiles.load(Ordering::SeqCst)
        }
    }

    impl HostCompiler for CountingCompiler {
        fn compilation_lock(&self) -> &ReentrantMutex<()> {
            self.inner.compilation_lock()
        }

        fn set_observer(&self, observer: Weak<dyn CompilationObserver>) {
            self.inner.set_observer(observer)
        }

        fn compile(
            &self,
            module_name: &str,
            source: &str,
            output: &Path,
        ) -> Result<Arc<dyn CompiledModule>, CompileError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            self.inner.compile(module_name, source, output)
        }

        fn load(&self, location: &Path) -> Result<Arc<dyn CompiledModule>, CompileError> {
            self.inner.load(location)
        }
    }

    fn record(id: i32, alias: &str) -> ContentTypeRecord {
        ContentTypeRecord {
            id,
            alias: alias.to_string(),
            name: alias.to_string(),
            description: None,
            parent_id: -1,
            is_element: false,
            composition_ids: vec![],
            properties: vec![PropertyTypeRecord {
                alias: "title".to_string(),
                name: "Title".to_string(),
                description: None,
                editor_alias: "textbox".to_string(),
            }],
        }
    }

    fn document(aliases: &[&str]) -> SchemaDocument {
        let mut document = SchemaDocument {
            content_types: aliases
                .iter()
                .enumerate()
                .map(|(index, alias)| record(index as i32 + 1, alias))
                .collect(),
            ..SchemaDocument::default()
        };
        document
            .editors
            .insert("textbox".to_string(), RuntimeType::named("String"));
        document
    }

    struct Harness {
        store: Arc<MemorySchemaStore>,
        compiler: Arc<CountingCompiler>,
        coordinator: Arc<ReloadCoordinator>,
    }

    fn harness_with(dir: &Path, store: Arc<MemorySchemaStore>, options: CoordinatorOptions) -> Harness {
        let compiler = Arc::new(CountingCompiler::default());
        let coordinator = ReloadCoordinator::new(
            SchemaSnapshotBuilder::new(store.clone(), BindingNamePolicy::PascalAlias),
            Arc::new(ManifestEmitter::new()),
            compiler.clone(),
            GenerationCache::new(dir),
            options,
        );
        Harness {
            store,
            compiler,
            coordinator,
        }
    }

    fn harness(dir: &Path, aliases: &[&str]) -> Harness {
        let store = Arc::new(MemorySchemaStore::new(document(aliases)));
        harness_with(dir, store, CoordinatorOptions::default())
    }

    fn bag(alias: &str) -> Arc<dyn PublishedElement> {
        Arc::new(PropertyBag::new(alias))
    }

    #[test]
    fn test_ensure_ready_twice_compiles_once() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost", "author"]);

        let first = h.coordinator.ensure_ready();
        let second = h.coordinator.ensure_ready();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(h.compiler.compiles(), 1);
        assert_eq!(first.registry.aliases(), vec!["author", "blogPost"]);
        assert_eq!(h.coordinator.status().state, BuildStatus::Ready);
    }

    #[test]
    fn test_invalidate_with_unchanged_schema_reuses_cache() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost"]);

        let first = h.coordinator.ensure_ready();
        h.coordinator.invalidate();
        let second = h.coordinator.ensure_ready();

        assert_eq!(h.compiler.compiles(), 1);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(second.version > first.version);
    }

    #[test]
    fn test_create_model_binds_typed_models() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost"]);

        let model = h.coordinator.create_model(bag("blogPost"));
        assert_eq!(model.model_type(), Some("BlogPost"));

        let unknown = bag("newsItem");
        assert!(Arc::ptr_eq(&h.coordinator.create_model(Arc::clone(&unknown)), &unknown));

        let list = h.coordinator.create_model_list("blogPost");
        assert_eq!(list.element_type(), &RuntimeType::named("BlogPost"));
        assert_eq!(
            h.coordinator.map_runtime_type(&"List<@blogPost>".parse().unwrap()).to_string(),
            "List<BlogPost>"
        );
    }

    #[test]
    fn test_compile_failure_falls_back_to_generic_facades() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Broken.rs"), "compile_error!(\"broken on purpose\");\n").unwrap();
        let h = harness(dir.path(), &["blogPost"]);

        let element = bag("blogPost");
        let model = h.coordinator.create_model(Arc::clone(&element));
        assert!(Arc::ptr_eq(&model, &element));

        let generation = h.coordinator.ensure_ready();
        assert!(generation.is_degraded());
        assert!(generation.registry.is_empty());

        let error = h.coordinator.get_last_error().unwrap();
        assert!(error.contains("broken on purpose"));
        assert!(dir.path().join(ERROR_FILE).exists());
        assert_eq!(h.coordinator.status().state, BuildStatus::Ready);
    }

    #[test]
    fn test_failure_keeps_previous_generation_then_recovers() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost"]);
        let good = h.coordinator.ensure_ready();

        let broken = dir.path().join("Broken.rs");
        fs::write(&broken, "compile_error!(\"typo\");\n").unwrap();
        h.coordinator.invalidate();
        let kept = h.coordinator.ensure_ready();
        assert!(Arc::ptr_eq(&good, &kept));
        assert_eq!(h.coordinator.create_model(bag("blogPost")).model_type(), Some("BlogPost"));
        assert!(h.coordinator.get_last_error().is_some());

        fs::remove_file(&broken).unwrap();
        h.coordinator.invalidate();
        let fixed = h.coordinator.ensure_ready();
        assert!(fixed.version > good.version);
        assert_eq!(h.coordinator.get_last_error(), None);
        assert!(!dir.path().join(ERROR_FILE).exists());
    }

    #[test]
    fn test_schema_error_is_recorded() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["Blog", "blog"]);

        let generation = h.coordinator.ensure_ready();
        assert!(generation.registry.is_empty());
        assert_eq!(h.compiler.compiles(), 0);
        assert!(h.coordinator.get_last_error().unwrap().contains("SCHEMA_ERROR"));
    }

    #[test]
    fn test_versions_are_monotonic_across_cache_reuse() {
        let dir = TempDir::new().unwrap();
        let first = harness(dir.path(), &["blogPost"]);
        let built = first.coordinator.ensure_ready();
        let cached_revision = built.module.as_ref().unwrap().revision();

        // a second process sharing the directory
        let second = harness(dir.path(), &["blogPost"]);
        let mut seen = vec![];
        let reused = second.coordinator.ensure_ready();
        assert_eq!(second.compiler.compiles(), 0);
        assert!(reused.version > cached_revision);
        seen.push(reused.version);

        second.store.replace(document(&["blogPost", "author"]));
        second.coordinator.invalidate();
        let rebuilt = second.coordinator.ensure_ready();
        assert_eq!(second.compiler.compiles(), 1);
        assert!(rebuilt.module.as_ref().unwrap().revision() > cached_revision);
        seen.push(rebuilt.version);

        second.coordinator.invalidate();
        seen.push(second.coordinator.ensure_ready().version);

        let unique: BTreeSet<u64> = seen.iter().copied().collect();
        assert_eq!(unique.len(), seen.len());
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_readers_never_see_mixed_generations() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["a", "b"]);
        h.coordinator.ensure_ready();

        let done = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = Arc::clone(&h.coordinator);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut reads = 0;
                    while !done.load(Ordering::SeqCst) {
                        let generation = coordinator.ensure_ready();
                        let aliases = generation.registry.aliases();
                        assert!(
                            aliases == vec!["a", "b"] || aliases == vec!["a", "c"],
                            "mixed registry {:?}",
                            aliases
                        );
                        let b = generation.registry.create_model(Arc::new(PropertyBag::new("b")));
                        let c = generation.registry.create_model(Arc::new(PropertyBag::new("c")));
                        assert!(b.model_type().is_some() != c.model_type().is_some());
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        for round in 0..10 {
            let aliases: &[&str] = if round % 2 == 0 { &["a", "c"] } else { &["a", "b"] };
            h.store.replace(document(aliases));
            h.coordinator.invalidate();
            h.coordinator.ensure_ready();
        }
        done.store(true, Ordering::SeqCst);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
    }

    #[test]
    fn test_host_callback_during_rebuilds_does_not_deadlock() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost"]);
        let (tx, rx) = mpsc::channel();

        let host = {
            let compiler = Arc::clone(&h.compiler);
            let tx = tx.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    compiler.inner.compile_dependent("views");
                }
                tx.send("host").unwrap();
            })
        };
        let rebuilder = {
            let coordinator = Arc::clone(&h.coordinator);
            let store = Arc::clone(&h.store);
            thread::spawn(move || {
                for round in 0..20 {
                    let aliases: &[&str] = if round % 2 == 0 { &["blogPost"] } else { &["blogPost", "author"] };
                    store.replace(document(aliases));
                    coordinator.invalidate();
                    coordinator.ensure_ready();
                }
                tx.send("rebuilder").unwrap();
            })
        };

        for _ in 0..2 {
            rx.recv_timeout(Duration::from_secs(60)).expect("deadlock between host and coordinator");
        }
        host.join().unwrap();
        rebuilder.join().unwrap();

        let module = h.compiler.inner.compile_dependent("views");
        assert_eq!(module.as_deref(), Some("Generated.Models"));
    }

    #[test]
    fn test_lock_timeout_is_recoverable() {
        let dir = TempDir::new().unwrap();
        let held = DirectoryLock::acquire(dir.path(), Duration::from_secs(1)).unwrap();
        let store = Arc::new(MemorySchemaStore::new(document(&["blogPost"])));
        let options = CoordinatorOptions {
            lock_timeout: Duration::from_millis(100),
            ..CoordinatorOptions::default()
        };
        let h = harness_with(dir.path(), store, options);

        let generation = h.coordinator.ensure_ready();
        assert!(generation.registry.is_empty());
        assert!(h.coordinator.get_last_error().unwrap().contains("LOCK_TIMEOUT"));
        assert_eq!(h.coordinator.status().state, BuildStatus::Ready);

        drop(held);
        h.coordinator.invalidate();
        let recovered = h.coordinator.ensure_ready();
        assert_eq!(recovered.registry.len(), 1);
        assert_eq!(h.coordinator.get_last_error(), None);
    }

    #[test]
    fn test_invalidate_debounces_and_flags_out_of_date() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost"]);

        h.coordinator.invalidate();
        assert!(!dir.path().join(OUT_OF_DATE_FILE).exists());

        h.coordinator.ensure_ready();
        h.coordinator.invalidate();
        h.coordinator.invalidate();
        assert_eq!(h.coordinator.status().state, BuildStatus::Stale);
        assert!(h.coordinator.status().out_of_date);

        h.coordinator.ensure_ready();
        assert!(!h.coordinator.status().out_of_date);
        assert_eq!(h.compiler.compiles(), 1);
    }

    #[test]
    fn test_invalidate_during_build_does_not_wait_and_is_not_lost() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost"]);
        h.coordinator.ensure_ready();
        h.coordinator.invalidate();

        // park the rebuild on the directory lock
        let held = DirectoryLock::acquire(dir.path(), Duration::from_secs(1)).unwrap();
        let builder = {
            let coordinator = Arc::clone(&h.coordinator);
            thread::spawn(move || coordinator.ensure_ready())
        };
        thread::sleep(Duration::from_millis(100));
        assert_eq!(h.coordinator.status().state, BuildStatus::Building);

        let (tx, rx) = mpsc::channel();
        {
            let coordinator = Arc::clone(&h.coordinator);
            thread::spawn(move || {
                coordinator.invalidate();
                tx.send(()).unwrap();
            });
        }
        rx.recv_timeout(Duration::from_secs(1)).expect("invalidate waited for the build");

        drop(held);
        builder.join().unwrap();

        // the build started before the last change, so it stays out of date
        assert_eq!(h.coordinator.status().state, BuildStatus::Stale);
        assert!(dir.path().join(OUT_OF_DATE_FILE).exists());

        h.coordinator.ensure_ready();
        assert_eq!(h.coordinator.status().state, BuildStatus::Ready);
        assert!(!dir.path().join(OUT_OF_DATE_FILE).exists());
    }

    #[test]
    fn test_huge_cached_revision_does_not_overflow() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost"]);
        h.coordinator.skip_version(u64::MAX);
        assert_eq!(h.coordinator.next_version.load(Ordering::SeqCst), u64::MAX);
    }

    #[test]
    fn test_subscribers_see_published_versions() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost"]);
        let mut changes = h.coordinator.subscribe();

        let first = h.coordinator.ensure_ready();
        assert_eq!(changes.try_recv().unwrap(), first.version);

        h.coordinator.ensure_ready();
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_host_sees_current_module() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path(), &["blogPost"]);
        assert!(h.coordinator.models_for_compilation().is_none());

        let generation = h.coordinator.ensure_ready();
        let module = h.coordinator.models_for_compilation().unwrap();
        assert_eq!(module.location(), generation.module.as_ref().unwrap().location());
    }
}
