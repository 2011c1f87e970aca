//! Lazy, shared model loading.
//!
//! [`ModelLoader`] owns the single cached model instance for one backend.
//! Concurrent callers asking for the same config share one construction;
//! callers arriving while a load is in flight park on a condition variable
//! until it finishes and then re-check the cache.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::{ModelConfig, ModelVariant};
use crate::engines::{CloneTarget, ModelBackend, SpeechModel};
use crate::error::TtsError;

/// Lifecycle of the cached model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// Diagnostic events published by a [`ModelLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    LoadStarted { model: String },
    Loaded { model: String, id: u64 },
    LoadFailed { model: String, reason: String },
    /// A voice clone reference was configured but is not on disk; the
    /// standard model is loaded instead.
    CloneReferenceMissing { reference: PathBuf },
    Invalidated,
}

type EventSink = Arc<dyn Fn(&LoaderEvent) + Send + Sync>;

struct LoadedModel {
    id: u64,
    config: ModelConfig,
    variant: ModelVariant,
    model: Mutex<Box<dyn SpeechModel>>,
}

/// Shared token for a loaded model instance.
///
/// Clones point at the same instance. Holding a handle does not keep it
/// cached: once the loader invalidates it, the next
/// [`ensure_loaded`](ModelLoader::ensure_loaded) builds a new one.
#[derive(Clone)]
pub struct ModelHandle {
    inner: Arc<LoadedModel>,
}

impl ModelHandle {
    /// Construction number, unique per loader.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The config this instance was built from.
    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    /// The variant the backend actually built.
    pub fn variant(&self) -> &ModelVariant {
        &self.inner.variant
    }

    pub fn same_instance(&self, other: &ModelHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn clone_target(&self) -> Option<CloneTarget<'_>> {
        match &self.inner.variant {
            ModelVariant::Cloning {
                reference,
                language,
            } => Some(CloneTarget {
                reference: reference.as_path(),
                language: language.as_str(),
            }),
            ModelVariant::Standard { .. } => None,
        }
    }

    pub(crate) fn lock_model(&self) -> MutexGuard<'_, Box<dyn SpeechModel>> {
        self.inner.model.lock()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.inner.id)
            .field("variant", &self.inner.variant)
            .finish_non_exhaustive()
    }
}

struct LoaderState {
    phase: LoadState,
    handle: Option<ModelHandle>,
    /// The cached handle must be rebuilt on the next request.
    stale: bool,
    /// `invalidate()` ran while the current load was in flight.
    invalidated_during_load: bool,
    next_id: u64,
}

/// Owner of a backend's single cached model.
pub struct ModelLoader {
    backend: Arc<dyn ModelBackend>,
    state: Mutex<LoaderState>,
    changed: Condvar,
    loads: AtomicU64,
    events: Option<EventSink>,
}

impl ModelLoader {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(LoaderState {
                phase: LoadState::Unloaded,
                handle: None,
                stale: false,
                invalidated_during_load: false,
                next_id: 0,
            }),
            changed: Condvar::new(),
            loads: AtomicU64::new(0),
            events: None,
        }
    }

    /// Receive [`LoaderEvent`]s in addition to the log output.
    ///
    /// The callback runs on the thread that triggered the event and never
    /// while the loader's lock is held.
    pub fn with_events<F>(mut self, sink: F) -> Self
    where
        F: Fn(&LoaderEvent) + Send + Sync + 'static,
    {
        self.events = Some(Arc::new(sink));
        self
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    /// Return the cached model for `config`, loading it if needed.
    ///
    /// Blocks while another caller's load is in flight. A failed load leaves
    /// the loader `Unloaded` so a later call can retry.
    pub fn ensure_loaded(&self, config: &ModelConfig) -> Result<ModelHandle, TtsError> {
        let mut state = self.state.lock();
        loop {
            let phase = state.phase;
            match phase {
                LoadState::Loading => self.changed.wait(&mut state),
                LoadState::Loaded if !state.stale => {
                    if let Some(handle) = &state.handle {
                        if handle.config() == config {
                            log::debug!("Reusing cached model #{}", handle.id());
                            return Ok(handle.clone());
                        }
                    }
                    break;
                }
                LoadState::Loaded | LoadState::Unloaded => break,
            }
        }

        if let Some(previous) = state.handle.take() {
            log::info!(
                "Dropping model #{} ({}) for a new configuration",
                previous.id(),
                previous.variant().label()
            );
        }
        state.phase = LoadState::Loading;
        state.stale = false;
        state.invalidated_during_load = false;
        state.next_id += 1;
        let id = state.next_id;
        drop(state);

        let in_flight = InFlightLoad {
            loader: self,
            finished: false,
        };
        match self.construct(config, id) {
            Ok(handle) => {
                in_flight.finish(Some(handle.clone()));
                Ok(handle)
            }
            Err(e) => {
                in_flight.finish(None);
                Err(e)
            }
        }
    }

    /// Drop the cached model so the next request rebuilds it.
    ///
    /// If a load is in flight its result is still installed when it
    /// completes, but is treated as stale.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        let changed = match state.phase {
            LoadState::Loading => {
                state.invalidated_during_load = true;
                true
            }
            LoadState::Loaded | LoadState::Unloaded => {
                state.phase = LoadState::Unloaded;
                state.stale = false;
                state.handle.take().is_some()
            }
        };
        drop(state);

        if changed {
            log::debug!("Cached {} model invalidated", self.backend.name());
            self.emit(&LoaderEvent::Invalidated);
        }
    }

    /// True while a load is in flight.
    pub fn is_loading(&self) -> bool {
        self.state.lock().phase == LoadState::Loading
    }

    /// True if a current (non-stale) model is cached.
    pub fn is_loaded(&self) -> bool {
        let state = self.state.lock();
        state.phase == LoadState::Loaded && !state.stale
    }

    pub fn state(&self) -> LoadState {
        self.state.lock().phase
    }

    /// Number of constructions attempted so far, successful or not.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    fn construct(&self, config: &ModelConfig, id: u64) -> Result<ModelHandle, TtsError> {
        let (variant, missing_reference) = config.resolve_variant();
        if let Some(reference) = missing_reference {
            log::warn!(
                "Voice clone reference {} not found, falling back to {}",
                reference.display(),
                variant.label()
            );
            self.emit(&LoaderEvent::CloneReferenceMissing { reference });
        }

        let label = variant.label();
        log::info!("Loading {} model {}...", self.backend.name(), label);
        self.emit(&LoaderEvent::LoadStarted {
            model: label.clone(),
        });
        self.loads.fetch_add(1, Ordering::SeqCst);

        let start = Instant::now();
        match self.backend.load(&variant) {
            Ok(model) => {
                log::info!(
                    "{} model {} loaded in {:.2?}",
                    self.backend.name(),
                    label,
                    start.elapsed()
                );
                self.emit(&LoaderEvent::Loaded {
                    model: label,
                    id,
                });
                Ok(ModelHandle {
                    inner: Arc::new(LoadedModel {
                        id,
                        config: config.clone(),
                        variant,
                        model: Mutex::new(model),
                    }),
                })
            }
            Err(source) => {
                log::error!(
                    "Failed to load {} model {}: {source}",
                    self.backend.name(),
                    label
                );
                self.emit(&LoaderEvent::LoadFailed {
                    model: label.clone(),
                    reason: source.to_string(),
                });
                Err(TtsError::ModelUnavailable {
                    model: label,
                    source,
                })
            }
        }
    }

    fn emit(&self, event: &LoaderEvent) {
        if let Some(sink) = &self.events {
            sink(event);
        }
    }
}

/// Holds the `Loading` phase for one construction.
///
/// Dropping it without [`finish`](InFlightLoad::finish) (a panicking
/// backend) resets the loader to `Unloaded` and wakes waiters.
struct InFlightLoad<'a> {
    loader: &'a ModelLoader,
    finished: bool,
}

impl InFlightLoad<'_> {
    fn finish(mut self, handle: Option<ModelHandle>) {
        self.finished = true;
        let mut state = self.loader.state.lock();
        match handle {
            Some(handle) => {
                state.stale = state.invalidated_during_load;
                state.handle = Some(handle);
                state.phase = LoadState::Loaded;
            }
            None => {
                state.handle = None;
                state.stale = false;
                state.phase = LoadState::Unloaded;
            }
        }
        state.invalidated_during_load = false;
        drop(state);
        self.loader.changed.notify_all();
    }
}

impl Drop for InFlightLoad<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.loader.state.lock();
        state.handle = None;
        state.stale = false;
        state.invalidated_during_load = false;
        state.phase = LoadState::Unloaded;
        drop(state);
        self.loader.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::config::ModelConfigBuilder;
    use crate::test_support::{init_logging, LoadBehavior, ScriptedBackend};

    fn config(identifier: &str) -> ModelConfig {
        ModelConfigBuilder::default()
            .model_identifier(identifier)
            .build()
            .unwrap()
    }

    #[test]
    fn concurrent_callers_share_one_construction() {
        init_logging();
        let backend = Arc::new(ScriptedBackend::new().with_load_delay(Duration::from_millis(50)));
        let loader = Arc::new(ModelLoader::new(backend.clone()));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let loader = loader.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    loader.ensure_loaded(&config("X")).unwrap()
                })
            })
            .collect();
        let results: Vec<ModelHandle> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(backend.load_count(), 1);
        assert_eq!(loader.load_count(), 1);
        assert!(results.iter().all(|h| h.same_instance(&results[0])));
        assert_eq!(loader.state(), LoadState::Loaded);
    }

    #[test]
    fn matching_config_reuses_cached_instance() {
        let backend = Arc::new(ScriptedBackend::new());
        let loader = ModelLoader::new(backend.clone());
        let first = loader.ensure_loaded(&config("X")).unwrap();
        let second = loader.ensure_loaded(&config("X")).unwrap();
        assert!(first.same_instance(&second));
        assert_eq!(backend.load_count(), 1);
    }

    #[test]
    fn different_config_rebuilds() {
        let backend = Arc::new(ScriptedBackend::new());
        let loader = ModelLoader::new(backend.clone());
        let x = loader.ensure_loaded(&config("X")).unwrap();
        let y = loader.ensure_loaded(&config("Y")).unwrap();
        assert!(!x.same_instance(&y));
        assert_eq!(y.config().model_identifier, "Y");
        assert_eq!(backend.loaded_identifiers(), vec!["X", "Y"]);
    }

    #[test]
    fn invalidate_during_load_with_new_config_forces_fresh_load() {
        init_logging();
        let backend = Arc::new(ScriptedBackend::new().gated());
        let loader = Arc::new(ModelLoader::new(backend.clone()));

        let in_flight = {
            let loader = loader.clone();
            thread::spawn(move || loader.ensure_loaded(&config("X")))
        };
        backend.wait_for_loads(1);
        assert!(loader.is_loading());

        loader.invalidate();
        assert!(loader.is_loading(), "invalidate must not abandon an in-flight load");
        backend.open_gate();

        let x = in_flight.join().unwrap().unwrap();
        assert_eq!(x.config().model_identifier, "X");

        let y = loader.ensure_loaded(&config("Y")).unwrap();
        assert!(!x.same_instance(&y));
        assert_eq!(y.config().model_identifier, "Y");
        assert_eq!(backend.load_count(), 2);
    }

    #[test]
    fn invalidate_during_load_marks_result_stale_even_for_same_config() {
        let backend = Arc::new(ScriptedBackend::new().gated());
        let loader = Arc::new(ModelLoader::new(backend.clone()));

        let in_flight = {
            let loader = loader.clone();
            thread::spawn(move || loader.ensure_loaded(&config("X")))
        };
        backend.wait_for_loads(1);
        loader.invalidate();
        backend.open_gate();
        let first = in_flight.join().unwrap().unwrap();

        assert_eq!(loader.state(), LoadState::Loaded);
        assert!(!loader.is_loaded());

        let second = loader.ensure_loaded(&config("X")).unwrap();
        assert!(!first.same_instance(&second));
        assert_eq!(backend.load_count(), 2);
        assert!(loader.is_loaded());
    }

    #[test]
    fn waiters_do_not_start_a_second_load() {
        let backend = Arc::new(ScriptedBackend::new().gated());
        let loader = Arc::new(ModelLoader::new(backend.clone()));

        let spawn =
            |loader: Arc<ModelLoader>| thread::spawn(move || loader.ensure_loaded(&config("X")));
        let first = spawn(loader.clone());
        backend.wait_for_loads(1);
        let second = spawn(loader.clone());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(backend.load_count(), 1);

        backend.open_gate();
        let a = first.join().unwrap().unwrap();
        let b = second.join().unwrap().unwrap();
        assert!(a.same_instance(&b));
        assert_eq!(backend.load_count(), 1);
    }

    #[test]
    fn failed_load_resets_and_allows_retry() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_behavior(LoadBehavior::Fail);
        let loader = ModelLoader::new(backend.clone());

        let err = loader.ensure_loaded(&config("X")).unwrap_err();
        assert!(matches!(err, TtsError::ModelUnavailable { ref model, .. } if model == "X"));
        assert_eq!(loader.state(), LoadState::Unloaded);

        backend.set_behavior(LoadBehavior::Succeed);
        assert!(loader.ensure_loaded(&config("X")).is_ok());
        assert_eq!(backend.load_count(), 2);
    }

    #[test]
    fn panicking_backend_never_leaves_loader_stuck_loading() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_behavior(LoadBehavior::Panic);
        let loader = Arc::new(ModelLoader::new(backend.clone()));

        let result = {
            let loader = loader.clone();
            thread::spawn(move || loader.ensure_loaded(&config("X"))).join()
        };
        assert!(result.is_err());
        assert_eq!(loader.state(), LoadState::Unloaded);

        backend.set_behavior(LoadBehavior::Succeed);
        assert!(loader.ensure_loaded(&config("X")).is_ok());
    }

    #[test]
    fn missing_clone_reference_falls_back_and_reports_it() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(ScriptedBackend::new());
        let loader = {
            let events = events.clone();
            ModelLoader::new(backend.clone()).with_events(move |e| events.lock().push(e.clone()))
        };
        let config = ModelConfigBuilder::default()
            .model_identifier("X")
            .voice_clone_reference("/no/such/sample.wav")
            .build()
            .unwrap();

        let handle = loader.ensure_loaded(&config).unwrap();
        assert!(!handle.variant().is_cloning());
        assert!(handle.clone_target().is_none());

        let events = events.lock();
        assert_eq!(
            events[0],
            LoaderEvent::CloneReferenceMissing {
                reference: PathBuf::from("/no/such/sample.wav")
            }
        );
        assert!(matches!(events.last(), Some(LoaderEvent::Loaded { .. })));
    }

    #[test]
    fn existing_clone_reference_builds_cloning_variant() {
        let sample = tempfile::NamedTempFile::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let loader = ModelLoader::new(backend.clone());
        let config = ModelConfigBuilder::default()
            .voice_clone_reference(sample.path())
            .language("de")
            .build()
            .unwrap();

        let handle = loader.ensure_loaded(&config).unwrap();
        let target = handle.clone_target().unwrap();
        assert_eq!(target.reference, sample.path());
        assert_eq!(target.language, "de");
    }

    #[test]
    fn invalidating_an_unloaded_loader_is_a_silent_no_op() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let loader = {
            let events = events.clone();
            ModelLoader::new(Arc::new(ScriptedBackend::new()))
                .with_events(move |e| events.lock().push(e.clone()))
        };
        loader.invalidate();
        loader.invalidate();
        assert_eq!(loader.state(), LoadState::Unloaded);
        assert!(events.lock().is_empty());
    }
}
