use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::audio::{self, AudioBuffer};
use crate::config::ModelConfig;
use crate::engines::ModelBackend;
use crate::error::TtsError;
use crate::loader::{ModelHandle, ModelLoader};
use crate::synthesis;

/// A backend's current configuration plus its cached model.
///
/// All methods take `&self`; share the service behind an `Arc`.
pub struct VoiceService {
    config: RwLock<ModelConfig>,
    loader: ModelLoader,
}

impl VoiceService {
    pub fn new(backend: Arc<dyn ModelBackend>, config: ModelConfig) -> Self {
        Self::with_loader(ModelLoader::new(backend), config)
    }

    /// Use a pre-configured loader (e.g. one with an event subscriber).
    pub fn with_loader(loader: ModelLoader, config: ModelConfig) -> Self {
        Self {
            config: RwLock::new(config),
            loader,
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> ModelConfig {
        self.config.read().clone()
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn is_loaded(&self) -> bool {
        self.loader.is_loaded()
    }

    /// Switch model family and, optionally, its companion component.
    ///
    /// Passing `None` keeps the current companion. Values equal to the current
    /// config keep the cached model; to pick up model files replaced on disk,
    /// call `loader().invalidate()`.
    pub fn set_model(&self, identifier: &str, companion: Option<&str>) {
        self.reconfigure(|config| {
            config.model_identifier = identifier.to_string();
            if let Some(companion) = companion {
                config.companion = Some(companion.to_string());
            }
        });
    }

    /// Clone the voice in `reference`, speaking `language`.
    ///
    /// Re-applying the current reference and language is a no-op, even if the
    /// reference file itself has changed.
    pub fn set_voice_clone(&self, reference: impl Into<PathBuf>, language: &str) {
        let reference = reference.into();
        self.reconfigure(|config| {
            config.voice_clone_reference = Some(reference);
            config.language = language.to_string();
        });
    }

    /// Go back to the standard voice.
    pub fn clear_voice_clone(&self) {
        self.reconfigure(|config| config.voice_clone_reference = None);
    }

    // Invalidation happens under the write lock, so no reader can pair the
    // new config with the old model. An unchanged config skips invalidation.
    fn reconfigure<F: FnOnce(&mut ModelConfig)>(&self, update: F) {
        let mut config = self.config.write();
        let mut next = config.clone();
        update(&mut next);
        if next == *config {
            log::debug!("Model configuration unchanged, keeping cached model");
            return;
        }
        log::info!(
            "Reconfiguring {} model: {:?}",
            self.loader.backend().name(),
            next
        );
        *config = next;
        self.loader.invalidate();
    }

    /// Load the model for the current configuration.
    pub fn ensure_loaded(&self) -> Result<ModelHandle, TtsError> {
        self.loader.ensure_loaded(&self.config())
    }

    /// Warm the cache ahead of the first request.
    pub fn preload(&self) -> Result<(), TtsError> {
        self.ensure_loaded().map(|_| ())
    }

    pub fn synthesize<S: AsRef<str>>(&self, segments: &[S]) -> Result<AudioBuffer, TtsError> {
        let config = self.config();
        synthesis::synthesize(&self.loader, segments, &config)
    }

    /// Synthesize and return base64-encoded WAV.
    pub fn synthesize_encoded<S: AsRef<str>>(&self, segments: &[S]) -> Result<String, TtsError> {
        let buffer = self.synthesize(segments)?;
        audio::encode(&buffer)
    }

    pub fn available_models(&self) -> Vec<String> {
        self.loader.backend().available_models()
    }
}
