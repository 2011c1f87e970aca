//! Speech synthesis backends.
//!
//! A [`ModelBackend`] knows how to build a model; the [`ModelLoader`](crate::loader::ModelLoader)
//! decides when. Backends never cache instances themselves.
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `kokoro` - Kokoro TTS (ONNX format, espeak-ng required)
//!
//! Other backends (a cloning-capable voice, a remote service) plug in by
//! implementing the two traits below.

#[cfg(feature = "kokoro")]
pub mod kokoro;

use std::path::Path;

use crate::config::ModelVariant;

/// Error type returned by backends.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Reference voice a cloning-capable model should imitate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneTarget<'a> {
    pub reference: &'a Path,
    pub language: &'a str,
}

/// One loaded, ready-to-run model instance.
pub trait SpeechModel: Send {
    /// Generate samples for one segment of text.
    ///
    /// `clone` is set only for models built from a [`ModelVariant::Cloning`].
    fn synthesize(
        &mut self,
        text: &str,
        clone: Option<CloneTarget<'_>>,
    ) -> Result<Vec<f32>, BackendError>;

    /// Output sample rate. Some backends only know it after producing audio.
    fn sample_rate(&self) -> Option<u32>;
}

/// Factory for [`SpeechModel`]s.
pub trait ModelBackend: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Construct a model. May block for a long time (downloads, graph optimization).
    fn load(&self, variant: &ModelVariant) -> Result<Box<dyn SpeechModel>, BackendError>;

    /// Identifiers this backend can load, if it can enumerate them.
    fn available_models(&self) -> Vec<String> {
        Vec::new()
    }
}
