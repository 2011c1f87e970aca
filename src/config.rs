use std::fmt;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::TtsError;

/// Model identifier used when nothing else is configured.
pub const DEFAULT_MODEL_IDENTIFIER: &str = "kokoro-v1.0";

/// Language tag used when nothing else is configured.
pub const DEFAULT_LANGUAGE: &str = "en";

/// The selection a [`ModelLoader`](crate::loader::ModelLoader) builds a model from.
///
/// Two configs are the same fingerprint only if every field is equal; a cached
/// model built for one fingerprint is never handed out for another.
///
/// ```
/// use shared_tts::config::ModelConfigBuilder;
///
/// let config = ModelConfigBuilder::default()
///     .model_identifier("tts_models/en/ljspeech/tacotron2-DDC")
///     .companion("vocoder_models/en/ljspeech/hifigan_v2")
///     .build()?;
/// assert_eq!(config.language, "en");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(default, setter(into))]
pub struct ModelConfig {
    /// Model family to load. Interpreted by the backend.
    pub model_identifier: String,
    /// Optional secondary component (a vocoder, a voice pack name).
    #[builder(setter(into, strip_option))]
    pub companion: Option<String>,
    /// Reference recording for voice cloning.
    #[builder(setter(into, strip_option))]
    pub voice_clone_reference: Option<PathBuf>,
    /// Language tag passed to cloning-capable models.
    pub language: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_identifier: DEFAULT_MODEL_IDENTIFIER.to_string(),
            companion: None,
            voice_clone_reference: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl ModelConfig {
    /// Decide which model variant this config asks for, checking the clone
    /// reference on disk.
    ///
    /// Returns the variant plus the reference path when one was configured
    /// but could not be found; in that case the variant is `Standard`.
    pub fn resolve_variant(&self) -> (ModelVariant, Option<PathBuf>) {
        match &self.voice_clone_reference {
            Some(reference) if reference.exists() => (
                ModelVariant::Cloning {
                    reference: reference.clone(),
                    language: self.language.clone(),
                },
                None,
            ),
            Some(missing) => (self.standard_variant(), Some(missing.clone())),
            None => (self.standard_variant(), None),
        }
    }

    fn standard_variant(&self) -> ModelVariant {
        ModelVariant::Standard {
            identifier: self.model_identifier.clone(),
            companion: self.companion.clone(),
        }
    }
}

/// A resolved model selection handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelVariant {
    /// The configured model family, speaking in its own voice.
    Standard {
        identifier: String,
        companion: Option<String>,
    },
    /// A cloning-capable model conditioned on a reference recording.
    Cloning { reference: PathBuf, language: String },
}

impl ModelVariant {
    pub fn is_cloning(&self) -> bool {
        matches!(self, ModelVariant::Cloning { .. })
    }

    /// Short label for logs and error messages.
    pub fn label(&self) -> String {
        match self {
            ModelVariant::Standard { identifier, .. } => identifier.clone(),
            ModelVariant::Cloning { reference, .. } => {
                format!("voice clone of {}", reference.display())
            }
        }
    }
}

/// Which synthesis backend a request goes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Fast default voice.
    #[default]
    Kokoro,
    /// Cloning-capable voice.
    #[serde(alias = "coqui")]
    Cloning,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Kokoro => f.write_str("kokoro"),
            Provider::Cloning => f.write_str("cloning"),
        }
    }
}

/// Operator-facing TTS settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub provider: Provider,
    /// Model for the cloning-capable provider. `None` keeps the current one.
    pub model_identifier: Option<String>,
    /// Voice sample for the cloning-capable provider.
    pub voice_clone_reference: Option<PathBuf>,
    pub language: String,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model_identifier: None,
            voice_clone_reference: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl TtsSettings {
    pub fn from_json_str(json: &str) -> Result<Self, TtsError> {
        serde_json::from_str(json)
            .map_err(|e| TtsError::Settings(format!("Failed to parse JSON: {e}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, TtsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
