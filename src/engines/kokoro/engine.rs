use std::path::{Path, PathBuf};

use crate::config::ModelVariant;
use crate::engines::{BackendError, ModelBackend, SpeechModel};

use super::model::{has_onnx_file, KokoroError, KokoroModel};
use super::phonemizer::EspeakConfig;

/// Voice used when the config names none.
pub const DEFAULT_VOICE: &str = "af_heart";

/// Parameters applied to every Kokoro model this backend builds.
#[derive(Debug, Clone)]
pub struct KokoroModelParams {
    /// Number of CPU threads to use for inference.
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
    /// Speech speed multiplier. Range: 0.5–2.0, default 1.0.
    pub speed: f32,
}

impl Default for KokoroModelParams {
    fn default() -> Self {
        Self {
            num_threads: None,
            speed: 1.0,
        }
    }
}

/// Builds [`KokoroModel`]s from `models_root/<model identifier>`.
pub struct KokoroBackend {
    models_root: PathBuf,
    params: KokoroModelParams,
    espeak: EspeakConfig,
}

impl KokoroBackend {
    /// Use `espeak-ng` from PATH.
    pub fn new(models_root: impl Into<PathBuf>) -> Self {
        Self {
            models_root: models_root.into(),
            params: KokoroModelParams::default(),
            espeak: EspeakConfig::default(),
        }
    }

    pub fn with_params(mut self, params: KokoroModelParams) -> Self {
        self.params = params;
        self
    }

    /// Point to a bundled espeak-ng binary and data directory. Either can be
    /// `None` to fall back to the system default.
    pub fn with_espeak(mut self, bin_path: Option<PathBuf>, data_path: Option<PathBuf>) -> Self {
        self.espeak = EspeakConfig {
            bin_path,
            data_path,
        };
        self
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }
}

impl ModelBackend for KokoroBackend {
    fn name(&self) -> &str {
        "kokoro"
    }

    fn load(&self, variant: &ModelVariant) -> Result<Box<dyn SpeechModel>, BackendError> {
        match variant {
            ModelVariant::Standard {
                identifier,
                companion,
            } => {
                let voice = companion.as_deref().unwrap_or(DEFAULT_VOICE);
                let model = KokoroModel::load(
                    &self.models_root.join(identifier),
                    voice,
                    &self.params,
                    self.espeak.clone(),
                )?;
                Ok(Box::new(model))
            }
            ModelVariant::Cloning { .. } => Err(KokoroError::CloningUnsupported.into()),
        }
    }

    fn available_models(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.models_root) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!(
                    "Error listing Kokoro models in {}: {e}",
                    self.models_root.display()
                );
                return Vec::new();
            }
        };

        let mut models: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| has_onnx_file(&entry.path()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        models.sort_unstable();
        models
    }
}
