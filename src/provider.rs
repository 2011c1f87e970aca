//! Routing requests to the configured backend and shaping the response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{Provider, TtsSettings};
use crate::error::TtsError;
use crate::service::VoiceService;

/// Incoming synthesis request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(alias = "ctxid")]
    pub context_id: String,
}

/// `{"audio": ..., "success": true}` or `{"error": ..., "success": false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

impl SynthesisResponse {
    pub fn audio(audio: String) -> Self {
        Self {
            audio: Some(audio),
            error: None,
            success: true,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            audio: None,
            error: Some(error.into()),
            success: false,
        }
    }
}

/// Chooses between the fast default voice and an optional cloning-capable one.
pub struct ProviderSelector {
    default: Arc<VoiceService>,
    cloning: Option<Arc<VoiceService>>,
}

impl ProviderSelector {
    pub fn new(default: Arc<VoiceService>) -> Self {
        Self {
            default,
            cloning: None,
        }
    }

    pub fn with_cloning(mut self, cloning: Arc<VoiceService>) -> Self {
        self.cloning = Some(cloning);
        self
    }

    pub fn service(&self, provider: Provider) -> Result<&Arc<VoiceService>, TtsError> {
        match provider {
            Provider::Kokoro => Ok(&self.default),
            Provider::Cloning => self
                .cloning
                .as_ref()
                .ok_or(TtsError::ProviderUnavailable(provider)),
        }
    }

    /// Push `settings` into the selected service and return it.
    ///
    /// Only the cloning provider takes a model identifier or voice sample;
    /// unchanged settings leave its cached model alone.
    pub fn apply(&self, settings: &TtsSettings) -> Result<&Arc<VoiceService>, TtsError> {
        let service = self.service(settings.provider)?;
        if settings.provider == Provider::Cloning {
            if let Some(reference) = &settings.voice_clone_reference {
                service.set_voice_clone(reference, &settings.language);
            }
            if let Some(model) = &settings.model_identifier {
                service.set_model(model, None);
            }
        }
        Ok(service)
    }

    /// Load the selected provider's model at startup. Failures are logged
    /// and otherwise ignored; the next request retries.
    pub fn preload(&self, settings: &TtsSettings) {
        log::info!("Preloading {} TTS...", settings.provider);
        match self.apply(settings).and_then(|service| service.preload()) {
            Ok(()) => log::info!("Preload of {} TTS completed", settings.provider),
            Err(e) => log::error!("Error preloading {} TTS: {e}", settings.provider),
        }
    }

    pub fn handle(&self, settings: &TtsSettings, request: &SynthesisRequest) -> SynthesisResponse {
        match self.try_handle(settings, request) {
            Ok(audio) => SynthesisResponse::audio(audio),
            Err(e) => {
                log::error!("[{}] TTS request failed: {e}", request.context_id);
                SynthesisResponse::failure(e.to_string())
            }
        }
    }

    fn try_handle(
        &self,
        settings: &TtsSettings,
        request: &SynthesisRequest,
    ) -> Result<String, TtsError> {
        let service = self.apply(settings)?;
        if !service.is_loaded() {
            log::info!(
                "[{}] {} TTS model is currently being initialized, please wait...",
                request.context_id,
                settings.provider
            );
        }
        service.synthesize_encoded(&[request.text.as_str()])
    }
}
