use crate::config::Provider;
use crate::engines::BackendError;

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("Model '{model}' unavailable: {source}")]
    ModelUnavailable {
        model: String,
        #[source]
        source: BackendError,
    },
    #[error("Synthesis failed at segment {index} ({segment:?}): {source}")]
    SynthesisFailure {
        index: usize,
        segment: String,
        #[source]
        source: BackendError,
    },
    #[error("No backend registered for provider '{0}'")]
    ProviderUnavailable(Provider),
    #[error("WAV encoding error: {0}")]
    Encoding(#[from] hound::Error),
    #[error("Base64 decoding error: {0}")]
    Decoding(#[from] base64::DecodeError),
    #[error("Invalid settings: {0}")]
    Settings(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TtsError {
    /// Shorten a segment for error context so huge inputs don't flood logs.
    pub(crate) fn segment_preview(segment: &str) -> String {
        const MAX_CHARS: usize = 48;
        if segment.chars().count() <= MAX_CHARS {
            return segment.to_string();
        }
        let mut preview: String = segment.chars().take(MAX_CHARS).collect();
        preview.push('…');
        preview
    }
}
