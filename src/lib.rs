//! # shared-tts
//!
//! Shared, lazily loaded text-to-speech models for multi-request services.
//!
//! ## Features
//!
//! - **Load once**: concurrent requests share a single model construction
//! - **Reconfigure safely**: switching models or voice samples invalidates the cache
//! - **Voice cloning**: a reference recording selects a cloning-capable variant
//! - **Portable output**: audio comes back as base64-encoded WAV
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! shared-tts = { version = "2026.2", features = ["kokoro"] }
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use shared_tts::{engines::kokoro::KokoroBackend, ModelConfig, VoiceService};
//!
//! let backend = Arc::new(KokoroBackend::new("models"));
//! let service = VoiceService::new(backend, ModelConfig::default());
//!
//! let audio = service.synthesize(&["Hello, world!", "Go on, go on, go on."])?;
//! audio.write_wav(std::path::Path::new("output.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;
pub mod engines;
pub mod error;
pub mod loader;
pub mod provider;
pub mod service;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod test_support;

pub use audio::{decode, encode, AudioBuffer, DEFAULT_SAMPLE_RATE};
pub use config::{ModelConfig, ModelConfigBuilder, ModelVariant, Provider, TtsSettings};
pub use engines::{BackendError, CloneTarget, ModelBackend, SpeechModel};
pub use error::TtsError;
pub use loader::{LoadState, LoaderEvent, ModelHandle, ModelLoader};
pub use provider::{ProviderSelector, SynthesisRequest, SynthesisResponse};
pub use service::VoiceService;
pub use synthesis::synthesize;
