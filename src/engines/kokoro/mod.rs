//! Kokoro-82M backend.
//!
//! Loads Kokoro ONNX models from sub-directories of a models root and speaks
//! with one of the bundled voice styles. Kokoro has no voice cloning; a
//! cloning variant is rejected at load time.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed on your system:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! # Model Directory Layout
//!
//! ```text
//! models/
//! └── kokoro-v1.0/                        # model identifier
//!     ├── kokoro-quant-convinteger.onnx   # preferred, else the first .onnx file
//!     ├── voices-v1.0.bin                 # voice styles (.npz)
//!     └── config.json                     # optional phoneme vocabulary
//! ```
//!
//! Without `config.json` the built-in Kokoro v1.0 vocabulary is used.
//!
//! The config's `companion` names the voice (`af_heart` when unset). The
//! two-letter voice prefix picks the espeak-ng language, e.g. `bf_emma`
//! speaks British English.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shared_tts::{engines::kokoro::KokoroBackend, ModelConfigBuilder, VoiceService};
//!
//! let backend = Arc::new(KokoroBackend::new("models"));
//! let config = ModelConfigBuilder::default()
//!     .model_identifier("kokoro-v1.0")
//!     .companion("bf_emma")
//!     .build()?;
//! let service = VoiceService::new(backend, config);
//! let audio = service.synthesize(&["Hello from British Emma!"])?;
//! println!("{} samples at {}Hz", audio.samples.len(), audio.sample_rate);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engine;
pub mod model;
pub mod phonemizer;
pub mod vocab;
pub mod voices;

pub use engine::{KokoroBackend, KokoroModelParams};
pub use model::{KokoroError, KokoroModel};
pub use phonemizer::EspeakConfig;
