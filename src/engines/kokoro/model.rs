use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::engines::{BackendError, CloneTarget, SpeechModel};

use super::engine::KokoroModelParams;
use super::phonemizer::{phonemize, voice_lang, EspeakConfig};
use super::vocab::{vocab_for_dir, BOUNDARY_MARKS};
use super::voices::{VoiceStore, STYLE_DIM};

/// Maximum number of phoneme tokens per inference window (before padding).
pub const MAX_PHONEME_LEN: usize = 510;

/// Output sample rate from the Kokoro model.
pub const SAMPLE_RATE: u32 = 24000;

const PREFERRED_ONNX_FILE: &str = "kokoro-quant-convinteger.onnx";
const VOICES_FILE: &str = "voices-v1.0.bin";

#[derive(thiserror::Error, Debug)]
pub enum KokoroError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Voice '{0}' not found in the voice archive")]
    VoiceNotFound(String),
    #[error("No .onnx file found in {0}")]
    ModelFileMissing(PathBuf),
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
    #[error("Kokoro does not support voice cloning")]
    CloningUnsupported,
}

/// A loaded Kokoro ONNX session bound to one voice.
pub struct KokoroModel {
    session: Session,
    voices: VoiceStore,
    vocab: HashMap<char, i64>,
    /// Token IDs of punctuation preferred as window boundaries.
    boundary_ids: Vec<i64>,
    voice: String,
    lang: &'static str,
    speed: f32,
    espeak: EspeakConfig,
    /// "input_ids" or "tokens", depending on the export.
    tokens_input: String,
    speed_is_int32: bool,
    produced_audio: bool,
}

impl KokoroModel {
    /// Load a model directory, failing early if `voice` is not in its archive.
    pub fn load(
        model_dir: &Path,
        voice: &str,
        params: &KokoroModelParams,
        espeak: EspeakConfig,
    ) -> Result<Self, KokoroError> {
        let onnx_path = find_onnx_file(model_dir)?;
        log::info!("Loading Kokoro model from {}", onnx_path.display());
        let session = init_session(&onnx_path, params.num_threads)?;

        let tokens_input = session
            .inputs()
            .iter()
            .map(|input| input.name())
            .find(|name| *name == "input_ids" || *name == "tokens")
            .unwrap_or("input_ids")
            .to_string();
        let speed_is_int32 = session
            .inputs()
            .iter()
            .find(|input| input.name() == "speed")
            .map(|input| format!("{:?}", input.dtype()).to_lowercase().contains("int32"))
            .unwrap_or(true);
        log::debug!("Detected tokens_input='{tokens_input}', speed_is_int32={speed_is_int32}");

        let voices = VoiceStore::load(&model_dir.join(VOICES_FILE))?;
        if !voices.contains(voice) {
            return Err(KokoroError::VoiceNotFound(voice.to_string()));
        }
        let vocab = vocab_for_dir(model_dir)?;
        let boundary_ids = BOUNDARY_MARKS
            .iter()
            .filter_map(|mark| vocab.get(mark).copied())
            .collect();

        Ok(Self {
            session,
            voices,
            vocab,
            boundary_ids,
            voice: voice.to_string(),
            lang: voice_lang(voice),
            speed: params.speed,
            espeak,
            tokens_input,
            speed_is_int32,
            produced_audio: false,
        })
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// List all available voice names.
    pub fn list_voices(&self) -> Vec<&str> {
        self.voices.list_voices()
    }

    fn run_window(
        &mut self,
        tokens: &[i64],
        style: &[f32; STYLE_DIM],
    ) -> Result<Vec<f32>, KokoroError> {
        // [[0, t1..tN, 0]]
        let mut padded = Vec::with_capacity(tokens.len() + 2);
        padded.push(0);
        padded.extend_from_slice(tokens);
        padded.push(0);
        let tokens_arr = Array2::from_shape_vec((1, padded.len()), padded)?;
        let style_view = ndarray::ArrayView2::from_shape((1, STYLE_DIM), style.as_slice())?;

        let output = if self.speed_is_int32 {
            let speed_arr = ndarray::arr1(&[self.speed.round() as i32]);
            let inputs = inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            self.session.run(inputs)?
        } else {
            let speed_arr = ndarray::arr1(&[self.speed]);
            let inputs = inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            self.session.run(inputs)?
        };

        let (_, waveform) = output
            .iter()
            .next()
            .ok_or_else(|| KokoroError::Ort(ort::Error::new("No output from model")))?;
        let waveform = waveform.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }
}

impl SpeechModel for KokoroModel {
    fn synthesize(
        &mut self,
        text: &str,
        clone: Option<CloneTarget<'_>>,
    ) -> Result<Vec<f32>, BackendError> {
        if clone.is_some() {
            return Err(KokoroError::CloningUnsupported.into());
        }

        let ids = phonemize(text, self.lang, &self.vocab, &self.espeak)?;
        if ids.is_empty() {
            log::warn!("No phoneme tokens produced for text: {text:?}");
            return Ok(Vec::new());
        }

        // One style index for the whole segment keeps prosody stable across windows.
        let style = self.voices.get_style(&self.voice, ids.len())?;
        let mut samples = Vec::with_capacity(ids.len() * 300);
        let windows = split_windows(&ids, &self.boundary_ids, MAX_PHONEME_LEN);
        if windows.len() > 1 {
            log::debug!(
                "{} phoneme tokens exceed {MAX_PHONEME_LEN}, split into {} windows",
                ids.len(),
                windows.len()
            );
        }
        for window in windows {
            samples.extend(self.run_window(window, &style)?);
        }

        self.produced_audio = true;
        Ok(samples)
    }

    fn sample_rate(&self) -> Option<u32> {
        self.produced_audio.then_some(SAMPLE_RATE)
    }
}

pub(crate) fn has_onnx_file(dir: &Path) -> bool {
    find_onnx_file(dir).is_ok()
}

/// Prefers `kokoro-quant-convinteger.onnx`, then the first `.onnx` file by name.
fn find_onnx_file(model_dir: &Path) -> Result<PathBuf, KokoroError> {
    let preferred = model_dir.join(PREFERRED_ONNX_FILE);
    if preferred.exists() {
        return Ok(preferred);
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(model_dir)
        .map_err(|_| KokoroError::ModelFileMissing(model_dir.to_path_buf()))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("onnx"))
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| KokoroError::ModelFileMissing(model_dir.to_path_buf()))
}

fn init_session(onnx_path: &Path, num_threads: Option<usize>) -> Result<Session, KokoroError> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers(vec![CPUExecutionProvider::default().build()])?
        .with_parallel_execution(true)?;

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(onnx_path)?)
}

/// Split `ids` into windows of at most `max_len` tokens, ending each window
/// just after its last boundary token when there is one.
fn split_windows<'a>(ids: &'a [i64], boundary_ids: &[i64], max_len: usize) -> Vec<&'a [i64]> {
    let mut windows = Vec::new();
    let mut rest = ids;
    while rest.len() > max_len {
        let cut = rest[..max_len]
            .iter()
            .rposition(|id| boundary_ids.contains(id))
            .map_or(max_len, |i| i + 1);
        let (window, tail) = rest.split_at(cut);
        windows.push(window);
        rest = tail;
    }
    if !rest.is_empty() {
        windows.push(rest);
    }
    windows
}
