use std::io::{Cursor, Read, Seek};
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};

use crate::error::TtsError;

/// Sample rate assumed until a model reports its own.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Mono audio accumulated from one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio
    pub sample_rate: u32,
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::empty(DEFAULT_SAMPLE_RATE)
    }
}

impl AudioBuffer {
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), TtsError> {
        let mut writer = hound::WavWriter::create(path, wav_spec(self.sample_rate))?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Serialize to an in-memory 32-bit float WAV container.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, TtsError> {
        let mut bytes = Vec::with_capacity(44 + self.samples.len() * 4);
        {
            let mut writer =
                hound::WavWriter::new(Cursor::new(&mut bytes), wav_spec(self.sample_rate))?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        Ok(bytes)
    }

    /// Parse a WAV container. Integer PCM is scaled into `[-1.0, 1.0]`;
    /// multi-channel input keeps only the first channel.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, TtsError> {
        read_wav(Cursor::new(bytes))
    }

    pub fn read_wav(path: &Path) -> Result<Self, TtsError> {
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        read_wav(file)
    }
}

/// Encode a buffer as base64 text wrapping a WAV container.
///
/// The output depends only on the samples and the sample rate.
pub fn encode(buffer: &AudioBuffer) -> Result<String, TtsError> {
    let bytes = buffer.to_wav_bytes()?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

/// Inverse of [`encode`].
pub fn decode(encoded: &str) -> Result<AudioBuffer, TtsError> {
    let bytes = general_purpose::STANDARD.decode(encoded.trim())?;
    AudioBuffer::from_wav_bytes(&bytes)
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    }
}

fn read_wav<R: Read + Seek>(source: R) -> Result<AudioBuffer, TtsError> {
    let mut reader = hound::WavReader::new(source)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved.into_iter().step_by(channels).collect()
    };

    Ok(AudioBuffer {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(len: usize, sample_rate: u32) -> AudioBuffer {
        let samples = (0..len)
            .map(|i| ((i as f32) * 0.013).sin() * 0.8)
            .collect();
        AudioBuffer {
            samples,
            sample_rate,
        }
    }

    #[test]
    fn decode_reproduces_samples_and_rate() {
        let buffer = sweep(4800, 24000);
        let encoded = encode(&buffer).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, buffer);
    }

    #[test]
    fn encoding_is_deterministic() {
        let buffer = sweep(1500, 22050);
        assert_eq!(encode(&buffer).unwrap(), encode(&buffer).unwrap());
    }

    #[test]
    fn encoded_payload_is_a_float_wav() {
        let buffer = sweep(10, 16000);
        let bytes = general_purpose::STANDARD
            .decode(encode(&buffer).unwrap())
            .unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn empty_buffer_round_trips_with_its_rate() {
        let decoded = decode(&encode(&AudioBuffer::default()).unwrap()).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(decode("not base64!!"), Err(TtsError::Decoding(_))));
    }

    #[test]
    fn reads_integer_pcm_as_normalized_floats() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for v in [16384i16, 0, -16384, 0] {
                writer.write_sample(v).unwrap();
            }
            writer.finalize().unwrap();
        }
        let buffer = AudioBuffer::from_wav_bytes(&bytes).unwrap();
        assert_eq!(buffer.sample_rate, 8000);
        assert_eq!(buffer.samples, vec![0.5, -0.5]);
    }

    #[test]
    fn write_wav_matches_in_memory_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let buffer = sweep(64, 24000);
        buffer.write_wav(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), buffer.to_wav_bytes().unwrap());
        assert_eq!(AudioBuffer::read_wav(&path).unwrap(), buffer);
    }
}
