use crate::audio::AudioBuffer;
use crate::config::ModelConfig;
use crate::error::TtsError;
use crate::loader::ModelLoader;

/// Synthesize `segments` in order into one buffer.
///
/// Blank segments are skipped; if nothing is left the model is never loaded
/// and an empty buffer at [`DEFAULT_SAMPLE_RATE`](crate::audio::DEFAULT_SAMPLE_RATE)
/// is returned. The buffer adopts the model's sample rate once it reports
/// one. Any segment failure discards the partial audio.
///
/// Segments are passed through as-is apart from trimming; splitting long
/// text is up to the caller.
pub fn synthesize<S: AsRef<str>>(
    loader: &ModelLoader,
    segments: &[S],
    config: &ModelConfig,
) -> Result<AudioBuffer, TtsError> {
    let pending: Vec<(usize, &str)> = segments
        .iter()
        .enumerate()
        .map(|(index, segment)| (index, segment.as_ref().trim()))
        .filter(|(_, segment)| !segment.is_empty())
        .collect();

    let mut buffer = AudioBuffer::default();
    if pending.is_empty() {
        log::debug!("No speakable segments in {} inputs", segments.len());
        return Ok(buffer);
    }

    let handle = loader.ensure_loaded(config)?;
    let clone = handle.clone_target();
    let mut model = handle.lock_model();

    for (index, segment) in pending {
        let samples = model.synthesize(segment, clone).map_err(|source| {
            log::error!("Synthesis failed at segment {index}: {source}");
            TtsError::SynthesisFailure {
                index,
                segment: TtsError::segment_preview(segment),
                source,
            }
        })?;

        if let Some(rate) = model.sample_rate() {
            buffer.sample_rate = rate;
        }
        buffer.samples.extend_from_slice(&samples);
    }

    log::debug!(
        "Synthesized {:.2}s of audio with model #{}",
        buffer.duration_secs(),
        handle.id()
    );
    Ok(buffer)
}
