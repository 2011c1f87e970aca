use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use shared_tts::{
    engines::kokoro::KokoroBackend, ModelConfigBuilder, ModelLoader, ProviderSelector,
    SynthesisRequest, TtsSettings, VoiceService,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let backend = Arc::new(KokoroBackend::new("models"));
    let loader = ModelLoader::new(backend).with_events(|event| println!("loader: {event:?}"));
    let config = ModelConfigBuilder::default()
        .model_identifier("kokoro-v1.0")
        .companion("af_heart")
        .build()?;
    let service = Arc::new(VoiceService::with_loader(loader, config));
    println!("Available models: {:?}", service.available_models());

    // Several requests race for the cold model; only one load happens.
    let load_start = Instant::now();
    let sentences = [
        "Hello there.",
        "Go on, go on, go on.",
        "That would be an ecumenical matter.",
    ];
    let workers: Vec<_> = sentences
        .into_iter()
        .map(|sentence| {
            let service = service.clone();
            thread::spawn(move || service.synthesize(&[sentence]))
        })
        .collect();
    for worker in workers {
        let audio = worker.join().map_err(|_| "synthesis thread panicked")??;
        println!("{:.2}s of audio at {}Hz", audio.duration_secs(), audio.sample_rate);
    }
    println!(
        "Cold start + 3 requests in {:.2?} ({} load)",
        load_start.elapsed(),
        service.loader().load_count()
    );

    let text = [
        "Hello! This is Kokoro, a text to speech model with multilingual support.",
        "It supports American English, British English, French, Spanish, \
         Hindi, Italian, Japanese, Mandarin Chinese, and Brazilian Portuguese.",
    ];
    let synth_start = Instant::now();
    let result = service.synthesize(&text)?;
    let synth_dur = synth_start.elapsed();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time)",
        result.duration_secs(),
        synth_dur,
        result.duration_secs() / synth_dur.as_secs_f64()
    );
    result.write_wav(Path::new("output.wav"))?;
    println!("Saved to output.wav");

    // Switching voice invalidates the cached model.
    service.set_model("kokoro-v1.0", Some("bf_emma"));
    let selector = ProviderSelector::new(service);
    let response = selector.handle(
        &TtsSettings::default(),
        &SynthesisRequest {
            text: "Hello from British Emma!".to_string(),
            context_id: "demo".to_string(),
        },
    );
    println!("{}", serde_json::to_string(&response)?.chars().take(120).collect::<String>());
    Ok(())
}
