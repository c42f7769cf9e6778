//! Basic speech synthesis example
//!
//! Needs espeak-ng, ffmpeg and a phoneme vocabulary (`KOKORO_TOKENS`).

use kokoro_spk::engines::espeak::EspeakPhonemizer;
use kokoro_spk::engines::ffmpeg::FfmpegAudio;
use kokoro_spk::engines::onnx::OnnxInferenceEngine;
use kokoro_spk::engines::vocab::VocabTokenizer;
use kokoro_spk::{AssetStore, Backends, OutputFormat, SpeechConfig, SynthesisRequest, Synthesizer};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut config = SpeechConfig::default();
    config.apply_env();

    let tokens_path = config
        .tokens_path
        .clone()
        .ok_or("set KOKORO_TOKENS to a tokens.txt vocabulary")?;

    let assets = Arc::new(AssetStore::new(config.assets.clone())?);
    println!("Fetching model {}...", config.default_model);
    let model = assets.fetch_model(&config.default_model).await?;
    let ffmpeg = Arc::new(FfmpegAudio::new(&config.ffmpeg_path));

    let backends = Backends {
        phonemizer: Arc::new(EspeakPhonemizer::new(&config.espeak_path)),
        tokenizer: Arc::new(VocabTokenizer::from_file(tokens_path)?),
        voices: assets,
        engine: Arc::new(OnnxInferenceEngine::from_memory(&model)?),
        filter: ffmpeg.clone(),
        encoder: ffmpeg,
    };
    let synthesizer = Synthesizer::new(config, backends)?;

    println!("Synthesizing speech...");
    let request = SynthesisRequest::new(
        "Hello! I am a mix of two voices. I can speak a little faster, too.",
        "af_heart*0.7 + af_bella*0.3",
    )
    .with_speed(1.2)
    .with_format(OutputFormat::Wav);

    match synthesizer.generate(&request).await {
        Ok(audio) => {
            std::fs::write("basic_speak.wav", &audio.bytes)?;
            println!("Wrote {} bytes of {} to basic_speak.wav", audio.bytes.len(), audio.mime_type);
        }
        Err(e) => {
            eprintln!("Failed to synthesize speech: {}", e);
        }
    }

    Ok(())
}
