//! End-to-end synthesis tests with stub collaborators

use async_trait::async_trait;
use kokoro_spk::config::{Acceleration, OutputFormat, SpeechConfig, SynthesisRequest};
use kokoro_spk::engines::wav::{decode_wav, WavEncoder};
use kokoro_spk::engines::{AudioFilter, InferenceEngine, Phonemizer, Tokenizer};
use kokoro_spk::error::SpeechError;
use kokoro_spk::{Backends, DirVoiceLoader, Synthesizer};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WIDTH: usize = 8;

struct PassthroughPhonemizer;

#[async_trait]
impl Phonemizer for PassthroughPhonemizer {
    async fn phonemize(&self, text: &str, _lang: &str) -> Result<String, SpeechError> {
        Ok(text.to_string())
    }
}

struct AsciiTokenizer;

impl Tokenizer for AsciiTokenizer {
    fn tokenize(&self, phonemes: &str) -> Result<Vec<i64>, SpeechError> {
        Ok(phonemes
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c as i64)
            .collect())
    }
}

/// Emits a burst of speech framed by silence, 100 samples per token, and counts calls.
/// Also records the largest number of overlapping calls.
#[derive(Default)]
struct BurstEngine {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    delay_ms: u64,
}

#[async_trait]
impl InferenceEngine for BurstEngine {
    async fn infer(&self, token_ids: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>, SpeechError> {
        assert_eq!(speed, 1.0);
        assert_eq!(style.len(), WIDTH);
        assert_eq!(token_ids.first(), Some(&0));
        assert_eq!(token_ids.last(), Some(&0));

        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let speech = (token_ids.len() - 2) * 100;
        let mut waveform = vec![0.0; 2000];
        waveform.extend((0..speech).map(|i| if i % 2 == 0 { 0.6 } else { -0.6 }));
        waveform.extend(vec![0.0; 2000]);
        Ok(waveform)
    }

    fn supports(&self, acceleration: Acceleration) -> bool {
        acceleration == Acceleration::Cpu
    }
}

/// Drops every other sample, standing in for a 2x tempo change
struct DecimatingFilter;

#[async_trait]
impl AudioFilter for DecimatingFilter {
    async fn apply_tempo(&self, samples: Vec<f32>, _sample_rate: u32, chain: &[f64]) -> Result<Vec<f32>, SpeechError> {
        let factor: f64 = chain.iter().product();
        let step = factor.round().max(1.0) as usize;
        Ok(samples.into_iter().step_by(step).collect())
    }
}

fn write_voice(dir: &Path, id: &str, rows: usize, value: f32) {
    let bytes: Vec<u8> = std::iter::repeat(value)
        .take(rows * WIDTH)
        .flat_map(|v| v.to_le_bytes())
        .collect();
    std::fs::write(dir.join(format!("{}.bin", id)), bytes).unwrap();
}

fn build(dir: &Path, engine: Arc<BurstEngine>, queue_size: usize) -> Synthesizer {
    let mut config = SpeechConfig::default();
    config.queue_size = queue_size;

    Synthesizer::new(
        config,
        Backends {
            phonemizer: Arc::new(PassthroughPhonemizer),
            tokenizer: Arc::new(AsciiTokenizer),
            voices: Arc::new(DirVoiceLoader::new(dir).with_width(WIDTH)),
            engine,
            filter: Arc::new(DecimatingFilter),
            encoder: Arc::new(WavEncoder),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_wav_output_trimmed_with_silences() {
    let dir = tempfile::tempdir().unwrap();
    write_voice(dir.path(), "af_heart", 64, 0.1);
    write_voice(dir.path(), "af_bella", 64, 0.3);
    let engine = Arc::new(BurstEngine::default());
    let synth = build(dir.path(), Arc::clone(&engine), 2);

    let request = SynthesisRequest::new("Hello, world", "af_heart*0.5 + af_bella*0.5")
        .with_format(OutputFormat::Wav);
    let audio = synth.generate(&request).await.unwrap();
    assert_eq!(audio.mime_type, "audio/wav");

    let (samples, rate) = decode_wav(&audio.bytes).unwrap();
    assert_eq!(rate, 24_000);

    // each 5-token chunk: 500 samples of speech plus a 256-sample margin on both sides
    let speech = 500 + 2 * 256;
    let pause = (0.2 * 24_000.0f64).floor() as usize;
    assert_eq!(samples.len(), speech + pause + speech);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_speed_goes_through_filter() {
    let dir = tempfile::tempdir().unwrap();
    write_voice(dir.path(), "af_heart", 64, 0.1);
    let synth = build(dir.path(), Arc::new(BurstEngine::default()), 2);

    let normal = synth
        .synthesize_samples(&SynthesisRequest::new("Hello", "af_heart"))
        .await
        .unwrap();
    let fast = synth
        .synthesize_samples(&SynthesisRequest::new("Hello", "af_heart").with_speed(2.0))
        .await
        .unwrap();
    assert_eq!(fast.len(), (normal.len() + 1) / 2);
}

#[tokio::test]
async fn test_mismatched_voice_shapes() {
    let dir = tempfile::tempdir().unwrap();
    write_voice(dir.path(), "af_heart", 64, 0.1);
    write_voice(dir.path(), "am_adam", 32, 0.1);
    let synth = build(dir.path(), Arc::new(BurstEngine::default()), 1);

    let request = SynthesisRequest::new("Hello", "af_heart*0.7 + am_adam*0.3");
    match synth.synthesize_samples(&request).await {
        Err(SpeechError::Validation(msg)) => assert!(msg.contains("incompatible shapes")),
        other => panic!("Expected shape mismatch, got {:?}", other.map(|s| s.len())),
    }
}

#[tokio::test]
async fn test_missing_voice_is_upstream_failure() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(BurstEngine::default());
    let synth = build(dir.path(), Arc::clone(&engine), 1);

    let err = synth
        .synthesize_samples(&SynthesisRequest::new("Hello", "af_nicole"))
        .await
        .unwrap_err();
    assert!(err.is_upstream());
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_formula_reports_term() {
    let dir = tempfile::tempdir().unwrap();
    let synth = build(dir.path(), Arc::new(BurstEngine::default()), 1);

    let request = SynthesisRequest::new("Hello", "af_heart*0.5 + af_bella");
    match synth.synthesize_samples(&request).await {
        Err(SpeechError::Validation(msg)) => assert!(msg.contains("Term 2")),
        other => panic!("Expected validation error, got {:?}", other.map(|s| s.len())),
    }
}

#[tokio::test]
async fn test_queue_limits_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    write_voice(dir.path(), "af_heart", 64, 0.1);
    let engine = Arc::new(BurstEngine {
        delay_ms: 20,
        ..Default::default()
    });
    let synth = Arc::new(build(dir.path(), Arc::clone(&engine), 1));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let synth = Arc::clone(&synth);
        handles.push(tokio::spawn(async move {
            synth
                .synthesize_samples(&SynthesisRequest::new("Hello", "af_heart"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(engine.calls.load(Ordering::SeqCst), 4);
    assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(synth.queue_usage(), 0);
}

#[test]
fn test_blocking_caller() {
    let dir = tempfile::tempdir().unwrap();
    write_voice(dir.path(), "af_heart", 64, 0.1);
    let synth = build(dir.path(), Arc::new(BurstEngine::default()), 1);

    let samples = tokio_test::block_on(synth.synthesize_samples(&SynthesisRequest::new("Hi", "af_heart"))).unwrap();
    assert_eq!(samples.len(), 200 + 2 * 256);
}
