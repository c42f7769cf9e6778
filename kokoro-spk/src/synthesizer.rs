//! Synthesis orchestration with queue management

use crate::config::{OutputFormat, SpeechConfig, SynthesisRequest};
use crate::engines::{AudioEncoder, AudioFilter, InferenceEngine, Phonemizer, Tokenizer, VoiceLoader};
use crate::error::SpeechError;
use crate::formula::{parse_voice_formula, serialize_voice_formula};
use crate::tempo::build_tempo_chain;
use crate::text::{Chunk, TextChunker};
use crate::trim::trim_waveform;
use crate::voice::{combine_voices, VoiceTensor};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Speed scalar passed to the model; playback speed is applied afterwards
const MODEL_SPEED: f32 = 1.0;

/// External collaborators the synthesizer drives
#[derive(Clone)]
pub struct Backends {
    pub phonemizer: Arc<dyn Phonemizer>,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub voices: Arc<dyn VoiceLoader>,
    pub engine: Arc<dyn InferenceEngine>,
    pub filter: Arc<dyn AudioFilter>,
    pub encoder: Arc<dyn AudioEncoder>,
}

/// Encoded result of a synthesis request
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Bytes,
    pub mime_type: &'static str,
    pub format: OutputFormat,
}

/// Turns requests into audio: chunk, mix voices, infer per chunk, trim, concatenate,
/// change tempo, encode.
pub struct Synthesizer {
    config: Arc<SpeechConfig>,
    chunker: TextChunker,
    voices: Arc<dyn VoiceLoader>,
    engine: Arc<dyn InferenceEngine>,
    filter: Arc<dyn AudioFilter>,
    encoder: Arc<dyn AudioEncoder>,
    // Queue management
    queue_semaphore: Arc<Semaphore>,
}

impl Synthesizer {
    pub fn new(config: SpeechConfig, backends: Backends) -> Result<Self, SpeechError> {
        config.validate()?;

        let queue_semaphore = Arc::new(Semaphore::new(config.queue_size));
        info!(
            "Synthesizer ready (sample rate {} Hz, {} tokens per chunk, queue size {})",
            config.sample_rate,
            config.tokens_per_chunk(),
            config.queue_size
        );

        Ok(Self {
            config: Arc::new(config),
            chunker: TextChunker::new(backends.phonemizer, backends.tokenizer),
            voices: backends.voices,
            engine: backends.engine,
            filter: backends.filter,
            encoder: backends.encoder,
            queue_semaphore,
        })
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Synthesize and encode a request in its output format.
    ///
    /// Waits for a queue slot when `queue_size` requests are already running.
    pub async fn generate(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, SpeechError> {
        let _permit = self
            .queue_semaphore
            .acquire()
            .await
            .map_err(|e| SpeechError::Config(format!("Failed to acquire queue permit: {}", e)))?;

        let samples = self.run_pipeline(request).await?;
        let bytes = self
            .encoder
            .encode(&samples, self.config.sample_rate, request.format)
            .await?;

        info!(
            "Encoded {} samples as {} ({} bytes)",
            samples.len(),
            request.format.mime_type(),
            bytes.len()
        );
        Ok(SynthesizedAudio {
            bytes,
            mime_type: request.format.mime_type(),
            format: request.format,
        })
    }

    /// Synthesize a request into the final, tempo-adjusted sample buffer
    pub async fn synthesize_samples(&self, request: &SynthesisRequest) -> Result<Vec<f32>, SpeechError> {
        let _permit = self
            .queue_semaphore
            .acquire()
            .await
            .map_err(|e| SpeechError::Config(format!("Failed to acquire queue permit: {}", e)))?;

        self.run_pipeline(request).await
    }

    async fn run_pipeline(&self, request: &SynthesisRequest) -> Result<Vec<f32>, SpeechError> {
        if !self.engine.supports(request.acceleration) {
            return Err(SpeechError::AccelerationUnavailable(format!(
                "{:?} acceleration is not supported in this environment",
                request.acceleration
            )));
        }
        request.validate()?;

        let chunks = self
            .chunker
            .chunk(&request.text, &request.lang, self.config.tokens_per_chunk())
            .await?;

        let voices = parse_voice_formula(&request.voice_formula)?;
        let combined = combine_voices(self.voices.as_ref(), &voices).await?;
        info!(
            "Synthesizing {} chunks with voice {} (model {})",
            chunks.len(),
            serialize_voice_formula(&voices),
            request.model
        );

        let waveform = self.render_chunks(&chunks, &combined).await?;

        if request.speed == 1.0 {
            return Ok(waveform);
        }

        let chain = build_tempo_chain(request.speed)?;
        info!("Applying tempo chain {:?} for speed {}", chain, request.speed);
        self.filter
            .apply_tempo(waveform, self.config.sample_rate, &chain)
            .await
    }

    /// Run each chunk in order and concatenate the results
    async fn render_chunks(&self, chunks: &[Chunk], voice: &VoiceTensor) -> Result<Vec<f32>, SpeechError> {
        let max_samples = self.config.max_audio_samples();
        let mut total_samples = 0usize;
        let mut waveforms: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            match chunk {
                Chunk::Silence { duration_seconds } => {
                    let duration_seconds = *duration_seconds;
                    if !duration_seconds.is_finite() || duration_seconds > self.config.max_silence_seconds {
                        return Err(SpeechError::Validation(format!(
                            "Silence of {}s exceeds the {}s limit",
                            duration_seconds, self.config.max_silence_seconds
                        )));
                    }
                    let len = (duration_seconds * self.config.sample_rate as f64).floor() as usize;
                    total_samples = self.check_output_length(total_samples, len, max_samples)?;
                    waveforms.push(vec![0.0; len]);
                }
                Chunk::Text { content, tokens } => {
                    if tokens.is_empty() {
                        debug!("Skipping chunk with no tokens");
                        continue;
                    }

                    let style = voice.style_for_tokens(tokens.len()).ok_or_else(|| {
                        SpeechError::Validation(format!(
                            "Chunk of {} tokens exceeds the {} style rows of the voice",
                            tokens.len(),
                            voice.rows()
                        ))
                    })?;

                    let mut padded = Vec::with_capacity(tokens.len() + 2);
                    padded.push(0);
                    padded.extend_from_slice(tokens);
                    padded.push(0);

                    debug!("Inferring chunk {:?} ({} tokens)", content, tokens.len());
                    let raw = self.engine.infer(&padded, style, MODEL_SPEED).await?;
                    let trimmed = trim_waveform(&raw);
                    debug!("Trimmed waveform from {} to {} samples", raw.len(), trimmed.len());
                    total_samples = self.check_output_length(total_samples, trimmed.len(), max_samples)?;
                    waveforms.push(trimmed);
                }
            }
        }

        if waveforms.is_empty() {
            return Err(SpeechError::NoOutput);
        }

        Ok(waveforms.concat())
    }

    fn check_output_length(&self, total: usize, added: usize, max_samples: usize) -> Result<usize, SpeechError> {
        match total.checked_add(added) {
            Some(total) if total <= max_samples => Ok(total),
            _ => Err(SpeechError::Validation(format!(
                "Request produces more than {}s of audio",
                self.config.max_audio_seconds
            ))),
        }
    }

    /// Number of requests currently holding a queue slot
    pub fn queue_usage(&self) -> usize {
        let available = self.queue_semaphore.available_permits();
        self.config.queue_size.saturating_sub(available)
    }

    pub fn queue_capacity(&self) -> usize {
        self.config.queue_size
    }

    pub fn is_queue_full(&self) -> bool {
        self.queue_semaphore.available_permits() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Acceleration;
    use crate::engines::{MockInferenceEngine, MockVoiceLoader};
    use async_trait::async_trait;
    use mockall::predicate::*;
    use std::sync::Mutex;

    struct EchoPhonemizer;

    #[async_trait]
    impl Phonemizer for EchoPhonemizer {
        async fn phonemize(&self, text: &str, _lang: &str) -> Result<String, SpeechError> {
            Ok(text.to_lowercase())
        }
    }

    struct LetterTokenizer;

    impl Tokenizer for LetterTokenizer {
        fn tokenize(&self, phonemes: &str) -> Result<Vec<i64>, SpeechError> {
            Ok(phonemes
                .chars()
                .filter(|c| c.is_ascii_lowercase())
                .map(|c| (c as i64) - ('a' as i64) + 1)
                .collect())
        }
    }

    struct LengthEncoder;

    #[async_trait]
    impl AudioEncoder for LengthEncoder {
        async fn encode(&self, samples: &[f32], _sample_rate: u32, _format: OutputFormat) -> Result<Bytes, SpeechError> {
            Ok(Bytes::from((samples.len() as u64).to_le_bytes().to_vec()))
        }
    }

    /// Records the chains it is asked to apply and halves the buffer length
    #[derive(Default)]
    struct RecordingFilter {
        chains: Mutex<Vec<Vec<f64>>>,
    }

    #[async_trait]
    impl AudioFilter for RecordingFilter {
        async fn apply_tempo(&self, samples: Vec<f32>, _sample_rate: u32, chain: &[f64]) -> Result<Vec<f32>, SpeechError> {
            self.chains.lock().unwrap().push(chain.to_vec());
            Ok(samples[..samples.len() / 2].to_vec())
        }
    }

    fn voice_loader(rows: usize) -> MockVoiceLoader {
        let mut loader = MockVoiceLoader::new();
        loader.expect_load().returning(move |_| {
            let data = (0..rows * 4).map(|i| (i / 4) as f32).collect();
            VoiceTensor::new([rows, 1, 4], data)
        });
        loader
    }

    /// Engine returning one loud sample per input token, padding included
    fn loud_engine() -> MockInferenceEngine {
        let mut engine = MockInferenceEngine::new();
        engine.expect_supports().returning(|a| a == Acceleration::Cpu);
        engine
            .expect_infer()
            .returning(|ids, _, _| Ok(vec![0.5; ids.len()]));
        engine
    }

    fn synthesizer(engine: MockInferenceEngine, loader: MockVoiceLoader, filter: Arc<RecordingFilter>) -> Synthesizer {
        let mut config = SpeechConfig::default();
        config.sample_rate = 100;
        config.queue_size = 2;
        Synthesizer::new(
            config,
            Backends {
                phonemizer: Arc::new(EchoPhonemizer),
                tokenizer: Arc::new(LetterTokenizer),
                voices: Arc::new(loader),
                engine: Arc::new(engine),
                filter,
                encoder: Arc::new(LengthEncoder),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_pipeline_concatenates_in_order() {
        let synth = synthesizer(loud_engine(), voice_loader(16), Arc::default());
        let request = SynthesisRequest::new("ab, cd", "af_heart");

        let samples = synth.synthesize_samples(&request).await.unwrap();
        // "ab" -> 4 samples, [0.2s] at 100 Hz -> 20 zeros, "cd" -> 4 samples
        assert_eq!(samples.len(), 28);
        assert!(samples[..4].iter().all(|&s| s == 0.5));
        assert!(samples[4..24].iter().all(|&s| s == 0.0));
        assert!(samples[24..].iter().all(|&s| s == 0.5));
    }

    #[tokio::test]
    async fn test_inference_inputs() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_supports().returning(|_| true);
        engine
            .expect_infer()
            .withf(|ids, style, speed| {
                // three tokens select row 2, whose values are all 2.0
                ids == [0, 1, 2, 3, 0] && style == [2.0; 4] && *speed == 1.0
            })
            .times(1)
            .returning(|_, _, _| Ok(vec![0.3; 8]));

        let synth = synthesizer(engine, voice_loader(8), Arc::default());
        let samples = synth
            .synthesize_samples(&SynthesisRequest::new("abc", "af_heart"))
            .await
            .unwrap();
        assert_eq!(samples.len(), 8);
    }

    #[tokio::test]
    async fn test_speed_applies_tempo_chain() {
        let filter = Arc::new(RecordingFilter::default());
        let synth = synthesizer(loud_engine(), voice_loader(16), Arc::clone(&filter));

        let request = SynthesisRequest::new("abcdef", "af_heart").with_speed(2.5);
        let samples = synth.synthesize_samples(&request).await.unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(*filter.chains.lock().unwrap(), vec![vec![2.0, 1.25]]);

        let request = SynthesisRequest::new("abcdef", "af_heart");
        synth.synthesize_samples(&request).await.unwrap();
        assert_eq!(filter.chains.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gpu_unavailable() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_supports().with(eq(Acceleration::Gpu)).returning(|_| false);
        engine.expect_infer().never();

        let synth = synthesizer(engine, voice_loader(4), Arc::default());
        let request = SynthesisRequest::new("abc", "af_heart").with_acceleration(Acceleration::Gpu);
        assert!(matches!(
            synth.synthesize_samples(&request).await,
            Err(SpeechError::AccelerationUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_speed_out_of_range() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_supports().returning(|_| true);
        engine.expect_infer().never();

        let synth = synthesizer(engine, voice_loader(4), Arc::default());
        let request = SynthesisRequest::new("abc", "af_heart").with_speed(6.0);
        assert!(synth.synthesize_samples(&request).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_no_output() {
        let synth = synthesizer(loud_engine(), voice_loader(4), Arc::default());
        // digits phonemize to nothing the tokenizer knows
        let request = SynthesisRequest::new("123 456", "af_heart");
        assert!(matches!(
            synth.synthesize_samples(&request).await,
            Err(SpeechError::NoOutput)
        ));
    }

    #[tokio::test]
    async fn test_oversized_silence_is_rejected() {
        let synth = synthesizer(loud_engine(), voice_loader(16), Arc::default());

        let request = SynthesisRequest::new("hi [99999999999s] there", "af_heart");
        assert!(synth.synthesize_samples(&request).await.unwrap_err().is_validation());

        let request = SynthesisRequest::new(format!("hi [{}s] there", "9".repeat(400)), "af_heart");
        assert!(synth.synthesize_samples(&request).await.unwrap_err().is_validation());

        let request = SynthesisRequest::new("hi [61s] there", "af_heart");
        assert!(synth.synthesize_samples(&request).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_total_audio_length_is_bounded() {
        let mut config = SpeechConfig::default();
        config.sample_rate = 100;
        config.max_audio_seconds = 10.0;
        let synth = Synthesizer::new(
            config,
            Backends {
                phonemizer: Arc::new(EchoPhonemizer),
                tokenizer: Arc::new(LetterTokenizer),
                voices: Arc::new(voice_loader(16)),
                engine: Arc::new(loud_engine()),
                filter: Arc::new(RecordingFilter::default()),
                encoder: Arc::new(LengthEncoder),
            },
        )
        .unwrap();

        // each marker fits the silence limit, together they exceed 10s
        let request = SynthesisRequest::new("a [6s] b [6s] c", "af_heart");
        assert!(synth.synthesize_samples(&request).await.unwrap_err().is_validation());

        let request = SynthesisRequest::new("a [4s] b [4s] c", "af_heart");
        assert_eq!(synth.synthesize_samples(&request).await.unwrap().len(), 800 + 9);
    }

    #[tokio::test]
    async fn test_zero_length_silence_is_not_output() {
        let synth = synthesizer(loud_engine(), voice_loader(4), Arc::default());
        let request = SynthesisRequest::new("123 [0s] 456", "af_heart");
        assert!(matches!(
            synth.synthesize_samples(&request).await,
            Err(SpeechError::NoOutput)
        ));
    }

    #[tokio::test]
    async fn test_chunk_longer_than_voice_rows() {
        let synth = synthesizer(loud_engine(), voice_loader(2), Arc::default());
        let request = SynthesisRequest::new("abcdef", "af_heart");
        assert!(synth.synthesize_samples(&request).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_inference_failure_aborts_request() {
        let mut engine = MockInferenceEngine::new();
        engine.expect_supports().returning(|_| true);
        engine
            .expect_infer()
            .times(1)
            .returning(|_, _, _| Err(SpeechError::Inference("session closed".to_string())));

        let synth = synthesizer(engine, voice_loader(16), Arc::default());
        let request = SynthesisRequest::new("ab. cd", "af_heart");
        let err = synth.synthesize_samples(&request).await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_generate_reports_format() {
        let synth = synthesizer(loud_engine(), voice_loader(16), Arc::default());
        let request = SynthesisRequest::new("ab", "af_heart").with_format(OutputFormat::Wav);

        let audio = synth.generate(&request).await.unwrap();
        assert_eq!(audio.mime_type, "audio/wav");
        assert_eq!(audio.format, OutputFormat::Wav);
        assert_eq!(u64::from_le_bytes(audio.bytes[..8].try_into().unwrap()), 4);
    }

    #[tokio::test]
    async fn test_queue_accounting() {
        let synth = synthesizer(loud_engine(), voice_loader(4), Arc::default());
        assert_eq!(synth.queue_capacity(), 2);
        assert_eq!(synth.queue_usage(), 0);
        assert!(!synth.is_queue_full());
    }
}
