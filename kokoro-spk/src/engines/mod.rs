//! Collaborator seams around the synthesis pipeline and their implementations

pub mod espeak;
pub mod ffmpeg;
pub mod vocab;
pub mod wav;
#[cfg(feature = "onnx")]
pub mod onnx;

use crate::config::{Acceleration, OutputFormat};
use crate::error::SpeechError;
use crate::voice::VoiceTensor;
use async_trait::async_trait;
use bytes::Bytes;

/// Converts text into a phoneme string for a language
#[async_trait]
pub trait Phonemizer: Send + Sync {
    async fn phonemize(&self, text: &str, lang: &str) -> Result<String, SpeechError>;
}

/// Maps a phoneme string to model token ids
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, phonemes: &str) -> Result<Vec<i64>, SpeechError>;
}

/// Loads the embedding tensor of a named voice, shaped `[rows, 1, width]`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceLoader: Send + Sync {
    async fn load(&self, voice_id: &str) -> Result<VoiceTensor, SpeechError>;
}

/// Neural synthesis model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Run the model on padded token ids with one embedding row and a speed scalar,
    /// returning the raw waveform.
    async fn infer(&self, token_ids: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>, SpeechError>;

    /// Whether the engine can run on the requested hardware backend
    fn supports(&self, acceleration: Acceleration) -> bool;
}

/// Applies a chain of tempo factors to a sample buffer
#[async_trait]
pub trait AudioFilter: Send + Sync {
    async fn apply_tempo(&self, samples: Vec<f32>, sample_rate: u32, chain: &[f64]) -> Result<Vec<f32>, SpeechError>;
}

/// Wraps raw samples into an audio container
#[async_trait]
pub trait AudioEncoder: Send + Sync {
    async fn encode(&self, samples: &[f32], sample_rate: u32, format: OutputFormat) -> Result<Bytes, SpeechError>;
}
