//! Error types for kokoro-spk

use thiserror::Error;

/// Speech synthesis errors
#[derive(Error, Debug)]
pub enum SpeechError {
    /// Malformed formula, out-of-range speed or weight, empty voice list, shape mismatch
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Acceleration unavailable: {0}")]
    AccelerationUnavailable(String),

    #[error("No waveforms generated")]
    NoOutput,

    #[error("Phonemizer error: {0}")]
    Phonemizer(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Voice loader error: {0}")]
    VoiceLoader(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Audio filter error: {0}")]
    AudioFilter(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Asset error: {0}")]
    Asset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeechError {
    /// Failure reported by an external collaborator (phonemizer, tokenizer, loader,
    /// inference engine, audio filter, encoder or asset fetch).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            SpeechError::Phonemizer(_)
                | SpeechError::Tokenizer(_)
                | SpeechError::VoiceLoader(_)
                | SpeechError::Inference(_)
                | SpeechError::AudioFilter(_)
                | SpeechError::Encoder(_)
                | SpeechError::Asset(_)
                | SpeechError::Io(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SpeechError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SpeechError::Validation("bad".to_string()).is_validation());
        assert!(!SpeechError::Validation("bad".to_string()).is_upstream());
        assert!(SpeechError::Inference("session".to_string()).is_upstream());
        assert!(SpeechError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).is_upstream());
        assert!(!SpeechError::NoOutput.is_upstream());
        assert!(!SpeechError::AccelerationUnavailable("gpu".to_string()).is_validation());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(SpeechError::NoOutput.to_string(), "No waveforms generated");
        let err = SpeechError::Validation("Weight for voice \"a\" is not a valid number".to_string());
        assert!(err.to_string().contains("\"a\""));
    }
}
