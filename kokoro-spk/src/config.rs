//! Configuration for speech synthesis

use crate::error::SpeechError;
use crate::formula::parse_voice_formula;
use crate::resources;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Smallest accepted playback speed
pub const MIN_SPEED: f64 = 0.1;

/// Largest accepted playback speed
pub const MAX_SPEED: f64 = 5.0;

/// Largest accepted input text, in bytes
pub const MAX_TEXT_LENGTH: usize = 100_000;

/// Process-level speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Model context window in tokens (two are reserved for padding)
    pub context_window: usize,

    /// Model used when a request does not name one
    pub default_model: String,

    /// Voice formula used when a request does not provide one
    pub default_voice: String,

    /// Phonemizer language used when none can be derived
    pub default_lang: String,

    /// Maximum number of requests synthesized concurrently
    pub queue_size: usize,

    /// Longest accepted silence marker, in seconds
    pub max_silence_seconds: f64,

    /// Longest audio one request may produce before tempo changes, in seconds
    pub max_audio_seconds: f64,

    /// Model and voice asset download settings
    pub assets: AssetConfig,

    /// espeak-ng executable
    pub espeak_path: PathBuf,

    /// ffmpeg executable
    pub ffmpeg_path: PathBuf,

    /// Phoneme vocabulary file (tokens.txt or JSON)
    pub tokens_path: Option<PathBuf>,
}

/// Asset download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Base URL hosting `onnx/<model>.onnx` and `voices/<voice>.bin`
    pub base_url: String,

    /// Directory for downloaded assets
    pub cache_dir: PathBuf,

    /// Keep downloaded assets on disk
    pub enable_cache: bool,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry configuration
    pub retry: RetryConfig,
}

/// Retry configuration for asset downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts
    pub max_retries: u32,

    /// Initial retry delay in milliseconds
    pub initial_delay_ms: u64,

    /// Maximum retry delay in milliseconds
    pub max_delay_ms: u64,
}

/// Hardware backend requested for inference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Acceleration {
    #[default]
    Cpu,
    Gpu,
}

/// Audio container produced for a request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Wav,
    #[default]
    Mp3,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Mp3 => "audio/mpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = SpeechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(OutputFormat::Wav),
            "mp3" => Ok(OutputFormat::Mp3),
            other => Err(SpeechError::Validation(format!(
                "Unsupported output format '{}' (expected wav or mp3)",
                other
            ))),
        }
    }
}

/// A single synthesis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Text to speak
    pub text: String,

    /// Phonemizer language id (e.g. "en-us")
    pub lang: String,

    /// Voice formula, e.g. "af_heart*0.6 + af_bella*0.4"
    pub voice_formula: String,

    /// Model variant id
    pub model: String,

    /// Playback speed factor (0.1-5.0)
    #[serde(default = "default_speed")]
    pub speed: f64,

    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub acceleration: Acceleration,
}

fn default_speed() -> f64 {
    1.0
}

impl SynthesisRequest {
    /// Build a request with default model, speed, format and acceleration. The
    /// language is taken from the first voice of the formula.
    pub fn new(text: impl Into<String>, voice_formula: impl Into<String>) -> Self {
        let voice_formula = voice_formula.into();
        let lang = resources::lang_for_formula(&voice_formula).id.to_string();
        Self {
            text: text.into(),
            lang,
            voice_formula,
            model: resources::DEFAULT_MODEL.to_string(),
            speed: 1.0,
            format: OutputFormat::default(),
            acceleration: Acceleration::default(),
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_acceleration(mut self, acceleration: Acceleration) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Validate the request
    pub fn validate(&self) -> Result<(), SpeechError> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(SpeechError::Validation(format!(
                "Speed must be between {} and {}, got {}",
                MIN_SPEED, MAX_SPEED, self.speed
            )));
        }

        if self.text.trim().is_empty() {
            return Err(SpeechError::Validation("Text cannot be empty".to_string()));
        }

        if self.text.contains('\0') {
            return Err(SpeechError::Validation("Text contains null bytes".to_string()));
        }

        if self.text.len() > MAX_TEXT_LENGTH {
            return Err(SpeechError::Validation(format!(
                "Text too long (max {} bytes)",
                MAX_TEXT_LENGTH
            )));
        }

        if self.lang.is_empty() || self.lang.len() > 32 {
            return Err(SpeechError::Validation(
                "Language id must be between 1 and 32 characters".to_string(),
            ));
        }

        if !self.lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(SpeechError::Validation(
                "Language id contains invalid characters (only alphanumeric and '-' allowed)".to_string(),
            ));
        }

        if resources::find_model(&self.model).is_none() {
            return Err(SpeechError::Validation(format!(
                "Model not found, use one of: {}",
                resources::model_ids().join(", ")
            )));
        }

        parse_voice_formula(&self.voice_formula)?;

        Ok(())
    }
}

impl FromStr for SpeechConfig {
    type Err = SpeechError;

    /// Parse configuration, trying JSON, then TOML, then YAML
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        if let Ok(config) = serde_json::from_str::<SpeechConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<SpeechConfig>(content) {
            return Ok(config);
        }

        serde_yaml::from_str::<SpeechConfig>(content)
            .map_err(|e| SpeechError::Config(format!("Unrecognized configuration format: {}", e)))
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            context_window: 512,
            default_model: resources::DEFAULT_MODEL.to_string(),
            default_voice: resources::DEFAULT_VOICE.to_string(),
            default_lang: resources::DEFAULT_LANG.to_string(),
            queue_size: 4,
            max_silence_seconds: 60.0,
            max_audio_seconds: 3600.0,
            assets: AssetConfig::default(),
            espeak_path: PathBuf::from("espeak-ng"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            tokens_path: None,
        }
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("/tmp"))
            .join("kokoro-spk");

        Self {
            base_url: "https://huggingface.co/onnx-community/Kokoro-82M-v1.0-ONNX/resolve/1939ad2a8e416c0acfeecc08a694d14ef25f2231"
                .to_string(),
            cache_dir,
            enable_cache: true,
            timeout_secs: 300,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Validate retry configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries > 100 {
            return Err("Max retries too large (max 100)".to_string());
        }

        if self.initial_delay_ms > 60_000 {
            return Err("Initial delay too large (max 60000 ms)".to_string());
        }

        if self.max_delay_ms > 300_000 {
            return Err("Max delay too large (max 300000 ms)".to_string());
        }

        if self.initial_delay_ms > self.max_delay_ms {
            return Err("Initial delay cannot be greater than max delay".to_string());
        }

        Ok(())
    }
}

impl SpeechConfig {
    /// Tokens available to phonemes in one inference call
    pub fn tokens_per_chunk(&self) -> usize {
        self.context_window.saturating_sub(2)
    }

    /// Upper bound on the samples one request may render
    pub fn max_audio_samples(&self) -> usize {
        (self.max_audio_seconds * self.sample_rate as f64) as usize
    }

    /// Phonemizer language for a voice formula: the language of its first voice, or
    /// `default_lang` when that voice is not in the catalog.
    pub fn lang_for_voice(&self, formula: &str) -> String {
        resources::catalog_lang_for_formula(formula)
            .map(|lang| lang.id.to_string())
            .unwrap_or_else(|| self.default_lang.clone())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), SpeechError> {
        self.validate_inner().map_err(SpeechError::Config)
    }

    fn validate_inner(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("Sample rate must be greater than 0".to_string());
        }

        if self.context_window < 3 {
            return Err("Context window must leave room for at least one token".to_string());
        }

        if self.queue_size == 0 {
            return Err("Queue size must be greater than 0".to_string());
        }

        if self.queue_size > 10_000 {
            return Err("Queue size too large (max 10000)".to_string());
        }

        if !self.max_silence_seconds.is_finite() || self.max_silence_seconds <= 0.0 {
            return Err("Max silence must be a positive number of seconds".to_string());
        }

        if !self.max_audio_seconds.is_finite() || self.max_audio_seconds <= 0.0 {
            return Err("Max audio length must be a positive number of seconds".to_string());
        }

        if self.default_lang.is_empty() {
            return Err("Default language cannot be empty".to_string());
        }

        if resources::find_model(&self.default_model).is_none() {
            return Err(format!("Unknown default model '{}'", self.default_model));
        }

        parse_voice_formula(&self.default_voice)
            .map_err(|e| format!("Invalid default voice: {}", e))?;

        if self.assets.base_url.is_empty() {
            return Err("Asset base URL cannot be empty".to_string());
        }

        if !self.assets.base_url.starts_with("https://") && !self.assets.base_url.starts_with("http://") {
            return Err("Asset base URL must be an http(s) URL".to_string());
        }

        if self.assets.cache_dir.to_string_lossy().contains("..") {
            return Err("Cache directory path cannot contain '..'".to_string());
        }

        if self.assets.timeout_secs == 0 {
            return Err("Asset timeout must be greater than 0".to_string());
        }

        self.assets.retry.validate()?;

        Ok(())
    }

    /// Load configuration from a TOML, JSON or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SpeechError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        content.parse()
    }

    /// Override settings from `KOKORO_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("KOKORO_BASE_URL") {
            self.assets.base_url = url;
        }

        if let Ok(dir) = std::env::var("KOKORO_CACHE_DIR") {
            self.assets.cache_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("KOKORO_ESPEAK") {
            self.espeak_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("KOKORO_FFMPEG") {
            self.ffmpeg_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("KOKORO_TOKENS") {
            self.tokens_path = Some(PathBuf::from(path));
        }
    }
}
