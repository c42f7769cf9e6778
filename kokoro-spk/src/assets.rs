//! Model and voice asset fetching

use crate::config::AssetConfig;
use crate::engines::VoiceLoader;
use crate::error::SpeechError;
use crate::resources;
use crate::voice::{VoiceTensor, EMBEDDING_WIDTH};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Downloads model and voice assets over HTTP, keeping copies on disk.
///
/// Unknown model ids fall back to the `model` variant and unknown voices to `af_alloy`.
pub struct AssetStore {
    client: Client,
    config: AssetConfig,
}

impl AssetStore {
    pub fn new(config: AssetConfig) -> Result<Self, SpeechError> {
        config.retry.validate().map_err(SpeechError::Config)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SpeechError::Asset(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    pub fn model_url(&self, model_id: &str) -> String {
        let model = match resources::find_model(model_id) {
            Some(model) => model.id,
            None => {
                warn!("Unknown model '{}', using '{}'", model_id, resources::FALLBACK_MODEL);
                resources::FALLBACK_MODEL
            }
        };
        format!("{}/onnx/{}.onnx", self.base_url(), model)
    }

    pub fn voice_url(&self, voice_id: &str) -> String {
        let voice = match resources::find_voice(voice_id) {
            Some(voice) => voice.id,
            None => {
                warn!("Unknown voice '{}', using '{}'", voice_id, resources::FALLBACK_VOICE);
                resources::FALLBACK_VOICE
            }
        };
        format!("{}/voices/{}.bin", self.base_url(), voice)
    }

    /// Model weights for an ONNX session
    pub async fn fetch_model(&self, model_id: &str) -> Result<Bytes, SpeechError> {
        self.fetch(&self.model_url(model_id)).await
    }

    /// Raw voice embedding bytes (little-endian f32)
    pub async fn fetch_voice(&self, voice_id: &str) -> Result<Bytes, SpeechError> {
        self.fetch(&self.voice_url(voice_id)).await
    }

    /// Location of the cached copy of `url`
    pub fn cache_path(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.config.cache_dir.join(hex::encode(digest))
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, SpeechError> {
        let cache_path = self.cache_path(url);
        if self.config.enable_cache {
            if let Ok(bytes) = tokio::fs::read(&cache_path).await {
                debug!("Asset cache hit for {}", url);
                return Ok(Bytes::from(bytes));
            }
        }

        let bytes = self.retry_request(|| self.download(url)).await?;

        if self.config.enable_cache {
            if let Err(e) = store(&cache_path, &bytes).await {
                warn!("Failed to cache {}: {}", url, e);
            }
        }
        Ok(bytes)
    }

    async fn download(&self, url: &str) -> Result<Bytes, SpeechError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SpeechError::Asset(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Asset(format!("{} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Asset(format!("Failed to read {}: {}", url, e)))?;
        info!("Downloaded {} ({} bytes)", url, bytes.len());
        Ok(bytes)
    }

    async fn retry_request<F, Fut>(&self, f: F) -> Result<Bytes, SpeechError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<Bytes, SpeechError>>,
    {
        let retry = &self.config.retry;
        let mut delay = retry.initial_delay_ms;
        let mut last_error = None;

        for attempt in 0..=retry.max_retries {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < retry.max_retries {
                        debug!(
                            "Asset request failed, retrying in {}ms (attempt {}/{})",
                            delay,
                            attempt + 1,
                            retry.max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        delay = delay
                            .checked_mul(2)
                            .map(|d| d.min(retry.max_delay_ms))
                            .unwrap_or(retry.max_delay_ms);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SpeechError::Asset("Unknown error".to_string())))
    }
}

/// Write through a sibling temp file so readers never see a partial asset
async fn store(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = path.with_extension("partial");
    tokio::fs::write(&partial, bytes).await?;
    tokio::fs::rename(&partial, path).await
}

#[async_trait]
impl VoiceLoader for AssetStore {
    async fn load(&self, voice_id: &str) -> Result<VoiceTensor, SpeechError> {
        let bytes = self
            .fetch_voice(voice_id)
            .await
            .map_err(|e| SpeechError::VoiceLoader(format!("Voice '{}': {}", voice_id, e)))?;
        VoiceTensor::from_le_bytes(&bytes, EMBEDDING_WIDTH)
    }
}

/// Loads `<dir>/<voice>.bin` embeddings from a local directory
pub struct DirVoiceLoader {
    dir: PathBuf,
    width: usize,
}

impl DirVoiceLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            width: EMBEDDING_WIDTH,
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }
}

#[async_trait]
impl VoiceLoader for DirVoiceLoader {
    async fn load(&self, voice_id: &str) -> Result<VoiceTensor, SpeechError> {
        if voice_id.is_empty() || !voice_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(SpeechError::Validation(format!("Invalid voice id '{}'", voice_id)));
        }

        let path = self.dir.join(format!("{}.bin", voice_id));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| SpeechError::VoiceLoader(format!("Failed to read {}: {}", path.display(), e)))?;
        VoiceTensor::from_le_bytes(&bytes, self.width)
    }
}
