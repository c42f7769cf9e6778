//! ffmpeg subprocess for tempo changes and MP3 encoding

use crate::config::OutputFormat;
use crate::engines::wav::{decode_wav, encode_wav};
use crate::engines::{AudioEncoder, AudioFilter};
use crate::error::SpeechError;
use crate::tempo::atempo_filter;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Bitrate used for MP3 output
pub const MP3_BITRATE: &str = "192k";

/// Largest file read back from ffmpeg
const MAX_OUTPUT_SIZE: u64 = 512 * 1024 * 1024;

/// Audio filter and encoder backed by the `ffmpeg` executable.
///
/// Each call works in its own temporary directory, removed when the call returns.
pub struct FfmpegAudio {
    program: PathBuf,
}

impl FfmpegAudio {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check that the executable can be started
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Write `wav` to a scratch file, run ffmpeg with `args` between input and output,
    /// and return the output file contents.
    async fn run(&self, wav: &[u8], args: &[&str], output_ext: &str) -> Result<Vec<u8>, SpeechError> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.wav");
        let output = dir.path().join(format!("output.{}", output_ext));
        tokio::fs::write(&input, wav).await?;

        let result = Command::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(&input)
            .args(args)
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SpeechError::AudioFilter(format!("Failed to run {}: {}", self.program.display(), e)))?;

        if !result.status.success() {
            warn!("ffmpeg exited with {}", result.status);
            return Err(SpeechError::AudioFilter(format!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        read_output(&output).await
    }
}

impl Default for FfmpegAudio {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

async fn read_output(path: &Path) -> Result<Vec<u8>, SpeechError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| SpeechError::AudioFilter(format!("ffmpeg produced no output: {}", e)))?;
    if metadata.len() > MAX_OUTPUT_SIZE {
        return Err(SpeechError::AudioFilter(format!(
            "ffmpeg output too large ({} bytes, max {} bytes)",
            metadata.len(),
            MAX_OUTPUT_SIZE
        )));
    }
    Ok(tokio::fs::read(path).await?)
}

#[async_trait]
impl AudioFilter for FfmpegAudio {
    async fn apply_tempo(&self, samples: Vec<f32>, sample_rate: u32, chain: &[f64]) -> Result<Vec<f32>, SpeechError> {
        if chain.iter().all(|&factor| factor == 1.0) {
            return Ok(samples);
        }

        let filter = atempo_filter(chain);
        debug!("Applying ffmpeg filter {} to {} samples", filter, samples.len());

        let wav = encode_wav(&samples, sample_rate)?;
        let output = self
            .run(&wav, &["-filter:a", filter.as_str(), "-c:a", "pcm_f32le", "-ac", "1"], "wav")
            .await?;
        let (adjusted, _) = decode_wav(&output).map_err(|e| SpeechError::AudioFilter(e.to_string()))?;
        Ok(adjusted)
    }
}

#[async_trait]
impl AudioEncoder for FfmpegAudio {
    async fn encode(&self, samples: &[f32], sample_rate: u32, format: OutputFormat) -> Result<Bytes, SpeechError> {
        let wav = encode_wav(samples, sample_rate)?;
        match format {
            OutputFormat::Wav => Ok(Bytes::from(wav)),
            OutputFormat::Mp3 => {
                let mp3 = self
                    .run(&wav, &["-b:a", MP3_BITRATE], format.extension())
                    .await
                    .map_err(|e| match e {
                        SpeechError::AudioFilter(msg) => SpeechError::Encoder(msg),
                        other => other,
                    })?;
                debug!("Encoded {} samples as {} bytes of MP3", samples.len(), mp3.len());
                Ok(Bytes::from(mp3))
            }
        }
    }
}
