//! WAV container encoding and decoding with hound

use crate::config::OutputFormat;
use crate::engines::AudioEncoder;
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;

/// Encode mono samples as a 32-bit float WAV file
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, SpeechError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    // 44-byte header plus 4 bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 4));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| SpeechError::Encoder(format!("WAV writer error: {}", e)))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| SpeechError::Encoder(format!("WAV sample error: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| SpeechError::Encoder(format!("WAV finalize error: {}", e)))?;
    }

    Ok(cursor.into_inner())
}

/// Decode a WAV file into mono f32 samples and its sample rate.
///
/// Integer formats are scaled to `[-1, 1]`; multi-channel input is averaged down to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32), SpeechError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| SpeechError::Encoder(format!("Invalid WAV data: {}", e)))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| SpeechError::Encoder(format!("WAV sample error: {}", e)))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| SpeechError::Encoder(format!("WAV sample error: {}", e)))?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}

/// WAV-only encoder, for setups without ffmpeg
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoder;

#[async_trait]
impl AudioEncoder for WavEncoder {
    async fn encode(&self, samples: &[f32], sample_rate: u32, format: OutputFormat) -> Result<Bytes, SpeechError> {
        match format {
            OutputFormat::Wav => Ok(Bytes::from(encode_wav(samples, sample_rate)?)),
            other => Err(SpeechError::Encoder(format!(
                "WAV encoder cannot produce {} output",
                other.extension()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_and_samples() {
        let samples = vec![0.0, 0.5, -0.5, 1.0];
        let bytes = encode_wav(&samples, 24_000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let (decoded, rate) = decode_wav(&bytes).unwrap();
        assert_eq!(rate, 24_000);
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_decode_int_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for v in [16384i16, 0, -16384, -16384] {
                writer.write_sample(v).unwrap();
            }
            writer.finalize().unwrap();
        }

        let (decoded, rate) = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(decoded, vec![0.25, -0.5]);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_wav(b"not a wav"), Err(SpeechError::Encoder(_))));
    }

    #[tokio::test]
    async fn test_wav_encoder_formats() {
        let encoder = WavEncoder;
        let bytes = encoder.encode(&[0.1; 10], 24_000, OutputFormat::Wav).await.unwrap();
        assert!(bytes.len() > 44);
        assert!(encoder.encode(&[0.1; 10], 24_000, OutputFormat::Mp3).await.is_err());
    }
}
