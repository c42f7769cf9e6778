//! Voice embedding tensors and weighted voice mixing

use crate::engines::VoiceLoader;
use crate::error::SpeechError;
use crate::formula::VoiceWeight;
use futures::future::try_join_all;
use tracing::debug;

/// Embedding width of the published voice assets
pub const EMBEDDING_WIDTH: usize = 256;

/// Tolerance when checking that voice weights add up to 1
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// A dense `[rows, inner, width]` f32 tensor holding one voice's style vectors.
///
/// Row `n` is the style vector used for a chunk of `n + 1` tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceTensor {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl VoiceTensor {
    pub fn new(shape: [usize; 3], data: Vec<f32>) -> Result<Self, SpeechError> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(SpeechError::Validation(format!(
                "Voice tensor data has {} values but shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.iter().product()],
        }
    }

    /// Decode a raw voice asset (little-endian f32) into `[len / width, 1, width]`
    pub fn from_le_bytes(bytes: &[u8], width: usize) -> Result<Self, SpeechError> {
        if width == 0 {
            return Err(SpeechError::Validation("Embedding width must be greater than 0".to_string()));
        }
        if bytes.len() % 4 != 0 {
            return Err(SpeechError::Validation(format!(
                "Voice asset length {} is not a multiple of 4 bytes",
                bytes.len()
            )));
        }

        let data: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if data.is_empty() || data.len() % width != 0 {
            return Err(SpeechError::Validation(format!(
                "Voice asset holds {} values, not a whole number of {}-wide rows",
                data.len(),
                width
            )));
        }

        let rows = data.len() / width;
        Self::new([rows, 1, width], data)
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Style vector `[row][0]`, or `None` when `row` is out of range
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        if row >= self.shape[0] || self.shape[1] == 0 {
            return None;
        }
        let stride = self.shape[1] * self.shape[2];
        let start = row * stride;
        Some(&self.data[start..start + self.shape[2]])
    }

    /// Style vector for a chunk holding `token_count` tokens
    pub fn style_for_tokens(&self, token_count: usize) -> Option<&[f32]> {
        token_count.checked_sub(1).and_then(|row| self.row(row))
    }
}

/// Mix voices into a single embedding by weighted sum.
///
/// All voices are loaded concurrently. The result has the common shape of the inputs,
/// each element being `Σ weight_v × voice_v[element]`.
pub async fn combine_voices(
    loader: &dyn VoiceLoader,
    voices: &[VoiceWeight],
) -> Result<VoiceTensor, SpeechError> {
    if voices.is_empty() {
        return Err(SpeechError::Validation(
            "You must select at least one voice".to_string(),
        ));
    }

    let total_weight: f64 = voices.iter().map(|v| v.weight).sum();
    if (total_weight - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(SpeechError::Validation(format!(
            "The sum of all voice weights must be 100%, but it is {}%",
            (total_weight * 1000.0).round() / 10.0
        )));
    }

    let tensors = try_join_all(voices.iter().map(|v| loader.load(&v.voice_id))).await?;

    let shape = tensors[0].shape();
    if let Some((index, mismatched)) = tensors.iter().enumerate().find(|(_, t)| t.shape() != shape) {
        return Err(SpeechError::Validation(format!(
            "Voice files have incompatible shapes: \"{}\" is {:?} but \"{}\" is {:?}",
            voices[0].voice_id,
            shape,
            voices[index].voice_id,
            mismatched.shape()
        )));
    }

    let mut combined = VoiceTensor::zeros(shape);
    for (voice, tensor) in voices.iter().zip(&tensors) {
        let weight = voice.weight as f32;
        for (acc, value) in combined.data.iter_mut().zip(tensor.data()) {
            *acc += weight * value;
        }
    }

    debug!("Combined {} voices into tensor of shape {:?}", voices.len(), shape);
    Ok(combined)
}
