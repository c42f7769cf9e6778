//! ONNX Runtime inference engine

use crate::config::Acceleration;
use crate::engines::InferenceEngine;
use crate::error::SpeechError;
use async_trait::async_trait;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the model output holding the audio samples
const WAVEFORM_OUTPUT: &str = "waveform";

/// Synthesis model running on ONNX Runtime (CPU execution provider).
///
/// The session is created once by the caller and shared by reference; runs are
/// serialized through a mutex because a session run needs exclusive access.
pub struct OnnxInferenceEngine {
    session: Arc<Mutex<Session>>,
}

impl OnnxInferenceEngine {
    /// Build a session from model bytes, e.g. as returned by `AssetStore::fetch_model`
    pub fn from_memory(model: &[u8]) -> Result<Self, SpeechError> {
        let session = Session::builder()
            .map_err(|e| SpeechError::Inference(format!("Failed to create session: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SpeechError::Inference(format!("Failed to set optimization: {}", e)))?
            .commit_from_memory(model)
            .map_err(|e| SpeechError::Inference(format!("Failed to load model: {}", e)))?;

        info!("ONNX model loaded ({} bytes)", model.len());
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SpeechError> {
        let model = std::fs::read(path.as_ref())?;
        Self::from_memory(&model)
    }
}

#[async_trait]
impl InferenceEngine for OnnxInferenceEngine {
    async fn infer(&self, token_ids: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>, SpeechError> {
        let session = Arc::clone(&self.session);
        let token_ids = token_ids.to_vec();
        let style = style.to_vec();

        tokio::task::spawn_blocking(move || run_session(&session, token_ids, style, speed))
            .await
            .map_err(|e| SpeechError::Inference(format!("Inference task failed: {}", e)))?
    }

    fn supports(&self, acceleration: Acceleration) -> bool {
        acceleration == Acceleration::Cpu
    }
}

fn run_session(
    session: &Mutex<Session>,
    token_ids: Vec<i64>,
    style: Vec<f32>,
    speed: f32,
) -> Result<Vec<f32>, SpeechError> {
    let token_count = token_ids.len();
    let mut inputs: HashMap<String, ort::value::Value> = HashMap::new();

    let ids = ort::value::Tensor::from_array(([1, token_ids.len()], token_ids))
        .map_err(|e| SpeechError::Inference(format!("Failed to create input_ids tensor: {}", e)))?;
    inputs.insert("input_ids".to_string(), ids.into());

    let style = ort::value::Tensor::from_array(([1, style.len()], style))
        .map_err(|e| SpeechError::Inference(format!("Failed to create style tensor: {}", e)))?;
    inputs.insert("style".to_string(), style.into());

    let speed = ort::value::Tensor::from_array(([1], vec![speed]))
        .map_err(|e| SpeechError::Inference(format!("Failed to create speed tensor: {}", e)))?;
    inputs.insert("speed".to_string(), speed.into());

    let mut session = session.lock();
    let outputs = session
        .run(inputs)
        .map_err(|e| SpeechError::Inference(format!("ONNX inference failed: {}", e)))?;

    let output = match outputs.get(WAVEFORM_OUTPUT) {
        Some(output) => output,
        None => outputs
            .iter()
            .next()
            .map(|(_, output)| output)
            .ok_or_else(|| SpeechError::Inference("Model produced no outputs".to_string()))?,
    };

    let (_, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| SpeechError::Inference(format!("Failed to extract waveform: {}", e)))?;

    debug!("Generated {} samples from {} tokens", data.len(), token_count);
    Ok(data.to_vec())
}
