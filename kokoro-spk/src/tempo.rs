//! Tempo chain decomposition
//!
//! Single-stage tempo filters only accept factors in `[0.5, 2]`. Larger or smaller speed
//! changes are expressed as a chain of stages whose product is the requested speed.

use crate::error::SpeechError;

/// Smallest factor a single tempo stage accepts
pub const MIN_TEMPO_FACTOR: f64 = 0.5;

/// Largest factor a single tempo stage accepts
pub const MAX_TEMPO_FACTOR: f64 = 2.0;

/// Decompose `velocity` into an ordered list of factors, each within `[0.5, 2]`.
///
/// Values below 1 are broken down into `0.5` stages, values above 1 into `2` stages,
/// with the remainder appended last.
pub fn build_tempo_chain(velocity: f64) -> Result<Vec<f64>, SpeechError> {
    if !velocity.is_finite() || velocity <= 0.0 {
        return Err(SpeechError::Validation(format!(
            "Tempo factor must be a positive finite number, got {}",
            velocity
        )));
    }

    let mut v = velocity;
    let mut factors = Vec::new();

    if v < 1.0 {
        while v < MIN_TEMPO_FACTOR {
            factors.push(MIN_TEMPO_FACTOR);
            v /= MIN_TEMPO_FACTOR;
        }
        factors.push(v);
    } else if v > 1.0 {
        while v > MAX_TEMPO_FACTOR {
            factors.push(MAX_TEMPO_FACTOR);
            v /= MAX_TEMPO_FACTOR;
        }
        factors.push(v);
    } else {
        factors.push(1.0);
    }

    Ok(factors)
}

/// Render a chain as an ffmpeg audio filter graph, e.g. `atempo=2,atempo=1.25`
pub fn atempo_filter(factors: &[f64]) -> String {
    factors
        .iter()
        .map(|f| format!("atempo={}", f))
        .collect::<Vec<_>>()
        .join(",")
}
