//! Voice formula parsing and serialization
//!
//! A formula mixes named voices by weight:
//!
//! ```text
//! voice1*weight1 + voice2*weight2 + ... + voiceN*weightN
//! ```
//!
//! Weights lie in `[0, 1]`, are rounded to the nearest 0.1 and must sum to 1.
//! A single voice without an asterisk has weight 1.

use crate::error::SpeechError;
use serde::{Deserialize, Serialize};

/// A voice identifier with its mixing weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceWeight {
    pub voice_id: String,
    pub weight: f64,
}

impl VoiceWeight {
    pub fn new(voice_id: impl Into<String>, weight: f64) -> Self {
        Self {
            voice_id: voice_id.into(),
            weight,
        }
    }
}

/// Round to the nearest 0.1, ties away from zero
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn is_formula_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '*' | '+')
}

fn is_voice_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse a voice formula into an ordered list of voice weights.
///
/// Fails with [`SpeechError::Validation`] naming the offending term or value when the
/// formula is empty, contains characters outside `[A-Za-z0-9_.*+-]`, has a malformed
/// term, a weight outside `[0, 1]`, or weights that do not add up to 1.
pub fn parse_voice_formula(formula: &str) -> Result<Vec<VoiceWeight>, SpeechError> {
    let formula: String = formula.chars().filter(|c| !c.is_whitespace()).collect();
    if formula.is_empty() {
        return Err(SpeechError::Validation(
            "Voice or voice formula cannot be empty".to_string(),
        ));
    }

    if !formula.chars().all(is_formula_char) {
        return Err(SpeechError::Validation(
            "Invalid formula. Only alphanumeric characters, hyphens (-), underscores (_), \
             periods (.), asterisks (*) and plus signs (+) are allowed"
                .to_string(),
        ));
    }

    let terms: Vec<&str> = formula.split('+').filter(|t| !t.is_empty()).collect();
    if terms.is_empty() {
        return Err(SpeechError::Validation(
            "Voice formula does not contain any voice".to_string(),
        ));
    }

    if terms.len() == 1 && !terms[0].contains('*') {
        let voice_id = terms[0];
        if !is_voice_id(voice_id) {
            return Err(SpeechError::Validation(format!(
                "Voice \"{}\" is invalid. Voice IDs may only contain alphanumeric characters, hyphens (-) and underscores (_)",
                voice_id
            )));
        }
        return Ok(vec![VoiceWeight::new(voice_id, 1.0)]);
    }

    let mut voices = Vec::with_capacity(terms.len());
    for (index, term) in terms.iter().enumerate() {
        let position = index + 1;
        if !term.contains('*') {
            return Err(SpeechError::Validation(format!(
                "Term {} (\"{}\") is invalid. Each term must contain an asterisk (*) separating voice and weight",
                position, term
            )));
        }

        let parts: Vec<&str> = term.split('*').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(SpeechError::Validation(format!(
                "Term {} (\"{}\") format is incorrect. Expected: voice*weight",
                position, term
            )));
        }

        let voice_id = parts[0];
        if !is_voice_id(voice_id) {
            return Err(SpeechError::Validation(format!(
                "Term {} (\"{}\") has an invalid voice \"{}\". Voice IDs may only contain alphanumeric characters, hyphens (-) and underscores (_)",
                position, term, voice_id
            )));
        }

        let weight: f64 = match parts[1].parse::<f64>() {
            Ok(w) if !w.is_nan() => w,
            _ => {
                return Err(SpeechError::Validation(format!(
                    "Weight for voice \"{}\" is not a valid number",
                    voice_id
                )))
            }
        };
        if !(0.0..=1.0).contains(&weight) {
            return Err(SpeechError::Validation(format!(
                "Weight for voice \"{}\" must be between 0 and 1, got {}",
                voice_id, weight
            )));
        }

        voices.push(VoiceWeight::new(voice_id, round_to_tenth(weight)));
    }

    let total: f64 = voices.iter().map(|v| v.weight).sum();
    if round_to_tenth(total) != 1.0 {
        return Err(SpeechError::Validation(format!(
            "The sum of weights must be exactly 100% but is {}%",
            round_to_tenth(total * 100.0)
        )));
    }

    Ok(voices)
}

/// Serialize voice weights back into formula syntax.
///
/// Entries are ordered by descending weight, zero or negative weights are dropped and
/// the rest are rounded to the nearest 0.1, e.g. `voice2*0.7 + voice1*0.3`.
pub fn serialize_voice_formula(voice_weights: &[VoiceWeight]) -> String {
    let mut sorted: Vec<&VoiceWeight> = voice_weights.iter().filter(|vw| vw.weight > 0.0).collect();
    sorted.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    sorted
        .iter()
        .map(|vw| format!("{}*{}", vw.voice_id, round_to_tenth(vw.weight)))
        .collect::<Vec<_>>()
        .join(" + ")
}
