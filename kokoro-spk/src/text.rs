//! Text sanitization, segmentation and token-budgeted chunking
//!
//! Punctuation followed by whitespace becomes an inline silence marker such as `[0.4s]`.
//! The sanitized text is then split on those markers, each speakable segment is
//! phonemized, and phoneme strings longer than the token budget are cut into pieces
//! before tokenization.

use crate::engines::{Phonemizer, Tokenizer};
use crate::error::SpeechError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One unit of an utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Chunk {
    /// Speakable span: phonemes plus their token ids
    Text { content: String, tokens: Vec<i64> },
    /// Pause of the given length
    Silence { duration_seconds: f64 },
}

impl Chunk {
    pub fn is_silence(&self) -> bool {
        matches!(self, Chunk::Silence { .. })
    }
}

/// Marker emitted after a punctuation character that is followed by whitespace.
/// `keep` tells whether the punctuation itself stays in the text.
fn punctuation_marker(c: char) -> Option<(&'static str, bool)> {
    match c {
        '.' => Some(("[0.4s]", false)),
        ',' => Some(("[0.2s]", false)),
        ';' => Some(("[0.4s]", false)),
        ':' => Some(("[0.3s]", false)),
        '!' | '?' => Some(("[0.1s]", true)),
        _ => None,
    }
}

const NEWLINE_MARKER: &str = "[0.4s]";

/// Replace punctuation and newlines with silence markers.
///
/// `.` `,` `;` `:` followed by whitespace become `[0.4s]`, `[0.2s]`, `[0.4s]` and `[0.3s]`
/// (the whitespace run is consumed). `!` and `?` are kept and followed by `[0.1s]`.
/// Remaining newline runs become `[0.4s]`. The result is trimmed.
pub fn sanitize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 16);
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some((marker, keep)) = punctuation_marker(c) {
            if chars.peek().is_some_and(|n| n.is_whitespace()) {
                while chars.peek().is_some_and(|n| n.is_whitespace()) {
                    chars.next();
                }
                if keep {
                    out.push(c);
                }
                out.push_str(marker);
                continue;
            }
        }

        if c == '\n' {
            while chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push_str(NEWLINE_MARKER);
            continue;
        }

        out.push(c);
    }

    out.trim().to_string()
}

/// Length in bytes of a silence marker starting at the beginning of `s`, if any.
/// Only `[<digits>s]` and `[<digits>.<digits>s]` are recognized.
fn marker_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'[') {
        return None;
    }

    let digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();

    let mut i = 1;
    let whole = digits(i);
    if whole == 0 {
        return None;
    }
    i += whole;

    if bytes.get(i) == Some(&b'.') {
        let frac = digits(i + 1);
        if frac == 0 {
            return None;
        }
        i += 1 + frac;
    }

    if bytes.get(i) == Some(&b's') && bytes.get(i + 1) == Some(&b']') {
        Some(i + 2)
    } else {
        None
    }
}

/// Split sanitized text on silence markers, keeping the markers as their own segments.
/// Segments are trimmed and empty ones dropped.
pub fn segment_text(sanitized: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < sanitized.len() {
        if let Some(len) = marker_len(&sanitized[i..]) {
            segments.push(&sanitized[start..i]);
            segments.push(&sanitized[i..i + len]);
            i += len;
            start = i;
        } else {
            // '[' is ASCII, so skipping whole chars keeps `i` on a boundary
            i += sanitized[i..].chars().next().map_or(1, char::len_utf8);
        }
    }
    segments.push(&sanitized[start..]);

    segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `segment` is exactly one silence marker (surrounding whitespace ignored)
pub fn is_silence_marker(segment: &str) -> bool {
    let segment = segment.trim();
    marker_len(segment) == Some(segment.len())
}

/// Duration in seconds of a silence marker, or 0 when `marker` is not one
pub fn extract_silence_duration(marker: &str) -> f64 {
    let marker = marker.trim();
    if !is_silence_marker(marker) {
        return 0.0;
    }
    marker[1..marker.len() - 2].parse().unwrap_or(0.0)
}

/// Cut a phoneme string into consecutive pieces of at most `tokens_per_chunk` characters
pub fn split_phonemes(phonemes: &str, tokens_per_chunk: usize) -> Vec<String> {
    let chars: Vec<char> = phonemes.chars().collect();
    if chars.len() <= tokens_per_chunk || tokens_per_chunk == 0 {
        return vec![phonemes.to_string()];
    }

    chars
        .chunks(tokens_per_chunk)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Turns raw text into an ordered chunk plan using a phonemizer and tokenizer
#[derive(Clone)]
pub struct TextChunker {
    phonemizer: Arc<dyn Phonemizer>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl TextChunker {
    pub fn new(phonemizer: Arc<dyn Phonemizer>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { phonemizer, tokenizer }
    }

    /// Build the chunk sequence for `text`.
    ///
    /// Silence and text chunks keep the order they have in the sanitized text. Text
    /// pieces that tokenize to nothing and zero-length silences are skipped.
    pub async fn chunk(&self, text: &str, lang: &str, tokens_per_chunk: usize) -> Result<Vec<Chunk>, SpeechError> {
        if tokens_per_chunk == 0 {
            return Err(SpeechError::Validation(
                "Tokens per chunk must be greater than 0".to_string(),
            ));
        }

        let sanitized = sanitize_text(text);
        let segments = segment_text(&sanitized);
        let mut chunks = Vec::with_capacity(segments.len());

        for segment in &segments {
            if is_silence_marker(segment) {
                let duration_seconds = extract_silence_duration(segment);
                if !duration_seconds.is_finite() {
                    return Err(SpeechError::Validation(
                        "Silence marker duration is out of range".to_string(),
                    ));
                }
                if duration_seconds > 0.0 {
                    chunks.push(Chunk::Silence { duration_seconds });
                } else {
                    debug!("Skipping zero-length silence marker {}", segment);
                }
                continue;
            }

            let phonemes = self.phonemizer.phonemize(segment, lang).await?;
            for piece in split_phonemes(&phonemes, tokens_per_chunk) {
                let tokens = self.tokenizer.tokenize(&piece)?;
                if tokens.is_empty() {
                    debug!("Skipping phoneme piece {:?} with no tokens", piece);
                    continue;
                }
                chunks.push(Chunk::Text { content: piece, tokens });
            }
        }

        debug!(
            "Chunked {} segments into {} chunks ({} silences)",
            segments.len(),
            chunks.len(),
            chunks.iter().filter(|c| c.is_silence()).count()
        );
        Ok(chunks)
    }
}
