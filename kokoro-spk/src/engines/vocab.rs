//! Phoneme vocabulary tokenizer

use crate::engines::Tokenizer;
use crate::error::SpeechError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Maps each phoneme character to its model token id.
///
/// Characters missing from the vocabulary are skipped.
#[derive(Debug, Clone, Default)]
pub struct VocabTokenizer {
    vocab: HashMap<char, i64>,
}

#[derive(Deserialize)]
struct VocabDocument {
    #[serde(default)]
    vocab: Option<HashMap<String, i64>>,
    #[serde(default)]
    model: Option<Box<VocabDocument>>,
}

impl VocabDocument {
    fn into_vocab(self) -> Option<HashMap<String, i64>> {
        self.vocab.or_else(|| self.model.and_then(|m| m.into_vocab()))
    }
}

impl VocabTokenizer {
    pub fn new(vocab: HashMap<char, i64>) -> Self {
        Self { vocab }
    }

    /// Load a vocabulary from a `tokens.txt` or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SpeechError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SpeechError::Tokenizer(format!("Failed to read {}: {}", path.display(), e)))?;
        let tokenizer: Self = content.parse()?;
        debug!("Loaded {} vocabulary entries from {}", tokenizer.len(), path.display());
        Ok(tokenizer)
    }

    pub fn len(&self) -> usize {
        self.vocab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }

    pub fn id_of(&self, symbol: char) -> Option<i64> {
        self.vocab.get(&symbol).copied()
    }
}

impl FromStr for VocabTokenizer {
    type Err = SpeechError;

    /// Parse a vocabulary, either a JSON document with a `vocab` table (top level or
    /// under `model`) or `tokens.txt` lines of the form `<symbol> <id>`.
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let trimmed = content.trim_start();
        let vocab = if trimmed.starts_with('{') {
            parse_json(trimmed)?
        } else {
            parse_tokens_txt(content)
        };

        if vocab.is_empty() {
            return Err(SpeechError::Tokenizer("Vocabulary is empty".to_string()));
        }
        Ok(Self { vocab })
    }
}

impl Tokenizer for VocabTokenizer {
    fn tokenize(&self, phonemes: &str) -> Result<Vec<i64>, SpeechError> {
        Ok(phonemes.chars().filter_map(|c| self.id_of(c)).collect())
    }
}

fn parse_json(content: &str) -> Result<HashMap<char, i64>, SpeechError> {
    let document: VocabDocument = serde_json::from_str(content)
        .map_err(|e| SpeechError::Tokenizer(format!("Invalid vocabulary JSON: {}", e)))?;
    let entries = document
        .into_vocab()
        .ok_or_else(|| SpeechError::Tokenizer("Vocabulary JSON has no \"vocab\" table".to_string()))?;

    Ok(entries
        .into_iter()
        .filter_map(|(symbol, id)| single_char(&symbol).map(|c| (c, id)))
        .collect())
}

/// Lines are `<symbol> <id>`. A line whose symbol is the space character starts with
/// the separator itself, e.g. `" 16"`.
fn parse_tokens_txt(content: &str) -> HashMap<char, i64> {
    let mut vocab = HashMap::new();
    for line in content.lines() {
        let Some((symbol, id)) = line.rsplit_once(' ') else {
            continue;
        };
        let Ok(id) = id.trim().parse::<i64>() else {
            continue;
        };
        let symbol = if symbol.is_empty() { " " } else { symbol };
        if let Some(c) = single_char(symbol) {
            vocab.insert(c, id);
        }
    }
    vocab
}

fn single_char(symbol: &str) -> Option<char> {
    let mut chars = symbol.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
