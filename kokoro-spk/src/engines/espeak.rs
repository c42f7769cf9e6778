//! espeak-ng grapheme-to-phoneme conversion

use crate::engines::Phonemizer;
use crate::error::SpeechError;
use crate::resources;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Phonemizer backed by the `espeak-ng` executable
pub struct EspeakPhonemizer {
    program: PathBuf,
}

impl EspeakPhonemizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check that the executable can be started
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl Default for EspeakPhonemizer {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

#[async_trait]
impl Phonemizer for EspeakPhonemizer {
    async fn phonemize(&self, text: &str, lang: &str) -> Result<String, SpeechError> {
        let lang = resources::resolve_lang(lang);
        let text = normalize_text(text);
        if text.is_empty() {
            return Ok(String::new());
        }

        // Text goes through stdin so it is never parsed as an option
        let mut child = Command::new(&self.program)
            .args(["-q", "--ipa", "-v", lang.id, "--stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Phonemizer(format!("Failed to run {}: {}", self.program.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| SpeechError::Phonemizer(format!("Failed to write to espeak-ng: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SpeechError::Phonemizer(format!("espeak-ng did not finish: {}", e)))?;

        if !output.status.success() {
            warn!("espeak-ng exited with {}", output.status);
            return Err(SpeechError::Phonemizer(format!(
                "espeak-ng failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let phonemes = join_lines(&String::from_utf8_lossy(&output.stdout));
        debug!("Phonemized {} chars as {} ({} phoneme chars)", text.chars().count(), lang.id, phonemes.chars().count());
        Ok(phonemes)
    }
}

/// Replace typographic quotes and full-width CJK punctuation with ASCII equivalents
/// espeak-ng understands, and flatten newlines and tabs.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '«' => out.push('('),
            '»' => out.push(')'),
            '、' | '，' => out.push_str(", "),
            '。' => out.push_str(". "),
            '！' => out.push_str("! "),
            '：' => out.push_str(": "),
            '；' => out.push_str("; "),
            '？' => out.push_str("? "),
            '\n' | '\t' => out.push_str("  "),
            other => out.push(other),
        }
    }
    out.trim().to_string()
}

/// espeak-ng writes one line per clause; the model expects a single line
fn join_lines(output: &str) -> String {
    output.split('\n').collect::<Vec<_>>().join(" ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_quotes() {
        assert_eq!(normalize_text("\u{2018}hi\u{2019}"), "'hi'");
        assert_eq!(normalize_text("\u{201C}quoted\u{201D}"), "\"quoted\"");
        assert_eq!(normalize_text("«aside»"), "(aside)");
    }

    #[test]
    fn test_normalize_cjk_punctuation() {
        assert_eq!(normalize_text("你好，世界。"), "你好, 世界.");
        assert_eq!(normalize_text("本当？はい！"), "本当? はい!");
        assert_eq!(normalize_text("a：b；c、d"), "a: b; c, d");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_text("\tone\ntwo\n"), "one  two");
    }

    #[test]
    fn test_join_lines() {
        assert_eq!(join_lines("həlˈoʊ\nwˈɜːld\n"), "həlˈoʊ wˈɜːld");
        assert_eq!(join_lines(""), "");
    }

    #[tokio::test]
    async fn test_missing_executable_is_upstream_error() {
        let phonemizer = EspeakPhonemizer::new("/nonexistent/espeak-ng");
        assert!(!phonemizer.is_available().await);
        let err = phonemizer.phonemize("hello", "en-us").await.unwrap_err();
        assert!(matches!(err, SpeechError::Phonemizer(_)));
    }

    #[tokio::test]
    async fn test_empty_text_skips_process() {
        let phonemizer = EspeakPhonemizer::new("/nonexistent/espeak-ng");
        assert_eq!(phonemizer.phonemize(" \n ", "en-us").await.unwrap(), "");
    }
}
