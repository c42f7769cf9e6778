//! kokoro-spk: Text-to-speech pipeline for the Kokoro synthesis model
//!
//! Provides the pipeline between raw text and raw model output:
//! - Text sanitization and token-budgeted chunking with silence markers
//! - Weighted voice formulas and embedding mixing
//! - Waveform silence trimming and tempo chains for playback speed
//! - A queued synthesizer driving pluggable phonemizer, model and audio backends

pub mod error;
pub mod config;
pub mod resources;
pub mod formula;
pub mod text;
pub mod voice;
pub mod trim;
pub mod tempo;
pub mod engines;
pub mod assets;
pub mod synthesizer;

pub use error::SpeechError;
pub use config::{Acceleration, OutputFormat, SpeechConfig, SynthesisRequest};
pub use formula::{parse_voice_formula, serialize_voice_formula, VoiceWeight};
pub use text::{Chunk, TextChunker};
pub use voice::{combine_voices, VoiceTensor};
pub use trim::trim_waveform;
pub use tempo::build_tempo_chain;
pub use assets::{AssetStore, DirVoiceLoader};
pub use synthesizer::{Backends, SynthesizedAudio, Synthesizer};
