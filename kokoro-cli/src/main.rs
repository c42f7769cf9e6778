// Kokoro Command Line Interface
// Text-to-speech synthesis, phonemization and voice catalog tools

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kokoro_spk::engines::espeak::EspeakPhonemizer;
use kokoro_spk::engines::vocab::VocabTokenizer;
use kokoro_spk::engines::Phonemizer;
use kokoro_spk::resources::{self, Gender};
use kokoro_spk::{parse_voice_formula, serialize_voice_formula, SpeechConfig, TextChunker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kokoro")]
#[command(about = "Kokoro text-to-speech command line interface", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize speech to an audio file
    Speak {
        /// Text to speak
        #[arg(long, short, conflicts_with = "file")]
        text: Option<String>,

        /// Read the text from a file
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Voice or voice formula, e.g. "af_heart*0.6 + af_bella*0.4"
        #[arg(long)]
        voice: Option<String>,

        /// Phonemizer language (defaults to the language of the first voice, then `default_lang`)
        #[arg(long)]
        lang: Option<String>,

        /// Model variant
        #[arg(long)]
        model: Option<String>,

        /// Playback speed (0.1-5.0)
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Output format (wav, mp3)
        #[arg(long, default_value = "mp3")]
        format: String,

        /// Request GPU acceleration
        #[arg(long)]
        gpu: bool,

        /// Output file (defaults to speech.<format>)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the phonemes espeak-ng produces for a text
    Phonemize {
        text: String,

        /// Phonemizer language (defaults to `default_lang` from the configuration)
        #[arg(long)]
        lang: Option<String>,
    },

    /// Print the chunk plan for a text as JSON
    Chunks {
        text: String,

        /// Phonemizer language (defaults to `default_lang` from the configuration)
        #[arg(long)]
        lang: Option<String>,

        /// Token budget per chunk (defaults to the model context window minus padding)
        #[arg(long)]
        tokens_per_chunk: Option<usize>,
    },

    /// Validate a voice formula and print its normalized form
    Formula { formula: String },

    /// List available voices
    Voices {
        /// Only voices for this language
        #[arg(long)]
        lang: Option<String>,
    },

    /// List phonemizer languages
    Langs,

    /// List model variants
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Speak { text, file, voice, lang, model, speed, format, gpu, output } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("Provide the text with --text or --file"),
            };
            let options = SpeakOptions { voice, lang, model, speed, format, gpu, output };
            speak(config, text, options).await?;
        }
        Commands::Phonemize { text, lang } => {
            let lang = lang.unwrap_or_else(|| config.default_lang.clone());
            let phonemizer = EspeakPhonemizer::new(&config.espeak_path);
            println!("{}", phonemizer.phonemize(&text, &lang).await?);
        }
        Commands::Chunks { text, lang, tokens_per_chunk } => {
            let lang = lang.unwrap_or_else(|| config.default_lang.clone());
            let chunker = TextChunker::new(
                Arc::new(EspeakPhonemizer::new(&config.espeak_path)),
                Arc::new(load_tokenizer(&config)?),
            );
            let budget = tokens_per_chunk.unwrap_or_else(|| config.tokens_per_chunk());
            let chunks = chunker.chunk(&text, &lang, budget).await?;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        }
        Commands::Formula { formula } => {
            let voices = parse_voice_formula(&formula)?;
            for voice in &voices {
                if resources::find_voice(&voice.voice_id).is_none() {
                    println!("⚠️  Unknown voice '{}'", voice.voice_id);
                }
            }
            println!("{}", serialize_voice_formula(&voices));
        }
        Commands::Voices { lang } => list_voices(lang.as_deref()),
        Commands::Langs => {
            for lang in resources::LANGS {
                println!("{:<8} {}", lang.id, lang.name);
            }
        }
        Commands::Models => {
            for model in resources::MODELS {
                println!("{:<16} {:<12} {}", model.id, model.quantization, model.size);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SpeechConfig> {
    let mut config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SpeechConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => SpeechConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn load_tokenizer(config: &SpeechConfig) -> anyhow::Result<VocabTokenizer> {
    let path = config
        .tokens_path
        .as_ref()
        .context("No phoneme vocabulary configured (set tokens_path or KOKORO_TOKENS)")?;
    Ok(VocabTokenizer::from_file(path)?)
}

fn list_voices(lang: Option<&str>) {
    let voices: Vec<_> = match lang {
        Some(lang) => resources::voices_for_lang(lang).collect(),
        None => resources::VOICES.iter().collect(),
    };

    if voices.is_empty() {
        println!("No voices found");
        return;
    }

    println!("{:<14} {:<12} {:<8} {:<7} {:<8} {}", "ID", "NAME", "LANG", "GENDER", "QUALITY", "GRADE");
    for voice in voices {
        let gender = match voice.gender {
            Gender::Male => "male",
            Gender::Female => "female",
        };
        println!(
            "{:<14} {:<12} {:<8} {:<7} {:<8} {}",
            voice.id, voice.name, voice.lang, gender, voice.target_quality, voice.overall_grade
        );
    }
}

#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
struct SpeakOptions {
    voice: Option<String>,
    lang: Option<String>,
    model: Option<String>,
    speed: f64,
    format: String,
    gpu: bool,
    output: Option<PathBuf>,
}

#[cfg(feature = "onnx")]
async fn speak(config: SpeechConfig, text: String, options: SpeakOptions) -> anyhow::Result<()> {
    use kokoro_spk::engines::ffmpeg::FfmpegAudio;
    use kokoro_spk::engines::onnx::OnnxInferenceEngine;
    use kokoro_spk::{Acceleration, AssetStore, Backends, OutputFormat, SynthesisRequest, Synthesizer};

    let format: OutputFormat = options.format.parse()?;
    let voice = options.voice.unwrap_or_else(|| config.default_voice.clone());
    let lang = options.lang.unwrap_or_else(|| config.lang_for_voice(&voice));
    let mut request = SynthesisRequest::new(text, voice)
        .with_lang(lang)
        .with_model(options.model.unwrap_or_else(|| config.default_model.clone()))
        .with_speed(options.speed)
        .with_format(format);
    if options.gpu {
        request = request.with_acceleration(Acceleration::Gpu);
    }
    request.validate()?;

    let assets = Arc::new(AssetStore::new(config.assets.clone())?);
    info!("Loading model {}", request.model);
    let model = assets.fetch_model(&request.model).await?;
    let ffmpeg = Arc::new(FfmpegAudio::new(&config.ffmpeg_path));

    let backends = Backends {
        phonemizer: Arc::new(EspeakPhonemizer::new(&config.espeak_path)),
        tokenizer: Arc::new(load_tokenizer(&config)?),
        voices: assets,
        engine: Arc::new(OnnxInferenceEngine::from_memory(&model)?),
        filter: ffmpeg.clone(),
        encoder: ffmpeg,
    };
    let synthesizer = Synthesizer::new(config, backends)?;

    let audio = synthesizer.generate(&request).await?;
    let output = options
        .output
        .unwrap_or_else(|| PathBuf::from(format!("speech.{}", audio.format.extension())));
    std::fs::write(&output, &audio.bytes).with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✅ Wrote {} bytes of {} to {}", audio.bytes.len(), audio.mime_type, output.display());
    Ok(())
}

#[cfg(not(feature = "onnx"))]
async fn speak(_config: SpeechConfig, _text: String, _options: SpeakOptions) -> anyhow::Result<()> {
    bail!("kokoro was built without an inference backend; rebuild with `--features onnx`")
}
