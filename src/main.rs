use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use azure_speech_stream::core::tts::azure::ssml::looks_like_ssml;
use azure_speech_stream::core::tts::azure::{AzureTTS, SsmlBuilder};
use azure_speech_stream::utils::ensure_crypto_provider;
use azure_speech_stream::{AudioSink, AzureAudioFormat, ClientConfig};

/// azure-tts - Stream speech from the Azure speech service
#[derive(Parser, Debug)]
#[command(name = "azure-tts")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize text or SSML into an audio file
    Speak {
        #[command(flatten)]
        input: SynthesisArgs,

        /// Output file (defaults to output.<ext> for the chosen format)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Stream synthesized audio chunks to a file or stdout as they arrive
    Stream {
        #[command(flatten)]
        input: SynthesisArgs,

        /// Output file (writes to stdout if not specified)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// List available voices
    Voices {
        /// Only show voices whose locale starts with this prefix (e.g. "en" or "en-GB")
        #[arg(short = 'l', long = "locale")]
        locale: Option<String>,

        /// Print the raw JSON returned by the service
        #[arg(long = "raw")]
        raw: bool,
    },
}

#[derive(Args, Debug)]
struct SynthesisArgs {
    /// Text to speak; an argument starting with "<speak" is sent as SSML
    #[arg(conflicts_with = "ssml_file")]
    text: Option<String>,

    /// Read a complete SSML document from this file
    #[arg(long = "ssml-file", value_name = "FILE")]
    ssml_file: Option<PathBuf>,

    /// Voice short name (overrides config)
    #[arg(short = 'v', long = "voice")]
    voice: Option<String>,

    /// Output format (overrides config)
    #[arg(short = 'f', long = "format")]
    format: Option<String>,

    /// Speaking rate, e.g. "+20%"
    #[arg(long = "rate")]
    rate: Option<String>,

    /// Pitch, e.g. "-5%"
    #[arg(long = "pitch")]
    pitch: Option<String>,

    /// Speaking style, e.g. "cheerful"
    #[arg(long = "style")]
    style: Option<String>,
}

impl SynthesisArgs {
    fn ssml(&self, config: &ClientConfig) -> anyhow::Result<String> {
        if let Some(path) = &self.ssml_file {
            return fs::read_to_string(path)
                .with_context(|| format!("Failed to read SSML file {}", path.display()));
        }

        let text = self
            .text
            .as_deref()
            .ok_or_else(|| anyhow!("Provide text to speak or --ssml-file"))?;
        if looks_like_ssml(text) {
            return Ok(text.to_string());
        }

        let mut builder = SsmlBuilder::new(self.voice.as_deref().unwrap_or(&config.voice));
        if let Some(rate) = &self.rate {
            builder = builder.rate(rate);
        }
        if let Some(pitch) = &self.pitch {
            builder = builder.pitch(pitch);
        }
        if let Some(style) = &self.style {
            builder = builder.style(style);
        }
        Ok(builder.build(text))
    }

    fn format<'a>(&'a self, config: &'a ClientConfig) -> &'a str {
        self.format.as_deref().unwrap_or(&config.output_format)
    }
}

/// Sink writing every chunk straight to a writer.
///
/// The first I/O error is kept and cancels the synthesis, since nothing after
/// it can be written anyway.
struct WriterSink<W: Write + Send> {
    writer: W,
    written: usize,
    error: Option<io::Error>,
    cancel: CancellationToken,
}

impl<W: Write + Send> AudioSink for WriterSink<W> {
    fn on_audio(&mut self, chunk: Bytes) {
        if self.error.is_some() {
            return;
        }
        match self.writer.write_all(&chunk).and_then(|_| self.writer.flush()) {
            Ok(()) => self.written += chunk.len(),
            Err(e) => {
                warn!("Failed to write audio, cancelling synthesis: {}", e);
                self.error = Some(e);
                self.cancel.cancel();
            }
        }
    }
}

/// Cancel the token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling synthesis");
            token.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    // Initialize crypto provider for TLS connections
    ensure_crypto_provider();

    // Parse CLI arguments
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::from_env().context("Failed to load config from environment")?,
    };

    match cli.command {
        Commands::Speak { input, output } => {
            let ssml = input.ssml(&config)?;
            let format = input.format(&config);
            let output = output.unwrap_or_else(|| {
                let ext = format
                    .parse::<AzureAudioFormat>()
                    .map(|f| f.file_extension())
                    .unwrap_or("bin");
                PathBuf::from(format!("output.{ext}"))
            });

            let tts = AzureTTS::new(config.tts_config())?;
            let cancel = cancel_on_ctrl_c();
            let result = tts.get_audio_with_cancel(&ssml, format, &cancel).await;
            tts.close().await;

            let audio = result.context("Synthesis failed")?;
            fs::write(&output, &audio)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote {} bytes to {}", audio.len(), output.display());
        }
        Commands::Stream { input, output } => {
            let ssml = input.ssml(&config)?;
            let format = input.format(&config);

            let writer: Box<dyn Write + Send> = match &output {
                Some(path) => Box::new(
                    fs::File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?,
                ),
                None => Box::new(io::stdout()),
            };
            let cancel = cancel_on_ctrl_c();
            let mut sink = WriterSink {
                writer,
                written: 0,
                error: None,
                cancel: cancel.clone(),
            };

            let tts = AzureTTS::new(config.tts_config())?;
            let result = tts
                .get_audio_stream_with_cancel(&ssml, format, |chunk: Bytes| sink.on_audio(chunk), &cancel)
                .await;
            tts.close().await;

            // A write failure cancels the call, so report it ahead of the Cancelled result
            if let Some(e) = sink.error {
                return Err(anyhow!("Failed to write audio: {e}"));
            }
            result.context("Synthesis failed")?;
            info!("Streamed {} bytes", sink.written);
        }
        Commands::Voices { locale, raw } => {
            let tts = AzureTTS::new(config.tts_config())?;

            if raw {
                let body = tts.get_voices().await?;
                io::stdout().write_all(&body)?;
                println!();
                return Ok(());
            }

            let voices = tts.list_voices().await?;
            let prefix = locale.unwrap_or_default().to_ascii_lowercase();
            for voice in voices
                .iter()
                .filter(|v| v.locale.to_ascii_lowercase().starts_with(&prefix))
            {
                println!(
                    "{:<40} {:<8} {:<8} {}",
                    voice.short_name, voice.locale, voice.gender, voice.local_name
                );
            }
        }
    }

    Ok(())
}
