use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use parley::handlers::VoiceSpeaker;
use parley::voice::{AudioCapture, AudioPlayback, TextToSpeech, rms};
use parley::{Config, Daemon, Speak};

/// Parley - talk to a language model, one turn at a time
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/parley/config.toml)
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Type instead of speaking
    #[arg(long)]
    text: bool,

    /// Spoken before the first listen; pass "" to skip
    #[arg(long)]
    greeting: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .compact()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(cli.config, &text).await,
        };
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.text {
        config.system.text_mode = true;
    }
    if let Some(greeting) = cli.greeting {
        config.system.greeting = Some(greeting).filter(|g| !g.trim().is_empty());
    }
    tracing::debug!(?config, "loaded configuration");

    if let Some(phrase) = config.wake.phrases.first() {
        tracing::info!("parley ready - say \"{phrase}\"");
    } else {
        tracing::info!("parley ready");
    }

    Daemon::new(config)?.run().await?;
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::open()?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_samples();
        let level = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (level * 100.0).min(50.0) as usize;
        let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {level:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    capture.stop();

    println!("\n---");
    println!("If the meter moved while you spoke, your mic is working.");
    println!("If RMS stayed near 0, check the default input device and its levels.");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    const RATE: u32 = 24000;

    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..RATE * 2)
        .map(|i| {
            let t = i as f32 / RATE as f32;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {RATE} Hz...", samples.len());

    tokio::task::spawn_blocking(move || {
        AudioPlayback::open(RATE)?.play(samples, &AtomicBool::new(false))
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working.");

    Ok(())
}

/// Test TTS output end to end
async fn test_tts(config_path: Option<PathBuf>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path.as_deref())?;
    let tts = TextToSpeech::from_config(&config.speech, &config.api_keys)?;

    println!("Synthesizing and playing...");
    VoiceSpeaker::new(tts)
        .speak(text, &CancellationToken::new())
        .await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working.");

    Ok(())
}
