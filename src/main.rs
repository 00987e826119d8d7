use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voxloop::assistant::{Collaborators, LoopSettings};
use voxloop::commands::{CommandDispatcher, DryRun, OsActions, SystemLauncher, Utterance};
use voxloop::voice::{
    CpalSink, HttpSpeechSource, HttpSynthesizer, PlaybackController, Synthesizer,
};
use voxloop::{Config, ControlSurface, CpalMicrophones, VoiceId};

/// voxloop - voice command loop
#[derive(Parser)]
#[command(name = "voxloop", version, about)]
struct Cli {
    /// Input device index
    #[arg(short, long, env = "VOXLOOP_MIC")]
    mic: Option<usize>,

    /// Voice to speak with (xenia, baya, kseniya, aidar, eugene, random)
    #[arg(long, env = "VOXLOOP_VOICE")]
    voice: Option<String>,

    /// Volume percentage, 0-100
    #[arg(long, env = "VOXLOOP_VOLUME")]
    volume: Option<u8>,

    /// Start listening right away
    #[arg(long)]
    start: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize and play a sentence once
    Say {
        /// Text to speak
        text: String,
    },
    /// Test speaker output
    TestSpeaker,
    /// Show how a phrase would be answered, without audio
    Ask {
        /// Recognized text
        text: String,
    },
}

// Blocking HTTP clients must not be created or dropped inside the async
// runtime, so main stays synchronous and only the console runs on tokio.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voxloop=info",
        1 => "info,voxloop=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::Ask { text }) = &cli.command {
        ask(text);
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Some(voice) = &cli.voice {
        config.voice.speaker = voice.parse::<VoiceId>()?;
    }
    if let Some(volume) = cli.volume {
        anyhow::ensure!(volume <= 100, "volume must be 0-100, got {volume}");
        config.voice.volume = volume;
    }
    if cli.mic.is_some() {
        config.listen.microphone = cli.mic;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::Say { text }) => say(&config, &text),
        Some(Command::TestSpeaker) => test_speaker(&config),
        Some(Command::Ask { .. }) | None => run_console(config, cli.start),
    }
}

fn run_console(config: Config, autostart: bool) -> anyhow::Result<()> {
    let api_key = config.stt.api_key.clone().with_context(|| {
        format!(
            "no API key for {:?} speech recognition (set OPENAI_API_KEY or DEEPGRAM_API_KEY)",
            config.stt.provider
        )
    })?;
    let speech = HttpSpeechSource::new(config.stt.provider, api_key, config.stt.model.clone())?;

    let collaborators = Collaborators {
        speech: Arc::new(speech),
        synthesizer: Arc::new(synthesizer(&config)?),
        playback: Arc::new(playback(&config)?),
        actions: actions(&config),
        dispatcher: CommandDispatcher::default(),
    };
    let settings = LoopSettings {
        language: config.listen.language.clone(),
        limits: config.listen.limits,
        ..LoopSettings::default()
    };

    let mut surface = ControlSurface::new(
        collaborators,
        settings,
        config.voice.profile(),
        Box::new(CpalMicrophones),
    );
    if let Some(index) = config.listen.microphone {
        surface.set_microphone(index);
    }
    if autostart {
        surface.start();
    }

    tracing::info!(
        voice = %config.voice.speaker,
        volume = config.voice.volume,
        microphone = ?config.listen.microphone,
        "voxloop ready"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    let result = runtime.block_on(voxloop::console::run(&mut surface));
    // Stdin reads can hold a blocking thread indefinitely
    runtime.shutdown_background();

    surface.shutdown();
    result?;
    Ok(())
}

fn synthesizer(config: &Config) -> anyhow::Result<HttpSynthesizer> {
    Ok(HttpSynthesizer::new(
        &config.tts.base_url,
        config.tts.api_key.clone(),
        config.tts.model.clone(),
        config.tts.voices.clone(),
    )?)
}

fn playback(config: &Config) -> anyhow::Result<PlaybackController> {
    let sink = CpalSink::new()?;
    Ok(PlaybackController::new(Box::new(sink), config.voice.block_size))
}

fn actions(config: &Config) -> Arc<dyn OsActions> {
    if config.actions.dry_run {
        Arc::new(DryRun)
    } else {
        Arc::new(SystemLauncher::new(
            config.actions.browser_url.clone(),
            config.actions.editor.clone(),
        ))
    }
}

/// Dispatch `text` and print the decision
fn ask(text: &str) {
    let decision = CommandDispatcher::default().dispatch(&Utterance::new(text));

    println!("response: {}", decision.response);
    println!("rule:     {}", decision.rule.unwrap_or("(none)"));
    println!("continue: {}", decision.continue_loop);
    if let Some(action) = decision.os_action {
        println!("action:   {action}");
    }
}

/// Synthesize `text` with the configured voice and play it
fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let profile = config.voice.profile();
    let samples = synthesizer(config)?
        .synthesize(text, profile.speaker.as_str(), profile.sample_rate)?;

    let outcome = playback(config)?.play(&samples, profile.sample_rate, profile.volume)?;
    tracing::info!(blocks = outcome.blocks(), "spoken");
    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = config.voice.sample_rate;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let volume = config.voice.profile().volume;
    let outcome = playback(config)?.play(&samples, sample_rate, volume)?;

    println!("\n---");
    println!("Played {} blocks.", outcome.blocks());
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
