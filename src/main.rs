use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use voice_display::config::Config;
use voice_display::display::{
    Capabilities, Display, DisplaySession, DisplayTiming, I2cProbe, ScrollLine, ScrollSpan,
    SelectionParams, SystemdServices, probe_capabilities, select_backend,
};
use voice_display::engine::{VoiceEngine, shutdown_signal};
use voice_display::voice::{
    AudioCapture, FrameSource, SilencePolicy, SilenceTracker, WakeWordDetector, frame_queue,
    open_recognizer,
};
use voice_display::{find_matching_command, logging};

/// Voice Display - wake-word voice commands for small status displays
#[derive(Parser)]
#[command(name = "voice-display", version, about)]
struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, env = "VOICE_DISPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for wake words and run commands (default)
    Run,
    /// Test microphone input and silence detection
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Show text on the selected display
    TestDisplay {
        /// Text to show
        #[arg(default_value = "Hello from voice-display!")]
        text: String,
    },
    /// Validate the configuration and print the command table
    CheckConfig,
    /// Show which command a transcript would run
    Match {
        /// Transcript to match, e.g. "pi what time is it"
        transcript: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    let _log_guard = match logging::init(&config, cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("logging unavailable: {e}");
            None
        }
    };

    match run(cli.command.unwrap_or(Command::Run), config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::Run => run_engine(config).await,
        Command::TestMic { duration } => test_mic(&config, duration).await,
        Command::TestDisplay { text } => {
            test_display(&config, &text).await;
            Ok(())
        }
        Command::CheckConfig => {
            check_config(&config);
            Ok(())
        }
        Command::Match { transcript } => {
            match_transcript(&config, &transcript);
            Ok(())
        }
    }
}

/// Select the display backend and wrap it in the facade
fn open_display(config: &Config, capabilities: &Capabilities) -> (Display, DisplaySession) {
    let mut probe = I2cProbe::from_config(config);
    let outcome = select_backend(
        &mut probe,
        Box::new(SystemdServices),
        capabilities,
        &SelectionParams::from_config(config),
    );
    tracing::info!(mode = %outcome.mode(), states = ?outcome.states, "display selected");

    let display = Display::new(outcome.backend, DisplayTiming::from(&config.display));
    (display, outcome.session)
}

#[allow(clippy::future_not_send)]
async fn run_engine(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        source = ?config.source,
        commands = config.commands.len(),
        "starting voice display"
    );

    let capabilities = probe_capabilities(&config);
    let (display, session) = open_display(&config, &capabilities);

    let recognizer = if capabilities.speech {
        match open_recognizer(config.voice.model_path.as_deref(), config.hardware.sample_rate) {
            Ok(recognizer) => Some(recognizer),
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition disabled");
                None
            }
        }
    } else {
        tracing::warn!(model = ?config.voice.model_path, "speech recognition not available");
        None
    };

    let mut engine = VoiceEngine::new(&config, display, session, recognizer);

    if engine.speech_enabled() {
        let mut capture = AudioCapture::open(
            config.hardware.sample_rate,
            config.hardware.chunk_size,
            config.hardware.queue_frames,
        )?;

        let wake_word = config.voice.wake_words.first().map_or("", String::as_str);
        tracing::info!("voice display ready - say \"{wake_word}\"");

        engine.run(&mut capture, shutdown_signal()).await?;
        tracing::info!(dropped_frames = capture.dropped_frames(), "audio capture stopped");
    } else {
        tracing::info!("voice display ready (display-only mode)");
        let (_assembler, mut frames) = frame_queue(config.hardware.chunk_size, 1);
        engine.run(&mut frames, shutdown_signal()).await?;
    }

    Ok(())
}

/// Print loudness and silence classification once per second
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::open(
        config.hardware.sample_rate,
        config.hardware.chunk_size,
        config.hardware.queue_frames,
    )?;
    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("Silence threshold: {:.4}", config.voice.silence_threshold);
    println!("---");

    let mut tracker = SilenceTracker::new(SilencePolicy::from(&config.voice), Instant::now());

    for second in 1..=duration {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut frames = 0_u32;
        let mut silent = 0_u32;
        let mut resets = 0_u32;
        let mut peak = 0.0_f32;

        while let Ok(frame) = tokio::time::timeout_at(deadline, capture.read_frame()).await {
            let Some(frame) = frame? else {
                anyhow::bail!("audio stream ended");
            };
            let classification = tracker.classify(&frame);
            frames += 1;
            silent += u32::from(classification.is_silence);
            resets += u32::from(classification.should_reset());
            peak = peak.max(classification.loudness);
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (peak * 500.0).min(50.0) as usize;
        let meter = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{second:2}s] peak: {peak:.4} | silent {silent}/{frames} | resets {resets} | [{meter}]"
        );
    }

    println!("\n---");
    println!("Dropped frames: {}", capture.dropped_frames());
    println!("If the peak stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try: alsamixer (to check capture levels)");

    Ok(())
}

#[allow(clippy::future_not_send)]
async fn test_display(config: &Config, text: &str) {
    let capabilities = probe_capabilities(config);
    let (mut display, mut session) = open_display(config, &capabilities);
    println!("Display mode: {}", display.mode());

    if text.chars().count() <= display.width() {
        display
            .show_for("Display test", text, config.display.command_result_time)
            .await;
    } else {
        display
            .scroll(
                "Display test",
                text,
                ScrollLine::Second,
                ScrollSpan::Cycles(config.display.heard_text_cycles),
            )
            .await;
    }

    display.clear();
    session.restore();
}

fn check_config(config: &Config) {
    match &config.source {
        Some(path) => println!("Config: {}", path.display()),
        None => println!("Config: defaults"),
    }

    if config.warnings.is_empty() {
        println!("No warnings");
    } else {
        println!("Warnings:");
        for warning in &config.warnings {
            println!("  - {warning}");
        }
    }

    println!("\nWake words: {}", config.voice.wake_words.join(", "));
    match &config.voice.model_path {
        Some(path) if path.exists() => println!("Speech model: {}", path.display()),
        Some(path) => println!("Speech model: {} (missing)", path.display()),
        None => println!("Speech model: not configured"),
    }

    println!("\nCommands ({}):", config.commands.len());
    for command in config.commands.iter() {
        let phrases: Vec<&str> = command.phrases().collect();
        println!(
            "  {:<16} {:<15} {}",
            command.name,
            command.action.tag(),
            phrases.join(" | ")
        );
    }
}

fn match_transcript(config: &Config, transcript: &str) {
    let detector = WakeWordDetector::new(config.voice.wake_words.clone());

    match detector.detect(transcript) {
        Some(wake_word) => println!("Wake word: {wake_word}"),
        None => {
            println!("No wake word; the transcript would only be displayed");
            return;
        }
    }

    match find_matching_command(transcript, &config.commands) {
        Some(command) => println!("Command: {} ({})", command.name, command.action.tag()),
        None => println!("No command matched; an error response would be shown"),
    }
}
