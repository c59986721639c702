use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lumina_live::{
    AudioFrame, CAPTURE_SAMPLE_RATE, CaptureSource, LiveConfig, LiveSession, MicCapture,
    OutputSink, PLAYBACK_SAMPLE_RATE, PlaybackScheduler, SessionStats, SpeakerOutput, SpeakerRole,
    TranscriptTurn,
};

/// Lumina - live voice conversation with your assistant
#[derive(Parser)]
#[command(name = "lumina", version, about)]
struct Cli {
    /// Path to a config file (defaults to ~/.config/lumina/config.toml)
    #[arg(short, long, env = "LUMINA_CONFIG")]
    config: Option<PathBuf>,

    /// Conversation model identifier
    #[arg(short, long, env = "LUMINA_MODEL")]
    model: Option<String>,

    /// Prebuilt voice for model speech (e.g. "Zephyr")
    #[arg(long, env = "LUMINA_VOICE")]
    voice: Option<String>,

    /// Live API endpoint override
    #[arg(long, env = "LUMINA_ENDPOINT")]
    endpoint: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lumina_live=info",
        1 => "info,lumina_live=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    let mut config = LiveConfig::load(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(voice) = cli.voice {
        config.voice = voice;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    if config.api_key.is_none() {
        anyhow::bail!(
            "no API key configured; set LUMINA_API_KEY or add api_key to the config file"
        );
    }

    tracing::info!(model = %config.model, voice = %config.voice, "starting live conversation");

    let mut session = LiveSession::new(config)?;
    let controller = session.controller();
    session.start().await?;

    println!("Session open - speak normally, press Ctrl-C to hang up.\n");

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nHanging up...");
            controller.stop();
        }
    });

    let outcome = session.run().await;

    print_transcript(&session.transcript());
    print_stats(&session.stats());

    outcome?;
    Ok(())
}

fn print_transcript(turns: &[TranscriptTurn]) {
    if turns.is_empty() {
        return;
    }
    println!("\n--- Conversation ---");
    for turn in turns {
        let speaker = match turn.role {
            SpeakerRole::User => "You",
            SpeakerRole::Model => "Lumina",
        };
        println!("{speaker}: {}", turn.text.trim());
    }
}

fn print_stats(stats: &SessionStats) {
    let elapsed = stats.elapsed();
    println!("\n--- Session ---");
    println!(
        "Duration:           {}m {}s",
        elapsed.num_minutes(),
        elapsed.num_seconds() % 60
    );
    println!("Frames sent:        {}", stats.frames_sent);
    println!("Audio chunks:       {}", stats.audio_deltas);
    println!("Transcript pieces:  {}", stats.transcript_deltas);
    println!("Interruptions:      {}", stats.interruptions);
    if stats.malformed_payloads > 0 {
        println!("Malformed payloads: {}", stats.malformed_payloads);
    }
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = MicCapture::new()?;
    let window = Arc::new(Mutex::new(Vec::<f32>::new()));
    let sink_window = Arc::clone(&window);
    capture.start(Box::new(move |frame: AudioFrame| {
        if let Ok(mut buf) = sink_window.lock() {
            buf.extend_from_slice(&frame.samples);
        }
    }))?;

    println!("Sample rate: {CAPTURE_SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = window
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let scheduler = Arc::new(PlaybackScheduler::new(PLAYBACK_SAMPLE_RATE));
    let mut output = SpeakerOutput::new()?;
    output.start(Arc::clone(&scheduler))?;

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {num_samples} samples at {PLAYBACK_SAMPLE_RATE} Hz...");
    scheduler.schedule(samples);

    while scheduler.active_count() > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // let the device drain its last buffer
    tokio::time::sleep(Duration::from_millis(200)).await;
    output.stop();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
