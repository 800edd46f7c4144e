use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use waav_live::{
    Console, ConsoleDevices, LiveConfig, TranscriptUpdate,
    core::audio::{AudioOutput, MicrophoneSource, WavMicrophone, WavRecorder},
    core::session::OUTPUT_SAMPLE_RATE,
    core::video::{FrameSource, StillImageSource},
};

/// WaaV Live - Real-time conversational session engine
#[derive(Parser, Debug)]
#[command(name = "waav-live")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `run`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hold a live conversation
    Run(RunArgs),

    /// Print the rendered system instruction
    Prompt {
        /// Render the camera-off variant
        #[arg(long)]
        camera_off: bool,
    },

    /// Print the enabled tool declarations as JSON
    Tools,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Replay a WAV file as the microphone
    #[arg(long, value_name = "FILE")]
    mic_wav: Option<PathBuf>,

    /// Record agent audio to a WAV file instead of the speaker
    #[arg(long, value_name = "FILE")]
    record: Option<PathBuf>,

    /// Image file served as camera frames
    #[arg(long, value_name = "FILE")]
    camera_image: Option<PathBuf>,

    /// Send a text turn once the session is open
    #[arg(long, value_name = "TEXT")]
    say: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    let config = LiveConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Prompt { camera_off } => {
            println!("{}", config.system_instruction(!camera_off)?);
            Ok(())
        }
        Commands::Tools => {
            let declarations = config.tool_registry().enabled_declarations();
            println!("{}", serde_json::to_string_pretty(&declarations)?);
            Ok(())
        }
        Commands::Run(args) => run(config, args).await,
    }
}

async fn run(config: LiveConfig, args: RunArgs) -> anyhow::Result<()> {
    config.validate()?;

    let microphone: Option<Arc<dyn MicrophoneSource>> = match &args.mic_wav {
        Some(path) => Some(Arc::new(WavMicrophone::new(path))),
        None => default_microphone(),
    };
    if microphone.is_none() {
        tracing::warn!("No microphone configured; the agent will not hear you");
    }

    let recorder = match &args.record {
        Some(path) => Some(Arc::new(
            WavRecorder::create(path, OUTPUT_SAMPLE_RATE)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => None,
    };
    let speaker: Arc<dyn AudioOutput> = match &recorder {
        Some(recorder) => recorder.clone(),
        None => default_speaker()?,
    };

    let camera: Option<Arc<dyn FrameSource>> = args
        .camera_image
        .clone()
        .or_else(|| config.camera.image_path.clone())
        .map(|path| Arc::new(StillImageSource::new(path)) as Arc<dyn FrameSource>);

    let console = Console::spawn(
        config,
        ConsoleDevices {
            microphone,
            speaker,
            camera,
        },
    );
    let mut updates = console.subscribe_transcript();
    let mut connected = console.signals().connected.clone();
    connected.mark_unchanged();

    console.connect().await?;
    info!("Session open, press Ctrl-C to end");

    if let Some(text) = args.say {
        console.send_text(text);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing session");
                break;
            }
            update = updates.recv() => match update {
                Ok(TranscriptUpdate::Appended { turn, .. } | TranscriptUpdate::Updated { turn, .. })
                    if turn.is_final =>
                {
                    println!("[{}] {}", turn.role, turn.text);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Transcript output fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            changed = connected.changed() => {
                if changed.is_err() || !*connected.borrow_and_update() {
                    info!("Session closed");
                    break;
                }
            }
        }
    }

    let elapsed = *console.signals().elapsed_seconds.borrow();
    console.shutdown().await;

    if let Some(recorder) = recorder {
        recorder.finalize()?;
        info!(
            path = %recorder.path().display(),
            samples = recorder.samples_written(),
            "Agent audio saved"
        );
    }
    info!(elapsed_seconds = elapsed, "Conversation finished");
    Ok(())
}

#[cfg(feature = "device-audio")]
fn default_microphone() -> Option<Arc<dyn MicrophoneSource>> {
    Some(Arc::new(waav_live::core::audio::CpalMicrophone))
}

#[cfg(not(feature = "device-audio"))]
fn default_microphone() -> Option<Arc<dyn MicrophoneSource>> {
    None
}

#[cfg(feature = "device-audio")]
fn default_speaker() -> anyhow::Result<Arc<dyn AudioOutput>> {
    Ok(Arc::new(waav_live::core::audio::CpalSpeaker::open()?))
}

#[cfg(not(feature = "device-audio"))]
fn default_speaker() -> anyhow::Result<Arc<dyn AudioOutput>> {
    tracing::warn!("Built without `device-audio`; agent audio is discarded (use --record)");
    Ok(Arc::new(waav_live::core::audio::NullOutput))
}
