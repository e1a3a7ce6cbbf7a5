//! SyncRec - Main Entry Point
//!
//! Records a synchronized IMU + camera session from simulated devices, or
//! replays a saved recording at its original speed.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use syncrec_rs::{
    backend::{MockDataPattern, MockDeviceProvider},
    config::AppConfig,
    session::{default_recording_path, AcquisitionSession, PlaybackClock, PlaybackRenderer, Recording},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Synchronized IMU + camera recorder
#[derive(Parser, Debug)]
#[command(name = "syncrec", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a session from simulated devices
    Record(RecordArgs),

    /// Replay a saved recording in real time
    Play(PlayArgs),

    /// Write the default configuration file
    InitConfig {
        /// Destination (defaults to the app data directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Recording length in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Task name used in the file name and metadata
    #[arg(short, long)]
    task: Option<String>,

    /// Output file (defaults to `<data dir>/<task>_<timestamp>.json`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// IMU sampling rate in Hz
    #[arg(long)]
    imu_hz: Option<f64>,

    /// Camera rate in Hz
    #[arg(long)]
    camera_hz: Option<f64>,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Recording file to replay
    file: PathBuf,

    /// Display refresh rate in Hz
    #[arg(long)]
    display_hz: Option<f64>,

    /// Start at this frame index
    #[arg(long, default_value = "0")]
    start: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::load_or_default(AppConfig::default_path()),
    };

    match cli.command {
        Commands::Record(args) => record(&config, args),
        Commands::Play(args) => play(&config, args),
        Commands::InitConfig { path, force } => {
            let path = path
                .or_else(AppConfig::default_path)
                .context("Could not determine app data directory")?;
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            AppConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

/// Console logging plus an optional non-blocking file layer
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,syncrec_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn record(config: &AppConfig, args: RecordArgs) -> Result<()> {
    let mut acquisition = config.acquisition.clone();
    if let Some(hz) = args.imu_hz {
        acquisition.imu_frequency_hz = hz;
    }
    if let Some(hz) = args.camera_hz {
        acquisition.camera_frequency_hz = hz;
    }
    let duration = match args.duration {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
        Some(secs) => bail!("Invalid duration {}", secs),
        None => acquisition.duration(),
    };
    let task = args.task.unwrap_or_else(|| config.output.task_name.clone());

    tracing::info!("Starting SyncRec recording '{}' for {:?}", task, duration);

    let provider = MockDeviceProvider::new().with_imu_pattern(MockDataPattern::Sine {
        frequency: 1.0,
        amplitude: 9.81,
        offset: 0.0,
    });
    let session = AcquisitionSession::new(Box::new(provider)).with_task_name(task.clone());
    session
        .start(duration, &acquisition)
        .context("Failed to start recording")?;

    let outcome = session.wait_for_completion();
    let Some(recording) = session.take_recording() else {
        return Err(match outcome {
            Err(e) => anyhow::Error::from(e).context("Recording failed"),
            Ok(()) => anyhow::anyhow!("Session produced no recording"),
        });
    };

    let path = match args.output {
        Some(path) => path,
        None => default_recording_path(&config.output.resolve_dir()?, &task),
    };
    recording
        .save_to_file(&path)
        .with_context(|| format!("Failed to save recording to {}", path.display()))?;

    let meta = &recording.metadata;
    println!(
        "Saved {}: {} samples ({:.1} Hz), {} frames ({:.1} Hz) over {:.2}s",
        path.display(),
        meta.sample_count(),
        meta.imu.achieved_frequency,
        meta.frame_count(),
        meta.camera.achieved_frequency,
        meta.duration.as_secs_f64()
    );

    outcome.context("Recording finished with errors")
}

/// Logs frame changes and the matching IMU sample
struct LogRenderer {
    recording: Arc<Recording>,
    frames_shown: usize,
    done_tx: Sender<usize>,
}

impl PlaybackRenderer for LogRenderer {
    fn on_frame(&mut self, index: usize) {
        self.frames_shown += 1;
        let Some(frame) = self.recording.video.get(index) else {
            return;
        };
        let imu_index = self.recording.imu_index_at(frame.timestamp);
        let imu_values = imu_index
            .and_then(|i| self.recording.imu.get(i))
            .map(|s| s.values.clone())
            .unwrap_or_default();
        tracing::debug!(
            "frame {} at {:.3}s, imu {:?} {:?}",
            index,
            frame.timestamp.as_secs_f64(),
            imu_index,
            imu_values
        );
    }

    fn on_finished(&mut self) {
        let _ = self.done_tx.try_send(self.frames_shown);
    }
}

fn play(config: &AppConfig, args: PlayArgs) -> Result<()> {
    let recording = Recording::load_from_file(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    let mut playback = config.playback.clone();
    if let Some(hz) = args.display_hz {
        playback.display_hz = hz;
    }

    let recording = Arc::new(recording);
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let renderer = LogRenderer {
        recording: Arc::clone(&recording),
        frames_shown: 0,
        done_tx,
    };
    let clock = PlaybackClock::for_stream(&recording.video, &playback, Box::new(renderer))
        .context("Recording has no frames to play")?;

    tracing::info!(
        "Playing '{}': {} frames over {:.2}s",
        recording.metadata.name,
        clock.len(),
        recording.video.end_time().as_secs_f64()
    );
    clock.seek(args.start);
    clock.play()?;

    let shown = done_rx
        .recv()
        .context("Playback ended without finishing")?;
    println!(
        "Played {} of {} frames, finished at index {}",
        shown,
        clock.len(),
        clock.current_index()
    );
    Ok(())
}
