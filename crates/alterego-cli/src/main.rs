mod config;
mod driver;
mod engine;
mod modes;
mod preview;
mod stages;
mod stop;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use config::Config;
use std::path::PathBuf;
use std::time::Duration;
use stop::StopSignal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alterego", about = "Record faces and facial landmarks from a webcam")]
struct Cli {
    /// What to run
    #[arg(value_enum)]
    mode: Mode,

    /// Folder under the output root to record faces into (required by `record`)
    #[arg(short, long)]
    folder: Option<String>,

    /// V4L2 camera index (/dev/video<N>)
    #[arg(long)]
    camera: Option<u32>,

    /// How long `detect` runs, in seconds
    #[arg(long)]
    duration_secs: Option<f64>,

    /// Where session folders and logs are written
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Where ONNX models are looked up and downloaded to
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Empty frames required before the next face is saved
    #[arg(long)]
    cooldown_frames: Option<u32>,

    /// Save every frame with a face, ignoring the cooldown
    #[arg(long)]
    save_every_detection: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Detect faces for a fixed time and log their landmarks
    #[value(name = "detect")]
    Detect,
    /// Show detections live until stopped
    #[value(name = "detect_with_camera")]
    DetectWithCamera,
    /// Save a cropped JPEG and box CSV for each new face
    #[value(name = "record")]
    Record,
    /// Save landmarks for each new face into a fresh "Person N" folder
    #[value(name = "record_landmarks")]
    RecordLandmarks,
    /// List capture devices
    #[value(name = "devices")]
    Devices,
}

impl Cli {
    /// Apply command-line overrides on top of environment configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(camera) = self.camera {
            config.camera_index = camera;
        }
        if let Some(duration) = self.duration_secs.and_then(config::seconds) {
            config.detect_duration = duration;
        }
        if let Some(root) = &self.output_root {
            config.output_root = root.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(frames) = self.cooldown_frames {
            config.cooldown_frames = frames;
        }
        if self.save_every_detection {
            config.gate_policy = alterego_core::GatePolicy::SaveEveryDetection;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    cli.apply(&mut config);
    tracing::debug!(?config, "configuration loaded");

    let stop = StopSignal::new();
    if cli.mode != Mode::Devices {
        stop.listen_ctrl_c();
        stop.listen_stdin();
        println!("Press 'q' then Enter, or Ctrl-C, to exit.");
    }

    let mode = cli.mode;
    let folder = cli.folder;
    let summary = tokio::task::spawn_blocking(move || match mode {
        Mode::Devices => {
            modes::devices();
            Ok(None)
        }
        Mode::Detect => modes::detect(&config, stop).map(Some),
        Mode::DetectWithCamera => modes::detect_with_camera(&config, stop).map(Some),
        Mode::Record => modes::record(&config, folder.as_deref(), stop).map(Some),
        Mode::RecordLandmarks => modes::record_landmarks(&config, stop).map(Some),
    })
    .await??;

    if let Some(summary) = summary {
        println!(
            "Processed {} frames in {:.1}s ({:?}).",
            summary.frames,
            summary.elapsed.as_secs_f64(),
            summary.reason
        );
    }
    Ok(())
}
