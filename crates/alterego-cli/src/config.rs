use alterego_core::assets::YUNET_MODEL_URL;
use alterego_core::detector::YUNET_SCORE_THRESHOLD;
use alterego_core::gate::DEFAULT_COOLDOWN_FRAMES;
use alterego_core::GatePolicy;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DETECT_DURATION: Duration = Duration::from_secs(5);

/// A duration from seconds, or `None` if negative, NaN, infinite or too large.
pub fn seconds(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

/// Runtime configuration, loaded from environment variables and then
/// overridden by command-line flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 camera index (default: 0 → /dev/video0).
    pub camera_index: u32,
    /// Directory holding (or receiving) the ONNX model files.
    pub model_dir: PathBuf,
    /// Root under which session folders and logs are written.
    pub output_root: PathBuf,
    /// Consecutive empty frames before the capture gate re-arms.
    pub cooldown_frames: u32,
    /// Wall-clock bound for the `detect` mode.
    pub detect_duration: Duration,
    /// Where to fetch the YuNet model when it is missing. Empty disables download.
    pub detector_url: Option<String>,
    /// Where to fetch the face mesh model when it is missing.
    pub mesh_url: Option<String>,
    /// Minimum YuNet score for a face.
    pub score_threshold: f32,
    pub gate_policy: GatePolicy,
}

impl Config {
    /// Load configuration from `ALTEREGO_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| get(key).and_then(|v| v.trim().parse::<f64>().ok());
        let count = |key: &str| get(key).and_then(|v| v.trim().parse::<u32>().ok());
        let url = |key: &str, default: Option<&str>| match get(key) {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => default.map(str::to_string),
        };

        Self {
            camera_index: count("ALTEREGO_CAMERA_INDEX").unwrap_or(0),
            model_dir: get("ALTEREGO_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models")),
            output_root: get("ALTEREGO_OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            cooldown_frames: count("ALTEREGO_COOLDOWN_FRAMES").unwrap_or(DEFAULT_COOLDOWN_FRAMES),
            detect_duration: parsed("ALTEREGO_DETECT_SECS")
                .and_then(seconds)
                .unwrap_or(DEFAULT_DETECT_DURATION),
            detector_url: url("ALTEREGO_DETECTOR_URL", Some(YUNET_MODEL_URL)),
            mesh_url: url("ALTEREGO_MESH_URL", None),
            score_threshold: parsed("ALTEREGO_SCORE_THRESHOLD")
                .map_or(YUNET_SCORE_THRESHOLD, |v| v as f32),
            gate_policy: GatePolicy::Enforce,
        }
    }
}
