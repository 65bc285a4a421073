//! Mode wiring: acquire resources in order, build the stage, run the loop.
//!
//! Everything acquired here is owned by the function's scope, so the camera
//! stream, the engine thread and open files are released on every return.

use crate::config::Config;
use crate::driver::{LoopDriver, RunSummary};
use crate::engine::{spawn_engine, Delivery};
use crate::preview::LogPreview;
use crate::stages::{LivePreview, LogDetections, RecordFaces, RecordLandmarks};
use crate::stop::StopSignal;
use alterego_core::assets::{self, MESH_MODEL_NAME, YUNET_MODEL_NAME};
use alterego_core::{CaptureGate, FaceDetector, FaceMesh, OnnxLocator};
use alterego_hw::Camera;
use alterego_store::landmark_log::{DETECT_LOG_NAME, LANDMARK_LOG_NAME};
use alterego_store::session::{self, SUBJECT_PREFIX};
use alterego_store::{FaceWriter, LandmarkLog};
use anyhow::{Context, Result};
use std::fs;

/// Load YuNet and, if asked, the face mesh.
///
/// A missing mesh is not fatal: detections then carry the detector's
/// five keypoints as landmarks.
fn load_locator(config: &Config, with_mesh: bool) -> Result<OnnxLocator> {
    let detector_path = assets::ensure(
        &config.model_dir,
        YUNET_MODEL_NAME,
        config.detector_url.as_deref(),
    )?;
    let detector = FaceDetector::load(&detector_path, config.score_threshold)
        .with_context(|| format!("loading {}", detector_path.display()))?;
    tracing::info!(path = %detector_path.display(), "YuNet detector loaded");

    let mesh = if with_mesh {
        match assets::ensure(&config.model_dir, MESH_MODEL_NAME, config.mesh_url.as_deref()) {
            Ok(path) => {
                let mesh = FaceMesh::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?;
                tracing::info!(path = %path.display(), "face mesh loaded");
                Some(mesh)
            }
            Err(e) => {
                tracing::warn!(error = %e, "face mesh unavailable; using detector keypoints");
                None
            }
        }
    } else {
        None
    };

    let locator = OnnxLocator::new(detector, mesh);
    tracing::info!(mesh = locator.has_mesh(), "face locator ready");
    Ok(locator)
}

fn open_camera(config: &Config) -> Result<Camera> {
    let camera = Camera::open(config.camera_index)
        .with_context(|| format!("cannot open camera {}", config.camera_index))?;
    tracing::info!(
        index = config.camera_index,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );
    Ok(camera)
}

fn gate(config: &Config) -> CaptureGate {
    CaptureGate::with_policy(config.cooldown_frames, config.gate_policy)
}

/// The `--folder` value, rejected before anything is created or opened.
fn require_folder(folder: Option<&str>) -> Result<&str> {
    folder
        .filter(|f| !f.trim().is_empty())
        .context("please specify --folder for data to be recorded into")
}

pub fn detect(config: &Config, stop: StopSignal) -> Result<RunSummary> {
    let locator = load_locator(config, true)?;
    let camera = open_camera(config)?;
    let mut stream = camera.stream()?;

    fs::create_dir_all(&config.output_root)
        .with_context(|| format!("creating {}", config.output_root.display()))?;
    let log = LandmarkLog::open(config.output_root.join(DETECT_LOG_NAME))?;
    tracing::info!(path = %log.path().display(), secs = config.detect_duration.as_secs_f64(), "detecting");

    let mut stage = LogDetections {
        engine: spawn_engine(locator, Delivery::Every)?,
        log,
        preview: LogPreview::new(),
        logged: 0,
    };
    let summary = LoopDriver::new(stop)
        .with_time_limit(config.detect_duration)
        .run(&mut stream, &mut stage)?;
    stage.finish()?;
    tracing::info!(records = stage.logged, "detection log written");
    Ok(summary)
}

pub fn detect_with_camera(config: &Config, stop: StopSignal) -> Result<RunSummary> {
    let locator = load_locator(config, true)?;
    let camera = open_camera(config)?;
    let mut stream = camera.stream()?;

    let mut stage = LivePreview {
        engine: spawn_engine(locator, Delivery::LatestOnly)?,
        preview: LogPreview::new(),
    };
    LoopDriver::new(stop).run(&mut stream, &mut stage)
}

pub fn record(config: &Config, folder: Option<&str>, stop: StopSignal) -> Result<RunSummary> {
    let folder = require_folder(folder)?;

    let locator = load_locator(config, false)?;
    let camera = open_camera(config)?;
    let mut stream = camera.stream()?;
    let dir = session::open_named(&config.output_root, folder)?;

    let mut stage = RecordFaces {
        locator,
        gate: gate(config),
        writer: FaceWriter::new(dir, folder),
        preview: LogPreview::new(),
        saved: 0,
    };
    let summary = LoopDriver::new(stop).run(&mut stream, &mut stage)?;
    tracing::info!(faces = stage.saved, dir = %stage.writer.dir().display(), "recording finished");
    Ok(summary)
}

pub fn record_landmarks(config: &Config, stop: StopSignal) -> Result<RunSummary> {
    let locator = load_locator(config, true)?;
    let camera = open_camera(config)?;
    let mut stream = camera.stream()?;
    let dir = session::allocate_subject(&config.output_root, SUBJECT_PREFIX)?;

    let mut stage = RecordLandmarks {
        locator,
        gate: gate(config),
        log: LandmarkLog::open(dir.join(LANDMARK_LOG_NAME))?,
        preview: LogPreview::new(),
        saved: 0,
    };
    let summary = LoopDriver::new(stop).run(&mut stream, &mut stage)?;
    tracing::info!(records = stage.saved, path = %stage.log.path().display(), "recording finished");
    Ok(summary)
}

pub fn devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found.");
        return;
    }
    for dev in devices {
        println!("{:>3}  {:<14} {} ({}, {})", dev.index, dev.path, dev.card, dev.driver, dev.bus_info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> Config {
        let mut config = Config::from_env();
        config.output_root = tmp.path().join("data");
        config.model_dir = tmp.path().join("models");
        config.detector_url = None;
        config.mesh_url = None;
        config.camera_index = 250;
        config
    }

    #[test]
    fn test_record_without_folder_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);

        for folder in [None, Some(""), Some("  ")] {
            let err = record(&config, folder, StopSignal::new()).unwrap_err();
            assert!(err.to_string().contains("--folder"));
        }
        assert!(!config.output_root.exists());
        assert!(!config.model_dir.exists());
    }

    #[test]
    fn test_missing_model_without_url_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        assert!(record(&config, Some("alice"), StopSignal::new()).is_err());
        assert!(!config.output_root.join("alice").exists());
    }
}
