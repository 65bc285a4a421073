//! Per-frame work for each mode, plugged into [`LoopDriver`](crate::driver::LoopDriver).

use crate::driver::Stage;
use crate::engine::{EngineHandle, LocatorResult};
use crate::preview::Preview;
use alterego_core::{CaptureGate, Detection, FaceLocator};
use alterego_hw::Frame;
use alterego_store::{FaceWriter, LandmarkLog, LandmarkRecord};
use std::sync::Arc;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Locate faces in `frame`, treating a locator failure as no faces.
fn locate_or_empty<L: FaceLocator + ?Sized>(locator: &mut L, frame: &Frame) -> Vec<Detection> {
    match locator.locate(&frame.data, frame.width, frame.height) {
        Ok(detections) => detections,
        Err(e) => {
            tracing::warn!(error = %e, frame = frame.sequence, "face location failed");
            Vec::new()
        }
    }
}

fn append_detections(
    log: &mut LandmarkLog,
    timestamp: i64,
    detections: &[Detection],
) -> anyhow::Result<()> {
    for (face, det) in detections.iter().enumerate() {
        log.append(&LandmarkRecord {
            timestamp,
            face,
            landmarks: det.landmarks.clone(),
        })?;
    }
    Ok(())
}

/// `record`: gated JPEG crop + CSV box per face.
pub struct RecordFaces<L, P> {
    pub locator: L,
    pub gate: CaptureGate,
    pub writer: FaceWriter,
    pub preview: P,
    pub saved: u64,
}

impl<L: FaceLocator, P: Preview> Stage for RecordFaces<L, P> {
    fn process(&mut self, frame: Frame) -> anyhow::Result<()> {
        let detections = locate_or_empty(&mut self.locator, &frame);

        if self.gate.observe(detections.len()) {
            for det in &detections {
                let Some(region) = det.bbox.to_pixel_box(frame.width, frame.height) else {
                    tracing::debug!(frame = frame.sequence, "face box outside frame, skipped");
                    continue;
                };
                self.writer.save(&frame.data, frame.width, frame.height, region)?;
                self.saved += 1;
            }
            tracing::info!(frame = frame.sequence, total = self.saved, "faces recorded");
        }

        self.preview.show(&frame, &detections);
        Ok(())
    }
}

/// `record_landmarks`: gated landmark records, one line per face.
pub struct RecordLandmarks<L, P> {
    pub locator: L,
    pub gate: CaptureGate,
    pub log: LandmarkLog,
    pub preview: P,
    pub saved: u64,
}

impl<L: FaceLocator, P: Preview> Stage for RecordLandmarks<L, P> {
    fn process(&mut self, frame: Frame) -> anyhow::Result<()> {
        let timestamp = now_millis();
        let detections = locate_or_empty(&mut self.locator, &frame);

        if self.gate.observe(detections.len()) {
            append_detections(&mut self.log, timestamp, &detections)?;
            self.saved += detections.len() as u64;
            tracing::info!(frame = frame.sequence, total = self.saved, "landmarks recorded");
        }

        self.preview.show(&frame, &detections);
        Ok(())
    }
}

/// `detect`: post frames to the engine; log every result that has faces.
pub struct LogDetections<P> {
    pub engine: EngineHandle,
    pub log: LandmarkLog,
    pub preview: P,
    pub logged: u64,
}

impl<P> LogDetections<P> {
    fn log_results(&mut self, results: Vec<Arc<LocatorResult>>) -> anyhow::Result<()> {
        for result in results.iter().filter(|r| !r.detections.is_empty()) {
            append_detections(&mut self.log, result.timestamp, &result.detections)?;
            self.logged += result.detections.len() as u64;
        }
        Ok(())
    }

    /// Stop the engine and log whatever it finished after the last frame.
    pub fn finish(&mut self) -> anyhow::Result<()> {
        let pending = self.engine.finish();
        self.log_results(pending)
    }
}

impl<P: Preview> Stage for LogDetections<P> {
    fn process(&mut self, frame: Frame) -> anyhow::Result<()> {
        let frame = Arc::new(frame);
        self.engine.offer(Arc::clone(&frame), now_millis());

        let results = self.engine.drain();
        self.log_results(results)?;

        let latest = self.engine.latest();
        let detections = latest.as_ref().map_or(&[][..], |r| r.detections.as_slice());
        self.preview.show(&frame, detections);
        Ok(())
    }
}

/// `detect_with_camera`: post frames to the engine and preview the latest result.
pub struct LivePreview<P> {
    pub engine: EngineHandle,
    pub preview: P,
}

impl<P: Preview> Stage for LivePreview<P> {
    fn process(&mut self, frame: Frame) -> anyhow::Result<()> {
        let frame = Arc::new(frame);
        self.engine.offer(Arc::clone(&frame), now_millis());
        let latest = self.engine.latest();
        let detections = latest.as_ref().map_or(&[][..], |r| r.detections.as_slice());
        self.preview.show(&frame, detections);
        Ok(())
    }
}
