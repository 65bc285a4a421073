//! Live feedback for the interactive modes.

use alterego_core::Detection;
use alterego_hw::Frame;

/// Receives every captured frame with the detections to show on it.
pub trait Preview {
    fn show(&mut self, frame: &Frame, detections: &[Detection]);
}

/// Logs face boxes through `tracing`; reports a change in the face count
/// at `info` and every frame at `trace`.
#[derive(Default)]
pub struct LogPreview {
    last_count: Option<usize>,
}

impl LogPreview {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preview for LogPreview {
    fn show(&mut self, frame: &Frame, detections: &[Detection]) {
        if self.last_count != Some(detections.len()) {
            tracing::info!(frame = frame.sequence, faces = detections.len(), "faces in view");
            self.last_count = Some(detections.len());
        }
        for (i, det) in detections.iter().enumerate() {
            tracing::trace!(
                frame = frame.sequence,
                face = i,
                x = det.bbox.x,
                y = det.bbox.y,
                w = det.bbox.width,
                h = det.bbox.height,
                confidence = det.bbox.confidence,
                "face box"
            );
        }
    }
}

#[cfg(test)]
pub struct NoPreview;

#[cfg(test)]
impl Preview for NoPreview {
    fn show(&mut self, _frame: &Frame, _detections: &[Detection]) {}
}
