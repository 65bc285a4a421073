//! Face location off the capture thread.
//!
//! The locator runs on a dedicated OS thread. Frames are offered with
//! `try_send` into a one-slot queue, so a busy locator makes the loop drop
//! frames instead of stalling capture. Results go into a `watch` slot that
//! always holds the most recent one and, with [`Delivery::Every`], into an
//! unbounded queue the caller drains so no result is lost.

use alterego_core::{Detection, FaceLocator};
use alterego_hw::Frame;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn locator thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Detections for one frame, stamped with when that frame was offered.
#[derive(Debug, Clone)]
pub struct LocatorResult {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub sequence: u32,
    pub detections: Vec<Detection>,
}

/// Which results the caller gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Only the most recent result, through [`EngineHandle::latest`].
    LatestOnly,
    /// Additionally every result in order, through [`EngineHandle::drain`].
    Every,
}

struct LocateRequest {
    frame: Arc<Frame>,
    timestamp: i64,
}

pub struct EngineHandle {
    tx: Option<mpsc::Sender<LocateRequest>>,
    latest: watch::Receiver<Option<Arc<LocatorResult>>>,
    every: Option<mpsc::UnboundedReceiver<Arc<LocatorResult>>>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Offer a frame to the locator. Returns `false` if it was dropped
    /// because the locator is still busy with an earlier one.
    pub fn offer(&self, frame: Arc<Frame>, timestamp: i64) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(LocateRequest { frame, timestamp }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(req)) => {
                tracing::trace!(frame = req.frame.sequence, "locator busy, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("locator thread has exited");
                false
            }
        }
    }

    /// Most recent result.
    pub fn latest(&self) -> Option<Arc<LocatorResult>> {
        self.latest.borrow().clone()
    }

    /// Results published since the last drain, oldest first.
    ///
    /// Always empty for a [`Delivery::LatestOnly`] engine.
    pub fn drain(&mut self) -> Vec<Arc<LocatorResult>> {
        let mut results = Vec::new();
        if let Some(every) = &mut self.every {
            while let Ok(result) = every.try_recv() {
                results.push(result);
            }
        }
        results
    }

    /// Stop accepting frames, wait for the in-flight one, and return every
    /// result not yet drained.
    pub fn finish(&mut self) -> Vec<Arc<LocatorResult>> {
        self.shutdown();
        self.drain()
    }

    fn shutdown(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("locator thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Move `locator` onto its own thread and return a handle to it.
///
/// A frame the locator fails on is published as a result with no
/// detections, so readers never see a stale box from an earlier frame.
pub fn spawn_engine<L>(mut locator: L, delivery: Delivery) -> Result<EngineHandle, EngineError>
where
    L: FaceLocator + 'static,
{
    let (tx, mut rx) = mpsc::channel::<LocateRequest>(1);
    let (latest_tx, latest) = watch::channel(None);
    let (every_tx, every) = match delivery {
        Delivery::LatestOnly => (None, None),
        Delivery::Every => {
            let (every_tx, every) = mpsc::unbounded_channel();
            (Some(every_tx), Some(every))
        }
    };

    let thread = std::thread::Builder::new()
        .name("alterego-locator".into())
        .spawn(move || {
            tracing::info!("locator thread started");
            while let Some(req) = rx.blocking_recv() {
                let frame = &req.frame;
                let detections = match locator.locate(&frame.data, frame.width, frame.height) {
                    Ok(detections) => detections,
                    Err(e) => {
                        tracing::warn!(error = %e, frame = frame.sequence, "face location failed");
                        Vec::new()
                    }
                };
                tracing::debug!(frame = frame.sequence, faces = detections.len(), "located");
                let result = Arc::new(LocatorResult {
                    timestamp: req.timestamp,
                    sequence: frame.sequence,
                    detections,
                });
                if let Some(every_tx) = &every_tx {
                    // The receiver lives as long as the handle that joins us.
                    let _ = every_tx.send(Arc::clone(&result));
                }
                latest_tx.send_replace(Some(result));
            }
            tracing::info!("locator thread exiting");
        })?;

    Ok(EngineHandle {
        tx: Some(tx),
        latest,
        every,
        thread: Some(thread),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alterego_core::{BoundingBox, LocatorError};
    use std::time::{Duration, Instant};

    /// Reports one centred face on frames whose first pixel is bright.
    pub(crate) struct BrightFrameLocator;

    impl FaceLocator for BrightFrameLocator {
        fn locate(
            &mut self,
            rgb: &[u8],
            width: u32,
            height: u32,
        ) -> Result<Vec<Detection>, LocatorError> {
            if rgb.first().map_or(true, |&p| p < 128) {
                return Ok(Vec::new());
            }
            let (w, h) = (width as f32, height as f32);
            let bbox = BoundingBox {
                x: w / 4.0,
                y: h / 4.0,
                width: w / 2.0,
                height: h / 2.0,
                confidence: 0.95,
                landmarks: Some([
                    (w * 0.4, h * 0.4),
                    (w * 0.6, h * 0.4),
                    (w * 0.5, h * 0.5),
                    (w * 0.42, h * 0.6),
                    (w * 0.58, h * 0.6),
                ]),
            };
            Ok(vec![Detection::from_keypoints(bbox, width, height)])
        }
    }

    pub(crate) fn frame(bright: bool, seq: u32) -> Frame {
        let value = if bright { 200 } else { 20 };
        Frame::new(vec![value; 32 * 24 * 3], 32, 24, seq)
    }

    struct FailingLocator;

    impl FaceLocator for FailingLocator {
        fn locate(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<Detection>, LocatorError> {
            Err(LocatorError::Detector(
                alterego_core::detector::DetectorError::InferenceFailed("boom".into()),
            ))
        }
    }

    fn wait_for_sequence(engine: &EngineHandle, sequence: u32) -> Arc<LocatorResult> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = engine.latest().filter(|r| r.sequence == sequence) {
                return result;
            }
            assert!(Instant::now() < deadline, "no locator result in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_result_published_for_offered_frame() {
        let engine = spawn_engine(BrightFrameLocator, Delivery::LatestOnly).unwrap();
        assert!(engine.latest().is_none());
        assert!(engine.offer(Arc::new(frame(true, 1)), 1_000));

        let result = wait_for_sequence(&engine, 1);
        assert_eq!(result.timestamp, 1_000);
        assert_eq!(result.detections.len(), 1);
    }

    #[test]
    fn test_empty_result_replaces_previous() {
        let engine = spawn_engine(BrightFrameLocator, Delivery::LatestOnly).unwrap();
        engine.offer(Arc::new(frame(true, 1)), 1);
        assert_eq!(wait_for_sequence(&engine, 1).detections.len(), 1);

        engine.offer(Arc::new(frame(false, 2)), 2);
        assert!(wait_for_sequence(&engine, 2).detections.is_empty());
    }

    #[test]
    fn test_locator_error_publishes_empty_result() {
        let engine = spawn_engine(FailingLocator, Delivery::LatestOnly).unwrap();
        engine.offer(Arc::new(frame(true, 9)), 5);
        assert!(wait_for_sequence(&engine, 9).detections.is_empty());
    }

    #[test]
    fn test_every_delivery_keeps_results_the_slot_overwrote() {
        let mut engine = spawn_engine(BrightFrameLocator, Delivery::Every).unwrap();
        assert!(engine.offer(Arc::new(frame(true, 1)), 10));
        wait_for_sequence(&engine, 1);
        assert!(engine.offer(Arc::new(frame(false, 2)), 20));

        let results = engine.finish();
        let sequences: Vec<u32> = results.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(results[0].detections.len(), 1);
        assert!(engine.drain().is_empty());
        assert!(!engine.offer(Arc::new(frame(true, 3)), 30));
    }

    #[test]
    fn test_finish_returns_in_flight_result() {
        let mut engine = spawn_engine(BrightFrameLocator, Delivery::Every).unwrap();
        assert!(engine.offer(Arc::new(frame(true, 4)), 40));
        let results = engine.finish();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sequence, 4);
    }

    #[test]
    fn test_latest_only_drains_nothing() {
        let mut engine = spawn_engine(BrightFrameLocator, Delivery::LatestOnly).unwrap();
        engine.offer(Arc::new(frame(true, 1)), 1);
        assert!(engine.finish().is_empty());
        assert_eq!(engine.latest().unwrap().sequence, 1);
    }

    #[test]
    fn test_drop_joins_thread() {
        let engine = spawn_engine(BrightFrameLocator, Delivery::LatestOnly).unwrap();
        let frame = Arc::new(frame(true, 1));
        engine.offer(Arc::clone(&frame), 1);
        drop(engine);
        // The request held the only other reference; it is gone once the thread has exited.
        assert_eq!(Arc::strong_count(&frame), 1);
    }
}
