//! Face locator: the per-frame "where are the faces" contract the capture
//! loop depends on, and its ONNX-backed implementation.

use crate::detector::{DetectorError, FaceDetector};
use crate::mesh::{FaceMesh, MeshError};
use crate::types::Detection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("face mesh error: {0}")]
    Mesh(#[from] MeshError),
}

/// Locates faces in a packed RGB frame.
///
/// Implementations may hold inference sessions, hence `&mut self`.
pub trait FaceLocator: Send {
    fn locate(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, LocatorError>;
}

impl<L: FaceLocator + ?Sized> FaceLocator for Box<L> {
    fn locate(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, LocatorError> {
        (**self).locate(rgb, width, height)
    }
}

/// YuNet boxes, optionally refined with a dense face mesh per face.
///
/// Without a mesh model each detection carries the detector's five
/// keypoints as landmarks.
pub struct OnnxLocator {
    detector: FaceDetector,
    mesh: Option<FaceMesh>,
}

impl OnnxLocator {
    pub fn new(detector: FaceDetector, mesh: Option<FaceMesh>) -> Self {
        Self { detector, mesh }
    }

    pub fn has_mesh(&self) -> bool {
        self.mesh.is_some()
    }
}

impl FaceLocator for OnnxLocator {
    fn locate(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, LocatorError> {
        let boxes = self.detector.detect(rgb, width, height)?;

        let Some(mesh) = self.mesh.as_mut() else {
            return Ok(boxes
                .into_iter()
                .map(|bbox| Detection::from_keypoints(bbox, width, height))
                .collect());
        };

        let mut detections = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            match mesh.extract(rgb, width, height, &bbox) {
                Ok(landmarks) => detections.push(Detection { bbox, landmarks }),
                Err(MeshError::EmptyCrop) => {
                    tracing::debug!(x = bbox.x, y = bbox.y, "face crop empty; using keypoints");
                    detections.push(Detection::from_keypoints(bbox, width, height));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(detections)
    }
}
