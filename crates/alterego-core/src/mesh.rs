//! Dense face mesh (468 landmarks) via ONNX Runtime.
//!
//! Takes a square crop around a detected face, runs a 192×192 face-landmark
//! regression model and projects the points back into normalized frame
//! coordinates.

use crate::types::{BoundingBox, Landmark, PixelBox};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const MESH_INPUT_SIZE: u32 = 192;
pub const MESH_NUM_LANDMARKS: usize = 468;
/// The crop is this many times the longer box side, centered on the box.
const MESH_CROP_SCALE: f32 = 1.5;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop lies outside the frame")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face-mesh landmark regressor.
pub struct FaceMesh {
    session: Session,
}

impl FaceMesh {
    /// Load the face-landmark ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, MeshError> {
        if !model_path.exists() {
            return Err(MeshError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face mesh model"
        );

        Ok(Self { session })
    }

    /// Extract 468 landmarks for one detected face in a packed RGB frame.
    pub fn extract(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Vec<Landmark>, MeshError> {
        let region = crop_region(face, width, height).ok_or(MeshError::EmptyCrop)?;
        let patch = region.crop(rgb, width, height).ok_or(MeshError::EmptyCrop)?;
        let resized =
            image::imageops::resize(&patch, MESH_INPUT_SIZE, MESH_INPUT_SIZE, FilterType::Triangle);

        let input = Self::preprocess(&resized);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| MeshError::InferenceFailed(format!("landmark tensor: {e}")))?;

        if raw.len() < MESH_NUM_LANDMARKS * 3 {
            return Err(MeshError::InferenceFailed(format!(
                "expected {} landmark values, got {}",
                MESH_NUM_LANDMARKS * 3,
                raw.len()
            )));
        }

        Ok(project_landmarks(raw, region, width, height))
    }

    /// Convert a 192×192 RGB crop to a NCHW tensor scaled to [0, 1].
    fn preprocess(patch: &RgbImage) -> Array4<f32> {
        let size = MESH_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in patch.enumerate_pixels() {
            for (c, &v) in pixel.0.iter().enumerate() {
                tensor[[0, c, y as usize, x as usize]] = v as f32 / 255.0;
            }
        }
        tensor
    }
}

/// Square region around the face box, enlarged by [`MESH_CROP_SCALE`] and
/// clamped to the frame.
fn crop_region(face: &BoundingBox, width: u32, height: u32) -> Option<PixelBox> {
    let side = face.width.max(face.height) * MESH_CROP_SCALE;
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    BoundingBox {
        x: cx - side / 2.0,
        y: cy - side / 2.0,
        width: side,
        height: side,
        confidence: face.confidence,
        landmarks: None,
    }
    .to_pixel_box(width, height)
}

/// Map model-space points (pixels of the 192×192 input) to frame-normalized
/// landmarks. `z` shares the horizontal scale.
fn project_landmarks(raw: &[f32], region: PixelBox, width: u32, height: u32) -> Vec<Landmark> {
    let sx = region.width as f32 / MESH_INPUT_SIZE as f32;
    let sy = region.height as f32 / MESH_INPUT_SIZE as f32;
    raw.chunks_exact(3)
        .take(MESH_NUM_LANDMARKS)
        .map(|p| Landmark {
            x: (region.x as f32 + p[0] * sx) / width as f32,
            y: (region.y as f32 + p[1] * sy) / height as f32,
            z: p[2] * sx / width as f32,
        })
        .collect()
}
