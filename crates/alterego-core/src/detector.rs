//! YuNet face detector via ONNX Runtime.
//!
//! Runs the OpenCV-zoo YuNet model (2023mar export) on a letterboxed
//! 640×640 BGR tensor, decodes its anchor-free per-stride outputs and
//! applies NMS. Each face comes back with a box and five keypoints.

use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgb};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const YUNET_INPUT_SIZE: usize = 640;
pub const YUNET_SCORE_THRESHOLD: f32 = 0.9;
const YUNET_NMS_THRESHOLD: f32 = 0.3;
const YUNET_STRIDES: [usize; 3] = [8, 16, 32];
/// Letterbox fill; YuNet takes raw 0–255 values so black pads to zero.
const YUNET_PAD_VALUE: f32 = 0.0;
const YUNET_NUM_OUTPUTS: usize = 12;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer too short for {width}x{height} RGB")]
    InvalidFrame { width: u32, height: u32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    fn to_frame(self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Where one stride's four output tensors sit in the session outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputLayout {
    cls: usize,
    obj: usize,
    bbox: usize,
    kps: usize,
}

impl OutputLayout {
    /// The 2023mar export's own order: all cls, then obj, bbox, kps.
    const fn positional(stride_pos: usize) -> Self {
        Self {
            cls: stride_pos,
            obj: 3 + stride_pos,
            bbox: 6 + stride_pos,
            kps: 9 + stride_pos,
        }
    }
}

/// YuNet-based face detector.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
    score_threshold: f32,
    /// One entry per stride in `YUNET_STRIDES`.
    layouts: [OutputLayout; 3],
}

impl FaceDetector {
    /// Load the YuNet ONNX model from the given path.
    pub fn load(model_path: &Path, score_threshold: f32) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            score_threshold,
            "loaded YuNet model"
        );

        if output_names.len() < YUNET_NUM_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "YuNet model requires {YUNET_NUM_OUTPUTS} outputs (3 strides × cls/obj/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let layouts = resolve_layouts(&output_names);
        tracing::debug!(?layouts, "YuNet output tensor mapping");

        Ok(Self {
            session,
            input_size: YUNET_INPUT_SIZE,
            score_threshold,
            layouts,
        })
    }

    /// Detect faces in a packed RGB frame, returning boxes sorted by confidence.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, letterbox) = self.preprocess(rgb, width, height)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();

        for (&stride, layout) in YUNET_STRIDES.iter().zip(self.layouts) {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };

            let stride_out = StrideOutputs {
                cls: extract(layout.cls, "cls")?,
                obj: extract(layout.obj, "obj")?,
                bbox: extract(layout.bbox, "bbox")?,
                kps: extract(layout.kps, "kps")?,
            };

            candidates.extend(decode_stride(
                &stride_out,
                stride,
                self.input_size,
                letterbox,
                self.score_threshold,
            ));
        }

        Ok(suppress_overlaps(candidates, YUNET_NMS_THRESHOLD))
    }

    /// Letterbox an RGB frame into a 1×3×640×640 BGR float tensor.
    ///
    /// YuNet expects raw 0–255 channel values in BGR order, no normalization.
    fn preprocess(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(Array4<f32>, LetterboxInfo), DetectorError> {
        let view = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(width, height, rgb)
            .filter(|_| width > 0 && height > 0)
            .ok_or(DetectorError::InvalidFrame { width, height })?;

        let size = self.input_size;
        let letterbox = letterbox_for(width, height, size);
        let new_w = ((width as f32 * letterbox.scale).round() as u32).clamp(1, size as u32);
        let new_h = ((height as f32 * letterbox.scale).round() as u32).clamp(1, size as u32);

        let resized = image::imageops::resize(&view, new_w, new_h, FilterType::Triangle);

        let pad_x = letterbox.pad_x as usize;
        let pad_y = letterbox.pad_y as usize;
        let mut tensor = Array4::<f32>::from_elem((1, 3, size, size), YUNET_PAD_VALUE);

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (tx, ty) = (x as usize + pad_x, y as usize + pad_y);
            let [r, g, b] = pixel.0;
            tensor[[0, 0, ty, tx]] = b as f32;
            tensor[[0, 1, ty, tx]] = g as f32;
            tensor[[0, 2, ty, tx]] = r as f32;
        }

        Ok((tensor, letterbox))
    }
}

/// Scale and centered integer padding that fit a frame into a square input.
fn letterbox_for(width: u32, height: u32, size: usize) -> LetterboxInfo {
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = (width as f32 * scale).round().min(size as f32);
    let new_h = (height as f32 * scale).round().min(size as f32);
    LetterboxInfo {
        scale,
        pad_x: ((size as f32 - new_w) / 2.0).floor(),
        pad_y: ((size as f32 - new_h) / 2.0).floor(),
    }
}

/// Map each stride to its outputs by name ("cls_8", "obj_8", "bbox_8",
/// "kps_8", ...), or by the export's positional order if any name is missing.
fn resolve_layouts(names: &[String]) -> [OutputLayout; 3] {
    let index_of = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let by_name = |stride: usize| {
        Some(OutputLayout {
            cls: index_of("cls", stride)?,
            obj: index_of("obj", stride)?,
            bbox: index_of("bbox", stride)?,
            kps: index_of("kps", stride)?,
        })
    };

    match (by_name(8), by_name(16), by_name(32)) {
        (Some(s8), Some(s16), Some(s32)) => [s8, s16, s32],
        _ => {
            tracing::info!(?names, "YuNet output names not recognized, assuming export order");
            [0, 1, 2].map(OutputLayout::positional)
        }
    }
}

/// Flattened output tensors for one stride.
struct StrideOutputs<'a> {
    cls: &'a [f32],
    obj: &'a [f32],
    bbox: &'a [f32],
    kps: &'a [f32],
}

/// Decode detections for a single stride level.
///
/// One prior per grid cell. Score is `sqrt(cls * obj)`; box centers are
/// offsets from the cell corner and sizes are log-encoded, all in stride units.
fn decode_stride(
    out: &StrideOutputs<'_>,
    stride: usize,
    input_size: usize,
    letterbox: LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let cols = input_size / stride;
    let rows = input_size / stride;
    let s = stride as f32;

    let mut detections = Vec::new();

    for idx in 0..rows * cols {
        let cls = out.cls.get(idx).copied().unwrap_or(0.0).clamp(0.0, 1.0);
        let obj = out.obj.get(idx).copied().unwrap_or(0.0).clamp(0.0, 1.0);
        let score = (cls * obj).sqrt();
        if score < threshold {
            continue;
        }

        let bbox_off = idx * 4;
        let Some(deltas) = out.bbox.get(bbox_off..bbox_off + 4) else {
            continue;
        };

        let r = (idx / cols) as f32;
        let c = (idx % cols) as f32;

        let cx = (c + deltas[0]) * s;
        let cy = (r + deltas[1]) * s;
        let w = deltas[2].exp() * s;
        let h = deltas[3].exp() * s;

        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

        let kps_off = idx * 10;
        let landmarks = out.kps.get(kps_off..kps_off + 10).map(|k| {
            let mut lms = [(0.0f32, 0.0f32); 5];
            for (i, lm) in lms.iter_mut().enumerate() {
                let lx = (k[i * 2] + c) * s;
                let ly = (k[i * 2 + 1] + r) * s;
                *lm = letterbox.to_frame(lx, ly);
            }
            lms
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Greedy NMS: walk candidates best-first and keep each one that does not
/// overlap an already kept box by more than `max_iou`.
fn suppress_overlaps(mut candidates: Vec<BoundingBox>, max_iou: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= max_iou) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
            landmarks: None,
        }
    }

    const IDENTITY: LetterboxInfo = LetterboxInfo {
        scale: 1.0,
        pad_x: 0.0,
        pad_y: 0.0,
    };

    /// 64×64 input at stride 32 → a 2×2 grid with a single confident cell.
    fn single_cell_outputs(cell: usize, cls: f32) -> (Vec<f32>, Vec<f32>, Vec<f32>, Vec<f32>) {
        let mut cls_v = vec![0.0; 4];
        let mut obj_v = vec![0.0; 4];
        let mut bbox_v = vec![0.0; 16];
        let kps_v = vec![0.0; 40];
        cls_v[cell] = cls;
        obj_v[cell] = 1.0;
        bbox_v[cell * 4] = 0.5;
        bbox_v[cell * 4 + 1] = 0.5;
        (cls_v, obj_v, bbox_v, kps_v)
    }

    #[test]
    fn test_decode_stride_single_face() {
        let (cls, obj, bbox, kps) = single_cell_outputs(3, 1.0);
        let out = StrideOutputs { cls: &cls, obj: &obj, bbox: &bbox, kps: &kps };

        let dets = decode_stride(&out, 32, 64, IDENTITY, 0.9);
        assert_eq!(dets.len(), 1);

        // Cell (row 1, col 1): center (1.5 * 32, 1.5 * 32), size exp(0) * 32.
        let d = &dets[0];
        assert!((d.x - 32.0).abs() < 1e-4);
        assert!((d.y - 32.0).abs() < 1e-4);
        assert!((d.width - 32.0).abs() < 1e-4);
        assert!((d.height - 32.0).abs() < 1e-4);
        assert!((d.confidence - 1.0).abs() < 1e-6);

        let lms = d.landmarks.unwrap();
        assert!((lms[0].0 - 32.0).abs() < 1e-4);
        assert!((lms[0].1 - 32.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_stride_below_threshold() {
        // sqrt(0.25 * 1.0) = 0.5 < 0.9
        let (cls, obj, bbox, kps) = single_cell_outputs(0, 0.25);
        let out = StrideOutputs { cls: &cls, obj: &obj, bbox: &bbox, kps: &kps };
        assert!(decode_stride(&out, 32, 64, IDENTITY, 0.9).is_empty());
    }

    #[test]
    fn test_decode_stride_maps_through_letterbox() {
        let (cls, obj, bbox, kps) = single_cell_outputs(3, 1.0);
        let out = StrideOutputs { cls: &cls, obj: &obj, bbox: &bbox, kps: &kps };
        let letterbox = LetterboxInfo { scale: 2.0, pad_x: 10.0, pad_y: 0.0 };

        let d = &decode_stride(&out, 32, 64, letterbox, 0.9)[0];
        assert!((d.x - 11.0).abs() < 1e-4);
        assert!((d.y - 16.0).abs() < 1e-4);
        assert!((d.width - 16.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_stride_short_tensors_skip() {
        let cls = vec![1.0; 4];
        let obj = vec![1.0; 4];
        let out = StrideOutputs { cls: &cls, obj: &obj, bbox: &[], kps: &[] };
        assert!(decode_stride(&out, 32, 64, IDENTITY, 0.5).is_empty());
    }

    #[test]
    fn test_letterbox_landscape_frame() {
        let lb = letterbox_for(640, 480, 640);
        assert!((lb.scale - 1.0).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);

        // Round trip a point through the letterbox.
        let (x, y) = lb.to_frame(100.0, 80.0 + 50.0);
        assert!((x - 100.0).abs() < 1e-4);
        assert!((y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_letterbox_small_frame_upscales() {
        let lb = letterbox_for(320, 240, 640);
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert_eq!(lb.pad_y, 80.0);
    }

    #[test]
    fn test_suppress_keeps_best_of_overlapping_pair() {
        let candidates = vec![
            make_bbox(4.0, 2.0, 80.0, 80.0, 0.91),
            make_bbox(300.0, 40.0, 60.0, 60.0, 0.93),
            make_bbox(0.0, 0.0, 80.0, 80.0, 0.97),
        ];
        let kept = suppress_overlaps(candidates, YUNET_NMS_THRESHOLD);
        let scores: Vec<f32> = kept.iter().map(|b| b.confidence).collect();
        assert_eq!(scores, vec![0.97, 0.93]);
    }

    #[test]
    fn test_suppress_keeps_lightly_overlapping_faces() {
        // A tall and a wide box crossing at one corner: IoU = 100 / 1900.
        let candidates = vec![
            make_bbox(0.0, 0.0, 10.0, 100.0, 0.95),
            make_bbox(0.0, 0.0, 100.0, 10.0, 0.92),
        ];
        assert_eq!(suppress_overlaps(candidates, YUNET_NMS_THRESHOLD).len(), 2);
        assert!(suppress_overlaps(Vec::new(), YUNET_NMS_THRESHOLD).is_empty());
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_layouts_from_export_names() {
        let layouts = resolve_layouts(&names(&[
            "cls_8", "cls_16", "cls_32", "obj_8", "obj_16", "obj_32",
            "bbox_8", "bbox_16", "bbox_32", "kps_8", "kps_16", "kps_32",
        ]));
        assert_eq!(layouts, [0, 1, 2].map(OutputLayout::positional));
    }

    #[test]
    fn test_layouts_follow_names_in_any_order() {
        let layouts = resolve_layouts(&names(&[
            "kps_8", "bbox_8", "obj_8", "cls_8", "kps_16", "bbox_16",
            "obj_16", "cls_16", "kps_32", "bbox_32", "obj_32", "cls_32",
        ]));
        assert_eq!(layouts[0], OutputLayout { cls: 3, obj: 2, bbox: 1, kps: 0 });
        assert_eq!(layouts[2], OutputLayout { cls: 11, obj: 10, bbox: 9, kps: 8 });
    }

    #[test]
    fn test_layouts_fall_back_when_a_name_is_missing() {
        let mut list = names(&[
            "cls_8", "cls_16", "cls_32", "obj_8", "obj_16", "obj_32",
            "bbox_8", "bbox_16", "bbox_32", "kps_8", "kps_16",
        ]);
        list.push("landmarks".into());
        assert_eq!(resolve_layouts(&list), [0, 1, 2].map(OutputLayout::positional));
    }
}
