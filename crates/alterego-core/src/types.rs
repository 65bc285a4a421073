use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial keypoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point keypoints in frame pixels:
    /// [right_eye, left_eye, nose, right_mouth, left_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Integer box clamped to a `frame_width` × `frame_height` frame.
    ///
    /// Coordinates are truncated toward zero, then the box is shrunk to the
    /// part that lies inside the frame. Returns `None` when nothing remains.
    pub fn to_pixel_box(&self, frame_width: u32, frame_height: u32) -> Option<PixelBox> {
        let (x, width) = clamp_span(self.x, self.width, frame_width);
        let (y, height) = clamp_span(self.y, self.height, frame_height);
        if width == 0 || height == 0 {
            return None;
        }
        Some(PixelBox {
            x,
            y,
            width,
            height,
        })
    }

    /// Intersection over union with `other`; 0 when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let overlap_w = (self.x + self.width).min(other.x + other.width) - self.x.max(other.x);
        let overlap_h = (self.y + self.height).min(other.y + other.height) - self.y.max(other.y);
        let inter = overlap_w.max(0.0) * overlap_h.max(0.0);
        let union = self.width * self.height + other.width * other.height - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

fn clamp_span(start: f32, len: f32, limit: u32) -> (u32, u32) {
    let mut start = start.trunc() as i64;
    let mut len = len.trunc() as i64;
    if start < 0 {
        len += start;
        start = 0;
    }
    let limit = limit as i64;
    if start >= limit || len <= 0 {
        return (0, 0);
    }
    len = len.min(limit - start);
    (start as u32, len as u32)
}

/// Integer face rectangle inside a frame; the exact region cropped and
/// written alongside each saved face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBox {
    /// Copy this region out of a packed RGB frame.
    ///
    /// Returns `None` if the frame buffer is too short or the region does
    /// not fit inside `width` × `height`.
    pub fn crop(&self, rgb: &[u8], width: u32, height: u32) -> Option<RgbImage> {
        if self.x + self.width > width || self.y + self.height > height {
            return None;
        }
        let view = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(width, height, rgb)?;
        Some(RgbImage::from_fn(self.width, self.height, |x, y| {
            *view.get_pixel(self.x + x, self.y + y)
        }))
    }
}

/// A point on the face surface, normalized to the frame.
///
/// `x` is divided by the frame width, `y` by the frame height and `z`
/// uses the same scale as `x` (negative is toward the camera).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One located face: its box and an ordered set of landmarks.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub landmarks: Vec<Landmark>,
}

impl Detection {
    /// Build a detection whose landmarks are the detector's five keypoints,
    /// normalized to the frame with `z = 0`.
    pub fn from_keypoints(bbox: BoundingBox, frame_width: u32, frame_height: u32) -> Self {
        let landmarks = bbox
            .landmarks
            .map(|points| {
                points
                    .iter()
                    .map(|&(x, y)| Landmark {
                        x: x / frame_width as f32,
                        y: y / frame_height as f32,
                        z: 0.0,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { bbox, landmarks }
    }
}
