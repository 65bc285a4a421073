//! Captured frames and conversion of raw camera buffers to packed RGB.

use image::RgbImage;

/// One RGB frame from the camera.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB8, row-major, `width * height * 3` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Driver buffer sequence number.
    pub sequence: u32,
}

impl Frame {
    /// Wrap packed RGB data.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
        }
    }
}

/// Convert packed YUYV (4:2:2) to RGB using the BT.601 integer transform.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U and V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let packed = exact_prefix(yuyv, width as usize * height as usize * 2)?;

    let mut rgb = Vec::with_capacity(packed.len() / 2 * 3);
    for chunk in packed.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clip = |x: i32| x.clamp(0, 255) as u8;
    [
        clip((298 * c + 409 * e + 128) >> 8),
        clip((298 * c - 100 * d - 208 * e + 128) >> 8),
        clip((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Expand 8-bit grayscale to RGB by replicating the channel.
pub fn grey_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let luma = exact_prefix(gray, width as usize * height as usize)?;
    Ok(luma.iter().flat_map(|&p| [p, p, p]).collect())
}

/// The first `len` bytes of a driver buffer, which may carry trailing padding.
fn exact_prefix(buf: &[u8], len: usize) -> Result<&[u8], FrameError> {
    buf.get(..len).ok_or(FrameError::ShortBuffer {
        expected: len,
        actual: buf.len(),
    })
}

/// Decode a Motion-JPEG buffer into an RGB image.
pub fn mjpg_to_rgb(jpeg: &[u8]) -> Result<RgbImage, FrameError> {
    let decoded = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)?;
    Ok(decoded.to_rgb8())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("buffer holds {actual} bytes, frame needs {expected}")]
    ShortBuffer { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_black_and_white() {
        // 2x1 image: black pixel then white pixel, neutral chroma
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_mid_gray() {
        let yuyv = vec![126, 128, 126, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![128; 6]);
    }

    #[test]
    fn test_yuyv_red_chroma_dominates() {
        // High V pushes red up and green down
        let yuyv = vec![82, 90, 82, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb[0] > 200, "red channel {}", rgb[0]);
        assert!(rgb[1] < 50, "green channel {}", rgb[1]);
    }

    #[test]
    fn test_yuyv_short_buffer() {
        let err = yuyv_to_rgb(&[100, 128], 2, 1).unwrap_err();
        assert!(matches!(err, FrameError::ShortBuffer { expected: 4, actual: 2 }));
    }

    #[test]
    fn test_yuyv_ignores_trailing_padding() {
        let rgb = yuyv_to_rgb(&[16, 128, 16, 128, 0xAA, 0xAA], 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
    }

    #[test]
    fn test_grey_to_rgb_replicates() {
        let rgb = grey_to_rgb(&[7, 200], 2, 1).unwrap();
        assert_eq!(rgb, vec![7, 7, 7, 200, 200, 200]);
    }

    #[test]
    fn test_grey_to_rgb_short_buffer() {
        assert!(grey_to_rgb(&[1, 2, 3], 2, 2).is_err());
    }

    #[test]
    fn test_mjpg_decode_roundtrip_dimensions() {
        let img = RgbImage::from_pixel(8, 4, Rgb([10, 20, 30]));
        let mut jpeg = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let decoded = mjpg_to_rgb(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (8, 4));
    }

    #[test]
    fn test_mjpg_garbage_is_error() {
        assert!(mjpg_to_rgb(&[0, 1, 2, 3]).is_err());
    }
}
