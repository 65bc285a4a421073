//! Per-face persistence: a JPEG crop plus a one-line CSV with its box.

use crate::StoreError;
use alterego_core::PixelBox;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Paths written for one saved face.
#[derive(Debug, Clone)]
pub struct SavedFace {
    pub image_path: PathBuf,
    pub coords_path: PathBuf,
    pub region: PixelBox,
}

/// Writes face crops for one subject into its session folder.
pub struct FaceWriter {
    dir: PathBuf,
    subject: String,
}

impl FaceWriter {
    pub fn new(dir: impl Into<PathBuf>, subject: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            subject: subject.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Crop `region` out of a packed RGB frame and write
    /// `face_<subject>_<uuid>_face.jpg` and `face_<subject>_<uuid>.csv`.
    pub fn save(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
        region: PixelBox,
    ) -> Result<SavedFace, StoreError> {
        let crop = region
            .crop(rgb, width, height)
            .ok_or(StoreError::Crop(region))?;

        let stem = format!("face_{}_{}", self.subject, Uuid::new_v4());
        let image_path = self.dir.join(format!("{stem}_face.jpg"));
        let coords_path = self.dir.join(format!("{stem}.csv"));

        crop.save(&image_path).map_err(|source| StoreError::Image {
            path: image_path.clone(),
            source,
        })?;

        let row = format!("{},{},{},{}\n", region.x, region.y, region.width, region.height);
        fs::write(&coords_path, row).map_err(StoreError::io(&coords_path))?;

        tracing::debug!(
            image = %image_path.display(),
            x = region.x,
            y = region.y,
            w = region.width,
            h = region.height,
            "saved face"
        );

        Ok(SavedFace {
            image_path,
            coords_path,
            region,
        })
    }
}

/// Parse a coordinate file written by [`FaceWriter::save`].
pub fn read_coords(path: &Path) -> Result<PixelBox, StoreError> {
    let text = fs::read_to_string(path).map_err(StoreError::io(path))?;
    let malformed = || StoreError::MalformedCoords {
        path: path.to_path_buf(),
    };

    let values = text
        .trim()
        .split(',')
        .map(|v| v.trim().parse::<u32>().map_err(|_| malformed()))
        .collect::<Result<Vec<_>, _>>()?;

    match values.as_slice() {
        &[x, y, width, height] => Ok(PixelBox {
            x,
            y,
            width,
            height,
        }),
        _ => Err(malformed()),
    }
}
