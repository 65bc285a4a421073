//! alterego-store: Flat-file persistence for recorded faces.
//!
//! One folder per recording subject, holding JPEG face crops with sibling
//! CSV box files, or an append-only JSON-lines landmark log.

pub mod face_writer;
pub mod landmark_log;
pub mod session;

use alterego_core::PixelBox;
use std::path::PathBuf;
use thiserror::Error;

pub use face_writer::{FaceWriter, SavedFace};
pub use landmark_log::{LandmarkLog, LandmarkRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("face region {0:?} does not fit the frame")]
    Crop(PixelBox),
    #[error("invalid folder name {0:?}: must be a single path component")]
    InvalidName(String),
    #[error("malformed coordinate file {path}")]
    MalformedCoords { path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
