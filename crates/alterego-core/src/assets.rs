//! Model asset resolution: use the on-disk file if present, otherwise
//! fetch it once into the model directory.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const YUNET_MODEL_NAME: &str = "face_detection_yunet_2023mar.onnx";
pub const YUNET_MODEL_URL: &str =
    "https://github.com/opencv/opencv_zoo/raw/main/models/face_detection_yunet/face_detection_yunet_2023mar.onnx";
pub const MESH_MODEL_NAME: &str = "face_landmark.onnx";

#[derive(Error, Debug)]
pub enum ModelAssetError {
    #[error("model {path} not found and no download URL configured")]
    Missing { path: PathBuf },
    #[error("failed to create model directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Return the path of `name` inside `model_dir`, downloading it from `url`
/// first if it does not exist yet.
pub fn ensure(model_dir: &Path, name: &str, url: Option<&str>) -> Result<PathBuf, ModelAssetError> {
    let path = model_dir.join(name);
    if path.is_file() {
        tracing::debug!(path = %path.display(), "model present");
        return Ok(path);
    }

    let Some(url) = url else {
        return Err(ModelAssetError::Missing { path });
    };

    fs::create_dir_all(model_dir).map_err(|source| ModelAssetError::CreateDir {
        path: model_dir.to_path_buf(),
        source,
    })?;

    tracing::info!(url, path = %path.display(), "model not found, downloading");
    download(url, &path)?;
    tracing::info!(path = %path.display(), "download complete");

    Ok(path)
}

/// Fetch `url` into `dest` via a `.part` file renamed into place, so an
/// interrupted download never leaves a truncated model behind.
fn download(url: &str, dest: &Path) -> Result<(), ModelAssetError> {
    let download_err = |source| ModelAssetError::Download {
        url: url.to_string(),
        source,
    };

    let bytes = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(download_err)?;

    let temp_path = dest.with_extension("part");
    let written = fs::write(&temp_path, &bytes).and_then(|()| fs::rename(&temp_path, dest));
    if let Err(source) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(ModelAssetError::Write {
            path: dest.to_path_buf(),
            source,
        });
    }

    Ok(())
}
