//! Append-only landmark log in JSON-lines form.
//!
//! Every record is one line written with a single `write_all` on a file
//! opened in append mode; earlier records are never rewritten. A line torn
//! by a crash is skipped when the log is read back.

use crate::StoreError;
use alterego_core::Landmark;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Per-subject landmark log written by `record_landmarks`.
pub const LANDMARK_LOG_NAME: &str = "face_data.jsonl";
/// Log written by the timed `detect` run.
pub const DETECT_LOG_NAME: &str = "output.jsonl";

/// One saved face: capture time, face index within the frame, landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub face: usize,
    pub landmarks: Vec<Landmark>,
}

pub struct LandmarkLog {
    path: PathBuf,
    file: File,
}

impl LandmarkLog {
    /// Open (creating if needed) the log at `path` for appending.
    ///
    /// If the previous run died mid-line, a newline is written first so the
    /// torn fragment stays on its own line.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(StoreError::io(&path))?;

        if ends_mid_line(&mut file).map_err(StoreError::io(&path))? {
            tracing::warn!(path = %path.display(), "landmark log ends with a torn record");
            file.write_all(b"\n").map_err(StoreError::io(&path))?;
        }

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line and flush it.
    pub fn append(&mut self, record: &LandmarkRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|()| self.file.flush())
            .map_err(StoreError::io(&self.path))?;
        tracing::debug!(
            path = %self.path.display(),
            face = record.face,
            landmarks = record.landmarks.len(),
            "appended landmark record"
        );
        Ok(())
    }
}

fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Read every complete record from a log, in write order.
///
/// Lines that do not parse (torn writes) are skipped with a warning.
/// A missing file reads as an empty log.
pub fn read_all(path: &Path) -> Result<Vec<LandmarkRecord>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path)(e)),
    };

    let mut records = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = lineno + 1,
                error = %e,
                "skipping unreadable landmark record"
            ),
        }
    }
    Ok(records)
}
