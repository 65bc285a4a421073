//! Session folders: one directory per recording subject under the output root.

use crate::StoreError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Prefix for auto-numbered subject folders ("Person 1", "Person 2", ...).
pub const SUBJECT_PREFIX: &str = "Person ";

/// Create (or reuse) `root/name` for a subject chosen by the user.
///
/// `name` must be a single normal path component; separators and `..`
/// are rejected so a session can never escape `root`.
pub fn open_named(root: &Path, name: &str) -> Result<PathBuf, StoreError> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single {
        return Err(StoreError::InvalidName(name.to_string()));
    }

    let dir = root.join(name);
    fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;
    tracing::info!(dir = %dir.display(), "session folder ready");
    Ok(dir)
}

/// Create `root/<prefix><i>` for the lowest integer `i >= 1` not already
/// taken, and return its path.
///
/// Each candidate is claimed with `create_dir`, which fails if the folder
/// exists, so two recorders racing on the same root get distinct folders.
pub fn allocate_subject(root: &Path, prefix: &str) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(root).map_err(StoreError::io(root))?;

    let mut index: u32 = 1;
    loop {
        let dir = root.join(format!("{prefix}{index}"));
        match fs::create_dir(&dir) {
            Ok(()) => {
                tracing::info!(dir = %dir.display(), index, "allocated subject folder");
                return Ok(dir);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => index += 1,
            Err(e) => return Err(StoreError::io(&dir)(e)),
        }
    }
}
