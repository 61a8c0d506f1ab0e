//! File-backed brightness snapshot persistence.
//!
//! Keeps the pre-session backlight configuration on disk while a
//! session is active, so an interrupted process can still roll it back
//! on next launch via [`BrightnessController::recover`](crate::BrightnessController::recover).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::brightness::BrightnessSnapshot;
use crate::error::VeilError;
use crate::host::SnapshotStore;

/// [`SnapshotStore`] writing one JSON document.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    /// Written to a sibling temp file first, then renamed over the target.
    fn save(&self, snapshot: &BrightnessSnapshot) -> Result<(), VeilError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<BrightnessSnapshot>, VeilError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), VeilError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
