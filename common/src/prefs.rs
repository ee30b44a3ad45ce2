//! Persisted view preferences: which camera is focused and the order cameras
//! appear in.
//!
//! Loaded once at startup and handed to the view by reference. Every change
//! goes through [`PreferenceStore::update`], which writes the file only when
//! the value actually changed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::camera::{CameraId, CameraRef};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewPreferences {
    #[serde(default)]
    pub focused: Option<CameraId>,
    #[serde(default)]
    pub order: Vec<CameraId>,
}

impl ViewPreferences {
    /// Place `cameras` in the stored order. Cameras missing from the stored
    /// order keep their relative order and go last; stale entries are ignored.
    pub fn arrange(&self, cameras: &[CameraId]) -> Vec<CameraRef> {
        let mut ordered: Vec<&CameraId> = Vec::with_capacity(cameras.len());
        for id in self.order.iter().chain(cameras) {
            if cameras.contains(id) && !ordered.contains(&id) {
                ordered.push(id);
            }
        }
        ordered
            .into_iter()
            .enumerate()
            .map(|(display_index, id)| CameraRef::new(id.clone(), display_index))
            .collect()
    }

    /// Move `camera` to `position` among `cameras` (clamped to the end) and
    /// store the resulting full order. Returns false if `camera` is unknown.
    pub fn move_camera(&mut self, cameras: &[CameraId], camera: &CameraId, position: usize) -> bool {
        if !cameras.contains(camera) {
            return false;
        }
        let mut order: Vec<CameraId> = self
            .arrange(cameras)
            .into_iter()
            .map(|c| c.id)
            .filter(|id| id != camera)
            .collect();
        order.insert(position.min(order.len()), camera.clone());
        self.order = order;
        true
    }

    /// The focused camera, if it is one of `cameras`.
    pub fn focused_in<'a>(&self, cameras: &'a [CameraId]) -> Option<&'a CameraId> {
        let focused = self.focused.as_ref()?;
        cameras.iter().find(|id| *id == focused)
    }
}

pub struct PreferenceStore {
    path: PathBuf,
    prefs: ViewPreferences,
}

impl PreferenceStore {
    /// Load preferences from `path`. A missing file yields the defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PrefsError> {
        let path = path.into();
        let prefs = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| PrefsError::Parse(path.display().to_string(), e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no saved view preferences, using defaults");
                ViewPreferences::default()
            }
            Err(e) => return Err(PrefsError::Io(path.display().to_string(), e)),
        };
        Ok(Self { path, prefs })
    }

    pub fn get(&self) -> &ViewPreferences {
        &self.prefs
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` and persist the result if anything changed.
    /// Returns whether the file was written.
    pub fn update<F>(&mut self, f: F) -> Result<bool, PrefsError>
    where
        F: FnOnce(&mut ViewPreferences),
    {
        let mut next = self.prefs.clone();
        f(&mut next);
        if next == self.prefs {
            return Ok(false);
        }
        save(&self.path, &next)?;
        self.prefs = next;
        info!(path = %self.path.display(), "view preferences saved");
        Ok(true)
    }
}

fn save(path: &Path, prefs: &ViewPreferences) -> Result<(), PrefsError> {
    let io_err = |e| PrefsError::Io(path.display().to_string(), e);
    let content = toml::to_string_pretty(prefs).map_err(|e| PrefsError::Serialize(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    // Write then rename so a crash never leaves a half-written file behind.
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("failed to access preferences file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("failed to parse preferences file {0}: {1}")]
    Parse(String, String),
    #[error("failed to serialize preferences: {0}")]
    Serialize(String),
}
