use serde::{Deserialize, Serialize};
use std::fmt;

/// Query parameter carrying the cache-busting timestamp.
pub const CACHE_BUSTER_PARAM: &str = "t";
/// Query parameter carrying the auth token. Frames are loaded like images,
/// so the credential travels in the URL instead of an `Authorization` header.
pub const TOKEN_PARAM: &str = "token";

/// Opaque camera identifier, as issued by the NVR backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CameraId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A camera as placed in one view. Fixed for the lifetime of its poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraRef {
    pub id: CameraId,
    /// Position in the view; drives the startup stagger.
    pub display_index: usize,
}

impl CameraRef {
    pub fn new(id: impl Into<CameraId>, display_index: usize) -> Self {
        Self {
            id: id.into(),
            display_index,
        }
    }
}

/// Path segments of the single-frame route, `cameras/{id}/frame`.
pub fn frame_path_segments(id: &CameraId) -> [&str; 3] {
    ["cameras", id.as_str(), "frame"]
}

/// Current wall-clock time in Unix millis, used as the `t` cache buster.
pub fn cache_buster() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
