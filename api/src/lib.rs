//! Development stand-in for the NVR backend's live-frame endpoint.

pub mod error;
pub mod synthetic;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use vibenvr_live_common::camera::CameraId;
use vibenvr_live_common::config::Config;

use error::ApiError;
use synthetic::{render_jpeg, SYNTHETIC_HEIGHT, SYNTHETIC_WIDTH};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    /// Per-camera count of frames served.
    cameras: HashMap<CameraId, AtomicU64>,
    token: Option<String>,
    frames_dir: PathBuf,
    synthetic: bool,
}

impl AppState {
    pub fn new(
        cameras: impl IntoIterator<Item = CameraId>,
        token: Option<String>,
        frames_dir: impl Into<PathBuf>,
        synthetic: bool,
    ) -> Self {
        Self {
            cameras: cameras
                .into_iter()
                .map(|id| (id, AtomicU64::new(0)))
                .collect(),
            token,
            frames_dir: frames_dir.into(),
            synthetic,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.cameras.iter().map(|c| c.id.clone()),
            config.server.token.clone(),
            config.server.frames_dir.clone(),
            config.server.synthetic,
        )
    }

    fn authorize(&self, token: Option<&str>) -> Result<(), ApiError> {
        match &self.token {
            None => Ok(()),
            Some(expected) if token == Some(expected.as_str()) => Ok(()),
            Some(_) => Err(ApiError::Unauthorized),
        }
    }

    pub fn frames_served(&self, camera: &CameraId) -> Option<u64> {
        self.cameras.get(camera).map(|n| n.load(Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FrameQuery {
    /// Cache buster; only logged.
    t: Option<i64>,
    token: Option<String>,
}

/// GET /cameras — configured camera ids
async fn list_cameras(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut ids: Vec<&CameraId> = state.cameras.keys().collect();
    ids.sort();
    Json(ids).into_response()
}

/// GET /cameras/:id/frame?t=&token=
async fn get_frame(
    State(state): State<Arc<AppState>>,
    AxumPath(camera_id): AxumPath<String>,
    Query(q): Query<FrameQuery>,
) -> Result<Response, ApiError> {
    state.authorize(q.token.as_deref())?;

    let id = CameraId::new(camera_id);
    let seq = state
        .cameras
        .get(&id)
        .ok_or_else(|| ApiError::UnknownCamera(id.clone()))?
        .fetch_add(1, Ordering::Relaxed);
    debug!(camera = %id, seq, t = ?q.t, "serving frame");

    let path = state.frames_dir.join(format!("{id}.jpg"));
    let synthetic = state.synthetic;
    let jpeg = tokio::task::spawn_blocking(move || load_frame(&path, synthetic, seq)).await??;

    match jpeg {
        Some(jpeg) => Ok((
            [(CONTENT_TYPE, "image/jpeg"), (CACHE_CONTROL, "no-store")],
            jpeg,
        )
            .into_response()),
        None => Err(ApiError::NoFrame(id)),
    }
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// The camera's snapshot file if present, else a synthetic frame when enabled.
fn load_frame(path: &Path, synthetic: bool, seq: u64) -> Result<Option<Vec<u8>>, ApiError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if synthetic {
                Ok(Some(render_jpeg(seq, SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT)?))
            } else {
                Ok(None)
            }
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cameras", get(list_cameras))
        .route("/cameras/:id/frame", get(get_frame))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, cameras = state.cameras.len(), "frame API listening");
    }
    axum::serve(listener, router(state)).await
}
