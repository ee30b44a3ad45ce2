use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;
use vibenvr_live_common::camera::CameraId;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or invalid token")]
    Unauthorized,
    #[error("unknown camera {0}")]
    UnknownCamera(CameraId),
    #[error("camera {0} has no frame available")]
    NoFrame(CameraId),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to read frame: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::UnknownCamera(_) => StatusCode::NOT_FOUND,
            ApiError::NoFrame(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Encode(_) | ApiError::Io(_) | ApiError::Join(_) => {
                error!(error = %self, "frame request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}
