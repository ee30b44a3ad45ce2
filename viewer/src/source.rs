use bytes::Bytes;
use reqwest::Url;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use vibenvr_live_common::camera::{frame_path_segments, CameraId, CACHE_BUSTER_PARAM, TOKEN_PARAM};

/// Everything needed to request one frame.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub camera_id: CameraId,
    /// Unix millis; makes every URL unique so no cache can answer it.
    pub cache_buster: i64,
    pub token: Arc<str>,
}

/// Fetches one encoded still frame per call.
pub trait FrameSource: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &FrameRequest,
    ) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid backend URL {0}")]
    InvalidBaseUrl(String),
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// `GET {base}/cameras/{id}/frame?t=..&token=..` against the NVR backend.
pub struct HttpFrameSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpFrameSource {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidBaseUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(FetchError::Http)?;
        Ok(Self { client, base_url })
    }

    pub fn frame_url(&self, request: &FrameRequest) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(frame_path_segments(&request.camera_id));
        url.query_pairs_mut()
            .append_pair(CACHE_BUSTER_PARAM, &request.cache_buster.to_string())
            .append_pair(TOKEN_PARAM, &request.token);
        Ok(url)
    }
}

impl FrameSource for HttpFrameSource {
    async fn fetch(&self, request: &FrameRequest) -> Result<Bytes, FetchError> {
        let url = self.frame_url(request)?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(FetchError::Http)?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await.map_err(FetchError::Http)?;
        debug!(camera = %request.camera_id, bytes = body.len(), "frame received");
        Ok(body)
    }
}
