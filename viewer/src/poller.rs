//! Per-camera live frame polling.
//!
//! Each mounted camera runs one [`FramePoller`] task that fetches a single
//! still frame, decodes it, swaps it in as the current image, and only then
//! waits for the next cycle. The wait is 50 ms while the camera is focused and
//! 200 ms otherwise, so a slow backend never sees overlapping requests from
//! the same view. Start times are staggered by display position to keep a
//! freshly opened wall from firing every request in the same tick.
//!
//! Teardown flips the `mounted` flag, which cancels whatever the task is
//! awaiting (in-flight request or pending delay) and releases the current
//! image. Results that race teardown are discarded under the state lock.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vibenvr_live_common::camera::{cache_buster, CameraRef};
use vibenvr_live_common::config::PollerConfig;

use crate::auth::AuthContext;
use crate::decode::{DecodeError, FrameDecoder};
use crate::source::{FetchError, FrameRequest, FrameSource};

#[derive(Debug, Clone)]
pub struct PollerOptions {
    /// Start delay per display position.
    pub stagger: Duration,
    /// Delay after a settled fetch while the camera is focused.
    pub focused_interval: Duration,
    /// Delay after a settled fetch otherwise.
    pub idle_interval: Duration,
    pub fetch_timeout: Duration,
    /// Consecutive failures before the status turns into `Error`. 0 never does.
    pub no_signal_after: u32,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self::from(&PollerConfig::default())
    }
}

impl From<&PollerConfig> for PollerOptions {
    fn from(config: &PollerConfig) -> Self {
        Self {
            stagger: config.stagger(),
            focused_interval: config.focused_interval(),
            idle_interval: config.idle_interval(),
            fetch_timeout: config.fetch_timeout(),
            no_signal_after: config.no_signal_after,
        }
    }
}

impl PollerOptions {
    pub fn start_delay(&self, display_index: usize) -> Duration {
        let index = u32::try_from(display_index).unwrap_or(u32::MAX);
        self.stagger.saturating_mul(index)
    }

    pub fn cadence(&self, focused: bool) -> Duration {
        if focused {
            self.focused_interval
        } else {
            self.idle_interval
        }
    }
}

/// What a view should render for a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// No frame to show yet, or the poller was torn down; show a spinner.
    Loading,
    /// `image` holds the latest frame.
    Loaded,
    /// Too many consecutive failures; show the "no signal" placeholder.
    Error,
}

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Loaded,
    FailedSilent,
    Stopped,
}

#[derive(Debug)]
pub struct FrameState<I> {
    pub status: FrameStatus,
    pub phase: Phase,
    /// The one live display resource. Replacing it drops the previous frame.
    pub image: Option<I>,
    pub frames_loaded: u64,
    pub consecutive_failures: u32,
}

impl<I> FrameState<I> {
    fn new() -> Self {
        Self {
            status: FrameStatus::Loading,
            phase: Phase::Idle,
            image: None,
            frames_loaded: 0,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("decode task failed: {0}")]
    DecodeTask(#[from] tokio::task::JoinError),
}

/// Shared dependencies for every poller of one view.
pub struct FrameFeed<S, D> {
    source: Arc<S>,
    decoder: Arc<D>,
    auth: AuthContext,
    options: PollerOptions,
}

impl<S, D> Clone for FrameFeed<S, D> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            decoder: Arc::clone(&self.decoder),
            auth: self.auth.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S, D> FrameFeed<S, D>
where
    S: FrameSource,
    D: FrameDecoder,
{
    pub fn new(source: Arc<S>, decoder: Arc<D>, auth: AuthContext, options: PollerOptions) -> Self {
        Self {
            source,
            decoder,
            auth,
            options,
        }
    }

    pub fn options(&self) -> &PollerOptions {
        &self.options
    }

    /// Start polling `camera`. `focused` is read again before every delay,
    /// so flipping it changes the cadence from the next cycle on.
    pub fn mount(&self, camera: CameraRef, focused: watch::Receiver<bool>) -> PollerHandle<D::Image> {
        let (mounted_tx, mounted_rx) = watch::channel(true);
        let state = Arc::new(watch::Sender::new(FrameState::new()));

        let poller = FramePoller {
            camera: camera.clone(),
            source: Arc::clone(&self.source),
            decoder: Arc::clone(&self.decoder),
            auth: self.auth.clone(),
            options: self.options.clone(),
            focused,
            mounted: mounted_rx,
            state: Arc::clone(&state),
        };
        debug!(camera = %camera.id, index = camera.display_index, "mounting frame poller");
        let task = tokio::spawn(poller.run());

        PollerHandle {
            camera,
            mounted: mounted_tx,
            state,
            task: Some(task),
        }
    }
}

/// The poll loop for one camera. Owned by its task.
pub struct FramePoller<S, D: FrameDecoder> {
    camera: CameraRef,
    source: Arc<S>,
    decoder: Arc<D>,
    auth: AuthContext,
    options: PollerOptions,
    focused: watch::Receiver<bool>,
    mounted: watch::Receiver<bool>,
    state: Arc<watch::Sender<FrameState<D::Image>>>,
}

impl<S, D> FramePoller<S, D>
where
    S: FrameSource,
    D: FrameDecoder,
{
    async fn run(mut self) {
        let start_delay = self.options.start_delay(self.camera.display_index);
        tokio::select! {
            biased;
            _ = unmounted(&mut self.mounted) => return,
            _ = tokio::time::sleep(start_delay) => {}
        }

        let mut seq: u64 = 0;
        loop {
            if !self.update(|state| {
                state.phase = Phase::Loading;
                true
            }) {
                return;
            }

            let request = FrameRequest {
                camera_id: self.camera.id.clone(),
                cache_buster: cache_buster(),
                token: self.auth.token(),
            };
            let fetched = tokio::select! {
                biased;
                _ = unmounted(&mut self.mounted) => return,
                fetched = fetch_frame(&*self.source, &request, self.options.fetch_timeout) => fetched,
            };

            // Decode on the blocking pool.
            let decoded = match fetched {
                Ok(body) => {
                    let decoder = Arc::clone(&self.decoder);
                    let decoding = tokio::task::spawn_blocking(move || decoder.decode(&body));
                    tokio::select! {
                        biased;
                        _ = unmounted(&mut self.mounted) => return,
                        joined = decoding => joined
                            .map_err(PollError::from)
                            .and_then(|r| r.map_err(PollError::from)),
                    }
                }
                Err(e) => Err(PollError::from(e)),
            };
            if !self.settle(seq, decoded) {
                return;
            }
            seq += 1;

            let focused = *self.focused.borrow();
            let cadence = self.options.cadence(focused);
            tokio::select! {
                biased;
                _ = unmounted(&mut self.mounted) => return,
                _ = tokio::time::sleep(cadence) => {}
            }
        }
    }

    /// Mutate the state only while still mounted. The flag is read under the
    /// state lock, so teardown and a late result can never interleave.
    fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut FrameState<D::Image>) -> bool,
    {
        let mut mounted = true;
        self.state.send_if_modified(|state| {
            if !*self.mounted.borrow() {
                mounted = false;
                return false;
            }
            f(state)
        });
        mounted
    }

    /// Record the outcome of one fetch. Returns false once torn down.
    fn settle(&self, seq: u64, outcome: Result<D::Image, PollError>) -> bool {
        let camera = &self.camera.id;
        let no_signal_after = self.options.no_signal_after;
        self.update(|state| {
            match outcome {
                Ok(image) => {
                    if state.status == FrameStatus::Error {
                        info!(
                            camera = %camera,
                            failures = state.consecutive_failures,
                            "camera signal restored"
                        );
                    }
                    // Assigning drops the previous frame before the lock is released.
                    state.image = Some(image);
                    state.status = FrameStatus::Loaded;
                    state.phase = Phase::Loaded;
                    state.frames_loaded += 1;
                    state.consecutive_failures = 0;
                    debug!(camera = %camera, seq, "frame loaded");
                }
                Err(e) => {
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    state.phase = Phase::FailedSilent;
                    debug!(
                        camera = %camera,
                        seq,
                        failures = state.consecutive_failures,
                        error = %e,
                        "frame fetch failed"
                    );
                    if no_signal_after > 0
                        && state.consecutive_failures >= no_signal_after
                        && state.status != FrameStatus::Error
                    {
                        warn!(
                            camera = %camera,
                            failures = state.consecutive_failures,
                            error = %e,
                            "camera has no signal"
                        );
                        state.status = FrameStatus::Error;
                        state.image = None;
                    }
                }
            }
            true
        })
    }
}

async fn fetch_frame<S: FrameSource>(
    source: &S,
    request: &FrameRequest,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    match tokio::time::timeout(timeout, source.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

/// Resolves once the handle has torn the poller down (or vanished).
async fn unmounted(mounted: &mut watch::Receiver<bool>) {
    let _ = mounted.wait_for(|mounted| !*mounted).await;
}

/// Owner-side handle of a mounted poller. Dropping it tears the poller down.
pub struct PollerHandle<I> {
    camera: CameraRef,
    mounted: watch::Sender<bool>,
    state: Arc<watch::Sender<FrameState<I>>>,
    task: Option<JoinHandle<()>>,
}

impl<I> PollerHandle<I> {
    pub fn camera(&self) -> &CameraRef {
        &self.camera
    }

    pub fn is_mounted(&self) -> bool {
        *self.mounted.borrow()
    }

    /// Receiver for rendering; woken on every state change.
    pub fn subscribe(&self) -> watch::Receiver<FrameState<I>> {
        self.state.subscribe()
    }

    /// Borrow the current state. Do not hold across an await.
    pub fn state(&self) -> watch::Ref<'_, FrameState<I>> {
        self.state.borrow()
    }

    /// Stop polling and release the current frame. Safe to call repeatedly.
    pub fn teardown(&self) {
        if !self.mounted.send_replace(false) {
            return;
        }
        self.state.send_modify(|state| {
            state.image = None;
            state.status = FrameStatus::Loading;
            state.phase = Phase::Stopped;
        });
        debug!(camera = %self.camera.id, "frame poller torn down");
    }

    /// Tear down and wait for the poll task to exit.
    pub async fn shutdown(mut self) {
        self.teardown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(camera = %self.camera.id, error = %e, "frame poller task failed");
            }
        }
    }
}

impl<I> Drop for PollerHandle<I> {
    fn drop(&mut self) {
        self.teardown();
    }
}
