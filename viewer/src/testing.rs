//! Scripted frame source and drop-counting decoder for poller tests.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::decode::{DecodeError, FrameDecoder};
use crate::source::{FetchError, FrameRequest, FrameSource};

#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Respond with a frame after the given latency.
    Ok(Duration),
    /// Respond with HTTP 503 after the given latency.
    Fail(Duration),
    /// Never respond.
    Hang,
}

#[derive(Debug, Clone)]
pub struct FetchRecord {
    pub camera: String,
    pub token: String,
    pub started: Instant,
    /// `None` while in flight, or forever if the fetch was cancelled.
    pub finished: Option<Instant>,
}

pub struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    per_camera: HashMap<String, Step>,
    fetches: Mutex<Vec<FetchRecord>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(fallback: Step) -> Self {
        Self::with_script(Vec::new(), fallback)
    }

    /// Play `script` in order, then `fallback` forever.
    pub fn with_script(script: Vec<Step>, fallback: Step) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            per_camera: HashMap::new(),
            fetches: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always answer `camera` with `step`, bypassing the script.
    pub fn with_camera(mut self, camera: &str, step: Step) -> Self {
        self.per_camera.insert(camera.to_string(), step);
        self
    }

    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetches_for(&self, camera: &str) -> Vec<FetchRecord> {
        self.fetches()
            .into_iter()
            .filter(|f| f.camera == camera)
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, camera: &str) -> Step {
        if let Some(step) = self.per_camera.get(camera) {
            return *step;
        }
        self.script.lock().unwrap().pop_front().unwrap_or(self.fallback)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(source: &'a ScriptedSource) -> Self {
        let now = source.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        source.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(&source.in_flight)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FrameSource for ScriptedSource {
    async fn fetch(&self, request: &FrameRequest) -> Result<Bytes, FetchError> {
        let step = self.next_step(request.camera_id.as_str());
        let index = {
            let mut fetches = self.fetches.lock().unwrap();
            fetches.push(FetchRecord {
                camera: request.camera_id.to_string(),
                token: request.token.to_string(),
                started: Instant::now(),
                finished: None,
            });
            fetches.len() - 1
        };
        let _guard = InFlight::enter(self);

        let result = match step {
            Step::Ok(latency) => {
                tokio::time::sleep(latency).await;
                Ok(Bytes::from_static(b"frame"))
            }
            Step::Fail(latency) => {
                tokio::time::sleep(latency).await;
                Err(FetchError::Status(503))
            }
            Step::Hang => std::future::pending().await,
        };
        self.fetches.lock().unwrap()[index].finished = Some(Instant::now());
        result
    }
}

/// Decoder whose images count themselves, so tests can see exactly how many
/// display resources are alive.
#[derive(Default)]
pub struct CountingDecoder {
    live: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    decoded: AtomicUsize,
    pub rejected: AtomicUsize,
    reject: bool,
}

pub struct Tracked {
    live: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl CountingDecoder {
    /// A decoder that fails on every payload.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn decoded(&self) -> usize {
        self.decoded.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl FrameDecoder for CountingDecoder {
    type Image = Tracked;

    fn decode(&self, _data: &[u8]) -> Result<Tracked, DecodeError> {
        if self.reject {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(DecodeError::Empty);
        }
        self.decoded.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Tracked {
            live: Arc::clone(&self.live),
            released: Arc::clone(&self.released),
        })
    }
}

/// Paused-clock timings land on exact millisecond ticks; allow a little slack.
pub fn assert_near(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(2),
        "expected ~{expected:?}, got {actual:?}"
    );
}
