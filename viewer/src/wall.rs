use tokio::sync::watch;
use tracing::info;
use vibenvr_live_common::camera::{CameraId, CameraRef};

use crate::decode::FrameDecoder;
use crate::poller::{FrameFeed, FrameState, PollerHandle};
use crate::source::FrameSource;

struct Tile<I> {
    handle: PollerHandle<I>,
    focus: watch::Sender<bool>,
}

/// All live camera tiles of one view. At most one tile is focused.
pub struct LiveWall<I> {
    tiles: Vec<Tile<I>>,
}

impl<I> LiveWall<I>
where
    I: Send + Sync + 'static,
{
    /// Mount one poller per camera. Each camera's `display_index` sets its
    /// start stagger.
    pub fn mount<S, D>(feed: &FrameFeed<S, D>, cameras: Vec<CameraRef>, focused: Option<&CameraId>) -> Self
    where
        S: FrameSource,
        D: FrameDecoder<Image = I>,
    {
        let tiles = cameras
            .into_iter()
            .map(|camera| {
                let (focus, focus_rx) = watch::channel(Some(&camera.id) == focused);
                let handle = feed.mount(camera, focus_rx);
                Tile { handle, focus }
            })
            .collect::<Vec<_>>();
        info!(cameras = tiles.len(), "live wall mounted");
        Self { tiles }
    }

    pub fn cameras(&self) -> impl Iterator<Item = &CameraRef> {
        self.tiles.iter().map(|tile| tile.handle.camera())
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn focused(&self) -> Option<&CameraId> {
        self.tiles
            .iter()
            .find(|tile| *tile.focus.borrow())
            .map(|tile| &tile.handle.camera().id)
    }

    /// Focus `camera`, or nothing with `None`. Returns false, changing
    /// nothing, if `camera` is not on this wall.
    pub fn set_focus(&self, camera: Option<&CameraId>) -> bool {
        if let Some(id) = camera {
            if self.tile(id).is_none() {
                return false;
            }
        }
        for tile in &self.tiles {
            let next = Some(&tile.handle.camera().id) == camera;
            tile.focus.send_if_modified(|focused| {
                let changed = *focused != next;
                *focused = next;
                changed
            });
        }
        true
    }

    pub fn subscribe(&self, camera: &CameraId) -> Option<watch::Receiver<FrameState<I>>> {
        self.tile(camera).map(|tile| tile.handle.subscribe())
    }

    pub fn handle(&self, camera: &CameraId) -> Option<&PollerHandle<I>> {
        self.tile(camera).map(|tile| &tile.handle)
    }

    pub fn teardown(&self) {
        for tile in &self.tiles {
            tile.handle.teardown();
        }
    }

    /// Tear every poller down and wait for all of them to exit.
    pub async fn shutdown(self) {
        self.teardown();
        for tile in self.tiles {
            tile.handle.shutdown().await;
        }
        info!("live wall stopped");
    }

    fn tile(&self, camera: &CameraId) -> Option<&Tile<I>> {
        self.tiles
            .iter()
            .find(|tile| &tile.handle.camera().id == camera)
    }
}
