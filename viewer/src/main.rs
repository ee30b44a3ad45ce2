use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vibenvr_live_common::camera::CameraId;
use vibenvr_live_common::config::{CameraConfig, Config};
use vibenvr_live_common::prefs::{PreferenceStore, ViewPreferences};
use vibenvr_live_viewer::{
    AuthContext, DecodedFrame, FrameFeed, FrameState, FrameStatus, HttpFrameSource, JpegDecoder,
    LiveWall, Phase, PollerOptions,
};

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("config error: {0}")]
    Config(#[from] vibenvr_live_common::config::ConfigError),
    #[error("preferences error: {0}")]
    Prefs(#[from] vibenvr_live_common::prefs::PrefsError),
    #[error("frame source error: {0}")]
    Source(#[from] vibenvr_live_viewer::FetchError),
    #[error("stdin error: {0}")]
    Stdin(#[from] std::io::Error),
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Focus(CameraId),
    Unfocus,
    /// Move a camera to a zero-based position on the wall.
    Move(CameraId, usize),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["focus", id] => Some(Command::Focus(CameraId::new(*id))),
        ["unfocus"] => Some(Command::Unfocus),
        ["move", id, position] => position
            .parse()
            .ok()
            .map(|position| Command::Move(CameraId::new(*id), position)),
        ["quit" | "exit"] => Some(Command::Quit),
        _ => None,
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        backend = config.backend.base_url,
        cameras = config.cameras.len(),
        focused_ms = config.poller.focused_interval_ms,
        idle_ms = config.poller.idle_interval_ms,
        "starting vibenvr live viewer"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "live viewer failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), ViewerError> {
    let token = config.backend.resolve_token()?;
    let prefs = PreferenceStore::open(&config.view.prefs_path)?;
    if config.cameras.is_empty() {
        warn!("no cameras configured, nothing to show");
    }

    let source = Arc::new(HttpFrameSource::new(
        &config.backend.base_url,
        config.backend.connect_timeout(),
    )?);
    let feed = FrameFeed::new(
        source,
        Arc::new(JpegDecoder::default()),
        AuthContext::fixed(token),
        PollerOptions::from(&config.poller),
    );

    Viewer::new(feed, config.cameras, prefs)
        .run(BufReader::new(tokio::io::stdin()), interrupted())
        .await
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C, stop with quit");
        std::future::pending::<()>().await;
    }
}

type Feed = FrameFeed<HttpFrameSource, JpegDecoder>;

/// The mounted wall and what it takes to rebuild it after a reorder.
struct Viewer {
    feed: Feed,
    cameras: Vec<CameraConfig>,
    prefs: PreferenceStore,
    wall: LiveWall<DecodedFrame>,
}

impl Viewer {
    fn new(feed: Feed, cameras: Vec<CameraConfig>, prefs: PreferenceStore) -> Self {
        let wall = mount_wall(&feed, &cameras, &prefs);
        Self {
            feed,
            cameras,
            prefs,
            wall,
        }
    }

    /// Handle commands from `input` until `quit` or `interrupt` resolves,
    /// then tear the wall down.
    async fn run<R, F>(mut self, input: R, interrupt: F) -> Result<(), ViewerError>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let mut lines = input.lines();
        let mut input_open = true;
        loop {
            tokio::select! {
                _ = &mut interrupt => {
                    info!("interrupted");
                    break;
                }
                line = lines.next_line(), if input_open => {
                    let Some(line) = line? else {
                        debug!("stdin closed, running until interrupted");
                        input_open = false;
                        continue;
                    };
                    match parse_command(&line) {
                        Some(command) => {
                            if !self.apply(command).await {
                                break;
                            }
                        }
                        None if line.trim().is_empty() => {}
                        None => warn!(
                            line,
                            "unknown command, expected: focus <id> | unfocus | move <id> <position> | quit"
                        ),
                    }
                }
            }
        }

        self.wall.shutdown().await;
        Ok(())
    }

    /// Returns false once the session should end.
    async fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Focus(id) => {
                if self.wall.set_focus(Some(&id)) {
                    info!(camera = %id, "focused");
                    self.save(|p| p.focused = Some(id));
                } else {
                    warn!(camera = %id, "no such camera on this wall");
                }
            }
            Command::Unfocus => {
                self.wall.set_focus(None);
                info!("unfocused");
                self.save(|p| p.focused = None);
            }
            Command::Move(id, position) => {
                let ids = camera_ids(&self.cameras);
                let mut known = false;
                let saved = self.save(|p| known = p.move_camera(&ids, &id, position));
                if !known {
                    warn!(camera = %id, "no such camera on this wall");
                } else if saved {
                    info!(camera = %id, position, "camera moved");
                    self.remount().await;
                }
            }
            Command::Quit => return false,
        }
        true
    }

    /// Rebuild the wall in the saved order. The old pollers are torn down
    /// before the new ones are mounted.
    async fn remount(&mut self) {
        self.wall.teardown();
        let wall = mount_wall(&self.feed, &self.cameras, &self.prefs);
        std::mem::replace(&mut self.wall, wall).shutdown().await;
    }

    /// Returns whether the preferences file was written.
    fn save<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&mut ViewPreferences),
    {
        match self.prefs.update(f) {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, "failed to save view preferences");
                false
            }
        }
    }
}

fn camera_ids(cameras: &[CameraConfig]) -> Vec<CameraId> {
    cameras.iter().map(|c| c.id.clone()).collect()
}

fn mount_wall(feed: &Feed, cameras: &[CameraConfig], prefs: &PreferenceStore) -> LiveWall<DecodedFrame> {
    let ids = camera_ids(cameras);
    let wall = LiveWall::mount(feed, prefs.get().arrange(&ids), prefs.get().focused_in(&ids));
    for camera in cameras {
        if let Some(rx) = wall.subscribe(&camera.id) {
            let label = camera.name.clone().unwrap_or_else(|| camera.id.to_string());
            tokio::spawn(log_transitions(label, rx));
        }
    }
    wall
}

/// Log status changes for one camera until its poller stops.
async fn log_transitions(label: String, mut rx: watch::Receiver<FrameState<DecodedFrame>>) {
    let mut last_status = None;
    let mut last_logged_frames = 0;
    while rx.changed().await.is_ok() {
        let (status, phase, frames, size) = {
            let state = rx.borrow_and_update();
            (
                state.status,
                state.phase,
                state.frames_loaded,
                state.image.as_ref().map(|i| (i.width(), i.height())),
            )
        };
        if phase == Phase::Stopped {
            break;
        }
        if last_status != Some(status) {
            match status {
                FrameStatus::Error => warn!(camera = label, "no signal"),
                _ => info!(camera = label, ?status, ?size, "camera status changed"),
            }
            last_status = Some(status);
        }
        if frames >= last_logged_frames + 100 {
            debug!(camera = label, frames, "frames loaded");
            last_logged_frames = frames;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("focus front-door"),
            Some(Command::Focus(CameraId::new("front-door")))
        );
        assert_eq!(parse_command("  unfocus "), Some(Command::Unfocus));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
        assert_eq!(parse_command("exit"), Some(Command::Quit));
        assert_eq!(
            parse_command("move porch 0"),
            Some(Command::Move(CameraId::new("porch"), 0))
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("focus"), None);
        assert_eq!(parse_command("focus a b"), None);
        assert_eq!(parse_command("zoom a"), None);
        assert_eq!(parse_command("move porch"), None);
        assert_eq!(parse_command("move porch -1"), None);
        assert_eq!(parse_command("move porch 1 2"), None);
    }

    fn viewer(dir: &std::path::Path, cameras: &[&str]) -> Viewer {
        // Nothing listens here; pollers fail silently for the whole test.
        let source = HttpFrameSource::new("http://127.0.0.1:1", Duration::from_millis(100)).unwrap();
        let feed = FrameFeed::new(
            Arc::new(source),
            Arc::new(JpegDecoder::default()),
            AuthContext::fixed("tok"),
            PollerOptions::default(),
        );
        let cameras = cameras
            .iter()
            .map(|id| CameraConfig {
                id: CameraId::new(*id),
                name: None,
            })
            .collect();
        let prefs = PreferenceStore::open(dir.join("view.toml")).unwrap();
        Viewer::new(feed, cameras, prefs)
    }

    fn ids(raw: &[&str]) -> Vec<CameraId> {
        raw.iter().map(|s| CameraId::new(*s)).collect()
    }

    #[tokio::test]
    async fn move_saves_order_and_remounts() {
        let dir = tempfile::tempdir().unwrap();
        let mut viewer = viewer(dir.path(), &["a", "b", "c"]);

        assert!(viewer.apply(Command::Focus(CameraId::new("b"))).await);
        assert!(viewer.apply(Command::Move(CameraId::new("c"), 0)).await);

        let mounted: Vec<(String, usize)> = viewer
            .wall
            .cameras()
            .map(|c| (c.id.to_string(), c.display_index))
            .collect();
        assert_eq!(
            mounted,
            vec![("c".to_string(), 0), ("a".to_string(), 1), ("b".to_string(), 2)]
        );
        assert_eq!(viewer.wall.focused(), Some(&CameraId::new("b")));

        let saved = PreferenceStore::open(dir.path().join("view.toml")).unwrap();
        assert_eq!(saved.get().order, ids(&["c", "a", "b"]));
        assert_eq!(saved.get().focused, Some(CameraId::new("b")));

        assert!(!viewer.apply(Command::Quit).await);
        viewer.wall.shutdown().await;
    }

    #[tokio::test]
    async fn moving_unknown_camera_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut viewer = viewer(dir.path(), &["a", "b"]);

        assert!(viewer.apply(Command::Move(CameraId::new("x"), 0)).await);
        assert!(viewer.prefs.get().order.is_empty());
        assert!(!dir.path().join("view.toml").exists());
        assert_eq!(viewer.wall.len(), 2);
        viewer.wall.shutdown().await;
    }

    #[tokio::test]
    async fn interrupt_ends_session_while_input_stays_open() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = viewer(dir.path(), &["a"]);
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"focus a\n").await.unwrap();
        let (interrupt_tx, interrupt_rx) = oneshot::channel::<()>();

        let session = viewer.run(BufReader::new(reader), async move {
            let _ = interrupt_rx.await;
        });
        let interrupter = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupt_tx.send(()).unwrap();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(session, interrupter)
        })
        .await
        .expect("session did not stop on interrupt");
        assert!(result.is_ok());

        let saved = PreferenceStore::open(dir.path().join("view.toml")).unwrap();
        assert_eq!(saved.get().focused, Some(CameraId::new("a")));
        drop(writer);
    }

    #[tokio::test]
    async fn quit_command_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = viewer(dir.path(), &["a"]);
        let input: &[u8] = b"\nbogus\nquit\n";

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            viewer.run(BufReader::new(input), std::future::pending()),
        )
        .await
        .expect("session did not stop on quit");
        assert!(result.is_ok());
    }
}
