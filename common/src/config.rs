use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::CameraId;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Timing knobs for every frame poller.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
    #[serde(default = "default_focused_interval_ms")]
    pub focused_interval_ms: u64,
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Consecutive failures before a camera shows "no signal". 0 never does.
    #[serde(default = "default_no_signal_after")]
    pub no_signal_after: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub id: CameraId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_prefs_path")]
    pub prefs_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub token: Option<String>,
    #[serde(default = "default_frames_dir")]
    pub frames_dir: PathBuf,
    #[serde(default = "default_synthetic")]
    pub synthetic: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            stagger_ms: default_stagger_ms(),
            focused_interval_ms: default_focused_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            no_signal_after: default_no_signal_after(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            prefs_path: default_prefs_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
            frames_dir: default_frames_dir(),
            synthetic: default_synthetic(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PollerConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn focused_interval(&self) -> Duration {
        Duration::from_millis(self.focused_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The configured token, falling back to the `token_env` variable.
    pub fn resolve_token(&self) -> Result<String, ConfigError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        std::env::var(&self.token_env).map_err(|_| ConfigError::MissingToken(self.token_env.clone()))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poller.focused_interval_ms == 0 || self.poller.idle_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll intervals must be non-zero".into()));
        }
        if self.poller.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_ms must be non-zero".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for camera in &self.cameras {
            if camera.id.as_str().is_empty() {
                return Err(ConfigError::Invalid("camera id must not be empty".into()));
            }
            if !seen.insert(camera.id.clone()) {
                return Err(ConfigError::Invalid(format!("duplicate camera id {}", camera.id)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("no backend token configured and ${0} is not set")]
    MissingToken(String),
}

// Default value functions
fn default_token_env() -> String {
    "VIBENVR_TOKEN".into()
}
fn default_connect_timeout_ms() -> u64 {
    3000
}
fn default_stagger_ms() -> u64 {
    150
}
fn default_focused_interval_ms() -> u64 {
    50
}
fn default_idle_interval_ms() -> u64 {
    200
}
fn default_fetch_timeout_ms() -> u64 {
    5000
}
fn default_no_signal_after() -> u32 {
    20
}
fn default_prefs_path() -> PathBuf {
    PathBuf::from("view.toml")
}
fn default_bind() -> String {
    "0.0.0.0:5005".into()
}
fn default_frames_dir() -> PathBuf {
    PathBuf::from("frames")
}
fn default_synthetic() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}
