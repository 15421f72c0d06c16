use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// TCP control socket used by UI clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_socket_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// External player (mpv).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlayerConfig {
    /// Explicit path to the player binary.  Looked up beside the exe and on
    /// PATH when unset.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// Extra arguments inserted before the stream URL.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// External recorder (ffmpeg).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecorderConfig {
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// Extra arguments inserted before the output path.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Volume bounds and key-repeat coalescing.  Volumes are percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    #[serde(default = "default_volume")]
    pub default: u8,
    #[serde(default = "default_min_volume")]
    pub min: u8,
    #[serde(default = "default_max_volume")]
    pub max: u8,
    #[serde(default = "default_volume_step")]
    pub step: u8,
    /// Quiescence window before a volume change restarts the player.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// User-configurable paths for recordings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "platform::recordings_dir")]
    pub recordings_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: default_socket_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            default: default_volume(),
            min: default_min_volume(),
            max: default_max_volume(),
            step: default_volume_step(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            recordings_dir: platform::recordings_dir(),
        }
    }
}

impl VolumeConfig {
    /// Bounds with `min <= max` even if the file has them swapped.
    pub fn bounds(&self) -> (u8, u8) {
        if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        }
    }
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_socket_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_volume() -> u8 {
    80
}

fn default_min_volume() -> u8 {
    0
}

fn default_max_volume() -> u8 {
    100
}

fn default_volume_step() -> u8 {
    5
}

fn default_debounce_ms() -> u64 {
    400
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
