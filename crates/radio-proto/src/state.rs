use crate::protocol::{DaemonState, Station};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::warn;

/// What survives a daemon restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistentState {
    pub last_station: Option<Station>,
    pub volume: u8,
}

impl PersistentState {
    fn with_volume(volume: u8) -> Self {
        Self {
            last_station: None,
            volume,
        }
    }
}

/// Holds the published `DaemonState`.  Only the daemon's event loop writes to
/// it; socket clients read snapshots.
pub struct StateManager {
    state: RwLock<DaemonState>,
    last_station: RwLock<Option<Station>>,
    state_file: PathBuf,
}

impl StateManager {
    /// Load persisted state, using `default_volume` when there is none.
    pub fn new(state_file: PathBuf, default_volume: u8) -> Self {
        let persistent = Self::load_persistent(&state_file)
            .unwrap_or_else(|| PersistentState::with_volume(default_volume));

        let state = DaemonState {
            rev: 1,
            station: None,
            volume: persistent.volume,
            is_playing: false,
            recording: None,
        };

        Self {
            state: RwLock::new(state),
            last_station: RwLock::new(persistent.last_station),
            state_file,
        }
    }

    pub async fn get_state(&self) -> DaemonState {
        self.state.read().await.clone()
    }

    pub async fn last_station(&self) -> Option<Station> {
        self.last_station.read().await.clone()
    }

    /// Replace the published state.  Returns `false` (and leaves `rev` alone)
    /// when nothing changed.
    pub async fn publish(
        &self,
        station: Option<Station>,
        volume: u8,
        recording: Option<PathBuf>,
    ) -> anyhow::Result<bool> {
        {
            let mut state = self.state.write().await;
            let is_playing = station.is_some();
            if state.station == station
                && state.volume == volume
                && state.is_playing == is_playing
                && state.recording == recording
            {
                return Ok(false);
            }
            state.station = station.clone();
            state.volume = volume;
            state.is_playing = is_playing;
            state.recording = recording;
            state.rev += 1;
        }
        if station.is_some() {
            *self.last_station.write().await = station;
        }
        self.save().await?;
        Ok(true)
    }

    async fn save(&self) -> anyhow::Result<()> {
        let persistent = PersistentState {
            last_station: self.last_station.read().await.clone(),
            volume: self.state.read().await.volume,
        };

        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&persistent)?;
        tokio::fs::write(&self.state_file, json).await?;
        Ok(())
    }

    fn load_persistent(state_file: &Path) -> Option<PersistentState> {
        let content = std::fs::read_to_string(state_file).ok()?;
        match serde_json::from_str::<PersistentState>(&content) {
            Ok(persistent) => Some(persistent),
            Err(e) => {
                warn!("Ignoring unreadable state file {:?}: {}", state_file, e);
                None
            }
        }
    }
}
