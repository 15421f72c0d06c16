use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and can refuse to talk to an
/// incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 2;

/// Messages sent from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Play a station at the current target volume.  Any active stream is
    /// stopped first.
    Play { station: Station },
    Stop,
    StartRecording,
    StopRecording,
    ToggleRecording,
    VolumeUp,
    VolumeDown,
    SetVolume { value: u8 },
    GetState,
}

/// Messages sent from the daemon to clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: daemon version + full state snapshot.
    Hello {
        protocol_version: u32,
        state: DaemonState,
    },
    State {
        data: DaemonState,
    },
    Playback {
        event: PlaybackEvent,
    },
    Log {
        message: String,
    },
}

/// Transitions of the playback session, in the order they happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    PlaybackStarted { station: Station, volume: u8 },
    PlaybackStopped,
    RecordingStarted { path: PathBuf },
    RecordingStopped { path: PathBuf },
    OperationFailed { kind: FailureKind, detail: String },
}

/// Category of a failed operation, for display.  All of them are transient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureKind {
    /// The player or recorder binary could not be started.
    Spawn,
    /// A running process could not be killed; the handle is kept.
    Kill,
    /// A killed process could not be reaped; the handle was dropped anyway.
    Wait,
    /// Operation not valid in the current session state.
    InvalidState,
    /// The player exited on its own (stream ended or failed).
    PlayerExited,
    /// The recorder exited on its own.
    RecorderExited,
}

impl FailureKind {
    /// Short label for toasts / status bar.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Spawn => "spawn",
            FailureKind::Kill => "kill",
            FailureKind::Wait => "wait",
            FailureKind::InvalidState => "state",
            FailureKind::PlayerExited => "player",
            FailureKind::RecorderExited => "recorder",
        }
    }
}

/// Snapshot of the daemon.  `rev` is a monotonically increasing counter
/// incremented every time the state changes.  Clients can use it to detect
/// missed updates and request a resync with `GetState`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DaemonState {
    #[serde(default)]
    pub rev: u64,
    /// Station currently playing, if any.
    pub station: Option<Station>,
    /// Target volume (0–100).  While a change is being debounced this is
    /// ahead of the volume the player was started with.
    pub volume: u8,
    pub is_playing: bool,
    /// Output file of the active recording.
    pub recording: Option<PathBuf>,
}

/// A station as supplied by the directory service.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Station {
    /// Directory identifier (stationuuid).
    pub id: String,
    pub name: String,
    pub url: String,
    /// Codec label as reported by the directory, e.g. "MP3" or "AAC+".
    #[serde(default)]
    pub codec: String,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}
