//! Error types for process supervision and the playback session.

use radio_proto::protocol::FailureKind;
use thiserror::Error;

/// The player/recorder could not be started.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("{program}: executable not found")]
    NotFound { program: String },

    #[error("failed to start {program}: {source}")]
    Os {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// An interrupt could not be delivered.  Never escapes graceful termination;
/// it only triggers the fallback to a hard kill.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("interrupt signals are not supported on this platform")]
    Unsupported,

    #[error("process has already been reaped")]
    NoPid,

    #[error("failed to signal pid {pid}: {reason}")]
    Delivery { pid: u32, reason: String },
}

/// A running process could not be killed.  The caller keeps the handle since
/// the process may still be alive.
#[derive(Error, Debug)]
pub enum KillError {
    #[error("failed to kill {program} (pid {pid:?}): {source}")]
    Kill {
        program: String,
        pid: Option<u32>,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to kill process tree of {program} (pid {pid}): {reason}")]
    Tree {
        program: String,
        pid: u32,
        reason: String,
    },
}

/// Waiting for a killed process failed.  The handle is dropped regardless.
#[derive(Error, Debug)]
#[error("failed to reap {program} (pid {pid:?}): {source}")]
pub struct WaitError {
    pub program: String,
    pub pid: Option<u32>,
    #[source]
    pub source: std::io::Error,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Kill(#[from] KillError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl SessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SessionError::Spawn(_) => FailureKind::Spawn,
            SessionError::Kill(_) => FailureKind::Kill,
            SessionError::Wait(_) => FailureKind::Wait,
            SessionError::InvalidState(_) => FailureKind::InvalidState,
        }
    }
}
