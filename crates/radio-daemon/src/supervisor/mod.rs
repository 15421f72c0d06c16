/// Process supervision for the player and recorder.
///
/// `ProcessSupervisor` is the only place that knows how processes are started
/// and stopped on each platform:
///
/// ```text
///   spawn ──► handle ──► force_kill / terminate_gracefully ──► reap
///                   └──► try_reap   (liveness poll, non-blocking)
/// ```
///
/// A handle is only gone after `reap` (or a `try_reap` that reported an
/// exit).  Killing without reaping would leave a zombie and let a new spawn
/// race the old process's teardown.
///
/// Platform notes:
/// - Unix:    SIGINT for graceful stop, SIGKILL for force kill (single process)
/// - Windows: no signals; force kill takes down the whole process tree
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{KillError, SignalError, SpawnError, WaitError};

#[cfg(test)]
pub mod fake;
mod os;

pub use os::OsSupervisor;

/// Production adapter for the platform we were built for.
pub type PlatformSupervisor = OsSupervisor;

/// Everything needed to start one external process.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Append the child's stderr here instead of discarding it.
    pub stderr_log: Option<PathBuf>,
}

impl LaunchSpec {
    /// Binary name without directories, for logs and errors.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// How a reaped process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Opaque reference to a spawned process.
pub trait ProcessHandle: Send {
    /// OS process id, `None` once the process has been reaped.
    fn pid(&self) -> Option<u32>;
    /// Binary name, for logs.
    fn program(&self) -> &str;
}

#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    type Handle: ProcessHandle;

    /// Launch without waiting for the process to finish.
    async fn spawn(&self, spec: &LaunchSpec) -> Result<Self::Handle, SpawnError>;

    /// Unconditional, immediate termination.  Does not reap.
    async fn force_kill(&self, handle: &mut Self::Handle) -> Result<(), KillError>;

    /// Ask the process to exit so it can finalize its output.  Does not reap.
    fn interrupt(&self, handle: &mut Self::Handle) -> Result<(), SignalError>;

    /// Block until the process has exited and its resources are released.
    async fn reap(&self, handle: &mut Self::Handle) -> Result<ProcessExit, WaitError>;

    /// Non-blocking exit check.  `Some` means the process is gone and reaped.
    fn try_reap(&self, handle: &mut Self::Handle) -> Result<Option<ProcessExit>, WaitError>;

    /// Interrupt, degrading to `force_kill` when the platform has no signals
    /// or delivery fails.
    async fn terminate_gracefully(&self, handle: &mut Self::Handle) -> Result<(), KillError> {
        match self.interrupt(handle) {
            Ok(()) => {
                debug!("{}: interrupt delivered (pid {:?})", handle.program(), handle.pid());
                Ok(())
            }
            Err(SignalError::Unsupported) => {
                debug!("{}: no signal support, killing", handle.program());
                self.force_kill(handle).await
            }
            Err(e) => {
                warn!("{}: {}, escalating to kill", handle.program(), e);
                self.force_kill(handle).await
            }
        }
    }
}
