use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use super::{LaunchSpec, ProcessExit, ProcessHandle, ProcessSupervisor};
use crate::error::{KillError, SignalError, SpawnError, WaitError};

/// Supervisor backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSupervisor;

pub struct OsProcess {
    child: Child,
    pid: Option<u32>,
    program: String,
}

impl ProcessHandle for OsProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn program(&self) -> &str {
        &self.program
    }
}

fn open_stderr_log(path: &Path) -> Stdio {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Stdio::from(file),
        Err(e) => {
            warn!("cannot open {:?} for child stderr: {}", path, e);
            Stdio::null()
        }
    }
}

#[async_trait]
impl ProcessSupervisor for OsSupervisor {
    type Handle = OsProcess;

    async fn spawn(&self, spec: &LaunchSpec) -> Result<OsProcess, SpawnError> {
        let program = spec.program_name();
        let stderr = match spec.stderr_log.as_deref() {
            Some(path) => open_stderr_log(path),
            None => Stdio::null(),
        };

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    SpawnError::NotFound {
                        program: program.clone(),
                    }
                } else {
                    SpawnError::Os {
                        program: program.clone(),
                        source,
                    }
                }
            })?;

        let pid = child.id();
        info!("{}: spawned process with pid {:?}", program, pid);
        Ok(OsProcess {
            child,
            pid,
            program,
        })
    }

    async fn force_kill(&self, handle: &mut OsProcess) -> Result<(), KillError> {
        // Already exited on its own; reap will collect the status.
        if let Ok(Some(_)) = handle.child.try_wait() {
            return Ok(());
        }
        kill_process(handle).await
    }

    fn interrupt(&self, handle: &mut OsProcess) -> Result<(), SignalError> {
        send_interrupt(handle)
    }

    async fn reap(&self, handle: &mut OsProcess) -> Result<ProcessExit, WaitError> {
        let status = handle.child.wait().await.map_err(|source| WaitError {
            program: handle.program.clone(),
            pid: handle.pid,
            source,
        })?;
        let exit = ProcessExit::from(status);
        info!("{}: pid {:?} reaped ({})", handle.program, handle.pid, exit);
        Ok(exit)
    }

    fn try_reap(&self, handle: &mut OsProcess) -> Result<Option<ProcessExit>, WaitError> {
        handle
            .child
            .try_wait()
            .map(|status| status.map(ProcessExit::from))
            .map_err(|source| WaitError {
                program: handle.program.clone(),
                pid: handle.pid,
                source,
            })
    }
}

// ── Unix ──────────────────────────────────────────────────────────────────────

#[cfg(unix)]
fn send_interrupt(handle: &mut OsProcess) -> Result<(), SignalError> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let pid = handle.child.id().ok_or(SignalError::NoPid)?;
    signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(|e| SignalError::Delivery {
        pid,
        reason: e.to_string(),
    })
}

/// Player and recorder are single-process on Unix, so SIGKILL to the pid is
/// enough.
#[cfg(unix)]
async fn kill_process(handle: &mut OsProcess) -> Result<(), KillError> {
    handle.child.start_kill().map_err(|source| KillError::Kill {
        program: handle.program.clone(),
        pid: handle.pid,
        source,
    })
}

// ── Windows ───────────────────────────────────────────────────────────────────

#[cfg(windows)]
fn send_interrupt(_handle: &mut OsProcess) -> Result<(), SignalError> {
    Err(SignalError::Unsupported)
}

/// Children do not receive their parent's termination on Windows, and mpv
/// may have started helpers, so the whole tree goes.
#[cfg(windows)]
async fn kill_process(handle: &mut OsProcess) -> Result<(), KillError> {
    let Some(pid) = handle.child.id() else {
        return Ok(());
    };

    let reason = match Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) if status.success() => return Ok(()),
        Ok(status) => format!("taskkill exited with {}", status),
        Err(e) => format!("taskkill failed: {}", e),
    };

    warn!("{}: {}, killing root process only", handle.program, reason);
    handle.child.start_kill().map_err(|_| KillError::Tree {
        program: handle.program.clone(),
        pid,
        reason,
    })
}
