/// PlaybackSession: owns the player process and the optional recorder.
///
/// ```text
///   Idle ──play──► Active{station, volume, recorder?} ──stop──► Idle
///                    │  ▲
///                    └──┘ play (stop-then-spawn)
/// ```
///
/// Invariants:
///   - at most one player and one recorder handle exist at any time
///   - a recorder only exists while Active
///   - stopping playback stops the recorder first
///
/// Every transition is appended to an outbox as a `PlaybackEvent`; the owner
/// drains it after each call so published events match what actually
/// happened, including partial failures.
use std::path::{Path, PathBuf};

use radio_proto::protocol::{FailureKind, PlaybackEvent, Station};
use tracing::{debug, info, warn};

use crate::error::{KillError, SessionError};
use crate::launch::Launcher;
use crate::supervisor::{ProcessHandle, ProcessSupervisor};

struct Recorder<H> {
    handle: H,
    path: PathBuf,
}

struct ActiveStream<H> {
    station: Station,
    volume: u8,
    player: H,
    /// Player already reaped by the liveness poll, recorder still pending.
    player_exited: bool,
    recorder: Option<Recorder<H>>,
}

pub struct PlaybackSession<S: ProcessSupervisor> {
    supervisor: S,
    launcher: Launcher,
    active: Option<ActiveStream<S::Handle>>,
    outbox: Vec<PlaybackEvent>,
}

fn failed(kind: FailureKind, detail: impl Into<String>) -> PlaybackEvent {
    PlaybackEvent::OperationFailed {
        kind,
        detail: detail.into(),
    }
}

/// Terminate gracefully so the container gets finalized, then reap.  A failed
/// kill keeps the recorder in its slot; a failed reap does not.
async fn shut_down_recorder<S: ProcessSupervisor>(
    supervisor: &S,
    slot: &mut Option<Recorder<S::Handle>>,
    outbox: &mut Vec<PlaybackEvent>,
) -> Result<Option<PathBuf>, KillError> {
    let Some(mut recorder) = slot.take() else {
        return Ok(None);
    };

    if let Err(e) = supervisor.terminate_gracefully(&mut recorder.handle).await {
        *slot = Some(recorder);
        return Err(e);
    }

    match supervisor.reap(&mut recorder.handle).await {
        Ok(exit) => debug!("recorder finished ({})", exit),
        Err(e) => {
            warn!("{}", e);
            outbox.push(failed(FailureKind::Wait, e.to_string()));
        }
    }

    info!("Recording stopped: {:?}", recorder.path);
    outbox.push(PlaybackEvent::RecordingStopped {
        path: recorder.path.clone(),
    });
    Ok(Some(recorder.path))
}

impl<S: ProcessSupervisor> PlaybackSession<S> {
    pub fn new(supervisor: S, launcher: Launcher) -> Self {
        Self {
            supervisor,
            launcher,
            active: None,
            outbox: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.recorder.is_some())
    }

    pub fn station(&self) -> Option<&Station> {
        self.active.as_ref().map(|a| &a.station)
    }

    /// Volume the running player was started with.
    pub fn volume(&self) -> Option<u8> {
        self.active.as_ref().map(|a| a.volume)
    }

    pub fn recording_path(&self) -> Option<&Path> {
        self.active
            .as_ref()
            .and_then(|a| a.recorder.as_ref())
            .map(|r| r.path.as_path())
    }

    /// Events produced since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Start `station` at `volume`, stopping whatever is playing first.
    pub async fn play(&mut self, station: Station, volume: u8) -> Result<(), SessionError> {
        // Always our own stop-then-spawn; never assume the caller stopped.
        self.stop().await?;

        let spec = self.launcher.player(&station, volume);
        let player = self.supervisor.spawn(&spec).await?;
        info!(
            "Playing '{}' at volume {} (pid {:?})",
            station.name,
            volume,
            player.pid()
        );

        self.outbox.push(PlaybackEvent::PlaybackStarted {
            station: station.clone(),
            volume,
        });
        self.active = Some(ActiveStream {
            station,
            volume,
            player,
            player_exited: false,
            recorder: None,
        });
        Ok(())
    }

    /// Stop the recorder (if any), then the player.  No-op when idle.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        shut_down_recorder(&self.supervisor, &mut active.recorder, &mut self.outbox).await?;

        // Nothing to finalize on the player side, no need to be gentle.
        self.supervisor.force_kill(&mut active.player).await?;
        if let Err(e) = self.supervisor.reap(&mut active.player).await {
            warn!("{}", e);
            self.outbox.push(failed(FailureKind::Wait, e.to_string()));
        }

        if let Some(stopped) = self.active.take() {
            info!("Stopped '{}'", stopped.station.name);
        }
        self.outbox.push(PlaybackEvent::PlaybackStopped);
        Ok(())
    }

    /// Record the active station into `output` with an independent process.
    pub async fn start_recording(&mut self, output: PathBuf) -> Result<(), SessionError> {
        let Some(active) = self.active.as_mut() else {
            return Err(SessionError::InvalidState("cannot record while idle"));
        };
        if active.recorder.is_some() {
            return Err(SessionError::InvalidState("already recording"));
        }

        let spec = self.launcher.recorder(&active.station, &output);
        let handle = self.supervisor.spawn(&spec).await?;
        info!(
            "Recording '{}' to {:?} (pid {:?})",
            active.station.name,
            output,
            handle.pid()
        );

        active.recorder = Some(Recorder {
            handle,
            path: output.clone(),
        });
        self.outbox
            .push(PlaybackEvent::RecordingStarted { path: output });
        Ok(())
    }

    /// Stop the recorder and return its output path.  `None` when nothing
    /// was recording; calling it twice is harmless.
    pub async fn stop_recording(&mut self) -> Result<Option<PathBuf>, SessionError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };
        let path =
            shut_down_recorder(&self.supervisor, &mut active.recorder, &mut self.outbox).await?;
        Ok(path)
    }

    /// Liveness poll: clear processes that exited on their own.  Failures are
    /// reported, never retried.
    pub async fn check_exited(&mut self) -> Result<(), SessionError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        if let Some(recorder) = active.recorder.as_mut() {
            match self.supervisor.try_reap(&mut recorder.handle) {
                Ok(Some(exit)) => {
                    warn!("Recorder exited on its own ({})", exit);
                    let path = recorder.path.clone();
                    active.recorder = None;
                    self.outbox.push(PlaybackEvent::RecordingStopped { path });
                    self.outbox.push(failed(
                        FailureKind::RecorderExited,
                        format!("recorder stopped unexpectedly ({})", exit),
                    ));
                }
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }
        }

        let newly_exited = if active.player_exited {
            false
        } else {
            match self.supervisor.try_reap(&mut active.player) {
                Ok(Some(exit)) => {
                    warn!(
                        "Player for '{}' exited on its own ({})",
                        active.station.name, exit
                    );
                    active.player_exited = true;
                    true
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!("{}", e);
                    return Ok(());
                }
            }
        };
        let detail = format!("{}: playback ended", active.station.name);

        // The player is gone either way; a recorder that will not die keeps
        // the session Active and the next poll retries it.
        if let Err(e) =
            shut_down_recorder(&self.supervisor, &mut active.recorder, &mut self.outbox).await
        {
            if newly_exited {
                self.outbox.push(failed(FailureKind::PlayerExited, detail));
            }
            return Err(e.into());
        }
        self.active = None;
        self.outbox.push(PlaybackEvent::PlaybackStopped);
        if newly_exited {
            self.outbox.push(failed(FailureKind::PlayerExited, detail));
        }
        Ok(())
    }
}
