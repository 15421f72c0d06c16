/// DaemonCore: single-owner event loop for all mutable state.
///
/// Every input (client commands, settled volume timers, heartbeat ticks,
/// shutdown) arrives as a `DaemonEvent` on one mpsc queue and is handled to
/// completion before the next one is read.  DaemonCore owns the
/// `PlaybackSession` and the `VolumeDebouncer` exclusively; no other task
/// touches them, so no locks guard playback state.
///
/// After each event, session transitions are broadcast as
/// `BroadcastMessage::Playback` in the order they happened, followed by a
/// `StateUpdated` if the published snapshot changed.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use radio_proto::config::Config;
use radio_proto::protocol::{Command, FailureKind, PlaybackEvent};
use radio_proto::state::StateManager;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::debounce::VolumeDebouncer;
use crate::error::SessionError;
use crate::filename;
use crate::launch::Launcher;
use crate::session::PlaybackSession;
use crate::supervisor::{PlatformSupervisor, ProcessSupervisor};
use crate::BroadcastMessage;

/// How often the liveness of the player and recorder is checked.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A command from a socket client.
    ClientCommand(Command),
    /// A volume quiescence window elapsed.
    VolumeSettled { token: u64 },
    /// Heartbeat: check process liveness.
    HeartbeatTick,
    /// Shutdown requested.
    Shutdown,
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore<S: ProcessSupervisor = PlatformSupervisor> {
    session: PlaybackSession<S>,
    debouncer: VolumeDebouncer,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    recordings_dir: PathBuf,
}

impl<S: ProcessSupervisor> DaemonCore<S> {
    pub async fn new(
        config: Config,
        supervisor: S,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        event_tx: mpsc::Sender<DaemonEvent>,
    ) -> anyhow::Result<Self> {
        let state_manager = Arc::new(StateManager::new(
            config.daemon.state_file.clone(),
            config.volume.default,
        ));

        let initial_volume = state_manager.get_state().await.volume;
        if let Some(station) = state_manager.last_station().await {
            info!("Last played station: '{}'", station.name);
        }

        let session = PlaybackSession::new(supervisor, Launcher::from_config(&config));
        let debouncer = VolumeDebouncer::new(&config.volume, initial_volume, event_tx.clone());

        Ok(Self {
            session,
            debouncer,
            state_manager,
            event_tx,
            broadcast_tx,
            recordings_dir: config.paths.recordings_dir,
        })
    }

    /// Borrow the state manager (for use by the socket server).
    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state_manager)
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or the event channel is closed.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");

        let heartbeat_tx = self.event_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                if heartbeat_tx.send(DaemonEvent::HeartbeatTick).await.is_err() {
                    break;
                }
            }
        });

        loop {
            match event_rx.recv().await {
                None => {
                    info!("DaemonCore: event channel closed, shutting down");
                    break;
                }
                Some(evt) => {
                    if !self.handle_event(evt).await {
                        break;
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    /// Handle one event to completion.  Returns `false` on shutdown.
    async fn handle_event(&mut self, evt: DaemonEvent) -> bool {
        let result = match evt {
            DaemonEvent::Shutdown => {
                info!("DaemonCore: shutdown requested");
                return false;
            }
            DaemonEvent::ClientCommand(cmd) => {
                info!("DaemonCore: command {:?}", cmd);
                self.handle_command(cmd).await
            }
            DaemonEvent::VolumeSettled { token } => self
                .debouncer
                .settle(token, &mut self.session)
                .await
                .map(|_| ()),
            DaemonEvent::HeartbeatTick => self.session.check_exited().await,
        };
        self.flush(result).await;
        true
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<(), SessionError> {
        match cmd {
            Command::Play { station } => {
                let volume = self.debouncer.target();
                self.session.play(station, volume).await
            }
            Command::Stop => self.session.stop().await,
            Command::StartRecording => self.start_recording().await,
            Command::StopRecording => self.session.stop_recording().await.map(|_| ()),
            Command::ToggleRecording => {
                if self.session.is_recording() {
                    self.session.stop_recording().await.map(|_| ())
                } else {
                    self.start_recording().await
                }
            }
            Command::VolumeUp => {
                self.debouncer.step_up(&self.session);
                Ok(())
            }
            Command::VolumeDown => {
                self.debouncer.step_down(&self.session);
                Ok(())
            }
            Command::SetVolume { value } => {
                self.debouncer.request(i32::from(value), &self.session);
                Ok(())
            }
            // The socket answers every command with a fresh snapshot.
            Command::GetState => Ok(()),
        }
    }

    async fn start_recording(&mut self) -> Result<(), SessionError> {
        let Some(station) = self.session.station() else {
            warn!("Not playing, nothing to record");
            return Ok(());
        };
        if self.session.is_recording() {
            debug!("Already recording");
            return Ok(());
        }

        let name = filename::generate(
            &station.name,
            &station.codec,
            chrono::Local::now().naive_local(),
        );
        if let Err(e) = tokio::fs::create_dir_all(&self.recordings_dir).await {
            error!("Cannot create {:?}: {}", self.recordings_dir, e);
            self.emit(PlaybackEvent::OperationFailed {
                kind: FailureKind::Spawn,
                detail: format!("cannot create {}: {}", self.recordings_dir.display(), e),
            });
            return Ok(());
        }
        self.session
            .start_recording(self.recordings_dir.join(name))
            .await
    }

    /// Broadcast what the last operation did, then publish the new snapshot.
    async fn flush(&mut self, result: Result<(), SessionError>) {
        for event in self.session.drain_events() {
            self.emit(event);
        }

        match result {
            Ok(()) => {}
            Err(SessionError::InvalidState(reason)) => warn!("Ignored: {}", reason),
            Err(e) => {
                error!("{} failed: {}", e.kind().label(), e);
                self.emit(PlaybackEvent::OperationFailed {
                    kind: e.kind(),
                    detail: e.to_string(),
                });
            }
        }

        self.publish_state().await;
    }

    fn emit(&self, event: PlaybackEvent) {
        debug!("playback event: {:?}", event);
        // No receivers is fine.
        let _ = self.broadcast_tx.send(BroadcastMessage::Playback(event));
    }

    async fn publish_state(&self) {
        let changed = self
            .state_manager
            .publish(
                self.session.station().cloned(),
                self.debouncer.target(),
                self.session.recording_path().map(Path::to_path_buf),
            )
            .await;
        match changed {
            Ok(false) => {}
            Ok(true) => {
                let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
            }
            Err(e) => {
                warn!("Failed to save state: {}", e);
                let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
            }
        }
    }

    async fn cleanup(&mut self) {
        info!("DaemonCore: cleanup, stopping recorder and player");
        let result = self.session.stop().await;
        self.flush(result).await;
    }
}
