//! Coalesces bursts of volume changes into a single player restart.
//!
//! The player's volume is fixed when it is spawned, so every change costs a
//! restart.  Each request while playing issues a fresh token and schedules a
//! check after the quiescence window; only the check carrying the newest
//! token may restart the player.  Older timers are never cancelled, they
//! simply find their token stale.

use std::time::Duration;

use radio_proto::config::VolumeConfig;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::DaemonEvent;
use crate::error::SessionError;
use crate::session::PlaybackSession;
use crate::supervisor::ProcessSupervisor;

pub struct VolumeDebouncer {
    min: u8,
    max: u8,
    step: u8,
    window: Duration,
    /// Last requested volume; what the next player will be started with.
    target: u8,
    next_token: u64,
    live_token: Option<u64>,
    events: mpsc::Sender<DaemonEvent>,
}

impl VolumeDebouncer {
    pub fn new(config: &VolumeConfig, initial: u8, events: mpsc::Sender<DaemonEvent>) -> Self {
        let (min, max) = config.bounds();
        Self {
            min,
            max,
            step: config.step,
            window: Duration::from_millis(config.debounce_ms),
            target: initial.clamp(min, max),
            next_token: 0,
            live_token: None,
            events,
        }
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    /// Record `volume` (clamped) as the target.  While playing, schedule the
    /// deferred restart check.  Returns the clamped value.
    pub fn request<S: ProcessSupervisor>(
        &mut self,
        volume: i32,
        session: &PlaybackSession<S>,
    ) -> u8 {
        let clamped = volume.clamp(i32::from(self.min), i32::from(self.max)) as u8;
        self.target = clamped;

        if !session.is_active() {
            debug!("volume {} stored for next playback", clamped);
            self.live_token = None;
            return clamped;
        }

        self.next_token += 1;
        let token = self.next_token;
        self.live_token = Some(token);

        let tx = self.events.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if tx.send(DaemonEvent::VolumeSettled { token }).await.is_err() {
                debug!("event loop gone, dropping volume token {}", token);
            }
        });
        clamped
    }

    pub fn step_up<S: ProcessSupervisor>(&mut self, session: &PlaybackSession<S>) -> u8 {
        self.request(i32::from(self.target) + i32::from(self.step), session)
    }

    pub fn step_down<S: ProcessSupervisor>(&mut self, session: &PlaybackSession<S>) -> u8 {
        self.request(i32::from(self.target) - i32::from(self.step), session)
    }

    /// Deferred check for `token`.  Restarts the player at the target volume
    /// when the token is still the newest one.  Returns whether it restarted.
    pub async fn settle<S: ProcessSupervisor>(
        &mut self,
        token: u64,
        session: &mut PlaybackSession<S>,
    ) -> Result<bool, SessionError> {
        if self.live_token != Some(token) {
            debug!("volume token {} superseded", token);
            return Ok(false);
        }
        self.live_token = None;

        let Some(station) = session.station().cloned() else {
            debug!("volume settled while idle, nothing to restart");
            return Ok(false);
        };

        info!("Restarting '{}' at volume {}", station.name, self.target);
        if let Err(e) = session.play(station, self.target).await {
            warn!("volume restart failed: {}", e);
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::Launcher;
    use crate::supervisor::fake::{FakeSupervisor, Op};
    use radio_proto::config::{PlayerConfig, RecorderConfig};
    use radio_proto::protocol::Station;
    use std::path::PathBuf;

    fn config() -> VolumeConfig {
        VolumeConfig {
            default: 80,
            min: 0,
            max: 100,
            step: 5,
            debounce_ms: 400,
        }
    }

    fn setup() -> (
        FakeSupervisor,
        PlaybackSession<FakeSupervisor>,
        VolumeDebouncer,
        mpsc::Receiver<DaemonEvent>,
    ) {
        let sup = FakeSupervisor::new();
        let launcher = Launcher::new(
            PlayerConfig {
                binary: Some(PathBuf::from("mpv")),
                extra_args: vec![],
            },
            RecorderConfig::default(),
            PathBuf::from("/tmp/radio-test"),
        );
        let session = PlaybackSession::new(sup.clone(), launcher);
        let (tx, rx) = mpsc::channel(16);
        let debouncer = VolumeDebouncer::new(&config(), 80, tx);
        (sup, session, debouncer, rx)
    }

    fn station() -> Station {
        Station {
            id: "1".into(),
            name: "Test FM".into(),
            url: "http://example.com/live".into(),
            codec: "MP3".into(),
        }
    }

    fn spawned_volumes(sup: &FakeSupervisor) -> Vec<String> {
        sup.specs()
            .iter()
            .filter_map(|s| s.args.iter().find(|a| a.starts_with("--volume=")).cloned())
            .collect()
    }

    async fn settle_all(
        rx: &mut mpsc::Receiver<DaemonEvent>,
        debouncer: &mut VolumeDebouncer,
        session: &mut PlaybackSession<FakeSupervisor>,
        expected: usize,
    ) -> usize {
        let mut restarts = 0;
        for _ in 0..expected {
            match rx.recv().await {
                Some(DaemonEvent::VolumeSettled { token }) => {
                    if debouncer.settle(token, session).await.unwrap() {
                        restarts += 1;
                    }
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        restarts
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_gives_one_restart_at_last_value() {
        let (sup, mut session, mut debouncer, mut rx) = setup();
        session.play(station(), 80).await.unwrap();

        for v in [70, 60, 50] {
            debouncer.request(v, &session);
        }
        // Nothing happens before the window closes
        assert_eq!(sup.ops(), vec![Op::Spawn(1)]);

        let restarts = settle_all(&mut rx, &mut debouncer, &mut session, 3).await;
        assert_eq!(restarts, 1);
        assert_eq!(spawned_volumes(&sup), vec!["--volume=80", "--volume=50"]);
        assert_eq!(session.volume(), Some(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_in_separate_windows_each_restart() {
        let (sup, mut session, mut debouncer, mut rx) = setup();
        session.play(station(), 80).await.unwrap();

        debouncer.request(70, &session);
        assert_eq!(settle_all(&mut rx, &mut debouncer, &mut session, 1).await, 1);
        debouncer.request(60, &session);
        assert_eq!(settle_all(&mut rx, &mut debouncer, &mut session, 1).await, 1);

        assert_eq!(
            spawned_volumes(&sup),
            vec!["--volume=80", "--volume=70", "--volume=60"]
        );
        assert_eq!(sup.peak("mpv"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_within_window_cancels_restart() {
        let (sup, mut session, mut debouncer, mut rx) = setup();
        session.play(station(), 80).await.unwrap();

        debouncer.request(40, &session);
        session.stop().await.unwrap();

        assert_eq!(settle_all(&mut rx, &mut debouncer, &mut session, 1).await, 0);
        assert!(!session.is_active());
        assert_eq!(spawned_volumes(&sup), vec!["--volume=80"]);
        // The value is kept for the next play
        assert_eq!(debouncer.target(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_ending_at_current_volume_still_restarts_once() {
        let (sup, mut session, mut debouncer, mut rx) = setup();
        session.play(station(), 80).await.unwrap();

        for v in [70, 60, 80] {
            debouncer.request(v, &session);
        }

        assert_eq!(settle_all(&mut rx, &mut debouncer, &mut session, 3).await, 1);
        assert_eq!(spawned_volumes(&sup), vec!["--volume=80", "--volume=80"]);
        assert_eq!(sup.peak("mpv"), 1);
    }

    #[tokio::test]
    async fn test_idle_request_only_stores_target() {
        let (sup, session, mut debouncer, mut rx) = setup();
        assert_eq!(debouncer.request(30, &session), 30);
        assert_eq!(debouncer.target(), 30);
        assert!(rx.try_recv().is_err());
        assert!(sup.ops().is_empty());
    }

    #[tokio::test]
    async fn test_clamping_and_steps() {
        let (_sup, session, mut debouncer, _rx) = setup();
        assert_eq!(debouncer.request(150, &session), 100);
        assert_eq!(debouncer.step_up(&session), 100);
        assert_eq!(debouncer.step_down(&session), 95);
        assert_eq!(debouncer.request(-20, &session), 0);
        assert_eq!(debouncer.step_down(&session), 0);
        assert_eq!(debouncer.step_up(&session), 5);
    }

    #[tokio::test]
    async fn test_initial_volume_is_clamped() {
        let (tx, _rx) = mpsc::channel(1);
        let cfg = VolumeConfig {
            min: 10,
            max: 60,
            ..config()
        };
        assert_eq!(VolumeDebouncer::new(&cfg, 90, tx).target(), 60);
    }
}
