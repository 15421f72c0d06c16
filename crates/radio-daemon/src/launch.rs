//! Command lines for the external player (mpv) and recorder (ffmpeg).

use std::path::{Path, PathBuf};

use radio_proto::config::{Config, PlayerConfig, RecorderConfig};
use radio_proto::protocol::Station;

use crate::supervisor::LaunchSpec;

#[derive(Debug, Clone)]
pub struct Launcher {
    player: PlayerConfig,
    recorder: RecorderConfig,
    log_dir: PathBuf,
}

impl Launcher {
    pub fn new(player: PlayerConfig, recorder: RecorderConfig, log_dir: PathBuf) -> Self {
        Self {
            player,
            recorder,
            log_dir,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.player.clone(),
            config.recorder.clone(),
            radio_proto::platform::data_dir(),
        )
    }

    /// mpv playing `station` at `volume` percent.  Volume is fixed for the
    /// life of the process; changing it means a restart.
    pub fn player(&self, station: &Station, volume: u8) -> LaunchSpec {
        let mut args = vec![
            "--no-video".to_string(),
            "--quiet".to_string(),
            format!("--volume={}", volume),
        ];
        args.extend(self.player.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(station.url.clone());

        LaunchSpec {
            program: radio_proto::platform::find_mpv_binary(self.player.binary.as_deref()),
            args,
            stderr_log: Some(self.log_dir.join("mpv-stderr.log")),
        }
    }

    /// ffmpeg copying the station's stream into `output` without re-encoding.
    /// On SIGINT ffmpeg finishes the container before exiting.
    pub fn recorder(&self, station: &Station, output: &Path) -> LaunchSpec {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostdin",
            "-y",
            "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(station.url.clone());
        args.extend(["-vn", "-c", "copy"].iter().map(|s| s.to_string()));
        args.extend(self.recorder.extra_args.iter().cloned());
        args.push(output.display().to_string());

        LaunchSpec {
            program: radio_proto::platform::find_ffmpeg_binary(self.recorder.binary.as_deref()),
            args,
            stderr_log: Some(self.log_dir.join("ffmpeg-stderr.log")),
        }
    }
}
