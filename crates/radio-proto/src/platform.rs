use std::path::{Path, PathBuf};

pub const DAEMON_TCP_PORT: u16 = 9876;

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/radio/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("radio")
    }
    #[cfg(windows)]
    {
        // Portable data directory beside the executable wins
        if let Some(portable) = beside_exe("data") {
            return portable;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("radio")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                if exe_dir.join("config.toml").exists() {
                    return exe_dir.to_path_buf();
                }
            }
        }
    }

    // On macOS and Linux, always use ~/.config/radio/
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("radio")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("radio")
    }
}

/// Default directory for recordings: `~/radio-recordings`, or a portable
/// `recordings/` beside the executable on Windows.
pub fn recordings_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(portable) = beside_exe("recordings") {
            return portable;
        }
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("radio-recordings")
}

#[cfg(windows)]
fn beside_exe(name: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let candidate = exe_path.parent()?.join(name);
    candidate.exists().then_some(candidate)
}

#[cfg(unix)]
pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(windows)]
pub fn mpv_binary_name() -> &'static str {
    "mpv.exe"
}

#[cfg(unix)]
pub fn ffmpeg_binary_name() -> &'static str {
    "ffmpeg"
}

#[cfg(windows)]
pub fn ffmpeg_binary_name() -> &'static str {
    "ffmpeg.exe"
}

fn find_beside_exe(name: &str) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    let p = dir.join(name);
    if p.exists() {
        return Some(p);
    }
    let p = dir.join("external").join(name);
    if p.exists() {
        return Some(p);
    }
    None
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.exists())
}

/// Resolve a binary: explicit override, then beside the current exe, then
/// PATH.  Falls back to the bare name so that spawning reports "not found"
/// instead of this lookup silently failing.
pub fn resolve_binary(override_path: Option<&Path>, name: &str) -> PathBuf {
    if let Some(p) = override_path {
        return p.to_path_buf();
    }
    find_beside_exe(name)
        .or_else(|| find_on_path(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

/// Find mpv binary for playback.
pub fn find_mpv_binary(override_path: Option<&Path>) -> PathBuf {
    resolve_binary(override_path, mpv_binary_name())
}

/// Find ffmpeg binary for recording.  The `FFMPEG_PATH` env var is honoured
/// when no override is configured.
pub fn find_ffmpeg_binary(override_path: Option<&Path>) -> PathBuf {
    if override_path.is_none() {
        if let Some(p) = std::env::var_os("FFMPEG_PATH").map(PathBuf::from) {
            if p.exists() {
                return p;
            }
        }
    }
    resolve_binary(override_path, ffmpeg_binary_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let p = resolve_binary(Some(Path::new("/opt/mpv/bin/mpv")), "mpv");
        assert_eq!(p, PathBuf::from("/opt/mpv/bin/mpv"));
    }

    #[test]
    fn test_unknown_binary_falls_back_to_name() {
        let p = resolve_binary(None, "definitely-not-a-real-player-binary");
        assert_eq!(p, PathBuf::from("definitely-not-a-real-player-binary"));
    }
}
