use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DAEMON_TCP_PORT: u16 = 9876;

/// Each audio handle is its own mpv process, so each needs its own socket.
static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

fn next_socket_suffix() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed)
    )
}

#[cfg(unix)]
pub fn new_mpv_socket_name() -> String {
    format!(
        "{}/kaiga-mpv-{}.sock",
        std::env::temp_dir().display(),
        next_socket_suffix()
    )
}

#[cfg(windows)]
pub fn new_mpv_socket_name() -> String {
    format!("kaiga-mpv-{}", next_socket_suffix())
}

#[cfg(unix)]
pub fn mpv_socket_arg(socket_name: &str) -> String {
    format!("--input-ipc-server={}", socket_name)
}

#[cfg(windows)]
pub fn mpv_socket_arg(socket_name: &str) -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", socket_name)
}

pub fn data_dir() -> PathBuf {
    // XDG layout on macOS too, for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("kaiga")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kaiga")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("kaiga")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kaiga")
    }
}

#[cfg(unix)]
pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(windows)]
pub fn mpv_binary_name() -> &'static str {
    "mpv.exe"
}

/// Find the mpv binary: `MPV_PATH`, then beside the current exe, then PATH.
pub fn find_mpv_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("MPV_PATH") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    let exe_name = mpv_binary_name();

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let local_mpv = dir.join(exe_name);
            if local_mpv.exists() {
                return Some(local_mpv);
            }
        }
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(exe_name))
        .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_names_are_unique() {
        let a = new_mpv_socket_name();
        let b = new_mpv_socket_name();
        assert_ne!(a, b);
        assert!(mpv_socket_arg(&a).starts_with("--input-ipc-server="));
    }

    #[test]
    fn test_dirs_end_in_app_name() {
        assert!(config_dir().ends_with("kaiga"));
        assert!(data_dir().ends_with("kaiga"));
    }
}
