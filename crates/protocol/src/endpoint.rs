//! Well-known location of the daemon socket.

use std::path::PathBuf;

/// File name of the daemon socket inside the system temp directory.
pub const SOCKET_FILE_NAME: &str = "pw-bridge.sock";

/// Returns the default per-host socket path (`<temp_dir>/pw-bridge.sock`).
pub fn default_socket_path() -> PathBuf {
	std::env::temp_dir().join(SOCKET_FILE_NAME)
}
