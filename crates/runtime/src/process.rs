//! Process and PID-file helpers shared by the daemon and the CLI.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Returns `true` when a process with `pid` appears alive on this platform.
pub fn pid_is_alive(pid: u32) -> bool {
	#[cfg(unix)]
	{
		if pid == 0 {
			return false;
		}

		if PathBuf::from("/proc").join(pid.to_string()).exists() {
			return true;
		}

		std::process::Command::new("kill")
			.arg("-0")
			.arg(pid.to_string())
			.status()
			.map(|status| status.success())
			.unwrap_or(pid == std::process::id())
	}

	#[cfg(not(unix))]
	{
		pid == std::process::id()
	}
}

/// PID file written next to the daemon socket by `pwb daemon start`.
#[derive(Debug, Clone)]
pub struct PidFile {
	path: PathBuf,
}

impl PidFile {
	/// PID file path for a socket at `socket_path` (`<socket>.pid`).
	pub fn for_socket(socket_path: &Path) -> Self {
		let mut path = socket_path.as_os_str().to_owned();
		path.push(".pid");
		Self { path: PathBuf::from(path) }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn write(&self, pid: u32) -> Result<()> {
		std::fs::write(&self.path, format!("{pid}\n"))?;
		Ok(())
	}

	/// Reads the recorded PID; `None` when the file is absent or unparsable.
	pub fn read(&self) -> Option<u32> {
		std::fs::read_to_string(&self.path).ok()?.trim().parse().ok()
	}

	/// Removes the file; returns `false` when it did not exist.
	pub fn remove(&self) -> Result<bool> {
		match std::fs::remove_file(&self.path) {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
			Err(err) => Err(err.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[cfg(unix)]
	#[test]
	fn current_process_is_alive() {
		assert!(pid_is_alive(std::process::id()));
	}

	#[cfg(unix)]
	#[test]
	fn pid_zero_is_never_alive() {
		assert!(!pid_is_alive(0));
	}

	#[test]
	fn pid_file_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = PidFile::for_socket(&dir.path().join("bridge.sock"));
		assert_eq!(pid_file.path(), dir.path().join("bridge.sock.pid"));
		assert_eq!(pid_file.read(), None);

		pid_file.write(4242).unwrap();
		assert_eq!(pid_file.read(), Some(4242));
		assert!(pid_file.remove().unwrap());
		assert!(!pid_file.remove().unwrap());
	}
}
