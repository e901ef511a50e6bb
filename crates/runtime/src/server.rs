//! Unix socket transport.
//!
//! One JSON request per line in, one JSON response per line out, in order.
//! Malformed lines are answered with an error and the connection stays open.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pw_bridge_protocol::{Response, decode_request, encode_line};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::ActivityClock;
use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, Result};

pub struct SocketServer {
	listener: UnixListener,
	path: PathBuf,
}

impl SocketServer {
	/// Binds `path`, replacing a stale socket file left by an earlier run.
	pub fn bind(path: &Path) -> Result<Self> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent)?;
		}
		remove_stale_socket(path)?;
		let listener = UnixListener::bind(path)?;
		info!(target = "pw_bridge.server", path = %path.display(), "listening");
		Ok(Self {
			listener,
			path: path.to_path_buf(),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Accepts connections until `shutdown` fires.
	pub async fn serve(self, dispatcher: Arc<Dispatcher>, clock: Arc<ActivityClock>, shutdown: CancellationToken) {
		loop {
			tokio::select! {
				_ = shutdown.cancelled() => {
					debug!(target = "pw_bridge.server", "accept loop stopping");
					break;
				}
				accepted = self.listener.accept() => match accepted {
					Ok((stream, _)) => {
						let dispatcher = dispatcher.clone();
						let clock = clock.clone();
						let shutdown = shutdown.clone();
						tokio::spawn(async move {
							if let Err(err) = handle_connection(stream, &dispatcher, &clock, &shutdown).await {
								debug!(target = "pw_bridge.server", error = %err, "connection ended with error");
							}
						});
					}
					Err(err) => {
						warn!(target = "pw_bridge.server", error = %err, "accept failed");
						tokio::time::sleep(Duration::from_millis(100)).await;
					}
				}
			}
		}
	}
}

/// Removes a leftover socket file. A missing file is fine.
pub fn remove_stale_socket(path: &Path) -> Result<()> {
	match std::fs::remove_file(path) {
		Ok(()) => {
			debug!(target = "pw_bridge.server", path = %path.display(), "removed stale socket");
			Ok(())
		}
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(err) => Err(BridgeError::Io(err)),
	}
}

/// Serves one connection until EOF, a write failure, or shutdown.
pub async fn handle_connection<S>(stream: S, dispatcher: &Dispatcher, clock: &ActivityClock, shutdown: &CancellationToken) -> Result<()>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let (read_half, mut writer) = tokio::io::split(stream);
	let mut reader = BufReader::new(read_half);
	let mut buf = Vec::new();

	loop {
		buf.clear();
		let read = tokio::select! {
			_ = shutdown.cancelled() => return Ok(()),
			read = reader.read_until(b'\n', &mut buf) => read?,
		};
		if read == 0 {
			return Ok(());
		}
		clock.touch();

		let response = match std::str::from_utf8(&buf) {
			Err(_) => Response::error("Invalid request: line is not valid UTF-8"),
			Ok(line) if line.trim().is_empty() => continue,
			Ok(line) => match decode_request(line) {
				Ok(request) => dispatcher.dispatch(request).await,
				Err(err) => {
					debug!(target = "pw_bridge.server", error = %err, "undecodable request");
					Response::error(format!("Invalid request: {err}"))
				}
			},
		};

		let line = encode_line(&response)?;
		writer.write_all(line.as_bytes()).await?;
		writer.flush().await?;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stale_socket_removal_tolerates_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("missing.sock");
		remove_stale_socket(&path).unwrap();

		std::fs::write(&path, b"").unwrap();
		remove_stale_socket(&path).unwrap();
		assert!(!path.exists());
	}

	#[test]
	fn stale_socket_removal_reports_other_failures() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("occupied");
		std::fs::create_dir(&path).unwrap();
		std::fs::write(path.join("inner"), b"").unwrap();
		assert!(matches!(remove_stale_socket(&path), Err(BridgeError::Io(_))));
	}

	#[tokio::test]
	async fn bind_replaces_stale_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("bridge.sock");
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, b"stale").unwrap();

		let server = SocketServer::bind(&path).unwrap();
		assert_eq!(server.path(), path);
		tokio::net::UnixStream::connect(&path).await.unwrap();
	}
}
