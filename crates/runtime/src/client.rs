//! Front-end side of the socket transport.

use std::path::{Path, PathBuf};

use pw_bridge_protocol::{Request, Response, decode_response, encode_line};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Connects to the daemon once per request.
#[derive(Debug, Clone)]
pub struct DaemonClient {
	socket_path: PathBuf,
}

impl DaemonClient {
	pub fn new(socket_path: impl Into<PathBuf>) -> Self {
		Self {
			socket_path: socket_path.into(),
		}
	}

	pub fn socket_path(&self) -> &Path {
		&self.socket_path
	}

	/// Sends one request and waits for its response.
	///
	/// A missing socket or refused connection is reported as
	/// [`BridgeError::DaemonUnavailable`].
	pub async fn send(&self, request: &Request) -> Result<Response> {
		let stream = match UnixStream::connect(&self.socket_path).await {
			Ok(stream) => stream,
			Err(err) if is_not_running(&err) => {
				return Err(BridgeError::DaemonUnavailable {
					path: self.socket_path.clone(),
				});
			}
			Err(err) => return Err(BridgeError::transport(format!("failed to connect to {}: {err}", self.socket_path.display()))),
		};
		debug!(target = "pw_bridge.frontend", command = %request.command, "sending request");
		send_request_stream(stream, request).await
	}

	/// `true` when the daemon answers `ping`.
	pub async fn is_running(&self) -> bool {
		matches!(self.send(&Request::new("ping")).await, Ok(response) if !response.is_error())
	}
}

fn is_not_running(err: &std::io::Error) -> bool {
	matches!(err.kind(), std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused)
}

/// Writes one request line to `stream` and reads one response line back.
pub async fn send_request_stream<S>(mut stream: S, request: &Request) -> Result<Response>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let payload = encode_line(request)?;
	stream
		.write_all(payload.as_bytes())
		.await
		.map_err(|e| BridgeError::transport(format!("failed writing request: {e}")))?;
	stream
		.flush()
		.await
		.map_err(|e| BridgeError::transport(format!("failed flushing request: {e}")))?;

	let mut reader = BufReader::new(stream);
	let mut line = String::new();
	let read = reader
		.read_line(&mut line)
		.await
		.map_err(|e| BridgeError::transport(format!("failed reading response: {e}")))?;
	if read == 0 {
		return Err(BridgeError::transport("daemon closed the connection without responding"));
	}
	Ok(decode_response(&line)?)
}
