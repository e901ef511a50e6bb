//! Wire types for the pw-bridge daemon protocol.
//!
//! This crate contains the serde-serializable types exchanged between the
//! front-end and the daemon over the local socket. Messages are one JSON
//! object per line:
//!
//! * Request: `{"command": "<name>", "args": {...}}`
//! * Success: a handler-defined object (`success`, `result`, `session_id`, ...)
//! * Error: `{"error": "<message>"}`
//!
//! Types in this crate are pure data plus the command catalog; all behavior
//! lives in `pw-bridge-runtime`.

pub mod codec;
pub mod command;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod types;

pub use codec::{decode_request, decode_response, encode_line};
pub use command::{COMMANDS, Command, CommandSpec};
pub use endpoint::{SOCKET_FILE_NAME, default_socket_path};
pub use error::ProtocolError;
pub use message::{Request, Response};
pub use types::*;
