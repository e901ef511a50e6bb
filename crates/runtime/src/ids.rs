//! Identifier generation and timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use pw_bridge_protocol::BrowserKind;

/// Hands out session and page ids that are never reused within one daemon.
///
/// Ids are derived from a monotonic counter, so two launches in the same
/// instant still get distinct ids.
#[derive(Debug, Default)]
pub struct IdGenerator {
	next: AtomicU64,
}

impl IdGenerator {
	pub fn new() -> Self {
		Self::default()
	}

	fn bump(&self) -> u64 {
		self.next.fetch_add(1, Ordering::Relaxed) + 1
	}

	/// `chromium-s1`, `firefox-s2`, ...
	pub fn session_id(&self, kind: BrowserKind) -> String {
		format!("{kind}-s{}", self.bump())
	}

	/// `page-3`, `page-4`, ...
	pub fn page_id(&self) -> String {
		format!("page-{}", self.bump())
	}
}

/// Opaque job token (random, unique for the daemon lifetime).
pub fn job_id() -> String {
	format!("job-{}", uuid::Uuid::new_v4().simple())
}

/// Milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}
