//! Last-activity tracking for idle shutdown.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug)]
pub struct ActivityClock {
	last: Mutex<Instant>,
}

impl Default for ActivityClock {
	fn default() -> Self {
		Self {
			last: Mutex::new(Instant::now()),
		}
	}
}

impl ActivityClock {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records activity now.
	pub fn touch(&self) {
		*self.last.lock() = Instant::now();
	}

	pub fn idle_for(&self) -> Duration {
		self.last.lock().elapsed()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn touch_resets_idle_time() {
		let clock = ActivityClock::new();
		std::thread::sleep(Duration::from_millis(20));
		assert!(clock.idle_for() >= Duration::from_millis(20));
		clock.touch();
		assert!(clock.idle_for() < Duration::from_millis(20));
	}
}
