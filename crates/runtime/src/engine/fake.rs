//! In-memory engine for tests.
//!
//! Records every call, keeps per-page URLs, serves canned `evaluate` and
//! `query` answers, and can be told to fail specific operations.
//!
//! ```ignore
//! let engine = FakeEngine::new();
//! engine.fail_on("page.goto");
//! engine.respond_to("document.title", json!("Example"));
//! let daemon = Daemon::with_components(config, Arc::new(engine.clone()), agent)?;
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pw_bridge_protocol::{BrowserKind, WaitUntil};
use serde_json::Value;

use super::{BrowserContext, ElementInfo, Engine, PageHandle};
use crate::error::{BridgeError, Result};

#[derive(Default)]
struct FakeState {
	calls: Vec<String>,
	failing: HashSet<String>,
	responses: Vec<(String, Value)>,
	elements: HashMap<String, ElementInfo>,
	open_contexts: usize,
	open_pages: usize,
	goto_delay: Option<Duration>,
}

/// Cloneable handle; clones share state.
#[derive(Clone, Default)]
pub struct FakeEngine {
	state: Arc<Mutex<FakeState>>,
	next: Arc<AtomicU64>,
}

impl FakeEngine {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every call of `operation` fail (`engine.launch`, `context.new_page`,
	/// `context.close`, `page.goto`, `page.evaluate`, `page.query`,
	/// `page.screenshot`, `page.close`).
	pub fn fail_on(&self, operation: &str) {
		self.state.lock().failing.insert(operation.to_string());
	}

	pub fn clear_failures(&self) {
		self.state.lock().failing.clear();
	}

	/// `evaluate` returns `value` for scripts containing `needle`.
	pub fn respond_to(&self, needle: &str, value: Value) {
		self.state.lock().responses.push((needle.to_string(), value));
	}

	/// `query(selector)` returns `element`.
	pub fn add_element(&self, selector: &str, element: ElementInfo) {
		self.state.lock().elements.insert(selector.to_string(), element);
	}

	/// Slows every `goto` down, to exercise interleaving.
	pub fn set_goto_delay(&self, delay: Duration) {
		self.state.lock().goto_delay = Some(delay);
	}

	/// Every call made so far, as `operation` or `operation:argument`.
	pub fn calls(&self) -> Vec<String> {
		self.state.lock().calls.clone()
	}

	pub fn call_count(&self, operation: &str) -> usize {
		self.state
			.lock()
			.calls
			.iter()
			.filter(|call| call.split(':').next() == Some(operation))
			.count()
	}

	pub fn open_contexts(&self) -> usize {
		self.state.lock().open_contexts
	}

	pub fn open_pages(&self) -> usize {
		self.state.lock().open_pages
	}

	fn record(&self, operation: &str, argument: Option<&str>) -> Result<()> {
		let mut state = self.state.lock();
		state.calls.push(match argument {
			Some(arg) => format!("{operation}:{arg}"),
			None => operation.to_string(),
		});
		if state.failing.contains(operation) {
			return Err(BridgeError::engine(format!("{operation} failed (injected)")));
		}
		Ok(())
	}
}

#[async_trait]
impl Engine for FakeEngine {
	async fn launch(&self, kind: BrowserKind, headless: bool) -> Result<Box<dyn BrowserContext>> {
		self.record("engine.launch", Some(&format!("{kind}:{headless}")))?;
		self.state.lock().open_contexts += 1;
		Ok(Box::new(FakeContext {
			engine: self.clone(),
			closed: Mutex::new(false),
		}))
	}

	async fn shutdown(&self) -> Result<()> {
		self.record("engine.shutdown", None)
	}

	fn name(&self) -> &'static str {
		"fake"
	}
}

struct FakeContext {
	engine: FakeEngine,
	closed: Mutex<bool>,
}

#[async_trait]
impl BrowserContext for FakeContext {
	async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
		self.engine.record("context.new_page", None)?;
		self.engine.state.lock().open_pages += 1;
		let n = self.engine.next.fetch_add(1, Ordering::Relaxed);
		Ok(Box::new(FakePage {
			engine: self.engine.clone(),
			url: "about:blank".to_string(),
			closed: false,
			serial: n,
		}))
	}

	async fn close(&self) -> Result<()> {
		self.engine.record("context.close", None)?;
		let mut closed = self.closed.lock();
		if !*closed {
			*closed = true;
			self.engine.state.lock().open_contexts -= 1;
		}
		Ok(())
	}
}

struct FakePage {
	engine: FakeEngine,
	url: String,
	closed: bool,
	serial: u64,
}

impl FakePage {
	fn ensure_open(&self) -> Result<()> {
		if self.closed {
			return Err(BridgeError::engine(format!("page {} is closed", self.serial)));
		}
		Ok(())
	}
}

#[async_trait]
impl PageHandle for FakePage {
	async fn goto(&mut self, url: &str, _wait_until: WaitUntil) -> Result<String> {
		self.engine.record("page.goto", Some(url))?;
		self.ensure_open()?;
		let delay = self.engine.state.lock().goto_delay;
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		self.url = url.to_string();
		Ok(self.url.clone())
	}

	async fn evaluate(&mut self, script: &str) -> Result<Value> {
		self.engine.record("page.evaluate", Some(script))?;
		self.ensure_open()?;
		if script.trim() == "location.href" {
			return Ok(Value::String(self.url.clone()));
		}
		let state = self.engine.state.lock();
		Ok(state
			.responses
			.iter()
			.find(|(needle, _)| script.contains(needle.as_str()))
			.map(|(_, value)| value.clone())
			.unwrap_or(Value::Null))
	}

	async fn query(&mut self, selector: &str) -> Result<Option<ElementInfo>> {
		self.engine.record("page.query", Some(selector))?;
		self.ensure_open()?;
		Ok(self.engine.state.lock().elements.get(selector).cloned())
	}

	async fn screenshot(&mut self, path: &Path) -> Result<()> {
		self.engine.record("page.screenshot", Some(&path.display().to_string()))?;
		self.ensure_open()?;
		tokio::fs::write(path, b"\x89PNG fake").await?;
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.engine.record("page.close", None)?;
		if !self.closed {
			self.closed = true;
			self.engine.state.lock().open_pages -= 1;
		}
		Ok(())
	}
}
