//! Automation engine boundary.
//!
//! The daemon never talks to a browser directly: it holds boxed trait objects
//! produced by an [`Engine`]. One engine instance (the driver) is owned by the
//! daemon; each registered session owns one [`BrowserContext`] drawn from it,
//! and each page owns one [`PageHandle`]. Every call is fallible and may
//! suspend for as long as the browser needs.

use std::path::Path;

use async_trait::async_trait;
use pw_bridge_protocol::{BrowserKind, WaitUntil};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub mod chromium;
pub mod fake;

pub use chromium::ChromiumEngine;
pub use fake::FakeEngine;

/// Creates isolated browser contexts.
#[async_trait]
pub trait Engine: Send + Sync {
	/// Creates a new context for `kind`.
	async fn launch(&self, kind: BrowserKind, headless: bool) -> Result<Box<dyn BrowserContext>>;

	/// Releases driver-level resources (browser processes). Called once at daemon exit.
	async fn shutdown(&self) -> Result<()> {
		Ok(())
	}

	fn name(&self) -> &'static str;
}

/// One isolated browsing context (cookies, storage, tabs).
#[async_trait]
pub trait BrowserContext: Send + Sync {
	async fn new_page(&self) -> Result<Box<dyn PageHandle>>;

	async fn close(&self) -> Result<()>;
}

/// One navigable page inside a context.
#[async_trait]
pub trait PageHandle: Send {
	/// Navigates and waits for `wait_until`; returns the final URL.
	async fn goto(&mut self, url: &str, wait_until: WaitUntil) -> Result<String>;

	/// Evaluates a JavaScript expression and returns its JSON value.
	async fn evaluate(&mut self, script: &str) -> Result<Value>;

	/// Finds the first element matching a CSS selector.
	async fn query(&mut self, selector: &str) -> Result<Option<ElementInfo>>;

	/// Writes a PNG screenshot of the viewport to `path`.
	async fn screenshot(&mut self, path: &Path) -> Result<()>;

	async fn close(&mut self) -> Result<()>;
}

/// Summary of a DOM element returned by [`PageHandle::query`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
	pub tag: String,
	#[serde(default)]
	pub text: String,
	#[serde(default)]
	pub attributes: serde_json::Map<String, Value>,
	#[serde(default)]
	pub visible: bool,
}
