//! Chromium engine built on `chromiumoxide`.
//!
//! One browser process is started lazily per headless mode and shared by all
//! sessions in that mode; each session is an isolated browser context created
//! with `Target.createBrowserContext`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, NavigateParams};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use pw_bridge_protocol::{BrowserKind, WaitUntil};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserContext, ElementInfo, Engine, PageHandle};
use crate::config::EngineConfig;
use crate::error::{BridgeError, Result};

const NETWORK_IDLE_SETTLE: Duration = Duration::from_millis(500);
const READY_POLL: Duration = Duration::from_millis(100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine that launches a local Chromium through `chromiumoxide`.
pub struct ChromiumEngine {
	config: EngineConfig,
	browsers: Mutex<HashMap<bool, Arc<BrowserProcess>>>,
}

struct BrowserProcess {
	/// Write access only for `Browser::close`.
	browser: RwLock<Browser>,
	handler: JoinHandle<()>,
	profile_dir: PathBuf,
	navigation_timeout: Duration,
}

impl ChromiumEngine {
	pub fn new(config: EngineConfig) -> Self {
		Self {
			config,
			browsers: Mutex::new(HashMap::new()),
		}
	}

	async fn browser(&self, headless: bool) -> Result<Arc<BrowserProcess>> {
		let mut browsers = self.browsers.lock().await;
		if let Some(browser) = browsers.get(&headless) {
			if !browser.handler.is_finished() {
				return Ok(browser.clone());
			}
			warn!(target = "pw_bridge.engine", headless, "browser connection lost; relaunching");
		}
		if let Some(stale) = browsers.remove(&headless) {
			stale.terminate().await;
		}
		let browser = Arc::new(self.spawn_browser(headless).await?);
		browsers.insert(headless, browser.clone());
		Ok(browser)
	}

	async fn spawn_browser(&self, headless: bool) -> Result<BrowserProcess> {
		let profile_dir = profile_dir_for(headless);
		std::fs::create_dir_all(&profile_dir)?;
		let config = browser_config(&self.config, headless, &profile_dir)?;

		info!(target = "pw_bridge.engine", headless, profile = %profile_dir.display(), "launching chromium");
		let (browser, mut events) = Browser::launch(config).await.map_err(|e| BridgeError::engine(format!("failed to launch chromium: {e}")))?;
		let handler = tokio::spawn(async move {
			while let Some(event) = events.next().await {
				if let Err(err) = event {
					debug!(target = "pw_bridge.engine", error = %err, "devtools handler stopped");
					break;
				}
			}
		});

		Ok(BrowserProcess {
			browser: RwLock::new(browser),
			handler,
			profile_dir,
			navigation_timeout: Duration::from_secs(self.config.navigation_timeout_secs),
		})
	}
}

impl BrowserProcess {
	async fn terminate(&self) {
		{
			let mut browser = self.browser.write().await;
			if !self.handler.is_finished() {
				if let Err(err) = browser.close().await {
					debug!(target = "pw_bridge.engine", error = %err, "Browser.close failed");
				}
			}
			if let Err(err) = browser.wait().await {
				debug!(target = "pw_bridge.engine", error = %err, "browser already exited");
			}
		}
		self.handler.abort();
		if let Err(err) = std::fs::remove_dir_all(&self.profile_dir) {
			debug!(target = "pw_bridge.engine", error = %err, path = %self.profile_dir.display(), "profile cleanup failed");
		}
	}
}

/// Profile directory for the browser serving one headless mode.
fn profile_dir_for(headless: bool) -> PathBuf {
	let mode = if headless { "headless" } else { "headed" };
	std::env::temp_dir().join(format!("pw-bridge-profile-{}-{mode}", std::process::id()))
}

/// Switches passed on top of the ones `chromiumoxide` always sets.
fn launch_args(config: &EngineConfig) -> Vec<String> {
	let mut args: Vec<String> = [
		"--no-first-run",
		"--no-default-browser-check",
		"--disable-background-networking",
		"--disable-extensions",
		"--disable-sync",
		"--password-store=basic",
	]
	.into_iter()
	.map(String::from)
	.collect();
	args.extend(config.extra_args.iter().cloned());
	args
}

/// Builds the launch configuration; the binary is auto-detected when
/// `chromium_path` is unset.
fn browser_config(config: &EngineConfig, headless: bool, profile_dir: &Path) -> Result<BrowserConfig> {
	if let Some(path) = config.chromium_path.as_deref() {
		if !path.exists() {
			return Err(BridgeError::engine(format!("chromium binary not found at {}", path.display())));
		}
	}

	let mut builder = BrowserConfig::builder()
		.launch_timeout(Duration::from_secs(config.launch_timeout_secs))
		.request_timeout(REQUEST_TIMEOUT)
		.window_size(1280, 720)
		.user_data_dir(profile_dir)
		.args(launch_args(config));
	if !headless {
		builder = builder.with_head();
	}
	if let Some(path) = config.chromium_path.as_deref() {
		builder = builder.chrome_executable(path);
	}
	builder.build().map_err(|e| BridgeError::engine(format!("{e}; install chromium or set PW_BRIDGE_CHROMIUM")))
}

fn cdp_error(err: CdpError) -> BridgeError {
	BridgeError::engine(err.to_string())
}

#[async_trait]
impl Engine for ChromiumEngine {
	async fn launch(&self, kind: BrowserKind, headless: bool) -> Result<Box<dyn BrowserContext>> {
		if kind != BrowserKind::Chromium {
			return Err(BridgeError::engine(format!("{kind} is not supported by the chromium engine")));
		}
		let browser = self.browser(headless).await?;
		let created = browser.browser.read().await.execute(CreateBrowserContextParams::default()).await.map_err(cdp_error)?;
		let context_id = created.result.browser_context_id;
		debug!(target = "pw_bridge.engine", context_id = ?context_id, "browser context created");
		Ok(Box::new(ChromiumContext { browser, context_id }))
	}

	async fn shutdown(&self) -> Result<()> {
		let browsers: Vec<_> = self.browsers.lock().await.drain().map(|(_, browser)| browser).collect();
		for browser in browsers {
			browser.terminate().await;
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"chromium"
	}
}

struct ChromiumContext {
	browser: Arc<BrowserProcess>,
	context_id: BrowserContextId,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
	async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
		let mut target = CreateTargetParams::new("about:blank");
		target.browser_context_id = Some(self.context_id.clone());
		let page = self.browser.browser.read().await.new_page(target).await.map_err(cdp_error)?;
		Ok(Box::new(ChromiumPage {
			page,
			navigation_timeout: self.browser.navigation_timeout,
			closed: false,
		}))
	}

	async fn close(&self) -> Result<()> {
		self.browser
			.browser
			.read()
			.await
			.execute(DisposeBrowserContextParams::new(self.context_id.clone()))
			.await
			.map_err(cdp_error)?;
		Ok(())
	}
}

struct ChromiumPage {
	page: Page,
	navigation_timeout: Duration,
	closed: bool,
}

impl ChromiumPage {
	fn ensure_open(&self) -> Result<()> {
		if self.closed {
			return Err(BridgeError::engine("page is closed"));
		}
		Ok(())
	}

	async fn eval_value(&self, expression: &str) -> Result<Value> {
		self.ensure_open()?;
		let params = EvaluateParams::builder()
			.expression(expression)
			.await_promise(true)
			.return_by_value(true)
			.build()
			.map_err(BridgeError::engine)?;
		let result = self.page.evaluate_expression(params).await.map_err(|e| match e {
			CdpError::JavascriptException(details) => BridgeError::engine(format!("evaluation failed: {}", exception_message(&details))),
			other => cdp_error(other),
		})?;
		Ok(result.value().cloned().unwrap_or(Value::Null))
	}

	async fn wait_for(&self, wait_until: WaitUntil, deadline: Instant) -> Result<()> {
		let accept: &[&str] = match wait_until {
			WaitUntil::Commit => return Ok(()),
			WaitUntil::DomContentLoaded => &["interactive", "complete"],
			WaitUntil::Load | WaitUntil::NetworkIdle => &["complete"],
		};
		loop {
			let state = self.eval_value("document.readyState").await?;
			if state.as_str().is_some_and(|s| accept.contains(&s)) {
				break;
			}
			if Instant::now() >= deadline {
				return Err(BridgeError::engine(format!("navigation did not reach {wait_until:?} in time")));
			}
			tokio::time::sleep(READY_POLL).await;
		}
		if wait_until == WaitUntil::NetworkIdle {
			tokio::time::sleep(NETWORK_IDLE_SETTLE).await;
		}
		Ok(())
	}
}

fn exception_message(details: &chromiumoxide::cdp::js_protocol::runtime::ExceptionDetails) -> String {
	details
		.exception
		.as_ref()
		.and_then(|exception| exception.description.clone())
		.unwrap_or_else(|| details.text.clone())
}

#[async_trait]
impl PageHandle for ChromiumPage {
	async fn goto(&mut self, url: &str, wait_until: WaitUntil) -> Result<String> {
		self.ensure_open()?;
		let deadline = Instant::now() + self.navigation_timeout;
		let navigated = self.page.execute(NavigateParams::new(url)).await.map_err(cdp_error)?;
		if let Some(error) = navigated.result.error_text.as_deref() {
			return Err(BridgeError::engine(format!("navigation to {url} failed: {error}")));
		}
		self.wait_for(wait_until, deadline).await?;
		let href = self.eval_value("location.href").await?;
		Ok(href.as_str().unwrap_or(url).to_string())
	}

	async fn evaluate(&mut self, script: &str) -> Result<Value> {
		self.eval_value(script).await
	}

	async fn query(&mut self, selector: &str) -> Result<Option<ElementInfo>> {
		let selector = serde_json::to_string(selector)?;
		let lookup = format!(
			r#"(() => {{
	const el = document.querySelector({selector});
	if (!el) return null;
	const rect = el.getBoundingClientRect();
	const style = window.getComputedStyle(el);
	const attributes = {{}};
	for (const attr of el.attributes) attributes[attr.name] = attr.value;
	return {{
		tag: el.tagName.toLowerCase(),
		text: (el.innerText || el.textContent || '').trim().slice(0, 500),
		attributes,
		visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none',
	}};
}})()"#
		);
		let value = self.eval_value(&lookup).await?;
		if value.is_null() {
			return Ok(None);
		}
		Ok(Some(serde_json::from_value(value)?))
	}

	async fn screenshot(&mut self, path: &Path) -> Result<()> {
		self.ensure_open()?;
		let params = ScreenshotParams::builder().format(CaptureScreenshotFormat::Png).build();
		let bytes = self.page.screenshot(params).await.map_err(cdp_error)?;
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::write(path, bytes).await?;
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		if self.closed {
			return Ok(());
		}
		self.closed = true;
		self.page.clone().close().await.map_err(cdp_error)
	}
}
