//! Session and page registry.
//!
//! Maps opaque ids to live engine objects. Both tables sit behind short-lived
//! synchronous locks that are never held across an await; every page handle
//! additionally has its own async mutex so engine calls against one page run
//! one at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use pw_bridge_protocol::{BrowserKind, PageInfo, SessionInfo};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::engine::{BrowserContext, Engine, PageHandle};
use crate::error::{BridgeError, ResourceKind, Result};
use crate::ids::{IdGenerator, now_ms};

/// A registered browser context.
pub struct Session {
	pub id: String,
	pub browser: BrowserKind,
	pub headless: bool,
	pub created_at: u64,
	context: Box<dyn BrowserContext>,
	closing: AtomicBool,
}

impl Session {
	pub fn is_closing(&self) -> bool {
		self.closing.load(Ordering::SeqCst)
	}
}

/// A registered page. The engine handle is reached through [`Page::lock`].
pub struct Page {
	pub id: String,
	pub session_id: String,
	pub created_at: u64,
	handle: Mutex<Box<dyn PageHandle>>,
}

impl Page {
	/// Waits for exclusive use of the page's engine handle.
	pub async fn lock(&self) -> MutexGuard<'_, Box<dyn PageHandle>> {
		self.handle.lock().await
	}

	pub fn info(&self) -> PageInfo {
		PageInfo {
			page_id: self.id.clone(),
			session_id: self.session_id.clone(),
			created_at: self.created_at,
		}
	}
}

pub struct ResourceRegistry {
	engine: Arc<dyn Engine>,
	ids: IdGenerator,
	sessions: RwLock<HashMap<String, Arc<Session>>>,
	pages: RwLock<HashMap<String, Arc<Page>>>,
}

impl ResourceRegistry {
	pub fn new(engine: Arc<dyn Engine>) -> Self {
		Self {
			engine,
			ids: IdGenerator::new(),
			sessions: RwLock::new(HashMap::new()),
			pages: RwLock::new(HashMap::new()),
		}
	}

	pub fn engine(&self) -> &Arc<dyn Engine> {
		&self.engine
	}

	/// Creates a new engine context and registers it as a session.
	pub async fn launch(&self, browser: BrowserKind, headless: bool) -> Result<String> {
		let context = self.engine.launch(browser, headless).await?;
		let id = self.ids.session_id(browser);
		let session = Arc::new(Session {
			id: id.clone(),
			browser,
			headless,
			created_at: now_ms(),
			context,
			closing: AtomicBool::new(false),
		});
		self.sessions.write().insert(id.clone(), session);
		info!(target = "pw_bridge.registry", session_id = %id, %browser, headless, "session launched");
		Ok(id)
	}

	/// Opens a page in `session_id`.
	pub async fn new_page(&self, session_id: &str) -> Result<String> {
		let session = self.get_session(session_id)?;
		let handle = session.context.new_page().await?;
		let page = Arc::new(Page {
			id: self.ids.page_id(),
			session_id: session.id.clone(),
			created_at: now_ms(),
			handle: Mutex::new(handle),
		});

		// The closing flag is only flipped under the page write lock, so a page
		// inserted here is always seen by the owning session's close cascade.
		let registered = {
			let mut pages = self.pages.write();
			let open = !session.is_closing();
			if open {
				pages.insert(page.id.clone(), page.clone());
			}
			open
		};

		if !registered {
			debug!(target = "pw_bridge.registry", session_id, "session closed while page was opening");
			if let Err(err) = page.lock().await.close().await {
				debug!(target = "pw_bridge.registry", error = %err, "orphan page close failed");
			}
			return Err(BridgeError::not_found(ResourceKind::Session, session_id));
		}

		debug!(target = "pw_bridge.registry", session_id, page_id = %page.id, "page opened");
		Ok(page.id.clone())
	}

	/// Looks up an open session.
	pub fn get_session(&self, session_id: &str) -> Result<Arc<Session>> {
		self.sessions
			.read()
			.get(session_id)
			.filter(|session| !session.is_closing())
			.cloned()
			.ok_or_else(|| BridgeError::not_found(ResourceKind::Session, session_id))
	}

	/// Looks up a page whose session is still open.
	pub fn get_page(&self, page_id: &str) -> Result<Arc<Page>> {
		let page = self.pages.read().get(page_id).cloned();
		let page = page.ok_or_else(|| BridgeError::not_found(ResourceKind::Page, page_id))?;
		let owner_open = self.sessions.read().get(&page.session_id).is_some_and(|session| !session.is_closing());
		if !owner_open {
			return Err(BridgeError::not_found(ResourceKind::Page, page_id));
		}
		Ok(page)
	}

	/// Closes one page. Returns `false` when the id is not registered.
	///
	/// The page is unregistered before the engine call, so an engine failure
	/// still leaves it unreachable.
	pub async fn close_page(&self, page_id: &str) -> Result<bool> {
		let page = self.pages.write().remove(page_id);
		let Some(page) = page else {
			return Ok(false);
		};
		page.lock().await.close().await?;
		debug!(target = "pw_bridge.registry", page_id, "page closed");
		Ok(true)
	}

	/// Closes a session and every page it owns.
	///
	/// Returns `false` when the session is unknown or another caller is
	/// already closing it. Page failures are logged and skipped; a failure to
	/// release the context is returned after the session is unregistered.
	pub async fn close_session(&self, session_id: &str) -> Result<bool> {
		let session = self.sessions.read().get(session_id).cloned();
		let Some(session) = session else {
			return Ok(false);
		};

		let page_ids: Vec<String> = {
			let pages = self.pages.write();
			if session.closing.swap(true, Ordering::SeqCst) {
				return Ok(false);
			}
			pages.values().filter(|page| page.session_id == session_id).map(|page| page.id.clone()).collect()
		};

		for page_id in &page_ids {
			if let Err(err) = self.close_page(page_id).await {
				warn!(target = "pw_bridge.registry", session_id, page_id = %page_id, error = %err, "page close failed during session close");
			}
		}

		let released = session.context.close().await;
		self.sessions.write().remove(session_id);
		info!(target = "pw_bridge.registry", session_id, pages = page_ids.len(), "session closed");
		released.map(|()| true)
	}

	/// Closes every session, logging failures and continuing.
	pub async fn cleanup(&self) -> usize {
		let session_ids: Vec<String> = self.sessions.read().keys().cloned().collect();
		let mut closed = 0;
		for session_id in session_ids {
			match self.close_session(&session_id).await {
				Ok(true) => closed += 1,
				Ok(false) => {}
				Err(err) => {
					closed += 1;
					warn!(target = "pw_bridge.registry", session_id = %session_id, error = %err, "session cleanup failed");
				}
			}
		}
		closed
	}

	pub fn list_sessions(&self) -> Vec<SessionInfo> {
		let sessions: Vec<Arc<Session>> = self.sessions.read().values().filter(|s| !s.is_closing()).cloned().collect();
		let pages = self.pages.read();
		let mut infos: Vec<SessionInfo> = sessions
			.iter()
			.map(|session| SessionInfo {
				session_id: session.id.clone(),
				browser: session.browser,
				headless: session.headless,
				created_at: session.created_at,
				pages: pages.values().filter(|page| page.session_id == session.id).count(),
			})
			.collect();
		infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.session_id.cmp(&b.session_id)));
		infos
	}

	/// Pages of one session, or of every open session.
	pub fn list_pages(&self, session_id: Option<&str>) -> Result<Vec<PageInfo>> {
		if let Some(session_id) = session_id {
			self.get_session(session_id)?;
		}
		let pages: Vec<Arc<Page>> = self
			.pages
			.read()
			.values()
			.filter(|page| session_id.is_none_or(|id| page.session_id == id))
			.cloned()
			.collect();
		let mut infos: Vec<PageInfo> = pages
			.iter()
			.filter(|page| self.get_session(&page.session_id).is_ok())
			.map(|page| page.info())
			.collect();
		infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.page_id.cmp(&b.page_id)));
		Ok(infos)
	}

	pub fn session_count(&self) -> usize {
		self.sessions.read().len()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pw_bridge_protocol::WaitUntil;

	use super::*;
	use crate::engine::FakeEngine;

	fn registry() -> (FakeEngine, ResourceRegistry) {
		let engine = FakeEngine::new();
		let registry = ResourceRegistry::new(Arc::new(engine.clone()));
		(engine, registry)
	}

	#[tokio::test]
	async fn unknown_ids_are_not_found() {
		let (_, registry) = registry();
		assert!(registry.get_session("chromium-s9").err().unwrap().is_not_found());
		assert!(registry.get_page("page-9").err().unwrap().is_not_found());
		assert!(registry.new_page("chromium-s9").await.err().unwrap().is_not_found());
	}

	#[tokio::test]
	async fn launch_open_navigate_close() {
		let (engine, registry) = registry();
		let session_id = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let page_id = registry.new_page(&session_id).await.unwrap();

		let page = registry.get_page(&page_id).unwrap();
		let url = page.lock().await.goto("about:blank", WaitUntil::Load).await.unwrap();
		assert_eq!(url, "about:blank");
		drop(page);

		assert!(registry.close_session(&session_id).await.unwrap());
		assert!(registry.get_page(&page_id).err().unwrap().is_not_found());
		assert!(registry.get_session(&session_id).err().unwrap().is_not_found());
		assert_eq!(engine.open_pages(), 0);
		assert_eq!(engine.open_contexts(), 0);
	}

	#[tokio::test]
	async fn session_close_cascades_to_every_page() {
		let (_, registry) = registry();
		let session_id = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let other = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let mut owned = Vec::new();
		for _ in 0..5 {
			owned.push(registry.new_page(&session_id).await.unwrap());
		}
		let survivor = registry.new_page(&other).await.unwrap();

		registry.close_session(&session_id).await.unwrap();
		for page_id in &owned {
			assert!(registry.get_page(page_id).err().unwrap().is_not_found());
		}
		assert!(registry.get_page(&survivor).is_ok());
	}

	#[tokio::test]
	async fn page_close_failures_do_not_stop_cascade() {
		let (engine, registry) = registry();
		let session_id = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let first = registry.new_page(&session_id).await.unwrap();
		let second = registry.new_page(&session_id).await.unwrap();
		engine.fail_on("page.close");

		assert!(registry.close_session(&session_id).await.unwrap());
		assert_eq!(engine.call_count("page.close"), 2);
		assert_eq!(engine.call_count("context.close"), 1);
		assert!(registry.get_page(&first).is_err());
		assert!(registry.get_page(&second).is_err());
		assert_eq!(registry.session_count(), 0);
	}

	#[tokio::test]
	async fn context_failure_is_reported_after_unregistering() {
		let (engine, registry) = registry();
		let session_id = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		engine.fail_on("context.close");

		assert!(registry.close_session(&session_id).await.is_err());
		assert_eq!(registry.session_count(), 0);
		assert!(!registry.close_session(&session_id).await.unwrap());
	}

	#[tokio::test]
	async fn closing_twice_is_a_noop() {
		let (engine, registry) = registry();
		let session_id = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let page_id = registry.new_page(&session_id).await.unwrap();

		assert!(registry.close_page(&page_id).await.unwrap());
		assert!(!registry.close_page(&page_id).await.unwrap());
		assert!(registry.close_session(&session_id).await.unwrap());
		assert!(!registry.close_session(&session_id).await.unwrap());
		assert_eq!(engine.call_count("page.close"), 1);
		assert_eq!(engine.call_count("context.close"), 1);
	}

	#[tokio::test]
	async fn concurrent_session_closes_report_success_once() {
		let (engine, registry) = registry();
		let session_id = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let page_id = registry.new_page(&session_id).await.unwrap();
		let page = registry.get_page(&page_id).unwrap();
		let busy = page.lock().await;

		let (first, second, ()) = tokio::join!(registry.close_session(&session_id), registry.close_session(&session_id), async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			drop(busy);
		});
		let outcomes = [first.unwrap(), second.unwrap()];
		assert_eq!(outcomes.iter().filter(|closed| **closed).count(), 1, "{outcomes:?}");
		assert_eq!(engine.call_count("context.close"), 1);
		assert_eq!(registry.session_count(), 0);
	}

	#[tokio::test]
	async fn concurrent_page_closes_report_success_once() {
		let (engine, registry) = registry();
		let session_id = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let page_id = registry.new_page(&session_id).await.unwrap();
		let page = registry.get_page(&page_id).unwrap();
		let busy = page.lock().await;

		let (first, second, ()) = tokio::join!(registry.close_page(&page_id), registry.close_page(&page_id), async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			drop(busy);
		});
		let outcomes = [first.unwrap(), second.unwrap()];
		assert_eq!(outcomes.iter().filter(|closed| **closed).count(), 1, "{outcomes:?}");
		assert_eq!(engine.call_count("page.close"), 1);
		assert!(registry.get_page(&page_id).err().unwrap().is_not_found());
	}

	#[tokio::test]
	async fn rapid_launches_get_distinct_ids() {
		let (_, registry) = registry();
		let first = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let second = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		assert_ne!(first, second);
		assert!(first.starts_with("chromium-s"));
	}

	#[tokio::test]
	async fn failed_launch_registers_nothing() {
		let (engine, registry) = registry();
		engine.fail_on("engine.launch");
		assert!(registry.launch(BrowserKind::Chromium, true).await.is_err());
		assert_eq!(registry.session_count(), 0);
	}

	#[tokio::test]
	async fn listings_reflect_open_resources() {
		let (_, registry) = registry();
		let first = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let second = registry.launch(BrowserKind::Chromium, false).await.unwrap();
		registry.new_page(&first).await.unwrap();
		registry.new_page(&first).await.unwrap();
		registry.new_page(&second).await.unwrap();

		let sessions = registry.list_sessions();
		assert_eq!(sessions.len(), 2);
		let first_info = sessions.iter().find(|s| s.session_id == first).unwrap();
		assert_eq!(first_info.pages, 2);

		assert_eq!(registry.list_pages(None).unwrap().len(), 3);
		assert_eq!(registry.list_pages(Some(&second)).unwrap().len(), 1);
		assert!(registry.list_pages(Some("nope")).is_err());
	}

	#[tokio::test]
	async fn cleanup_closes_everything() {
		let (engine, registry) = registry();
		for _ in 0..3 {
			let session_id = registry.launch(BrowserKind::Chromium, true).await.unwrap();
			registry.new_page(&session_id).await.unwrap();
		}
		engine.fail_on("context.close");
		assert_eq!(registry.cleanup().await, 3);
		assert_eq!(registry.session_count(), 0);
		assert_eq!(engine.open_pages(), 0);
	}
}
