//! Command dispatch.
//!
//! Each request is resolved against the command catalog, checked for
//! required arguments, and routed to one handler. Handler errors and panics
//! are turned into `{"error": ...}` responses here; nothing escapes to the
//! transport.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use pw_bridge_protocol::{BrowserKind, Command, JobStatus, Request, Response, WaitUntil};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, Result};
use crate::jobs::JobStore;
use crate::registry::{Page, ResourceRegistry};
use crate::runner::{JobRunner, panic_message};

pub struct Dispatcher {
	registry: Arc<ResourceRegistry>,
	jobs: Arc<JobStore>,
	runner: JobRunner,
	shutdown: CancellationToken,
}

impl Dispatcher {
	pub fn new(registry: Arc<ResourceRegistry>, jobs: Arc<JobStore>, runner: JobRunner, shutdown: CancellationToken) -> Self {
		Self {
			registry,
			jobs,
			runner,
			shutdown,
		}
	}

	/// Handles one request. Always produces a response.
	pub async fn dispatch(&self, request: Request) -> Response {
		let Some(command) = Command::lookup(&request.command) else {
			debug!(target = "pw_bridge.server", command = %request.command, "unknown command");
			return Response::error(format!("Unknown command: {}", request.command));
		};

		let missing = command.missing_args(&request.args);
		if !missing.is_empty() {
			let err = BridgeError::MissingArguments {
				command: request.command.clone(),
				missing: missing.into_iter().map(str::to_string).collect(),
			};
			return Response::error(err.to_string());
		}

		debug!(target = "pw_bridge.server", %command, "dispatch");
		match AssertUnwindSafe(self.execute(command, &request)).catch_unwind().await {
			Ok(Ok(response)) => response,
			Ok(Err(err)) => {
				debug!(target = "pw_bridge.server", %command, error = %err, "command failed");
				Response::error(err.to_string())
			}
			Err(panic) => {
				let message = panic_message(panic.as_ref());
				error!(target = "pw_bridge.server", %command, panic = %message, "handler panicked");
				Response::error(format!("Internal error in {command}: {message}"))
			}
		}
	}

	async fn execute(&self, command: Command, request: &Request) -> Result<Response> {
		match command {
			Command::Ping => Ok(self.ping()),
			Command::Launch => self.launch(request).await,
			Command::NewPage => self.new_page(request).await,
			Command::Goto => self.goto(request).await,
			Command::Evaluate => self.evaluate(request).await,
			Command::Query => self.query(request).await,
			Command::Screenshot => self.screenshot(request).await,
			Command::ClosePage => self.close_page(request).await,
			Command::CloseSession => self.close_session(request).await,
			Command::ListSessions => Ok(Response::success().with("sessions", serde_json::to_value(self.registry.list_sessions())?)),
			Command::ListPages => {
				let session_id = optional_str(request, "session_id")?;
				let pages = self.registry.list_pages(session_id)?;
				Ok(Response::success().with("pages", serde_json::to_value(pages)?))
			}
			Command::AgentStart => self.start_agent(request),
			Command::AgentResult => self.agent_result(request),
			Command::AgentList => Ok(Response::success().with("jobs", serde_json::to_value(self.jobs.list_jobs())?)),
			Command::Shutdown => {
				info!(target = "pw_bridge.server", "shutdown requested");
				self.shutdown.cancel();
				Ok(Response::success())
			}
		}
	}

	fn ping(&self) -> Response {
		Response::success()
			.with("pid", std::process::id())
			.with("version", env!("CARGO_PKG_VERSION"))
			.with("engine", self.registry.engine().name())
			.with("sessions", self.registry.session_count())
			.with("jobs", self.jobs.active_count())
	}

	async fn launch(&self, request: &Request) -> Result<Response> {
		let browser = match optional_str(request, "browser")? {
			Some(name) => name.parse::<BrowserKind>().map_err(|message| invalid(request, "browser", message))?,
			None => BrowserKind::default(),
		};
		let headless = optional_bool(request, "headless")?.unwrap_or(true);
		let session_id = self.registry.launch(browser, headless).await?;
		Ok(Response::success().with("session_id", session_id))
	}

	async fn new_page(&self, request: &Request) -> Result<Response> {
		let session_id = required_str(request, "session_id")?;
		let page_id = self.registry.new_page(session_id).await?;
		Ok(Response::success().with("page_id", page_id))
	}

	/// Navigates an existing page, or opens one first when no `page_id` is
	/// given (launching a default session when `session_id` is absent too).
	///
	/// Whatever the implicit open created is closed again when navigation
	/// fails.
	async fn goto(&self, request: &Request) -> Result<Response> {
		let url = required_str(request, "url")?;
		let wait_until = match optional_str(request, "wait_until")? {
			Some(name) => name.parse::<WaitUntil>().map_err(|message| invalid(request, "wait_until", message))?,
			None => WaitUntil::default(),
		};

		let (page, opened) = match optional_str(request, "page_id")? {
			Some(page_id) => (self.registry.get_page(page_id)?, Opened::Nothing),
			None => self.open_implicit_page(optional_str(request, "session_id")?).await?,
		};

		let navigated = page.lock().await.goto(url, wait_until).await;
		let final_url = match navigated {
			Ok(final_url) => final_url,
			Err(err) => {
				self.roll_back(&opened, Some(&page.id)).await;
				return Err(err);
			}
		};
		Ok(Response::success()
			.with("page_id", page.id.clone())
			.with("session_id", page.session_id.clone())
			.with("url", final_url))
	}

	async fn open_implicit_page(&self, session_id: Option<&str>) -> Result<(Arc<Page>, Opened)> {
		let (session_id, opened) = match session_id {
			Some(session_id) => (session_id.to_string(), Opened::Page),
			None => {
				let session_id = self.registry.launch(BrowserKind::default(), true).await?;
				(session_id.clone(), Opened::Session(session_id))
			}
		};

		let page = match self.registry.new_page(&session_id).await {
			Ok(page_id) => self.registry.get_page(&page_id),
			Err(err) => Err(err),
		};
		match page {
			Ok(page) => Ok((page, opened)),
			Err(err) => {
				self.roll_back(&opened, None).await;
				Err(err)
			}
		}
	}

	/// Closing the launched session takes its page with it.
	async fn roll_back(&self, opened: &Opened, page_id: Option<&str>) {
		let outcome = match (opened, page_id) {
			(Opened::Session(session_id), _) => self.registry.close_session(session_id).await,
			(Opened::Page, Some(page_id)) => self.registry.close_page(page_id).await,
			_ => return,
		};
		if let Err(err) = outcome {
			warn!(target = "pw_bridge.registry", error = %err, "failed to release resources opened by a failed goto");
		}
	}

	async fn evaluate(&self, request: &Request) -> Result<Response> {
		let page = self.page(request)?;
		let script = required_str(request, "script")?;
		let result = page.lock().await.evaluate(script).await?;
		Ok(Response::success().with("result", result))
	}

	async fn query(&self, request: &Request) -> Result<Response> {
		let page = self.page(request)?;
		let selector = required_str(request, "selector")?;
		let element = page.lock().await.query(selector).await?;
		Ok(Response::success()
			.with("found", element.is_some())
			.with("element", serde_json::to_value(element)?))
	}

	async fn screenshot(&self, request: &Request) -> Result<Response> {
		let page = self.page(request)?;
		let path = PathBuf::from(required_str(request, "path")?);
		page.lock().await.screenshot(&path).await?;
		Ok(Response::success().with("path", path.display().to_string()))
	}

	async fn close_page(&self, request: &Request) -> Result<Response> {
		let closed = self.registry.close_page(required_str(request, "page_id")?).await?;
		Ok(Response::empty().with("success", closed))
	}

	async fn close_session(&self, request: &Request) -> Result<Response> {
		let closed = self.registry.close_session(required_str(request, "session_id")?).await?;
		Ok(Response::empty().with("success", closed))
	}

	/// Creates and schedules a job; returns without waiting for it.
	fn start_agent(&self, request: &Request) -> Result<Response> {
		let page = self.page(request)?;
		let instruction = required_str(request, "query")?;
		let max_actions = if request.has_arg("max_actions") {
			match request.u64_arg("max_actions").and_then(|n| u32::try_from(n).ok()) {
				Some(n) if n > 0 => Some(n),
				_ => return Err(invalid(request, "max_actions", "expected a positive integer")),
			}
		} else {
			None
		};

		let job_id = self.jobs.create_job(&page.id, instruction, max_actions);
		self.runner.schedule(&job_id, page, instruction.to_string(), max_actions);
		info!(target = "pw_bridge.jobs", job_id = %job_id, "agent job scheduled");
		Ok(Response::success().with("job_id", job_id).with("status", JobStatus::Pending.as_str()))
	}

	fn agent_result(&self, request: &Request) -> Result<Response> {
		let job = self.jobs.get_job(required_str(request, "job_id")?)?;
		Ok(Response::empty()
			.with("job_id", job.job_id)
			.with("status", job.status.as_str())
			.with("result", job.result.unwrap_or(Value::Null))
			.with("error", job.error.map(Value::String).unwrap_or(Value::Null)))
	}

	fn page(&self, request: &Request) -> Result<Arc<Page>> {
		self.registry.get_page(required_str(request, "page_id")?)
	}
}

fn invalid(request: &Request, key: &str, message: impl Into<String>) -> BridgeError {
	BridgeError::InvalidArgument {
		command: request.command.clone(),
		key: key.to_string(),
		message: message.into(),
	}
}

/// Resources a `goto` opened on the caller's behalf.
enum Opened {
	Nothing,
	Page,
	Session(String),
}

fn required_str<'a>(request: &'a Request, key: &str) -> Result<&'a str> {
	optional_str(request, key)?.ok_or_else(|| BridgeError::MissingArguments {
		command: request.command.clone(),
		missing: vec![key.to_string()],
	})
}

fn optional_str<'a>(request: &'a Request, key: &str) -> Result<Option<&'a str>> {
	if !request.has_arg(key) {
		return Ok(None);
	}
	request.str_arg(key).map(Some).ok_or_else(|| invalid(request, key, "expected a string"))
}

fn optional_bool(request: &Request, key: &str) -> Result<Option<bool>> {
	if !request.has_arg(key) {
		return Ok(None);
	}
	request.bool_arg(key).map(Some).ok_or_else(|| invalid(request, key, "expected a boolean"))
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use serde_json::json;

	use super::*;
	use crate::agent::DisabledAgent;
	use crate::engine::{ElementInfo, FakeEngine};

	fn dispatcher() -> (FakeEngine, Dispatcher, CancellationToken) {
		let engine = FakeEngine::new();
		let registry = Arc::new(ResourceRegistry::new(Arc::new(engine.clone())));
		let jobs = Arc::new(JobStore::new());
		let runner = JobRunner::new(jobs.clone(), Arc::new(DisabledAgent), 2, 10);
		let shutdown = CancellationToken::new();
		(engine, Dispatcher::new(registry, jobs, runner, shutdown.clone()), shutdown)
	}

	async fn call(dispatcher: &Dispatcher, command: &str, args: Value) -> Response {
		let Value::Object(args) = args else {
			panic!("args must be an object");
		};
		dispatcher.dispatch(Request { command: command.to_string(), args }).await
	}

	#[tokio::test]
	async fn unknown_command_is_reported() {
		let (_, dispatcher, _) = dispatcher();
		let response = call(&dispatcher, "fly", json!({})).await;
		assert_eq!(response.error_message(), Some("Unknown command: fly"));
	}

	#[tokio::test]
	async fn missing_arguments_short_circuit_before_the_engine() {
		let (engine, dispatcher, _) = dispatcher();
		let response = call(&dispatcher, "goto", json!({ "page_id": "page-1" })).await;
		assert_eq!(response.error_message(), Some("Missing required arguments for goto: url"));

		let response = call(&dispatcher, "evaluate", json!({ "script": null })).await;
		assert_eq!(response.error_message(), Some("Missing required arguments for evaluate: page_id, script"));
		assert!(engine.calls().is_empty());
	}

	#[tokio::test]
	async fn aliases_route_to_the_same_handler() {
		let (_, dispatcher, _) = dispatcher();
		let session = call(&dispatcher, "launch", json!({})).await;
		let session_id = session.str_field("session_id").unwrap().to_string();

		let navigated = call(&dispatcher, "navigate", json!({ "url": "https://example.com", "session_id": session_id })).await;
		assert_eq!(navigated.get("success"), Some(&json!(true)));
		let page_id = navigated.str_field("page_id").unwrap().to_string();

		let closed = call(&dispatcher, "close_tab", json!({ "page_id": page_id })).await;
		assert_eq!(closed.get("success"), Some(&json!(true)));
		let closed = call(&dispatcher, "close_browser", json!({ "session_id": session_id })).await;
		assert_eq!(closed.get("success"), Some(&json!(true)));
	}

	#[tokio::test]
	async fn goto_without_ids_launches_a_default_session() {
		let (engine, dispatcher, _) = dispatcher();
		let response = call(&dispatcher, "goto", json!({ "url": "about:blank" })).await;
		assert_eq!(response.str_field("url"), Some("about:blank"));
		assert!(response.str_field("session_id").unwrap().starts_with("chromium-s"));
		assert_eq!(engine.call_count("engine.launch"), 1);
	}

	#[tokio::test]
	async fn failed_goto_without_ids_releases_the_launched_session() {
		let (engine, dispatcher, _) = dispatcher();
		engine.fail_on("page.goto");

		let response = call(&dispatcher, "goto", json!({ "url": "https://example.com" })).await;
		assert_eq!(response.error_message(), Some("Engine error: page.goto failed (injected)"));
		assert_eq!(dispatcher.registry.session_count(), 0);
		assert!(dispatcher.registry.list_pages(None).unwrap().is_empty());
		assert_eq!(engine.open_contexts(), 0);
		assert_eq!(engine.open_pages(), 0);
	}

	#[tokio::test]
	async fn failed_goto_in_a_given_session_closes_only_the_new_page() {
		let (engine, dispatcher, _) = dispatcher();
		let session_id = call(&dispatcher, "launch", json!({})).await.str_field("session_id").unwrap().to_string();
		engine.fail_on("page.goto");

		let response = call(&dispatcher, "goto", json!({ "url": "https://example.com", "session_id": session_id })).await;
		assert!(response.is_error());
		assert!(dispatcher.registry.get_session(&session_id).is_ok());
		assert!(dispatcher.registry.list_pages(Some(&session_id)).unwrap().is_empty());
		assert_eq!(engine.open_pages(), 0);
	}

	#[tokio::test]
	async fn failed_goto_on_an_existing_page_keeps_it() {
		let (engine, dispatcher, _) = dispatcher();
		let page_id = call(&dispatcher, "goto", json!({ "url": "about:blank" })).await.str_field("page_id").unwrap().to_string();
		engine.fail_on("page.goto");

		let response = call(&dispatcher, "goto", json!({ "url": "https://example.com", "page_id": page_id })).await;
		assert!(response.is_error());
		assert!(dispatcher.registry.get_page(&page_id).is_ok());
		assert_eq!(dispatcher.registry.session_count(), 1);
	}

	#[tokio::test]
	async fn session_close_during_navigation_answers_both() {
		let (engine, dispatcher, _) = dispatcher();
		let navigated = call(&dispatcher, "goto", json!({ "url": "about:blank" })).await;
		let page_id = navigated.str_field("page_id").unwrap().to_string();
		let session_id = navigated.str_field("session_id").unwrap().to_string();
		engine.set_goto_delay(Duration::from_millis(100));

		let closing = async {
			tokio::time::sleep(Duration::from_millis(20)).await;
			call(&dispatcher, "close", json!({ "session_id": session_id })).await
		};
		let (navigated, closed) = tokio::time::timeout(
			Duration::from_secs(5),
			async { tokio::join!(call(&dispatcher, "goto", json!({ "page_id": page_id, "url": "https://example.com" })), closing) },
		)
		.await
		.unwrap();

		assert!(navigated.get("success").is_some() || navigated.is_error(), "{navigated:?}");
		assert_eq!(closed.get("success"), Some(&json!(true)));
		assert!(dispatcher.registry.get_page(&page_id).err().unwrap().is_not_found());
		let after = call(&dispatcher, "evaluate", json!({ "page_id": page_id, "script": "1" })).await;
		assert_eq!(after.error_message(), Some(format!("Page not found: {page_id}").as_str()));
	}

	#[tokio::test]
	async fn engine_failures_become_error_responses() {
		let (engine, dispatcher, _) = dispatcher();
		let navigated = call(&dispatcher, "goto", json!({ "url": "about:blank" })).await;
		let page_id = navigated.str_field("page_id").unwrap().to_string();

		engine.fail_on("page.evaluate");
		let response = call(&dispatcher, "evaluate", json!({ "page_id": page_id, "script": "1 + 1" })).await;
		assert_eq!(response.error_message(), Some("Engine error: page.evaluate failed (injected)"));
	}

	#[tokio::test]
	async fn stale_ids_are_not_found() {
		let (_, dispatcher, _) = dispatcher();
		let response = call(&dispatcher, "evaluate", json!({ "page_id": "page-42", "script": "1" })).await;
		assert_eq!(response.error_message(), Some("Page not found: page-42"));
		let response = call(&dispatcher, "new_page", json!({ "session_id": "chromium-s9" })).await;
		assert_eq!(response.error_message(), Some("Session not found: chromium-s9"));
		let response = call(&dispatcher, "get-ai-result", json!({ "job_id": "nonexistent" })).await;
		assert_eq!(response.error_message(), Some("Job not found: nonexistent"));
	}

	#[tokio::test]
	async fn wrong_argument_types_are_rejected() {
		let (_, dispatcher, _) = dispatcher();
		let response = call(&dispatcher, "launch", json!({ "browser": "lynx" })).await;
		assert!(response.error_message().unwrap().contains("unknown browser: lynx"));
		let response = call(&dispatcher, "launch", json!({ "headless": "yes" })).await;
		assert!(response.error_message().unwrap().contains("expected a boolean"));
		let response = call(&dispatcher, "goto", json!({ "url": "https://example.com", "page_id": 7 })).await;
		assert!(response.error_message().unwrap().contains("expected a string"));
		let response = call(&dispatcher, "launch", json!({ "headless": null })).await;
		assert_eq!(response.error_message(), None);
	}

	#[tokio::test]
	async fn query_reports_found_element() {
		let (engine, dispatcher, _) = dispatcher();
		engine.add_element(
			"h1",
			ElementInfo {
				tag: "h1".to_string(),
				text: "Example Domain".to_string(),
				..ElementInfo::default()
			},
		);
		let page_id = call(&dispatcher, "goto", json!({ "url": "about:blank" })).await.str_field("page_id").unwrap().to_string();

		let found = call(&dispatcher, "query", json!({ "page_id": page_id, "selector": "h1" })).await;
		assert_eq!(found.get("found"), Some(&json!(true)));
		assert_eq!(found.get("element").unwrap()["text"], "Example Domain");

		let missing = call(&dispatcher, "query", json!({ "page_id": page_id, "selector": "h2" })).await;
		assert_eq!(missing.get("found"), Some(&json!(false)));
		assert_eq!(missing.get("element"), Some(&Value::Null));
	}

	#[tokio::test]
	async fn agent_job_is_accepted_then_fails_without_model() {
		let (_, dispatcher, _) = dispatcher();
		let page_id = call(&dispatcher, "goto", json!({ "url": "about:blank" })).await.str_field("page_id").unwrap().to_string();

		let started = call(&dispatcher, "ai-agent", json!({ "page_id": page_id, "query": "find heading" })).await;
		assert_eq!(started.str_field("status"), Some("pending"));
		let job_id = started.str_field("job_id").unwrap().to_string();

		let mut result = call(&dispatcher, "get-ai-result", json!({ "job_id": job_id })).await;
		for _ in 0..100 {
			if result.str_field("status") == Some("error") {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
			result = call(&dispatcher, "get-ai-result", json!({ "job_id": job_id })).await;
		}
		assert_eq!(result.str_field("status"), Some("error"));
		assert!(result.str_field("error").unwrap().contains("no agent model configured"));
		assert_eq!(result.get("result"), Some(&Value::Null));
	}

	#[tokio::test]
	async fn agent_rejects_zero_budget() {
		let (_, dispatcher, _) = dispatcher();
		let page_id = call(&dispatcher, "goto", json!({ "url": "about:blank" })).await.str_field("page_id").unwrap().to_string();
		let response = call(&dispatcher, "ai-agent", json!({ "page_id": page_id, "query": "q", "max_actions": 0 })).await;
		assert!(response.error_message().unwrap().contains("max_actions"));
	}

	#[tokio::test]
	async fn shutdown_cancels_the_token() {
		let (_, dispatcher, token) = dispatcher();
		let response = call(&dispatcher, "shutdown", json!({})).await;
		assert_eq!(response.get("success"), Some(&json!(true)));
		assert!(token.is_cancelled());
	}
}
