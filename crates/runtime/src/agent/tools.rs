//! Page capabilities handed to agents.
//!
//! Each capability is a script evaluated on the page while holding the page
//! lock, so agent actions never interleave with other commands on that page.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::registry::Page;

const MAX_MATCHES: usize = 20;

pub const SEARCH_PAGE: &str = "search_page";
pub const INTERACT: &str = "interact";
pub const EXPLORE_STRUCTURE: &str = "explore_structure";

/// Interaction verbs accepted by [`PageTools::interact`].
pub const ACTIONS: &[&str] = &["click", "fill", "select", "focus"];

#[derive(Clone)]
pub struct PageTools {
	page: Arc<Page>,
}

impl PageTools {
	pub fn new(page: Arc<Page>) -> Self {
		Self { page }
	}

	pub fn page_id(&self) -> &str {
		&self.page.id
	}

	/// Finds visible elements whose text contains `text` (case-insensitive).
	pub async fn search_page(&self, text: &str) -> Result<Value> {
		let needle = serde_json::to_string(&text.to_lowercase())?;
		let script = format!(
			r#"(() => {{
	const needle = {needle};
	const out = [];
	const path = (el) => {{
		if (el.id) return '#' + CSS.escape(el.id);
		const parts = [];
		for (let node = el; node && node.nodeType === 1 && parts.length < 4; node = node.parentElement) {{
			const index = node.parentElement ? Array.from(node.parentElement.children).indexOf(node) + 1 : 1;
			parts.unshift(node.tagName.toLowerCase() + ':nth-child(' + index + ')');
		}}
		return parts.join(' > ');
	}};
	for (const el of document.body ? document.body.querySelectorAll('*') : []) {{
		if (out.length >= {MAX_MATCHES}) break;
		const own = Array.from(el.childNodes).filter(n => n.nodeType === 3).map(n => n.textContent).join(' ').trim();
		if (own && own.toLowerCase().includes(needle)) {{
			out.push({{ tag: el.tagName.toLowerCase(), text: own.slice(0, 200), selector: path(el) }});
		}}
	}}
	return {{ query: {needle}, matches: out }};
}})()"#
		);
		self.evaluate(SEARCH_PAGE, &script).await
	}

	/// Performs `action` on the first element matching `selector`.
	pub async fn interact(&self, selector: &str, action: &str, value: Option<&str>) -> Result<Value> {
		if !ACTIONS.contains(&action) {
			return Err(BridgeError::InvalidArgument {
				command: INTERACT.to_string(),
				key: "action".to_string(),
				message: format!("expected one of {}, got {action}", ACTIONS.join(", ")),
			});
		}
		if matches!(action, "fill" | "select") && value.is_none() {
			return Err(BridgeError::InvalidArgument {
				command: INTERACT.to_string(),
				key: "value".to_string(),
				message: format!("`{action}` needs a value"),
			});
		}
		let selector_js = serde_json::to_string(selector)?;
		let action_js = serde_json::to_string(action)?;
		let value_js = serde_json::to_string(&value)?;
		let script = format!(
			r#"(() => {{
	const el = document.querySelector({selector_js});
	if (!el) return {{ ok: false, reason: 'no element matches selector' }};
	const action = {action_js};
	const value = {value_js};
	el.scrollIntoView({{ block: 'center' }});
	if (action === 'click') el.click();
	if (action === 'focus') el.focus();
	if (action === 'fill' || action === 'select') {{
		el.focus();
		el.value = value;
		el.dispatchEvent(new Event('input', {{ bubbles: true }}));
		el.dispatchEvent(new Event('change', {{ bubbles: true }}));
	}}
	return {{ ok: true, action, tag: el.tagName.toLowerCase() }};
}})()"#
		);
		self.evaluate(INTERACT, &script).await
	}

	/// Outlines headings, links, buttons, and form fields under `selector`
	/// (the whole document when `None`).
	pub async fn explore_structure(&self, selector: Option<&str>) -> Result<Value> {
		let root_js = serde_json::to_string(&selector)?;
		let script = format!(
			r#"(() => {{
	const rootSelector = {root_js};
	const root = rootSelector ? document.querySelector(rootSelector) : document.body;
	if (!root) return {{ ok: false, reason: 'no element matches selector' }};
	const text = (el) => (el.innerText || el.textContent || '').trim().slice(0, 120);
	const pick = (sel, map) => Array.from(root.querySelectorAll(sel)).slice(0, 40).map(map);
	return {{
		ok: true,
		title: document.title,
		url: location.href,
		headings: pick('h1,h2,h3', el => ({{ level: el.tagName.toLowerCase(), text: text(el) }})),
		links: pick('a[href]', el => ({{ text: text(el), href: el.getAttribute('href') }})),
		buttons: pick('button,[role=button],input[type=submit]', el => ({{ text: text(el) || el.value || '', id: el.id || null }})),
		fields: pick('input:not([type=submit]),textarea,select', el => ({{ tag: el.tagName.toLowerCase(), name: el.name || null, id: el.id || null, type: el.type || null, placeholder: el.placeholder || null }})),
	}};
}})()"#
		);
		self.evaluate(EXPLORE_STRUCTURE, &script).await
	}

	async fn evaluate(&self, tool: &str, script: &str) -> Result<Value> {
		debug!(target = "pw_bridge.agent", page_id = %self.page.id, tool, "page tool");
		self.page.lock().await.evaluate(script).await
	}

	/// Dispatches a tool call by name with JSON arguments.
	pub async fn call(&self, name: &str, args: &Value) -> Result<Value> {
		match name {
			SEARCH_PAGE => self.search_page(required(name, args, "text")?).await,
			INTERACT => self.interact(required(name, args, "selector")?, required(name, args, "action")?, optional(args, "value")).await,
			EXPLORE_STRUCTURE => self.explore_structure(optional(args, "selector")).await,
			other => Err(BridgeError::agent(format!("unknown tool: {other}"))),
		}
	}

	/// Function-tool schemas for chat-completions APIs.
	pub fn definitions() -> Vec<Value> {
		vec![
			function(
				SEARCH_PAGE,
				"Find elements on the current page whose text contains the given string. Returns tag, text, and a CSS selector for each match.",
				json!({
					"type": "object",
					"properties": { "text": { "type": "string", "description": "Text to look for" } },
					"required": ["text"],
				}),
			),
			function(
				INTERACT,
				"Click, fill, select, or focus the first element matching a CSS selector.",
				json!({
					"type": "object",
					"properties": {
						"selector": { "type": "string" },
						"action": { "type": "string", "enum": ACTIONS },
						"value": { "type": "string", "description": "Text for fill or option value for select" },
					},
					"required": ["selector", "action"],
				}),
			),
			function(
				EXPLORE_STRUCTURE,
				"Summarize the page structure (headings, links, buttons, form fields), optionally under a CSS selector.",
				json!({
					"type": "object",
					"properties": { "selector": { "type": "string" } },
				}),
			),
		]
	}
}

fn optional<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
	args.get(key).and_then(Value::as_str)
}

fn required<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str> {
	optional(args, key).ok_or_else(|| BridgeError::MissingArguments {
		command: tool.to_string(),
		missing: vec![key.to_string()],
	})
}

fn function(name: &str, description: &str, parameters: Value) -> Value {
	json!({
		"type": "function",
		"function": { "name": name, "description": description, "parameters": parameters },
	})
}

#[cfg(test)]
mod tests {
	use pw_bridge_protocol::BrowserKind;

	use super::*;
	use crate::engine::FakeEngine;
	use crate::registry::ResourceRegistry;

	async fn tools_on_fake_page() -> (FakeEngine, PageTools) {
		let engine = FakeEngine::new();
		let registry = ResourceRegistry::new(Arc::new(engine.clone()));
		let session_id = registry.launch(BrowserKind::Chromium, true).await.unwrap();
		let page_id = registry.new_page(&session_id).await.unwrap();
		(engine, PageTools::new(registry.get_page(&page_id).unwrap()))
	}

	#[test]
	fn definitions_cover_every_tool() {
		let names: Vec<String> = PageTools::definitions()
			.iter()
			.map(|d| d["function"]["name"].as_str().unwrap().to_string())
			.collect();
		assert_eq!(names, [SEARCH_PAGE, INTERACT, EXPLORE_STRUCTURE]);
	}

	#[tokio::test]
	async fn search_escapes_query_text() {
		let (engine, tools) = tools_on_fake_page().await;
		engine.respond_to("const needle", json!({ "matches": [] }));

		let result = tools.call(SEARCH_PAGE, &json!({ "text": "He said \"hi\"" })).await.unwrap();
		assert_eq!(result, json!({ "matches": [] }));
		let script = engine.calls().into_iter().find(|c| c.starts_with("page.evaluate")).unwrap();
		assert!(script.contains(r#""he said \"hi\"""#));
	}

	#[tokio::test]
	async fn interact_validates_before_touching_the_page() {
		let (engine, tools) = tools_on_fake_page().await;
		let err = tools.interact("#go", "explode", None).await.err().unwrap();
		assert!(matches!(err, BridgeError::InvalidArgument { .. }));
		let err = tools.call(INTERACT, &json!({ "selector": "#q", "action": "fill" })).await.err().unwrap();
		assert!(err.to_string().contains("needs a value"));
		assert_eq!(engine.call_count("page.evaluate"), 0);
	}

	#[tokio::test]
	async fn unknown_tools_and_missing_args_fail() {
		let (_, tools) = tools_on_fake_page().await;
		assert!(tools.call("teleport", &json!({})).await.is_err());
		let err = tools.call(SEARCH_PAGE, &json!({})).await.err().unwrap();
		assert!(matches!(err, BridgeError::MissingArguments { .. }));
	}
}
