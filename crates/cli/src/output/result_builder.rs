use std::fmt::Write as _;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::output::format::OutputFormat;
use crate::output::model::{Artifact, CommandError, CommandResult, Diagnostic, DiagnosticLevel, ErrorCode, SCHEMA_VERSION};

/// Builder for constructing command results.
pub struct ResultBuilder<T: Serialize> {
	command: String,
	inputs: Option<Value>,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
	artifacts: Vec<Artifact>,
	diagnostics: Vec<Diagnostic>,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			inputs: None,
			data: None,
			error: None,
			start_time: Instant::now(),
			artifacts: Vec::new(),
			diagnostics: Vec::new(),
		}
	}

	pub fn inputs(mut self, inputs: Value) -> Self {
		self.inputs = Some(inputs);
		self
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
		});
		self
	}

	pub fn artifact(mut self, artifact: Artifact) -> Self {
		self.artifacts.push(artifact);
		self
	}

	pub fn diagnostic(mut self, level: DiagnosticLevel, message: impl Into<String>) -> Self {
		self.diagnostics.push(Diagnostic {
			level,
			message: message.into(),
		});
		self
	}

	pub fn build(self) -> CommandResult<T> {
		CommandResult {
			schema_version: Some(SCHEMA_VERSION),
			ok: self.error.is_none() && self.data.is_some(),
			command: self.command,
			inputs: self.inputs,
			data: self.data,
			error: self.error,
			duration_ms: Some(self.start_time.elapsed().as_millis() as u64),
			artifacts: self.artifacts,
			diagnostics: self.diagnostics,
		}
	}
}

/// Print a command result to stdout in the specified format.
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	if let Some(rendered) = render_result(result, format) {
		println!("{rendered}");
	}
}

/// Renders a result without the trailing newline; `None` if it cannot be serialized.
pub fn render_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) -> Option<String> {
	match format {
		OutputFormat::Toon => serde_json::to_value(result).ok().map(|value| toon::encode(&value, None)),
		OutputFormat::Json => serde_json::to_string_pretty(result).ok(),
		OutputFormat::Ndjson => serde_json::to_string(result).ok(),
		OutputFormat::Text => Some(render_text(result)),
	}
}

fn render_text<T: Serialize>(result: &CommandResult<T>) -> String {
	let mut out = String::new();

	if result.ok {
		if let Some(json) = result.data.as_ref().and_then(|data| serde_json::to_string_pretty(data).ok()) {
			let _ = writeln!(out, "{json}");
		}
	} else if let Some(ref error) = result.error {
		let _ = writeln!(out, "Error [{}]: {}", error.code, error.message);
	}

	for diag in &result.diagnostics {
		let prefix = match diag.level {
			DiagnosticLevel::Info => "info",
			DiagnosticLevel::Warning => "warning",
			DiagnosticLevel::Error => "error",
		};
		let _ = writeln!(out, "[{prefix}] {}", diag.message);
	}

	for artifact in &result.artifacts {
		let _ = writeln!(out, "Saved {:?}: {}", artifact.artifact_type, artifact.path.display());
	}

	if let Some(duration_ms) = result.duration_ms {
		let _ = write!(out, "Completed in {duration_ms}ms");
	}
	out
}
