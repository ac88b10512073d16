//! JSON result envelope printed by every command.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// `{ ok, command, data | error, durationMs }`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Stable error codes for scripts consuming the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	BrowserLaunchFailed,
	AuthError,
	Timeout,
	HttpError,
	RetriesExhausted,
	ReauthLimit,
	InvalidResponse,
	SessionError,
	ConfigError,
	InvalidInput,
	Interrupted,
	IoError,
	InternalError,
}

impl ErrorCode {
	/// Code for a portal error.
	pub fn for_portal(err: &portal::Error) -> Self {
		use portal::Error;

		match err {
			Error::BrowserLaunch(_) => ErrorCode::BrowserLaunchFailed,
			Error::Authentication(_) => ErrorCode::AuthError,
			Error::Timeout { .. } => ErrorCode::Timeout,
			Error::HttpStatus { .. } => ErrorCode::HttpError,
			Error::FetchExhausted { .. } => ErrorCode::RetriesExhausted,
			Error::ReauthenticationLimit { .. } => ErrorCode::ReauthLimit,
			Error::InvalidBody { .. } | Error::UnexpectedResponse { .. } => ErrorCode::InvalidResponse,
			Error::Driver(_) | Error::NotInitialized | Error::SessionClosed => ErrorCode::SessionError,
			Error::Config(_) => ErrorCode::ConfigError,
			Error::Io(_) => ErrorCode::IoError,
		}
	}

	/// Code for an error bubbling out of a command, found by walking its chain.
	pub fn classify(err: &anyhow::Error) -> Self {
		for cause in err.chain() {
			if let Some(portal) = cause.downcast_ref::<portal::Error>() {
				return Self::for_portal(portal);
			}
			if cause.downcast_ref::<crate::signal::Interrupted>().is_some() {
				return ErrorCode::Interrupted;
			}
			if cause.downcast_ref::<crate::commands::InvalidInput>().is_some() {
				return ErrorCode::InvalidInput;
			}
			if cause.downcast_ref::<std::io::Error>().is_some() {
				return ErrorCode::IoError;
			}
		}
		ErrorCode::InternalError
	}
}

/// Details worth surfacing next to the message: status, attempts, last cause.
fn details_for(err: &anyhow::Error) -> Option<serde_json::Value> {
	let portal = err.chain().find_map(|cause| cause.downcast_ref::<portal::Error>())?;
	match portal {
		portal::Error::FetchExhausted { url, attempts, source } => Some(serde_json::json!({
			"url": url,
			"attempts": attempts,
			"status": source.status(),
			"lastError": source.to_string(),
		})),
		portal::Error::HttpStatus { status, url } => Some(serde_json::json!({ "url": url, "status": status })),
		portal::Error::ReauthenticationLimit { limit, .. } => Some(serde_json::json!({ "limit": limit })),
		_ => None,
	}
}

/// Builds a [`CommandResult`] and stamps its duration.
pub struct ResultBuilder<T: Serialize> {
	command: String,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			error: None,
			start_time: Instant::now(),
		}
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
			details: None,
		});
		self
	}

	pub fn failure(mut self, err: &anyhow::Error) -> Self {
		self.error = Some(CommandError {
			code: ErrorCode::classify(err),
			message: format!("{err:#}"),
			details: details_for(err),
		});
		self
	}

	pub fn build(self) -> CommandResult<T> {
		CommandResult {
			ok: self.error.is_none(),
			command: self.command,
			data: self.data,
			error: self.error,
			duration_ms: Some(self.start_time.elapsed().as_millis() as u64),
		}
	}
}

impl<T: Serialize> CommandResult<T> {
	/// Pretty JSON on stdout.
	pub fn print(&self) {
		match serde_json::to_string_pretty(self) {
			Ok(json) => println!("{json}"),
			Err(e) => eprintln!("failed to serialize result: {e}"),
		}
	}
}
