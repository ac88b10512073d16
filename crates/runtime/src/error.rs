//! Error types for browser lifecycle and CDP transport.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while launching, probing or talking to a browser.
#[derive(Debug, Error)]
pub enum Error {
	/// No usable browser binary on this machine.
	#[error("browser executable not found: {0}")]
	ExecutableNotFound(String),

	/// The browser process could not be started or died during startup.
	#[error("failed to launch browser: {0}")]
	Launch(String),

	/// The HTTP debugging endpoint did not answer usefully.
	#[error("debugging endpoint unavailable: {0}")]
	Endpoint(String),

	/// The browser rejected a command.
	#[error("protocol error {code}: {message}")]
	Protocol { code: i64, message: String },

	/// An evaluated expression threw.
	#[error("evaluation failed: {0}")]
	Evaluation(String),

	#[error("timed out after {timeout:?} waiting for {operation}")]
	Timeout { operation: String, timeout: Duration },

	/// The WebSocket closed while a command was in flight.
	#[error("CDP connection closed")]
	ConnectionClosed,

	#[error("websocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}
