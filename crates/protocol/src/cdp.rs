//! Chrome DevTools Protocol message envelopes.
//!
//! CDP is JSON over a WebSocket. The client sends commands carrying a numeric
//! `id`; the browser answers each with a response echoing that `id`, and
//! pushes events (no `id`) whenever a subscribed domain has something to say.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent to the browser.
///
/// ```json
/// { "id": 7, "method": "Runtime.evaluate", "params": { "expression": "1 + 1" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpRequest {
	/// Unique request ID for correlating responses
	pub id: u32,
	/// Domain-qualified method name (`Page.navigate`)
	pub method: String,
	/// Method parameters as JSON object
	pub params: Value,
}

/// Response to a [`CdpRequest`].
///
/// Exactly one of `result` and `error` is present:
/// ```json
/// { "id": 7, "result": { "result": { "type": "number", "value": 2 } } }
/// { "id": 8, "error": { "code": -32000, "message": "Cannot navigate to invalid URL" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpResponse {
	pub id: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CdpErrorPayload>,
}

/// Protocol-level error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpErrorPayload {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
}

/// Event pushed by the browser.
///
/// ```json
/// { "method": "Page.loadEventFired", "params": { "timestamp": 1234.5 } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpEvent {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Any inbound message.
///
/// Responses carry an `id`, events do not; `untagged` tries `Response` first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
	Response(CdpResponse),
	Event(CdpEvent),
}

/// `Runtime.evaluate` result payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
	pub result: RemoteObject,
	#[serde(default)]
	pub exception_details: Option<ExceptionDetails>,
}

/// Mirror object for a JavaScript value returned by `Runtime.evaluate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub subtype: Option<String>,
	#[serde(default)]
	pub value: Option<Value>,
	#[serde(default)]
	pub description: Option<String>,
}

/// Uncaught exception raised while evaluating an expression.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
	pub text: String,
	#[serde(default)]
	pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
	/// Best human-readable message: the thrown error's description when present.
	pub fn message(&self) -> &str {
		self.exception
			.as_ref()
			.and_then(|e| e.description.as_deref())
			.unwrap_or(self.text.as_str())
	}
}

/// `Page.navigate` result payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
	pub frame_id: String,
	#[serde(default)]
	pub loader_id: Option<String>,
	#[serde(default)]
	pub error_text: Option<String>,
}
