//! CDP connection over a WebSocket.
//!
//! Implements request/response correlation and event fan-out on top of a
//! page target's debugger socket:
//! - Generating unique request IDs
//! - Correlating responses with pending requests
//! - Distinguishing events from responses
//! - Broadcasting events to every subscriber
//!
//! # Message Flow
//!
//! 1. Caller invokes [`CdpConnection::send`] with a method and params
//! 2. Connection assigns the next ID and parks a oneshot sender under it
//! 3. Request is serialized and written to the socket
//! 4. Reader task receives the response and resolves the matching sender
//! 5. Caller's future completes with the `result` payload or the protocol error
//!
//! Events are pushed into a `broadcast` channel. Subscribe *before* issuing
//! the command whose side effect you want to observe, otherwise the event can
//! arrive before the receiver exists.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use portal_protocol::{CdpEvent, CdpMessage, CdpRequest, CdpResponse, EvaluateResult};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

const EVENT_BUFFER: usize = 256;

/// Live CDP session with one page target.
///
/// Commands may be issued concurrently; responses are matched by ID. The
/// reader task stops when the socket closes or the connection is dropped.
pub struct CdpConnection {
	next_id: AtomicU32,
	sink: AsyncMutex<SplitSink<WsStream, Message>>,
	pending: PendingMap,
	events: broadcast::Sender<CdpEvent>,
	reader: JoinHandle<()>,
}

impl CdpConnection {
	/// Connects to a target's `webSocketDebuggerUrl`.
	pub async fn connect(ws_url: &str) -> Result<Self> {
		let (stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
		debug!(target = "portal.cdp", %ws_url, "connected");

		let (sink, source) = stream.split();
		let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
		let (events, _) = broadcast::channel(EVENT_BUFFER);
		let reader = tokio::spawn(read_loop(source, Arc::clone(&pending), events.clone()));

		Ok(Self {
			next_id: AtomicU32::new(1),
			sink: AsyncMutex::new(sink),
			pending,
			events,
			reader,
		})
	}

	#[cfg(test)]
	fn pending_commands(&self) -> usize {
		self.pending.lock().len()
	}

	/// Receiver for every event arriving after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
		self.events.subscribe()
	}

	/// Sends a command and waits for its result.
	pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);
		let _slot = PendingSlot {
			pending: &self.pending,
			id,
		};

		let text = serde_json::to_string(&CdpRequest {
			id,
			method: method.to_string(),
			params,
		})?;
		trace!(target = "portal.cdp", id, %method, "send");

		self.sink.lock().await.send(Message::Text(text)).await?;

		rx.await.map_err(|_| Error::ConnectionClosed)?
	}

	/// [`send`](Self::send) bounded by `timeout`.
	pub async fn send_with_timeout(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
		tokio::time::timeout(timeout, self.send(method, params))
			.await
			.map_err(|_| Error::Timeout {
				operation: method.to_string(),
				timeout,
			})?
	}

	/// Evaluates `expression` in the page and returns its JSON value.
	///
	/// Promises are awaited when `await_promise` is set. A thrown exception
	/// becomes [`Error::Evaluation`]; `undefined` becomes `Value::Null`.
	pub async fn evaluate(&self, expression: &str, await_promise: bool, timeout: Duration) -> Result<Value> {
		let raw = self
			.send_with_timeout(
				"Runtime.evaluate",
				json!({
					"expression": expression,
					"returnByValue": true,
					"awaitPromise": await_promise,
				}),
				timeout,
			)
			.await?;
		let result: EvaluateResult = serde_json::from_value(raw)?;
		if let Some(exception) = result.exception_details {
			return Err(Error::Evaluation(exception.message().to_string()));
		}
		Ok(result.result.value.unwrap_or(Value::Null))
	}

	/// Waits until one of `methods` arrives on `events`.
	pub async fn wait_for_event(events: &mut broadcast::Receiver<CdpEvent>, methods: &[&str], timeout: Duration) -> Result<CdpEvent> {
		let wait = async {
			loop {
				match events.recv().await {
					Ok(event) if methods.contains(&event.method.as_str()) => return Ok(event),
					Ok(_) => continue,
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						debug!(target = "portal.cdp", skipped, "event receiver lagged");
					}
					Err(broadcast::error::RecvError::Closed) => return Err(Error::ConnectionClosed),
				}
			}
		};

		tokio::time::timeout(timeout, wait).await.map_err(|_| Error::Timeout {
			operation: format!("event {}", methods.join(" | ")),
			timeout,
		})?
	}

	/// Closes the socket and stops the reader. Pending commands fail.
	pub async fn close(&self) {
		if let Err(e) = self.sink.lock().await.close().await {
			debug!(target = "portal.cdp", error = %e, "error closing socket");
		}
		self.reader.abort();
		self.pending.lock().clear();
	}
}

impl Drop for CdpConnection {
	fn drop(&mut self) {
		self.reader.abort();
	}
}

async fn read_loop(mut source: SplitStream<WsStream>, pending: PendingMap, events: broadcast::Sender<CdpEvent>) {
	while let Some(frame) = source.next().await {
		let text = match frame {
			Ok(Message::Text(text)) => text,
			Ok(Message::Close(_)) => break,
			Ok(_) => continue,
			Err(e) => {
				warn!(target = "portal.cdp", error = %e, "socket read failed");
				break;
			}
		};

		match serde_json::from_str::<CdpMessage>(&text) {
			Ok(CdpMessage::Response(response)) => {
				let id = response.id;
				match pending.lock().remove(&id) {
					Some(tx) => {
						let _ = tx.send(into_result(response));
					}
					None => debug!(target = "portal.cdp", id, "response for unknown request"),
				}
			}
			Ok(CdpMessage::Event(event)) => {
				trace!(target = "portal.cdp", method = %event.method, "event");
				let _ = events.send(event);
			}
			Err(e) => debug!(target = "portal.cdp", error = %e, "unparseable message"),
		}
	}

	// Dropping the senders wakes every waiter with `ConnectionClosed`.
	pending.lock().clear();
	debug!(target = "portal.cdp", "reader stopped");
}

/// Frees a command's reply slot when its `send` future ends, including when
/// a timeout drops it.
struct PendingSlot<'a> {
	pending: &'a PendingMap,
	id: u32,
}

impl Drop for PendingSlot<'_> {
	fn drop(&mut self) {
		self.pending.lock().remove(&self.id);
	}
}

fn into_result(response: CdpResponse) -> Result<Value> {
	match (response.result, response.error) {
		(_, Some(error)) => Err(Error::Protocol {
			code: error.code,
			message: error.message,
		}),
		(Some(result), None) => Ok(result),
		(None, None) => Ok(Value::Null),
	}
}

#[cfg(test)]
mod tests {
	use tokio::net::TcpListener;
	use tokio_tungstenite::accept_async;

	use super::*;

	/// Accepts one socket and answers each command through `reply`.
	async fn fake_browser<F>(reply: F) -> String
	where
		F: Fn(&Value) -> Vec<Value> + Send + 'static,
	{
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			let (stream, _) = listener.accept().await.unwrap();
			let mut ws = accept_async(stream).await.unwrap();
			while let Some(Ok(frame)) = ws.next().await {
				let Message::Text(text) = frame else { continue };
				let request: Value = serde_json::from_str(&text).unwrap();
				for out in reply(&request) {
					if ws.send(Message::Text(out.to_string())).await.is_err() {
						return;
					}
				}
			}
		});
		format!("ws://{}/devtools/page/P1", addr)
	}

	#[tokio::test]
	async fn send_resolves_with_matching_result() {
		let url = fake_browser(|req| vec![json!({"id": req["id"], "result": {"echo": req["method"]}})]).await;
		let conn = CdpConnection::connect(&url).await.unwrap();

		let first = conn.send("Page.enable", json!({})).await.unwrap();
		let second = conn.send("Network.enable", json!({})).await.unwrap();
		assert_eq!(first["echo"], "Page.enable");
		assert_eq!(second["echo"], "Network.enable");
	}

	#[tokio::test]
	async fn protocol_error_is_surfaced_with_code() {
		let url = fake_browser(|req| vec![json!({"id": req["id"], "error": {"code": -32000, "message": "Cannot navigate to invalid URL"}})]).await;
		let conn = CdpConnection::connect(&url).await.unwrap();

		let err = conn.send("Page.navigate", json!({"url": "nope"})).await.unwrap_err();
		match err {
			Error::Protocol { code, message } => {
				assert_eq!(code, -32000);
				assert_eq!(message, "Cannot navigate to invalid URL");
			}
			other => panic!("unexpected error: {other}"),
		}
	}

	#[tokio::test]
	async fn events_reach_subscribers() {
		let url = fake_browser(|req| {
			vec![
				json!({"method": "Page.frameStartedLoading", "params": {}}),
				json!({"method": "Page.loadEventFired", "params": {"timestamp": 2.0}}),
				json!({"id": req["id"], "result": {"frameId": "F1"}}),
			]
		})
		.await;
		let conn = CdpConnection::connect(&url).await.unwrap();

		let mut events = conn.subscribe();
		conn.send("Page.navigate", json!({"url": "https://portal.example"})).await.unwrap();
		let event = CdpConnection::wait_for_event(&mut events, &["Page.loadEventFired"], Duration::from_secs(2))
			.await
			.unwrap();
		assert_eq!(event.params["timestamp"], 2.0);
	}

	#[tokio::test]
	async fn evaluate_returns_value_and_maps_exceptions() {
		let url = fake_browser(|req| {
			let expression = req["params"]["expression"].as_str().unwrap_or_default();
			let result = if expression.contains("throw") {
				json!({
					"result": {"type": "object", "subtype": "error"},
					"exceptionDetails": {"text": "Uncaught", "exception": {"type": "object", "description": "Error: boom"}}
				})
			} else {
				json!({"result": {"type": "string", "value": "jwt-token"}})
			};
			vec![json!({"id": req["id"], "result": result})]
		})
		.await;
		let conn = CdpConnection::connect(&url).await.unwrap();

		let value = conn.evaluate("localStorage.getItem('sas4_jwt')", false, Duration::from_secs(1)).await.unwrap();
		assert_eq!(value, json!("jwt-token"));

		let err = conn.evaluate("(() => { throw new Error('boom') })()", false, Duration::from_secs(1)).await.unwrap_err();
		assert!(matches!(err, Error::Evaluation(ref msg) if msg == "Error: boom"));
	}

	#[tokio::test]
	async fn unanswered_command_times_out() {
		let url = fake_browser(|_| Vec::new()).await;
		let conn = CdpConnection::connect(&url).await.unwrap();

		let err = conn.send_with_timeout("Page.navigate", json!({}), Duration::from_millis(50)).await.unwrap_err();
		assert!(matches!(err, Error::Timeout { .. }));
	}

	#[tokio::test]
	async fn timed_out_commands_release_their_reply_slots() {
		let url = fake_browser(|_| Vec::new()).await;
		let conn = CdpConnection::connect(&url).await.unwrap();

		for _ in 0..5 {
			let err = conn.send_with_timeout("Runtime.evaluate", json!({}), Duration::from_millis(10)).await.unwrap_err();
			assert!(matches!(err, Error::Timeout { .. }));
		}
		assert_eq!(conn.pending_commands(), 0);
	}

	#[tokio::test]
	async fn answered_commands_leave_no_reply_slots() {
		let url = fake_browser(|req| vec![json!({"id": req["id"], "result": {}})]).await;
		let conn = CdpConnection::connect(&url).await.unwrap();

		conn.send("Page.enable", json!({})).await.unwrap();
		assert_eq!(conn.pending_commands(), 0);
	}

	#[tokio::test]
	async fn missing_event_times_out() {
		let url = fake_browser(|req| vec![json!({"id": req["id"], "result": {}})]).await;
		let conn = CdpConnection::connect(&url).await.unwrap();

		let mut events = conn.subscribe();
		let err = CdpConnection::wait_for_event(&mut events, &["Page.loadEventFired"], Duration::from_millis(50))
			.await
			.unwrap_err();
		assert!(matches!(err, Error::Timeout { .. }));
	}
}
