//! [`PortalPage`] over the Chrome DevTools Protocol.
//!
//! Launches a local Chromium with remote debugging, attaches to its page
//! target, and does everything else with `Runtime.evaluate`: waiting for
//! selectors, typing, clicking, reading `localStorage`, and issuing `fetch()`
//! from the page's own origin so the portal sees an ordinary XHR.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use portal_protocol::{FetchRequest, NavigateResult, PortalResponse};
use portal_runtime::{BrowserProcess, CdpConnection, LaunchConfig, launch_browser};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{BrowserLauncher, PortalPage};
use crate::config::{BrowserOptions, Credentials, LoginForm};
use crate::error::{Error, Result};
use crate::session::Token;

const SELECTOR_POLL: Duration = Duration::from_millis(100);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const LOAD_EVENTS: &[&str] = &["Page.loadEventFired"];
const SUBMIT_EVENTS: &[&str] = &["Page.frameNavigated", "Page.navigatedWithinDocument", "Page.loadEventFired"];

/// Launches a local Chromium-family browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdpLauncher;

#[async_trait]
impl BrowserLauncher for CdpLauncher {
	type Page = CdpPage;

	async fn launch(&self, options: &BrowserOptions) -> Result<CdpPage> {
		let config = LaunchConfig {
			executable: options.executable.clone(),
			headless: options.headless,
			port: options.port,
			extra_args: launch_args(options),
			startup_timeout: options.startup_timeout(),
		};
		let mut process = launch_browser(&config).await?;

		let connection = match attach(&process).await {
			Ok(connection) => connection,
			Err(err) => {
				if let Err(stop_err) = process.shutdown().await {
					warn!(target = "portal.cdp", error = %stop_err, "failed to stop browser after attach error");
				}
				return Err(Error::BrowserLaunch(err.to_string()));
			}
		};

		let mut page = CdpPage {
			process,
			connection,
			closed: false,
		};
		if let Err(err) = page.prepare(options).await {
			if let Err(close_err) = page.close().await {
				warn!(target = "portal.cdp", error = %close_err, "failed to close browser after setup error");
			}
			return Err(Error::BrowserLaunch(err.to_string()));
		}

		info!(
			target = "portal.cdp",
			port = page.process.port(),
			browser = page.process.version().unwrap_or("unknown"),
			"page ready"
		);
		Ok(page)
	}
}

fn launch_args(options: &BrowserOptions) -> Vec<String> {
	let mut args = vec!["--start-maximized".to_string()];
	args.extend(options.extra_args.iter().cloned());
	args
}

async fn attach(process: &BrowserProcess) -> portal_runtime::Result<CdpConnection> {
	let ws_url = process.page_ws_url().await?;
	CdpConnection::connect(&ws_url).await
}

/// The browser process plus a CDP session on its page target.
pub struct CdpPage {
	process: BrowserProcess,
	connection: CdpConnection,
	closed: bool,
}

impl std::fmt::Debug for CdpPage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CdpPage").field("process", &self.process).field("closed", &self.closed).finish()
	}
}

impl CdpPage {
	/// Enables domains and applies user agent and request blocking.
	async fn prepare(&self, options: &BrowserOptions) -> Result<()> {
		for domain in ["Page.enable", "Runtime.enable", "Network.enable"] {
			self.connection.send_with_timeout(domain, json!({}), COMMAND_TIMEOUT).await?;
		}
		if let Some(user_agent) = &options.user_agent {
			self.connection
				.send_with_timeout("Network.setUserAgentOverride", json!({ "userAgent": user_agent }), COMMAND_TIMEOUT)
				.await?;
		}
		if !options.blocked_url_patterns.is_empty() {
			self.connection
				.send_with_timeout("Network.setBlockedURLs", json!({ "urls": options.blocked_url_patterns }), COMMAND_TIMEOUT)
				.await?;
			debug!(target = "portal.cdp", patterns = options.blocked_url_patterns.len(), "blocking static assets");
		}
		Ok(())
	}

	async fn evaluate(&self, expression: &str, timeout: Duration) -> Result<Value> {
		Ok(self.connection.evaluate(expression, true, timeout).await?)
	}

	/// Polls until `selector` matches an element.
	async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
		let probe = format!("document.querySelector({}) !== null", js_string(selector));
		let deadline = Instant::now() + timeout;

		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() {
				return Err(Error::Timeout {
					operation: format!("selector {selector}"),
					timeout,
				});
			}
			if self.evaluate(&probe, remaining.min(COMMAND_TIMEOUT)).await? == Value::Bool(true) {
				return Ok(());
			}
			tokio::time::sleep(SELECTOR_POLL).await;
		}
	}

	/// Focuses `selector`, clears it and types `text` as keyboard input.
	async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
		let focus = format!(
			"(() => {{ const el = document.querySelector({}); if (!el) return false; el.focus(); el.value = ''; return true; }})()",
			js_string(selector)
		);
		if self.evaluate(&focus, COMMAND_TIMEOUT).await? != Value::Bool(true) {
			return Err(Error::Driver(format!("element {selector} disappeared before typing")));
		}
		self.connection
			.send_with_timeout("Input.insertText", json!({ "text": text }), COMMAND_TIMEOUT)
			.await?;
		Ok(())
	}

	async fn click(&self, selector: &str) -> Result<()> {
		let click = format!(
			"(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
			js_string(selector)
		);
		if self.evaluate(&click, COMMAND_TIMEOUT).await? != Value::Bool(true) {
			return Err(Error::Driver(format!("element {selector} not clickable")));
		}
		Ok(())
	}

	async fn wait_for_ready_state(&self, timeout: Duration) -> Result<()> {
		let deadline = Instant::now() + timeout;
		loop {
			let state = self.evaluate("document.readyState", COMMAND_TIMEOUT).await?;
			if state == "complete" {
				return Ok(());
			}
			if Instant::now() >= deadline {
				return Err(Error::Timeout {
					operation: "document load".to_string(),
					timeout,
				});
			}
			tokio::time::sleep(SELECTOR_POLL).await;
		}
	}
}

#[async_trait]
impl PortalPage for CdpPage {
	async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
		let mut events = self.connection.subscribe();
		let raw = self.connection.send_with_timeout("Page.navigate", json!({ "url": url }), timeout).await?;
		let result: NavigateResult = serde_json::from_value(raw).map_err(|e| Error::Driver(format!("bad Page.navigate reply: {e}")))?;

		if let Some(error_text) = result.error_text {
			return Err(Error::Driver(format!("navigation to {url} failed: {error_text}")));
		}
		// Same-document navigations (hash routes) never fire a load event.
		if result.loader_id.is_some() {
			CdpConnection::wait_for_event(&mut events, LOAD_EVENTS, timeout).await?;
		}
		debug!(target = "portal.cdp", %url, "navigated");
		Ok(())
	}

	async fn fill_and_submit_login(&mut self, form: &LoginForm, credentials: &Credentials) -> Result<()> {
		self.wait_for_selector(&form.username_selector, form.selector_timeout()).await?;
		self.type_into(&form.username_selector, &credentials.username).await?;
		self.type_into(&form.password_selector, &credentials.password).await?;

		let mut events = self.connection.subscribe();
		self.click(&form.submit_selector).await?;
		CdpConnection::wait_for_event(&mut events, SUBMIT_EVENTS, form.submit_timeout()).await?;
		self.wait_for_ready_state(form.submit_timeout()).await?;
		debug!(target = "portal.cdp", "login form submitted");
		Ok(())
	}

	async fn read_stored_token(&mut self, key: &str) -> Result<Option<Token>> {
		let value = self
			.evaluate(&format!("localStorage.getItem({})", js_string(key)), COMMAND_TIMEOUT)
			.await?;
		Ok(match value {
			Value::String(token) if !token.is_empty() => Some(Token::new(token)),
			_ => None,
		})
	}

	async fn dispatch(&mut self, request: &FetchRequest, token: &Token, timeout: Duration) -> Result<PortalResponse> {
		let expression = fetch_expression(request, token);
		let value = self.evaluate(&expression, timeout).await?;
		serde_json::from_value(value).map_err(|e| Error::Driver(format!("unexpected fetch result shape: {e}")))
	}

	async fn close(&mut self) -> Result<()> {
		if self.closed {
			return Ok(());
		}
		self.closed = true;
		self.connection.close().await;
		self.process.shutdown().await?;
		Ok(())
	}
}

/// Default request headers with caller headers layered on top.
///
/// Caller names replace defaults case-insensitively.
fn merged_headers(request: &FetchRequest, token: &Token) -> BTreeMap<String, String> {
	let mut headers: BTreeMap<String, String> = [
		("Authorization", token.bearer()),
		("Accept", "application/json".to_string()),
		("Content-Type", "application/json".to_string()),
		("X-Requested-With", "XMLHttpRequest".to_string()),
	]
	.into_iter()
	.map(|(name, value)| (name.to_string(), value))
	.collect();

	for (name, value) in &request.headers {
		headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
		headers.insert(name.clone(), value.clone());
	}
	headers
}

/// Page-side `fetch()` resolving to `{status, statusText, body}`.
fn fetch_expression(request: &FetchRequest, token: &Token) -> String {
	let mut init = json!({
		"method": request.method.as_str(),
		"headers": merged_headers(request, token),
		"credentials": "include",
	});
	if let Some(body) = &request.body {
		init["body"] = Value::String(body.clone());
	}

	format!(
		"(async () => {{ const r = await fetch({}, {}); return {{ status: r.status, statusText: r.statusText, body: await r.text() }}; }})()",
		js_string(&request.url),
		init
	)
}

/// JSON string literal, which is also a valid JavaScript string literal.
fn js_string(value: &str) -> String {
	Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
	use portal_protocol::HttpMethod;

	use super::*;

	#[test]
	fn default_headers_carry_bearer_token() {
		let headers = merged_headers(&FetchRequest::get("https://portal.example/api"), &Token::new("T1"));
		assert_eq!(headers["Authorization"], "Bearer T1");
		assert_eq!(headers["Accept"], "application/json");
		assert_eq!(headers["Content-Type"], "application/json");
		assert_eq!(headers["X-Requested-With"], "XMLHttpRequest");
	}

	#[test]
	fn caller_headers_override_defaults_case_insensitively() {
		let request = FetchRequest::get("https://portal.example/api")
			.with_header("content-type", "text/plain")
			.with_header("X-Trace", "abc");
		let headers = merged_headers(&request, &Token::new("T1"));
		assert_eq!(headers.get("content-type").map(String::as_str), Some("text/plain"));
		assert!(!headers.contains_key("Content-Type"));
		assert_eq!(headers["X-Trace"], "abc");
		assert_eq!(headers.len(), 5);
	}

	#[test]
	fn fetch_expression_embeds_method_body_and_escaped_url() {
		let request = FetchRequest::new(HttpMethod::Post, "https://portal.example/api?q=\"x\"").with_body("{}");
		let expression = fetch_expression(&request, &Token::new("T1"));
		assert!(expression.contains(r#"fetch("https://portal.example/api?q=\"x\"""#));
		assert!(expression.contains(r#""method":"POST""#));
		assert!(expression.contains(r#""body":"{}""#));
		assert!(expression.contains("await r.text()"));
	}

	#[test]
	fn get_without_body_omits_body_field() {
		let expression = fetch_expression(&FetchRequest::get("https://portal.example/api"), &Token::new("T1"));
		assert!(!expression.contains(r#""body""#));
	}

	#[test]
	fn launch_args_start_maximized_then_extras() {
		let options = BrowserOptions {
			extra_args: vec!["--lang=ar".to_string()],
			..Default::default()
		};
		assert_eq!(launch_args(&options), ["--start-maximized", "--lang=ar"]);
	}
}
