//! The session manager: one page, one token, bounded retries.

use async_trait::async_trait;
use portal_protocol::{FetchRequest, PortalResponse};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::PortalConfig;
use crate::driver::{BrowserLauncher, PortalPage};
use crate::error::{Error, Result};
use crate::retry::{Attempt, FetchAttempt, RetryPolicy};
use crate::session::{Session, SessionPhase, SessionStatus, Token};

#[cfg(test)]
mod tests;

/// Keeps a single authenticated portal session alive and fetches through it.
///
/// Calls take `&mut self`; callers sharing a manager serialize access
/// themselves (the HTTP server wraps it in a `tokio::sync::Mutex`).
pub struct SessionManager<L: BrowserLauncher> {
	launcher: L,
	config: PortalConfig,
	policy: RetryPolicy,
	page: Option<L::Page>,
	session: Session,
	authentications: u32,
}

impl<L: BrowserLauncher> SessionManager<L> {
	pub fn new(launcher: L, config: PortalConfig) -> Self {
		let policy = config.retry.policy();
		let session = Session::new(config.token_ttl());
		Self {
			launcher,
			config,
			policy,
			page: None,
			session,
			authentications: 0,
		}
	}

	pub fn config(&self) -> &PortalConfig {
		&self.config
	}

	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	pub fn session(&self) -> &Session {
		&self.session
	}

	/// Successful logins since construction.
	pub fn authentications(&self) -> u32 {
		self.authentications
	}

	pub fn is_authenticated(&self) -> bool {
		self.session.is_valid()
	}

	pub fn status(&self) -> SessionStatus {
		let authenticated = self.session.is_valid();
		SessionStatus {
			phase: self.session.phase(),
			authenticated,
			token_expires_in_secs: self.session.expires_in().filter(|_| authenticated).map(|d| d.as_secs()),
			authentications: self.authentications,
		}
	}

	/// Starts the browser. Calling it again while a page is held does nothing.
	pub async fn initialize(&mut self) -> Result<()> {
		match self.session.phase() {
			SessionPhase::Closed => return Err(Error::SessionClosed),
			_ if self.page.is_some() => {
				debug!(target = "portal.session", "already initialized");
				return Ok(());
			}
			_ => {}
		}

		self.session.begin_initializing();
		match self.launcher.launch(&self.config.browser).await {
			Ok(page) => {
				self.page = Some(page);
				self.session.mark_ready();
				info!(target = "portal.session", headless = self.config.browser.headless, "browser initialized");
				Ok(())
			}
			Err(err) => {
				self.session.reset();
				warn!(target = "portal.session", error = %err, "browser initialization failed");
				Err(err)
			}
		}
	}

	/// Logs in through the portal form and records the stored token.
	///
	/// Any failure leaves the session unauthenticated.
	pub async fn authenticate(&mut self) -> Result<()> {
		self.check_open()?;
		self.session.invalidate();

		let Some(page) = self.page.as_mut() else {
			return Err(Error::NotInitialized);
		};
		info!(target = "portal.session", username = %self.config.credentials.username, "authenticating");

		match login(page, &self.config).await {
			Ok(token) => {
				self.session.record_token(token);
				self.authentications += 1;
				info!(
					target = "portal.session",
					authentications = self.authentications,
					ttl_secs = self.session.ttl().as_secs(),
					"authenticated"
				);
				Ok(())
			}
			Err(err) => {
				warn!(target = "portal.session", error = %err, "authentication failed");
				Err(err)
			}
		}
	}

	/// Re-authenticates only when there is no token or it has expired.
	pub async fn ensure_authenticated(&mut self) -> Result<()> {
		self.check_open()?;
		if self.session.is_valid() {
			return Ok(());
		}
		if self.session.token().is_some() {
			debug!(target = "portal.session", "token expired");
		}
		self.authenticate().await
	}

	/// Forgets the current token without touching the page.
	pub fn invalidate(&mut self) {
		if self.session.token().is_some() {
			debug!(target = "portal.session", "session invalidated");
		}
		self.session.invalidate();
	}

	/// Fetches with the configured retry policy.
	pub async fn fetch_with_retry(&mut self, request: &FetchRequest) -> Result<Value> {
		let policy = self.policy;
		self.fetch_with_policy(request, &policy).await
	}

	/// Like [`fetch_with_retry`](Self::fetch_with_retry) with a different attempt count.
	pub async fn fetch_with_attempts(&mut self, request: &FetchRequest, max_attempts: u32) -> Result<Value> {
		let policy = self.policy.with_max_attempts(max_attempts);
		self.fetch_with_policy(request, &policy).await
	}

	/// Authenticates as needed, dispatches `request`, and parses the JSON body.
	///
	/// A 401/403 invalidates the token so the next attempt logs in again, at
	/// most `policy.max_reauthentications` times per call. A rejection on the
	/// last attempt counts toward exhaustion, not the re-login budget.
	pub async fn fetch_with_policy(&mut self, request: &FetchRequest, policy: &RetryPolicy) -> Result<Value> {
		self.check_open()?;
		let mut op = FetchOperation {
			manager: self,
			request,
			reauthentications: 0,
			max_reauthentications: policy.max_reauthentications,
			max_attempts: policy.max_attempts.max(1),
		};
		policy.run(&mut op).await
	}

	/// Dashboard summary.
	pub async fn fetch_dashboard(&mut self) -> Result<Value> {
		let url = self.config.endpoint_url(&self.config.endpoints.dashboard);
		self.fetch_with_retry(&FetchRequest::get(url)).await
	}

	/// Manager list; the portal wraps it in a `data` array.
	pub async fn fetch_managers(&mut self) -> Result<Value> {
		let url = self.config.endpoint_url(&self.config.endpoints.managers);
		let request = FetchRequest::post(&url).with_json_body(&json!({}));
		let response = self.fetch_with_retry(&request).await?;

		match response.get("data") {
			Some(Value::Array(managers)) => {
				info!(target = "portal.session", count = managers.len(), "fetched managers");
				Ok(response)
			}
			_ => Err(Error::UnexpectedResponse {
				url,
				reason: "no `data` array in managers response".to_string(),
			}),
		}
	}

	/// Closes the browser. Safe before `initialize` and safe to repeat.
	pub async fn cleanup(&mut self) {
		if let Some(mut page) = self.page.take() {
			match page.close().await {
				Ok(()) => info!(target = "portal.session", "browser closed"),
				Err(err) => warn!(target = "portal.session", error = %err, "error while closing browser"),
			}
		}
		self.session.close();
	}

	fn check_open(&self) -> Result<()> {
		match self.session.phase() {
			SessionPhase::Closed => Err(Error::SessionClosed),
			_ if self.page.is_none() => Err(Error::NotInitialized),
			_ => Ok(()),
		}
	}

	/// One request against the current token, no retry.
	async fn dispatch_once(&mut self, request: &FetchRequest) -> Result<Value> {
		let token = self.session.token().cloned().ok_or_else(|| Error::Authentication("no session token".to_string()))?;
		let timeout = self.config.request_timeout();
		let page = self.page.as_mut().ok_or(Error::NotInitialized)?;

		let response = page.dispatch(request, &token, timeout).await?;
		debug!(target = "portal.session", url = %request.url, method = %request.method, status = response.status, "response");
		parse_response(&request.url, response)
	}
}

async fn login<P: PortalPage>(page: &mut P, config: &PortalConfig) -> Result<Token> {
	if !config.credentials.is_complete() {
		return Err(Error::Authentication(
			"no credentials configured; set PORTAL_USERNAME and PORTAL_PASSWORD".to_string(),
		));
	}

	page.navigate(&config.login_url(), config.navigation_timeout()).await?;
	page.fill_and_submit_login(&config.login_form, &config.credentials).await?;
	page.read_stored_token(&config.token_storage_key)
		.await?
		.ok_or_else(|| Error::Authentication(format!("no token under `{}` after login", config.token_storage_key)))
}

fn parse_response(url: &str, response: PortalResponse) -> Result<Value> {
	if !response.is_success() {
		return Err(Error::HttpStatus {
			status: response.status,
			url: url.to_string(),
		});
	}
	if response.body.trim().is_empty() {
		return Ok(Value::Null);
	}
	serde_json::from_str(&response.body).map_err(|source| Error::InvalidBody {
		url: url.to_string(),
		source,
	})
}

/// A fetch as a retryable [`Attempt`], tracking its re-login budget.
struct FetchOperation<'a, L: BrowserLauncher> {
	manager: &'a mut SessionManager<L>,
	request: &'a FetchRequest,
	reauthentications: u32,
	max_reauthentications: u32,
	max_attempts: u32,
}

#[async_trait]
impl<L: BrowserLauncher> Attempt for FetchOperation<'_, L> {
	type Output = Value;

	fn label(&self) -> &str {
		&self.request.url
	}

	async fn attempt(&mut self, state: &FetchAttempt) -> Result<Value> {
		if state.after_auth_rejection() {
			debug!(target = "portal.session", url = %self.request.url, attempt = state.index, "retrying with a fresh login");
		}
		self.manager.ensure_authenticated().await?;

		let err = match self.manager.dispatch_once(self.request).await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};
		if !err.is_auth_rejection() {
			return Err(err);
		}

		self.manager.invalidate();
		if state.index >= self.max_attempts {
			return Err(err);
		}

		if self.reauthentications >= self.max_reauthentications {
			warn!(
				target = "portal.session",
				url = %self.request.url,
				attempt = state.index,
				limit = self.max_reauthentications,
				"token rejected again; re-authentication budget spent"
			);
			return Err(Error::ReauthenticationLimit {
				limit: self.max_reauthentications,
				source: Box::new(err),
			});
		}

		self.reauthentications += 1;
		info!(
			target = "portal.session",
			url = %self.request.url,
			attempt = state.index,
			status = err.status().unwrap_or_default(),
			"token rejected; re-authenticating on next attempt"
		);
		Err(err)
	}
}
