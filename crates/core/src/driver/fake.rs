//! In-memory portal for tests.
//!
//! [`FakePortal`] is both the launcher and the script: every page it launches
//! shares its state, so a test keeps a clone, scripts tokens and responses,
//! hands another clone to the manager, and inspects the recorded calls
//! afterwards.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use portal_protocol::{FetchRequest, HttpMethod, PortalResponse};
use tokio::time::Instant;

use super::{BrowserLauncher, PortalPage};
use crate::config::{BrowserOptions, Credentials, LoginForm};
use crate::error::{Error, Result};
use crate::session::Token;

const DEFAULT_TOKEN: &str = "fake-token";

/// Recorded page interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalCall {
	Launch { headless: bool },
	Navigate { url: String },
	Login { username: String },
	ReadToken { key: String },
	Dispatch { url: String, method: HttpMethod },
	Close,
}

/// One request as the portal saw it.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
	pub url: String,
	pub method: HttpMethod,
	pub token: String,
	pub body: Option<String>,
	pub at: Instant,
}

/// Transport-level failure instead of a response.
#[derive(Debug, Clone)]
pub enum FakeFailure {
	Timeout,
	Driver(String),
}

#[derive(Default)]
struct FakeState {
	tokens: VecDeque<String>,
	issue_no_token: bool,
	responses: VecDeque<std::result::Result<PortalResponse, FakeFailure>>,
	fallback: Option<PortalResponse>,
	launch_failure: Option<String>,
	login_failure: Option<String>,
	login_delay: Duration,
	calls: Vec<PortalCall>,
	dispatches: Vec<DispatchRecord>,
	logins: u32,
	launches: u32,
	closes: u32,
}

/// Scriptable launcher whose pages share one portal state.
#[derive(Clone, Default)]
pub struct FakePortal {
	inner: Arc<Mutex<FakeState>>,
}

impl FakePortal {
	pub fn new() -> Self {
		Self::default()
	}

	/// Tokens handed out by successive logins. Once used up, every login
	/// yields `"fake-token"`.
	pub fn with_tokens<I, S>(self, tokens: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.inner.lock().tokens.extend(tokens.into_iter().map(Into::into));
		self
	}

	/// Logins succeed but never store a token.
	pub fn issue_no_token(&self) {
		self.inner.lock().issue_no_token = true;
	}

	/// Queues a response for the next unanswered dispatch.
	pub fn respond(&self, status: u16, body: impl Into<String>) {
		self.inner.lock().responses.push_back(Ok(PortalResponse::new(status, body)));
	}

	pub fn respond_json(&self, status: u16, body: &serde_json::Value) {
		self.respond(status, body.to_string());
	}

	/// Queues a transport failure for the next unanswered dispatch.
	pub fn fail_next_dispatch(&self, failure: FakeFailure) {
		self.inner.lock().responses.push_back(Err(failure));
	}

	/// Answer for dispatches once the queue is empty (default: 200 `{}`).
	pub fn always_respond(&self, status: u16, body: impl Into<String>) {
		self.inner.lock().fallback = Some(PortalResponse::new(status, body));
	}

	pub fn fail_launch(&self, message: impl Into<String>) {
		self.inner.lock().launch_failure = Some(message.into());
	}

	pub fn fail_login(&self, message: impl Into<String>) {
		self.inner.lock().login_failure = Some(message.into());
	}

	/// Login form submissions take `delay` before the portal answers.
	pub fn delay_logins(&self, delay: Duration) {
		self.inner.lock().login_delay = delay;
	}

	pub fn calls(&self) -> Vec<PortalCall> {
		self.inner.lock().calls.clone()
	}

	pub fn dispatches(&self) -> Vec<DispatchRecord> {
		self.inner.lock().dispatches.clone()
	}

	/// Completed login form submissions.
	pub fn logins(&self) -> u32 {
		self.inner.lock().logins
	}

	pub fn launches(&self) -> u32 {
		self.inner.lock().launches
	}

	pub fn closes(&self) -> u32 {
		self.inner.lock().closes
	}
}

#[async_trait]
impl BrowserLauncher for FakePortal {
	type Page = FakePage;

	async fn launch(&self, options: &BrowserOptions) -> Result<FakePage> {
		let mut state = self.inner.lock();
		state.calls.push(PortalCall::Launch { headless: options.headless });
		if let Some(message) = &state.launch_failure {
			return Err(Error::BrowserLaunch(message.clone()));
		}
		state.launches += 1;
		Ok(FakePage {
			inner: Arc::clone(&self.inner),
			stored_token: None,
			closed: false,
		})
	}
}

/// Page handed out by [`FakePortal`].
pub struct FakePage {
	inner: Arc<Mutex<FakeState>>,
	stored_token: Option<String>,
	closed: bool,
}

impl FakePage {
	fn ensure_open(&self) -> Result<()> {
		if self.closed {
			return Err(Error::Driver("page is closed".to_string()));
		}
		Ok(())
	}
}

#[async_trait]
impl PortalPage for FakePage {
	async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<()> {
		self.ensure_open()?;
		self.inner.lock().calls.push(PortalCall::Navigate { url: url.to_string() });
		Ok(())
	}

	async fn fill_and_submit_login(&mut self, _form: &LoginForm, credentials: &Credentials) -> Result<()> {
		self.ensure_open()?;
		let delay = self.inner.lock().login_delay;
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		let mut state = self.inner.lock();
		state.calls.push(PortalCall::Login {
			username: credentials.username.clone(),
		});
		if let Some(message) = &state.login_failure {
			return Err(Error::Driver(message.clone()));
		}
		state.logins += 1;
		if !state.issue_no_token {
			self.stored_token = Some(state.tokens.pop_front().unwrap_or_else(|| DEFAULT_TOKEN.to_string()));
		}
		Ok(())
	}

	async fn read_stored_token(&mut self, key: &str) -> Result<Option<Token>> {
		self.ensure_open()?;
		self.inner.lock().calls.push(PortalCall::ReadToken { key: key.to_string() });
		Ok(self.stored_token.clone().map(Token::new))
	}

	async fn dispatch(&mut self, request: &FetchRequest, token: &Token, timeout: Duration) -> Result<PortalResponse> {
		self.ensure_open()?;
		let mut state = self.inner.lock();
		state.calls.push(PortalCall::Dispatch {
			url: request.url.clone(),
			method: request.method,
		});
		state.dispatches.push(DispatchRecord {
			url: request.url.clone(),
			method: request.method,
			token: token.as_str().to_string(),
			body: request.body.clone(),
			at: Instant::now(),
		});

		match state.responses.pop_front() {
			Some(Ok(response)) => Ok(response),
			Some(Err(FakeFailure::Timeout)) => Err(Error::Timeout {
				operation: format!("fetch {}", request.url),
				timeout,
			}),
			Some(Err(FakeFailure::Driver(message))) => Err(Error::Driver(message)),
			None => Ok(state.fallback.clone().unwrap_or_else(|| PortalResponse::new(200, "{}"))),
		}
	}

	async fn close(&mut self) -> Result<()> {
		if !self.closed {
			self.closed = true;
			let mut state = self.inner.lock();
			state.closes += 1;
			state.calls.push(PortalCall::Close);
		}
		Ok(())
	}
}
