//! Session lifecycle state and the portal token.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Where the manager is in its lifecycle.
///
/// `Uninitialized -> Initializing -> Unauthenticated <-> Authenticated -> Closed`.
/// A failed initialization drops back to `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
	Uninitialized,
	Initializing,
	Unauthenticated,
	Authenticated,
	Closed,
}

impl fmt::Display for SessionPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SessionPhase::Uninitialized => "uninitialized",
			SessionPhase::Initializing => "initializing",
			SessionPhase::Unauthenticated => "unauthenticated",
			SessionPhase::Authenticated => "authenticated",
			SessionPhase::Closed => "closed",
		};
		f.write_str(name)
	}
}

/// Opaque bearer token issued by the portal. Never logged in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// `Authorization` header value.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}
}

impl fmt::Debug for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Token(<{} chars>)", self.0.len())
	}
}

/// Token plus the moment it was obtained.
#[derive(Debug, Clone)]
pub struct Session {
	phase: SessionPhase,
	token: Option<Token>,
	issued_at: Option<Instant>,
	ttl: Duration,
}

impl Session {
	pub fn new(ttl: Duration) -> Self {
		Self {
			phase: SessionPhase::Uninitialized,
			token: None,
			issued_at: None,
			ttl,
		}
	}

	pub fn phase(&self) -> SessionPhase {
		self.phase
	}

	pub fn token(&self) -> Option<&Token> {
		self.token.as_ref()
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// A token is valid while `now < issued_at + ttl`. A TTL past the clock's
	/// range never expires.
	pub fn is_valid_at(&self, now: Instant) -> bool {
		match (&self.token, self.issued_at) {
			(Some(_), Some(issued)) => issued.checked_add(self.ttl).is_none_or(|deadline| now < deadline),
			_ => false,
		}
	}

	pub fn is_valid(&self) -> bool {
		self.is_valid_at(Instant::now())
	}

	/// Time left on the current token, zero once expired.
	pub fn expires_in(&self) -> Option<Duration> {
		let issued = self.issued_at?;
		self.token.as_ref()?;
		let deadline = issued.checked_add(self.ttl)?;
		Some(deadline.saturating_duration_since(Instant::now()))
	}

	pub(crate) fn begin_initializing(&mut self) {
		self.phase = SessionPhase::Initializing;
	}

	pub(crate) fn mark_ready(&mut self) {
		self.phase = SessionPhase::Unauthenticated;
	}

	/// Back to `Uninitialized` after a failed start.
	pub(crate) fn reset(&mut self) {
		self.phase = SessionPhase::Uninitialized;
		self.token = None;
		self.issued_at = None;
	}

	pub(crate) fn record_token(&mut self, token: Token) {
		self.token = Some(token);
		self.issued_at = Some(Instant::now());
		self.phase = SessionPhase::Authenticated;
	}

	/// Drops the token so the next request logs in again.
	pub(crate) fn invalidate(&mut self) {
		self.token = None;
		self.issued_at = None;
		if self.phase == SessionPhase::Authenticated {
			self.phase = SessionPhase::Unauthenticated;
		}
	}

	pub(crate) fn close(&mut self) {
		self.token = None;
		self.issued_at = None;
		self.phase = SessionPhase::Closed;
	}
}

/// Snapshot for status reporting; carries no secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
	pub phase: SessionPhase,
	pub authenticated: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token_expires_in_secs: Option<u64>,
	pub authentications: u32,
}
