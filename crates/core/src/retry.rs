//! Bounded retry with linear backoff.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How hard to try before giving up.
///
/// Attempt `n` (1-based) that fails with a retryable error is followed by a
/// sleep of `n * base_delay`; the final attempt is never followed by a sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
	/// Re-logins allowed per request when the portal rejects a token with 401/403.
	pub max_reauthentications: u32,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_secs(1),
			max_reauthentications: 2,
		}
	}
}

impl RetryPolicy {
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts.max(1);
		self
	}

	/// Delay after failed attempt `attempt` (1-based).
	pub fn backoff(&self, attempt: u32) -> Duration {
		self.base_delay.saturating_mul(attempt)
	}

	pub fn is_retryable(&self, err: &Error) -> bool {
		err.is_retryable()
	}

	/// Drives `op` until it succeeds, fails fatally, or runs out of attempts.
	///
	/// Fatal errors come back unchanged; exhaustion wraps the last failure in
	/// [`Error::FetchExhausted`].
	pub async fn run<A: Attempt>(&self, op: &mut A) -> Result<A::Output> {
		let max_attempts = self.max_attempts.max(1);
		let mut state = FetchAttempt::default();

		loop {
			state.index += 1;
			debug!(target = "portal.retry", label = op.label(), attempt = state.index, max_attempts, "attempt");

			let err = match op.attempt(&state).await {
				Ok(output) => return Ok(output),
				Err(err) => err,
			};

			if !self.is_retryable(&err) {
				warn!(target = "portal.retry", label = op.label(), attempt = state.index, error = %err, "attempt failed; not retrying");
				return Err(err);
			}

			warn!(
				target = "portal.retry",
				label = op.label(),
				attempt = state.index,
				max_attempts,
				error = %err,
				"attempt failed"
			);

			if state.index >= max_attempts {
				return Err(Error::FetchExhausted {
					url: op.label().to_string(),
					attempts: state.index,
					source: Box::new(err),
				});
			}

			tokio::time::sleep(self.backoff(state.index)).await;
			state.last_error = Some(err);
		}
	}
}

/// Per-attempt context handed to [`Attempt::attempt`].
#[derive(Debug, Default)]
pub struct FetchAttempt {
	/// 1-based attempt number.
	pub index: u32,
	pub last_error: Option<Error>,
}

impl FetchAttempt {
	/// Whether the previous attempt was rejected with 401/403.
	pub fn after_auth_rejection(&self) -> bool {
		self.last_error.as_ref().is_some_and(Error::is_auth_rejection)
	}
}

/// One retryable unit of work.
#[async_trait]
pub trait Attempt: Send {
	type Output: Send;

	/// Name used in logs and exhaustion errors, usually the request URL.
	fn label(&self) -> &str;

	async fn attempt(&mut self, state: &FetchAttempt) -> Result<Self::Output>;
}
