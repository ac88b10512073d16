//! Error taxonomy for session and fetch operations.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for portal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the session manager and its browser page.
#[derive(Debug, Error)]
pub enum Error {
	/// The automation runtime could not be started. Fatal.
	#[error("browser launch failed: {0}")]
	BrowserLaunch(String),

	/// Login completed without yielding a token, or credentials are missing.
	#[error("authentication failed: {0}")]
	Authentication(String),

	/// A navigation, selector wait or in-page request ran out of time.
	#[error("timed out after {timeout:?} waiting for {operation}")]
	Timeout { operation: String, timeout: Duration },

	/// The portal answered with a non-2xx status.
	#[error("HTTP {status} from {url}")]
	HttpStatus { status: u16, url: String },

	/// Every attempt failed; `source` is the last failure.
	#[error("giving up on {url} after {attempts} attempts: {source}")]
	FetchExhausted {
		url: String,
		attempts: u32,
		#[source]
		source: Box<Error>,
	},

	/// Fresh tokens kept being rejected with 401/403.
	#[error("portal rejected the session after {limit} re-authentications: {source}")]
	ReauthenticationLimit {
		limit: u32,
		#[source]
		source: Box<Error>,
	},

	/// Transient automation or transport failure (page script threw, socket hiccup).
	#[error("browser automation failed: {0}")]
	Driver(String),

	/// A 2xx response whose body is not JSON.
	#[error("invalid JSON body from {url}: {source}")]
	InvalidBody {
		url: String,
		#[source]
		source: serde_json::Error,
	},

	/// A successful response missing data the caller requires.
	#[error("unexpected response from {url}: {reason}")]
	UnexpectedResponse { url: String, reason: String },

	#[error("session is not initialized; call initialize() first")]
	NotInitialized,

	#[error("session is closed")]
	SessionClosed,

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	/// HTTP status carried by this error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Error::HttpStatus { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// 401 and 403: the token is expired or was never accepted.
	pub fn is_auth_rejection(&self) -> bool {
		matches!(self.status(), Some(401 | 403))
	}

	/// Whether another attempt could plausibly succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Error::Authentication(_) | Error::Timeout { .. } | Error::HttpStatus { .. } | Error::Driver(_) | Error::InvalidBody { .. }
		)
	}
}

impl From<portal_runtime::Error> for Error {
	fn from(err: portal_runtime::Error) -> Self {
		use portal_runtime::Error as Runtime;

		match err {
			Runtime::ExecutableNotFound(msg) | Runtime::Launch(msg) => Error::BrowserLaunch(msg),
			Runtime::Timeout { operation, timeout } => Error::Timeout { operation, timeout },
			other => Error::Driver(other.to_string()),
		}
	}
}
