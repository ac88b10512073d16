//! Browser capabilities the session manager relies on.
//!
//! The manager never talks to a browser directly; it asks a
//! [`BrowserLauncher`] for a [`PortalPage`] and drives that.

use std::time::Duration;

use async_trait::async_trait;
use portal_protocol::{FetchRequest, PortalResponse};

use crate::config::{BrowserOptions, Credentials, LoginForm};
use crate::error::Result;
use crate::session::Token;

pub mod cdp;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use cdp::{CdpLauncher, CdpPage};

/// Starts the automation runtime and hands back its one page.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
	type Page: PortalPage;

	/// Fails with [`Error::BrowserLaunch`](crate::Error::BrowserLaunch) when
	/// the runtime cannot be started.
	async fn launch(&self, options: &BrowserOptions) -> Result<Self::Page>;
}

/// A single browser page pointed at the portal.
#[async_trait]
pub trait PortalPage: Send {
	/// Navigates and waits for the document to settle.
	async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

	/// Waits for the form fields, types the credentials, submits, and waits
	/// for the resulting navigation.
	async fn fill_and_submit_login(&mut self, form: &LoginForm, credentials: &Credentials) -> Result<()>;

	/// Reads `key` from the page's `localStorage`; `None` when absent or empty.
	async fn read_stored_token(&mut self, key: &str) -> Result<Option<Token>>;

	/// Issues `request` from inside the page with `token` as bearer auth.
	///
	/// Non-2xx statuses are returned as responses, not errors.
	async fn dispatch(&mut self, request: &FetchRequest, token: &Token, timeout: Duration) -> Result<PortalResponse>;

	/// Releases the page and its runtime. Must tolerate being called twice.
	async fn close(&mut self) -> Result<()>;
}
