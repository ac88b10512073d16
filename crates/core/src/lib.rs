//! Authenticated session manager for a browser-driven billing portal.
//!
//! A [`SessionManager`] owns one automation page, logs into the portal with
//! configured credentials, lifts the session token out of the page's
//! `localStorage`, and issues token-protected JSON requests from inside the
//! page with bounded retry and re-authentication.
//!
//! The browser sits behind the [`BrowserLauncher`]/[`PortalPage`] traits:
//! [`CdpLauncher`] drives a local Chromium over the DevTools Protocol, and
//! `FakePortal` (feature `test-support`) is an in-memory stand-in for tests.
//!
//! ```ignore
//! let config = PortalConfig::load(None)?;
//! let mut manager = SessionManager::new(CdpLauncher, config);
//! manager.initialize().await?;
//! let url = manager.config().endpoint_url(&manager.config().endpoints.dashboard);
//! let stats = manager.fetch_with_retry(&FetchRequest::get(url)).await;
//! manager.cleanup().await;
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod manager;
pub mod retry;
pub mod session;

pub use config::{BrowserOptions, Credentials, Endpoints, LoginForm, PortalConfig, RetryConfig};
#[cfg(any(test, feature = "test-support"))]
pub use driver::fake::{DispatchRecord, FakeFailure, FakePage, FakePortal, PortalCall};
pub use driver::{BrowserLauncher, CdpLauncher, CdpPage, PortalPage};
pub use error::{Error, Result};
pub use manager::SessionManager;
pub use portal_protocol::{FetchRequest, HttpMethod, PortalResponse};
pub use retry::{Attempt, FetchAttempt, RetryPolicy};
pub use session::{Session, SessionPhase, SessionStatus, Token};
