//! Portal configuration: file defaults layered under environment overrides.
//!
//! Resolution order, last wins:
//! 1. built-in defaults
//! 2. JSON file (`--config`, else `<config dir>/portal/config.json` when present)
//! 3. `PORTAL_*` environment variables

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

pub const ENV_BASE_URL: &str = "PORTAL_BASE_URL";
pub const ENV_USERNAME: &str = "PORTAL_USERNAME";
pub const ENV_PASSWORD: &str = "PORTAL_PASSWORD";
pub const ENV_HEADLESS: &str = "PORTAL_HEADLESS";
pub const ENV_BROWSER: &str = "PORTAL_BROWSER";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Everything the session manager needs to reach and log into the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalConfig {
	pub base_url: String,
	/// Login route, relative to `base_url`. The portal is a hash-routed SPA.
	pub login_path: String,
	pub endpoints: Endpoints,
	pub credentials: Credentials,
	pub login_form: LoginForm,
	/// `localStorage` key the portal writes its JWT to after login.
	pub token_storage_key: String,
	pub token_ttl_secs: u64,
	pub navigation_timeout_ms: u64,
	pub request_timeout_ms: u64,
	pub retry: RetryConfig,
	pub browser: BrowserOptions,
}

impl Default for PortalConfig {
	fn default() -> Self {
		Self {
			base_url: "https://billing.iraqcell.iq".to_string(),
			login_path: "/#/login".to_string(),
			endpoints: Endpoints::default(),
			credentials: Credentials::default(),
			login_form: LoginForm::default(),
			token_storage_key: "sas4_jwt".to_string(),
			token_ttl_secs: 24 * 60 * 60,
			navigation_timeout_ms: 60_000,
			request_timeout_ms: 30_000,
			retry: RetryConfig::default(),
			browser: BrowserOptions::default(),
		}
	}
}

/// Portal JSON API paths, relative to `base_url` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoints {
	pub dashboard: String,
	pub managers: String,
}

impl Default for Endpoints {
	fn default() -> Self {
		Self {
			dashboard: "/admin/api/index.php/api/dashboard".to_string(),
			managers: "/admin/api/index.php/api/index/manager".to_string(),
		}
	}
}

/// Portal login. `Debug` never prints the password.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Credentials {
	pub username: String,
	pub password: String,
}

impl Credentials {
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			password: password.into(),
		}
	}

	pub fn is_complete(&self) -> bool {
		!self.username.is_empty() && !self.password.is_empty()
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Where the login form lives on the page and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginForm {
	pub username_selector: String,
	pub password_selector: String,
	pub submit_selector: String,
	pub selector_timeout_ms: u64,
	/// Wait for the post-submit navigation.
	pub submit_timeout_ms: u64,
}

impl Default for LoginForm {
	fn default() -> Self {
		Self {
			username_selector: r#"input[name="username"]"#.to_string(),
			password_selector: r#"input[name="password"]"#.to_string(),
			submit_selector: r#"button[type="submit"]"#.to_string(),
			selector_timeout_ms: 30_000,
			submit_timeout_ms: 60_000,
		}
	}
}

impl LoginForm {
	pub fn selector_timeout(&self) -> Duration {
		Duration::from_millis(self.selector_timeout_ms)
	}

	pub fn submit_timeout(&self) -> Duration {
		Duration::from_millis(self.submit_timeout_ms)
	}
}

/// Serialized form of [`RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	pub max_reauthentications: u32,
}

impl Default for RetryConfig {
	fn default() -> Self {
		let policy = RetryPolicy::default();
		Self {
			max_attempts: policy.max_attempts,
			base_delay_ms: policy.base_delay.as_millis() as u64,
			max_reauthentications: policy.max_reauthentications,
		}
	}
}

impl RetryConfig {
	pub fn policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_attempts: self.max_attempts,
			base_delay: Duration::from_millis(self.base_delay_ms),
			max_reauthentications: self.max_reauthentications,
		}
	}
}

/// How the automation browser is started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserOptions {
	pub headless: bool,
	/// Browser binary; discovered on PATH when unset.
	pub executable: Option<PathBuf>,
	/// Remote debugging port; a free one is picked when unset.
	pub port: Option<u16>,
	pub user_agent: Option<String>,
	/// URL patterns the page never loads (images, stylesheets, fonts).
	pub blocked_url_patterns: Vec<String>,
	pub extra_args: Vec<String>,
	pub startup_timeout_ms: u64,
}

impl Default for BrowserOptions {
	fn default() -> Self {
		Self {
			headless: true,
			executable: None,
			port: None,
			user_agent: Some(DEFAULT_USER_AGENT.to_string()),
			blocked_url_patterns: ["*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg", "*.ico", "*.css", "*.woff", "*.woff2", "*.ttf"]
				.map(str::to_string)
				.to_vec(),
			extra_args: Vec::new(),
			startup_timeout_ms: 15_000,
		}
	}
}

impl BrowserOptions {
	pub fn startup_timeout(&self) -> Duration {
		Duration::from_millis(self.startup_timeout_ms)
	}
}

impl PortalConfig {
	/// Default config file location, `<config dir>/portal/config.json`.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join("portal").join("config.json"))
	}

	/// Loads file + environment configuration and validates it.
	///
	/// An explicit `path` must exist; the default path is optional.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => match Self::default_path().filter(|p| p.exists()) {
				Some(path) => Self::from_file(&path)?,
				None => Self::default(),
			},
		};
		config.apply_env_with(|key| std::env::var(key).ok())?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
		let config = serde_json::from_str(&content).map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
		debug!(target = "portal.config", path = %path.display(), "loaded config file");
		Ok(config)
	}

	/// Applies `PORTAL_*` overrides read through `lookup`.
	pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
	where
		F: Fn(&str) -> Option<String>,
	{
		let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

		if let Some(url) = lookup(ENV_BASE_URL) {
			self.base_url = url;
		}
		if let Some(username) = lookup(ENV_USERNAME) {
			self.credentials.username = username;
		}
		if let Some(password) = lookup(ENV_PASSWORD) {
			self.credentials.password = password;
		}
		if let Some(raw) = lookup(ENV_HEADLESS) {
			self.browser.headless = parse_bool(&raw).ok_or_else(|| Error::Config(format!("{ENV_HEADLESS} must be true/false, got {raw:?}")))?;
		}
		if let Some(browser) = lookup(ENV_BROWSER) {
			self.browser.executable = Some(PathBuf::from(browser));
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<()> {
		if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
			return Err(Error::Config(format!("baseUrl must be an http(s) URL, got {:?}", self.base_url)));
		}
		if self.retry.max_attempts == 0 {
			return Err(Error::Config("retry.maxAttempts must be at least 1".to_string()));
		}
		if self.token_storage_key.is_empty() {
			return Err(Error::Config("tokenStorageKey must not be empty".to_string()));
		}
		Ok(())
	}

	/// Resolves an endpoint path against `base_url`; absolute URLs pass through.
	pub fn endpoint_url(&self, path: &str) -> String {
		if path.starts_with("http://") || path.starts_with("https://") {
			return path.to_string();
		}
		let base = self.base_url.trim_end_matches('/');
		if path.starts_with('/') {
			format!("{base}{path}")
		} else {
			format!("{base}/{path}")
		}
	}

	pub fn login_url(&self) -> String {
		self.endpoint_url(&self.login_path)
	}

	pub fn token_ttl(&self) -> Duration {
		Duration::from_secs(self.token_ttl_secs)
	}

	pub fn navigation_timeout(&self) -> Duration {
		Duration::from_millis(self.navigation_timeout_ms)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	/// Copy safe to print: the password is masked.
	pub fn redacted(&self) -> Self {
		let mut copy = self.clone();
		if !copy.credentials.password.is_empty() {
			copy.credentials.password = "********".to_string();
		}
		copy
	}
}

fn parse_bool(raw: &str) -> Option<bool> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}
