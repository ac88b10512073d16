//! Browser process launch with remote debugging.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use portal_protocol::{CdpVersionInfo, first_page_target};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::finder::find_browser_executable;
use crate::probe::{fetch_cdp_endpoint, list_targets, open_page_target};
use crate::process::{pick_free_port, port_available, terminate_child};

const STARTUP_POLL: Duration = Duration::from_millis(200);
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Flags every launch gets: no sandbox or GPU, no first-run UI.
pub const DEFAULT_ARGS: &[&str] = &[
	"--no-sandbox",
	"--disable-setuid-sandbox",
	"--disable-dev-shm-usage",
	"--disable-accelerated-2d-canvas",
	"--no-first-run",
	"--no-default-browser-check",
	"--no-zygote",
	"--disable-gpu",
];

/// How to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
	/// Binary or command name; discovered when `None`.
	pub executable: Option<PathBuf>,
	pub headless: bool,
	/// Debugging port; a free one is picked when `None`.
	pub port: Option<u16>,
	pub extra_args: Vec<String>,
	/// How long to wait for the debugging endpoint to come up.
	pub startup_timeout: Duration,
}

impl Default for LaunchConfig {
	fn default() -> Self {
		Self {
			executable: None,
			headless: true,
			port: None,
			extra_args: Vec::new(),
			startup_timeout: Duration::from_secs(15),
		}
	}
}

impl LaunchConfig {
	fn args(&self, port: u16, user_data_dir: &std::path::Path) -> Vec<String> {
		let mut args = vec![format!("--remote-debugging-port={}", port), format!("--user-data-dir={}", user_data_dir.display())];
		args.extend(DEFAULT_ARGS.iter().map(|s| s.to_string()));
		if self.headless {
			args.push("--headless=new".to_string());
		}
		args.extend(self.extra_args.iter().cloned());
		args.push("about:blank".to_string());
		args
	}
}

/// A running browser owned by this process.
///
/// Dropping it kills the browser; prefer [`BrowserProcess::shutdown`] for a
/// graceful exit.
pub struct BrowserProcess {
	child: Option<Child>,
	port: u16,
	info: CdpVersionInfo,
	_user_data_dir: TempDir,
}

impl std::fmt::Debug for BrowserProcess {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BrowserProcess")
			.field("pid", &self.pid())
			.field("port", &self.port)
			.field("browser", &self.info.browser)
			.finish()
	}
}

impl BrowserProcess {
	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn pid(&self) -> Option<u32> {
		self.child.as_ref().map(Child::id)
	}

	/// Browser product string reported by `/json/version`.
	pub fn version(&self) -> Option<&str> {
		self.info.browser.as_deref()
	}

	/// WebSocket URL of a page target, opening a blank page if none exists.
	pub async fn page_ws_url(&self) -> Result<String> {
		let targets = list_targets(self.port).await?;
		if let Some(url) = first_page_target(&targets).and_then(|t| t.web_socket_debugger_url.clone()) {
			return Ok(url);
		}

		debug!(target = "portal.runtime", port = self.port, "no page target; opening one");
		open_page_target(self.port)
			.await?
			.web_socket_debugger_url
			.ok_or_else(|| Error::Endpoint("new page target has no debugger URL".to_string()))
	}

	/// Terminates the browser and reaps the process. Safe to call twice.
	pub async fn shutdown(&mut self) -> Result<()> {
		if let Some(mut child) = self.child.take() {
			terminate_child(&mut child, TERMINATE_GRACE).await?;
			info!(target = "portal.runtime", port = self.port, "browser stopped");
		}
		Ok(())
	}
}

impl Drop for BrowserProcess {
	fn drop(&mut self) {
		if let Some(child) = self.child.as_mut() {
			let _ = child.kill();
			let _ = child.wait();
		}
	}
}

/// Starts a browser with remote debugging and waits for its endpoint.
pub async fn launch_browser(config: &LaunchConfig) -> Result<BrowserProcess> {
	let executable = find_browser_executable(config.executable.as_deref()).ok_or_else(|| {
		Error::ExecutableNotFound(match &config.executable {
			Some(path) => format!("{} does not exist or is not on PATH", path.display()),
			None => "no Chrome/Chromium/Edge installation found; set PORTAL_BROWSER".to_string(),
		})
	})?;

	let port = match config.port {
		Some(port) if !port_available(port) => {
			return Err(Error::Launch(format!("debugging port {port} is already in use")));
		}
		Some(port) => port,
		None => pick_free_port()?,
	};
	let user_data_dir = tempfile::Builder::new().prefix("portal-profile-").tempdir()?;

	let mut cmd = Command::new(&executable);
	cmd.args(config.args(port, user_data_dir.path()))
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::null());

	#[cfg(unix)]
	std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

	let mut child = cmd
		.spawn()
		.map_err(|e| Error::Launch(format!("Failed to launch {}: {}", executable.display(), e)))?;
	debug!(target = "portal.runtime", executable = %executable.display(), port, pid = child.id(), "browser spawned");

	let max_attempts = (config.startup_timeout.as_millis() / STARTUP_POLL.as_millis()).max(1);
	let mut last_error = "endpoint not reachable".to_string();
	for _ in 0..max_attempts {
		tokio::time::sleep(STARTUP_POLL).await;

		if let Some(status) = child.try_wait()? {
			return Err(Error::Launch(format!(
				"{} exited before the debugging endpoint became available (status: {})",
				executable.display(),
				status
			)));
		}

		match fetch_cdp_endpoint(port).await {
			Ok(info) => {
				info!(target = "portal.runtime", port, browser = ?info.browser, "browser ready");
				return Ok(BrowserProcess {
					child: Some(child),
					port,
					info,
					_user_data_dir: user_data_dir,
				});
			}
			Err(e) => last_error = e.to_string(),
		}
	}

	if let Err(err) = terminate_child(&mut child, Duration::ZERO).await {
		warn!(target = "portal.runtime", port, error = %err, "failed to stop browser after startup timeout");
	}
	Err(Error::Launch(format!(
		"browser started but debugging endpoint not available on port {} after {:?}: {}",
		port, config.startup_timeout, last_error
	)))
}
