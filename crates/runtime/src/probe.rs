//! HTTP debugging endpoint probing.

use std::time::Duration;

use portal_protocol::{CdpVersionInfo, TargetInfo};

use crate::error::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_millis(400);

fn client() -> Result<reqwest::Client> {
	reqwest::Client::builder()
		.timeout(PROBE_TIMEOUT)
		.build()
		.map_err(|e| Error::Endpoint(format!("Failed to create HTTP client: {}", e)))
}

/// Resolves CDP version metadata from `/json/version` on `port`.
pub async fn fetch_cdp_endpoint(port: u16) -> Result<CdpVersionInfo> {
	let client = client()?;
	let mut last_error = "no response".to_string();

	for url in [
		format!("http://127.0.0.1:{}/json/version", port),
		format!("http://localhost:{}/json/version", port),
	] {
		let response = match client.get(&url).send().await {
			Ok(r) => r,
			Err(e) => {
				last_error = e.to_string();
				continue;
			}
		};

		if !response.status().is_success() {
			last_error = format!("unexpected status {}", response.status());
			continue;
		}

		let info: CdpVersionInfo = response
			.json()
			.await
			.map_err(|e| Error::Endpoint(format!("Failed to parse CDP response: {}", e)))?;
		return Ok(info);
	}

	Err(Error::Endpoint(format!("Failed to connect to port {}: {}", port, last_error)))
}

/// Lists debuggable targets from `/json/list` on `port`.
pub async fn list_targets(port: u16) -> Result<Vec<TargetInfo>> {
	let response = client()?.get(format!("http://127.0.0.1:{}/json/list", port)).send().await?;
	if !response.status().is_success() {
		return Err(Error::Endpoint(format!("/json/list returned {}", response.status())));
	}
	Ok(response.json().await?)
}

/// Opens a blank page target via `/json/new`.
///
/// Chrome only accepts `PUT` here since version 111.
pub async fn open_page_target(port: u16) -> Result<TargetInfo> {
	let response = client()?.put(format!("http://127.0.0.1:{}/json/new?about:blank", port)).send().await?;
	if !response.status().is_success() {
		return Err(Error::Endpoint(format!("/json/new returned {}", response.status())));
	}
	Ok(response.json().await?)
}
