//! Metadata served by the browser's HTTP debugging endpoint.

use serde::{Deserialize, Serialize};

/// `/json/version` response subset from Chrome DevTools Protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpVersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
	#[serde(rename = "Browser", default)]
	pub browser: Option<String>,
	#[serde(rename = "User-Agent", default)]
	pub user_agent: Option<String>,
}

/// One entry of the `/json/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	/// Absent when another client is already attached to the target.
	#[serde(default)]
	pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
	pub fn is_page(&self) -> bool {
		self.kind == "page"
	}
}

/// Picks the first attachable page target.
pub fn first_page_target(targets: &[TargetInfo]) -> Option<&TargetInfo> {
	targets.iter().find(|t| t.is_page() && t.web_socket_debugger_url.is_some())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_page_target_skips_workers_and_attached_pages() {
		let targets: Vec<TargetInfo> = serde_json::from_str(
			r#"[
  {"id": "W1", "type": "service_worker", "url": "https://portal/sw.js", "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/W1"},
  {"id": "P1", "type": "page", "title": "busy", "url": "about:blank"},
  {"id": "P2", "type": "page", "title": "", "url": "about:blank", "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/P2"}
]"#,
		)
		.unwrap();

		let page = first_page_target(&targets).unwrap();
		assert_eq!(page.id, "P2");
	}

	#[test]
	fn version_info_reads_capitalized_fields() {
		let info: CdpVersionInfo = serde_json::from_str(
			r#"{"Browser": "HeadlessChrome/131.0", "User-Agent": "Mozilla/5.0", "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"}"#,
		)
		.unwrap();
		assert_eq!(info.browser.as_deref(), Some("HeadlessChrome/131.0"));
		assert!(info.web_socket_debugger_url.ends_with("/browser/abc"));
	}
}
