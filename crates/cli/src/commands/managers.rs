use std::path::Path;

use portal::{BrowserLauncher, SessionManager};
use serde_json::{Value, json};
use tracing::info;

use super::write_json;

pub async fn run<L: BrowserLauncher>(manager: &mut SessionManager<L>, output: &Path) -> anyhow::Result<Value> {
	let managers = manager.fetch_managers().await?;
	let count = managers["data"].as_array().map_or(0, Vec::len);

	let bytes = write_json(output, &managers)?;
	info!(target = "portal.cli", count, path = %output.display(), "managers saved");

	Ok(json!({
		"count": count,
		"output": output,
		"bytes": bytes,
	}))
}
