use portal::{BrowserLauncher, SessionManager};
use serde_json::Value;

pub async fn run<L: BrowserLauncher>(manager: &mut SessionManager<L>) -> anyhow::Result<Value> {
	manager.authenticate().await?;
	Ok(serde_json::to_value(manager.status())?)
}
