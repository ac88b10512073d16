use portal::PortalConfig;
use serde_json::{Value, json};

/// Effective configuration with the password masked, plus where it came from.
pub fn run(config: &PortalConfig) -> anyhow::Result<Value> {
	Ok(json!({
		"config": serde_json::to_value(config.redacted())?,
		"defaultPath": PortalConfig::default_path(),
		"loginUrl": config.login_url(),
	}))
}
