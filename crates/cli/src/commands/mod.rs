//! Command dispatch: load config, run one command, print its envelope.

use std::path::Path;

use anyhow::Context;
use portal::{BrowserLauncher, CdpLauncher, PortalConfig, SessionManager};
use serde_json::Value;
use tracing::error;

use crate::cli::{Cli, Commands};
use crate::output::ResultBuilder;
use crate::server;
use crate::signal::interruptible;

mod config;
mod fetch;
mod login;
mod managers;

pub use fetch::FetchArgs;

/// Bad command line input that clap could not catch.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidInput(pub String);

/// Runs the parsed command and returns the process exit code.
pub async fn dispatch(cli: Cli) -> i32 {
	let name = command_name(&cli.command);
	let builder = ResultBuilder::<Value>::new(name);

	let config = match load_config(cli.config.as_deref(), cli.headed) {
		Ok(config) => config,
		Err(err) => return report(builder, Err(err)),
	};

	let outcome = match cli.command {
		Commands::Config => config::run(&config),
		Commands::Serve { port, host } => match server::serve(CdpLauncher, config, &host, port).await {
			Ok(()) => return 0,
			Err(err) => Err(err),
		},
		command => with_session(CdpLauncher, config, command).await,
	};
	report(builder, outcome)
}

fn command_name(command: &Commands) -> &'static str {
	match command {
		Commands::Login => "login",
		Commands::Fetch { .. } => "fetch",
		Commands::Managers { .. } => "managers",
		Commands::Serve { .. } => "serve",
		Commands::Config => "config",
	}
}

/// File + environment config, then command line overrides.
pub fn load_config(path: Option<&Path>, headed: bool) -> anyhow::Result<PortalConfig> {
	let mut config = PortalConfig::load(path).context("loading configuration")?;
	if headed {
		config.browser.headless = false;
	}
	Ok(config)
}

/// Runs a browser-backed command and always cleans the session up, even when
/// interrupted.
pub async fn with_session<L: BrowserLauncher>(launcher: L, config: PortalConfig, command: Commands) -> anyhow::Result<Value> {
	let mut manager = SessionManager::new(launcher, config);
	let outcome = interruptible(run(&mut manager, command)).await;
	manager.cleanup().await;
	outcome
}

async fn run<L: BrowserLauncher>(manager: &mut SessionManager<L>, command: Commands) -> anyhow::Result<Value> {
	manager.initialize().await?;
	match command {
		Commands::Login => login::run(manager).await,
		Commands::Fetch {
			target,
			method,
			body,
			headers,
			attempts,
			output,
		} => {
			let args = FetchArgs {
				target,
				method,
				body,
				headers,
				attempts,
				output,
			};
			fetch::run(manager, args).await
		}
		Commands::Managers { output } => managers::run(manager, &output).await,
		Commands::Serve { .. } | Commands::Config => Err(InvalidInput("command does not use a browser session".to_string()).into()),
	}
}

fn report(builder: ResultBuilder<Value>, outcome: anyhow::Result<Value>) -> i32 {
	match outcome {
		Ok(data) => {
			builder.data(data).build().print();
			0
		}
		Err(err) => {
			error!(target = "portal.cli", error = %format!("{err:#}"), "command failed");
			builder.failure(&err).build().print();
			1
		}
	}
}

/// Pretty-prints `value` to `path`, returning the bytes written.
fn write_json(path: &Path, value: &Value) -> anyhow::Result<usize> {
	let text = serde_json::to_string_pretty(value)?;
	std::fs::write(path, &text).with_context(|| format!("writing {}", path.display()))?;
	Ok(text.len())
}

#[cfg(test)]
mod tests {
	use portal::{Credentials, FakePortal, HttpMethod};
	use serde_json::json;

	use super::*;

	fn config() -> PortalConfig {
		PortalConfig {
			base_url: "https://portal.example".to_string(),
			credentials: Credentials::new("ops@sales", "hunter2"),
			..Default::default()
		}
	}

	#[tokio::test(start_paused = true)]
	async fn login_reports_status_and_closes_browser() {
		let portal = FakePortal::new().with_tokens(["T1"]);
		let data = with_session(portal.clone(), config(), Commands::Login).await.unwrap();

		assert_eq!(data["authenticated"], true);
		assert_eq!(data["phase"], "authenticated");
		assert_eq!(data["authentications"], 1);
		assert_eq!(portal.closes(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn failed_login_still_cleans_up() {
		let portal = FakePortal::new();
		portal.issue_no_token();
		let err = with_session(portal.clone(), config(), Commands::Login).await.unwrap_err();

		assert_eq!(crate::output::ErrorCode::classify(&err), crate::output::ErrorCode::AuthError);
		assert_eq!(portal.closes(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn fetch_resolves_relative_path_and_returns_body() {
		let portal = FakePortal::new();
		portal.respond_json(200, &json!({ "online": 12 }));
		let command = Commands::Fetch {
			target: "/admin/api/index.php/api/dashboard".to_string(),
			method: HttpMethod::Get,
			body: None,
			headers: vec!["X-Trace: abc".to_string()],
			attempts: None,
			output: None,
		};

		let data = with_session(portal.clone(), config(), command).await.unwrap();
		assert_eq!(data, json!({ "online": 12 }));
		assert_eq!(portal.dispatches()[0].url, "https://portal.example/admin/api/index.php/api/dashboard");
	}

	#[tokio::test(start_paused = true)]
	async fn managers_are_written_to_file() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("managers.json");
		let portal = FakePortal::new();
		portal.respond_json(200, &json!({ "data": [{ "id": 1 }, { "id": 2 }] }));

		let data = with_session(portal, config(), Commands::Managers { output: path.clone() }).await.unwrap();

		assert_eq!(data["count"], 2);
		let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
		assert_eq!(saved["data"][1]["id"], 2);
	}

	#[test]
	fn headed_flag_turns_headless_off() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{ "baseUrl": "https://portal.example" }"#).unwrap();

		let config = load_config(Some(&path), true).unwrap();
		assert!(!config.browser.headless);
		assert_eq!(config.base_url, "https://portal.example");
	}
}
