use std::path::PathBuf;

use clap::{Parser, Subcommand};
use portal::HttpMethod;

#[derive(Parser, Debug)]
#[command(name = "portal")]
#[command(about = "Authenticated billing-portal client driven by a headless browser")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (default: <config dir>/portal/config.json)
	#[arg(short, long, global = true, value_name = "FILE", env = "PORTAL_CONFIG")]
	pub config: Option<PathBuf>,

	/// Show the browser window
	#[arg(long, global = true)]
	pub headed: bool,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Log in once and print the session status
	Login,

	/// Fetch a portal API URL (or path relative to the base URL) with retry
	Fetch {
		/// Absolute URL or path such as /admin/api/index.php/api/dashboard
		target: String,

		/// HTTP method
		#[arg(short = 'X', long, default_value = "GET")]
		method: HttpMethod,

		/// JSON request body
		#[arg(long)]
		body: Option<String>,

		/// Extra header, `Name: value` (repeatable)
		#[arg(short = 'H', long = "header", value_name = "HEADER")]
		headers: Vec<String>,

		/// Override the configured attempt count
		#[arg(long)]
		attempts: Option<u32>,

		/// Write the response body to a file instead of the result envelope
		#[arg(short, long)]
		output: Option<PathBuf>,
	},

	/// Fetch the manager list and save it
	Managers {
		#[arg(short, long, default_value = "managers.json")]
		output: PathBuf,
	},

	/// Serve /api/health and /api/refresh backed by one portal session
	Serve {
		#[arg(short, long, default_value_t = 3000, env = "PORT")]
		port: u16,

		#[arg(long, default_value = "127.0.0.1")]
		host: String,
	},

	/// Print the effective configuration (password redacted)
	Config,
}

/// Splits `Name: value`.
pub fn parse_header(raw: &str) -> Option<(String, String)> {
	let (name, value) = raw.split_once(':')?;
	let name = name.trim();
	if name.is_empty() {
		return None;
	}
	Some((name.to_string(), value.trim().to_string()))
}
