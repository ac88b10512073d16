use std::path::PathBuf;

use portal::{BrowserLauncher, FetchRequest, HttpMethod, SessionManager};
use serde_json::{Value, json};

use super::{InvalidInput, write_json};
use crate::cli::parse_header;

#[derive(Debug)]
pub struct FetchArgs {
	pub target: String,
	pub method: HttpMethod,
	pub body: Option<String>,
	pub headers: Vec<String>,
	pub attempts: Option<u32>,
	pub output: Option<PathBuf>,
}

pub async fn run<L: BrowserLauncher>(manager: &mut SessionManager<L>, args: FetchArgs) -> anyhow::Result<Value> {
	let request = build_request(&manager.config().endpoint_url(&args.target), &args)?;

	let value = match args.attempts {
		Some(attempts) => manager.fetch_with_attempts(&request, attempts).await?,
		None => manager.fetch_with_retry(&request).await?,
	};

	match args.output {
		Some(path) => {
			let bytes = write_json(&path, &value)?;
			Ok(json!({ "url": request.url, "output": path, "bytes": bytes }))
		}
		None => Ok(value),
	}
}

fn build_request(url: &str, args: &FetchArgs) -> Result<FetchRequest, InvalidInput> {
	let mut request = FetchRequest::new(args.method, url);

	if let Some(body) = &args.body {
		serde_json::from_str::<Value>(body).map_err(|e| InvalidInput(format!("--body is not valid JSON: {e}")))?;
		request = request.with_body(body.clone());
	}
	for raw in &args.headers {
		let (name, value) = parse_header(raw).ok_or_else(|| InvalidInput(format!("header must look like `Name: value`, got {raw:?}")))?;
		request = request.with_header(name, value);
	}
	Ok(request)
}
