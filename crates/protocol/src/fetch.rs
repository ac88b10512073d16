//! Shapes of portal API requests issued from inside the browser page.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// HTTP method of a portal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	#[default]
	Get,
	Post,
	Put,
	Patch,
	Delete,
}

impl HttpMethod {
	pub fn as_str(self) -> &'static str {
		match self {
			HttpMethod::Get => "GET",
			HttpMethod::Post => "POST",
			HttpMethod::Put => "PUT",
			HttpMethod::Patch => "PATCH",
			HttpMethod::Delete => "DELETE",
		}
	}
}

impl fmt::Display for HttpMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for HttpMethod {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"GET" => Ok(HttpMethod::Get),
			"POST" => Ok(HttpMethod::Post),
			"PUT" => Ok(HttpMethod::Put),
			"PATCH" => Ok(HttpMethod::Patch),
			"DELETE" => Ok(HttpMethod::Delete),
			_ => Err(format!("unsupported HTTP method: {s}")),
		}
	}
}

/// Caller-supplied request against a portal JSON API.
///
/// Immutable once built; the session manager only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
	pub url: String,
	#[serde(default)]
	pub method: HttpMethod,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<String>,
	/// Extra headers; these win over the defaults the page adds.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
	pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			method,
			body: None,
			headers: BTreeMap::new(),
		}
	}

	pub fn get(url: impl Into<String>) -> Self {
		Self::new(HttpMethod::Get, url)
	}

	pub fn post(url: impl Into<String>) -> Self {
		Self::new(HttpMethod::Post, url)
	}

	pub fn with_body(mut self, body: impl Into<String>) -> Self {
		self.body = Some(body.into());
		self
	}

	pub fn with_json_body(self, body: &serde_json::Value) -> Self {
		self.with_body(body.to_string())
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());
		self
	}
}

/// Raw outcome of an in-page request, before status classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalResponse {
	pub status: u16,
	#[serde(default)]
	pub status_text: String,
	#[serde(default)]
	pub body: String,
}

impl PortalResponse {
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self {
			status,
			status_text: String::new(),
			body: body.into(),
		}
	}

	/// Same rule as the Fetch API's `Response.ok`.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn builder_collects_headers_and_body() {
		let req = FetchRequest::post("https://portal.example/api/index/manager")
			.with_json_body(&json!({}))
			.with_header("X-Page", "2");
		assert_eq!(req.method, HttpMethod::Post);
		assert_eq!(req.body.as_deref(), Some("{}"));
		assert_eq!(req.headers.get("X-Page").map(String::as_str), Some("2"));
	}

	#[test]
	fn method_parses_case_insensitively() {
		assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
		assert_eq!("Delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
		assert!("TRACE".parse::<HttpMethod>().is_err());
	}

	#[test]
	fn response_decodes_from_page_payload() {
		let resp: PortalResponse = serde_json::from_value(json!({"status": 403, "statusText": "Forbidden", "body": ""})).unwrap();
		assert!(!resp.is_success());
		assert_eq!(resp.status_text, "Forbidden");
		assert!(PortalResponse::new(204, "").is_success());
	}

	#[test]
	fn request_without_extras_serializes_compactly() {
		let value = serde_json::to_value(FetchRequest::get("https://portal.example/api/dashboard")).unwrap();
		assert_eq!(value, json!({"url": "https://portal.example/api/dashboard", "method": "GET"}));
	}
}
