//! Browser executable discovery.

use std::path::{Path, PathBuf};

/// Resolves the browser binary to launch.
///
/// An explicit path (or bare command name) wins when it resolves; otherwise
/// the platform's usual Chrome/Chromium/Edge locations are tried in order.
pub fn find_browser_executable(explicit: Option<&Path>) -> Option<PathBuf> {
	if let Some(path) = explicit {
		return resolve_candidate(&path.to_string_lossy());
	}

	platform_candidates().iter().find_map(|candidate| resolve_candidate(candidate))
}

fn resolve_candidate(candidate: &str) -> Option<PathBuf> {
	if candidate.starts_with('/') || candidate.contains('\\') || candidate.contains(':') {
		let path = PathBuf::from(candidate);
		path.exists().then_some(path)
	} else {
		which::which(candidate).ok()
	}
}

fn platform_candidates() -> Vec<String> {
	if cfg!(target_os = "macos") {
		[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
			"/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
			"/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	} else if cfg!(target_os = "windows") {
		windows_browser_candidates()
	} else {
		[
			"google-chrome-stable",
			"google-chrome",
			"chromium-browser",
			"chromium",
			"microsoft-edge",
			"brave-browser",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/usr/bin/chromium-browser",
			"/usr/bin/chromium",
			"/snap/bin/chromium",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	}
}

fn windows_browser_candidates() -> Vec<String> {
	let mut roots: Vec<PathBuf> = ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
		.into_iter()
		.filter_map(|key| std::env::var(key).ok())
		.map(PathBuf::from)
		.collect();
	if roots.is_empty() {
		roots.push(PathBuf::from(r"C:\Program Files"));
		roots.push(PathBuf::from(r"C:\Program Files (x86)"));
	}

	let suffixes: &[&[&str]] = &[
		&["Google", "Chrome", "Application", "chrome.exe"],
		&["Microsoft", "Edge", "Application", "msedge.exe"],
		&["Chromium", "Application", "chrome.exe"],
	];

	let mut candidates = Vec::new();
	for root in roots {
		for suffix in suffixes {
			let path: PathBuf = suffix.iter().fold(root.clone(), |acc, part| acc.join(part));
			candidates.push(path.to_string_lossy().to_string());
		}
	}
	candidates.extend(["chrome.exe", "msedge.exe", "chromium.exe"].map(str::to_string));
	candidates
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn windows_candidates_include_chrome_and_edge() {
		let candidates = windows_browser_candidates();
		assert!(candidates.contains(&"chrome.exe".to_string()));
		assert!(candidates.contains(&"msedge.exe".to_string()));
	}

	#[test]
	fn explicit_missing_path_is_not_resolved() {
		assert!(find_browser_executable(Some(Path::new("/definitely/missing/chrome"))).is_none());
	}

	#[cfg(unix)]
	#[test]
	fn explicit_existing_path_is_returned_verbatim() {
		let found = find_browser_executable(Some(Path::new("/bin/sh"))).unwrap();
		assert_eq!(found, PathBuf::from("/bin/sh"));
	}
}
