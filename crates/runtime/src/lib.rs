//! Browser process lifecycle and Chrome DevTools Protocol transport.
//!
//! This crate knows how to find a Chromium-family executable, start it with a
//! remote debugging port, probe the debugging endpoint, and talk CDP to a page
//! target over a WebSocket. It knows nothing about portals, tokens or retries;
//! that lives in `portal-rs`.

pub mod connection;
pub mod error;
pub mod finder;
pub mod launcher;
pub mod probe;
pub mod process;

pub use connection::CdpConnection;
pub use error::{Error, Result};
pub use finder::find_browser_executable;
pub use launcher::{BrowserProcess, LaunchConfig, launch_browser};
pub use probe::{fetch_cdp_endpoint, list_targets};
