//! Process and port lifecycle helpers for the launched browser.

use std::process::Child;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

const TERMINATE_POLL: Duration = Duration::from_millis(50);

/// Returns `true` when `port` can be bound on localhost.
pub fn port_available(port: u16) -> bool {
	std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Asks the OS for an unused localhost port.
///
/// The listener is dropped before returning, so another process could grab the
/// port in between; the launcher treats a failed startup as a launch error.
pub fn pick_free_port() -> Result<u16> {
	let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
	Ok(listener.local_addr()?.port())
}

/// Stops `child`, politely first.
///
/// On unix the process gets `SIGTERM` and `grace` to exit before it is killed.
/// Elsewhere it is killed immediately. The child is always reaped.
pub async fn terminate_child(child: &mut Child, grace: Duration) -> Result<()> {
	if child.try_wait()?.is_some() {
		return Ok(());
	}

	#[cfg(unix)]
	{
		let pid = child.id().to_string();
		match std::process::Command::new("kill").args(["-TERM", &pid]).status() {
			Ok(status) if status.success() => {
				let deadline = tokio::time::Instant::now() + grace;
				while tokio::time::Instant::now() < deadline {
					if child.try_wait()?.is_some() {
						debug!(target = "portal.runtime", %pid, "browser exited after SIGTERM");
						return Ok(());
					}
					tokio::time::sleep(TERMINATE_POLL).await;
				}
				debug!(target = "portal.runtime", %pid, "browser ignored SIGTERM; killing");
			}
			Ok(_) => debug!(target = "portal.runtime", %pid, "kill -TERM returned non-zero"),
			Err(e) => debug!(target = "portal.runtime", %pid, error = %e, "failed to run kill"),
		}
	}

	#[cfg(not(unix))]
	let _ = grace;

	if child.try_wait()?.is_none() {
		child.kill()?;
	}
	child.wait()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bound_port_is_reported_unavailable() {
		let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = listener.local_addr().unwrap().port();
		assert!(!port_available(port));
		drop(listener);
		assert!(port_available(port));
	}

	#[test]
	fn picked_port_is_nonzero() {
		let port = pick_free_port().unwrap();
		assert_ne!(port, 0);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn terminate_child_reaps_sleeping_process() {
		let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
		terminate_child(&mut child, Duration::from_secs(2)).await.unwrap();
		assert!(child.try_wait().unwrap().is_some());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn terminate_child_accepts_already_exited_process() {
		let mut child = std::process::Command::new("true").spawn().unwrap();
		child.wait().unwrap();
		terminate_child(&mut child, Duration::from_millis(10)).await.unwrap();
	}
}
