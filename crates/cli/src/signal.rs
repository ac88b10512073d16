use std::future::Future;

use tracing::info;

/// A command was stopped by Ctrl-C or SIGTERM.
#[derive(Debug, thiserror::Error)]
#[error("interrupted by {0}")]
pub struct Interrupted(pub &'static str);

/// Resolves on Ctrl-C, or SIGTERM on unix. Returns the signal name.
pub async fn shutdown_signal() -> &'static str {
	let ctrl_c = async {
		if tokio::signal::ctrl_c().await.is_err() {
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(_) => std::future::pending::<()>().await,
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	let name = tokio::select! {
		_ = ctrl_c => "SIGINT",
		_ = terminate => "SIGTERM",
	};
	info!(target = "portal.cli", signal = name, "shutdown requested");
	name
}

/// Runs `fut` unless a shutdown signal arrives first.
pub async fn interruptible<T, F>(fut: F) -> anyhow::Result<T>
where
	F: Future<Output = anyhow::Result<T>>,
{
	tokio::select! {
		result = fut => result,
		signal = shutdown_signal() => Err(Interrupted(signal).into()),
	}
}
