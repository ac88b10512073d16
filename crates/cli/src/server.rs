//! Dashboard API over one shared portal session.
//!
//! - `GET /api/health`: always answers, reports whether the session holds a
//!   valid token.
//! - `GET /api/refresh`: 401 until the session is authenticated, otherwise
//!   fetches dashboard and manager data through the retrying session.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use portal::{BrowserLauncher, PortalConfig, SessionManager};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::signal::{Interrupted, shutdown_signal};

/// Shared handler state. Requests are served one at a time through the lock.
pub struct AppState<L: BrowserLauncher> {
	manager: Arc<Mutex<SessionManager<L>>>,
}

impl<L: BrowserLauncher> Clone for AppState<L> {
	fn clone(&self) -> Self {
		Self {
			manager: Arc::clone(&self.manager),
		}
	}
}

impl<L: BrowserLauncher> AppState<L> {
	pub fn new(manager: SessionManager<L>) -> Self {
		Self {
			manager: Arc::new(Mutex::new(manager)),
		}
	}

	pub fn manager(&self) -> Arc<Mutex<SessionManager<L>>> {
		Arc::clone(&self.manager)
	}
}

pub fn router<L: BrowserLauncher + 'static>(state: AppState<L>) -> Router {
	Router::new()
		.route("/api/health", get(health::<L>))
		.route("/api/refresh", get(refresh::<L>))
		.with_state(state)
}

async fn health<L: BrowserLauncher + 'static>(State(state): State<AppState<L>>) -> Response {
	let authenticated = state.manager.lock().await.is_authenticated();
	axum::Json(json!({
		"status": "healthy",
		"authenticated": authenticated,
		"timestamp": Utc::now().to_rfc3339(),
	}))
	.into_response()
}

async fn refresh<L: BrowserLauncher + 'static>(State(state): State<AppState<L>>) -> Response {
	let mut manager = state.manager.lock().await;
	if !manager.is_authenticated() {
		return (
			StatusCode::UNAUTHORIZED,
			axum::Json(json!({ "error": "not authenticated; re-authentication required" })),
		)
			.into_response();
	}

	let dashboard = match manager.fetch_dashboard().await {
		Ok(value) => value,
		Err(err) => return refresh_failed(&err),
	};
	let managers = match manager.fetch_managers().await {
		Ok(value) => value,
		Err(err) => return refresh_failed(&err),
	};

	axum::Json(json!({
		"success": true,
		"data": { "dashboard": dashboard, "managers": managers },
		"timestamp": Utc::now().to_rfc3339(),
	}))
	.into_response()
}

fn refresh_failed(err: &portal::Error) -> Response {
	error!(target = "portal.cli", error = %err, "refresh failed");
	(
		StatusCode::INTERNAL_SERVER_ERROR,
		axum::Json(json!({
			"success": false,
			"error": err.to_string(),
			"timestamp": Utc::now().to_rfc3339(),
		})),
	)
		.into_response()
}

/// Starts the browser, logs in, serves until a shutdown signal, then cleans up.
pub async fn serve<L: BrowserLauncher + 'static>(launcher: L, config: PortalConfig, host: &str, port: u16) -> anyhow::Result<()> {
	serve_until(launcher, config, host, port, shutdown_signal()).await
}

/// [`serve`] with an explicit shutdown future. A shutdown during startup
/// aborts the login and still closes the browser.
pub async fn serve_until<L, S>(launcher: L, config: PortalConfig, host: &str, port: u16, shutdown: S) -> anyhow::Result<()>
where
	L: BrowserLauncher + 'static,
	S: Future<Output = &'static str> + Send + 'static,
{
	let mut shutdown = Box::pin(shutdown);
	let mut manager = SessionManager::new(launcher, config);

	let started = tokio::select! {
		result = start(&mut manager) => result,
		signal = &mut shutdown => Err(Interrupted(signal).into()),
	};
	if let Err(err) = started {
		manager.cleanup().await;
		return Err(err);
	}

	let state = AppState::new(manager);
	let addr = format!("{host}:{port}");
	let served = run_server(router(state.clone()), &addr, async move {
		shutdown.await;
	})
	.await;

	state.manager.lock().await.cleanup().await;
	served
}

async fn start<L: BrowserLauncher>(manager: &mut SessionManager<L>) -> anyhow::Result<()> {
	manager.initialize().await.context("starting browser")?;
	manager.authenticate().await.context("logging into portal")?;
	Ok(())
}

async fn run_server<S>(app: Router, addr: &str, shutdown: S) -> anyhow::Result<()>
where
	S: Future<Output = ()> + Send + 'static,
{
	let listener = tokio::net::TcpListener::bind(addr)
		.await
		.with_context(|| format!("failed to bind to {addr}"))?;
	info!(target = "portal.cli", %addr, "dashboard API listening");

	axum::serve(listener, app).with_graceful_shutdown(shutdown).await.context("server error")
}
