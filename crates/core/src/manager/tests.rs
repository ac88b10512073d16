use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use super::*;
use crate::config::Credentials;
use crate::driver::fake::{FakeFailure, FakePortal, PortalCall};

const API: &str = "https://portal.example/admin/api/index.php/api/dashboard";

fn config() -> PortalConfig {
	PortalConfig {
		base_url: "https://portal.example".to_string(),
		credentials: Credentials::new("ops@sales", "hunter2"),
		..Default::default()
	}
}

async fn ready(portal: &FakePortal) -> SessionManager<FakePortal> {
	let mut manager = SessionManager::new(portal.clone(), config());
	manager.initialize().await.unwrap();
	manager
}

fn offsets(portal: &FakePortal, start: Instant) -> Vec<Duration> {
	portal.dispatches().iter().map(|d| d.at.duration_since(start)).collect()
}

#[tokio::test(start_paused = true)]
async fn valid_token_is_reused_across_requests() {
	let portal = FakePortal::new().with_tokens(["T1"]);
	let mut manager = ready(&portal).await;

	manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap();
	manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap();

	assert_eq!(portal.logins(), 1);
	assert_eq!(manager.authentications(), 1);
	assert!(portal.dispatches().iter().all(|d| d.token == "T1"));
}

#[tokio::test(start_paused = true)]
async fn login_navigates_to_login_page_and_reads_configured_key() {
	let portal = FakePortal::new();
	let mut manager = ready(&portal).await;
	manager.authenticate().await.unwrap();

	assert_eq!(
		portal.calls(),
		[
			PortalCall::Launch { headless: true },
			PortalCall::Navigate {
				url: "https://portal.example/#/login".to_string()
			},
			PortalCall::Login {
				username: "ops@sales".to_string()
			},
			PortalCall::ReadToken {
				key: "sas4_jwt".to_string()
			},
		]
	);
	let status = manager.status();
	assert!(status.authenticated);
	assert_eq!(status.phase, SessionPhase::Authenticated);
	assert_eq!(status.token_expires_in_secs, Some(86_400));
}

#[tokio::test(start_paused = true)]
async fn rejected_token_triggers_one_reauthentication() {
	let portal = FakePortal::new().with_tokens(["T1", "T2"]);
	portal.respond(401, "");
	portal.respond_json(200, &json!({ "data": [{ "id": 1 }] }));
	let mut manager = ready(&portal).await;
	let start = Instant::now();

	let value = manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap();

	assert_eq!(value, json!({ "data": [{ "id": 1 }] }));
	assert_eq!(manager.authentications(), 2);
	let tokens: Vec<_> = portal.dispatches().into_iter().map(|d| d.token).collect();
	assert_eq!(tokens, ["T1", "T2"]);
	assert_eq!(offsets(&portal, start), [Duration::ZERO, Duration::from_secs(1)]);
}

#[tokio::test(start_paused = true)]
async fn forbidden_is_treated_like_unauthorized() {
	let portal = FakePortal::new().with_tokens(["T1", "T2"]);
	portal.respond(403, "");
	let mut manager = ready(&portal).await;

	manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap();
	assert_eq!(portal.logins(), 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_exhausts_with_linear_backoff() {
	let portal = FakePortal::new();
	portal.always_respond(500, "oops");
	let mut manager = ready(&portal).await;
	let start = Instant::now();

	let err = manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap_err();

	match &err {
		Error::FetchExhausted { url, attempts, source } => {
			assert_eq!(url, API);
			assert_eq!(*attempts, 3);
			assert_eq!(source.status(), Some(500));
		}
		other => panic!("unexpected error: {other}"),
	}
	assert_eq!(offsets(&portal, start), [Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3)]);
	assert_eq!(Instant::now().duration_since(start), Duration::from_secs(3));
	assert_eq!(portal.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn attempt_count_can_be_overridden_per_call() {
	let portal = FakePortal::new();
	portal.always_respond(502, "");
	let mut manager = ready(&portal).await;

	let err = manager.fetch_with_attempts(&FetchRequest::get(API), 5).await.unwrap_err();
	assert!(matches!(err, Error::FetchExhausted { attempts: 5, .. }));
	assert_eq!(portal.dispatches().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn expired_token_is_renewed_exactly_once() {
	let portal = FakePortal::new().with_tokens(["T1", "T2"]);
	let mut config = config();
	config.token_ttl_secs = 60;
	let mut manager = SessionManager::new(portal.clone(), config);
	manager.initialize().await.unwrap();

	manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap();
	tokio::time::advance(Duration::from_secs(61)).await;
	assert!(!manager.is_authenticated());

	manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap();
	assert_eq!(portal.logins(), 2);
	assert_eq!(portal.dispatches()[1].token, "T2");
}

#[tokio::test(start_paused = true)]
async fn repeated_rejection_stops_at_reauthentication_limit() {
	let portal = FakePortal::new();
	portal.always_respond(401, "");
	let mut manager = ready(&portal).await;

	let policy = RetryPolicy::default().with_max_attempts(10);
	let err = manager.fetch_with_policy(&FetchRequest::get(API), &policy).await.unwrap_err();

	match err {
		Error::ReauthenticationLimit { limit, source } => {
			assert_eq!(limit, 2);
			assert_eq!(source.status(), Some(401));
		}
		other => panic!("unexpected error: {other}"),
	}
	assert_eq!(portal.dispatches().len(), 3);
	assert_eq!(portal.logins(), 3);
}

#[tokio::test(start_paused = true)]
async fn rejection_on_every_attempt_exhausts_with_default_policy() {
	let portal = FakePortal::new().with_tokens(["T1", "T2", "T3"]);
	portal.always_respond(401, "");
	let mut manager = ready(&portal).await;
	let start = Instant::now();

	let err = manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap_err();

	match err {
		Error::FetchExhausted { attempts, source, .. } => {
			assert_eq!(attempts, 3);
			assert_eq!(source.status(), Some(401));
		}
		other => panic!("unexpected error: {other}"),
	}
	assert_eq!(offsets(&portal, start), [Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3)]);
	assert_eq!(portal.logins(), 3);
	let tokens: Vec<_> = portal.dispatches().into_iter().map(|d| d.token).collect();
	assert_eq!(tokens, ["T1", "T2", "T3"]);
	assert!(!manager.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn transient_driver_failures_are_retried() {
	let portal = FakePortal::new();
	portal.fail_next_dispatch(FakeFailure::Timeout);
	portal.fail_next_dispatch(FakeFailure::Driver("socket reset".into()));
	portal.respond_json(200, &json!({ "ok": true }));
	let mut manager = ready(&portal).await;

	let value = manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap();
	assert_eq!(value, json!({ "ok": true }));
	assert_eq!(portal.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_body_is_null_and_garbage_body_is_retried() {
	let portal = FakePortal::new();
	portal.respond(204, "");
	let mut manager = ready(&portal).await;
	assert_eq!(manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap(), Value::Null);

	portal.always_respond(200, "<html>maintenance</html>");
	let err = manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap_err();
	match err {
		Error::FetchExhausted { source, .. } => assert!(matches!(*source, Error::InvalidBody { .. })),
		other => panic!("unexpected error: {other}"),
	}
}

#[tokio::test(start_paused = true)]
async fn missing_token_after_login_is_an_authentication_error() {
	let portal = FakePortal::new();
	portal.issue_no_token();
	let mut manager = ready(&portal).await;

	let err = manager.authenticate().await.unwrap_err();
	assert!(matches!(err, Error::Authentication(ref msg) if msg.contains("sas4_jwt")));
	assert!(!manager.status().authenticated);

	let err = manager.fetch_with_retry(&FetchRequest::get(API)).await.unwrap_err();
	match err {
		Error::FetchExhausted { attempts, source, .. } => {
			assert_eq!(attempts, 3);
			assert!(matches!(*source, Error::Authentication(_)));
		}
		other => panic!("unexpected error: {other}"),
	}
	assert!(portal.dispatches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_credentials_fail_before_navigation() {
	let portal = FakePortal::new();
	let mut config = config();
	config.credentials = Credentials::default();
	let mut manager = SessionManager::new(portal.clone(), config);
	manager.initialize().await.unwrap();

	let err = manager.authenticate().await.unwrap_err();
	assert!(matches!(err, Error::Authentication(_)));
	assert!(!portal.calls().iter().any(|c| matches!(c, PortalCall::Navigate { .. })));
}

#[tokio::test(start_paused = true)]
async fn login_failure_propagates_from_authenticate() {
	let portal = FakePortal::new();
	portal.fail_login("selector input[name=\"username\"] never appeared");
	let mut manager = ready(&portal).await;

	let err = manager.authenticate().await.unwrap_err();
	assert!(matches!(err, Error::Driver(_)));
	assert_eq!(manager.session().phase(), SessionPhase::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn operations_before_initialize_fail() {
	let portal = FakePortal::new();
	let mut manager = SessionManager::new(portal.clone(), config());

	assert!(matches!(manager.authenticate().await, Err(Error::NotInitialized)));
	assert!(matches!(manager.fetch_with_retry(&FetchRequest::get(API)).await, Err(Error::NotInitialized)));
	assert!(portal.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn launch_failure_leaves_manager_uninitialized() {
	let portal = FakePortal::new();
	portal.fail_launch("chrome not found");
	let mut manager = SessionManager::new(portal.clone(), config());

	let err = manager.initialize().await.unwrap_err();
	assert!(matches!(err, Error::BrowserLaunch(_)));
	assert_eq!(manager.session().phase(), SessionPhase::Uninitialized);
	assert!(matches!(manager.ensure_authenticated().await, Err(Error::NotInitialized)));
}

#[tokio::test(start_paused = true)]
async fn initialize_twice_keeps_the_first_page() {
	let portal = FakePortal::new();
	let mut manager = ready(&portal).await;
	manager.initialize().await.unwrap();
	assert_eq!(portal.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn cleanup_is_idempotent_and_terminal() {
	let portal = FakePortal::new();
	let mut manager = ready(&portal).await;

	manager.cleanup().await;
	manager.cleanup().await;

	assert_eq!(portal.closes(), 1);
	assert_eq!(manager.session().phase(), SessionPhase::Closed);
	assert!(matches!(manager.fetch_with_retry(&FetchRequest::get(API)).await, Err(Error::SessionClosed)));
	assert!(matches!(manager.initialize().await, Err(Error::SessionClosed)));
}

#[tokio::test(start_paused = true)]
async fn cleanup_without_initialize_is_a_no_op() {
	let portal = FakePortal::new();
	let mut manager = SessionManager::new(portal.clone(), config());
	manager.cleanup().await;
	assert_eq!(portal.closes(), 0);
}

#[tokio::test(start_paused = true)]
async fn managers_are_posted_with_empty_object() {
	let portal = FakePortal::new();
	portal.respond_json(200, &json!({ "data": [{ "id": 1, "username": "agent" }], "total": 1 }));
	let mut manager = ready(&portal).await;

	let value = manager.fetch_managers().await.unwrap();
	assert_eq!(value["total"], 1);

	let sent = &portal.dispatches()[0];
	assert_eq!(sent.url, "https://portal.example/admin/api/index.php/api/index/manager");
	assert_eq!(sent.method, portal_protocol::HttpMethod::Post);
	assert_eq!(sent.body.as_deref(), Some("{}"));
}

#[tokio::test(start_paused = true)]
async fn managers_response_without_data_is_rejected() {
	let portal = FakePortal::new();
	portal.respond_json(200, &json!({ "status": 200 }));
	let mut manager = ready(&portal).await;

	let err = manager.fetch_managers().await.unwrap_err();
	assert!(matches!(err, Error::UnexpectedResponse { .. }));
}
