#![cfg(feature = "test")]

// crates.io
use serde_json::json;
// self
use oauth2_authz::{
	_preludet::*,
	error::Error,
};

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_fetches_share_a_single_upstream_call() {
	let (cache, fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());

	fetcher.respond_with_grants(json!({"grants": ["topic:orders-*"]}));
	fetcher.set_delay(StdDuration::from_millis(100));

	let cache = Arc::new(cache);
	let info = cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));
	let mut waiters = Vec::new();

	for _ in 0..10 {
		let cache = cache.clone();
		let info = info.clone();

		waiters.push(tokio::spawn(async move { cache.fetch_or_wait("alice", &info).await }));
	}

	for waiter in waiters {
		let grants = waiter
			.await
			.expect("Waiter task should complete.")
			.expect("Every concurrent requester should observe the shared success.");

		assert_eq!(*grants, json!({"grants": ["topic:orders-*"]}));
	}

	assert_eq!(fetcher.calls(), 1, "All ten requesters must share one upstream call.");
	assert!(info.grants().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_fetch_failure_reaches_every_waiter() {
	let (cache, fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());

	fetcher.fail_token_with_status("T1", 500);
	fetcher.set_delay(StdDuration::from_millis(50));

	let cache = Arc::new(cache);
	let info = cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));
	let mut waiters = Vec::new();

	for _ in 0..4 {
		let cache = cache.clone();
		let info = info.clone();

		waiters.push(tokio::spawn(async move { cache.fetch_or_wait("alice", &info).await }));
	}

	for waiter in waiters {
		let outcome = waiter.await.expect("Waiter task should complete.");

		assert!(
			matches!(outcome, Err(Error::Service(ServiceError::Upstream(_)))),
			"Every waiter must observe the shared failure.",
		);
	}

	assert_eq!(fetcher.calls(), 1);
	assert!(info.grants().is_none());
}

#[tokio::test]
async fn populated_grants_short_circuit_the_upstream() {
	let (cache, fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());

	fetcher.respond_with_grants(json!({"version": 1}));

	let info = cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));
	let first = cache
		.fetch_or_wait("alice", &info)
		.await
		.expect("Initial fetch should succeed.");
	let second = cache
		.fetch_or_wait("alice", &info)
		.await
		.expect("Subsequent consult should reuse the cached document.");

	assert_eq!(first, second);
	assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn retriable_failures_consume_the_retry_budget() {
	let config = AuthzConfig::builder()
		.http_retries(2)
		.build()
		.expect("Retry config fixture should build.");
	let (cache, fetcher, _sessions, _clock) = build_test_cache(config);

	fetcher.enqueue_status(500);
	fetcher.enqueue_transport_error();
	fetcher.respond_with_grants(json!({"recovered": true}));

	let info = cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));
	let grants = cache
		.fetch_or_wait("alice", &info)
		.await
		.expect("Third attempt should succeed within the budget.");

	assert_eq!(*grants, json!({"recovered": true}));
	assert_eq!(fetcher.calls(), 3);
}

#[tokio::test]
async fn exhausted_retry_budget_propagates_the_failure() {
	let (cache, fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());

	fetcher.fail_token_with_status("T1", 502);

	let info = cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));

	assert!(cache.fetch_or_wait("alice", &info).await.is_err());
	assert_eq!(fetcher.calls(), 1, "Zero retries means a single attempt.");
}

#[tokio::test]
async fn forbidden_answers_cache_deny_all_empty_grants() {
	let config = AuthzConfig::builder()
		.http_retries(3)
		.build()
		.expect("Retry config fixture should build.");
	let (cache, fetcher, _sessions, _clock) = build_test_cache(config);

	fetcher.fail_token_with_status("T1", 403);

	let info = cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));
	let grants = cache
		.fetch_or_wait("alice", &info)
		.await
		.expect("A 403 must convert into the deny-all document.");

	assert_eq!(*grants, json!({}));
	assert_eq!(fetcher.calls(), 1, "403 is terminal and must not be retried.");
	assert_eq!(info.grants().as_deref(), Some(&json!({})));
}

#[tokio::test]
async fn invalid_token_answers_propagate_without_retry() {
	let config = AuthzConfig::builder()
		.http_retries(3)
		.build()
		.expect("Retry config fixture should build.");
	let (cache, fetcher, _sessions, _clock) = build_test_cache(config);

	fetcher.fail_token_with_status("T1", 401);

	let info = cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));
	let outcome = cache.fetch_or_wait("alice", &info).await;

	match outcome {
		Err(Error::Service(ServiceError::Upstream(cause))) => {
			assert!(
				matches!(&*cause, Error::Fetch(FetchError::Http { status: 401, .. })),
				"The 401 cause must survive the service wrapping.",
			);
		},
		other => panic!("Expected a shared upstream failure, got {other:?}."),
	}

	assert_eq!(fetcher.calls(), 1, "401 is terminal and must not be retried.");
}
