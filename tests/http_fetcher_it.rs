#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use oauth2_authz::{
	error::FetchError,
	fetch::{GrantsFetcher, HttpGrantsFetcher},
	url::Url,
};

fn fetcher_for(server: &MockServer) -> HttpGrantsFetcher {
	let client = reqwest::Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Insecure reqwest client for tests should build.");

	HttpGrantsFetcher::with_client(
		client,
		Url::parse(&server.url("/grants")).expect("Mock grants endpoint should parse."),
	)
}

#[tokio::test]
async fn fetches_grants_with_bearer_auth() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/grants").header("authorization", "Bearer T1");
			then.status(200)
				.header("content-type", "application/json")
				.body("[{\"rsname\":\"orders\",\"scopes\":[\"Describe\"]}]");
		})
		.await;
	let grants = fetcher_for(&server)
		.fetch_grants("T1")
		.await
		.expect("Grants fetch should succeed against the mock endpoint.");

	mock.assert_async().await;

	assert_eq!(grants, json!([{"rsname": "orders", "scopes": ["Describe"]}]));
}

#[tokio::test]
async fn error_statuses_carry_the_response_body() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/grants");
			then.status(403).body("access_denied");
		})
		.await;

	let error = fetcher_for(&server)
		.fetch_grants("T1")
		.await
		.expect_err("A 403 must surface as a fetch error.");

	match error {
		FetchError::Http { status, message } => {
			assert_eq!(status, 403);
			assert!(message.contains("access_denied"));
		},
		other => panic!("Expected an HTTP classification, got {other:?}."),
	}
}

#[tokio::test]
async fn malformed_bodies_are_reported_with_status() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/grants");
			then.status(200).header("content-type", "application/json").body("not json");
		})
		.await;

	let error = fetcher_for(&server)
		.fetch_grants("T1")
		.await
		.expect_err("An undecodable body must surface as a fetch error.");

	assert!(matches!(error, FetchError::Malformed { status: Some(200), .. }));
}
