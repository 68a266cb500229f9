//! Transport boundary for the external grants provider.
//!
//! The cache depends on nothing but [`GrantsFetcher`]; hosts plug in whatever
//! HTTP stack they already run. The reqwest-backed implementation below is the
//! crate's default transport, enabled through the `reqwest` feature.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, error::FetchError};

/// Boxed future returned by [`GrantsFetcher::fetch_grants`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, FetchError>> + 'a + Send>>;

/// Contract for fetching the grants document granted to a bearer token.
///
/// Implementations must be re-entrant and thread-safe: the cache invokes them
/// concurrently from authorization checks and from the refresh worker pool.
pub trait GrantsFetcher
where
	Self: Send + Sync,
{
	/// Fetches the grants document for the provided raw bearer token.
	///
	/// Failures carry the HTTP status when one was observed so the cache can
	/// classify invalid-token (401) and no-permission (403) answers.
	fn fetch_grants<'a>(&'a self, token: &'a str) -> FetchFuture<'a>;
}

#[cfg(feature = "reqwest")]
const MESSAGE_CAP: usize = 256;

/// Reqwest-backed [`GrantsFetcher`] posting the bearer token to a grants endpoint.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct HttpGrantsFetcher {
	client: ReqwestClient,
	endpoint: Url,
}
#[cfg(feature = "reqwest")]
impl HttpGrantsFetcher {
	/// Creates a fetcher with a default reqwest client.
	pub fn new(endpoint: Url) -> Self {
		Self::with_client(ReqwestClient::default(), endpoint)
	}

	/// Wraps an existing reqwest client.
	pub fn with_client(client: ReqwestClient, endpoint: Url) -> Self {
		Self { client, endpoint }
	}

	async fn fetch(&self, token: &str) -> Result<Value, FetchError> {
		let response = self
			.client
			.post(self.endpoint.clone())
			.bearer_auth(token)
			.header(reqwest::header::ACCEPT, "application/json")
			.send()
			.await
			.map_err(FetchError::transport)?;
		let status = response.status().as_u16();

		if !response.status().is_success() {
			let message = match response.text().await {
				Ok(body) if !body.trim().is_empty() => truncate(body.trim()),
				_ => "no response body".into(),
			};

			return Err(FetchError::Http { status, message });
		}

		let body = response.bytes().await.map_err(FetchError::transport)?;
		let mut deserializer = serde_json::Deserializer::from_slice(&body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| FetchError::Malformed { source, status: Some(status) })
	}
}
#[cfg(feature = "reqwest")]
impl GrantsFetcher for HttpGrantsFetcher {
	fn fetch_grants<'a>(&'a self, token: &'a str) -> FetchFuture<'a> {
		Box::pin(self.fetch(token))
	}
}

#[cfg(feature = "reqwest")]
fn truncate(body: &str) -> String {
	match body.char_indices().nth(MESSAGE_CAP) {
		Some((offset, _)) => format!("{}...", &body[..offset]),
		None => body.to_owned(),
	}
}
