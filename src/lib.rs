//! OAuth 2.0 authorization decision core for streaming brokers—grants caching
//! with single-flight fetch, JSONPath claim filters, and resource pattern
//! matching in one crate built for production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod obs;
pub mod pattern;
pub mod query;
pub mod sessions;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience helpers for unit and integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicI64, AtomicU64, Ordering},
	};
	// crates.io
	use serde_json::Value;
	// self
	pub use crate::{
		auth::TokenPayload,
		cache::GrantsCache,
		clock::Clock,
		config::AuthzConfig,
		error::{FetchError, ServiceError},
		fetch::{FetchFuture, GrantsFetcher},
		sessions::{MemorySessions, SessionRegistry},
	};

	/// Deterministic [`Clock`] that only moves when a test advances it.
	#[derive(Debug)]
	pub struct ManualClock(AtomicI64);
	impl ManualClock {
		/// Creates a clock pinned to the provided instant.
		pub fn starting_at(millis: i64) -> Self {
			Self(AtomicI64::new(millis))
		}

		/// Moves the clock forward.
		pub fn advance_millis(&self, delta: i64) {
			self.0.fetch_add(delta, Ordering::SeqCst);
		}
	}
	impl Default for ManualClock {
		fn default() -> Self {
			// An arbitrary mid-epoch instant so expiry arithmetic stays positive.
			Self::starting_at(1_000_000_000)
		}
	}
	impl Clock for ManualClock {
		fn now_millis(&self) -> i64 {
			self.0.load(Ordering::SeqCst)
		}
	}

	enum MockReply {
		Grants(Value),
		Status(u16),
		Transport,
	}
	impl MockReply {
		fn into_result(self) -> Result<Value, FetchError> {
			match self {
				Self::Grants(value) => Ok(value),
				Self::Status(status) =>
					Err(FetchError::Http { status, message: "mock response".into() }),
				Self::Transport =>
					Err(FetchError::transport(std::io::Error::other("mock connection refused"))),
			}
		}

		fn duplicate(&self) -> Self {
			match self {
				Self::Grants(value) => Self::Grants(value.clone()),
				Self::Status(status) => Self::Status(*status),
				Self::Transport => Self::Transport,
			}
		}
	}

	/// Scriptable [`GrantsFetcher`] recording every upstream call.
	///
	/// Replies are resolved in order: one-shot queued replies first, then
	/// per-token overrides, then the default reply (initially `{}`).
	pub struct MockGrantsFetcher {
		default_reply: Mutex<MockReply>,
		queue: Mutex<VecDeque<MockReply>>,
		by_token: Mutex<HashMap<String, MockReply>>,
		delay: Mutex<Option<StdDuration>>,
		calls: AtomicU64,
		tokens_seen: Mutex<Vec<String>>,
	}
	impl MockGrantsFetcher {
		/// Sets the default grants document.
		pub fn respond_with_grants(&self, value: Value) {
			*self.default_reply.lock() = MockReply::Grants(value);
		}

		/// Makes every call for `token` answer with the provided HTTP status.
		pub fn fail_token_with_status(&self, token: &str, status: u16) {
			self.by_token.lock().insert(token.to_owned(), MockReply::Status(status));
		}

		/// Queues a one-shot HTTP status reply.
		pub fn enqueue_status(&self, status: u16) {
			self.queue.lock().push_back(MockReply::Status(status));
		}

		/// Queues a one-shot transport failure.
		pub fn enqueue_transport_error(&self) {
			self.queue.lock().push_back(MockReply::Transport);
		}

		/// Delays every reply, so tests can pile up concurrent requesters.
		pub fn set_delay(&self, delay: StdDuration) {
			*self.delay.lock() = Some(delay);
		}

		/// Number of upstream calls observed.
		pub fn calls(&self) -> u64 {
			self.calls.load(Ordering::SeqCst)
		}

		/// Raw tokens observed, in call order.
		pub fn tokens_seen(&self) -> Vec<String> {
			self.tokens_seen.lock().clone()
		}

		fn reply_for(&self, token: &str) -> MockReply {
			if let Some(reply) = self.queue.lock().pop_front() {
				return reply;
			}
			if let Some(reply) = self.by_token.lock().get(token) {
				return reply.duplicate();
			}

			self.default_reply.lock().duplicate()
		}
	}
	impl Default for MockGrantsFetcher {
		fn default() -> Self {
			Self {
				default_reply: Mutex::new(MockReply::Grants(Value::Object(Default::default()))),
				queue: Mutex::new(VecDeque::new()),
				by_token: Mutex::new(HashMap::new()),
				delay: Mutex::new(None),
				calls: AtomicU64::new(0),
				tokens_seen: Mutex::new(Vec::new()),
			}
		}
	}
	impl GrantsFetcher for MockGrantsFetcher {
		fn fetch_grants<'a>(&'a self, token: &'a str) -> FetchFuture<'a> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.tokens_seen.lock().push(token.to_owned());

			let delay = *self.delay.lock();
			let reply = self.reply_for(token);

			Box::pin(async move {
				if let Some(delay) = delay {
					tokio::time::sleep(delay).await;
				}

				reply.into_result()
			})
		}
	}

	/// Builds a cache wired to a mock fetcher, a memory session registry, and
	/// a manual clock.
	pub fn build_test_cache(
		config: AuthzConfig,
	) -> (GrantsCache, Arc<MockGrantsFetcher>, Arc<MemorySessions>, Arc<ManualClock>) {
		let fetcher = Arc::new(MockGrantsFetcher::default());
		let sessions = Arc::new(MemorySessions::default());
		let clock = Arc::new(ManualClock::default());
		let cache = GrantsCache::with_clock(
			config,
			fetcher.clone(),
			sessions.clone(),
			clock.clone(),
		);

		(cache, fetcher, sessions, clock)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::Client as ReqwestClient;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use serde_json;
pub use url;
#[cfg(test)] use httpmock as _;
