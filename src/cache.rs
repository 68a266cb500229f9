//! Grants cache with single-flight fetch, background refresh, and GC.

mod flight;
mod metrics;
mod worker;

pub use metrics::CacheMetrics;

// std
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
// crates.io
use serde_json::Value;
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	auth::TokenPayload,
	cache::flight::{Admission, FlightTable},
	clock::{Clock, SystemClock},
	config::AuthzConfig,
	error::{FetchError, ServiceError},
	fetch::GrantsFetcher,
	obs::{self, TaskKind, TaskOutcome, TaskSpan},
	sessions::SessionRegistry,
};

/// Per-principal cache entry.
///
/// Readers observe the entry through lock-free accessors; mutations happen
/// under the entry's own lock so published values are never torn composites.
/// `expires_at` only ratchets upward and `last_used` advances on every
/// consult.
pub struct GrantsInfo {
	state: RwLock<GrantsState>,
	expires_at: AtomicI64,
	last_used: AtomicI64,
}
struct GrantsState {
	access_token: String,
	grants: Option<Arc<Value>>,
}
impl GrantsInfo {
	fn new(token: &TokenPayload, now: i64) -> Self {
		Self {
			state: RwLock::new(GrantsState {
				access_token: token.raw().to_owned(),
				grants: None,
			}),
			expires_at: AtomicI64::new(token.expires_at_ms()),
			last_used: AtomicI64::new(now),
		}
	}

	/// Most recent raw token observed for this principal.
	pub fn access_token(&self) -> String {
		self.state.read().access_token.clone()
	}

	/// Last successfully fetched grants document, or `None` before the first
	/// success.
	pub fn grants(&self) -> Option<Arc<Value>> {
		self.state.read().grants.clone()
	}

	/// Absolute expiry instant in milliseconds; monotonically non-decreasing.
	pub fn expires_at_ms(&self) -> i64 {
		self.expires_at.load(Ordering::Acquire)
	}

	/// Instant of the most recent consult in milliseconds.
	pub fn last_used_ms(&self) -> i64 {
		self.last_used.load(Ordering::Acquire)
	}

	fn touch(&self, now: i64) {
		self.last_used.fetch_max(now, Ordering::AcqRel);
	}

	/// Adopts an incoming token when it outlives the stored one; ties keep the
	/// current token and the expiry only ratchets upward.
	fn observe_token(&self, token: &TokenPayload) {
		let incoming = token.expires_at_ms();
		let mut state = self.state.write();

		if incoming > self.expires_at.load(Ordering::Acquire) {
			state.access_token = token.raw().to_owned();
			self.expires_at.fetch_max(incoming, Ordering::AcqRel);
		}
	}

	/// Installs a freshly fetched document; returns whether it differed from
	/// the stored one.
	fn replace_grants(&self, document: Arc<Value>) -> bool {
		let mut state = self.state.write();
		let changed = state.grants.as_deref() != Some(document.as_ref());

		if changed {
			state.grants = Some(document);
		}

		changed
	}
}
impl Debug for GrantsInfo {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GrantsInfo")
			.field("access_token", &"<redacted>")
			.field("has_grants", &self.state.read().grants.is_some())
			.field("expires_at_ms", &self.expires_at_ms())
			.field("last_used_ms", &self.last_used_ms())
			.finish()
	}
}

/// Concurrent map from principal name to the last known grants document.
///
/// Hot-path authorization checks ([`info_for`](Self::info_for) followed by a
/// grants read) never block on I/O once a principal's first fetch has landed.
/// Upstream traffic is bounded by the single-flight barrier on the demand path
/// and by the bounded worker pool on the refresh path.
pub struct GrantsCache {
	inner: Arc<CacheInner>,
	refresh_task: Option<JoinHandle<()>>,
	gc_task: Option<JoinHandle<()>>,
}
impl GrantsCache {
	/// Creates a cache and starts its background loops.
	///
	/// Must be called within a Tokio runtime; the refresh loop (when the
	/// configured period is nonzero) and the GC loop are spawned here.
	pub fn new(
		config: AuthzConfig,
		fetcher: Arc<dyn GrantsFetcher>,
		sessions: Arc<dyn SessionRegistry>,
	) -> Self {
		Self::with_clock(config, fetcher, sessions, Arc::new(SystemClock))
	}

	/// Creates a cache with a caller-supplied time source.
	pub fn with_clock(
		config: AuthzConfig,
		fetcher: Arc<dyn GrantsFetcher>,
		sessions: Arc<dyn SessionRegistry>,
		clock: Arc<dyn Clock>,
	) -> Self {
		let last_gc_ms = clock.now_millis();
		let inner = Arc::new(CacheInner {
			config,
			fetcher,
			sessions,
			clock,
			entries: Mutex::new(HashMap::new()),
			flights: Arc::new(FlightTable::default()),
			metrics: Arc::new(CacheMetrics::default()),
			closed: AtomicBool::new(false),
			last_gc_ms: AtomicI64::new(last_gc_ms),
		});
		let refresh_task = worker::spawn_refresh(inner.clone());
		let gc_task = Some(worker::spawn_gc(inner.clone()));

		Self { inner, refresh_task, gc_task }
	}

	/// Looks up or creates the cache entry for the token's principal.
	///
	/// Applies the newest-token-wins rule to the stored access token, ratchets
	/// the expiry, and stamps `last_used`. Constant-time amortized; never
	/// performs I/O.
	pub fn info_for(&self, token: &TokenPayload) -> Arc<GrantsInfo> {
		let now = self.inner.clock.now_millis();
		let info = {
			let mut entries = self.inner.entries.lock();

			entries
				.entry(token.principal_name().to_owned())
				.or_insert_with(|| Arc::new(GrantsInfo::new(token, now)))
				.clone()
		};

		info.observe_token(token);
		info.touch(now);

		info
	}

	/// Ensures `info.grants` is populated, fetching at most once per principal.
	///
	/// The single-flight winner performs the upstream call with the configured
	/// retry policy and publishes its outcome; every concurrent requester for
	/// the same principal observes that same outcome. A 403 answer is cached
	/// as the deny-all empty grants document; other terminal failures reach
	/// every waiter as a [`ServiceError`].
	pub async fn fetch_or_wait(&self, principal: &str, info: &Arc<GrantsInfo>) -> Result<Arc<Value>> {
		if self.inner.closed.load(Ordering::Acquire) {
			return Err(ServiceError::Closed.into());
		}
		if let Some(grants) = info.grants() {
			return Ok(grants);
		}

		self.inner.fetch_or_wait(principal, info).await
	}

	/// Drops the principal's entry iff it is idle beyond the configured
	/// threshold or its stored expiry has passed.
	pub fn remove_if_idle_or_expired(&self, principal: &str) -> bool {
		self.inner.remove_if_idle_or_expired(principal)
	}

	/// Runs one refresh pass immediately; control-plane hook.
	pub async fn refresh_now(&self) {
		self.inner.clone().refresh_pass().await;
	}

	/// Runs one GC pass immediately, bypassing the debounce; control-plane hook.
	pub fn gc_now(&self) {
		self.inner.gc_pass(true);
	}

	/// Principal names currently cached.
	pub fn principals(&self) -> Vec<String> {
		self.inner.entries.lock().keys().cloned().collect()
	}

	/// Number of cached entries.
	pub fn len(&self) -> usize {
		self.inner.entries.lock().len()
	}

	/// Whether the cache holds no entries.
	pub fn is_empty(&self) -> bool {
		self.inner.entries.lock().is_empty()
	}

	/// Shared activity counters.
	pub fn metrics(&self) -> Arc<CacheMetrics> {
		self.inner.metrics.clone()
	}

	/// Terminates the background workers; best-effort.
	///
	/// In-flight single-flight waiters observe either the completed outcome or
	/// a [`ServiceError::Interrupted`]; subsequent fetches fail with
	/// [`ServiceError::Closed`].
	pub fn close(&self) {
		self.inner.closed.store(true, Ordering::Release);

		if let Some(task) = &self.refresh_task {
			task.abort();
		}
		if let Some(task) = &self.gc_task {
			task.abort();
		}
	}
}
impl Drop for GrantsCache {
	fn drop(&mut self) {
		self.close();
	}
}
impl Debug for GrantsCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GrantsCache")
			.field("entries", &self.len())
			.field("config", &self.inner.config)
			.finish()
	}
}

pub(crate) struct CacheInner {
	pub(crate) config: AuthzConfig,
	pub(crate) fetcher: Arc<dyn GrantsFetcher>,
	pub(crate) sessions: Arc<dyn SessionRegistry>,
	pub(crate) clock: Arc<dyn Clock>,
	pub(crate) entries: Mutex<HashMap<String, Arc<GrantsInfo>>>,
	pub(crate) flights: Arc<FlightTable>,
	pub(crate) metrics: Arc<CacheMetrics>,
	pub(crate) closed: AtomicBool,
	pub(crate) last_gc_ms: AtomicI64,
}
impl CacheInner {
	async fn fetch_or_wait(&self, principal: &str, info: &Arc<GrantsInfo>) -> Result<Arc<Value>> {
		self.run_flight(principal, info, true).await.map_err(Error::from)
	}

	/// Performs the principal's upstream fetch under the single-flight barrier.
	///
	/// The demand path passes `reuse_cached` so a flight that raced a finished
	/// epoch returns the freshly landed document instead of fetching again; the
	/// refresh path always fetches. Either way, at most one upstream call per
	/// principal is in flight at any time.
	pub(crate) async fn run_flight(
		&self,
		principal: &str,
		info: &Arc<GrantsInfo>,
		reuse_cached: bool,
	) -> Result<Arc<Value>, ServiceError> {
		match flight::acquire(&self.flights, principal) {
			Admission::Leader(permit) => {
				if reuse_cached && let Some(grants) = info.grants() {
					permit.fulfill(Ok(grants.clone()));

					return Ok(grants);
				}

				let span = TaskSpan::new(TaskKind::Fetch, "run_flight");

				obs::record_task_outcome(TaskKind::Fetch, TaskOutcome::Attempt);

				let outcome = span
					.instrument(async {
						match self.fetch_grants_with_policy(&info.access_token()).await {
							Ok(document) => {
								let document = Arc::new(document);

								if info.replace_grants(document.clone()) {
									tracing::debug!(principal, "Grants document changed.");
								}

								Ok(document)
							},
							Err(error) => Err(ServiceError::upstream(error.into())),
						}
					})
					.await;

				match &outcome {
					Ok(_) => obs::record_task_outcome(TaskKind::Fetch, TaskOutcome::Success),
					Err(_) => obs::record_task_outcome(TaskKind::Fetch, TaskOutcome::Failure),
				}

				permit.fulfill(outcome.clone());

				outcome
			},
			Admission::Follower(rx) => flight::await_outcome(rx).await,
		}
	}

	/// Upstream call with the configured retry budget.
	///
	/// Retries connection errors and unexpected statuses up to `http_retries`
	/// extra attempts. 401 and 403 are terminal; a 403 is converted into the
	/// deny-all empty grants document.
	pub(crate) async fn fetch_grants_with_policy(&self, token: &str) -> Result<Value, FetchError> {
		let mut attempt: u32 = 0;

		loop {
			attempt += 1;
			self.metrics.record_fetch_attempt();

			match self.fetcher.fetch_grants(token).await {
				Ok(document) => {
					self.metrics.record_fetch_success();

					return Ok(document);
				},
				Err(error) if error.is_retriable() && attempt <= self.config.http_retries => {
					self.metrics.record_fetch_failure();

					tracing::warn!(%error, attempt, "Grants fetch failed; retrying.");
				},
				Err(error) => {
					self.metrics.record_fetch_failure();

					if error.status() == Some(403) {
						tracing::debug!(
							"Provider denied all grants for the token; caching empty grants."
						);

						return Ok(Value::Object(Default::default()));
					}

					return Err(error);
				},
			}
		}
	}

	pub(crate) fn remove_if_idle_or_expired(&self, principal: &str) -> bool {
		let now = self.clock.now_millis();
		let mut entries = self.entries.lock();
		let Some(info) = entries.get(principal) else {
			return false;
		};
		let idle = info.last_used_ms() < now - self.config.max_idle_millis();
		let expired = info.expires_at_ms() < now;

		if idle || expired {
			entries.remove(principal);
			self.metrics.record_evictions(1);

			true
		} else {
			false
		}
	}

	pub(crate) fn snapshot(&self) -> Vec<(String, Arc<GrantsInfo>)> {
		self.entries.lock().iter().map(|(name, info)| (name.clone(), info.clone())).collect()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	#[tokio::test]
	async fn info_for_creates_then_reuses_entries() {
		let (cache, _fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());
		let token = TokenPayload::new("T1", "alice", 10_000);
		let first = cache.info_for(&token);
		let second = cache.info_for(&token);

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(cache.len(), 1);
		assert_eq!(first.access_token(), "T1");
		assert!(first.grants().is_none());
	}

	#[tokio::test]
	async fn newer_tokens_replace_and_expiry_ratchets() {
		let (cache, _fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());
		let info = cache.info_for(&TokenPayload::new("T1", "alice", 10_000));

		// An older token must neither lower the expiry nor replace the token.
		cache.info_for(&TokenPayload::new("T0", "alice", 5_000));

		assert_eq!(info.access_token(), "T1");
		assert_eq!(info.expires_at_ms(), 10_000);

		// Ties keep the current token.
		cache.info_for(&TokenPayload::new("T1b", "alice", 10_000));

		assert_eq!(info.access_token(), "T1");

		cache.info_for(&TokenPayload::new("T2", "alice", 20_000));

		assert_eq!(info.access_token(), "T2");
		assert_eq!(info.expires_at_ms(), 20_000);
	}

	#[tokio::test]
	async fn consults_advance_last_used() {
		let (cache, _fetcher, _sessions, clock) = build_test_cache(AuthzConfig::default());
		let token = TokenPayload::new("T1", "alice", i64::MAX);
		let info = cache.info_for(&token);
		let first = info.last_used_ms();

		clock.advance_millis(1_500);
		cache.info_for(&token);

		assert_eq!(info.last_used_ms(), first + 1_500);
	}

	#[tokio::test]
	async fn idle_and_expired_entries_are_removed_on_request() {
		let config = AuthzConfig::builder()
			.grants_max_idle_time_seconds(10)
			.build()
			.expect("Idle-eviction config fixture should build.");
		let (cache, _fetcher, _sessions, clock) = build_test_cache(config);

		cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));

		assert!(!cache.remove_if_idle_or_expired("alice"), "A fresh entry must be retained.");

		clock.advance_millis(20_000);

		assert!(cache.remove_if_idle_or_expired("alice"), "An idle entry must be dropped.");
		assert!(cache.is_empty());

		// Expired-but-recently-used entries are dropped as well.
		let now = clock.now_millis();

		cache.info_for(&TokenPayload::new("T2", "bob", now + 1_000));
		clock.advance_millis(2_000);

		assert!(cache.remove_if_idle_or_expired("bob"));
		assert!(!cache.remove_if_idle_or_expired("carol"), "Unknown principals are a no-op.");
		assert_eq!(cache.metrics().evictions(), 2);
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn concurrent_fetches_for_one_principal_share_a_flight() {
		let (cache, fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());

		fetcher.respond_with_grants(serde_json::json!({"grants": ["topic:orders-*"]}));
		fetcher.set_delay(StdDuration::from_millis(50));

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

			assert_eq!(*grants, serde_json::json!({"grants": ["topic:orders-*"]}));
		}

		assert_eq!(fetcher.calls(), 1, "Ten requesters must share one upstream call.");
	}

	#[tokio::test]
	async fn forbidden_answers_cache_deny_all_empty_grants() {
		let (cache, fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());

		fetcher.fail_token_with_status("T1", 403);

		let info = cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));
		let grants = cache
			.fetch_or_wait("alice", &info)
			.await
			.expect("A 403 must convert into the deny-all document.");

		assert_eq!(*grants, serde_json::json!({}));
	}

	#[tokio::test]
	async fn close_rejects_new_fetches() {
		let (cache, fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());

		fetcher.respond_with_grants(serde_json::json!({"ok": true}));

		let info = cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));

		cache.close();

		assert!(matches!(
			cache.fetch_or_wait("alice", &info).await,
			Err(Error::Service(ServiceError::Closed))
		));
	}
}
