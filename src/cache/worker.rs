//! Background refresh and GC loops driving the cache between consults.

// std
use std::{collections::HashSet, sync::atomic::Ordering};
// crates.io
use tokio::{
	sync::Semaphore,
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	cache::{CacheInner, GrantsInfo},
	obs::{self, TaskKind, TaskOutcome, TaskSpan},
};

/// Outcome of one per-principal refresh job.
pub(crate) enum RefreshJobOutcome {
	/// Entry was refreshed; grants unchanged or rewritten.
	Refreshed,
	/// Entry was idle; the fetch was skipped and the entry possibly evicted.
	Skipped,
	/// The provider rejected the token; the parent purges matching sessions.
	InvalidToken {
		access_token: String,
	},
	/// Fetch failed after the retry budget; logged and contained.
	Failed,
}

/// Spawns the refresh scheduler, unless the configuration disables it.
pub(crate) fn spawn_refresh(inner: Arc<CacheInner>) -> Option<JoinHandle<()>> {
	let period = inner.config.refresh_period()?;

	Some(tokio::spawn(async move {
		let mut ticker = time::interval(period);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// An interval's first tick completes immediately, and a cache created
		// moments ago holds nothing worth refreshing.
		ticker.tick().await;

		loop {
			ticker.tick().await;
			inner.clone().refresh_pass().await;
		}
	}))
}

/// Spawns the GC scheduler.
pub(crate) fn spawn_gc(inner: Arc<CacheInner>) -> JoinHandle<()> {
	let period = inner.config.gc_period();

	tokio::spawn(async move {
		let mut ticker = time::interval(period);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		ticker.tick().await;

		loop {
			ticker.tick().await;
			inner.gc_pass(false);
		}
	})
}

impl CacheInner {
	/// One full refresh pass: snapshot, fan out over the bounded pool, join,
	/// then purge sessions whose token the provider rejected.
	///
	/// Individual job failures are logged and contained; the pass never
	/// propagates an error back to the scheduler.
	pub(crate) async fn refresh_pass(self: Arc<Self>) {
		let span = TaskSpan::new(TaskKind::Refresh, "refresh_pass");

		obs::record_task_outcome(TaskKind::Refresh, TaskOutcome::Attempt);

		let pass = async {
			let semaphore = Arc::new(Semaphore::new(self.config.grants_refresh_pool_size));
			let jobs: Vec<_> = self
				.snapshot()
				.into_iter()
				.map(|(principal, info)| {
					let inner = self.clone();
					let semaphore = semaphore.clone();

					tokio::spawn(
						async move { inner.refresh_job(&principal, &info, &semaphore).await },
					)
				})
				.collect();
			let mut rejected = Vec::new();
			let mut failed = false;

			for job in jobs {
				match job.await {
					Ok(RefreshJobOutcome::InvalidToken { access_token }) =>
						rejected.push(access_token),
					Ok(RefreshJobOutcome::Failed) => failed = true,
					Ok(_) => (),
					Err(error) => {
						failed = true;

						tracing::warn!(%error, "Refresh job aborted; continuing the pass.");
					},
				}
			}

			for access_token in rejected {
				tracing::warn!("Purging sessions for a token the provider rejected.");
				self.sessions.remove_all_with_matching_access_token(&access_token);
			}

			failed
		};
		let failed = span.instrument(pass).await;

		obs::record_task_outcome(
			TaskKind::Refresh,
			if failed { TaskOutcome::Failure } else { TaskOutcome::Success },
		);
	}

	async fn refresh_job(
		&self,
		principal: &str,
		info: &Arc<GrantsInfo>,
		semaphore: &Semaphore,
	) -> RefreshJobOutcome {
		let Ok(_permit) = semaphore.acquire().await else {
			return RefreshJobOutcome::Skipped;
		};
		let now = self.clock.now_millis();

		// An entry nobody consulted for the whole idle window is not worth
		// another upstream call.
		if info.last_used_ms() < now - self.config.max_idle_millis() {
			self.remove_if_idle_or_expired(principal);

			return RefreshJobOutcome::Skipped;
		}

		let access_token = info.access_token();

		// The flight barrier also covers refresh fetches, so a refresh racing a
		// demand fetch for the same principal shares one upstream call.
		match self.run_flight(principal, info, false).await {
			Ok(_) => RefreshJobOutcome::Refreshed,
			Err(error) if error.http_status() == Some(401) => {
				tracing::warn!(principal, %error, "Provider rejected the cached token.");

				RefreshJobOutcome::InvalidToken { access_token }
			},
			Err(error) => {
				tracing::warn!(principal, %error, "Grants refresh failed; keeping cached grants.");

				RefreshJobOutcome::Failed
			},
		}
	}

	/// One GC pass: retain only principals that still have live sessions.
	pub(crate) fn gc_pass(&self, force: bool) {
		let now = self.clock.now_millis();

		if !force {
			// Tolerates scheduler drift: a queued tick arriving early must not
			// double-run the collection.
			let elapsed = now - self.last_gc_ms.load(Ordering::Acquire);
			let debounce = self.config.gc_period().as_millis() as i64 - 1_000;

			if elapsed < debounce {
				tracing::debug!(elapsed, "Skipping early GC tick.");

				return;
			}
		}

		self.last_gc_ms.store(now, Ordering::Release);

		let _span = TaskSpan::new(TaskKind::Gc, "gc_pass").entered();

		obs::record_task_outcome(TaskKind::Gc, TaskOutcome::Attempt);

		let live: HashSet<String> = self
			.sessions
			.list_live()
			.iter()
			.map(|token| token.principal_name().to_owned())
			.collect();
		let dropped = {
			let mut entries = self.entries.lock();
			let before = entries.len();

			entries.retain(|principal, _| live.contains(principal));

			(before - entries.len()) as u64
		};

		if dropped > 0 {
			self.metrics.record_evictions(dropped);
			tracing::debug!(dropped, "GC dropped entries without live sessions.");
		}

		obs::record_task_outcome(TaskKind::Gc, TaskOutcome::Success);
	}
}

#[cfg(test)]
mod tests {
	// self
	use crate::_preludet::*;

	#[tokio::test]
	async fn early_gc_ticks_are_debounced() {
		let config = AuthzConfig::builder()
			.gc_period_seconds(300)
			.build()
			.expect("GC config fixture should build.");
		let (cache, _fetcher, _sessions, clock) = build_test_cache(config);

		cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));

		// No live session backs the entry, but the tick arrives early.
		clock.advance_millis(100_000);
		cache.inner.gc_pass(false);

		assert_eq!(cache.len(), 1, "An early tick must not run the collection.");

		clock.advance_millis(200_000);
		cache.inner.gc_pass(false);

		assert!(cache.is_empty(), "A tick within the drift tolerance must run.");
	}

	#[tokio::test]
	async fn refresh_purges_sessions_presenting_a_rejected_token() {
		let (cache, fetcher, sessions, _clock) = build_test_cache(AuthzConfig::default());
		let bob = Arc::new(TokenPayload::new("T1", "bob", i64::MAX));
		let carol = Arc::new(TokenPayload::new("T2", "carol", i64::MAX));

		sessions.open(bob.clone());
		sessions.open(carol.clone());
		cache.info_for(&bob);
		cache.info_for(&carol);
		fetcher.fail_token_with_status("T1", 401);
		cache.refresh_now().await;

		let live = sessions.list_live();

		assert_eq!(live.len(), 1);
		assert_eq!(live[0].principal_name(), "carol");
	}

	#[tokio::test]
	async fn refresh_skips_fetching_for_idle_entries() {
		let config = AuthzConfig::builder()
			.grants_max_idle_time_seconds(10)
			.build()
			.expect("Idle config fixture should build.");
		let (cache, fetcher, _sessions, clock) = build_test_cache(config);

		cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));
		clock.advance_millis(20_000);
		cache.refresh_now().await;

		assert_eq!(fetcher.calls(), 0, "An idle entry must not reach the upstream.");
		assert!(cache.is_empty(), "The idle entry must be evicted by the pass.");
	}

	#[tokio::test]
	async fn forced_gc_bypasses_the_debounce() {
		let (cache, _fetcher, _sessions, _clock) = build_test_cache(AuthzConfig::default());

		cache.info_for(&TokenPayload::new("T1", "alice", i64::MAX));
		cache.inner.gc_pass(true);

		assert!(cache.is_empty());
	}
}
