// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for cache activity.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	fetch_attempts: AtomicU64,
	fetch_successes: AtomicU64,
	fetch_failures: AtomicU64,
	evictions: AtomicU64,
}
impl CacheMetrics {
	/// Returns the total number of upstream fetch attempts, retries included.
	pub fn fetch_attempts(&self) -> u64 {
		self.fetch_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of fetch attempts that produced a grants document.
	pub fn fetch_successes(&self) -> u64 {
		self.fetch_successes.load(Ordering::Relaxed)
	}

	/// Returns the number of fetch attempts that failed, retried ones included.
	pub fn fetch_failures(&self) -> u64 {
		self.fetch_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of entries dropped by GC or idle/expiry eviction.
	pub fn evictions(&self) -> u64 {
		self.evictions.load(Ordering::Relaxed)
	}

	pub(crate) fn record_fetch_attempt(&self) {
		self.fetch_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_fetch_success(&self) {
		self.fetch_successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_fetch_failure(&self) {
		self.fetch_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_evictions(&self, count: u64) {
		self.evictions.fetch_add(count, Ordering::Relaxed);
	}
}
