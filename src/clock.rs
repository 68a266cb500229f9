//! Time source abstraction used for freshness and idleness decisions.

// self
use crate::_prelude::*;

/// Millisecond time source consulted by the cache for every freshness decision.
///
/// The cache never reads the system clock directly; tests substitute a manual
/// implementation to drive idle and expiry transitions deterministically.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Current instant as milliseconds since the Unix epoch.
	fn now_millis(&self) -> i64;
}

/// Default [`Clock`] backed by the system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now_millis(&self) -> i64 {
		(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
	}
}
