//! Cache configuration and its validating builder.

// self
use crate::{_prelude::*, error::ConfigError};

/// Validated configuration governing the grants cache and its background loops.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzConfig {
	/// Cadence of the background refresh loop in seconds; `0` disables it.
	pub grants_refresh_period_seconds: u64,
	/// Number of workers fetching concurrently during one refresh pass.
	pub grants_refresh_pool_size: usize,
	/// Idle threshold after which an unconsulted entry is skipped and evicted.
	pub grants_max_idle_time_seconds: u64,
	/// Extra fetch attempts after the first, for retriable failures.
	pub http_retries: u32,
	/// Cadence of the session-driven garbage collection loop in seconds.
	pub gc_period_seconds: u64,
}
impl AuthzConfig {
	/// Returns a builder seeded with the crate defaults.
	pub fn builder() -> AuthzConfigBuilder {
		AuthzConfigBuilder::default()
	}

	/// Refresh cadence, or `None` when background refresh is disabled.
	pub fn refresh_period(&self) -> Option<StdDuration> {
		(self.grants_refresh_period_seconds > 0)
			.then(|| StdDuration::from_secs(self.grants_refresh_period_seconds))
	}

	/// Idle threshold in milliseconds.
	pub fn max_idle_millis(&self) -> i64 {
		self.grants_max_idle_time_seconds as i64 * 1_000
	}

	/// GC cadence.
	pub fn gc_period(&self) -> StdDuration {
		StdDuration::from_secs(self.gc_period_seconds)
	}
}
impl Default for AuthzConfig {
	fn default() -> Self {
		AuthzConfigBuilder::default().build().expect("Default configuration must be valid.")
	}
}

/// Builder for [`AuthzConfig`] values.
#[derive(Clone, Debug)]
pub struct AuthzConfigBuilder {
	/// Refresh cadence in seconds; `0` disables background refresh.
	pub grants_refresh_period_seconds: u64,
	/// Refresh worker pool size.
	pub grants_refresh_pool_size: usize,
	/// Idle threshold in seconds.
	pub grants_max_idle_time_seconds: u64,
	/// Extra fetch attempts after the first.
	pub http_retries: u32,
	/// GC cadence in seconds.
	pub gc_period_seconds: u64,
}
impl AuthzConfigBuilder {
	/// Overrides the refresh cadence; `0` disables background refresh.
	pub fn grants_refresh_period_seconds(mut self, seconds: u64) -> Self {
		self.grants_refresh_period_seconds = seconds;

		self
	}

	/// Overrides the refresh worker pool size.
	pub fn grants_refresh_pool_size(mut self, size: usize) -> Self {
		self.grants_refresh_pool_size = size;

		self
	}

	/// Overrides the idle threshold.
	pub fn grants_max_idle_time_seconds(mut self, seconds: u64) -> Self {
		self.grants_max_idle_time_seconds = seconds;

		self
	}

	/// Overrides the retry budget.
	pub fn http_retries(mut self, retries: u32) -> Self {
		self.http_retries = retries;

		self
	}

	/// Overrides the GC cadence.
	pub fn gc_period_seconds(mut self, seconds: u64) -> Self {
		self.gc_period_seconds = seconds;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<AuthzConfig, ConfigError> {
		if self.grants_refresh_pool_size == 0 {
			return Err(ConfigError::ZeroRefreshPoolSize);
		}
		if self.grants_max_idle_time_seconds == 0 {
			return Err(ConfigError::ZeroMaxIdleTime);
		}
		if self.gc_period_seconds == 0 {
			return Err(ConfigError::ZeroGcPeriod);
		}

		Ok(AuthzConfig {
			grants_refresh_period_seconds: self.grants_refresh_period_seconds,
			grants_refresh_pool_size: self.grants_refresh_pool_size,
			grants_max_idle_time_seconds: self.grants_max_idle_time_seconds,
			http_retries: self.http_retries,
			gc_period_seconds: self.gc_period_seconds,
		})
	}
}
impl Default for AuthzConfigBuilder {
	fn default() -> Self {
		Self {
			grants_refresh_period_seconds: 60,
			grants_refresh_pool_size: 5,
			grants_max_idle_time_seconds: 300,
			http_retries: 0,
			gc_period_seconds: 300,
		}
	}
}
