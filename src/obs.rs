//! Observability helpers for cache background work.
//!
//! Structured spans named `oauth2_authz.task` carry the `task` (kind) and
//! `stage` (call site) fields. Enable the `metrics` feature to additionally
//! increment the `oauth2_authz_task_total` counter for every
//! attempt/success/failure, labeled by `task` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Kinds of cache work observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
	/// Demand-driven single-flight grants fetch.
	Fetch,
	/// Background refresh pass.
	Refresh,
	/// Session-driven garbage collection pass.
	Gc,
}
impl TaskKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TaskKind::Fetch => "fetch",
			TaskKind::Refresh => "refresh",
			TaskKind::Gc => "gc",
		}
	}
}
impl Display for TaskKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
	/// Entry to a unit of cache work.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure contained by the cache or propagated to the caller.
	Failure,
}
impl TaskOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TaskOutcome::Attempt => "attempt",
			TaskOutcome::Success => "success",
			TaskOutcome::Failure => "failure",
		}
	}
}
impl Display for TaskOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
