// self
use crate::{_prelude::*, obs::TaskKind};

/// A span builder used by cache work units.
#[derive(Clone, Debug)]
pub struct TaskSpan {
	span: tracing::Span,
}
impl TaskSpan {
	/// Creates a new span tagged with the provided task kind + stage.
	pub fn new(kind: TaskKind, stage: &'static str) -> Self {
		Self { span: tracing::info_span!("oauth2_authz.task", task = kind.as_str(), stage) }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> TaskSpanGuard {
		TaskSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> tracing::instrument::Instrumented<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`TaskSpan::entered`].
pub struct TaskSpanGuard {
	_guard: tracing::span::EnteredSpan,
}
impl Debug for TaskSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TaskSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn entered_span_guard_scopes_synchronous_work() {
		let _guard = TaskSpan::new(TaskKind::Gc, "test").entered();
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = TaskSpan::new(TaskKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
