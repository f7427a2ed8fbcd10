// self
use crate::{
	_prelude::*,
	obs::{OpKind, OpOutcome},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by client operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("hospitable_client.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> OpSpanGuard {
		#[cfg(feature = "tracing")]
		{
			OpSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			OpSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`OpSpan::entered`].
pub struct OpSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for OpSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("OpSpanGuard(..)")
	}
}

/// Emits one event in the current span; failures log at `warn`, retries and denials at `info`.
pub fn emit_op_event(kind: OpKind, outcome: OpOutcome, detail: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		let (op, outcome_label) = (kind.as_str(), outcome.as_str());

		match outcome {
			OpOutcome::Failure =>
				tracing::warn!(op, outcome = outcome_label, %detail, "operation failed"),
			OpOutcome::Retry | OpOutcome::Denied =>
				tracing::info!(op, outcome = outcome_label, %detail, "operation deferred"),
			OpOutcome::Attempt | OpOutcome::Success =>
				tracing::debug!(op, outcome = outcome_label, %detail, "operation progressed"),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, outcome, detail);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn op_span_guard_exists_in_every_build() {
		let _guard = OpSpan::new(OpKind::Webhook, "test").entered();

		emit_op_event(OpKind::Webhook, OpOutcome::Denied, &"signature mismatch");
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = OpSpan::new(OpKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
