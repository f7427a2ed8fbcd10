//! Optional observability helpers for client operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `hospitable_client.op` with the `op`
//!   (component) and `stage` (call site) fields, plus events for retries, rate-limit denials, and
//!   refresh outcomes.
//! - Enable `metrics` to increment the `hospitable_client_op_total` counter for every
//!   attempt/success/retry/denial/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Client components observed by the instrumentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// One logical request through the dispatcher.
	Dispatch,
	/// Token refresh or code exchange.
	Refresh,
	/// Page iteration.
	Paginate,
	/// Webhook verification.
	Webhook,
	/// Local rate-limit admission.
	RateLimit,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Dispatch => "dispatch",
			OpKind::Refresh => "refresh",
			OpKind::Paginate => "paginate",
			OpKind::Webhook => "webhook",
			OpKind::RateLimit => "rate_limit",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// A transient failure scheduled another attempt.
	Retry,
	/// The local limiter or a webhook check refused the work.
	Denied,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Retry => "retry",
			OpOutcome::Denied => "denied",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records `outcome` for `kind` in both the metrics counter and the event stream.
pub fn record(kind: OpKind, outcome: OpOutcome, detail: &dyn Display) {
	record_op_outcome(kind, outcome);
	emit_op_event(kind, outcome, detail);
}
