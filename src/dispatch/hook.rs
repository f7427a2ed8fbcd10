// std
use std::panic::{self, AssertUnwindSafe};
// crates.io
use oauth2::http::Method;
// self
use crate::{
	_prelude::*,
	obs::{self, OpKind, OpOutcome},
};

/// What happened on one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
	/// The attempt produced the final successful response.
	Success,
	/// A transient failure; another attempt follows after `retry_in`.
	Retry,
	/// A 401; the credential is refreshed and the attempt replayed once.
	Reauthenticate,
	/// The attempt ended the operation with an error.
	Failed,
}

/// Report handed to a [`DispatchHook`] after every attempt.
#[derive(Clone, Debug)]
pub struct AttemptEvent {
	/// HTTP method of the operation.
	pub method: Method,
	/// Operation path.
	pub path: String,
	/// 1-based attempt number.
	pub attempt: u32,
	/// Response status, when a response arrived.
	pub status: Option<u16>,
	/// Attempt outcome.
	pub outcome: AttemptOutcome,
	/// Scheduled wait before the next attempt.
	pub retry_in: Option<Duration>,
	/// Rendered error for failed or retried attempts.
	pub error: Option<String>,
}

/// Observer of dispatch attempts (logging, metrics, test recorders).
///
/// A panicking hook is contained; the retry loop carries on.
pub trait DispatchHook
where
	Self: Send + Sync,
{
	/// Called once per attempt.
	fn on_attempt(&self, event: &AttemptEvent);
}

/// Hook that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHook;
impl DispatchHook for NoopHook {
	fn on_attempt(&self, _event: &AttemptEvent) {}
}

pub(crate) fn notify(hook: &dyn DispatchHook, event: &AttemptEvent) {
	if panic::catch_unwind(AssertUnwindSafe(|| hook.on_attempt(event))).is_err() {
		obs::emit_op_event(OpKind::Dispatch, OpOutcome::Failure, &"attempt hook panicked");
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	struct Exploding;
	impl DispatchHook for Exploding {
		fn on_attempt(&self, _event: &AttemptEvent) {
			panic!("hook failure");
		}
	}

	#[test]
	fn panicking_hooks_are_contained() {
		let event = AttemptEvent {
			method: Method::GET,
			path: "/user".into(),
			attempt: 1,
			status: Some(200),
			outcome: AttemptOutcome::Success,
			retry_in: None,
			error: None,
		};

		notify(&Exploding, &event);
		notify(&NoopHook, &event);
	}
}
